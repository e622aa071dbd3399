//! # Aligned Reads
//!
//! The read representation the inference core consumes from a `ReadPipe`,
//! plus the transforms applied before likelihood computation: soft-clipped
//! tails have their base qualities zeroed, and no base quality may exceed
//! the read's mapping quality.

use crate::data::ContigRegion;
use crate::error::{Result, SomavarError};

/// One CIGAR operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CigarOp {
    /// M, = or X: consumes read and reference
    AlnMatch(u32),
    /// I: consumes read only
    Insertion(u32),
    /// D: consumes reference only
    Deletion(u32),
    /// S: consumes read only, bases retained
    SoftClip(u32),
    /// H: consumes neither
    HardClip(u32),
    /// N: consumes reference only
    Skip(u32),
}

impl CigarOp {
    pub fn len(&self) -> u32 {
        match *self {
            CigarOp::AlnMatch(n)
            | CigarOp::Insertion(n)
            | CigarOp::Deletion(n)
            | CigarOp::SoftClip(n)
            | CigarOp::HardClip(n)
            | CigarOp::Skip(n) => n,
        }
    }

    pub fn consumes_read(&self) -> bool {
        matches!(
            self,
            CigarOp::AlnMatch(_) | CigarOp::Insertion(_) | CigarOp::SoftClip(_)
        )
    }

    pub fn consumes_reference(&self) -> bool {
        matches!(
            self,
            CigarOp::AlnMatch(_) | CigarOp::Deletion(_) | CigarOp::Skip(_)
        )
    }
}

/// A parsed CIGAR string.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Cigar(pub Vec<CigarOp>);

impl Cigar {
    /// Parse the text form, e.g. `100M`, `20S80M`, `50M2D48M`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut ops = Vec::new();
        let mut count = 0u32;
        let mut saw_digit = false;
        for c in text.chars() {
            if let Some(d) = c.to_digit(10) {
                count = count * 10 + d;
                saw_digit = true;
                continue;
            }
            if !saw_digit {
                return Err(SomavarError::config(format!("malformed CIGAR: {text}")));
            }
            let op = match c {
                'M' | '=' | 'X' => CigarOp::AlnMatch(count),
                'I' => CigarOp::Insertion(count),
                'D' => CigarOp::Deletion(count),
                'S' => CigarOp::SoftClip(count),
                'H' => CigarOp::HardClip(count),
                'N' => CigarOp::Skip(count),
                other => {
                    return Err(SomavarError::config(format!(
                        "unsupported CIGAR op '{other}' in {text}"
                    )))
                }
            };
            ops.push(op);
            count = 0;
            saw_digit = false;
        }
        if saw_digit {
            return Err(SomavarError::config(format!("dangling count in CIGAR: {text}")));
        }
        Ok(Cigar(ops))
    }

    /// Reference bases consumed by the alignment.
    pub fn reference_span(&self) -> u32 {
        self.0
            .iter()
            .filter(|op| op.consumes_reference())
            .map(|op| op.len())
            .sum()
    }

    /// Length of the leading soft clip, if any.
    pub fn front_soft_clip(&self) -> u32 {
        match self.0.first() {
            Some(CigarOp::SoftClip(n)) => *n,
            _ => 0,
        }
    }

    /// Length of the trailing soft clip, if any.
    pub fn back_soft_clip(&self) -> u32 {
        match self.0.last() {
            Some(CigarOp::SoftClip(n)) => *n,
            _ => 0,
        }
    }
}

/// An aligned sequencing read.
#[derive(Clone, Debug)]
pub struct AlignedRead {
    pub name: String,
    pub contig: String,
    /// 0-based leftmost reference position of the alignment
    pub start: u32,
    pub cigar: Cigar,
    pub bases: Vec<u8>,
    /// Base qualities, 0..=93
    pub qualities: Vec<u8>,
    pub mapping_quality: u8,
    pub is_reverse: bool,
}

impl AlignedRead {
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Reference interval covered by the alignment.
    pub fn region(&self) -> ContigRegion {
        ContigRegion::new(self.start, self.start + self.cigar.reference_span())
    }

    /// Zero the base qualities under leading and trailing soft clips, so
    /// clipped bases carry no evidence.
    pub fn mask_soft_clips(&mut self) {
        let front = self.cigar.front_soft_clip() as usize;
        let back = self.cigar.back_soft_clip() as usize;
        let n = self.qualities.len();
        for q in self.qualities.iter_mut().take(front.min(n)) {
            *q = 0;
        }
        if back > 0 && back <= n {
            for q in self.qualities[n - back..].iter_mut() {
                *q = 0;
            }
        }
    }

    /// Cap every base quality at the mapping quality.
    pub fn cap_qualities_at_mapping_quality(&mut self) {
        let cap = self.mapping_quality;
        for q in self.qualities.iter_mut() {
            if *q > cap {
                *q = cap;
            }
        }
    }
}

/// The standard transform stack applied to fetched reads before they reach
/// the likelihood model.
pub fn transform_reads(reads: &mut [AlignedRead]) {
    for read in reads.iter_mut() {
        read.mask_soft_clips();
        read.cap_qualities_at_mapping_quality();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(cigar: &str, mapq: u8) -> AlignedRead {
        let cigar = Cigar::parse(cigar).unwrap();
        let len: u32 = cigar.0.iter().filter(|o| o.consumes_read()).map(|o| o.len()).sum();
        AlignedRead {
            name: "r1".into(),
            contig: "chr1".into(),
            start: 100,
            cigar,
            bases: vec![b'A'; len as usize],
            qualities: vec![30; len as usize],
            mapping_quality: mapq,
            is_reverse: false,
        }
    }

    #[test]
    fn test_cigar_parse_and_span() {
        let c = Cigar::parse("5S20M2D10M3I5M4S").unwrap();
        assert_eq!(c.reference_span(), 37);
        assert_eq!(c.front_soft_clip(), 5);
        assert_eq!(c.back_soft_clip(), 4);
        assert!(Cigar::parse("10M5").is_err());
        assert!(Cigar::parse("M").is_err());
        assert!(Cigar::parse("3Q").is_err());
    }

    #[test]
    fn test_region_from_cigar() {
        let r = read("10M2D10M", 60);
        assert_eq!(r.region(), ContigRegion::new(100, 122));
    }

    #[test]
    fn test_mask_soft_clips_zeroes_tails() {
        let mut r = read("3S10M2S", 60);
        r.mask_soft_clips();
        assert!(r.qualities[..3].iter().all(|&q| q == 0));
        assert!(r.qualities[13..].iter().all(|&q| q == 0));
        assert!(r.qualities[3..13].iter().all(|&q| q == 30));
    }

    #[test]
    fn test_cap_qualities() {
        let mut r = read("10M", 20);
        r.cap_qualities_at_mapping_quality();
        assert!(r.qualities.iter().all(|&q| q == 20));
    }
}
