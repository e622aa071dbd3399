//! # Haplotypes
//!
//! A haplotype is an ordered, non-overlapping list of alleles committed
//! over a reference window, materialised into a byte sequence once at
//! construction. Two haplotypes are equal when their sequences over the
//! window match; they *have the same alleles* when their committed allele
//! lists match, regardless of how the sequence was spelled.

use std::sync::Arc;

use crate::data::allele::ContigAllele;
use crate::data::ContigRegion;
use crate::error::{Result, SomavarError};

#[derive(Clone, Debug)]
pub struct Haplotype {
    contig: String,
    window: ContigRegion,
    alleles: Vec<ContigAllele>,
    sequence: Vec<u8>,
}

impl Haplotype {
    /// Materialise a haplotype from the reference bases of `window` and a
    /// position-sorted, non-overlapping allele list.
    pub fn new(
        contig: impl Into<String>,
        window: ContigRegion,
        ref_seq: &[u8],
        alleles: Vec<ContigAllele>,
    ) -> Result<Self> {
        if ref_seq.len() as u32 != window.len() {
            return Err(SomavarError::degenerate(format!(
                "reference slice length {} does not span window {}",
                ref_seq.len(),
                window
            )));
        }
        let mut sequence = Vec::with_capacity(ref_seq.len());
        let mut cursor = window.begin;
        for allele in &alleles {
            if allele.begin() < cursor || allele.end() > window.end {
                return Err(SomavarError::degenerate(format!(
                    "allele {}..{} outside window {} or overlapping a predecessor",
                    allele.begin(),
                    allele.end(),
                    window
                )));
            }
            let gap = (cursor - window.begin) as usize..(allele.begin() - window.begin) as usize;
            sequence.extend_from_slice(&ref_seq[gap]);
            sequence.extend_from_slice(allele.bases());
            cursor = allele.end();
        }
        sequence.extend_from_slice(&ref_seq[(cursor - window.begin) as usize..]);
        Ok(Self {
            contig: contig.into(),
            window,
            alleles,
            sequence,
        })
    }

    /// The reference haplotype of a window: no committed alleles.
    pub fn reference(contig: impl Into<String>, window: ContigRegion, ref_seq: &[u8]) -> Self {
        Self {
            contig: contig.into(),
            window,
            alleles: Vec::new(),
            sequence: ref_seq.to_vec(),
        }
    }

    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn window(&self) -> ContigRegion {
        self.window
    }

    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn alleles(&self) -> &[ContigAllele] {
        &self.alleles
    }

    /// Whether this haplotype committed exactly this allele.
    pub fn contains_allele(&self, allele: &ContigAllele) -> bool {
        self.alleles
            .binary_search_by(|a| {
                a.region()
                    .cmp(&allele.region())
                    .then_with(|| a.bases().cmp(allele.bases()))
            })
            .is_ok()
    }

    /// The committed allele whose interval equals `region`, if any.
    pub fn allele_at(&self, region: ContigRegion) -> Option<&ContigAllele> {
        self.alleles.iter().find(|a| a.region() == region)
    }

    /// The alleles at which this haplotype differs from `reference`
    /// (which must share the window). These are the segregating sites used
    /// by the coalescent prior.
    pub fn difference(&self, reference: &Haplotype) -> Vec<ContigAllele> {
        debug_assert_eq!(self.window, reference.window);
        self.alleles
            .iter()
            .filter(|a| {
                let begin = (a.begin() - self.window.begin) as usize;
                let end = (a.end() - self.window.begin) as usize;
                reference.sequence.get(begin..end).map(|r| r != a.bases()).unwrap_or(true)
            })
            .cloned()
            .collect()
    }
}

impl PartialEq for Haplotype {
    fn eq(&self, other: &Self) -> bool {
        self.contig == other.contig && self.window == other.window && self.sequence == other.sequence
    }
}

impl Eq for Haplotype {}

impl std::hash::Hash for Haplotype {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.contig.hash(state);
        self.window.hash(state);
        self.sequence.hash(state);
    }
}

impl PartialOrd for Haplotype {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Haplotype {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.contig, self.window, &self.sequence).cmp(&(
            &other.contig,
            other.window,
            &other.sequence,
        ))
    }
}

/// Same committed allele multiset, independent of spelling.
pub fn have_same_alleles(lhs: &Haplotype, rhs: &Haplotype) -> bool {
    lhs.alleles == rhs.alleles
}

/// Shared haplotype handle used throughout the genotype models.
pub type HaplotypeRef = Arc<Haplotype>;

#[cfg(test)]
mod tests {
    use super::*;

    fn snv(begin: u32, base: u8) -> ContigAllele {
        ContigAllele::new(ContigRegion::new(begin, begin + 1), vec![base])
    }

    #[test]
    fn test_materialise_snv() {
        let window = ContigRegion::new(0, 4);
        let h = Haplotype::new("chr1", window, b"ACGT", vec![snv(2, b'A')]).unwrap();
        assert_eq!(h.sequence(), b"ACAT");
    }

    #[test]
    fn test_materialise_insertion_and_deletion() {
        let window = ContigRegion::new(10, 18);
        // reference ACGTACGT; insert TT after pos 12, delete pos 14..16
        let ins = ContigAllele::new(ContigRegion::new(12, 12), *b"TT");
        let del = ContigAllele::new(ContigRegion::new(14, 16), Vec::new());
        let h = Haplotype::new("chr1", window, b"ACGTACGT", vec![ins, del]).unwrap();
        assert_eq!(h.sequence(), b"ACTTGTGT");
    }

    #[test]
    fn test_equality_by_sequence_not_spelling() {
        let window = ContigRegion::new(0, 4);
        // committing the reference base as an explicit allele does not
        // change the sequence
        let spelled = Haplotype::new("chr1", window, b"ACGT", vec![snv(2, b'G')]).unwrap();
        let plain = Haplotype::reference("chr1", window, b"ACGT");
        assert_eq!(spelled, plain);
        assert!(!have_same_alleles(&spelled, &plain));
    }

    #[test]
    fn test_difference_ignores_reference_spelling() {
        let window = ContigRegion::new(0, 4);
        let reference = Haplotype::reference("chr1", window, b"ACGT");
        let h = Haplotype::new("chr1", window, b"ACGT", vec![snv(1, b'C'), snv(2, b'A')]).unwrap();
        let diff = h.difference(&reference);
        assert_eq!(diff, vec![snv(2, b'A')]);
    }

    #[test]
    fn test_contains_allele() {
        let window = ContigRegion::new(0, 4);
        let h = Haplotype::new("chr1", window, b"ACGT", vec![snv(2, b'A')]).unwrap();
        assert!(h.contains_allele(&snv(2, b'A')));
        assert!(!h.contains_allele(&snv(2, b'T')));
        assert!(h.allele_at(ContigRegion::new(2, 3)).is_some());
        assert!(h.allele_at(ContigRegion::new(1, 2)).is_none());
    }

    #[test]
    fn test_overlapping_alleles_rejected() {
        let window = ContigRegion::new(0, 4);
        let a = ContigAllele::new(ContigRegion::new(1, 3), *b"TT");
        let b = snv(2, b'A');
        assert!(Haplotype::new("chr1", window, b"ACGT", vec![a, b]).is_err());
    }
}
