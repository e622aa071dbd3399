//! # Pileup Candidate Generator
//!
//! Proposes normalised candidate variants from read/reference
//! disagreements: substitutions, insertions and deletions observed by
//! walking each read's CIGAR against the reference. Observations below a
//! base-quality floor are ignored and a candidate needs a minimum number
//! of supporting reads across all samples.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::data::{GenomicRegion, Variant};
use crate::error::Result;
use crate::io::{CandidateGenerator, ReadPipe, ReferenceGenome};

#[derive(Clone, Copy, Debug)]
pub struct PileupCandidateParams {
    pub min_base_quality: u8,
    pub min_support: u32,
}

impl Default for PileupCandidateParams {
    fn default() -> Self {
        Self {
            min_base_quality: 15,
            min_support: 2,
        }
    }
}

pub struct PileupCandidateGenerator {
    reference: Arc<dyn ReferenceGenome>,
    reads: Arc<dyn ReadPipe>,
    params: PileupCandidateParams,
}

impl PileupCandidateGenerator {
    pub fn new(
        reference: Arc<dyn ReferenceGenome>,
        reads: Arc<dyn ReadPipe>,
        params: PileupCandidateParams,
    ) -> Self {
        Self {
            reference,
            reads,
            params,
        }
    }
}

impl CandidateGenerator for PileupCandidateGenerator {
    fn generate_candidates(&self, region: &GenomicRegion) -> Result<Vec<Variant>> {
        use crate::data::read::CigarOp;

        let ref_seq = self.reference.fetch_sequence(region)?;
        let mut support: BTreeMap<Variant, u32> = BTreeMap::new();

        for sample in self.reads.samples() {
            for read in self.reads.fetch_reads(sample, region)? {
                let mut ref_pos = read.start;
                let mut read_pos = 0usize;
                for op in &read.cigar.0 {
                    match *op {
                        CigarOp::AlnMatch(len) => {
                            for i in 0..len {
                                let pos = ref_pos + i;
                                let offset = read_pos + i as usize;
                                if pos < region.begin() || pos >= region.end() {
                                    continue;
                                }
                                if read.qualities[offset] < self.params.min_base_quality {
                                    continue;
                                }
                                let ref_base = ref_seq[(pos - region.begin()) as usize];
                                let read_base = read.bases[offset].to_ascii_uppercase();
                                if read_base != ref_base && read_base != b'N' {
                                    let variant = Variant::new(
                                        &region.contig,
                                        pos,
                                        &[ref_base],
                                        &[read_base],
                                    );
                                    *support.entry(variant).or_insert(0) += 1;
                                }
                            }
                            ref_pos += len;
                            read_pos += len as usize;
                        }
                        CigarOp::Insertion(len) => {
                            let inserted =
                                &read.bases[read_pos..read_pos + len as usize];
                            if ref_pos >= region.begin()
                                && ref_pos < region.end()
                                && read.qualities[read_pos] >= self.params.min_base_quality
                            {
                                let mut alt = Vec::with_capacity(len as usize + 1);
                                alt.extend_from_slice(inserted);
                                let variant =
                                    Variant::new(&region.contig, ref_pos, b"", &alt);
                                *support.entry(variant).or_insert(0) += 1;
                            }
                            read_pos += len as usize;
                        }
                        CigarOp::Deletion(len) | CigarOp::Skip(len) => {
                            if matches!(op, CigarOp::Deletion(_))
                                && ref_pos >= region.begin()
                                && ref_pos + len <= region.end()
                            {
                                let begin = (ref_pos - region.begin()) as usize;
                                let deleted = &ref_seq[begin..begin + len as usize];
                                let variant =
                                    Variant::new(&region.contig, ref_pos, deleted, b"");
                                *support.entry(variant).or_insert(0) += 1;
                            }
                            ref_pos += len;
                        }
                        CigarOp::SoftClip(len) => read_pos += len as usize,
                        CigarOp::HardClip(_) => {}
                    }
                }
            }
        }

        Ok(support
            .into_iter()
            .filter(|(_, count)| *count >= self.params.min_support)
            .map(|(variant, _)| variant)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::read::Cigar;
    use crate::data::AlignedRead;
    use crate::io::{InMemoryReadPipe, InMemoryReference};

    const REF: &[u8] = b"ACGTACGTACGTACGTACGT";

    fn reference() -> Arc<InMemoryReference> {
        let mut reference = InMemoryReference::new();
        reference.insert("chr1", REF.to_vec());
        Arc::new(reference)
    }

    fn read(name: &str, start: u32, cigar: &str, bases: &[u8], qual: u8) -> AlignedRead {
        AlignedRead {
            name: name.into(),
            contig: "chr1".into(),
            start,
            cigar: Cigar::parse(cigar).unwrap(),
            bases: bases.to_vec(),
            qualities: vec![qual; bases.len()],
            mapping_quality: 60,
            is_reverse: false,
        }
    }

    fn generator(reads: Vec<AlignedRead>) -> PileupCandidateGenerator {
        let mut pipe = InMemoryReadPipe::new();
        pipe.add_sample("s", reads);
        PileupCandidateGenerator::new(reference(), Arc::new(pipe), PileupCandidateParams::default())
    }

    #[test]
    fn test_snv_candidates_require_support() {
        let mut alt = REF.to_vec();
        alt[10] = b'A';
        let generator = generator(vec![
            read("a", 0, "20M", &alt, 30),
            read("b", 0, "20M", &alt, 30),
            read("c", 0, "20M", REF, 30),
        ]);
        let region = GenomicRegion::new("chr1", 0, 20).unwrap();
        let candidates = generator.generate_candidates(&region).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0], Variant::new("chr1", 10, b"G", b"A"));
    }

    #[test]
    fn test_single_observation_is_dropped() {
        let mut alt = REF.to_vec();
        alt[10] = b'A';
        let generator = generator(vec![
            read("a", 0, "20M", &alt, 30),
            read("b", 0, "20M", REF, 30),
        ]);
        let region = GenomicRegion::new("chr1", 0, 20).unwrap();
        assert!(generator.generate_candidates(&region).unwrap().is_empty());
    }

    #[test]
    fn test_low_quality_mismatches_ignored() {
        let mut alt = REF.to_vec();
        alt[10] = b'A';
        let generator = generator(vec![
            read("a", 0, "20M", &alt, 5),
            read("b", 0, "20M", &alt, 5),
        ]);
        let region = GenomicRegion::new("chr1", 0, 20).unwrap();
        assert!(generator.generate_candidates(&region).unwrap().is_empty());
    }

    #[test]
    fn test_indel_candidates() {
        // 10M2D8M deletes reference positions 10..12
        let mut del_bases = REF[..10].to_vec();
        del_bases.extend_from_slice(&REF[12..]);
        // 10M2I10M inserts TT after position 9
        let mut ins_bases = REF[..10].to_vec();
        ins_bases.extend_from_slice(b"TT");
        ins_bases.extend_from_slice(&REF[10..]);
        let generator = generator(vec![
            read("d1", 0, "10M2D8M", &del_bases, 30),
            read("d2", 0, "10M2D8M", &del_bases, 30),
            read("i1", 0, "10M2I10M", &ins_bases, 30),
            read("i2", 0, "10M2I10M", &ins_bases, 30),
        ]);
        let region = GenomicRegion::new("chr1", 0, 20).unwrap();
        let candidates = generator.generate_candidates(&region).unwrap();
        assert!(candidates.iter().any(Variant::is_deletion));
        assert!(candidates.iter().any(Variant::is_insertion));
        // sorted by position
        let positions: Vec<u32> = candidates.iter().map(|v| v.region().begin).collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }
}
