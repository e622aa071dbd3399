//! # Haplotype Likelihood Cache
//!
//! Computes and stores log P(read | haplotype) for every (sample, read,
//! haplotype) triple in the current window. Populated in a single sweep
//! with the outer loop over haplotypes, so the kmer index and offset
//! counters are reused as scratch, and read-only afterwards.
//! `log_likelihoods` returns a contiguous per-sample slice ordered like
//! the sample's read list.

use std::cell::Cell;
use std::collections::HashMap;

use tracing::debug;

use crate::data::haplotype::{Haplotype, HaplotypeRef};
use crate::data::{AlignedRead, SampleName};
use crate::error::{Result, SomavarError};
use crate::model::kmer::{compute_kmer_hashes, map_query_to_target, KmerIndex, MappingCounts};
use crate::model::pair_hmm::{log_viterbi, FlankModel, PairHmmParams};

/// Extra target bases taken either side of a candidate offset when slicing
/// the haplotype for alignment.
const ALIGNMENT_PAD: usize = 16;

#[derive(Debug, Default)]
pub struct LikelihoodCache {
    cache: HashMap<HaplotypeRef, Vec<Vec<f64>>>,
    samples: Vec<SampleName>,
    sample_indices: HashMap<SampleName, usize>,
    primed: Cell<usize>,
    params: PairHmmParams,
}

impl LikelihoodCache {
    pub fn new(params: PairHmmParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn samples(&self) -> &[SampleName] {
        &self.samples
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn sample_index(&self, sample: &str) -> Option<usize> {
        self.sample_indices.get(sample).copied()
    }

    /// Fill the cache for every (sample, read, haplotype) triple.
    ///
    /// `reads` must be ordered consistently with later `log_likelihoods`
    /// consumers: slot `i` of a returned slice is read `i` of the sample.
    pub fn populate(
        &mut self,
        reads: &[(SampleName, Vec<AlignedRead>)],
        haplotypes: &[HaplotypeRef],
    ) -> Result<()> {
        self.cache.clear();
        self.samples.clear();
        self.sample_indices.clear();
        self.primed.set(0);

        for (i, (sample, _)) in reads.iter().enumerate() {
            self.samples.push(sample.clone());
            self.sample_indices.insert(sample.clone(), i);
        }

        // hash every read once; the outer loop below is over haplotypes
        let read_hashes: Vec<Vec<Vec<Option<u64>>>> = reads
            .iter()
            .map(|(_, sample_reads)| {
                sample_reads
                    .iter()
                    .map(|r| compute_kmer_hashes(&r.bases))
                    .collect()
            })
            .collect();

        let mut index = KmerIndex::new();
        let mut counts = MappingCounts::new();

        for haplotype in haplotypes {
            index.rebuild(haplotype.sequence());
            let mut per_sample = Vec::with_capacity(reads.len());
            for ((_, sample_reads), hashes) in reads.iter().zip(&read_hashes) {
                let mut likelihoods = Vec::with_capacity(sample_reads.len());
                for (read, read_hash) in sample_reads.iter().zip(hashes) {
                    let offsets = map_query_to_target(
                        read_hash,
                        &index,
                        &mut counts,
                        haplotype.len(),
                    );
                    likelihoods.push(self.align(read, haplotype, &offsets));
                }
                per_sample.push(likelihoods);
            }
            self.cache.insert(haplotype.clone(), per_sample);
        }
        debug!(
            haplotypes = haplotypes.len(),
            samples = reads.len(),
            "populated haplotype likelihood cache"
        );
        Ok(())
    }

    fn align(&self, read: &AlignedRead, haplotype: &Haplotype, offsets: &[usize]) -> f64 {
        let flank = FlankModel::from_regions(read.region(), haplotype.window(), &self.params);
        let target = haplotype.sequence();
        let evaluate = |offset: usize| {
            let begin = offset.saturating_sub(ALIGNMENT_PAD);
            let end = (offset + read.len() + ALIGNMENT_PAD).min(target.len());
            log_viterbi(&target[begin..end], &read.bases, &read.qualities, &self.params, &flank)
        };
        if offsets.is_empty() {
            // no kmer anchored the read; fall back to the position-implied offset
            let implied = read
                .start
                .saturating_sub(haplotype.window().begin) as usize;
            return evaluate(implied.min(target.len().saturating_sub(1)));
        }
        offsets
            .iter()
            .map(|&o| evaluate(o))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Per-read log-likelihood slice for a sample index.
    ///
    /// Asking for a haplotype that was not populated is a programming
    /// error.
    pub fn log_likelihoods(&self, sample: usize, haplotype: &HaplotypeRef) -> &[f64] {
        &self
            .cache
            .get(haplotype)
            .expect("haplotype absent from likelihood cache")[sample]
    }

    /// Select a sample so `primed_likelihoods` skips the name lookup.
    pub fn prime(&self, sample: &str) -> Result<()> {
        match self.sample_index(sample) {
            Some(i) => {
                self.primed.set(i);
                Ok(())
            }
            None => Err(SomavarError::config(format!("unknown sample: {sample}"))),
        }
    }

    pub fn primed_likelihoods(&self, haplotype: &HaplotypeRef) -> &[f64] {
        self.log_likelihoods(self.primed.get(), haplotype)
    }

    pub fn contains(&self, haplotype: &HaplotypeRef) -> bool {
        self.cache.contains_key(haplotype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::allele::ContigAllele;
    use crate::data::read::Cigar;
    use crate::data::ContigRegion;
    use std::sync::Arc;

    const REF: &[u8] = b"ACGTACGTACGTACGTACGT";
    const WINDOW: ContigRegion = ContigRegion { begin: 0, end: 20 };

    fn hap(alleles: Vec<ContigAllele>) -> HaplotypeRef {
        Arc::new(Haplotype::new("chr1", WINDOW, REF, alleles).unwrap())
    }

    fn read(name: &str, start: u32, bases: &[u8]) -> AlignedRead {
        AlignedRead {
            name: name.into(),
            contig: "chr1".into(),
            start,
            cigar: Cigar::parse(&format!("{}M", bases.len())).unwrap(),
            bases: bases.to_vec(),
            qualities: vec![30; bases.len()],
            mapping_quality: 60,
            is_reverse: false,
        }
    }

    #[test]
    fn test_slice_lengths_match_read_counts() {
        let reference = hap(vec![]);
        let alt = hap(vec![ContigAllele::new(ContigRegion::new(10, 11), *b"A")]);
        let reads = vec![
            (
                "s1".to_string(),
                vec![read("a", 0, REF), read("b", 0, REF), read("c", 0, REF)],
            ),
            ("s2".to_string(), vec![read("d", 0, REF)]),
        ];
        let mut cache = LikelihoodCache::new(PairHmmParams::default());
        cache
            .populate(&reads, &[reference.clone(), alt.clone()])
            .unwrap();
        assert_eq!(cache.log_likelihoods(0, &reference).len(), 3);
        assert_eq!(cache.log_likelihoods(1, &reference).len(), 1);
        assert_eq!(cache.log_likelihoods(0, &alt).len(), 3);
    }

    #[test]
    fn test_cache_discriminates_haplotypes() {
        let reference = hap(vec![]);
        let alt_hap = hap(vec![ContigAllele::new(ContigRegion::new(10, 11), *b"A")]);
        let mut alt_bases = REF.to_vec();
        alt_bases[10] = b'A';
        let reads = vec![(
            "s1".to_string(),
            vec![read("ref", 0, REF), read("alt", 0, &alt_bases)],
        )];
        let mut cache = LikelihoodCache::new(PairHmmParams::default());
        cache
            .populate(&reads, &[reference.clone(), alt_hap.clone()])
            .unwrap();
        let vs_ref = cache.log_likelihoods(0, &reference);
        let vs_alt = cache.log_likelihoods(0, &alt_hap);
        // the reference read prefers the reference haplotype and vice versa
        assert!(vs_ref[0] > vs_alt[0]);
        assert!(vs_alt[1] > vs_ref[1]);
    }

    #[test]
    fn test_prime_selects_sample() {
        let reference = hap(vec![]);
        let reads = vec![
            ("s1".to_string(), vec![read("a", 0, REF)]),
            ("s2".to_string(), vec![read("b", 0, REF), read("c", 0, REF)]),
        ];
        let mut cache = LikelihoodCache::new(PairHmmParams::default());
        cache.populate(&reads, &[reference.clone()]).unwrap();
        cache.prime("s2").unwrap();
        assert_eq!(cache.primed_likelihoods(&reference).len(), 2);
        assert!(cache.prime("nope").is_err());
    }

    #[test]
    fn test_overhanging_read_is_not_crushed() {
        // a read sticking 8bp past the window edge still aligns
        let reference = hap(vec![]);
        let mut bases = REF.to_vec();
        bases.extend_from_slice(b"TTTTTTTT");
        let reads = vec![("s1".to_string(), vec![read("over", 0, &bases)])];
        let mut cache = LikelihoodCache::new(PairHmmParams::default());
        cache.populate(&reads, &[reference.clone()]).unwrap();
        let ll = cache.log_likelihoods(0, &reference)[0];
        assert!(ll.is_finite());
        // far better than a fully random alignment would be
        assert!(ll > bases.len() as f64 * 0.25f64.ln());
    }
}
