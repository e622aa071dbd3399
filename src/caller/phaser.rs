//! # Phaser
//!
//! Partitions a haplotype window into maximal contiguous regions within
//! which a sample's genotype posterior concentrates on a single phase
//! complement class. Two genotypes are phase complements over a partition
//! range when their per-partition allele multisets agree everywhere in the
//! range: they carry the same local content and differ only in how it is
//! distributed across the homologous copies. The phase score of a range is
//!
//! `sum over classes of marginal(class) * (1 - H(class) / log2 |class|)`
//!
//! clipped to [0, 1] and reported as the Phred of its complement. Ranges
//! failing the minimum score shrink greedily from the right.

use std::collections::HashMap;

use crate::data::allele::ContigAllele;
use crate::data::genotype::Genotype;
use crate::data::{ContigRegion, SampleName, Variant};
use crate::utils::maths::Phred;

/// A maximal region phased as one unit for one sample.
#[derive(Clone, Debug)]
pub struct PhaseRegion {
    pub region: ContigRegion,
    pub score: Phred,
}

/// Per-sample phase regions tiling the window.
#[derive(Clone, Debug)]
pub struct PhaseSet {
    pub region: ContigRegion,
    pub sample_regions: Vec<(SampleName, Vec<PhaseRegion>)>,
}

impl PhaseSet {
    /// The phase region containing a position, for one sample.
    pub fn region_at(&self, sample: &str, position: u32) -> Option<&PhaseRegion> {
        self.sample_regions
            .iter()
            .find(|(name, _)| name == sample)
            .and_then(|(_, regions)| {
                regions
                    .iter()
                    .find(|r| r.region.begin <= position && position < r.region.end)
            })
    }
}

/// A haplotype restricted to a partition range: its committed alleles in
/// each partition slot.
type HaplotypeSplice = Vec<Vec<ContigAllele>>;

/// A genotype restricted to a partition range: the sorted multiset of its
/// haplotype splices. Identifies the local *phased* content.
type SpliceKey = Vec<HaplotypeSplice>;

/// Per-partition allele multisets, pooling the haplotypes. Identifies the
/// local *unphased* content; splices sharing a class key are phase
/// complements of each other.
type ComplementKey = Vec<Vec<Vec<ContigAllele>>>;

pub struct Phaser {
    min_phase_score: Phred,
}

impl Phaser {
    pub fn new(min_phase_score: Phred) -> Self {
        Self { min_phase_score }
    }

    /// Phase every sample over `window`, tiling it completely.
    pub fn force_phase(
        &self,
        window: ContigRegion,
        candidates: &[Variant],
        genotype_posteriors: &[(SampleName, Vec<(Genotype, f64)>)],
    ) -> PhaseSet {
        let partitions = covered_partitions(candidates);
        let sample_regions = genotype_posteriors
            .iter()
            .map(|(sample, posteriors)| {
                let ploidy = posteriors.first().map_or(0, |(g, _)| g.ploidy());
                let regions = if partitions.len() <= 1 || ploidy <= 1 {
                    vec![PhaseRegion {
                        region: window,
                        score: Phred::from_error_probability(0.0),
                    }]
                } else {
                    self.phase_sample(window, &partitions, posteriors)
                };
                (sample.clone(), regions)
            })
            .collect();
        PhaseSet {
            region: window,
            sample_regions,
        }
    }

    fn phase_sample(
        &self,
        window: ContigRegion,
        partitions: &[ContigRegion],
        posteriors: &[(Genotype, f64)],
    ) -> Vec<PhaseRegion> {
        let mut regions = Vec::new();
        let mut left = 0;
        let mut right = partitions.len();
        let mut bound = window.begin;
        while left < partitions.len() {
            let score = phase_score(&partitions[left..right], posteriors);
            if score.value() >= self.min_phase_score.value() || right - left == 1 {
                let end = if right == partitions.len() {
                    window.end
                } else {
                    partitions[right].begin
                };
                regions.push(PhaseRegion {
                    region: ContigRegion::new(bound, end),
                    score,
                });
                bound = end;
                left = right;
                right = partitions.len();
            } else {
                right -= 1;
            }
        }
        regions
    }
}

/// Merge overlapping candidate regions into sorted disjoint partitions.
fn covered_partitions(candidates: &[Variant]) -> Vec<ContigRegion> {
    let mut regions: Vec<ContigRegion> = candidates.iter().map(|v| v.region()).collect();
    regions.sort();
    let mut merged: Vec<ContigRegion> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(last) if region.overlaps(last) || last.end == region.begin && region.is_empty() => {
                *last = last.encompass(&region);
            }
            _ => merged.push(region),
        }
    }
    merged
}

fn haplotype_splice(
    genotype: &Genotype,
    member: usize,
    partitions: &[ContigRegion],
) -> HaplotypeSplice {
    partitions
        .iter()
        .map(|p| {
            genotype[member]
                .alleles()
                .iter()
                .filter(|a| p.overlaps(&a.region()) || p.contains(&a.region()))
                .cloned()
                .collect()
        })
        .collect()
}

fn splice_key(genotype: &Genotype, partitions: &[ContigRegion]) -> SpliceKey {
    let mut splices: Vec<HaplotypeSplice> = (0..genotype.ploidy() as usize)
        .map(|m| haplotype_splice(genotype, m, partitions))
        .collect();
    splices.sort();
    splices
}

fn complement_key(splice: &SpliceKey, num_partitions: usize) -> ComplementKey {
    (0..num_partitions)
        .map(|p| {
            let mut slot: Vec<Vec<ContigAllele>> =
                splice.iter().map(|hap| hap[p].clone()).collect();
            slot.sort();
            slot
        })
        .collect()
}

/// Phred of the complement of the summed class scores.
fn phase_score(partitions: &[ContigRegion], posteriors: &[(Genotype, f64)]) -> Phred {
    // marginalise posteriors over local phased content
    let mut splices: HashMap<SpliceKey, f64> = HashMap::new();
    for (genotype, posterior) in posteriors {
        *splices.entry(splice_key(genotype, partitions)).or_insert(0.0) += posterior;
    }
    // group phase complements
    let mut classes: HashMap<ComplementKey, Vec<f64>> = HashMap::new();
    for (splice, posterior) in &splices {
        classes
            .entry(complement_key(splice, partitions.len()))
            .or_default()
            .push(*posterior);
    }
    let mut score = 0.0;
    for members in classes.values() {
        let marginal: f64 = members.iter().sum();
        if marginal <= 0.0 {
            continue;
        }
        score += marginal * relative_certainty(members, marginal);
    }
    Phred::from_error_probability((1.0 - score.clamp(0.0, 1.0)).max(0.0))
}

/// `1 - H / log2(n)` over the class members, 1 for singletons.
fn relative_certainty(members: &[f64], marginal: f64) -> f64 {
    if members.len() < 2 {
        return 1.0;
    }
    let entropy: f64 = members
        .iter()
        .filter(|&&m| m > 0.0)
        .map(|&m| {
            let p = m / marginal;
            -p * p.log2()
        })
        .sum();
    (1.0 - entropy / (members.len() as f64).log2()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::haplotype::{Haplotype, HaplotypeRef};
    use std::sync::Arc;

    const REF: &[u8] = b"ACGTACGTACGTACGTACGT";
    const WINDOW: ContigRegion = ContigRegion { begin: 0, end: 20 };

    fn hap(alts: &[(u32, u8)]) -> HaplotypeRef {
        let alleles = alts
            .iter()
            .map(|&(pos, base)| ContigAllele::new(ContigRegion::new(pos, pos + 1), vec![base]))
            .collect();
        Arc::new(Haplotype::new("chr1", WINDOW, REF, alleles).unwrap())
    }

    fn di_snp_genotypes() -> (Genotype, Genotype) {
        // sites 5 (A>T) and 10 (G>A); both haplotype pairs are
        // heterozygous at both sites
        let rr = hap(&[]);
        let aa = hap(&[(5, b'T'), (10, b'A')]);
        let ar = hap(&[(5, b'T')]);
        let ra = hap(&[(10, b'A')]);
        let cis = Genotype::new(vec![rr, aa]);
        let trans = Genotype::new(vec![ar, ra]);
        (cis, trans)
    }

    fn candidates() -> Vec<Variant> {
        vec![
            Variant::new("chr1", 5, b"A", b"T"),
            Variant::new("chr1", 10, b"G", b"A"),
        ]
    }

    #[test]
    fn test_concentrated_posterior_phases_as_one_region() {
        let (cis, trans) = di_snp_genotypes();
        let posteriors = vec![("s".to_string(), vec![(cis, 0.9999), (trans, 0.0001)])];
        let phaser = Phaser::new(Phred(20.0));
        let set = phaser.force_phase(WINDOW, &candidates(), &posteriors);
        let regions = &set.sample_regions[0].1;
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].region, WINDOW);
        assert!(regions[0].score.value() >= 20.0);
    }

    #[test]
    fn test_flat_posterior_splits_into_two_regions() {
        let (cis, trans) = di_snp_genotypes();
        let posteriors = vec![("s".to_string(), vec![(cis, 0.5), (trans, 0.5)])];
        let phaser = Phaser::new(Phred(20.0));
        let set = phaser.force_phase(WINDOW, &candidates(), &posteriors);
        let regions = &set.sample_regions[0].1;
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn test_regions_tile_the_window() {
        let (cis, trans) = di_snp_genotypes();
        for split in [0.5, 0.9, 0.999] {
            let posteriors = vec![(
                "s".to_string(),
                vec![(cis.clone(), split), (trans.clone(), 1.0 - split)],
            )];
            let set = Phaser::new(Phred(20.0)).force_phase(WINDOW, &candidates(), &posteriors);
            let regions = &set.sample_regions[0].1;
            let total: u32 = regions.iter().map(|r| r.region.len()).sum();
            assert_eq!(total, WINDOW.len());
            for pair in regions.windows(2) {
                assert_eq!(pair[0].region.end, pair[1].region.begin);
            }
            assert_eq!(regions.first().unwrap().region.begin, WINDOW.begin);
            assert_eq!(regions.last().unwrap().region.end, WINDOW.end);
        }
    }

    #[test]
    fn test_single_candidate_is_one_maximal_region() {
        let (cis, _) = di_snp_genotypes();
        let posteriors = vec![("s".to_string(), vec![(cis, 1.0)])];
        let set = Phaser::new(Phred(20.0)).force_phase(
            WINDOW,
            &[Variant::new("chr1", 5, b"A", b"T")],
            &posteriors,
        );
        let regions = &set.sample_regions[0].1;
        assert_eq!(regions.len(), 1);
        assert!(regions[0].score.value() > 100.0);
    }

    #[test]
    fn test_haploid_is_one_region() {
        let haploid = Genotype::new(vec![hap(&[(5, b'T')])]);
        let posteriors = vec![("s".to_string(), vec![(haploid, 1.0)])];
        let set = Phaser::new(Phred(20.0)).force_phase(WINDOW, &candidates(), &posteriors);
        assert_eq!(set.sample_regions[0].1.len(), 1);
    }

    #[test]
    fn test_region_lookup_by_position() {
        let (cis, _) = di_snp_genotypes();
        let posteriors = vec![("s".to_string(), vec![(cis, 1.0)])];
        let set = Phaser::new(Phred(20.0)).force_phase(WINDOW, &candidates(), &posteriors);
        assert!(set.region_at("s", 5).is_some());
        assert!(set.region_at("missing", 5).is_none());
    }
}
