//! # Genotypes
//!
//! A genotype is an unordered multiset of haplotypes with fixed cardinality
//! (the ploidy). The cancer genotype pairs a germline genotype with one or
//! more subclonal somatic haplotypes; `demote` flattens the pair back into
//! an ordinary genotype of size ploidy + somatic ploidy.

use itertools::Itertools;

use crate::data::haplotype::HaplotypeRef;

/// Unordered multiset of haplotypes; members are kept sorted so that
/// structural equality and hashing see one canonical order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Genotype {
    haplotypes: Vec<HaplotypeRef>,
}

impl Genotype {
    pub fn new(mut haplotypes: Vec<HaplotypeRef>) -> Self {
        haplotypes.sort();
        Self { haplotypes }
    }

    pub fn ploidy(&self) -> u32 {
        self.haplotypes.len() as u32
    }

    /// Number of distinct members.
    pub fn zygosity(&self) -> u32 {
        let mut distinct = 0u32;
        for (i, h) in self.haplotypes.iter().enumerate() {
            if i == 0 || self.haplotypes[i - 1] != *h {
                distinct += 1;
            }
        }
        distinct
    }

    pub fn is_homozygous(&self) -> bool {
        self.zygosity() <= 1
    }

    pub fn count(&self, haplotype: &HaplotypeRef) -> u32 {
        self.haplotypes.iter().filter(|h| *h == haplotype).count() as u32
    }

    pub fn contains(&self, haplotype: &HaplotypeRef) -> bool {
        self.haplotypes.binary_search(haplotype).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HaplotypeRef> {
        self.haplotypes.iter()
    }

    pub fn haplotypes(&self) -> &[HaplotypeRef] {
        &self.haplotypes
    }
}

impl std::ops::Index<usize> for Genotype {
    type Output = HaplotypeRef;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.haplotypes[idx]
    }
}

/// All genotypes of the given ploidy over a haplotype set, enumerated as
/// multisets (order-free combinations with repetition).
pub fn enumerate_genotypes(haplotypes: &[HaplotypeRef], ploidy: u32) -> Vec<Genotype> {
    haplotypes
        .iter()
        .cloned()
        .combinations_with_replacement(ploidy as usize)
        .map(Genotype::new)
        .collect()
}

/// A germline genotype paired with subclonal somatic haplotypes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CancerGenotype {
    germline: Genotype,
    somatic: Genotype,
}

impl CancerGenotype {
    pub fn new(germline: Genotype, somatic: Genotype) -> Self {
        debug_assert!(somatic.ploidy() >= 1);
        Self { germline, somatic }
    }

    pub fn germline(&self) -> &Genotype {
        &self.germline
    }

    pub fn somatic(&self) -> &Genotype {
        &self.somatic
    }

    pub fn ploidy(&self) -> u32 {
        self.germline.ploidy()
    }

    pub fn somatic_ploidy(&self) -> u32 {
        self.somatic.ploidy()
    }

    /// Flatten germline and somatic components into one genotype of size
    /// ploidy + somatic ploidy.
    pub fn demote(&self) -> Genotype {
        let mut haplotypes = self.germline.haplotypes().to_vec();
        haplotypes.extend(self.somatic.haplotypes().iter().cloned());
        Genotype::new(haplotypes)
    }
}

/// Pair every germline genotype with every haplotype outside it (somatic
/// ploidy one). The result is ordered by germline genotype, matching the
/// run-structure the targeted variational seeds rely on.
pub fn enumerate_cancer_genotypes(
    germline_genotypes: &[Genotype],
    haplotypes: &[HaplotypeRef],
) -> Vec<CancerGenotype> {
    let mut result = Vec::new();
    for germline in germline_genotypes {
        for haplotype in haplotypes {
            if !germline.contains(haplotype) {
                result.push(CancerGenotype::new(
                    germline.clone(),
                    Genotype::new(vec![haplotype.clone()]),
                ));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::haplotype::Haplotype;
    use crate::data::{ContigAllele, ContigRegion};
    use std::sync::Arc;

    fn haps(n: usize) -> Vec<HaplotypeRef> {
        let window = ContigRegion::new(0, 4);
        (0..n)
            .map(|i| {
                let allele = ContigAllele::new(ContigRegion::new(1, 2), vec![b'A' + i as u8]);
                Arc::new(Haplotype::new("chr1", window, b"ACGT", vec![allele]).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_zygosity_and_count() {
        let h = haps(2);
        let hom = Genotype::new(vec![h[0].clone(), h[0].clone()]);
        let het = Genotype::new(vec![h[0].clone(), h[1].clone()]);
        assert!(hom.is_homozygous());
        assert_eq!(hom.zygosity(), 1);
        assert_eq!(het.zygosity(), 2);
        assert_eq!(het.count(&h[0]), 1);
        assert_eq!(hom.count(&h[0]), 2);
        assert!(het.contains(&h[1]));
    }

    #[test]
    fn test_genotype_is_unordered() {
        let h = haps(2);
        let a = Genotype::new(vec![h[0].clone(), h[1].clone()]);
        let b = Genotype::new(vec![h[1].clone(), h[0].clone()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_enumeration_counts() {
        // C(n + p - 1, p) multisets
        let h = haps(3);
        assert_eq!(enumerate_genotypes(&h, 1).len(), 3);
        assert_eq!(enumerate_genotypes(&h, 2).len(), 6);
        assert_eq!(enumerate_genotypes(&h, 3).len(), 10);
    }

    #[test]
    fn test_cancer_genotype_demote() {
        let h = haps(3);
        let germline = Genotype::new(vec![h[0].clone(), h[1].clone()]);
        let cg = CancerGenotype::new(germline, Genotype::new(vec![h[2].clone()]));
        assert_eq!(cg.ploidy(), 2);
        assert_eq!(cg.somatic_ploidy(), 1);
        let demoted = cg.demote();
        assert_eq!(demoted.ploidy(), 3);
        assert!(demoted.contains(&h[2]));
    }

    #[test]
    fn test_cancer_enumeration_excludes_members() {
        let h = haps(2);
        let germline = enumerate_genotypes(&h, 2);
        let cancer = enumerate_cancer_genotypes(&germline, &h);
        // {aa}+b, {bb}+a; the heterozygote has no outside haplotype
        assert_eq!(cancer.len(), 2);
        for cg in &cancer {
            assert!(!cg.germline().contains(&cg.somatic()[0]));
        }
    }
}
