//! # Fixed-Ploidy Genotype Likelihood
//!
//! ln p(reads | genotype) = sum over reads of
//! ln sum over haplotypes of p(read | haplotype) minus ln ploidy.
//! Ploidies one to three have dedicated paths (homozygous, 2-1 and
//! triallelic shapes); higher ploidies fall through to a vectorised
//! log-sum-exp over the genotype members.

use crate::data::genotype::Genotype;
use crate::model::likelihood::LikelihoodCache;
use crate::utils::maths::{log_sum_exp, log_sum_exp2, log_sum_exp3};

pub struct GermlineLikelihoodModel<'a> {
    likelihoods: &'a LikelihoodCache,
    sample: usize,
}

impl<'a> GermlineLikelihoodModel<'a> {
    pub fn new(likelihoods: &'a LikelihoodCache, sample: usize) -> Self {
        Self { likelihoods, sample }
    }

    pub fn evaluate(&self, genotype: &Genotype) -> f64 {
        match genotype.ploidy() {
            0 => 0.0,
            1 => self.evaluate_haploid(genotype),
            2 => self.evaluate_diploid(genotype),
            3 => self.evaluate_triploid(genotype),
            _ => self.evaluate_polyploid(genotype),
        }
    }

    fn evaluate_haploid(&self, genotype: &Genotype) -> f64 {
        self.likelihoods
            .log_likelihoods(self.sample, &genotype[0])
            .iter()
            .sum()
    }

    fn evaluate_diploid(&self, genotype: &Genotype) -> f64 {
        if genotype.is_homozygous() {
            return self.evaluate_haploid(genotype);
        }
        let ln_ploidy = 2f64.ln();
        let a = self.likelihoods.log_likelihoods(self.sample, &genotype[0]);
        let b = self.likelihoods.log_likelihoods(self.sample, &genotype[1]);
        a.iter()
            .zip(b)
            .map(|(&x, &y)| log_sum_exp2(x, y) - ln_ploidy)
            .sum()
    }

    fn evaluate_triploid(&self, genotype: &Genotype) -> f64 {
        if genotype.is_homozygous() {
            return self.evaluate_haploid(genotype);
        }
        let ln_ploidy = 3f64.ln();
        let a = self.likelihoods.log_likelihoods(self.sample, &genotype[0]);
        let b = self.likelihoods.log_likelihoods(self.sample, &genotype[1]);
        if genotype.zygosity() == 3 {
            let c = self.likelihoods.log_likelihoods(self.sample, &genotype[2]);
            return a
                .iter()
                .zip(b)
                .zip(c)
                .map(|((&x, &y), &z)| log_sum_exp3(x, y, z) - ln_ploidy)
                .sum();
        }
        // 2-1 shape: one haplotype doubled; members are sorted so the
        // duplicate pair is adjacent
        let (double, single) = if genotype[0] == genotype[1] {
            (a, self.likelihoods.log_likelihoods(self.sample, &genotype[2]))
        } else {
            (self.likelihoods.log_likelihoods(self.sample, &genotype[2]), a)
        };
        double
            .iter()
            .zip(single)
            .map(|(&d, &s)| log_sum_exp2(2f64.ln() + d, s) - ln_ploidy)
            .sum()
    }

    fn evaluate_polyploid(&self, genotype: &Genotype) -> f64 {
        if genotype.is_homozygous() {
            return self.evaluate_haploid(genotype);
        }
        let ln_ploidy = (genotype.ploidy() as f64).ln();
        let rows: Vec<&[f64]> = genotype
            .iter()
            .map(|h| self.likelihoods.log_likelihoods(self.sample, h))
            .collect();
        let num_reads = rows[0].len();
        let mut scratch = vec![0.0; rows.len()];
        let mut result = 0.0;
        for r in 0..num_reads {
            for (slot, row) in scratch.iter_mut().zip(&rows) {
                *slot = row[r];
            }
            result += log_sum_exp(&scratch) - ln_ploidy;
        }
        result
    }
}
