//! # CNV Model
//!
//! The copy-number mixture: identical ploidy across the mixture and one
//! Dirichlet over haplotype proportions per sample, so allelic imbalance
//! (as produced by copy-number events) can be explained without somatic
//! haplotypes. Shares the variational skeleton with the tumour model,
//! minus the somatic and demoted seed classes.

use std::sync::atomic::AtomicBool;

use crate::data::genotype::Genotype;
use crate::error::{Result, SomavarError};
use crate::model::genotype_likelihood::GermlineLikelihoodModel;
use crate::model::individual::MAX_PLOIDY;
use crate::model::likelihood::LikelihoodCache;
use crate::model::vb::{
    self, LikelihoodMatrix, SampleLikelihoods, VbLatents, VbParams,
};

pub struct CnvModel {
    ploidy: u32,
    params: VbParams,
}

impl CnvModel {
    pub fn new(ploidy: u32, params: VbParams) -> Result<Self> {
        if ploidy == 0 || ploidy > MAX_PLOIDY {
            return Err(SomavarError::UnsupportedPloidy { ploidy });
        }
        Ok(Self { ploidy, params })
    }

    /// Infer the mixture posterior over `genotypes`.
    ///
    /// `prior_alphas` holds one Dirichlet prior per sample over the
    /// `ploidy` mixture slots; `genotype_log_priors` must be normalised.
    pub fn evaluate(
        &self,
        genotypes: &[Genotype],
        genotype_log_priors: &[f64],
        prior_alphas: &[Vec<f64>],
        likelihoods: &LikelihoodCache,
        cancel: Option<&AtomicBool>,
    ) -> Result<VbLatents> {
        if genotypes.is_empty() {
            return Err(SomavarError::degenerate("no genotypes to evaluate"));
        }
        debug_assert!(genotypes.iter().all(|g| g.ploidy() == self.ploidy));
        debug_assert!(prior_alphas
            .iter()
            .all(|a| a.len() == self.ploidy as usize));

        let num_samples = likelihoods.num_samples();
        let matrix = LikelihoodMatrix {
            samples: (0..num_samples)
                .map(|s| SampleLikelihoods {
                    genotypes: genotypes
                        .iter()
                        .map(|g| {
                            g.iter()
                                .map(|h| likelihoods.log_likelihoods(s, h))
                                .collect()
                        })
                        .collect(),
                    num_reads: genotypes
                        .first()
                        .map_or(0, |g| likelihoods.log_likelihoods(s, &g[0]).len()),
                })
                .collect(),
        };

        let seeds = self.generate_seeds(genotypes, genotype_log_priors, likelihoods);
        Ok(vb::run_variational_bayes(
            prior_alphas,
            genotype_log_priors,
            &matrix,
            &self.params,
            seeds,
            cancel,
        ))
    }

    /// Seed classes: the prior, per-sample likelihoods and posteriors, the
    /// multi-sample combination, or the exhaustive point set when the
    /// genotype space is small.
    fn generate_seeds(
        &self,
        genotypes: &[Genotype],
        genotype_log_priors: &[f64],
        likelihoods: &LikelihoodCache,
    ) -> Vec<Vec<f64>> {
        let num_samples = likelihoods.num_samples();
        let num_weighted = 1 + 2 * num_samples + 2 * usize::from(num_samples > 1);
        if genotypes.len() <= self.params.max_seeds.min(num_weighted) {
            return vb::make_exhaustive_seeds(genotypes.len());
        }
        let mut seeds = Vec::with_capacity(num_weighted);
        seeds.push(vb::make_likelihood_seed(genotype_log_priors));
        let mut combined = vec![0.0; genotypes.len()];
        for sample in 0..num_samples {
            let model = GermlineLikelihoodModel::new(likelihoods, sample);
            let log_likelihoods: Vec<f64> = genotypes.iter().map(|g| model.evaluate(g)).collect();
            for (c, &l) in combined.iter_mut().zip(&log_likelihoods) {
                *c += l;
            }
            seeds.push(vb::make_posterior_seed(genotype_log_priors, &log_likelihoods));
            seeds.push(vb::make_likelihood_seed(&log_likelihoods));
        }
        if num_samples > 1 {
            seeds.push(vb::make_posterior_seed(genotype_log_priors, &combined));
            seeds.push(vb::make_likelihood_seed(&combined));
        }
        seeds.truncate(self.params.max_seeds);
        seeds
    }
}
