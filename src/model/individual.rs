//! # Individual Model
//!
//! The fixed-ploidy germline model: a closed-form posterior over genotypes
//! for one or more samples sharing the genotype, with no mixture
//! structure. log q(g) = log prior(g) + sum over samples of the
//! fixed-ploidy read likelihood; the evidence is the log-normaliser.

use crate::data::genotype::Genotype;
use crate::error::{Result, SomavarError};
use crate::model::genotype_likelihood::GermlineLikelihoodModel;
use crate::model::likelihood::LikelihoodCache;
use crate::utils::maths::{exp_normalised, normalise_logs};

/// Highest ploidy the genotype models dispatch.
pub const MAX_PLOIDY: u32 = 8;

#[derive(Clone, Debug)]
pub struct IndividualInferences {
    pub genotype_log_posteriors: Vec<f64>,
    pub genotype_posteriors: Vec<f64>,
    /// per-sample germline log-likelihood rows, reused by the seed
    /// machinery of the mixture models
    pub sample_log_likelihoods: Vec<Vec<f64>>,
    pub evidence: f64,
}

pub struct IndividualModel {
    ploidy: u32,
}

impl IndividualModel {
    pub fn new(ploidy: u32) -> Result<Self> {
        if ploidy == 0 || ploidy > MAX_PLOIDY {
            return Err(SomavarError::UnsupportedPloidy { ploidy });
        }
        Ok(Self { ploidy })
    }

    pub fn ploidy(&self) -> u32 {
        self.ploidy
    }

    /// Closed-form posterior over `genotypes` given normalised log priors.
    pub fn evaluate(
        &self,
        genotypes: &[Genotype],
        genotype_log_priors: &[f64],
        likelihoods: &LikelihoodCache,
    ) -> Result<IndividualInferences> {
        if genotypes.is_empty() {
            return Err(SomavarError::degenerate("no genotypes to evaluate"));
        }
        debug_assert!(genotypes.iter().all(|g| g.ploidy() == self.ploidy));
        debug_assert_eq!(genotypes.len(), genotype_log_priors.len());

        let num_samples = likelihoods.num_samples();
        let mut sample_log_likelihoods = Vec::with_capacity(num_samples);
        for sample in 0..num_samples {
            let model = GermlineLikelihoodModel::new(likelihoods, sample);
            sample_log_likelihoods.push(
                genotypes
                    .iter()
                    .map(|g| model.evaluate(g))
                    .collect::<Vec<f64>>(),
            );
        }

        let mut log_posteriors: Vec<f64> = genotype_log_priors.to_vec();
        for row in &sample_log_likelihoods {
            for (p, &l) in log_posteriors.iter_mut().zip(row) {
                *p += l;
            }
        }
        let evidence = normalise_logs(&mut log_posteriors);
        let genotype_posteriors = exp_normalised(&log_posteriors);
        Ok(IndividualInferences {
            genotype_log_posteriors: log_posteriors,
            genotype_posteriors,
            sample_log_likelihoods,
            evidence,
        })
    }
}
