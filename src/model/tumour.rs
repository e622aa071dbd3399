//! # Tumour Model
//!
//! Variational inference over cancer genotypes: mixture components are the
//! germline copies plus the subclonal somatic haplotypes, with one
//! Dirichlet per sample over the ploidy + somatic-ploidy slots. The
//! posterior is sharply multimodal, so the seed family is the heart of the
//! model: prior, per-sample germline and demoted likelihood/posterior
//! seeds, the multi-sample combination, and targeted seeds on the
//! top-likelihood germline runs.

use std::sync::atomic::AtomicBool;

use crate::data::genotype::{CancerGenotype, Genotype};
use crate::error::{Result, SomavarError};
use crate::model::genotype_likelihood::GermlineLikelihoodModel;
use crate::model::individual::MAX_PLOIDY;
use crate::model::likelihood::LikelihoodCache;
use crate::model::somatic::{calculate_cancer_log_priors, SomaticMutationModel};
use crate::model::vb::{
    self, credible_prefix_len, LikelihoodMatrix, SampleLikelihoods, VbLatents, VbParams,
};
use crate::utils::maths::normalise_logs;

/// A sample whose prior somatic mixture weight exceeds this expectation
/// contributes demoted likelihoods to the combined seed.
const SOMATIC_EXPECTATION_THRESHOLD: f64 = 0.05;

#[derive(Clone, Debug)]
pub struct TumourInferences {
    pub latents: VbLatents,
    pub genotype_log_priors: Vec<f64>,
}

pub struct TumourModel {
    ploidy: u32,
    somatic_ploidy: u32,
    params: VbParams,
    credible_mass: f64,
}

impl TumourModel {
    pub fn new(
        ploidy: u32,
        somatic_ploidy: u32,
        params: VbParams,
        credible_mass: f64,
    ) -> Result<Self> {
        if ploidy == 0 || ploidy > MAX_PLOIDY {
            return Err(SomavarError::UnsupportedPloidy { ploidy });
        }
        debug_assert!(somatic_ploidy >= 1);
        Ok(Self {
            ploidy,
            somatic_ploidy,
            params,
            credible_mass,
        })
    }

    pub fn evaluate(
        &self,
        genotypes: &[CancerGenotype],
        prior_alphas: &[Vec<f64>],
        prior_model: &SomaticMutationModel<'_>,
        likelihoods: &LikelihoodCache,
        cancel: Option<&AtomicBool>,
    ) -> Result<TumourInferences> {
        if genotypes.is_empty() {
            return Err(SomavarError::degenerate("no cancer genotypes to evaluate"));
        }
        let components = (self.ploidy + self.somatic_ploidy) as usize;
        debug_assert!(genotypes
            .iter()
            .all(|g| g.ploidy() == self.ploidy && g.somatic_ploidy() == self.somatic_ploidy));
        debug_assert!(prior_alphas.iter().all(|a| a.len() == components));

        let genotype_log_priors = calculate_cancer_log_priors(genotypes, prior_model);

        let num_samples = likelihoods.num_samples();
        let matrix = LikelihoodMatrix {
            samples: (0..num_samples)
                .map(|s| SampleLikelihoods {
                    genotypes: genotypes
                        .iter()
                        .map(|g| {
                            g.germline()
                                .iter()
                                .chain(g.somatic().iter())
                                .map(|h| likelihoods.log_likelihoods(s, h))
                                .collect()
                        })
                        .collect(),
                    num_reads: genotypes.first().map_or(0, |g| {
                        likelihoods.log_likelihoods(s, &g.germline()[0]).len()
                    }),
                })
                .collect(),
        };

        let seeds = self.generate_seeds(genotypes, &genotype_log_priors, prior_alphas, likelihoods);
        let latents = vb::run_variational_bayes(
            prior_alphas,
            &genotype_log_priors,
            &matrix,
            &self.params,
            seeds,
            cancel,
        );
        Ok(TumourInferences {
            latents,
            genotype_log_priors,
        })
    }

    fn num_weighted_seeds(&self, num_samples: usize) -> usize {
        1 + 4 * num_samples + 2 * usize::from(num_samples > 1)
    }

    fn generate_seeds(
        &self,
        genotypes: &[CancerGenotype],
        genotype_log_priors: &[f64],
        prior_alphas: &[Vec<f64>],
        likelihoods: &LikelihoodCache,
    ) -> Vec<Vec<f64>> {
        let num_samples = likelihoods.num_samples();
        if genotypes.len() <= self.params.max_seeds.min(self.num_weighted_seeds(num_samples)) {
            return vb::make_exhaustive_seeds(genotypes.len());
        }

        let mut seeds = Vec::with_capacity(self.params.max_seeds);
        seeds.push(vb::make_likelihood_seed(genotype_log_priors));

        let mut combined = vec![0.0; genotypes.len()];
        for sample in 0..num_samples {
            let model = GermlineLikelihoodModel::new(likelihoods, sample);
            let germline: Vec<f64> = genotypes
                .iter()
                .map(|g| model.evaluate(g.germline()))
                .collect();
            let demoted: Vec<f64> = genotypes
                .iter()
                .map(|g| model.evaluate(&g.demote()))
                .collect();
            let source = if is_somatic_expected(&prior_alphas[sample], self.ploidy) {
                &demoted
            } else {
                &germline
            };
            for (c, &l) in combined.iter_mut().zip(source) {
                *c += l;
            }
            seeds.push(vb::make_posterior_seed(genotype_log_priors, &germline));
            seeds.push(vb::make_likelihood_seed(&germline));
            seeds.push(vb::make_posterior_seed(genotype_log_priors, &demoted));
            seeds.push(vb::make_likelihood_seed(&demoted));
        }
        if num_samples > 1 {
            seeds.push(vb::make_posterior_seed(genotype_log_priors, &combined));
            seeds.push(vb::make_likelihood_seed(&combined));
        }
        if seeds.len() < self.params.max_seeds {
            let slots = self.params.max_seeds - seeds.len();
            let approx = seeds.last().expect("weighted seeds present").clone();
            self.generate_targeted_seeds(genotypes, &approx, slots, &mut seeds);
        }
        seeds.truncate(self.params.max_seeds);
        seeds
    }

    /// Range seeds over the top germline runs plus point seeds on the best
    /// run's strongest members. The germline selection takes the smallest
    /// set covering `credible_mass` of the approximate posterior.
    fn generate_targeted_seeds(
        &self,
        genotypes: &[CancerGenotype],
        approx_log_posterior: &[f64],
        mut slots: usize,
        seeds: &mut Vec<Vec<f64>>,
    ) {
        if slots == 0 {
            return;
        }
        // aggregate approximate mass per germline genotype
        let mut approx = approx_log_posterior.to_vec();
        normalise_logs(&mut approx);
        let mut germline_mass: Vec<(&Genotype, f64)> = Vec::new();
        for (g, &lp) in genotypes.iter().zip(&approx) {
            match germline_mass.iter_mut().find(|(k, _)| *k == g.germline()) {
                Some((_, mass)) => *mass += lp.exp(),
                None => germline_mass.push((g.germline(), lp.exp())),
            }
        }
        germline_mass.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        let masses: Vec<f64> = germline_mass.iter().map(|(_, m)| *m).collect();
        let selected = credible_prefix_len(&masses, self.credible_mass).min(slots);

        for (germline, _) in germline_mass.iter().take(selected) {
            if let Some(begin) = genotypes.iter().position(|g| g.germline() == *germline) {
                let len = genotypes[begin..]
                    .iter()
                    .take_while(|g| g.germline() == *germline)
                    .count();
                seeds.push(vb::make_range_seed(genotypes.len(), begin, len));
                slots -= 1;
                if slots == 0 {
                    return;
                }
            }
        }

        // point seeds on the strongest individual members of the best run
        let best_germline = germline_mass.first().map(|(g, _)| *g);
        let mut ranked: Vec<(usize, f64)> = genotypes
            .iter()
            .enumerate()
            .filter(|(_, g)| Some(g.germline()) == best_germline)
            .map(|(i, _)| (i, approx[i]))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        for (index, _) in ranked.into_iter().take(slots) {
            seeds.push(vb::make_point_seed(genotypes.len(), index));
        }
    }
}

/// Whether the prior Dirichlet expects a visible somatic fraction.
fn is_somatic_expected(alphas: &[f64], ploidy: u32) -> bool {
    let total: f64 = alphas.iter().sum();
    let somatic: f64 = alphas[ploidy as usize..].iter().sum();
    somatic / total > SOMATIC_EXPECTATION_THRESHOLD
}
