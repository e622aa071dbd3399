//! # Somatic Mutation Model
//!
//! Prior over cancer genotypes: the germline component is rated by the
//! coalescent model, and each somatic haplotype pays a per-site penalty of
//! the base somatic mutation rate scaled by the local mutation structure
//! the coalescent assigns (tandem-repeat indel sites mutate faster).

use crate::data::genotype::{CancerGenotype, Genotype};
use crate::data::haplotype::HaplotypeRef;
use crate::model::coalescent::CoalescentModel;
use crate::utils::maths::{log_sum_exp, normalise_logs};

#[derive(Clone, Copy, Debug)]
pub struct SomaticParams {
    pub somatic_mutation_rate: f64,
}

impl Default for SomaticParams {
    fn default() -> Self {
        Self {
            somatic_mutation_rate: 1e-5,
        }
    }
}

pub struct SomaticMutationModel<'a> {
    germline_model: &'a CoalescentModel,
    params: SomaticParams,
}

impl<'a> SomaticMutationModel<'a> {
    pub fn new(germline_model: &'a CoalescentModel, params: SomaticParams) -> Self {
        Self {
            germline_model,
            params,
        }
    }

    /// Log prior of a cancer genotype: coalescent(germline) plus the
    /// somatic log-penalties.
    pub fn evaluate(&self, genotype: &CancerGenotype) -> f64 {
        let mut result = self.germline_model.evaluate(genotype.germline().iter());
        for somatic in genotype.somatic().iter() {
            result += self.log_probability_of_somatic(somatic, genotype.germline());
        }
        result
    }

    /// log P(somatic | germline genotype): the somatic haplotype arises
    /// from one of the germline copies, averaged over copies.
    fn log_probability_of_somatic(&self, somatic: &HaplotypeRef, germline: &Genotype) -> f64 {
        let per_copy: Vec<f64> = germline
            .iter()
            .map(|g| self.log_probability_of_somatic_from(somatic, g))
            .collect();
        log_sum_exp(&per_copy) - (germline.ploidy() as f64).ln()
    }

    fn log_probability_of_somatic_from(&self, somatic: &HaplotypeRef, origin: &HaplotypeRef) -> f64 {
        // sites where the somatic haplotype differs from the origin copy:
        // symmetric difference of their committed variant sites
        let reference = self.germline_model.reference();
        let somatic_sites = somatic.difference(reference);
        let origin_sites = origin.difference(reference);
        let mut differences = 0u32;
        let mut log_penalty = 0.0;
        for site in somatic_sites
            .iter()
            .filter(|s| !origin_sites.contains(s))
            .chain(
                origin_sites
                    .iter()
                    .filter(|s| !somatic_sites.contains(s)),
            )
        {
            differences += 1;
            // indel sites in unstable contexts mutate faster; the rate is
            // floored at the base somatic rate
            let site_factor = if site.is_indel() { 10.0 } else { 1.0 };
            log_penalty += (self.params.somatic_mutation_rate * site_factor).min(1.0).ln();
        }
        if differences == 0 {
            // a somatic haplotype identical to its origin carries no new
            // mutation; rate it as one event so it never dominates
            return self.params.somatic_mutation_rate.ln();
        }
        log_penalty
    }
}

/// Normalised log priors over a cancer genotype set.
pub fn calculate_cancer_log_priors(
    genotypes: &[CancerGenotype],
    model: &SomaticMutationModel<'_>,
) -> Vec<f64> {
    let mut result: Vec<f64> = genotypes.iter().map(|g| model.evaluate(g)).collect();
    normalise_logs(&mut result);
    result
}
