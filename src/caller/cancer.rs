//! # Cancer Caller
//!
//! Composes the three genotype models over one window's haplotypes:
//! the individual (germline) model, the CNV mixture and the tumour
//! mixture, compared through prior-weighted evidence. Produces blended
//! germline genotype posteriors, per-sample somatic posteriors, and the
//! per-site variant / somatic / reference calls.

use std::sync::atomic::AtomicBool;

use statrs::distribution::{Beta, ContinuousCDF};
use tracing::debug;

use crate::data::genotype::{
    enumerate_cancer_genotypes, enumerate_genotypes, CancerGenotype, Genotype,
};
use crate::data::haplotype::HaplotypeRef;
use crate::data::{SampleName, Variant};
use crate::error::{Result, SomavarError};
use crate::model::cnv::CnvModel;
use crate::model::coalescent::{CoalescentModel, CoalescentParams};
use crate::model::individual::{IndividualInferences, IndividualModel};
use crate::model::likelihood::LikelihoodCache;
use crate::model::somatic::{SomaticMutationModel, SomaticParams};
use crate::model::tumour::{TumourInferences, TumourModel};
use crate::model::vb::{credible_prefix_len, VbLatents, VbParams};
use crate::utils::maths::{normalise_logs, Phred};

use super::call::{
    CallSet, GenotypeCall, ReferenceCall, SampleCall, SomaticAnnotation, VariantCall,
};

/// Unnormalised default model priors; the rounding reserve absorbs the
/// remainder before renormalisation.
const DEFAULT_GERMLINE_WEIGHT: f64 = 0.8988;
const DEFAULT_CNV_WEIGHT: f64 = 0.1;
const DEFAULT_SOMATIC_WEIGHT: f64 = 0.00001;

/// Dirichlet concentrations: a normal sample is pinned near balanced
/// mixture weights; tumour samples may drift.
const CNV_NORMAL_ALPHA: f64 = 10.0;
const CNV_TUMOUR_ALPHA: f64 = 0.75;
const SOMATIC_NORMAL_GERMLINE_ALPHA: f64 = 10.0;
const SOMATIC_NORMAL_SOMATIC_ALPHA: f64 = 0.01;
const SOMATIC_TUMOUR_GERMLINE_ALPHA: f64 = 1.0;
const SOMATIC_TUMOUR_SOMATIC_ALPHA: f64 = 0.8;

#[derive(Clone, Debug)]
pub struct CancerCallerParams {
    pub ploidy: u32,
    pub normal_sample: Option<SampleName>,
    pub min_variant_posterior: Phred,
    pub min_somatic_posterior: Phred,
    pub min_refcall_posterior: Phred,
    pub somatic_mutation_rate: f64,
    pub min_somatic_frequency: f64,
    pub credible_mass: f64,
    pub max_genotypes: usize,
}

impl Default for CancerCallerParams {
    fn default() -> Self {
        Self {
            ploidy: 2,
            normal_sample: None,
            min_variant_posterior: Phred(3.0),
            min_somatic_posterior: Phred(2.0),
            min_refcall_posterior: Phred(2.0),
            somatic_mutation_rate: 1e-5,
            min_somatic_frequency: 0.01,
            credible_mass: 0.99,
            max_genotypes: 5000,
        }
    }
}

/// Normalised prior over the three model hypotheses.
#[derive(Clone, Copy, Debug)]
pub struct ModelPriors {
    pub germline: f64,
    pub cnv: f64,
    pub somatic: f64,
}

impl Default for ModelPriors {
    fn default() -> Self {
        let total = DEFAULT_GERMLINE_WEIGHT + DEFAULT_CNV_WEIGHT + DEFAULT_SOMATIC_WEIGHT;
        Self {
            germline: DEFAULT_GERMLINE_WEIGHT / total,
            cnv: DEFAULT_CNV_WEIGHT / total,
            somatic: DEFAULT_SOMATIC_WEIGHT / total,
        }
    }
}

pub type ModelPosteriors = ModelPriors;

impl ModelPriors {
    pub fn as_array(&self) -> [f64; 3] {
        [self.germline, self.cnv, self.somatic]
    }
}

/// Everything inferred for one window.
#[derive(Debug)]
pub struct Latents {
    pub haplotypes: Vec<HaplotypeRef>,
    pub reference: HaplotypeRef,
    pub germline_genotypes: Vec<Genotype>,
    pub cancer_genotypes: Vec<CancerGenotype>,
    pub model_priors: ModelPriors,
    pub germline_inferences: IndividualInferences,
    pub cnv_inferences: VbLatents,
    pub tumour_inferences: TumourInferences,
}

impl Latents {
    /// Marginal haplotype posteriors under the germline inferences.
    pub fn haplotype_posteriors(&self) -> Vec<(HaplotypeRef, f64)> {
        self.haplotypes
            .iter()
            .map(|h| {
                let marginal: f64 = self
                    .germline_genotypes
                    .iter()
                    .zip(&self.germline_inferences.genotype_posteriors)
                    .filter(|(g, _)| g.contains(h))
                    .map(|(_, &q)| q)
                    .sum();
                (h.clone(), marginal)
            })
            .collect()
    }
}

pub struct CancerCaller {
    samples: Vec<SampleName>,
    params: CancerCallerParams,
    vb_params: VbParams,
    coalescent_params: CoalescentParams,
}

impl CancerCaller {
    pub fn new(samples: Vec<SampleName>, params: CancerCallerParams) -> Result<Self> {
        if samples.is_empty() {
            return Err(SomavarError::config("caller needs at least one sample"));
        }
        if let Some(normal) = &params.normal_sample {
            if !samples.contains(normal) {
                return Err(SomavarError::config(format!(
                    "normal sample {normal} is not among the samples"
                )));
            }
        }
        if params.ploidy == 0 || params.ploidy > crate::model::individual::MAX_PLOIDY {
            return Err(SomavarError::UnsupportedPloidy {
                ploidy: params.ploidy,
            });
        }
        if !(0.0..=1.0).contains(&params.credible_mass) {
            return Err(SomavarError::config("credible_mass must lie in [0, 1]"));
        }
        Ok(Self {
            samples,
            params,
            vb_params: VbParams::default(),
            coalescent_params: CoalescentParams::default(),
        })
    }

    pub fn samples(&self) -> &[SampleName] {
        &self.samples
    }

    pub fn params(&self) -> &CancerCallerParams {
        &self.params
    }

    fn has_normal_sample(&self) -> bool {
        self.params.normal_sample.is_some()
    }

    fn is_normal(&self, sample: &str) -> bool {
        self.params.normal_sample.as_deref() == Some(sample)
    }

    /// Run all three models over the window's haplotypes.
    pub fn infer_latents(
        &self,
        haplotypes: &[HaplotypeRef],
        reference: &HaplotypeRef,
        likelihoods: &LikelihoodCache,
        cancel: Option<&AtomicBool>,
    ) -> Result<Latents> {
        if haplotypes.len() < 2 {
            return Err(SomavarError::degenerate(
                "fewer than two distinct haplotypes in window",
            ));
        }
        let ploidy = self.params.ploidy;
        let coalescent = CoalescentModel::new(reference.clone(), self.coalescent_params)?;

        // germline hypothesis
        let germline_genotypes = enumerate_genotypes(haplotypes, ploidy);
        let mut germline_log_priors: Vec<f64> = germline_genotypes
            .iter()
            .map(|g| coalescent.evaluate(g.iter()))
            .collect();
        normalise_logs(&mut germline_log_priors);
        let germline_model = IndividualModel::new(ploidy)?;
        let germline_inferences =
            germline_model.evaluate(&germline_genotypes, &germline_log_priors, likelihoods)?;

        // CNV hypothesis: same genotypes, mixture structure
        let cnv_model = CnvModel::new(ploidy, self.vb_params)?;
        let cnv_alphas: Vec<Vec<f64>> = self
            .samples
            .iter()
            .map(|s| {
                let alpha = if self.is_normal(s) {
                    CNV_NORMAL_ALPHA
                } else {
                    CNV_TUMOUR_ALPHA
                };
                vec![alpha; ploidy as usize]
            })
            .collect();
        let cnv_inferences = cnv_model.evaluate(
            &germline_genotypes,
            &germline_log_priors,
            &cnv_alphas,
            likelihoods,
            cancel,
        )?;

        // somatic hypothesis over the filtered cancer genotype set
        let mut cancer_genotypes = enumerate_cancer_genotypes(&germline_genotypes, haplotypes);
        if cancer_genotypes.is_empty() {
            return Err(SomavarError::degenerate(
                "no admissible cancer genotypes in window",
            ));
        }
        self.filter_cancer_genotypes(
            &mut cancer_genotypes,
            &germline_genotypes,
            &germline_inferences,
            &cnv_inferences,
        );
        let somatic_prior_model = SomaticMutationModel::new(
            &coalescent,
            SomaticParams {
                somatic_mutation_rate: self.params.somatic_mutation_rate,
            },
        );
        let tumour_model = TumourModel::new(ploidy, 1, self.vb_params, self.params.credible_mass)?;
        let somatic_alphas: Vec<Vec<f64>> = self
            .samples
            .iter()
            .map(|s| {
                let (germline_alpha, somatic_alpha) = if self.is_normal(s) {
                    (SOMATIC_NORMAL_GERMLINE_ALPHA, SOMATIC_NORMAL_SOMATIC_ALPHA)
                } else {
                    (SOMATIC_TUMOUR_GERMLINE_ALPHA, SOMATIC_TUMOUR_SOMATIC_ALPHA)
                };
                let mut alphas = vec![germline_alpha; ploidy as usize];
                alphas.push(somatic_alpha);
                alphas
            })
            .collect();
        let tumour_inferences = tumour_model.evaluate(
            &cancer_genotypes,
            &somatic_alphas,
            &somatic_prior_model,
            likelihoods,
            cancel,
        )?;

        Ok(Latents {
            haplotypes: haplotypes.to_vec(),
            reference: reference.clone(),
            germline_genotypes,
            cancer_genotypes,
            model_priors: ModelPriors::default(),
            germline_inferences,
            cnv_inferences,
            tumour_inferences,
        })
    }

    /// Drop cancer genotypes whose germline marginal under the germline
    /// and CNV inferences is negligible, keeping the smallest prefix that
    /// dominates `credible_mass` of the combined weight (and never more
    /// than `max_genotypes`).
    fn filter_cancer_genotypes(
        &self,
        cancer_genotypes: &mut Vec<CancerGenotype>,
        germline_genotypes: &[Genotype],
        germline_inferences: &IndividualInferences,
        cnv_inferences: &VbLatents,
    ) {
        let weight_of = |cg: &CancerGenotype| -> f64 {
            germline_genotypes
                .iter()
                .position(|g| g == cg.germline())
                .map(|i| {
                    germline_inferences.genotype_posteriors[i]
                        + cnv_inferences.genotype_posteriors[i]
                })
                .unwrap_or(0.0)
        };
        let mut weighted: Vec<(f64, CancerGenotype)> = cancer_genotypes
            .drain(..)
            .map(|cg| (weight_of(&cg), cg))
            .collect();
        weighted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        let total: f64 = weighted.iter().map(|(w, _)| w).sum();
        let keep = if total > 0.0 {
            let normalised: Vec<f64> = weighted.iter().map(|(w, _)| w / total).collect();
            credible_prefix_len(&normalised, self.params.credible_mass)
        } else {
            weighted.len()
        };
        let keep = keep.clamp(1, self.params.max_genotypes.max(1));
        debug!(
            kept = keep,
            dropped = weighted.len().saturating_sub(keep),
            "filtered cancer genotype set"
        );
        weighted.truncate(keep);
        // restore germline-run ordering for the targeted seeds
        weighted.sort_by(|a, b| a.1.cmp(&b.1));
        *cancer_genotypes = weighted.into_iter().map(|(_, cg)| cg).collect();
    }

    /// Softmax of log evidence weighted by the model priors; sums to one.
    pub fn calculate_model_posteriors(&self, latents: &Latents) -> ModelPosteriors {
        let priors = latents.model_priors;
        let mut logs = [
            priors.germline.ln() + latents.germline_inferences.evidence,
            priors.cnv.ln() + latents.cnv_inferences.evidence,
            priors.somatic.ln() + latents.tumour_inferences.latents.evidence,
        ];
        normalise_logs(&mut logs);
        ModelPosteriors {
            germline: logs[0].exp(),
            cnv: logs[1].exp(),
            somatic: logs[2].exp(),
        }
    }

    /// Germline genotype posteriors blended across the three models by
    /// their posteriors.
    pub fn germline_genotype_posteriors(
        &self,
        latents: &Latents,
        model_posteriors: &ModelPosteriors,
    ) -> Vec<(Genotype, f64)> {
        let mut result: Vec<(Genotype, f64)> = latents
            .germline_genotypes
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let blended = model_posteriors.germline
                    * latents.germline_inferences.genotype_posteriors[i]
                    + model_posteriors.cnv * latents.cnv_inferences.genotype_posteriors[i];
                (g.clone(), blended)
            })
            .collect();
        for (cg, &q) in latents
            .cancer_genotypes
            .iter()
            .zip(&latents.tumour_inferences.latents.genotype_posteriors)
        {
            if let Some(entry) = result.iter_mut().find(|(g, _)| g == cg.germline()) {
                entry.1 += model_posteriors.somatic * q;
            }
        }
        result
    }

    /// Tumour-model posterior mass on genotypes whose somatic haplotype is
    /// a genuine mutation (not the reference resurfacing).
    fn somatic_genotype_mass(&self, latents: &Latents) -> f64 {
        latents
            .cancer_genotypes
            .iter()
            .zip(&latents.tumour_inferences.latents.genotype_posteriors)
            .filter(|(cg, _)| cg.somatic()[0] != latents.reference)
            .map(|(_, &q)| q)
            .sum()
    }

    /// Per-sample somatic posteriors: tumour-model mass on somatic
    /// genotypes, gated by the Dirichlet-credible somatic fraction and
    /// weighted by the somatic model posterior.
    pub fn sample_somatic_posteriors(
        &self,
        latents: &Latents,
        model_posteriors: &ModelPosteriors,
    ) -> Vec<(SampleName, f64, f64)> {
        let somatic_mass = self.somatic_genotype_mass(latents);
        let ploidy = self.params.ploidy as usize;
        self.samples
            .iter()
            .enumerate()
            .map(|(s, name)| {
                let alphas = &latents.tumour_inferences.latents.alphas[s];
                let somatic_alpha: f64 = alphas[ploidy..].iter().sum();
                let rest: f64 = alphas[..ploidy].iter().sum();
                let expected_vaf = somatic_alpha / (somatic_alpha + rest);
                let credible = Beta::new(somatic_alpha, rest)
                    .map(|beta| 1.0 - beta.cdf(self.params.min_somatic_frequency))
                    .unwrap_or(0.0);
                let posterior = model_posteriors.somatic * somatic_mass * credible;
                (name.clone(), posterior, expected_vaf)
            })
            .collect()
    }

    /// Emit variant, somatic and reference calls for the candidates.
    pub fn call_variants(&self, candidates: &[Variant], latents: &Latents) -> Result<CallSet> {
        let model_posteriors = self.calculate_model_posteriors(latents);
        let germline_posteriors = self.germline_genotype_posteriors(latents, &model_posteriors);
        let somatic_posteriors = self.sample_somatic_posteriors(latents, &model_posteriors);

        // somatic calling compares tumour against the configured normal
        let aggregate_somatic = if self.has_normal_sample() {
            somatic_posteriors
                .iter()
                .filter(|(name, _, _)| !self.is_normal(name))
                .map(|&(_, p, _)| p)
                .fold(0.0, f64::max)
        } else {
            0.0
        };
        let somatic_phred = Phred::from_posterior(aggregate_somatic);

        let map_germline = germline_posteriors
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .map(|(g, p)| (g.clone(), *p))
            .ok_or_else(|| SomavarError::degenerate("empty genotype posterior"))?;
        let map_cancer = latents
            .cancer_genotypes
            .iter()
            .zip(&latents.tumour_inferences.latents.genotype_posteriors)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(cg, _)| cg.clone());

        let mut calls = CallSet::default();
        for candidate in candidates {
            let alt = candidate.alt_allele();
            let p_variant: f64 = germline_posteriors
                .iter()
                .filter(|(g, _)| g.iter().any(|h| h.contains_allele(&alt)))
                .map(|(_, p)| p)
                .sum();
            let variant_quality = Phred::from_posterior(p_variant);

            let somatic_here = map_cancer
                .as_ref()
                .map(|cg| cg.somatic()[0].contains_allele(&alt))
                .unwrap_or(false)
                && somatic_phred.value() >= self.params.min_somatic_posterior.value();

            if variant_quality.value() >= self.params.min_variant_posterior.value()
                || somatic_here
            {
                let somatic = somatic_here.then(|| SomaticAnnotation {
                    posterior: somatic_phred,
                    expected_vafs: somatic_posteriors
                        .iter()
                        .filter(|(name, _, _)| !self.is_normal(name))
                        .map(|(name, _, vaf)| (name.clone(), *vaf))
                        .collect(),
                });
                let quality = if variant_quality.value() >= self.params.min_variant_posterior.value()
                {
                    variant_quality
                } else {
                    somatic_phred
                };
                let samples = self
                    .samples
                    .iter()
                    .map(|name| SampleCall {
                        sample: name.clone(),
                        genotype: genotype_call(&map_germline.0, &alt),
                        genotype_quality: Phred::from_posterior(map_germline.1),
                        model_posteriors: model_posteriors.as_array(),
                        phase_set: None,
                        phase_quality: None,
                    })
                    .collect();
                calls.variants.push(VariantCall {
                    variant: candidate.clone(),
                    quality,
                    samples,
                    somatic,
                });
            } else {
                let refcall_quality = Phred::from_posterior(1.0 - p_variant);
                if refcall_quality.value() >= self.params.min_refcall_posterior.value() {
                    calls.reference.push(ReferenceCall {
                        variant: candidate.clone(),
                        quality: refcall_quality,
                    });
                }
            }
        }
        Ok(calls)
    }
}

fn genotype_call(genotype: &Genotype, alt: &crate::data::allele::ContigAllele) -> GenotypeCall {
    let mut indices: Vec<u8> = genotype
        .iter()
        .map(|h| u8::from(h.contains_allele(alt)))
        .collect();
    indices.sort_unstable();
    GenotypeCall {
        allele_indices: indices,
        phased: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::allele::ContigAllele;
    use crate::data::haplotype::Haplotype;
    use crate::data::read::Cigar;
    use crate::data::{AlignedRead, ContigRegion};
    use crate::model::pair_hmm::PairHmmParams;
    use std::sync::Arc;

    const REF: &[u8] = b"ACGTACGTACGTACGTACGT";
    const WINDOW: ContigRegion = ContigRegion { begin: 0, end: 20 };

    fn haplotypes() -> (Vec<HaplotypeRef>, HaplotypeRef) {
        let reference = Arc::new(Haplotype::reference("chr1", WINDOW, REF));
        let alt = ContigAllele::new(ContigRegion::new(10, 11), *b"A");
        let alt_hap = Arc::new(Haplotype::new("chr1", WINDOW, REF, vec![alt]).unwrap());
        (vec![reference.clone(), alt_hap], reference)
    }

    fn read(bases: &[u8]) -> AlignedRead {
        AlignedRead {
            name: "r".into(),
            contig: "chr1".into(),
            start: 0,
            cigar: Cigar::parse(&format!("{}M", bases.len())).unwrap(),
            bases: bases.to_vec(),
            qualities: vec![30; bases.len()],
            mapping_quality: 60,
            is_reverse: false,
        }
    }

    fn reads(ref_count: usize, alt_count: usize) -> Vec<AlignedRead> {
        let mut alt_bases = REF.to_vec();
        alt_bases[10] = b'A';
        let mut result = Vec::new();
        result.extend((0..ref_count).map(|_| read(REF)));
        result.extend((0..alt_count).map(|_| read(&alt_bases)));
        result
    }

    fn single_sample_latents(
        ref_count: usize,
        alt_count: usize,
        params: CancerCallerParams,
    ) -> (CancerCaller, Latents) {
        let (haps, reference) = haplotypes();
        let mut cache = LikelihoodCache::new(PairHmmParams::default());
        cache
            .populate(&[("s".to_string(), reads(ref_count, alt_count))], &haps)
            .unwrap();
        let caller = CancerCaller::new(vec!["s".to_string()], params).unwrap();
        let latents = caller
            .infer_latents(&haps, &reference, &cache, None)
            .unwrap();
        (caller, latents)
    }

    #[test]
    fn test_construction_validation() {
        assert!(CancerCaller::new(vec![], CancerCallerParams::default()).is_err());
        let bad_normal = CancerCallerParams {
            normal_sample: Some("missing".to_string()),
            ..CancerCallerParams::default()
        };
        assert!(CancerCaller::new(vec!["s".to_string()], bad_normal).is_err());
        let bad_ploidy = CancerCallerParams {
            ploidy: 9,
            ..CancerCallerParams::default()
        };
        assert!(matches!(
            CancerCaller::new(vec!["s".to_string()], bad_ploidy),
            Err(SomavarError::UnsupportedPloidy { ploidy: 9 })
        ));
    }

    #[test]
    fn test_model_posteriors_sum_to_one() {
        let (caller, latents) = single_sample_latents(15, 15, CancerCallerParams::default());
        let posteriors = caller.calculate_model_posteriors(&latents);
        let total = posteriors.germline + posteriors.cnv + posteriors.somatic;
        assert!((total - 1.0).abs() < 1e-9);

        // both haplotypes of the heterozygote carry near-certain marginals
        for (_, marginal) in latents.haplotype_posteriors() {
            assert!(marginal > 0.99);
        }
    }

    #[test]
    fn test_balanced_reads_call_heterozygote() {
        let (caller, latents) = single_sample_latents(15, 15, CancerCallerParams::default());
        let candidate = Variant::new("chr1", 10, b"G", b"A");
        let calls = caller.call_variants(&[candidate], &latents).unwrap();
        assert_eq!(calls.variants.len(), 1);
        let call = &calls.variants[0];
        assert_eq!(call.samples[0].genotype.gt_string(), "0/1");
        assert!(call.quality.value() >= 60.0);
        assert!(call.somatic.is_none());
    }

    #[test]
    fn test_noise_read_yields_reference_call() {
        let (caller, latents) = single_sample_latents(30, 1, CancerCallerParams::default());
        let candidate = Variant::new("chr1", 10, b"G", b"A");
        let calls = caller.call_variants(&[candidate], &latents).unwrap();
        assert!(calls.variants.is_empty());
        assert_eq!(calls.reference.len(), 1);
    }

    #[test]
    fn test_somatic_posterior_vanishes_with_rate() {
        let base = CancerCallerParams::default();
        let tiny_rate = CancerCallerParams {
            somatic_mutation_rate: 1e-30,
            ..base.clone()
        };
        let (caller_a, latents_a) = single_sample_latents(35, 15, base);
        let (caller_b, latents_b) = single_sample_latents(35, 15, tiny_rate);
        let post_a = caller_a.calculate_model_posteriors(&latents_a);
        let post_b = caller_b.calculate_model_posteriors(&latents_b);
        let somatic_a = caller_a.sample_somatic_posteriors(&latents_a, &post_a)[0].1;
        let somatic_b = caller_b.sample_somatic_posteriors(&latents_b, &post_b)[0].1;
        assert!(somatic_b <= somatic_a);
    }

    #[test]
    fn test_haploid_caller_degenerates_cleanly() {
        let params = CancerCallerParams {
            ploidy: 1,
            ..CancerCallerParams::default()
        };
        let (caller, latents) = single_sample_latents(20, 0, params);
        let posteriors = caller.calculate_model_posteriors(&latents);
        let total = posteriors.germline + posteriors.cnv + posteriors.somatic;
        assert!((total - 1.0).abs() < 1e-9);
        let candidate = Variant::new("chr1", 10, b"G", b"A");
        let calls = caller.call_variants(&[candidate], &latents).unwrap();
        assert!(calls.variants.is_empty());
    }

    #[test]
    fn test_degenerate_haplotype_set_is_recoverable() {
        let (_, reference) = haplotypes();
        let mut cache = LikelihoodCache::new(PairHmmParams::default());
        cache
            .populate(
                &[("s".to_string(), reads(5, 0))],
                std::slice::from_ref(&reference),
            )
            .unwrap();
        let caller = CancerCaller::new(vec!["s".to_string()], CancerCallerParams::default()).unwrap();
        let err = caller
            .infer_latents(&[reference.clone()], &reference, &cache, None)
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
