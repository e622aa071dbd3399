//! # Variational Bayes Mixture Skeleton
//!
//! Mean-field inference shared by the CNV and tumour models. The latent
//! structure: a genotype g shared across samples with categorical log-prior
//! pi, per-sample mixture weights with Dirichlet priors, and per-read
//! component assignments. One update sweep:
//!
//! 1. responsibilities from the current expected log-weights,
//! 2. Dirichlet posterior update from the q(g)-weighted responsibilities,
//! 3. genotype posterior update from the refreshed expected log-weights,
//! 4. ELBO; stop when its change falls below epsilon.
//!
//! The posterior is highly multimodal, so the caller supplies a seed set
//! and every seed is run to convergence; the run with the best ELBO wins.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::utils::maths::{
    dirichlet_expected_log, dirichlet_kl, exp_normalised, log_sum_exp, normalise_logs,
};

/// Iterations between cancellation-flag checks.
const CANCEL_CHECK_INTERVAL: usize = 8;

/// Seeds closer than this (max absolute difference of log-probabilities)
/// are considered duplicates.
const SEED_DEDUP_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug)]
pub struct VbParams {
    pub epsilon: f64,
    pub max_iterations: usize,
    pub max_seeds: usize,
}

impl Default for VbParams {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            max_iterations: 200,
            max_seeds: 12,
        }
    }
}

/// Per-sample read likelihoods of every genotype, one slice per mixture
/// component, all of the sample's read count.
pub struct SampleLikelihoods<'a> {
    /// [genotype][component] -> per-read log-likelihoods
    pub genotypes: Vec<Vec<&'a [f64]>>,
    pub num_reads: usize,
}

/// Full likelihood tensor: one entry per sample.
pub struct LikelihoodMatrix<'a> {
    pub samples: Vec<SampleLikelihoods<'a>>,
}

impl LikelihoodMatrix<'_> {
    pub fn num_genotypes(&self) -> usize {
        self.samples.first().map_or(0, |s| s.genotypes.len())
    }

    pub fn num_components(&self) -> usize {
        self.samples
            .first()
            .and_then(|s| s.genotypes.first())
            .map_or(0, |g| g.len())
    }
}

/// Converged posterior state of one VB run.
#[derive(Clone, Debug)]
pub struct VbLatents {
    pub genotype_log_posteriors: Vec<f64>,
    pub genotype_posteriors: Vec<f64>,
    /// per-sample Dirichlet posteriors over the mixture components
    pub alphas: Vec<Vec<f64>>,
    /// best ELBO, used as the model log-evidence
    pub evidence: f64,
}

struct SeedRun {
    log_q: Vec<f64>,
    alphas: Vec<Vec<f64>>,
    elbo: f64,
    trace: Vec<f64>,
}

/// Run VB from every seed and keep the best-ELBO run.
pub fn run_variational_bayes(
    prior_alphas: &[Vec<f64>],
    genotype_log_priors: &[f64],
    likelihoods: &LikelihoodMatrix<'_>,
    params: &VbParams,
    seeds: Vec<Vec<f64>>,
    cancel: Option<&AtomicBool>,
) -> VbLatents {
    debug_assert!(!seeds.is_empty());
    let seeds = dedup_seeds(seeds);
    let mut best: Option<SeedRun> = None;
    for seed in &seeds {
        let run = run_seed(prior_alphas, genotype_log_priors, likelihoods, params, seed, cancel);
        if best.as_ref().map_or(true, |b| run.elbo > b.elbo) {
            best = Some(run);
        }
        if cancel.map_or(false, |c| c.load(Ordering::Relaxed)) {
            break;
        }
    }
    let best = best.expect("at least one seed");
    VbLatents {
        genotype_posteriors: exp_normalised(&best.log_q),
        genotype_log_posteriors: best.log_q,
        alphas: best.alphas,
        evidence: best.elbo,
    }
}

/// Posterior blend of several runs weighted by their ELBOs, for callers
/// that want the mixture over modes rather than the winning mode.
pub fn blend_by_evidence(runs: &[VbLatents]) -> Vec<f64> {
    let mut weights: Vec<f64> = runs.iter().map(|r| r.evidence).collect();
    normalise_logs(&mut weights);
    let n = runs.first().map_or(0, |r| r.genotype_posteriors.len());
    let mut blended = vec![0.0; n];
    for (run, &w) in runs.iter().zip(&weights) {
        let w = w.exp();
        for (b, &p) in blended.iter_mut().zip(&run.genotype_posteriors) {
            *b += w * p;
        }
    }
    blended
}

fn run_seed(
    prior_alphas: &[Vec<f64>],
    genotype_log_priors: &[f64],
    likelihoods: &LikelihoodMatrix<'_>,
    params: &VbParams,
    seed: &[f64],
    cancel: Option<&AtomicBool>,
) -> SeedRun {
    let num_genotypes = likelihoods.num_genotypes();
    let num_components = likelihoods.num_components();
    debug_assert_eq!(seed.len(), num_genotypes);

    let mut q: Vec<f64> = seed.iter().map(|l| l.exp()).collect();
    let mut log_q: Vec<f64> = seed.to_vec();
    let mut alphas: Vec<Vec<f64>> = prior_alphas.to_vec();
    let mut elbo = f64::NEG_INFINITY;
    let mut trace = Vec::new();
    let mut resp = vec![0.0; num_components];

    for iteration in 0..params.max_iterations {
        // (1)-(2): Dirichlet updates from q-weighted responsibilities
        for (s, sample) in likelihoods.samples.iter().enumerate() {
            let elogpi = dirichlet_expected_log(&alphas[s]);
            let mut counts = vec![0.0; num_components];
            for (g, components) in sample.genotypes.iter().enumerate() {
                if q[g] <= 0.0 {
                    continue;
                }
                for r in 0..sample.num_reads {
                    let mut max = f64::NEG_INFINITY;
                    for k in 0..num_components {
                        resp[k] = elogpi[k] + components[k][r];
                        max = max.max(resp[k]);
                    }
                    let mut norm = 0.0;
                    for value in resp.iter_mut() {
                        *value = (*value - max).exp();
                        norm += *value;
                    }
                    for (k, value) in resp.iter().enumerate() {
                        counts[k] += q[g] * value / norm;
                    }
                }
            }
            for k in 0..num_components {
                alphas[s][k] = prior_alphas[s][k] + counts[k];
            }
        }

        // (3): genotype posterior from the refreshed expected log-weights
        let expected: Vec<Vec<f64>> = alphas.iter().map(|a| dirichlet_expected_log(a)).collect();
        for g in 0..num_genotypes {
            let mut score = genotype_log_priors[g];
            for (s, sample) in likelihoods.samples.iter().enumerate() {
                let components = &sample.genotypes[g];
                for r in 0..sample.num_reads {
                    let mut max = f64::NEG_INFINITY;
                    for k in 0..num_components {
                        resp[k] = expected[s][k] + components[k][r];
                        max = max.max(resp[k]);
                    }
                    let sum: f64 = resp.iter().map(|&v| (v - max).exp()).sum();
                    score += max + sum.ln();
                }
            }
            log_q[g] = score;
        }
        let log_evidence_term = normalise_logs(&mut log_q);
        for (p, &l) in q.iter_mut().zip(&log_q) {
            *p = l.exp();
        }

        // (4): ELBO and convergence
        let kl: f64 = alphas
            .iter()
            .zip(prior_alphas)
            .map(|(a, a0)| dirichlet_kl(a, a0))
            .sum();
        let new_elbo = log_evidence_term - kl;
        trace.push(new_elbo);
        let converged = (new_elbo - elbo).abs() < params.epsilon;
        elbo = new_elbo;
        if converged {
            break;
        }
        if iteration % CANCEL_CHECK_INTERVAL == CANCEL_CHECK_INTERVAL - 1
            && cancel.map_or(false, |c| c.load(Ordering::Relaxed))
        {
            break;
        }
    }

    SeedRun {
        log_q,
        alphas,
        elbo,
        trace,
    }
}

// --- seed construction helpers ---

/// Uniform log-distribution over n genotypes.
pub fn log_uniform_seed(n: usize) -> Vec<f64> {
    vec![-(n as f64).ln(); n]
}

/// Nearly-degenerate seed at one genotype.
pub fn make_point_seed(num_genotypes: usize, index: usize) -> Vec<f64> {
    const P: f64 = 0.9999;
    if num_genotypes == 1 {
        return vec![0.0];
    }
    let rest = ((1.0 - P) / (num_genotypes as f64 - 1.0)).ln();
    let mut seed = vec![rest; num_genotypes];
    seed[index] = P.ln();
    seed
}

/// Seed spreading its mass over a contiguous genotype block.
pub fn make_range_seed(num_genotypes: usize, begin: usize, len: usize) -> Vec<f64> {
    const P: f64 = 0.9999;
    debug_assert!(len >= 1 && begin + len <= num_genotypes);
    if len == num_genotypes {
        return log_uniform_seed(num_genotypes);
    }
    let outside = ((1.0 - P) / (num_genotypes - len) as f64).ln();
    let inside = (P / len as f64).ln();
    let mut seed = vec![outside; num_genotypes];
    for value in seed.iter_mut().skip(begin).take(len) {
        *value = inside;
    }
    seed
}

/// One point seed per genotype.
pub fn make_exhaustive_seeds(num_genotypes: usize) -> Vec<Vec<f64>> {
    (0..num_genotypes).map(|i| make_point_seed(num_genotypes, i)).collect()
}

/// Normalised log-posterior seed from a prior and a likelihood vector.
pub fn make_posterior_seed(log_priors: &[f64], log_likelihoods: &[f64]) -> Vec<f64> {
    let mut seed: Vec<f64> = log_priors
        .iter()
        .zip(log_likelihoods)
        .map(|(&p, &l)| p + l)
        .collect();
    normalise_logs(&mut seed);
    seed
}

/// Normalise a raw log-likelihood vector into a seed.
pub fn make_likelihood_seed(log_likelihoods: &[f64]) -> Vec<f64> {
    let mut seed = log_likelihoods.to_vec();
    normalise_logs(&mut seed);
    seed
}

fn dedup_seeds(seeds: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    let mut result: Vec<Vec<f64>> = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let duplicate = result.iter().any(|kept| {
            kept.iter()
                .zip(&seed)
                .all(|(a, b)| (a - b).abs() < SEED_DEDUP_TOLERANCE)
        });
        if !duplicate {
            result.push(seed);
        }
    }
    result
}

/// Select the prefix of (sorted) normalised posteriors covering at least
/// `credible_mass`; always at least one.
pub fn credible_prefix_len(sorted_probs: &[f64], credible_mass: f64) -> usize {
    let mut mass = 0.0;
    for (i, &p) in sorted_probs.iter().enumerate() {
        mass += p;
        if mass >= credible_mass {
            return i + 1;
        }
    }
    sorted_probs.len().max(1)
}

/// Log evidence of a set of scored genotypes (for closed-form models).
pub fn log_evidence(log_joint: &[f64]) -> f64 {
    log_sum_exp(log_joint)
}
