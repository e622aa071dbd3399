//! # Numerical Helpers
//!
//! Log-space probability arithmetic shared by the genotype models. Every
//! summation of log-probabilities goes through the max-shift form; posterior
//! probabilities are floored at [`PROB_FLOOR`] before conversion to Phred.

use statrs::function::gamma::{digamma, ln_gamma};

/// Smallest probability kept after normalisation; everything below is
/// clamped to avoid -inf surprises downstream.
pub const PROB_FLOOR: f64 = 1e-300;

/// Numerically stable log(exp(a) + exp(b)).
#[inline]
pub fn log_sum_exp2(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Three-way log-sum-exp.
#[inline]
pub fn log_sum_exp3(a: f64, b: f64, c: f64) -> f64 {
    log_sum_exp2(log_sum_exp2(a, b), c)
}

/// Max-shift log-sum-exp over a slice.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Normalise a vector of log-probabilities in place so that the
/// probabilities sum to one. Returns the log-normaliser.
pub fn normalise_logs(values: &mut [f64]) -> f64 {
    let norm = log_sum_exp(values);
    if norm.is_finite() {
        for v in values.iter_mut() {
            *v -= norm;
        }
    }
    norm
}

/// Exponentiate a slice of normalised log-probabilities, flooring at
/// [`PROB_FLOOR`].
pub fn exp_normalised(log_probs: &[f64]) -> Vec<f64> {
    log_probs.iter().map(|&lp| lp.exp().max(PROB_FLOOR)).collect()
}

/// Log of the sum of a series with alternating (or arbitrary) signs.
///
/// Terms are given as `(log_magnitude, is_negative)`. The sum must be
/// positive; a non-positive sum returns `NEG_INFINITY`. This is the
/// sign-tracked equivalent of summing in complex log space and avoids the
/// catastrophic cancellation of evaluating the series in real space.
pub fn signed_log_sum_exp(terms: impl IntoIterator<Item = (f64, bool)>) -> f64 {
    let terms: Vec<(f64, bool)> = terms.into_iter().collect();
    let max = terms
        .iter()
        .map(|&(m, _)| m)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = terms
        .iter()
        .map(|&(m, neg)| {
            let x = (m - max).exp();
            if neg {
                -x
            } else {
                x
            }
        })
        .sum();
    if sum <= 0.0 {
        f64::NEG_INFINITY
    } else {
        max + sum.ln()
    }
}

/// ln C(n, k) via the log-gamma function.
pub fn ln_binomial(n: u64, k: u64) -> f64 {
    debug_assert!(k <= n);
    ln_gamma(n as f64 + 1.0) - ln_gamma(k as f64 + 1.0) - ln_gamma((n - k) as f64 + 1.0)
}

/// Expected log-weights of a Dirichlet: E[ln pi_k] = psi(alpha_k) - psi(sum).
pub fn dirichlet_expected_log(alphas: &[f64]) -> Vec<f64> {
    let a0: f64 = alphas.iter().sum();
    let psi0 = digamma(a0);
    alphas.iter().map(|&a| digamma(a) - psi0).collect()
}

/// Expectation of component `k` of a Dirichlet.
pub fn dirichlet_expectation(k: usize, alphas: &[f64]) -> f64 {
    let a0: f64 = alphas.iter().sum();
    alphas[k] / a0
}

/// KL(Dir(alpha) || Dir(alpha0)), used for the ELBO's prior penalty.
pub fn dirichlet_kl(alpha: &[f64], alpha0: &[f64]) -> f64 {
    debug_assert_eq!(alpha.len(), alpha0.len());
    let a: f64 = alpha.iter().sum();
    let a0: f64 = alpha0.iter().sum();
    let psi_a = digamma(a);
    let mut kl = ln_gamma(a) - ln_gamma(a0);
    for (&q, &p) in alpha.iter().zip(alpha0) {
        kl += ln_gamma(p) - ln_gamma(q) + (q - p) * (digamma(q) - psi_a);
    }
    kl
}

/// Phred-scaled error probability: -10 log10(p_error).
///
/// The wrapped value is the Phred score itself; `error_probability`
/// recovers the probability. Construction floors the error probability at
/// [`PROB_FLOOR`] so that certain events stay finite.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Phred(pub f64);

impl Phred {
    /// Phred score of an event with the given *error* probability.
    pub fn from_error_probability(p: f64) -> Self {
        Phred(-10.0 * p.max(PROB_FLOOR).log10())
    }

    /// Phred score of an event with the given *success* posterior; the
    /// score measures 1 - posterior.
    pub fn from_posterior(p: f64) -> Self {
        Self::from_error_probability((1.0 - p).max(PROB_FLOOR))
    }

    /// The error probability this score encodes.
    pub fn error_probability(self) -> f64 {
        10f64.powf(-self.0 / 10.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for Phred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sum_exp_basic() {
        let result = log_sum_exp2(2f64.ln(), 3f64.ln());
        assert!((result - 5f64.ln()).abs() < 1e-12);
        let result = log_sum_exp3(1f64.ln(), 2f64.ln(), 3f64.ln());
        assert!((result - 6f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_log_sum_exp_neg_infinity() {
        assert_eq!(log_sum_exp2(f64::NEG_INFINITY, 0.0), 0.0);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY; 3]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_normalise_logs_sums_to_one() {
        let mut logs = vec![-1.0, -2.0, -3.5, -10.0];
        normalise_logs(&mut logs);
        let total: f64 = logs.iter().map(|l| l.exp()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_signed_log_sum_exp_alternating() {
        // 8 - 4 + 2 = 6
        let terms = vec![(8f64.ln(), false), (4f64.ln(), true), (2f64.ln(), false)];
        let result = signed_log_sum_exp(terms);
        assert!((result - 6f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn test_signed_log_sum_exp_non_positive() {
        let terms = vec![(1f64.ln(), true)];
        assert_eq!(signed_log_sum_exp(terms), f64::NEG_INFINITY);
    }

    #[test]
    fn test_ln_binomial() {
        assert!((ln_binomial(5, 2) - 10f64.ln()).abs() < 1e-10);
        assert!((ln_binomial(10, 0)).abs() < 1e-10);
    }

    #[test]
    fn test_dirichlet_expected_log_orders_components() {
        let e = dirichlet_expected_log(&[10.0, 1.0]);
        assert!(e[0] > e[1]);
        assert!((dirichlet_expectation(0, &[10.0, 10.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_dirichlet_kl_zero_at_equal() {
        let kl = dirichlet_kl(&[2.0, 3.0], &[2.0, 3.0]);
        assert!(kl.abs() < 1e-10);
        let kl = dirichlet_kl(&[20.0, 3.0], &[1.0, 1.0]);
        assert!(kl > 0.0);
    }

    #[test]
    fn test_phred_round_trip() {
        let p = Phred::from_error_probability(0.01);
        assert!((p.value() - 20.0).abs() < 1e-9);
        assert!((p.error_probability() - 0.01).abs() < 1e-12);
        // certain posterior stays finite
        assert!(Phred::from_posterior(1.0).value().is_finite());
    }
}
