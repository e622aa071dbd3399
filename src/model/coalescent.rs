//! # Coalescent Prior
//!
//! Log prior probability of a haplotype set under Kingman's coalescent
//! with infinite-sites mutation, rating SNP and indel segregating sites
//! separately. Indel heterozygosity is elevated inside exact tandem
//! repeats. The alternating series is evaluated in real space for small
//! site counts and with sign-tracked log magnitudes above `k = 80`, where
//! real-space evaluation cancels catastrophically.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::data::allele::ContigAllele;
use crate::data::haplotype::HaplotypeRef;
use crate::error::{Result, SomavarError};
use crate::utils::maths::{ln_binomial, signed_log_sum_exp};

/// Real-space evaluation is safe up to this many segregating sites.
const REAL_SPACE_MAX_SITES: u32 = 80;

#[derive(Clone, Copy, Debug)]
pub struct CoalescentParams {
    pub snp_heterozygosity: f64,
    pub indel_heterozygosity: f64,
}

impl Default for CoalescentParams {
    fn default() -> Self {
        Self {
            snp_heterozygosity: 0.001,
            indel_heterozygosity: 0.0001,
        }
    }
}

/// An exact tandem repeat in a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TandemRepeat {
    pub pos: usize,
    pub period: usize,
    pub length: usize,
}

/// Exact tandem repeats with periods in `min_period..=max_period` and at
/// least two full copies.
pub fn exact_tandem_repeats(
    seq: &[u8],
    min_period: usize,
    max_period: usize,
) -> Vec<TandemRepeat> {
    let mut repeats = Vec::new();
    for period in min_period..=max_period {
        let mut run_start = None;
        let mut i = 0;
        while i + period < seq.len() {
            if seq[i] == seq[i + period] {
                run_start.get_or_insert(i);
            } else if let Some(start) = run_start.take() {
                let length = i + period - start;
                if length >= 2 * period {
                    repeats.push(TandemRepeat { pos: start, period, length });
                }
            }
            i += 1;
        }
        if let Some(start) = run_start {
            let length = seq.len() - start;
            if length >= 2 * period {
                repeats.push(TandemRepeat { pos: start, period, length });
            }
        }
    }
    repeats
}

/// Per-base indel heterozygosity, boosted to
/// `max(theta, min(theta * n^2.6, 1))` inside a repeat with `n` copies.
fn base_indel_heterozygosities(sequence: &[u8], base: f64) -> Vec<f64> {
    let mut result = vec![base; sequence.len()];
    for repeat in exact_tandem_repeats(sequence, 1, 3) {
        let copies = (repeat.length / repeat.period) as f64;
        let boosted = (base * copies.powf(2.6)).min(1.0);
        for h in &mut result[repeat.pos..repeat.pos + repeat.length] {
            *h = h.max(boosted);
        }
    }
    result
}

pub struct CoalescentModel {
    reference: HaplotypeRef,
    params: CoalescentParams,
    reference_base_indel_heterozygosities: Vec<f64>,
    difference_cache: RefCell<HashMap<HaplotypeRef, Vec<ContigAllele>>>,
    /// dense (n, k_snp) table for the common k_indel = 0 case
    k_indel_zero_cache: RefCell<Vec<Vec<Option<f64>>>>,
    k_indel_pos_cache: RefCell<HashMap<(u32, u32, u32, i64), f64>>,
}

impl CoalescentModel {
    pub fn new(reference: HaplotypeRef, params: CoalescentParams) -> Result<Self> {
        if params.snp_heterozygosity <= 0.0 || params.indel_heterozygosity <= 0.0 {
            return Err(SomavarError::config(
                "snp and indel heterozygosity must be > 0",
            ));
        }
        let table = base_indel_heterozygosities(reference.sequence(), params.indel_heterozygosity);
        Ok(Self {
            reference,
            params,
            reference_base_indel_heterozygosities: table,
            difference_cache: RefCell::new(HashMap::new()),
            k_indel_zero_cache: RefCell::new(Vec::new()),
            k_indel_pos_cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn reference(&self) -> &HaplotypeRef {
        &self.reference
    }

    /// Log prior of the haplotype multiset (the reference joins the
    /// sample, so `n = haplotypes.len() + 1`).
    pub fn evaluate<'a>(&self, haplotypes: impl IntoIterator<Item = &'a HaplotypeRef>) -> f64 {
        let mut sites: Vec<ContigAllele> = Vec::new();
        let mut n = 1u32;
        {
            let mut cache = self.difference_cache.borrow_mut();
            let mut seen: Vec<&HaplotypeRef> = Vec::new();
            for haplotype in haplotypes {
                n += 1;
                if seen.iter().any(|h| *h == haplotype) {
                    continue;
                }
                let differences = cache
                    .entry(haplotype.clone())
                    .or_insert_with(|| haplotype.difference(&self.reference))
                    .clone();
                sites.extend(differences);
                seen.push(haplotype);
            }
        }
        sites.sort();
        sites.dedup();
        let k_snp = sites.iter().filter(|s| s.is_substitution()).count() as u32;
        let k_indel = sites.len() as u32 - k_snp;
        if k_indel == 0 {
            self.evaluate_snps_only(k_snp, n)
        } else {
            self.evaluate_with_indels(&sites, k_snp, k_indel, n)
        }
    }

    fn evaluate_snps_only(&self, k_snp: u32, n: u32) -> f64 {
        {
            let cache = self.k_indel_zero_cache.borrow();
            if let Some(Some(result)) = cache
                .get(n as usize)
                .and_then(|row| row.get(k_snp as usize))
            {
                return *result;
            }
        }
        let result = coalescent_joint(
            n,
            k_snp,
            0,
            self.params.snp_heterozygosity,
            self.params.indel_heterozygosity,
        );
        let mut cache = self.k_indel_zero_cache.borrow_mut();
        if cache.len() <= n as usize {
            cache.resize(n as usize + 1, Vec::new());
        }
        let row = &mut cache[n as usize];
        if row.len() <= k_snp as usize {
            row.resize(k_snp as usize + 1, None);
        }
        row[k_snp as usize] = Some(result);
        result
    }

    fn evaluate_with_indels(
        &self,
        sites: &[ContigAllele],
        k_snp: u32,
        k_indel: u32,
        n: u32,
    ) -> f64 {
        // site-specific indel rate: the hottest repeat position under any
        // indel site wins
        let window_begin = self.reference.window().begin;
        let mut indel_heterozygosity = self.params.indel_heterozygosity;
        let mut max_offset: i64 = -1;
        for site in sites.iter().filter(|s| s.is_indel()) {
            let begin = (site.begin() - window_begin) as usize;
            let span = (site.region().len().max(1)) as usize;
            let table = &self.reference_base_indel_heterozygosities;
            for (offset, &rate) in table
                .iter()
                .enumerate()
                .skip(begin)
                .take(span.min(table.len().saturating_sub(begin)))
            {
                if rate > indel_heterozygosity {
                    indel_heterozygosity = rate;
                    max_offset = offset as i64;
                }
            }
        }
        let key = (k_snp, k_indel, n, max_offset);
        if let Some(result) = self.k_indel_pos_cache.borrow().get(&key) {
            return *result;
        }
        let result = coalescent_joint(
            n,
            k_snp,
            k_indel,
            self.params.snp_heterozygosity,
            indel_heterozygosity,
        );
        self.k_indel_pos_cache.borrow_mut().insert(key, result);
        result
    }
}

/// Combined SNP/indel coalescent:
/// `C(n, k_tot, theta) + k_snp ln(theta_snp/theta) + k_indel
/// ln(theta_indel/theta) + ln C(k_tot, k_snp)`.
fn coalescent_joint(n: u32, k_snp: u32, k_indel: u32, theta_snp: f64, theta_indel: f64) -> f64 {
    let theta = theta_snp + theta_indel;
    let k_tot = k_snp + k_indel;
    let mut result = coalescent(n, k_tot, theta);
    result += k_snp as f64 * (theta_snp / theta).ln();
    result += k_indel as f64 * (theta_indel / theta).ln();
    result += ln_binomial(k_tot as u64, k_snp as u64);
    result
}

fn coalescent(n: u32, k: u32, theta: f64) -> f64 {
    if k <= REAL_SPACE_MAX_SITES {
        coalescent_real_space(n, k, theta)
    } else {
        coalescent_log_space(n, k, theta)
    }
}

fn coalescent_real_space(n: u32, k: u32, theta: f64) -> f64 {
    let mut sum = 0.0;
    for i in 2..=n {
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        let binom = ln_binomial(n as u64 - 1, i as u64 - 1).exp();
        let i = i as f64;
        sum += sign * binom * ((i - 1.0) / (theta + i - 1.0))
            * (theta / (theta + i - 1.0)).powi(k as i32);
    }
    sum.ln()
}

fn coalescent_log_space(n: u32, k: u32, theta: f64) -> f64 {
    signed_log_sum_exp((2..=n).map(|i| {
        let negative = i % 2 == 1;
        let fi = i as f64;
        let magnitude = ln_binomial(n as u64 - 1, i as u64 - 1)
            + ((fi - 1.0) / (theta + fi - 1.0)).ln()
            + k as f64 * (theta / (theta + fi - 1.0)).ln();
        (magnitude, negative)
    }))
}
