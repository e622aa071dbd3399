//! # Pair HMM
//!
//! Local alignment model scoring log P(read | haplotype). Three blocks: a
//! left random flank, an affine-gap match core (match / delete / insert),
//! and a right random flank. Emissions in the core are derived from base
//! qualities; the random flanks let the read enter and leave the haplotype
//! anywhere, with end probabilities that stop window-edge overhangs being
//! penalised. All arithmetic is in natural-log space.
//!
//! The returned score is already conditional on the haplotype: uniform
//! target emissions cancel against the `|haplotype| * ln(0.25)` correction,
//! so they are simply never added.

use crate::data::ContigRegion;

/// Probability a read base is any particular nucleotide under the random
/// and insert states.
const LN_QUARTER: f64 = -1.3862943611198906; // ln(0.25)

/// Error probability cap; quality-zero bases become uninformative rather
/// than impossible.
const MAX_BASE_ERROR: f64 = 0.75;

/// Core alignment parameters.
#[derive(Clone, Copy, Debug)]
pub struct PairHmmParams {
    pub gap_open: f64,
    pub gap_extend: f64,
}

impl Default for PairHmmParams {
    fn default() -> Self {
        Self {
            gap_open: 0.015,
            gap_extend: 0.020,
        }
    }
}

impl PairHmmParams {
    /// Upper bound on the match-state end probability:
    /// `1 - max(2 * gap_open, gap_extend)`.
    pub fn max_match_end(&self) -> f64 {
        1.0 - (2.0 * self.gap_open).max(self.gap_extend)
    }
}

/// End probabilities of the flanking random states and the match core for
/// one read/haplotype pair.
#[derive(Clone, Copy, Debug)]
pub struct FlankModel {
    pub lhs_end: f64,
    pub rhs_end: f64,
    pub match_end: f64,
}

impl FlankModel {
    /// Derive flank end probabilities from the read and haplotype regions.
    /// The side with an overhang gets `1 / (overhang + 1)` so its bases
    /// carry no penalty; a flush side keeps a high end probability.
    pub fn from_regions(
        read_region: ContigRegion,
        haplotype_region: ContigRegion,
        params: &PairHmmParams,
    ) -> Self {
        let max_match_end = params.max_match_end();
        if !read_region.overlaps(&haplotype_region) {
            return Self {
                lhs_end: 1.0 / (haplotype_region.len() as f64 + 1.0),
                rhs_end: 0.99,
                match_end: max_match_end,
            };
        }
        let covered = read_region.encompass(&haplotype_region);
        let overlap_begin = read_region.begin.max(haplotype_region.begin);
        let overlap_end = read_region.end.min(haplotype_region.end);
        let left_overhang = overlap_begin - covered.begin;
        let right_overhang = covered.end - overlap_end;
        let end_prob = |overhang: u32| {
            if overhang == 0 {
                0.99
            } else {
                1.0 / (overhang as f64 + 1.0)
            }
        };
        let overlap_len = overlap_end - overlap_begin;
        Self {
            lhs_end: end_prob(left_overhang),
            rhs_end: end_prob(right_overhang),
            match_end: (1.0 / (overlap_len as f64 + 1.0)).min(max_match_end),
        }
    }
}

#[inline]
fn base_error(quality: u8) -> f64 {
    (10f64.powf(-(quality as f64) / 10.0)).min(MAX_BASE_ERROR)
}

/// Log-Viterbi score of aligning `query` (with base `qualities`) against
/// `target`, conditional on the target sequence.
pub fn log_viterbi(
    target: &[u8],
    query: &[u8],
    qualities: &[u8],
    params: &PairHmmParams,
    flank: &FlankModel,
) -> f64 {
    let n = query.len();
    let t = target.len();
    if n == 0 || t == 0 {
        return f64::NEG_INFINITY;
    }
    debug_assert_eq!(n, qualities.len());

    let ln_match_cont = (1.0 - 2.0 * params.gap_open).ln();
    let ln_gap_open = params.gap_open.ln();
    let ln_gap_extend = params.gap_extend.ln();
    let ln_gap_close = (1.0 - params.gap_extend).ln();
    let ln_lhs_end = flank.lhs_end.ln();
    let ln_rhs_end = flank.rhs_end.ln();
    let ln_match_end = flank.match_end.ln();

    const NEG_INF: f64 = f64::NEG_INFINITY;
    // rolling rows over query positions; index j = target bases consumed
    let mut m_prev = vec![NEG_INF; t + 1];
    let mut x_prev = vec![NEG_INF; t + 1];
    let mut y_prev = vec![NEG_INF; t + 1];
    let mut m_curr = vec![NEG_INF; t + 1];
    let mut x_curr = vec![NEG_INF; t + 1];
    let mut y_curr = vec![NEG_INF; t + 1];

    let mut best = NEG_INF;
    for i in 1..=n {
        let err = base_error(qualities[i - 1]);
        let ln_hit = (1.0 - err).ln();
        let ln_miss = (err / 3.0).ln();
        // leading read bases may be consumed by the left random state
        let entry = (i - 1) as f64 * LN_QUARTER + ln_lhs_end;
        m_curr[0] = NEG_INF;
        x_curr[0] = NEG_INF;
        // insertion consumes a read base at target position 0
        y_curr[0] = LN_QUARTER + (m_prev[0] + ln_gap_open).max(y_prev[0] + ln_gap_extend);
        for j in 1..=t {
            let emit = if query[i - 1].eq_ignore_ascii_case(&target[j - 1]) {
                ln_hit
            } else {
                ln_miss
            };
            let diag = (m_prev[j - 1] + ln_match_cont)
                .max(x_prev[j - 1] + ln_gap_close)
                .max(y_prev[j - 1] + ln_gap_close);
            m_curr[j] = emit + diag.max(entry);
            y_curr[j] = LN_QUARTER + (m_prev[j] + ln_gap_open).max(y_prev[j] + ln_gap_extend);
            x_curr[j] = (m_curr[j - 1] + ln_gap_open).max(x_curr[j - 1] + ln_gap_extend);
        }
        // trailing read bases may be consumed by the right random state
        let exit = (n - i) as f64 * LN_QUARTER + ln_match_end + ln_rhs_end;
        for j in 0..=t {
            let state_best = m_curr[j]
                .max(x_curr[j] + ln_gap_close)
                .max(y_curr[j] + ln_gap_close);
            best = best.max(state_best + exit);
        }
        std::mem::swap(&mut m_prev, &mut m_curr);
        std::mem::swap(&mut x_prev, &mut x_curr);
        std::mem::swap(&mut y_prev, &mut y_curr);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_flank() -> FlankModel {
        FlankModel {
            lhs_end: 0.99,
            rhs_end: 0.99,
            match_end: PairHmmParams::default().max_match_end(),
        }
    }

    fn score(target: &[u8], query: &[u8]) -> f64 {
        let quals = vec![30u8; query.len()];
        log_viterbi(target, query, &quals, &PairHmmParams::default(), &flat_flank())
    }

    #[test]
    fn test_perfect_match_beats_mismatch() {
        let target = b"ACGTACGTACGTACGT";
        let exact = score(target, b"ACGTACGT");
        let one_off = score(target, b"ACGAACGT");
        assert!(exact.is_finite());
        assert!(exact > one_off);
    }

    #[test]
    fn test_more_mismatches_score_lower() {
        let target = b"ACGTACGTACGTACGT";
        let one = score(target, b"ACGAACGT");
        let two = score(target, b"ACGAACGA");
        assert!(one > two);
    }

    #[test]
    fn test_alignment_is_local_in_target() {
        // the read matching an internal slice scores like a prefix match
        let target = b"TTTTTACGTACGTTTTT";
        let internal = score(target, b"ACGTACGT");
        let mismatched = score(target, b"ACCCACGG");
        assert!(internal > mismatched);
    }

    #[test]
    fn test_gap_scores_between_match_and_many_mismatches() {
        let target = b"ACGTACGTACGTACGT";
        // read with a 2-base deletion relative to the target
        let gapped = score(target, b"ACGTGTACGT");
        let exact = score(target, b"ACGTACGTAC");
        assert!(exact > gapped);
        // a gap is cheaper than scattering many mismatches
        let scrambled = score(target, b"ACGTCACTGA");
        assert!(gapped > scrambled);
    }

    #[test]
    fn test_low_quality_mismatch_is_cheap() {
        let target = b"ACGTACGTACGT";
        let query = b"ACGAACGT";
        let high: Vec<u8> = vec![35; query.len()];
        let mut low = high.clone();
        low[3] = 5; // the mismatching base
        let params = PairHmmParams::default();
        let s_high = log_viterbi(target, query, &high, &params, &flat_flank());
        let s_low = log_viterbi(target, query, &low, &params, &flat_flank());
        assert!(s_low > s_high);
    }

    #[test]
    fn test_flank_model_for_overhanging_read() {
        let params = PairHmmParams::default();
        let window = ContigRegion::new(100, 200);
        // read hangs 20bp off the left window edge
        let flank = FlankModel::from_regions(ContigRegion::new(80, 180), window, &params);
        assert!((flank.lhs_end - 1.0 / 21.0).abs() < 1e-12);
        assert!((flank.rhs_end - 0.99).abs() < 1e-12);
        // contained read keeps high end probabilities on both sides
        let contained = FlankModel::from_regions(ContigRegion::new(120, 180), window, &params);
        assert!((contained.rhs_end - 0.99).abs() < 1e-12);
        assert!(contained.match_end <= params.max_match_end());
    }

    #[test]
    fn test_empty_inputs_are_impossible() {
        assert_eq!(score(b"", b"ACGT"), f64::NEG_INFINITY);
        assert_eq!(score(b"ACGT", b""), f64::NEG_INFINITY);
    }

    #[test]
    fn test_match_end_bound_holds() {
        let params = PairHmmParams::default();
        let bound = params.max_match_end();
        assert!(bound <= 1.0 - 2.0 * params.gap_open + 1e-12);
        assert!(bound <= 1.0 - params.gap_extend + 1e-12);
    }
}
