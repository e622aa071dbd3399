//! # Call Types
//!
//! The per-site outputs of the cancer caller: variant calls with per-sample
//! genotype assignments and optional somatic annotation, and reference
//! calls over candidate sites confidently homozygous reference. Phase
//! fields are filled in by the phaser after calling.

use crate::data::{SampleName, Variant};
use crate::utils::maths::Phred;

/// A called genotype for one sample at one site, in allele-index form
/// (0 = reference, 1 = alternative).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenotypeCall {
    pub allele_indices: Vec<u8>,
    pub phased: bool,
}

impl GenotypeCall {
    /// VCF-style GT string, e.g. `0/1` or `1|1`.
    pub fn gt_string(&self) -> String {
        let sep = if self.phased { "|" } else { "/" };
        self.allele_indices
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(sep)
    }

    pub fn carries_alt(&self) -> bool {
        self.allele_indices.iter().any(|&a| a > 0)
    }
}

/// Somatic annotation attached to a variant call.
#[derive(Clone, Debug)]
pub struct SomaticAnnotation {
    pub posterior: Phred,
    /// expected somatic allele fraction per sample, tumour samples only
    pub expected_vafs: Vec<(SampleName, f64)>,
}

/// Per-sample block of a variant call.
#[derive(Clone, Debug)]
pub struct SampleCall {
    pub sample: SampleName,
    pub genotype: GenotypeCall,
    pub genotype_quality: Phred,
    /// posterior probabilities of the germline / cnv / somatic models
    pub model_posteriors: [f64; 3],
    pub phase_set: Option<u32>,
    pub phase_quality: Option<Phred>,
}

/// A called variant site.
#[derive(Clone, Debug)]
pub struct VariantCall {
    pub variant: Variant,
    pub quality: Phred,
    pub samples: Vec<SampleCall>,
    pub somatic: Option<SomaticAnnotation>,
}

/// A confidently homozygous-reference site.
#[derive(Clone, Debug)]
pub struct ReferenceCall {
    pub variant: Variant,
    pub quality: Phred,
}

/// Everything a window emits.
#[derive(Clone, Debug, Default)]
pub struct CallSet {
    pub variants: Vec<VariantCall>,
    pub reference: Vec<ReferenceCall>,
}

impl CallSet {
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty() && self.reference.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gt_string_formatting() {
        let unphased = GenotypeCall {
            allele_indices: vec![0, 1],
            phased: false,
        };
        assert_eq!(unphased.gt_string(), "0/1");
        assert!(unphased.carries_alt());

        let phased = GenotypeCall {
            allele_indices: vec![1, 1],
            phased: true,
        };
        assert_eq!(phased.gt_string(), "1|1");

        let hom_ref = GenotypeCall {
            allele_indices: vec![0, 0],
            phased: false,
        };
        assert!(!hom_ref.carries_alt());
    }
}
