//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.
//!
//! Fatal conditions (`UnsupportedPloidy`, `BadRegion`, `Config`) abort the
//! current window or the whole run. Recoverable conditions
//! (`InsufficientCoverage`, `Degenerate`) are handled by the calling
//! pipeline, which falls back to reference-only output for the window.

use thiserror::Error;

/// Main error type for Somavar operations
#[derive(Error, Debug)]
pub enum SomavarError {
    /// Ploidy outside the dispatched range of the mixture models
    #[error("unsupported ploidy {ploidy}: genotype models dispatch ploidies 1..=8")]
    UnsupportedPloidy { ploidy: u32 },

    /// Empty or inverted genomic region
    #[error("bad region {contig}:{begin}-{end}: {message}")]
    BadRegion {
        contig: String,
        begin: u32,
        end: u32,
        message: String,
    },

    /// No reads mapped to the window; the window yields no calls
    #[error("insufficient coverage in {region}")]
    InsufficientCoverage { region: String },

    /// All haplotypes identical, or likelihood underflow; the window falls
    /// back to reference calls
    #[error("degenerate model input: {message}")]
    Degenerate { message: String },

    /// Invalid caller configuration (thresholds, expressions, sample names)
    #[error("configuration error: {message}")]
    Config { message: String },

    /// I/O errors from collaborator shims
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Results using SomavarError
pub type Result<T> = std::result::Result<T, SomavarError>;

impl SomavarError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a degenerate-input error
    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::Degenerate {
            message: message.into(),
        }
    }

    /// Create an insufficient-coverage error for a region
    pub fn insufficient_coverage(region: impl Into<String>) -> Self {
        Self::InsufficientCoverage {
            region: region.into(),
        }
    }

    /// Create a bad-region error
    pub fn bad_region(
        contig: impl Into<String>,
        begin: u32,
        end: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::BadRegion {
            contig: contig.into(),
            begin,
            end,
            message: message.into(),
        }
    }

    /// Whether the pipeline may recover from this error by emitting an
    /// empty or reference-only call set for the window
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientCoverage { .. } | Self::Degenerate { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(SomavarError::insufficient_coverage("chr1:0-100").is_recoverable());
        assert!(SomavarError::degenerate("all haplotypes equal").is_recoverable());
        assert!(!SomavarError::UnsupportedPloidy { ploidy: 9 }.is_recoverable());
        assert!(!SomavarError::config("bad threshold").is_recoverable());
        assert!(!SomavarError::bad_region("chr1", 10, 5, "inverted").is_recoverable());
    }
}
