//! # Configuration Logic
//!
//! CLI argument parsing and validation using clap derive, plus the
//! threshold-expression grammar consumed by downstream call filters: a
//! `|`-separated list of `measure <op> value` clauses. All validation
//! failures surface at construction, never at runtime.

use clap::Parser;
use std::path::PathBuf;

use crate::caller::CancerCallerParams;
use crate::error::{Result, SomavarError};
use crate::model::individual::MAX_PLOIDY;
use crate::pipelines::WindowConfig;
use crate::utils::maths::Phred;

/// Somavar: Bayesian germline and somatic variant calling
#[derive(Parser, Debug, Clone)]
#[command(name = "somavar")]
#[command(author = "Somavar Authors")]
#[command(version = "0.1.0")]
#[command(about = "Bayesian germline and somatic variant calling", long_about = None)]
pub struct Config {
    // ============ Data Parameters ============
    /// Reference genome FASTA (required)
    #[arg(long, value_name = "FILE")]
    pub reference: PathBuf,

    /// SAM file with tumour reads (required)
    #[arg(long, value_name = "FILE")]
    pub reads: PathBuf,

    /// Sample name for the reads file
    #[arg(long, default_value = "TUMOUR")]
    pub sample: String,

    /// Optional SAM file with normal reads
    #[arg(long, value_name = "FILE")]
    pub normal_reads: Option<PathBuf>,

    /// Sample name for the normal reads file
    #[arg(long, default_value = "NORMAL")]
    pub normal_sample_name: String,

    /// Restrict calling to [chrom] or [chrom]:[begin]-[end]
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// Output VCF path (stdout when omitted)
    #[arg(long, short, value_name = "FILE")]
    pub out: Option<PathBuf>,

    // ============ Caller Parameters ============
    /// Germline ploidy
    #[arg(long, default_value = "2")]
    pub ploidy: u32,

    /// Minimum Phred posterior for variant emission
    #[arg(long, default_value = "3.0")]
    pub min_variant_posterior: f64,

    /// Minimum Phred posterior for somatic flagging
    #[arg(long, default_value = "2.0")]
    pub min_somatic_posterior: f64,

    /// Minimum Phred posterior for reference-homozygous emission
    #[arg(long, default_value = "2.0")]
    pub min_refcall_posterior: f64,

    /// Base somatic mutation rate
    #[arg(long, default_value = "0.00001")]
    pub somatic_mutation_rate: f64,

    /// Minimum implied somatic allele fraction
    #[arg(long, default_value = "0.01")]
    pub min_somatic_frequency: f64,

    /// Posterior mass retained when truncating the cancer genotype set
    #[arg(long, default_value = "0.99")]
    pub credible_mass: f64,

    /// Cap on the cancer genotype set size
    #[arg(long, default_value = "5000")]
    pub max_genotypes: usize,

    /// Minimum Phred phase score for a phase region
    #[arg(long, default_value = "10.0")]
    pub min_phase_score: f64,

    // ============ General Parameters ============
    /// Window length in reference bases
    #[arg(long, default_value = "1000")]
    pub window_size: u32,

    /// Haplotype ceiling per window
    #[arg(long, default_value = "128")]
    pub max_haplotypes: usize,

    /// Number of threads (default: all available cores)
    #[arg(long)]
    pub nthreads: Option<usize>,

    /// Threshold filter expression handed to downstream filters,
    /// e.g. "QUAL < 10 | DP < 4"
    #[arg(long, value_name = "EXPR")]
    pub filter_expression: Option<String>,
}

impl Config {
    /// Parse command line arguments and validate
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !self.reference.exists() {
            return Err(SomavarError::config(format!(
                "reference not found: {:?}",
                self.reference
            )));
        }
        if !self.reads.exists() {
            return Err(SomavarError::config(format!(
                "reads not found: {:?}",
                self.reads
            )));
        }
        if let Some(normal) = &self.normal_reads {
            if !normal.exists() {
                return Err(SomavarError::config(format!(
                    "normal reads not found: {normal:?}"
                )));
            }
        }
        if self.ploidy == 0 || self.ploidy > MAX_PLOIDY {
            return Err(SomavarError::UnsupportedPloidy {
                ploidy: self.ploidy,
            });
        }
        if !(0.0..=1.0).contains(&self.credible_mass) {
            return Err(SomavarError::config("credible_mass must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.min_somatic_frequency) {
            return Err(SomavarError::config(
                "min_somatic_frequency must lie in [0, 1]",
            ));
        }
        if let Some(expression) = &self.filter_expression {
            parse_threshold_conditions(expression)?;
        }
        if let Some(region) = &self.region {
            parse_region(region)?;
        }
        Ok(())
    }

    /// The number of threads to use
    pub fn nthreads(&self) -> usize {
        self.nthreads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Caller parameters derived from the flags
    pub fn caller_params(&self) -> CancerCallerParams {
        CancerCallerParams {
            ploidy: self.ploidy,
            normal_sample: self
                .normal_reads
                .is_some()
                .then(|| self.normal_sample_name.clone()),
            min_variant_posterior: Phred(self.min_variant_posterior),
            min_somatic_posterior: Phred(self.min_somatic_posterior),
            min_refcall_posterior: Phred(self.min_refcall_posterior),
            somatic_mutation_rate: self.somatic_mutation_rate,
            min_somatic_frequency: self.min_somatic_frequency,
            credible_mass: self.credible_mass,
            max_genotypes: self.max_genotypes,
        }
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            window_size: self.window_size,
            max_haplotypes: self.max_haplotypes,
        }
    }
}

/// `[chrom]` or `[chrom]:[begin]-[end]` with 1-based inclusive begin.
pub fn parse_region(text: &str) -> Result<(String, Option<(u32, u32)>)> {
    match text.split_once(':') {
        None => Ok((text.to_string(), None)),
        Some((contig, span)) => {
            let (begin, end) = span
                .split_once('-')
                .ok_or_else(|| SomavarError::config(format!("malformed region: {text}")))?;
            let begin: u32 = begin
                .replace(',', "")
                .parse()
                .map_err(|_| SomavarError::config(format!("malformed region: {text}")))?;
            let end: u32 = end
                .replace(',', "")
                .parse()
                .map_err(|_| SomavarError::config(format!("malformed region: {text}")))?;
            if begin == 0 || end < begin {
                return Err(SomavarError::config(format!("malformed region: {text}")));
            }
            Ok((contig.to_string(), Some((begin - 1, end))))
        }
    }
}

/// Comparator of a threshold clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

/// One `measure <op> value` clause.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdCondition {
    pub measure: String,
    pub comparator: Comparator,
    pub value: f64,
}

/// Parse a `|`-separated list of `measure <op> value` clauses with
/// op in {==, <, <=, >, >=}.
pub fn parse_threshold_conditions(expression: &str) -> Result<Vec<ThresholdCondition>> {
    let mut conditions = Vec::new();
    for clause in expression.split('|') {
        let clause = clause.trim();
        if clause.is_empty() {
            return Err(SomavarError::config(format!(
                "empty clause in threshold expression: {expression}"
            )));
        }
        // longest comparators first so "<=" is not read as "<"
        let comparator_of = |token: &str| match token {
            "==" => Some(Comparator::Equal),
            "<=" => Some(Comparator::LessEqual),
            ">=" => Some(Comparator::GreaterEqual),
            "<" => Some(Comparator::Less),
            ">" => Some(Comparator::Greater),
            _ => None,
        };
        let mut parsed = None;
        for op in ["==", "<=", ">=", "<", ">"] {
            if let Some((measure, value)) = clause.split_once(op) {
                let measure = measure.trim();
                let value = value.trim();
                if measure.is_empty() || value.is_empty() {
                    break;
                }
                let value: f64 = value.parse().map_err(|_| {
                    SomavarError::config(format!("non-numeric threshold in clause: {clause}"))
                })?;
                parsed = Some(ThresholdCondition {
                    measure: measure.to_string(),
                    comparator: comparator_of(op).unwrap(),
                    value,
                });
                break;
            }
        }
        match parsed {
            Some(condition) => conditions.push(condition),
            None => {
                return Err(SomavarError::config(format!(
                    "malformed threshold clause: {clause}"
                )))
            }
        }
    }
    Ok(conditions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_clause() {
        let conditions = parse_threshold_conditions("QUAL < 10").unwrap();
        assert_eq!(
            conditions,
            vec![ThresholdCondition {
                measure: "QUAL".to_string(),
                comparator: Comparator::Less,
                value: 10.0,
            }]
        );
    }

    #[test]
    fn test_parse_multiple_clauses_and_operators() {
        let conditions =
            parse_threshold_conditions("QUAL < 10 | DP >= 4 | AF <= 0.5 | MQ == 60 | GQ > 20")
                .unwrap();
        assert_eq!(conditions.len(), 5);
        assert_eq!(conditions[1].comparator, Comparator::GreaterEqual);
        assert_eq!(conditions[2].comparator, Comparator::LessEqual);
        assert_eq!(conditions[3].comparator, Comparator::Equal);
        assert_eq!(conditions[4].comparator, Comparator::Greater);
    }

    #[test]
    fn test_parse_rejects_malformed_expressions() {
        assert!(parse_threshold_conditions("QUAL 10").is_err());
        assert!(parse_threshold_conditions("QUAL < ten").is_err());
        assert!(parse_threshold_conditions("QUAL < 10 |").is_err());
        assert!(parse_threshold_conditions("< 10").is_err());
    }

    #[test]
    fn test_parse_region_forms() {
        assert_eq!(parse_region("chr1").unwrap(), ("chr1".to_string(), None));
        assert_eq!(
            parse_region("chr1:1,001-2,000").unwrap(),
            ("chr1".to_string(), Some((1000, 2000)))
        );
        assert!(parse_region("chr1:10").is_err());
        assert!(parse_region("chr1:0-10").is_err());
        assert!(parse_region("chr1:20-10").is_err());
    }
}
