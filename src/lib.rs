//! # Somavar Library
//!
//! Bayesian germline and somatic variant calling core.
//!
//! ## Modules
//! - `config`: CLI argument parsing and validation
//! - `data`: regions, alleles, haplotypes, genotypes, aligned reads
//! - `error`: error types and result aliases
//! - `io`: collaborator interfaces (reference, reads, candidates, records)
//! - `model`: haplotype tree, likelihood cache and genotype models
//! - `caller`: cancer caller orchestration and phaser
//! - `pipelines`: windowed parallel execution
//! - `utils`: shared numerical helpers

pub mod caller;
pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod utils;

// Re-export commonly used types
pub use caller::{CancerCaller, CancerCallerParams, Phaser};
pub use config::Config;
pub use data::{AlignedRead, GenomicRegion, Haplotype, SampleName, Variant};
pub use error::{Result, SomavarError};
pub use model::{HaplotypeTree, LikelihoodCache};
pub use pipelines::{CallingPipeline, WindowConfig};
pub use utils::Phred;
