//! # Caller Module
//!
//! Orchestration of the genotype models into per-site calls, plus the
//! phaser that groups the called genotypes into phase sets.

pub mod call;
pub mod cancer;
pub mod phaser;

pub use call::{CallSet, ReferenceCall, SampleCall, VariantCall};
pub use cancer::{CancerCaller, CancerCallerParams, Latents, ModelPosteriors, ModelPriors};
pub use phaser::{PhaseRegion, PhaseSet, Phaser};
