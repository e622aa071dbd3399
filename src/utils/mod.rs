//! # Shared Utilities
//!
//! Numerical helpers used across the data layer, the genotype models and
//! the caller.

pub mod maths;

pub use maths::Phred;
