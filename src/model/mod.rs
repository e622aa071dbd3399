//! # Model Module
//!
//! Statistical machinery of the caller.
//!
//! ## Core Algorithms
//! - `tree`: bounded haplotype enumeration over candidate alleles
//! - `kmer` + `pair_hmm` + `likelihood`: the read/haplotype likelihood cache
//! - `coalescent` + `somatic`: genotype prior models
//! - `genotype_likelihood`: fixed-ploidy germline read likelihoods
//! - `vb`: the variational mixture skeleton
//! - `individual` / `cnv` / `tumour`: the three inference models

pub mod cnv;
pub mod coalescent;
pub mod genotype_likelihood;
pub mod individual;
pub mod kmer;
pub mod likelihood;
pub mod pair_hmm;
pub mod somatic;
pub mod tree;
pub mod tumour;
pub mod vb;

pub use cnv::CnvModel;
pub use coalescent::{CoalescentModel, CoalescentParams};
pub use individual::{IndividualModel, MAX_PLOIDY};
pub use likelihood::LikelihoodCache;
pub use pair_hmm::PairHmmParams;
pub use somatic::{SomaticMutationModel, SomaticParams};
pub use tree::HaplotypeTree;
pub use tumour::TumourModel;
pub use vb::VbParams;
