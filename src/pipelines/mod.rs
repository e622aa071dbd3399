//! # Pipelines Module (Orchestration)
//!
//! High-level workflow coordination: connects the collaborator interfaces,
//! the haplotype machinery and the caller, owns the parallel execution
//! across windows, and keeps record emission in genomic order.

pub mod calling;

pub use calling::{CallingPipeline, CallingSummary, RecordSink, WindowConfig};
