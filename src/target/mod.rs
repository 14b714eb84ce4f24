//! Directory targets
//!
//! The registry of configured remote servers and the per-operation
//! candidate sets computed over it.

pub mod candidates;
pub mod registry;

pub use candidates::{CandidateSelector, CandidateSet, SuffixSelector};
pub use registry::{RewriteMap, Target, TargetRegistry};
