//! Metrics computation
//!
//! - `stats` - means, sample deviation, medians, bucketed trends
//! - `chunk` - mergeable partial results produced by transform workers
//! - `processor` - cached pure operations over staged records
//! - `skills` - demand, supply and gap formulas

pub mod chunk;
pub mod processor;
pub mod skills;
pub mod stats;

pub use chunk::{CandidateSupply, HireSample, MetricsChunkResult, RequisitionObservation, SkillSupply};
pub use processor::{MetricsArtifact, MetricsCache, MetricsProcessor};
