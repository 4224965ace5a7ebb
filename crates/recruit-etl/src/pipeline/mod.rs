//! Extract, transform and load stages plus the orchestrator that sequences them
//!
//! ```text
//! RequisitionSource ─┐                        ┌─> MetricsSink
//!                    ├─> Extractor ─> Transform ─> Loader
//! DocumentSource ────┘     (cache)   (workers)  └─> SearchIndex
//! ```

pub mod extractor;
pub mod loader;
pub mod orchestrator;
pub mod transform;

pub use extractor::{ExtractCache, Extractor};
pub use loader::{LoadReport, Loader};
pub use orchestrator::{
    OutcomeError, PipelineOrchestrator, PipelineOutcome, PipelineState, PipelineStores, RetryAttempt,
};
pub use transform::{partition_bounds, TransformCoordinator, TransformOutput};
