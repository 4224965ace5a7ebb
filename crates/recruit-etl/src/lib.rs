//! Recruitment Analytics ETL Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Extracts requisitions, candidates and communications for a date range,
//! computes recruitment and skills metrics across parallel workers, and loads
//! the results into a relational metrics store and a search index.
//!
//! # Modules
//!
//! - [`stores`]: source and sink traits with PostgreSQL and Elasticsearch adapters
//! - [`pipeline`]: extract, transform and load stages and the orchestrator
//! - [`metrics`]: pure metric computations and mergeable partial results
//! - [`cache`]: TTL cache shared by extraction and metric computations
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use recruit_etl::config::EtlConfig;
//! use recruit_etl::pipeline::{PipelineOrchestrator, PipelineStores};
//! use recruit_etl::stores::{ElasticsearchIndex, PgDocumentSource, PgMetricsSink, PgRequisitionSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EtlConfig::load()?;
//!     let pool = sqlx::PgPool::connect(&config.database.url).await?;
//!     recruit_etl::run_migrations(&pool).await?;
//!
//!     let stores = PipelineStores {
//!         requisitions: Arc::new(PgRequisitionSource::new(pool.clone())),
//!         documents: Arc::new(PgDocumentSource::new(pool.clone())),
//!         sink: Arc::new(PgMetricsSink::new(pool)),
//!         index: Arc::new(ElasticsearchIndex::new(&config.search.url, Duration::from_secs(30))?),
//!     };
//!     let orchestrator = PipelineOrchestrator::new(stores, &config.search.index, &config.cache);
//!
//!     let range = recruit_common::DateRange::new(
//!         chrono::Utc::now() - chrono::Duration::days(30),
//!         chrono::Utc::now(),
//!     )?;
//!     let outcome = orchestrator.run(range, &config.pipeline_config()).await;
//!     println!("{}", serde_json::to_string_pretty(&outcome)?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod stores;

pub use config::{EtlConfig, PipelineConfig};
pub use error::{ErrorKind, EtlError, EtlResult, PipelineStage, StageError};
pub use pipeline::{PipelineOrchestrator, PipelineOutcome, PipelineState, PipelineStores};

/// Apply the metrics store migrations in `migrations/`
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
