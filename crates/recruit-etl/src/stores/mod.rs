//! Store interfaces consumed by the pipeline
//!
//! The pipeline only sees these traits. Concrete adapters live in
//! [`postgres`] (relational source, document collections, metrics sink) and
//! [`elasticsearch`] (search sink); tests substitute in-memory doubles.

use async_trait::async_trait;
use recruit_common::DateRange;

use crate::error::EtlResult;
use crate::models::{ExtractFilters, PageRequest, RequisitionMetric, RequisitionRow, SkillMetric};

pub mod elasticsearch;
pub mod postgres;

pub use elasticsearch::ElasticsearchIndex;
pub use postgres::{PgDocumentSource, PgMetricsSink, PgRequisitionSource};

/// Relational source of requisitions joined with client attributes
#[async_trait]
pub trait RequisitionSource: Send + Sync {
    /// Fetch one page of requisitions created within `range`
    ///
    /// Pages are stably ordered so that consecutive offsets never overlap.
    /// Failures are reported as extraction errors.
    async fn fetch_requisitions(
        &self,
        range: &DateRange,
        filters: &ExtractFilters,
        page: PageRequest,
    ) -> EtlResult<Vec<RequisitionRow>>;
}

/// Document collections scanned during extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Candidates,
    Communications,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Candidates => "candidates",
            Collection::Communications => "communications",
        }
    }

    /// Field the date range is applied to
    pub fn time_field(&self) -> &'static str {
        match self {
            Collection::Candidates => "created_at",
            Collection::Communications => "timestamp",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Document store supporting filtered, paged scans
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn scan(
        &self,
        collection: Collection,
        range: &DateRange,
        page: PageRequest,
    ) -> EtlResult<Vec<serde_json::Value>>;
}

/// Transactional relational sink for metric rows
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Upsert both row sets in one transaction, all or nothing
    ///
    /// Returns the number of rows written. Writing the same rows twice leaves
    /// the tables unchanged.
    async fn write_metrics(
        &self,
        metrics: &[RequisitionMetric],
        skills: &[SkillMetric],
    ) -> EtlResult<u64>;
}

/// A document to index, addressed by a stable id
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub id: String,
    pub body: serde_json::Value,
}

/// Search sink with bulk indexing
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Index all documents, replacing any existing document with the same id
    async fn bulk_index(&self, index: &str, documents: Vec<IndexDocument>) -> EtlResult<usize>;
}
