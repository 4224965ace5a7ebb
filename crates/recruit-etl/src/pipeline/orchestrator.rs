//! Pipeline orchestrator
//!
//! Runs extract, transform and load in sequence for one date range. Extract
//! and load are retried with exponential backoff (`2^attempt` backoff units,
//! no jitter, no cap); transform and validation failures are not. Every run
//! ends in a [`PipelineOutcome`], success or not.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use recruit_common::DateRange;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::extractor::{ExtractCache, Extractor};
use super::loader::{LoadReport, Loader};
use super::transform::TransformCoordinator;
use crate::cache::TtlCache;
use crate::config::{CacheConfig, PipelineConfig};
use crate::error::{ErrorKind, EtlError, EtlResult, PipelineStage, StageError};
use crate::metrics::{MetricsCache, MetricsProcessor};
use crate::stores::{DocumentSource, MetricsSink, RequisitionSource, SearchIndex};

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Extracting,
    Transforming,
    Loading,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Extracting => "extracting",
            PipelineState::Transforming => "transforming",
            PipelineState::Loading => "loading",
            PipelineState::Succeeded => "succeeded",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed)
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Extracting)
                | (Extracting, Transforming)
                | (Transforming, Loading)
                | (Loading, Succeeded)
                | (Idle | Extracting | Transforming | Loading, Failed)
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed attempt that was followed by a retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub stage: PipelineStage,
    /// The attempt that failed, starting at 1
    pub attempt: u32,
    /// Wait before the next attempt
    pub delay_ms: u64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub stage: PipelineStage,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<StageError> for OutcomeError {
    fn from(err: StageError) -> Self {
        Self {
            stage: err.stage,
            kind: err.source.kind(),
            message: err.source.message().to_string(),
        }
    }
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub success: bool,
    pub state: PipelineState,
    pub date_range: DateRange,
    pub duration_seconds: f64,
    /// Requisitions extracted and transformed
    pub records_processed: usize,
    pub metrics_rows: usize,
    pub skill_rows: usize,
    pub documents_indexed: usize,
    pub retries: Vec<RetryAttempt>,
    pub error: Option<OutcomeError>,
}

impl PipelineOutcome {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds.max(0.0))
    }
}

/// Store handles the orchestrator is built from
#[derive(Clone)]
pub struct PipelineStores {
    pub requisitions: Arc<dyn RequisitionSource>,
    pub documents: Arc<dyn DocumentSource>,
    pub sink: Arc<dyn MetricsSink>,
    pub index: Arc<dyn SearchIndex>,
}

struct RunTracker {
    state: PipelineState,
    retries: Vec<RetryAttempt>,
    records_processed: usize,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            retries: Vec::new(),
            records_processed: 0,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Unexpected pipeline state transition");
        }
        debug!(from = %self.state, to = %next, "Pipeline state change");
        self.state = next;
    }
}

fn timeout_error(stage: PipelineStage, limit: Duration) -> EtlError {
    let message = format!("{} stage timed out after {:?}", stage, limit);
    match stage {
        PipelineStage::Extract => EtlError::extraction(message),
        PipelineStage::Transform => EtlError::transform(message),
        PipelineStage::Load => EtlError::load(message),
    }
}

async fn with_timeout<T, Fut>(stage: PipelineStage, limit: Option<Duration>, fut: Fut) -> EtlResult<T>
where
    Fut: Future<Output = EtlResult<T>>,
{
    match limit {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or_else(|_| Err(timeout_error(stage, limit))),
    }
}

/// Run `op` up to `max_retries` times, sleeping `2^attempt` backoff units
/// after each retryable failure
async fn with_retry<T, F, Fut>(
    stage: PipelineStage,
    config: &PipelineConfig,
    retries: &mut Vec<RetryAttempt>,
    mut op: F,
) -> EtlResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EtlResult<T>>,
{
    let max_attempts = config.max_retries.max(1);
    let mut attempt = 1;

    loop {
        match with_timeout(stage, config.stage_timeout, op()).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = config.backoff_delay(attempt);
                warn!(
                    %stage,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Stage attempt failed, retrying"
                );
                retries.push(RetryAttempt {
                    stage,
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    error: e.to_string(),
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(e) => {
                if e.is_retryable() {
                    error!(%stage, attempts = attempt, error = %e, "Stage failed after all attempts");
                }
                return Err(e);
            },
        }
    }
}

pub struct PipelineOrchestrator {
    extractor: Extractor,
    processor: Arc<MetricsProcessor>,
    loader: Loader,
}

impl PipelineOrchestrator {
    /// Build an orchestrator owning fresh extraction and metrics caches
    pub fn new(stores: PipelineStores, index_name: impl Into<String>, cache: &CacheConfig) -> Self {
        let extract_cache: Arc<ExtractCache> = Arc::new(
            TtlCache::new("extract", cache.extract_ttl()).with_max_entries(cache.max_entries),
        );
        let metrics_cache: Arc<MetricsCache> = Arc::new(
            TtlCache::new("metrics", cache.metrics_ttl()).with_max_entries(cache.max_entries),
        );
        Self::with_caches(stores, index_name, extract_cache, metrics_cache)
    }

    /// Build an orchestrator sharing caches supplied by the caller
    pub fn with_caches(
        stores: PipelineStores,
        index_name: impl Into<String>,
        extract_cache: Arc<ExtractCache>,
        metrics_cache: Arc<MetricsCache>,
    ) -> Self {
        Self {
            extractor: Extractor::new(stores.requisitions, stores.documents, extract_cache),
            processor: Arc::new(MetricsProcessor::new(metrics_cache)),
            loader: Loader::new(stores.sink, stores.index, index_name),
        }
    }

    pub fn extract_cache(&self) -> &Arc<ExtractCache> {
        self.extractor.cache()
    }

    pub fn metrics_cache(&self) -> &Arc<MetricsCache> {
        self.processor.cache()
    }

    /// Run the pipeline for `range`; never panics and always reports an outcome
    #[instrument(skip(self, range, config), fields(range = %range))]
    pub async fn run(&self, range: DateRange, config: &PipelineConfig) -> PipelineOutcome {
        let started = Instant::now();
        let mut tracker = RunTracker::new();

        info!(
            workers = config.worker_count,
            page_size = config.page_size,
            level = %config.aggregation_level,
            "Starting pipeline run"
        );

        let result = self.execute(&range, config, &mut tracker).await;
        let duration_seconds = started.elapsed().as_secs_f64();

        match result {
            Ok(report) => {
                tracker.advance(PipelineState::Succeeded);
                info!(
                    duration_seconds,
                    records = tracker.records_processed,
                    metrics_rows = report.metrics_rows,
                    skill_rows = report.skill_rows,
                    retries = tracker.retries.len(),
                    "Pipeline run succeeded"
                );
                PipelineOutcome {
                    success: true,
                    state: tracker.state,
                    date_range: range,
                    duration_seconds,
                    records_processed: tracker.records_processed,
                    metrics_rows: report.metrics_rows,
                    skill_rows: report.skill_rows,
                    documents_indexed: report.documents_indexed,
                    retries: tracker.retries,
                    error: None,
                }
            },
            Err(e) => {
                tracker.advance(PipelineState::Failed);
                error!(
                    duration_seconds,
                    stage = %e.stage,
                    error = %e.source,
                    "Pipeline run failed"
                );
                PipelineOutcome {
                    success: false,
                    state: tracker.state,
                    date_range: range,
                    duration_seconds,
                    records_processed: tracker.records_processed,
                    metrics_rows: 0,
                    skill_rows: 0,
                    documents_indexed: 0,
                    retries: tracker.retries,
                    error: Some(e.into()),
                }
            },
        }
    }

    async fn execute(
        &self,
        range: &DateRange,
        config: &PipelineConfig,
        tracker: &mut RunTracker,
    ) -> Result<LoadReport, StageError> {
        if config.worker_count == 0 {
            return Err(StageError::new(
                PipelineStage::Transform,
                EtlError::validation("worker_count must be greater than 0"),
            ));
        }

        tracker.advance(PipelineState::Extracting);
        let extractor = &self.extractor;
        let bundle = with_retry(PipelineStage::Extract, config, &mut tracker.retries, move || {
            extractor.extract(range, config.page_size, &config.filters)
        })
        .await
        .map_err(|e| StageError::new(PipelineStage::Extract, e))?;
        tracker.records_processed = bundle.requisitions.len();

        tracker.advance(PipelineState::Transforming);
        let coordinator = TransformCoordinator::new(Arc::clone(&self.processor), config.aggregation_level);
        let output = with_timeout(
            PipelineStage::Transform,
            config.stage_timeout,
            coordinator.transform(bundle, range, config.worker_count),
        )
        .await
        .map_err(|e| StageError::new(PipelineStage::Transform, e))?;

        tracker.advance(PipelineState::Loading);
        let (loader, metrics, skills) = (&self.loader, &output.metrics, &output.skills);
        let report = with_retry(PipelineStage::Load, config, &mut tracker.retries, move || {
            loader.load(metrics, skills)
        })
        .await
        .map_err(|e| StageError::new(PipelineStage::Load, e))?;

        Ok(report)
    }
}
