//! Transform stage
//!
//! Splits the staged requisitions and candidates into `worker_count`
//! contiguous chunks, computes each chunk on the blocking pool, and merges the
//! partial results once every worker has finished. Communications are shared
//! read-only with all workers.

use std::ops::Range;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use recruit_common::{AggregationLevel, DateRange};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::{EtlError, EtlResult};
use crate::metrics::{CandidateSupply, MetricsChunkResult, MetricsProcessor};
use crate::models::{
    RawExtractBundle, RecruitmentMetricsBundle, SkillsAnalyticsBundle, TimeToHireAnalytics,
};

/// Everything the transform produces for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformOutput {
    pub metrics: RecruitmentMetricsBundle,
    pub skills: SkillsAnalyticsBundle,
    pub time_to_hire: TimeToHireAnalytics,
}

struct WorkerOutput {
    metrics: MetricsChunkResult,
    supply: CandidateSupply,
}

/// Split `len` items into `parts` contiguous ranges whose sizes differ by at
/// most one, the trailing ranges taking one extra item each for the remainder
///
/// `parts` must be non-zero.
pub fn partition_bounds(len: usize, parts: usize) -> Vec<Range<usize>> {
    let base = len / parts;
    let short = parts - len % parts;
    (0..parts)
        .map(|i| {
            let start = i * base + i.saturating_sub(short);
            let end = start + base + usize::from(i >= short);
            start..end
        })
        .collect()
}

pub struct TransformCoordinator {
    processor: Arc<MetricsProcessor>,
    level: AggregationLevel,
}

impl TransformCoordinator {
    pub fn new(processor: Arc<MetricsProcessor>, level: AggregationLevel) -> Self {
        Self { processor, level }
    }

    /// Fan out over `worker_count` chunks and merge
    ///
    /// All or nothing: the first worker failure observed is returned once the
    /// remaining workers have finished, and their results are discarded.
    #[instrument(skip(self, bundle, requested), fields(level = %self.level))]
    pub async fn transform(
        &self,
        bundle: Arc<RawExtractBundle>,
        requested: &DateRange,
        worker_count: usize,
    ) -> EtlResult<TransformOutput> {
        if worker_count == 0 {
            return Err(EtlError::validation("worker_count must be greater than 0"));
        }

        let requisition_chunks = partition_bounds(bundle.requisitions.len(), worker_count);
        let candidate_chunks = partition_bounds(bundle.candidates.len(), worker_count);

        let mut workers = FuturesUnordered::new();
        for (worker, (requisitions, candidates)) in
            requisition_chunks.into_iter().zip(candidate_chunks).enumerate()
        {
            let bundle = Arc::clone(&bundle);
            let processor = Arc::clone(&self.processor);
            let level = self.level;

            let handle = tokio::task::spawn_blocking(move || -> EtlResult<WorkerOutput> {
                let metrics = processor.aggregate(&bundle.requisitions[requisitions], level)?;
                let supply =
                    processor.analyze_candidates(&bundle.candidates[candidates], &bundle.communications)?;
                Ok(WorkerOutput { metrics, supply })
            });
            workers.push(async move { (worker, handle.await) });
        }

        let mut chunks = Vec::with_capacity(worker_count);
        let mut supplies = Vec::with_capacity(worker_count);
        let mut first_error: Option<EtlError> = None;

        while let Some((worker, joined)) = workers.next().await {
            match joined {
                Ok(Ok(output)) => {
                    chunks.push(output.metrics);
                    supplies.push(output.supply);
                },
                Ok(Err(e)) => {
                    warn!(worker, error = %e, "Transform worker failed");
                    first_error.get_or_insert(e);
                },
                Err(join_error) => {
                    warn!(worker, error = %join_error, "Transform worker aborted");
                    first_error.get_or_insert_with(|| {
                        EtlError::transform(format!("worker {} aborted: {}", worker, join_error))
                    });
                },
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let merged = MetricsChunkResult::merge_all(self.level, chunks)?;
        let supply = CandidateSupply::merge_all(supplies);

        let metrics = self.processor.finalize(&merged, requested)?;
        let skills = self.processor.skills_analytics(&merged, &supply, requested);
        let time_to_hire = self.processor.time_to_hire(&merged)?;

        info!(
            workers = worker_count,
            requisitions = metrics.total_requisitions,
            filled = metrics.filled_requisitions,
            skills = skills.skill_demand.len(),
            "Transform complete"
        );

        Ok(TransformOutput {
            metrics,
            skills,
            time_to_hire,
        })
    }
}
