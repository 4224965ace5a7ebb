//! Metrics processor
//!
//! Pure computations over staged records. Per-chunk operations are memoised in
//! a shared [`TtlCache`] keyed by operation, parameters and a SHA-256 identity
//! of the input records, so identical inputs within the TTL are computed once.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use recruit_common::{AggregationLevel, DateRange};
use tracing::{debug, instrument};

use super::chunk::{CandidateSupply, HireSample, MetricsChunkResult, RequisitionObservation};
use super::{skills, stats};
use crate::cache::{content_hash, TtlCache};
use crate::config::DEFAULT_CACHE_MAX_ENTRIES;
use crate::error::{EtlError, EtlResult};
use crate::models::{
    CandidateRecord, CommunicationRecord, RecruitmentMetricsBundle, RequisitionMetric,
    RequisitionRecord, SkillsAnalyticsBundle, TimeToHireAnalytics, TrendPoint,
};

/// Values held by the metrics cache
#[derive(Debug, Clone)]
pub enum MetricsArtifact {
    Chunk(Arc<MetricsChunkResult>),
    Supply(Arc<CandidateSupply>),
    Trend(Arc<Vec<TrendPoint>>),
    Seasonal(Arc<BTreeMap<String, f64>>),
}

pub type MetricsCache = TtlCache<String, MetricsArtifact>;

pub struct MetricsProcessor {
    cache: Arc<MetricsCache>,
}

fn identity<T: serde::Serialize + ?Sized>(records: &T) -> EtlResult<String> {
    content_hash(records).map_err(|e| EtlError::transform(format!("failed to hash records: {}", e)))
}

fn check_finite(what: &str, id: &str, value: f64) -> EtlResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EtlError::transform(format!("{} {} has non-finite value {}", what, id, value)))
    }
}

/// Time-to-hire of a filled record, rejecting values no arithmetic should produce
fn measured_time_to_hire(record: &RequisitionRecord) -> EtlResult<Option<f64>> {
    match record.time_to_hire_days() {
        Some(days) if days < 0.0 => Err(EtlError::transform(format!(
            "requisition {} has negative time to hire ({} days)",
            record.id, days
        ))),
        Some(days) => {
            check_finite("requisition", &record.id, days)?;
            Ok(Some(days))
        },
        None => Ok(None),
    }
}

impl MetricsProcessor {
    pub fn new(cache: Arc<MetricsCache>) -> Self {
        Self { cache }
    }

    /// Processor with a private cache
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(Arc::new(
            TtlCache::new("metrics", ttl).with_max_entries(DEFAULT_CACHE_MAX_ENTRIES),
        ))
    }

    pub fn cache(&self) -> &Arc<MetricsCache> {
        &self.cache
    }

    /// Partial aggregates over one set of requisitions
    pub fn aggregate(
        &self,
        records: &[RequisitionRecord],
        level: AggregationLevel,
    ) -> EtlResult<MetricsChunkResult> {
        let key = format!("metrics_{}_{}", level, identity(records)?);
        if let Some(MetricsArtifact::Chunk(cached)) = self.cache.get(&key) {
            return Ok(cached.as_ref().clone());
        }

        let mut result = MetricsChunkResult::empty(level);
        for record in records {
            let time_to_hire = measured_time_to_hire(record)?;
            if let Some(score) = record.satisfaction_score {
                check_finite("requisition", &record.id, score)?;
            }

            result.total += 1;
            if record.is_filled() {
                result.filled += 1;
            }
            if let Some(days) = time_to_hire {
                result.hire_samples.push(HireSample {
                    created_at: record.created_at,
                    days,
                });
            }
            for skill in &record.required_skills {
                result.skill_demand.entry(skill.clone()).or_default().push(record.created_at);
            }
            result.first_seen = Some(result.first_seen.map_or(record.created_at, |t| t.min(record.created_at)));
            result.last_seen = Some(result.last_seen.map_or(record.created_at, |t| t.max(record.created_at)));
            result.observations.push(RequisitionObservation {
                requisition_id: record.id.clone(),
                time_to_hire,
                satisfaction_score: record.satisfaction_score,
                created_at: record.created_at,
            });
        }

        debug!(
            level = %level,
            total = result.total,
            filled = result.filled,
            "Aggregated requisition chunk"
        );
        self.cache.insert(key, MetricsArtifact::Chunk(Arc::new(result.clone())));
        Ok(result)
    }

    /// Mean time-to-hire per window-sized bucket, starting at the earliest sample
    pub fn trend_points(
        &self,
        series: &[(DateTime<Utc>, f64)],
        window: ChronoDuration,
    ) -> EtlResult<Vec<TrendPoint>> {
        if window <= ChronoDuration::zero() {
            return Err(EtlError::validation("trend window must be positive"));
        }
        let key = format!("trend_{}_{}", window.num_seconds(), identity(series)?);
        if let Some(MetricsArtifact::Trend(cached)) = self.cache.get(&key) {
            return Ok(cached.as_ref().clone());
        }

        let points = stats::trend_from_samples(series, window);
        self.cache.insert(key, MetricsArtifact::Trend(Arc::new(points.clone())));
        Ok(points)
    }

    /// Monthly time-to-hire relative to the overall mean
    pub fn seasonal_indices(&self, series: &[(DateTime<Utc>, f64)]) -> EtlResult<BTreeMap<String, f64>> {
        let key = format!("seasonal_{}", identity(series)?);
        if let Some(MetricsArtifact::Seasonal(cached)) = self.cache.get(&key) {
            return Ok(cached.as_ref().clone());
        }

        let indices = stats::seasonal_from_samples(series);
        self.cache.insert(key, MetricsArtifact::Seasonal(Arc::new(indices.clone())));
        Ok(indices)
    }

    /// Candidate supply per skill, with engagement taken from communications
    pub fn analyze_candidates(
        &self,
        candidates: &[CandidateRecord],
        communications: &[CommunicationRecord],
    ) -> EtlResult<CandidateSupply> {
        let key = format!(
            "supply_{}_{}",
            identity(candidates)?,
            identity(communications)?
        );
        if let Some(MetricsArtifact::Supply(cached)) = self.cache.get(&key) {
            return Ok(cached.as_ref().clone());
        }

        let participants: HashSet<&str> = communications
            .iter()
            .flat_map(|c| c.participants.iter().map(String::as_str))
            .collect();

        let mut supply = CandidateSupply::default();
        for candidate in candidates {
            if !candidate.experience_years.is_finite() || candidate.experience_years < 0.0 {
                return Err(EtlError::transform(format!(
                    "candidate {} has invalid experience {}",
                    candidate.id, candidate.experience_years
                )));
            }
            let engaged = participants.contains(candidate.id.as_str());
            supply.total_candidates += 1;
            if engaged {
                supply.engaged_candidates += 1;
            }
            for skill in &candidate.skills {
                let entry = supply.skills.entry(skill.clone()).or_default();
                entry.candidates += 1;
                entry.experience_sum += candidate.experience_years;
                if engaged {
                    entry.engaged += 1;
                }
            }
        }

        self.cache.insert(key, MetricsArtifact::Supply(Arc::new(supply.clone())));
        Ok(supply)
    }

    /// Merge chunk results into the metrics bundle for `requested`
    pub fn combine(
        &self,
        chunks: Vec<MetricsChunkResult>,
        level: AggregationLevel,
        requested: &DateRange,
    ) -> EtlResult<RecruitmentMetricsBundle> {
        let merged = MetricsChunkResult::merge_all(level, chunks)?;
        self.finalize(&merged, requested)
    }

    /// Build the metrics bundle from an already merged result
    ///
    /// The period spans the first to last requisition seen, or `requested` when
    /// no requisition was seen. Row ids derive from `requested` so reruns over
    /// the same range overwrite rather than duplicate.
    pub fn finalize(
        &self,
        merged: &MetricsChunkResult,
        requested: &DateRange,
    ) -> EtlResult<RecruitmentMetricsBundle> {
        let period = match (merged.first_seen, merged.last_seen) {
            (Some(start), Some(end)) => DateRange::new(start, end)?,
            _ => *requested,
        };

        let fill_rate = merged.fill_rate();
        let requisition_metrics = merged
            .observations
            .iter()
            .map(|obs| RequisitionMetric {
                id: RequisitionMetric::row_id(&obs.requisition_id, requested),
                requisition_id: obs.requisition_id.clone(),
                time_to_hire: obs.time_to_hire,
                fill_rate,
                satisfaction_score: obs.satisfaction_score,
                created_at: obs.created_at,
            })
            .collect();

        let bundle = RecruitmentMetricsBundle {
            total_requisitions: merged.total,
            filled_requisitions: merged.filled,
            average_time_to_hire: merged.average_time_to_hire(),
            client_satisfaction_rate: merged.satisfaction_rate(),
            requisition_fill_rate: fill_rate,
            period,
            skill_based_metrics: merged.skill_prevalence(),
            requisition_metrics,
        };

        for (name, value) in [
            ("average_time_to_hire", bundle.average_time_to_hire),
            ("client_satisfaction_rate", bundle.client_satisfaction_rate),
            ("requisition_fill_rate", bundle.requisition_fill_rate),
        ] {
            check_finite("metric", name, value)?;
        }
        Ok(bundle)
    }

    pub fn time_to_hire(&self, merged: &MetricsChunkResult) -> EtlResult<TimeToHireAnalytics> {
        let values = merged.time_to_hire_values();
        let series = merged.time_to_hire_series();
        Ok(TimeToHireAnalytics {
            average_days: merged.average_time_to_hire(),
            median_days: stats::median(&values).unwrap_or(0.0),
            trend_data: self.trend_points(&series, merged.level.window())?,
            seasonal_patterns: self.seasonal_indices(&series)?,
        })
    }

    #[instrument(skip_all, fields(skills = merged.skill_demand.len()))]
    pub fn skills_analytics(
        &self,
        merged: &MetricsChunkResult,
        supply: &CandidateSupply,
        period: &DateRange,
    ) -> SkillsAnalyticsBundle {
        skills::build(merged, supply, period)
    }
}
