//! Load stage
//!
//! Writes metric rows to the relational sink in one transaction, then indexes
//! the same rows into the search sink under the same ids. The two writes are
//! sequential and not atomic together: when indexing fails after the commit the
//! relational rows stay, and a retry overwrites both sinks idempotently.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::error::{EtlError, EtlResult};
use crate::models::{RecruitmentMetricsBundle, RequisitionMetric, SkillMetric, SkillsAnalyticsBundle};
use crate::stores::{IndexDocument, MetricsSink, SearchIndex};

/// Counts reported by a successful load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub metrics_rows: usize,
    pub skill_rows: usize,
    pub documents_indexed: usize,
}

pub struct Loader {
    sink: Arc<dyn MetricsSink>,
    index: Arc<dyn SearchIndex>,
    index_name: String,
}

fn to_document<T: Serialize>(record_type: &str, id: String, row: &T) -> EtlResult<IndexDocument> {
    let mut body = serde_json::to_value(row)
        .map_err(|e| EtlError::load_from("Failed to encode search document", e))?;
    if let Some(fields) = body.as_object_mut() {
        fields.insert("record_type".to_string(), json!(record_type));
    }
    Ok(IndexDocument { id, body })
}

/// Skill rows for the bundle's reporting period
pub fn skill_rows(skills: &SkillsAnalyticsBundle) -> Vec<SkillMetric> {
    skills
        .skill_demand
        .iter()
        .map(|demand| SkillMetric::from_demand(demand, &skills.period))
        .collect()
}

/// Search documents for both row sets, keyed by row id
pub fn index_documents(
    metrics: &[RequisitionMetric],
    skills: &[SkillMetric],
) -> EtlResult<Vec<IndexDocument>> {
    let mut documents = Vec::with_capacity(metrics.len() + skills.len());
    for row in metrics {
        documents.push(to_document("requisition_metric", row.id.to_string(), row)?);
    }
    for row in skills {
        documents.push(to_document("skill_metric", row.id.to_string(), row)?);
    }
    Ok(documents)
}

impl Loader {
    pub fn new(sink: Arc<dyn MetricsSink>, index: Arc<dyn SearchIndex>, index_name: impl Into<String>) -> Self {
        Self {
            sink,
            index,
            index_name: index_name.into(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    #[instrument(skip_all, fields(index = %self.index_name))]
    pub async fn load(
        &self,
        bundle: &RecruitmentMetricsBundle,
        skills: &SkillsAnalyticsBundle,
    ) -> EtlResult<LoadReport> {
        let metrics = &bundle.requisition_metrics;
        let skill_metrics = skill_rows(skills);

        self.sink.write_metrics(metrics, &skill_metrics).await?;

        let documents = index_documents(metrics, &skill_metrics)?;
        let documents_indexed = self.index.bulk_index(&self.index_name, documents).await?;

        let report = LoadReport {
            metrics_rows: metrics.len(),
            skill_rows: skill_metrics.len(),
            documents_indexed,
        };
        info!(
            metrics_rows = report.metrics_rows,
            skill_rows = report.skill_rows,
            documents = report.documents_indexed,
            "Load complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use recruit_common::DateRange;
    use uuid::Uuid;

    #[test]
    fn test_index_documents_tag_record_type_and_reuse_ids() {
        let period = DateRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let metric = RequisitionMetric {
            id: Uuid::new_v4(),
            requisition_id: "req-1".into(),
            time_to_hire: Some(12.5),
            fill_rate: 50.0,
            satisfaction_score: None,
            created_at: period.start(),
        };
        let skill = SkillMetric {
            id: SkillMetric::row_id("rust", &period),
            skill_name: "rust".into(),
            demand_count: 3,
            growth_rate: 0.0,
            created_at: period.end(),
        };

        let docs = index_documents(&[metric.clone()], &[skill.clone()]).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, metric.id.to_string());
        assert_eq!(docs[0].body["record_type"], "requisition_metric");
        assert_eq!(docs[0].body["requisition_id"], "req-1");
        assert_eq!(docs[1].id, skill.id.to_string());
        assert_eq!(docs[1].body["record_type"], "skill_metric");
    }
}
