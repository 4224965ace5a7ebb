//! Records flowing through the pipeline
//!
//! Raw rows and documents from the stores are converted into validated typed
//! records at the extraction boundary ([`RequisitionRow`] and the document
//! structs implement `TryFrom`). Everything downstream of the extractor can
//! rely on these invariants:
//!
//! - requisition status is one of open, filled, cancelled
//! - `filled_at`, when present, is not before `created_at`
//! - candidate experience is finite and non-negative
//! - skill names are trimmed, lowercased and non-empty

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use recruit_common::DateRange;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EtlError, EtlResult};

const SECONDS_PER_DAY: f64 = 86_400.0;

fn normalize_skills<I, S>(skills: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    skills
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Requisitions
// ============================================================================

/// Requisition lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionStatus {
    Open,
    Filled,
    Cancelled,
}

impl RequisitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequisitionStatus::Open => "open",
            RequisitionStatus::Filled => "filled",
            RequisitionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for RequisitionStatus {
    type Err = EtlError;

    fn from_str(s: &str) -> EtlResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(RequisitionStatus::Open),
            "filled" => Ok(RequisitionStatus::Filled),
            "cancelled" | "canceled" => Ok(RequisitionStatus::Cancelled),
            other => Err(EtlError::validation(format!("unknown requisition status '{}'", other))),
        }
    }
}

/// Client attributes joined onto a requisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRef {
    pub id: String,
    pub name: String,
    pub industry: Option<String>,
}

/// Validated requisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequisitionRecord {
    pub id: String,
    pub title: String,
    pub status: RequisitionStatus,
    pub client: ClientRef,
    /// Client satisfaction on a 0-100 scale, when surveyed
    pub satisfaction_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub required_skills: BTreeSet<String>,
}

impl RequisitionRecord {
    pub fn is_filled(&self) -> bool {
        self.status == RequisitionStatus::Filled
    }

    /// Fractional days from creation to fill; only defined for filled records
    pub fn time_to_hire_days(&self) -> Option<f64> {
        if !self.is_filled() {
            return None;
        }
        self.filled_at
            .map(|filled| (filled - self.created_at).num_seconds() as f64 / SECONDS_PER_DAY)
    }
}

/// Requisition row as returned by the relational source
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RequisitionRow {
    pub id: String,
    pub title: String,
    pub status: String,
    pub client_id: String,
    pub client_name: String,
    pub client_industry: Option<String>,
    pub satisfaction_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub required_skills: Vec<String>,
}

impl TryFrom<RequisitionRow> for RequisitionRecord {
    type Error = EtlError;

    fn try_from(row: RequisitionRow) -> EtlResult<Self> {
        let status: RequisitionStatus = row
            .status
            .parse()
            .map_err(|e: EtlError| EtlError::validation(format!("requisition {}: {}", row.id, e.message())))?;

        if let Some(filled_at) = row.filled_at {
            if filled_at < row.created_at {
                return Err(EtlError::validation(format!(
                    "requisition {} filled_at {} precedes created_at {}",
                    row.id, filled_at, row.created_at
                )));
            }
        }

        if let Some(score) = row.satisfaction_score {
            if !score.is_finite() || !(0.0..=100.0).contains(&score) {
                return Err(EtlError::validation(format!(
                    "requisition {} satisfaction score {} outside 0-100",
                    row.id, score
                )));
            }
        }

        Ok(RequisitionRecord {
            id: row.id,
            title: row.title,
            status,
            client: ClientRef {
                id: row.client_id,
                name: row.client_name,
                industry: row.client_industry,
            },
            satisfaction_score: row.satisfaction_score,
            created_at: row.created_at,
            filled_at: row.filled_at,
            required_skills: normalize_skills(&row.required_skills),
        })
    }
}

// ============================================================================
// Documents
// ============================================================================

/// Validated candidate profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: String,
    pub skills: BTreeSet<String>,
    pub experience_years: f64,
    pub created_at: DateTime<Utc>,
}

/// Candidate document shape in the document store
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateDocument {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience_years: f64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CandidateDocument> for CandidateRecord {
    type Error = EtlError;

    fn try_from(doc: CandidateDocument) -> EtlResult<Self> {
        if !doc.experience_years.is_finite() || doc.experience_years < 0.0 {
            return Err(EtlError::validation(format!(
                "candidate {} has invalid experience_years {}",
                doc.id, doc.experience_years
            )));
        }
        Ok(CandidateRecord {
            id: doc.id,
            skills: normalize_skills(&doc.skills),
            experience_years: doc.experience_years,
            created_at: doc.created_at,
        })
    }
}

/// Communication event between candidates and recruiters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationRecord {
    #[serde(alias = "_id")]
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub participants: Vec<String>,
}

/// Decode a raw document, mapping shape errors to validation failures
pub fn decode_document<T>(collection: &str, value: serde_json::Value) -> EtlResult<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value)
        .map_err(|e| EtlError::validation(format!("undecodable {} document: {}", collection, e)))
}

// ============================================================================
// Extraction
// ============================================================================

/// Optional narrowing applied to an extraction
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractFilters {
    /// Only requisitions belonging to this client
    pub client_id: Option<String>,
    /// Only candidates holding at least one of these skills
    pub skills: BTreeSet<String>,
}

impl ExtractFilters {
    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Self::default()
        }
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.skills = normalize_skills(skills);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.client_id.is_none() && self.skills.is_empty()
    }

    pub fn matches_candidate(&self, candidate: &CandidateRecord) -> bool {
        self.skills.is_empty() || !self.skills.is_disjoint(&candidate.skills)
    }

    /// Stable textual form for cache keys
    pub fn cache_key(&self) -> String {
        let client = self.client_id.as_deref().unwrap_or("*");
        let skills = if self.skills.is_empty() {
            "*".to_string()
        } else {
            self.skills.iter().cloned().collect::<Vec<_>>().join(",")
        };
        format!("client={};skills={}", client, skills)
    }
}

/// One page of a paged scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

impl PageRequest {
    pub fn first(limit: u64) -> Self {
        Self { offset: 0, limit }
    }

    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

/// Staged data for one run, read-only once assembled
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawExtractBundle {
    pub requisitions: Vec<RequisitionRecord>,
    pub candidates: Vec<CandidateRecord>,
    pub communications: Vec<CommunicationRecord>,
}

impl RawExtractBundle {
    pub fn record_count(&self) -> usize {
        self.requisitions.len() + self.candidates.len() + self.communications.len()
    }
}

// ============================================================================
// Analytics
// ============================================================================

/// One point of a bucketed time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
    /// Half-width of the 95% confidence interval; never negative
    pub confidence: f64,
}

/// Per-requisition metric row, written to `requisition_metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequisitionMetric {
    pub id: Uuid,
    pub requisition_id: String,
    pub time_to_hire: Option<f64>,
    pub fill_rate: f64,
    pub satisfaction_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl RequisitionMetric {
    /// Deterministic row id for a requisition within a reporting period
    pub fn row_id(requisition_id: &str, period: &DateRange) -> Uuid {
        let name = format!("requisition_metric:{}:{}", requisition_id, period.cache_key());
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }
}

/// Per-skill metric row, written to `skill_metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMetric {
    pub id: Uuid,
    pub skill_name: String,
    pub demand_count: i64,
    pub growth_rate: f64,
    pub created_at: DateTime<Utc>,
}

impl SkillMetric {
    pub fn row_id(skill_name: &str, period: &DateRange) -> Uuid {
        let name = format!("skill_metric:{}:{}", skill_name, period.cache_key());
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }

    pub fn from_demand(demand: &SkillDemand, period: &DateRange) -> Self {
        Self {
            id: Self::row_id(&demand.skill_name, period),
            skill_name: demand.skill_name.clone(),
            demand_count: i64::try_from(demand.demand_count).unwrap_or(i64::MAX),
            growth_rate: demand.growth_rate,
            created_at: period.end(),
        }
    }
}

/// Merged recruitment metrics for a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecruitmentMetricsBundle {
    pub total_requisitions: u64,
    pub filled_requisitions: u64,
    /// Mean days to fill over filled requisitions with a fill date
    pub average_time_to_hire: f64,
    /// Mean satisfaction over surveyed requisitions, 0-100
    pub client_satisfaction_rate: f64,
    /// Filled over total, as a percentage
    pub requisition_fill_rate: f64,
    pub period: DateRange,
    /// Percentage of requisitions requiring each skill
    pub skill_based_metrics: BTreeMap<String, f64>,
    pub requisition_metrics: Vec<RequisitionMetric>,
}

/// Time-to-hire distribution and its shape over time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeToHireAnalytics {
    pub average_days: f64,
    pub median_days: f64,
    pub trend_data: Vec<TrendPoint>,
    pub seasonal_patterns: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDemand {
    pub skill_name: String,
    pub demand_count: u64,
    /// Percent change from the first to the second half of the period
    pub growth_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillAvailability {
    pub skill_name: String,
    pub available_candidates: u64,
    /// Candidates with the skill who appear in a communication
    pub engaged_candidates: u64,
    pub average_experience: f64,
    /// Share of all candidates holding the skill, as a percentage
    pub market_availability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillGap {
    pub skill_name: String,
    pub demand_supply_ratio: f64,
    /// 0 when supply covers demand, 1 when there is no supply at all
    pub gap_severity: f64,
    pub projected_growth: f64,
}

/// Demand, supply and gap analysis per skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillsAnalyticsBundle {
    pub period: DateRange,
    pub skill_demand: Vec<SkillDemand>,
    pub skill_availability: Vec<SkillAvailability>,
    pub skill_gaps: Vec<SkillGap>,
    pub market_trends: BTreeMap<String, f64>,
    pub historical_analysis: BTreeMap<String, Vec<TrendPoint>>,
}

impl SkillsAnalyticsBundle {
    /// Skills whose demand/supply ratio exceeds `threshold`, most constrained first
    pub fn critical_skills(&self, threshold: f64) -> Vec<&SkillGap> {
        let mut gaps: Vec<&SkillGap> = self
            .skill_gaps
            .iter()
            .filter(|gap| gap.demand_supply_ratio > threshold)
            .collect();
        gaps.sort_by(|a, b| {
            b.demand_supply_ratio
                .total_cmp(&a.demand_supply_ratio)
                .then_with(|| a.skill_name.cmp(&b.skill_name))
        });
        gaps
    }

    /// Up to `limit` skills ordered by growth rate, fastest first
    pub fn trending_skills(&self, limit: usize) -> Vec<&SkillDemand> {
        let mut demand: Vec<&SkillDemand> = self.skill_demand.iter().collect();
        demand.sort_by(|a, b| {
            b.growth_rate
                .total_cmp(&a.growth_rate)
                .then_with(|| a.skill_name.cmp(&b.skill_name))
        });
        demand.truncate(limit);
        demand
    }
}
