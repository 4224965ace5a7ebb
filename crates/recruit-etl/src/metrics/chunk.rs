//! Partial aggregates produced by one transform worker
//!
//! A chunk result carries sums, counts and the raw samples that later
//! statistics need (medians and bucketed trends cannot be rebuilt from
//! per-chunk summaries). Merging is concatenation plus summation, followed by
//! a canonical sort in [`MetricsChunkResult::merge_all`], so the outcome does
//! not depend on the order workers finish in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use recruit_common::AggregationLevel;
use serde::{Deserialize, Serialize};

use crate::error::{EtlError, EtlResult};

/// A filled requisition's time-to-hire, stamped with its creation time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HireSample {
    pub created_at: DateTime<Utc>,
    pub days: f64,
}

/// Per-requisition facts needed to build metric rows after the merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequisitionObservation {
    pub requisition_id: String,
    pub time_to_hire: Option<f64>,
    pub satisfaction_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsChunkResult {
    pub level: AggregationLevel,
    pub total: u64,
    pub filled: u64,
    pub hire_samples: Vec<HireSample>,
    /// Creation times of requisitions requiring each skill
    pub skill_demand: BTreeMap<String, Vec<DateTime<Utc>>>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub observations: Vec<RequisitionObservation>,
}

impl MetricsChunkResult {
    pub fn empty(level: AggregationLevel) -> Self {
        Self {
            level,
            total: 0,
            filled: 0,
            hire_samples: Vec::new(),
            skill_demand: BTreeMap::new(),
            first_seen: None,
            last_seen: None,
            observations: Vec::new(),
        }
    }

    /// Filled over total as a percentage; 0 for an empty chunk
    pub fn fill_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.filled as f64 / self.total as f64 * 100.0
        }
    }

    pub fn average_time_to_hire(&self) -> f64 {
        if self.hire_samples.is_empty() {
            return 0.0;
        }
        self.hire_samples.iter().map(|s| s.days).sum::<f64>() / self.hire_samples.len() as f64
    }

    /// Mean satisfaction over surveyed requisitions
    pub fn satisfaction_rate(&self) -> f64 {
        let scores: Vec<f64> = self.observations.iter().filter_map(|o| o.satisfaction_score).collect();
        if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        }
    }

    /// Percentage of requisitions requiring each skill
    pub fn skill_prevalence(&self) -> BTreeMap<String, f64> {
        if self.total == 0 {
            return BTreeMap::new();
        }
        self.skill_demand
            .iter()
            .map(|(skill, events)| (skill.clone(), events.len() as f64 / self.total as f64 * 100.0))
            .collect()
    }

    pub fn time_to_hire_values(&self) -> Vec<f64> {
        self.hire_samples.iter().map(|s| s.days).collect()
    }

    pub fn time_to_hire_series(&self) -> Vec<(DateTime<Utc>, f64)> {
        self.hire_samples.iter().map(|s| (s.created_at, s.days)).collect()
    }

    /// Fold `other` into `self`
    pub fn merge(&mut self, other: MetricsChunkResult) -> EtlResult<()> {
        if other.level != self.level {
            return Err(EtlError::transform(format!(
                "cannot merge {} chunk into {} result",
                other.level, self.level
            )));
        }

        self.total += other.total;
        self.filled += other.filled;
        self.hire_samples.extend(other.hire_samples);
        for (skill, events) in other.skill_demand {
            self.skill_demand.entry(skill).or_default().extend(events);
        }
        self.first_seen = min_opt(self.first_seen, other.first_seen);
        self.last_seen = max_opt(self.last_seen, other.last_seen);
        self.observations.extend(other.observations);
        Ok(())
    }

    /// Merge any number of chunks and put the sequences in canonical order
    pub fn merge_all<I>(level: AggregationLevel, chunks: I) -> EtlResult<Self>
    where
        I: IntoIterator<Item = MetricsChunkResult>,
    {
        let mut merged = Self::empty(level);
        for chunk in chunks {
            merged.merge(chunk)?;
        }
        merged.canonicalize();
        Ok(merged)
    }

    fn canonicalize(&mut self) {
        self.hire_samples.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.days.total_cmp(&b.days))
        });
        for events in self.skill_demand.values_mut() {
            events.sort();
        }
        self.observations.sort_by(|a, b| a.requisition_id.cmp(&b.requisition_id));
    }
}

/// Candidate supply for one skill
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillSupply {
    pub candidates: u64,
    pub engaged: u64,
    pub experience_sum: f64,
}

impl SkillSupply {
    pub fn average_experience(&self) -> f64 {
        if self.candidates == 0 {
            0.0
        } else {
            self.experience_sum / self.candidates as f64
        }
    }
}

/// Candidate-side tallies for one chunk of candidates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateSupply {
    pub total_candidates: u64,
    pub engaged_candidates: u64,
    pub skills: BTreeMap<String, SkillSupply>,
}

impl CandidateSupply {
    pub fn merge(&mut self, other: CandidateSupply) {
        self.total_candidates += other.total_candidates;
        self.engaged_candidates += other.engaged_candidates;
        for (skill, supply) in other.skills {
            let entry = self.skills.entry(skill).or_default();
            entry.candidates += supply.candidates;
            entry.engaged += supply.engaged;
            entry.experience_sum += supply.experience_sum;
        }
    }

    pub fn merge_all<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = CandidateSupply>,
    {
        parts.into_iter().fold(Self::default(), |mut acc, part| {
            acc.merge(part);
            acc
        })
    }

    pub fn candidates_with(&self, skill: &str) -> u64 {
        self.skills.get(skill).map(|s| s.candidates).unwrap_or(0)
    }
}

fn min_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
