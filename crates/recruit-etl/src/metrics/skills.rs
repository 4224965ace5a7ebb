//! Skill demand, supply and gap analysis

use std::collections::{BTreeMap, BTreeSet};

use recruit_common::DateRange;

use super::chunk::{CandidateSupply, MetricsChunkResult};
use super::stats;
use crate::models::{SkillAvailability, SkillDemand, SkillGap, SkillsAnalyticsBundle};

/// Percent change from `early` to `late`
///
/// Growth from nothing counts as 100%; no demand in either half is 0%.
pub fn growth_rate(early: u64, late: u64) -> f64 {
    if early == 0 {
        if late > 0 {
            100.0
        } else {
            0.0
        }
    } else {
        (late as f64 - early as f64) / early as f64 * 100.0
    }
}

pub fn demand_supply_ratio(demand: u64, supply: u64) -> f64 {
    demand as f64 / supply.max(1) as f64
}

/// How much of the demand is uncovered, clamped to [0, 1]
pub fn gap_severity(demand: u64, supply: u64) -> f64 {
    if demand == 0 {
        return 0.0;
    }
    (1.0 - supply as f64 / demand as f64).clamp(0.0, 1.0)
}

pub(super) fn build(
    merged: &MetricsChunkResult,
    supply: &CandidateSupply,
    period: &DateRange,
) -> SkillsAnalyticsBundle {
    let midpoint = period.midpoint();
    let window = merged.level.window();

    let mut skill_demand = Vec::with_capacity(merged.skill_demand.len());
    let mut historical_analysis = BTreeMap::new();
    for (skill, events) in &merged.skill_demand {
        let early = events.iter().filter(|at| **at < midpoint).count() as u64;
        let late = events.len() as u64 - early;
        skill_demand.push(SkillDemand {
            skill_name: skill.clone(),
            demand_count: events.len() as u64,
            growth_rate: growth_rate(early, late),
        });
        historical_analysis.insert(skill.clone(), stats::count_trend(events, period.start(), window));
    }
    skill_demand.sort_by(|a, b| {
        b.demand_count.cmp(&a.demand_count).then_with(|| a.skill_name.cmp(&b.skill_name))
    });

    let all_skills: BTreeSet<&String> = merged.skill_demand.keys().chain(supply.skills.keys()).collect();
    let skill_availability = all_skills
        .into_iter()
        .map(|skill| {
            let s = supply.skills.get(skill).cloned().unwrap_or_default();
            let market_availability = if supply.total_candidates == 0 {
                0.0
            } else {
                s.candidates as f64 / supply.total_candidates as f64 * 100.0
            };
            SkillAvailability {
                skill_name: skill.clone(),
                available_candidates: s.candidates,
                engaged_candidates: s.engaged,
                average_experience: s.average_experience(),
                market_availability,
            }
        })
        .collect();

    let mut skill_gaps: Vec<SkillGap> = skill_demand
        .iter()
        .map(|d| {
            let available = supply.candidates_with(&d.skill_name);
            SkillGap {
                skill_name: d.skill_name.clone(),
                demand_supply_ratio: demand_supply_ratio(d.demand_count, available),
                gap_severity: gap_severity(d.demand_count, available),
                projected_growth: d.growth_rate,
            }
        })
        .collect();
    skill_gaps.sort_by(|a, b| {
        b.gap_severity
            .total_cmp(&a.gap_severity)
            .then_with(|| a.skill_name.cmp(&b.skill_name))
    });

    let market_trends = skill_demand
        .iter()
        .map(|d| (d.skill_name.clone(), 1.0 + d.growth_rate / 100.0))
        .collect();

    SkillsAnalyticsBundle {
        period: *period,
        skill_demand,
        skill_availability,
        skill_gaps,
        market_trends,
        historical_analysis,
    }
}
