//! Common types used across the analytics workspace

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, Result};

// ============================================================================
// Date Range
// ============================================================================

/// Closed time interval a pipeline run is scoped to.
///
/// Always satisfies `start <= end`; the only way to obtain one is through
/// [`DateRange::new`] (deserialization goes through the same check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = CommonError;

    fn try_from(raw: RawDateRange) -> Result<Self> {
        DateRange::new(raw.start, raw.end)
    }
}

impl DateRange {
    /// Create a new range, rejecting `start > end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(CommonError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Inclusive on both ends, matching the `BETWEEN` semantics of the stores
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    /// Instant halfway between start and end
    pub fn midpoint(&self) -> DateTime<Utc> {
        self.start + self.duration() / 2
    }

    /// Stable textual form used when building cache keys
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} .. {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

// ============================================================================
// Aggregation Level
// ============================================================================

/// Granularity used for time bucketing of metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregationLevel {
    Daily,
    #[default]
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl AggregationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationLevel::Daily => "daily",
            AggregationLevel::Weekly => "weekly",
            AggregationLevel::Monthly => "monthly",
            AggregationLevel::Quarterly => "quarterly",
            AggregationLevel::Yearly => "yearly",
        }
    }

    /// Fixed bucket width for this level
    pub fn window(&self) -> Duration {
        match self {
            AggregationLevel::Daily => Duration::days(1),
            AggregationLevel::Weekly => Duration::days(7),
            AggregationLevel::Monthly => Duration::days(30),
            AggregationLevel::Quarterly => Duration::days(91),
            AggregationLevel::Yearly => Duration::days(365),
        }
    }
}

impl std::str::FromStr for AggregationLevel {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(AggregationLevel::Daily),
            "weekly" => Ok(AggregationLevel::Weekly),
            "monthly" => Ok(AggregationLevel::Monthly),
            "quarterly" => Ok(AggregationLevel::Quarterly),
            "yearly" => Ok(AggregationLevel::Yearly),
            _ => Err(CommonError::InvalidAggregationLevel(s.to_string())),
        }
    }
}

impl std::fmt::Display for AggregationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        let err = DateRange::new(at(10), at(1)).unwrap_err();
        assert!(matches!(err, CommonError::InvalidDateRange { .. }));
    }

    #[test]
    fn test_date_range_allows_empty_interval() {
        let range = DateRange::new(at(5), at(5)).unwrap();
        assert_eq!(range.duration(), Duration::zero());
        assert!(range.contains(at(5)));
    }

    #[test]
    fn test_date_range_contains_is_inclusive() {
        let range = DateRange::new(at(1), at(10)).unwrap();
        assert!(range.contains(at(1)));
        assert!(range.contains(at(10)));
        assert!(!range.contains(at(11)));
        assert_eq!(range.midpoint(), Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_date_range_deserialize_validates() {
        let ok: DateRange =
            serde_json::from_str(r#"{"start":"2024-03-01T00:00:00Z","end":"2024-03-02T00:00:00Z"}"#)
                .unwrap();
        assert_eq!(ok.start(), at(1));

        let bad = serde_json::from_str::<DateRange>(
            r#"{"start":"2024-03-02T00:00:00Z","end":"2024-03-01T00:00:00Z"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_aggregation_level_from_str() {
        assert_eq!("daily".parse::<AggregationLevel>().unwrap(), AggregationLevel::Daily);
        assert_eq!("WEEKLY".parse::<AggregationLevel>().unwrap(), AggregationLevel::Weekly);
        assert_eq!(" Monthly ".parse::<AggregationLevel>().unwrap(), AggregationLevel::Monthly);
        assert_eq!("quarterly".parse::<AggregationLevel>().unwrap(), AggregationLevel::Quarterly);
        assert_eq!("yearly".parse::<AggregationLevel>().unwrap(), AggregationLevel::Yearly);
        assert!("hourly".parse::<AggregationLevel>().is_err());
    }

    #[test]
    fn test_aggregation_level_window() {
        assert_eq!(AggregationLevel::Daily.window(), Duration::days(1));
        assert_eq!(AggregationLevel::default().window(), Duration::days(7));
        assert_eq!(AggregationLevel::Yearly.to_string(), "yearly");
    }
}
