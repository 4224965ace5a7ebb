//! Error types shared across the workspace

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised while constructing shared domain values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommonError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid aggregation level: '{0}'. Expected one of daily, weekly, monthly, quarterly, yearly")]
    InvalidAggregationLevel(String),
}
