//! Recruit Analytics Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the recruitment analytics workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Types**: [`DateRange`] and [`AggregationLevel`], the inputs every pipeline run is
//!   parameterised with
//! - **Logging**: centralised `tracing` subscriber setup
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use recruit_common::{AggregationLevel, DateRange};
//!
//! let range = DateRange::new(
//!     Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
//! )
//! .unwrap();
//! let level: AggregationLevel = "weekly".parse().unwrap();
//! assert_eq!(level.window(), chrono::Duration::days(7));
//! assert!(range.start() <= range.end());
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::{AggregationLevel, DateRange};
