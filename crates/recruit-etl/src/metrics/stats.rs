//! Statistical helpers over time-stamped samples

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::models::TrendPoint;

/// z-score for a two-sided 95% interval
pub const Z_95: f64 = 1.96;

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator); 0 below two values
pub fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let Some(m) = mean(values) else {
        return 0.0;
    };
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / (n - 1) as f64).sqrt()
}

/// Half-width of the 95% confidence interval of the mean
pub fn confidence_95(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    Z_95 * sample_std_dev(values) / (values.len() as f64).sqrt()
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Index of the window-sized bucket `at` falls in, counting from `origin`
pub fn bucket_index(at: DateTime<Utc>, origin: DateTime<Utc>, window: Duration) -> i64 {
    let width = window.num_seconds().max(1);
    (at - origin).num_seconds().div_euclid(width)
}

pub fn bucket_start(origin: DateTime<Utc>, window: Duration, index: i64) -> DateTime<Utc> {
    origin + Duration::seconds(window.num_seconds().max(1).saturating_mul(index))
}

/// Bucket `(timestamp, value)` samples from the earliest timestamp and emit one
/// point per non-empty bucket: the bucket mean with its 95% interval
pub fn trend_from_samples(samples: &[(DateTime<Utc>, f64)], window: Duration) -> Vec<TrendPoint> {
    let Some(origin) = samples.iter().map(|(at, _)| *at).min() else {
        return Vec::new();
    };

    let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for (at, value) in samples {
        buckets.entry(bucket_index(*at, origin, window)).or_default().push(*value);
    }

    buckets
        .into_iter()
        .filter_map(|(index, values)| {
            mean(&values).map(|value| TrendPoint {
                date: bucket_start(origin, window, index),
                value,
                confidence: confidence_95(&values),
            })
        })
        .collect()
}

/// Per-bucket event counts from a fixed origin; the interval is always 0
pub fn count_trend(events: &[DateTime<Utc>], origin: DateTime<Utc>, window: Duration) -> Vec<TrendPoint> {
    let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
    for at in events {
        *buckets.entry(bucket_index(*at, origin, window)).or_default() += 1;
    }
    buckets
        .into_iter()
        .map(|(index, count)| TrendPoint {
            date: bucket_start(origin, window, index),
            value: count as f64,
            confidence: 0.0,
        })
        .collect()
}

/// Monthly mean relative to the global mean, keyed `month_<1..12>`
///
/// Empty when there are no samples or the global mean is zero.
pub fn seasonal_from_samples(samples: &[(DateTime<Utc>, f64)]) -> BTreeMap<String, f64> {
    let values: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
    let global = match mean(&values) {
        Some(g) if g != 0.0 => g,
        _ => return BTreeMap::new(),
    };

    let mut months: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for (at, value) in samples {
        months.entry(at.month()).or_default().push(*value);
    }

    months
        .into_iter()
        .filter_map(|(month, values)| {
            mean(&values).map(|m| (format!("month_{}", month), m / global))
        })
        .collect()
}
