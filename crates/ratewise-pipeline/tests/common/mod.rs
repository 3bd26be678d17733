#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use ratewise_core::{DataPoint, MetricSeries, PairKey};

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
}

/// One sample per minute for `days` days.
pub fn per_minute(days: i64, f: impl Fn(i64) -> f64) -> MetricSeries {
    let points = (0..days * 1440)
        .map(|m| DataPoint::new(start() + Duration::minutes(m), f(m)))
        .collect();
    MetricSeries::new(points).unwrap()
}

/// One sample per hour for `days` days.
pub fn hourly(days: i64, f: impl Fn(i64) -> f64) -> MetricSeries {
    let points = (0..days * 24)
        .map(|h| DataPoint::new(start() + Duration::hours(h), f(h)))
        .collect();
    MetricSeries::new(points).unwrap()
}

/// Evening-peaked daily shape with a quieter weekend.
pub fn evening_peak(h: i64) -> f64 {
    let hour = h % 24;
    let day = h / 24;
    let base = if (19..=22).contains(&hour) { 400.0 } else { 150.0 };
    let weekend = if day % 7 >= 5 { 0.8 } else { 1.0 };
    base * weekend + (h % 7) as f64
}

pub fn pair(tenant: &str, endpoint: &str) -> PairKey {
    PairKey::new(tenant, endpoint)
}
