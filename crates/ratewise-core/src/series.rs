//! Time series of traffic samples for one (tenant, endpoint) pair.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::SeriesError;

/// One traffic sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    fn is_usable(&self) -> bool {
        self.value.is_finite() && self.value >= 0.0
    }
}

/// An ordered, cleaned series of traffic samples.
///
/// Invariants: every value is finite and non-negative, and timestamps are
/// strictly increasing. The series is never mutated after construction;
/// filtering produces a new series.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MetricSeries {
    points: Vec<DataPoint>,
}

impl MetricSeries {
    /// Build a series from provider output that is already in timestamp order.
    ///
    /// Non-finite and negative samples are dropped first; the remaining
    /// timestamps must be strictly increasing.
    pub fn new(points: Vec<DataPoint>) -> Result<Self, SeriesError> {
        let points: Vec<DataPoint> = points.into_iter().filter(DataPoint::is_usable).collect();
        if let Some(index) = points
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(SeriesError::NotIncreasing { index: index + 1 });
        }
        Ok(Self { points })
    }

    /// Build a series from samples in arbitrary order.
    ///
    /// Sorts by timestamp and keeps the last sample for duplicated timestamps.
    pub fn from_unordered(points: Vec<DataPoint>) -> Self {
        let mut points: Vec<DataPoint> = points.into_iter().filter(DataPoint::is_usable).collect();
        // Stable sort keeps input order among equal timestamps, so the later
        // duplicate survives the reverse dedup below.
        points.sort_by_key(|p| p.timestamp);
        points.reverse();
        points.dedup_by_key(|p| p.timestamp);
        points.reverse();
        Self { points }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sample values in timestamp order.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|p| p.timestamp)
    }

    /// Time covered by the samples, counting the final sample interval.
    ///
    /// The typical step is the median gap between consecutive samples, so a
    /// week of per-minute samples spans exactly seven days.
    pub fn span(&self) -> Duration {
        let (Some(first), Some(last)) = (self.first_timestamp(), self.last_timestamp()) else {
            return Duration::zero();
        };
        (last - first) + self.typical_step()
    }

    /// Median gap between consecutive samples (zero below two samples).
    pub fn typical_step(&self) -> Duration {
        let mut gaps: Vec<Duration> = self
            .points
            .windows(2)
            .map(|w| w[1].timestamp - w[0].timestamp)
            .collect();
        if gaps.is_empty() {
            return Duration::zero();
        }
        gaps.sort();
        gaps[gaps.len() / 2]
    }

    /// Keep only samples matching `keep`, returning a new series.
    pub fn filter<F>(&self, mut keep: F) -> MetricSeries
    where
        F: FnMut(&DataPoint) -> bool,
    {
        MetricSeries {
            points: self.points.iter().copied().filter(|p| keep(p)).collect(),
        }
    }
}
