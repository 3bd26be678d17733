//! Domain types for the rate-limit decision pipeline.
//!
//! These types are produced once per (tenant, endpoint) pipeline run and are
//! immutable afterwards. All of them serialize to JSON for batch reports.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A (tenant, endpoint) dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub tenant: String,
    pub endpoint: String,
}

impl PairKey {
    pub fn new(tenant: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.endpoint.starts_with('/') {
            write!(f, "{}{}", self.tenant, self.endpoint)
        } else {
            write!(f, "{}/{}", self.tenant, self.endpoint)
        }
    }
}

// ── Anomalies ──────────────────────────────────────────────────────

/// How far a point sits outside its expected range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Which detector flagged an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Outside the forecast model's uncertainty interval.
    Forecast,
    /// Outside IQR fences or beyond the z-score threshold.
    Statistical,
}

/// A single anomalous sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub timestamp: DateTime<Utc>,
    pub actual: f64,
    pub expected: f64,
    pub lower: f64,
    pub upper: f64,
    pub severity: Severity,
    pub method: DetectionMethod,
}

// ── Traffic analysis ───────────────────────────────────────────────

/// Which analysis path produced a [`TrafficAnalysis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    Forecast,
    Statistical,
}

impl AnalysisMethod {
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisMethod::Forecast => "forecast",
            AnalysisMethod::Statistical => "statistical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    /// Classify a slope; anything with `|slope| < epsilon` is stable.
    pub fn from_slope(slope: f64, epsilon: f64) -> Self {
        if !slope.is_finite() || slope.abs() < epsilon {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        }
    }
}

/// Linear trend over the analysed series (slope is per sample index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub direction: TrendDirection,
    pub slope: f64,
    pub mean: f64,
    pub std: f64,
    pub start_value: f64,
    pub end_value: f64,
}

impl TrendSummary {
    pub fn flat() -> Self {
        Self {
            direction: TrendDirection::Stable,
            slope: 0.0,
            mean: 0.0,
            std: 0.0,
            start_value: 0.0,
            end_value: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonKind {
    Daily,
    Weekly,
}

impl SeasonKind {
    pub fn label(&self) -> &'static str {
        match self {
            SeasonKind::Daily => "daily",
            SeasonKind::Weekly => "weekly",
        }
    }

    /// Period length in seconds.
    pub fn period_secs(&self) -> f64 {
        match self {
            SeasonKind::Daily => 86_400.0,
            SeasonKind::Weekly => 604_800.0,
        }
    }
}

/// Distribution of one fitted seasonal component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalSummary {
    pub kind: SeasonKind,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Trend, seasonality, and anomalies for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficAnalysis {
    pub method: AnalysisMethod,
    /// Why the statistical path ran, when it did.
    pub fallback_reason: Option<String>,
    pub points_analyzed: usize,
    pub trend: TrendSummary,
    pub seasonality: Vec<SeasonalSummary>,
    /// Anomalies in timestamp order.
    pub anomalies: Vec<Anomaly>,
}

impl TrafficAnalysis {
    /// Fraction of analysed points flagged anomalous (0 when nothing was analysed).
    pub fn anomaly_fraction(&self) -> f64 {
        if self.points_analyzed == 0 {
            return 0.0;
        }
        self.anomalies.len() as f64 / self.points_analyzed as f64
    }

    pub fn count_with_severity(&self, severity: Severity) -> usize {
        self.anomalies
            .iter()
            .filter(|a| a.severity == severity)
            .count()
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            method: self.method,
            anomaly_count: self.anomalies.len(),
            high: self.count_with_severity(Severity::High),
            medium: self.count_with_severity(Severity::Medium),
            low: self.count_with_severity(Severity::Low),
            trend_direction: self.trend.direction,
            trend_slope: self.trend.slope,
        }
    }
}

/// Condensed view of a [`TrafficAnalysis`] for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub method: AnalysisMethod,
    pub anomaly_count: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub trend_direction: TrendDirection,
    pub trend_slope: f64,
}

// ── Prime time ─────────────────────────────────────────────────────

/// A recurring daily interval of elevated traffic.
///
/// Hours are UTC and inclusive. A window with `start_hour > end_hour`
/// wraps past midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimeTimeWindow {
    pub start_hour: u8,
    pub end_hour: u8,
    /// Hourly aggregate threshold the window's hours met.
    pub percentile_threshold: f64,
    /// Fraction of observed days on which the window was elevated.
    pub consistency_score: f64,
    /// Mean of non-anomalous samples inside the window's hours.
    pub average_peak: f64,
    /// Mean hourly aggregate across the window's hours (sort key).
    pub aggregate_traffic: f64,
    /// Non-anomalous samples behind `average_peak`.
    pub sample_count: usize,
}

impl PrimeTimeWindow {
    /// Hours covered by the window, in window order.
    pub fn hours(&self) -> Vec<u8> {
        let mut hours = Vec::new();
        let mut h = self.start_hour;
        loop {
            hours.push(h);
            if h == self.end_hour {
                break;
            }
            h = (h + 1) % 24;
        }
        hours
    }

    pub fn contains_hour(&self, hour: u8) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..=self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour <= self.end_hour
        }
    }

    pub fn duration_minutes(&self) -> u32 {
        self.hours().len() as u32 * 60
    }

    /// "19:00 - 22:59" style label.
    pub fn label(&self) -> String {
        format!("{:02}:00 - {:02}:59", self.start_hour, self.end_hour)
    }
}

// ── Cache ──────────────────────────────────────────────────────────

/// Raw request counts by cache outcome for one pair and window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheOutcomeCounts {
    #[serde(default)]
    pub hit: u64,
    #[serde(default)]
    pub miss: u64,
    #[serde(default)]
    pub bypass: u64,
    #[serde(default)]
    pub expired: u64,
    #[serde(default)]
    pub stale: u64,
}

impl CacheOutcomeCounts {
    /// Sum of all outcomes, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        [self.miss, self.bypass, self.expired, self.stale]
            .into_iter()
            .fold(self.hit, u64::saturating_add)
    }

    /// Requests that were not answered from cache and so reach the limiter.
    pub fn limiter_requests(&self) -> u64 {
        [self.bypass, self.expired, self.stale]
            .into_iter()
            .fold(self.miss, u64::saturating_add)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileOrigin {
    /// Derived from observed outcome counts.
    Observed,
    /// Configured fallback used when no outcome data exists.
    Default,
}

/// Cache outcome ratios and efficiency for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheProfile {
    pub hit_ratio: f64,
    pub miss_ratio: f64,
    pub bypass_ratio: f64,
    pub expired_ratio: f64,
    pub stale_ratio: f64,
    /// In `[0, 1]`.
    pub efficiency_score: f64,
    pub total_requests: u64,
    /// Requests not served from cache.
    #[serde(default)]
    pub limiter_requests: u64,
    pub origin: ProfileOrigin,
}

impl CacheProfile {
    pub fn is_default(&self) -> bool {
        self.origin == ProfileOrigin::Default
    }
}

// ── Decision ───────────────────────────────────────────────────────

/// Variability class of the clean series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficPattern {
    Stable,
    Variable,
    ModeratelySpiky,
    Spiky,
}

impl TrafficPattern {
    pub fn label(&self) -> &'static str {
        match self {
            TrafficPattern::Stable => "stable",
            TrafficPattern::Variable => "variable",
            TrafficPattern::ModeratelySpiky => "moderately_spiky",
            TrafficPattern::Spiky => "spiky",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.80 {
            ConfidenceLevel::High
        } else if score >= 0.65 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

/// The three signals combined into a confidence score, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    /// Fraction of the target lookback covered by data.
    pub coverage: f64,
    /// One minus the anomaly fraction.
    pub anomaly_free: f64,
    /// Mean consistency score of the prime-time windows.
    pub consistency: f64,
}

/// One multiplier applied to the running rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierStep {
    pub name: String,
    pub factor: f64,
    pub before: f64,
    pub after: f64,
}

/// The recommended admission-control limit for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub recommended_limit: u64,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub confidence_breakdown: ConfidenceBreakdown,
    /// Effective peak the formula started from.
    pub base_peak: f64,
    pub traffic_pattern: Option<TrafficPattern>,
    pub analysis_method: Option<AnalysisMethod>,
    /// Every step from the effective peak to the final limit, in order.
    pub steps: Vec<MultiplierStep>,
    pub rationale: String,
    pub insufficient_data: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(start: u8, end: u8) -> PrimeTimeWindow {
        PrimeTimeWindow {
            start_hour: start,
            end_hour: end,
            percentile_threshold: 0.0,
            consistency_score: 1.0,
            average_peak: 0.0,
            aggregate_traffic: 0.0,
            sample_count: 0,
        }
    }

    #[test]
    fn window_hours_wrap_past_midnight() {
        let w = window(22, 1);
        assert_eq!(w.hours(), vec![22, 23, 0, 1]);
        assert!(w.contains_hour(23));
        assert!(w.contains_hour(0));
        assert!(!w.contains_hour(12));
        assert_eq!(w.duration_minutes(), 240);
        assert_eq!(w.label(), "22:00 - 01:59");
    }

    #[test]
    fn single_hour_window() {
        let w = window(9, 9);
        assert_eq!(w.hours(), vec![9]);
        assert_eq!(w.duration_minutes(), 60);
    }

    #[test]
    fn trend_direction_uses_epsilon() {
        assert_eq!(TrendDirection::from_slope(0.0005, 0.001), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_slope(0.5, 0.001), TrendDirection::Increasing);
        assert_eq!(TrendDirection::from_slope(-0.5, 0.001), TrendDirection::Decreasing);
        assert_eq!(TrendDirection::from_slope(f64::NAN, 0.001), TrendDirection::Stable);
    }

    #[test]
    fn anomaly_fraction_and_summary() {
        let anomaly = Anomaly {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
            actual: 1000.0,
            expected: 100.0,
            lower: 90.0,
            upper: 110.0,
            severity: Severity::High,
            method: DetectionMethod::Forecast,
        };
        let analysis = TrafficAnalysis {
            method: AnalysisMethod::Forecast,
            fallback_reason: None,
            points_analyzed: 4,
            trend: TrendSummary::flat(),
            seasonality: Vec::new(),
            anomalies: vec![anomaly],
        };
        assert!((analysis.anomaly_fraction() - 0.25).abs() < f64::EPSILON);
        let summary = analysis.summary();
        assert_eq!(summary.high, 1);
        assert_eq!(summary.low, 0);
    }

    #[test]
    fn cache_counts_totals() {
        let counts = CacheOutcomeCounts {
            hit: 60,
            miss: 30,
            bypass: 5,
            expired: 3,
            stale: 2,
        };
        assert_eq!(counts.total(), 100);
        assert_eq!(counts.limiter_requests(), 40);
    }

    #[test]
    fn cache_counts_saturate_instead_of_overflowing() {
        let counts = CacheOutcomeCounts {
            hit: u64::MAX - 1,
            miss: 10,
            bypass: u64::MAX,
            expired: 0,
            stale: 1,
        };
        assert_eq!(counts.total(), u64::MAX);
        assert_eq!(counts.limiter_requests(), u64::MAX);

        let mostly_hits = CacheOutcomeCounts {
            hit: u64::MAX,
            miss: 5,
            ..Default::default()
        };
        assert_eq!(mostly_hits.total(), u64::MAX);
        assert_eq!(mostly_hits.limiter_requests(), 5);
    }

    #[test]
    fn enums_serialize_snake_case() {
        let json = serde_json::to_string(&TrafficPattern::ModeratelySpiky).unwrap();
        assert_eq!(json, "\"moderately_spiky\"");
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, "\"high\"");
    }

    #[test]
    fn confidence_levels() {
        assert_eq!(ConfidenceLevel::from_score(0.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.7), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.1), ConfidenceLevel::Low);
    }

    #[test]
    fn pair_key_display() {
        assert_eq!(PairKey::new("1234", "/api/v3/list").to_string(), "1234/api/v3/list");
        assert_eq!(PairKey::new("1234", "health").to_string(), "1234/health");
    }
}
