//! Confidence scoring.
//!
//! ```text
//! coverage     = clean span / target lookback            (clamped to [0, 1])
//! anomaly_free = 1 − anomalies / points analysed
//! consistency  = mean window consistency                 (0 without windows)
//! score        = Σ weight_i × signal_i / Σ weight_i
//! ```

use chrono::Duration;

use ratewise_core::config::ConfidenceWeights;
use ratewise_core::{ConfidenceBreakdown, MetricSeries, PrimeTimeWindow, TrafficAnalysis};

pub fn breakdown(
    clean: &MetricSeries,
    windows: &[PrimeTimeWindow],
    analysis: &TrafficAnalysis,
    target_lookback: Duration,
) -> ConfidenceBreakdown {
    let target = target_lookback.num_milliseconds() as f64;
    let coverage = if target > 0.0 {
        (clean.span().num_milliseconds() as f64 / target).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let consistency = if windows.is_empty() {
        0.0
    } else {
        windows.iter().map(|w| w.consistency_score).sum::<f64>() / windows.len() as f64
    };

    ConfidenceBreakdown {
        coverage,
        anomaly_free: (1.0 - analysis.anomaly_fraction()).clamp(0.0, 1.0),
        consistency: consistency.clamp(0.0, 1.0),
    }
}

pub fn score(b: &ConfidenceBreakdown, w: &ConfidenceWeights) -> f64 {
    let total = w.total();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted =
        w.coverage * b.coverage + w.anomaly_free * b.anomaly_free + w.consistency * b.consistency;
    (weighted / total).clamp(0.0, 1.0)
}
