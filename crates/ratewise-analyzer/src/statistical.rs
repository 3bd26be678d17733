//! Statistical fallback: IQR fences and z-scores on raw values.

use ratewise_core::stats::{mean, quantile, sample_std};
use ratewise_core::{Anomaly, DetectionMethod, MetricSeries, Severity};

/// Outliers by IQR fences or z-score.
///
/// A point flagged by both tests is high severity, by one test medium.
pub fn detect_outliers(
    series: &MetricSeries,
    iqr_multiplier: f64,
    zscore_threshold: f64,
) -> Vec<Anomaly> {
    let values = series.values();
    let (Some(q1), Some(q3)) = (quantile(&values, 0.25), quantile(&values, 0.75)) else {
        return Vec::new();
    };
    let iqr = q3 - q1;
    let lower = q1 - iqr_multiplier * iqr;
    let upper = q3 + iqr_multiplier * iqr;
    let m = mean(&values);
    let std = sample_std(&values);

    series
        .points()
        .iter()
        .filter_map(|p| {
            let by_iqr = p.value < lower || p.value > upper;
            let by_z = std > 0.0 && ((p.value - m) / std).abs() > zscore_threshold;
            let severity = match (by_iqr, by_z) {
                (true, true) => Severity::High,
                (true, false) | (false, true) => Severity::Medium,
                (false, false) => return None,
            };
            Some(Anomaly {
                timestamp: p.timestamp,
                actual: p.value,
                expected: m,
                lower,
                upper,
                severity,
                method: DetectionMethod::Statistical,
            })
        })
        .collect()
}
