//! Traffic pattern classification.

use ratewise_core::config::{PatternMultipliers, PatternThresholds};
use ratewise_core::stats;
use ratewise_core::TrafficPattern;

/// Coefficient of variation and peak-to-mean ratio of a set of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variability {
    pub cv: f64,
    pub peak_to_mean: f64,
}

impl Variability {
    pub fn of(values: &[f64]) -> Self {
        let mean = stats::mean(values);
        if mean <= 0.0 {
            return Self {
                cv: 0.0,
                peak_to_mean: 1.0,
            };
        }
        Self {
            cv: stats::population_std(values) / mean,
            peak_to_mean: stats::max(values).unwrap_or(mean) / mean,
        }
    }
}

/// Spikier classes need both a high CV and a high peak-to-mean ratio;
/// "variable" needs either.
pub fn classify(v: Variability, t: &PatternThresholds) -> TrafficPattern {
    if v.cv > t.spiky_cv && v.peak_to_mean > t.spiky_peak_ratio {
        TrafficPattern::Spiky
    } else if v.cv > t.moderately_spiky_cv && v.peak_to_mean > t.moderately_spiky_peak_ratio {
        TrafficPattern::ModeratelySpiky
    } else if v.cv > t.variable_cv || v.peak_to_mean > t.variable_peak_ratio {
        TrafficPattern::Variable
    } else {
        TrafficPattern::Stable
    }
}

pub fn multiplier(pattern: TrafficPattern, m: &PatternMultipliers) -> f64 {
    match pattern {
        TrafficPattern::Stable => m.stable,
        TrafficPattern::Variable => m.variable,
        TrafficPattern::ModeratelySpiky => m.moderately_spiky,
        TrafficPattern::Spiky => m.spiky,
    }
}
