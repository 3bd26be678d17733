//! Audit rationale strings.
//!
//! Numbers use fixed precision so identical decisions render identical text.

use ratewise_core::{ConfidenceLevel, MultiplierStep, PairKey};

/// Where the effective peak came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakSource {
    PrimeTimeWindows(usize),
    CleanSeriesMean(usize),
}

pub fn render(
    pair: &PairKey,
    effective_peak: f64,
    source: PeakSource,
    steps: &[MultiplierStep],
    limit: u64,
    confidence: f64,
    level: ConfidenceLevel,
) -> String {
    let source = match source {
        PeakSource::PrimeTimeWindows(n) => format!("mean of {n} prime time window average(s)"),
        PeakSource::CleanSeriesMean(n) => format!("mean of {n} clean samples, no prime time window"),
    };

    let mut parts = vec![format!(
        "{pair}: effective peak {effective_peak:.2} ({source})"
    )];
    for step in steps {
        parts.push(format!(
            "{} x{:.4}: {:.2} -> {:.2}",
            step.name, step.factor, step.before, step.after
        ));
    }
    parts.push(format!(
        "recommended limit {limit}, confidence {confidence:.2} ({})",
        level.label()
    ));
    parts.join("; ")
}

pub fn insufficient(pair: &PairKey, min_rate_limit: u64) -> String {
    format!(
        "{pair}: insufficient data, no usable samples; recommended limit {min_rate_limit} (min_rate_limit), confidence 0.00 (low)"
    )
}
