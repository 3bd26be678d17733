//! Batch results and their human-readable rendering.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ratewise_core::AnalysisMethod;
use ratewise_primetime::format_windows;

use crate::runner::{PairOutcome, PairReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub pairs: Vec<PairReport>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn get(&self, tenant: &str, endpoint: &str) -> Option<&PairReport> {
        self.pairs
            .iter()
            .find(|r| r.pair.tenant == tenant && r.pair.endpoint == endpoint)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub decided: usize,
    pub failed: usize,
    pub excluded: usize,
    /// Decided pairs that fell back to the minimum limit.
    pub insufficient: usize,
    pub forecast: usize,
    pub statistical: usize,
    /// Mean confidence over decided pairs, 0 when none were decided.
    pub mean_confidence: f64,
    /// The batch deadline expired before every pair finished.
    pub partial: bool,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    pub fn from_reports(reports: &[PairReport], partial: bool, elapsed: Duration) -> Self {
        let mut summary = Self {
            total: reports.len(),
            partial,
            elapsed_ms: elapsed.as_millis() as u64,
            ..Self::default()
        };
        let mut confidence_sum = 0.0;

        for report in reports {
            match &report.outcome {
                PairOutcome::Decided(eval) => {
                    summary.decided += 1;
                    confidence_sum += eval.decision.confidence;
                    if eval.decision.insufficient_data {
                        summary.insufficient += 1;
                    }
                    match eval.analysis.method {
                        AnalysisMethod::Forecast => summary.forecast += 1,
                        AnalysisMethod::Statistical => summary.statistical += 1,
                    }
                }
                PairOutcome::Failed { .. } => summary.failed += 1,
                PairOutcome::Excluded { .. } => summary.excluded += 1,
            }
        }

        if summary.decided > 0 {
            summary.mean_confidence = confidence_sum / summary.decided as f64;
        }
        summary
    }
}

pub fn format_batch_report(report: &BatchReport) -> String {
    let s = &report.summary;
    let mut out = String::new();

    out.push_str("\n╔══════════════════════════════════════════╗\n");
    out.push_str("║  Ratewise Rate Limit Recommendations     ║\n");
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str(&format!("║  Pairs:      {:<28}║\n", s.total));
    out.push_str(&format!(
        "║  Decided:    {:<28}║\n",
        format!("{} ({} insufficient)", s.decided, s.insufficient)
    ));
    out.push_str(&format!("║  Failed:     {:<28}║\n", s.failed));
    out.push_str(&format!("║  Excluded:   {:<28}║\n", s.excluded));
    out.push_str(&format!(
        "║  Confidence: {:<28}║\n",
        format!("{:.2} mean", s.mean_confidence)
    ));
    if s.partial {
        out.push_str(&format!("║  {:<40}║\n", "PARTIAL: batch deadline exceeded"));
    }
    out.push_str("╚══════════════════════════════════════════╝\n\n");

    out.push_str(&format!(
        "Analysis: {} forecast, {} statistical ({} ms)\n\n",
        s.forecast, s.statistical, s.elapsed_ms
    ));

    for r in &report.pairs {
        match &r.outcome {
            PairOutcome::Decided(eval) => {
                let d = &eval.decision;
                out.push_str(&format!(
                    "  {}  limit {}  confidence {:.2} ({})\n",
                    r.pair,
                    d.recommended_limit,
                    d.confidence,
                    d.confidence_level.label()
                ));
                let pattern = d.traffic_pattern.map(|p| p.label()).unwrap_or("n/a");
                let a = eval.analysis.summary();
                out.push_str(&format!(
                    "     peak {:.2}, pattern {}, trend {}, {}\n",
                    d.base_peak,
                    pattern,
                    a.trend_direction.label(),
                    a.method.label()
                ));
                out.push_str(&format!(
                    "     {} anomalies ({} high, {} medium, {} low)\n",
                    a.anomaly_count, a.high, a.medium, a.low
                ));
                for line in format_windows(&eval.windows).lines() {
                    out.push_str(&format!("     {line}\n"));
                }
                if let Some(reason) = &eval.analysis.fallback_reason {
                    out.push_str(&format!("     fallback: {reason}\n"));
                }
            }
            PairOutcome::Failed { kind, message } => {
                out.push_str(&format!("  {}  FAILED ({}): {}\n", r.pair, kind.label(), message));
            }
            PairOutcome::Excluded { reason } => {
                out.push_str(&format!("  {}  excluded: {}\n", r.pair, reason));
            }
        }
    }
    out
}
