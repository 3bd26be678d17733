//! Multi-period cache trend view.
//!
//! Profiles over nested lookback periods (1h, 6h, 1d, 3d, 1w) are ordered
//! from the widest period to the narrowest, so a positive slope means the
//! most recent traffic is cached better than the long-run average.

use serde::Serialize;

use ratewise_core::stats::{linear_fit, mean};
use ratewise_core::{CacheOutcomeCounts, CacheProfile, PairKey};

use crate::collector::CacheProfileCollector;

/// Lookback periods, in hours, examined by the trend view.
pub const DEFAULT_PERIOD_HOURS: [u32; 5] = [1, 6, 24, 72, 168];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTrend {
    Improving,
    Declining,
    Stable,
}

impl CacheTrend {
    fn from_values(values: &[f64], threshold: f64) -> Self {
        if values.len() < 2 {
            return CacheTrend::Stable;
        }
        let slope = linear_fit(values).slope;
        if slope > threshold {
            CacheTrend::Improving
        } else if slope < -threshold {
            CacheTrend::Declining
        } else {
            CacheTrend::Stable
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CacheTrend::Improving => "improving",
            CacheTrend::Declining => "declining",
            CacheTrend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodProfile {
    pub hours: u32,
    pub profile: CacheProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheTrendReport {
    pub pair: PairKey,
    /// Observed periods, widest first.
    pub periods: Vec<PeriodProfile>,
    pub hit_ratio_trend: CacheTrend,
    pub efficiency_trend: CacheTrend,
    pub average_hit_ratio: f64,
    pub average_efficiency: f64,
    pub recommendations: Vec<String>,
}

impl CacheProfileCollector {
    /// Build the trend view from per-period counts.
    ///
    /// Periods longer than `lookback_hours` and periods without data are skipped.
    pub fn trend_report(
        &self,
        pair: PairKey,
        periods: &[(u32, Option<CacheOutcomeCounts>)],
        lookback_hours: u32,
    ) -> CacheTrendReport {
        let mut observed: Vec<PeriodProfile> = periods
            .iter()
            .filter(|(hours, _)| *hours <= lookback_hours)
            .filter_map(|(hours, counts)| {
                let profile = self.profile(counts.as_ref());
                (!profile.is_default()).then_some(PeriodProfile {
                    hours: *hours,
                    profile,
                })
            })
            .collect();
        observed.sort_by(|a, b| b.hours.cmp(&a.hours));

        let hit_ratios: Vec<f64> = observed.iter().map(|p| p.profile.hit_ratio).collect();
        let efficiencies: Vec<f64> = observed
            .iter()
            .map(|p| p.profile.efficiency_score)
            .collect();
        let threshold = self.trend_slope_threshold();
        let hit_ratio_trend = CacheTrend::from_values(&hit_ratios, threshold);

        CacheTrendReport {
            pair,
            recommendations: recommendations(&observed, hit_ratio_trend),
            hit_ratio_trend,
            efficiency_trend: CacheTrend::from_values(&efficiencies, threshold),
            average_hit_ratio: mean(&hit_ratios),
            average_efficiency: mean(&efficiencies),
            periods: observed,
        }
    }
}

/// Advice based on the widest observed period and the hit ratio trend.
fn recommendations(periods: &[PeriodProfile], hit_ratio_trend: CacheTrend) -> Vec<String> {
    let Some(overall) = periods.first() else {
        return vec!["Insufficient cache data for recommendations".to_string()];
    };
    let hit = overall.profile.hit_ratio;
    let efficiency = overall.profile.efficiency_score;

    let mut out = Vec::new();
    if hit < 0.1 {
        out.push("Very low cache hit ratio: review cache configuration");
    } else if hit < 0.3 {
        out.push("Low cache hit ratio: tune cache TTLs and cache keys");
    } else if hit > 0.8 {
        out.push("Excellent cache hit ratio: current configuration is working");
    }

    if efficiency < 0.5 {
        out.push("Cache efficiency below target: review bypass and expiration policies");
    } else if efficiency > 0.8 {
        out.push("Cache efficiency is excellent: keep current configuration");
    }

    match hit_ratio_trend {
        CacheTrend::Declining => out.push("Cache hit ratio is declining: investigate recent changes"),
        CacheTrend::Improving => out.push("Cache hit ratio is improving: continue current optimizations"),
        CacheTrend::Stable => {}
    }

    if out.is_empty() {
        out.push("Cache performance is within normal parameters");
    }
    out.into_iter().map(String::from).collect()
}
