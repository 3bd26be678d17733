//! Rate limit calculation.

use chrono::Duration;
use tracing::{debug, info};

use ratewise_core::config::RateCalculationConfig;
use ratewise_core::stats;
use ratewise_core::{
    CacheProfile, ConfidenceBreakdown, ConfidenceLevel, MetricSeries, MultiplierStep, PairKey,
    PrimeTimeWindow, RateLimitDecision, RatewiseConfig, TrafficAnalysis, TrendDirection,
};

use crate::confidence;
use crate::pattern::{self, Variability};
use crate::rationale::{self, PeakSource};

/// Below this fraction of a step a value counts as already on the boundary.
const ROUNDING_SLACK: f64 = 1e-6;

/// Everything the calculator needs for one pair.
#[derive(Debug, Clone, Copy)]
pub struct CalculationInput<'a> {
    pub pair: &'a PairKey,
    /// Series with excluded anomalies removed.
    pub clean: &'a MetricSeries,
    pub windows: &'a [PrimeTimeWindow],
    pub analysis: &'a TrafficAnalysis,
    /// Observed cache profile, if any.
    pub cache: Option<&'a CacheProfile>,
    pub target_lookback: Duration,
}

/// Turns an analysis, its prime time windows and a cache profile into a
/// recommended per-minute limit with confidence and rationale.
#[derive(Debug, Clone)]
pub struct RateLimitCalculator {
    config: RateCalculationConfig,
}

/// Running value plus the steps that produced it.
struct Ledger {
    value: f64,
    steps: Vec<MultiplierStep>,
}

impl Ledger {
    fn new(value: f64) -> Self {
        Self {
            value,
            steps: Vec::new(),
        }
    }

    fn multiply(&mut self, name: impl Into<String>, factor: f64) {
        let before = self.value;
        self.value *= factor;
        self.steps.push(MultiplierStep {
            name: name.into(),
            factor,
            before,
            after: self.value,
        });
    }

    /// Record a non-multiplicative adjustment to `after`.
    fn set(&mut self, name: impl Into<String>, after: f64) {
        let before = self.value;
        let factor = if before > 0.0 { after / before } else { 1.0 };
        self.value = after;
        self.steps.push(MultiplierStep {
            name: name.into(),
            factor,
            before,
            after,
        });
    }
}

impl RateLimitCalculator {
    pub fn new(config: &RatewiseConfig) -> Self {
        Self {
            config: config.rate.clone(),
        }
    }

    /// Produce exactly one decision. Never fails.
    pub fn calculate(&self, input: &CalculationInput<'_>) -> RateLimitDecision {
        let cfg = &self.config;
        let pair = input.pair;

        let clean_values = input.clean.values();
        let (effective_peak, source) = if !input.windows.is_empty() {
            let peaks: Vec<f64> = input.windows.iter().map(|w| w.average_peak).collect();
            (
                stats::mean(&peaks),
                PeakSource::PrimeTimeWindows(input.windows.len()),
            )
        } else if !clean_values.is_empty() {
            (
                stats::mean(&clean_values),
                PeakSource::CleanSeriesMean(clean_values.len()),
            )
        } else {
            return self.insufficient(input);
        };

        let variability = Variability::of(&clean_values);
        let traffic_pattern = pattern::classify(variability, &cfg.pattern_thresholds);

        let mut ledger = Ledger::new(effective_peak);
        ledger.multiply("peak_multiplier", cfg.peak_multiplier);
        ledger.multiply(
            format!("traffic_pattern({})", traffic_pattern.label()),
            pattern::multiplier(traffic_pattern, &cfg.pattern_multipliers),
        );

        match input.cache.filter(|c| cfg.enable_cache_adjustment && !c.is_default()) {
            Some(profile) => ledger.multiply(
                format!("cache_adjustment(hit_ratio={:.4})", profile.hit_ratio),
                1.0 + profile.hit_ratio * cfg.cache_adjustment_factor,
            ),
            None => ledger.multiply("cache_default", cfg.default_cache_multiplier),
        }

        let direction = input.analysis.trend.direction;
        let trend_factor = match direction {
            TrendDirection::Increasing => 1.0 + cfg.trend_increase_pct,
            TrendDirection::Decreasing => 1.0 - cfg.trend_decrease_pct,
            TrendDirection::Stable => 1.0,
        };
        ledger.multiply(format!("trend({})", direction.label()), trend_factor);

        if let Some(factor) = cfg.tenant_multipliers.get(&pair.tenant) {
            ledger.multiply(format!("tenant_multiplier({})", pair.tenant), *factor);
        }
        if let Some((key, factor)) = cfg
            .endpoint_multipliers
            .iter()
            .find(|(key, _)| pair.endpoint.contains(key.as_str()))
        {
            ledger.multiply(format!("endpoint_multiplier({key})"), *factor);
        }

        ledger.multiply("safety_margin", cfg.safety_margin);

        let (min, max) = (cfg.min_rate_limit as f64, cfg.max_rate_limit as f64);
        ledger.set(
            format!("clamp[{}, {}]", cfg.min_rate_limit, cfg.max_rate_limit),
            ledger.value.clamp(min, max),
        );
        let rounded = self.round_up(ledger.value);
        ledger.set(
            format!("rounding({})", cfg.rounding_method.label()),
            rounded as f64,
        );

        let breakdown = confidence::breakdown(
            input.clean,
            input.windows,
            input.analysis,
            input.target_lookback,
        );
        let confidence = confidence::score(&breakdown, &cfg.confidence_weights);
        let level = ConfidenceLevel::from_score(confidence);

        let rationale = rationale::render(
            pair,
            effective_peak,
            source,
            &ledger.steps,
            rounded,
            confidence,
            level,
        );

        info!(
            tenant = %pair.tenant,
            endpoint = %pair.endpoint,
            limit = rounded,
            effective_peak,
            pattern = traffic_pattern.label(),
            confidence,
            "rate limit calculated"
        );
        debug!(
            cv = variability.cv,
            peak_to_mean = variability.peak_to_mean,
            steps = ledger.steps.len(),
            "calculation detail"
        );

        RateLimitDecision {
            recommended_limit: rounded,
            confidence,
            confidence_level: level,
            confidence_breakdown: breakdown,
            base_peak: effective_peak,
            traffic_pattern: Some(traffic_pattern),
            analysis_method: Some(input.analysis.method),
            steps: ledger.steps,
            rationale,
            insufficient_data: false,
        }
    }

    /// Round up to the configured step, then re-apply the bounds.
    pub fn round_up(&self, value: f64) -> u64 {
        let step = self.config.rounding_method.step() as f64;
        let rounded = ((value / step) - ROUNDING_SLACK).ceil().max(0.0) * step;
        let bounded = rounded.clamp(
            self.config.min_rate_limit as f64,
            self.config.max_rate_limit as f64,
        );
        bounded as u64
    }

    fn insufficient(&self, input: &CalculationInput<'_>) -> RateLimitDecision {
        let min = self.config.min_rate_limit;
        info!(
            tenant = %input.pair.tenant,
            endpoint = %input.pair.endpoint,
            limit = min,
            "insufficient data, using minimum rate limit"
        );
        RateLimitDecision {
            recommended_limit: min,
            confidence: 0.0,
            confidence_level: ConfidenceLevel::Low,
            confidence_breakdown: ConfidenceBreakdown::default(),
            base_peak: 0.0,
            traffic_pattern: None,
            analysis_method: Some(input.analysis.method),
            steps: Vec::new(),
            rationale: rationale::insufficient(input.pair, min),
            insufficient_data: true,
        }
    }
}
