//! ratewise.toml configuration.
//!
//! One fully-resolved value per run. Every section and field has a default,
//! so an empty document is a valid configuration. Tier or environment merging
//! happens before this file is written.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Severity;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RatewiseConfig {
    pub analyzer: AnalyzerConfig,
    pub anomaly: AnomalyConfig,
    pub prime_time: PrimeTimeConfig,
    pub rate: RateCalculationConfig,
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
}

// ── Analyzer ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityMode {
    #[default]
    Additive,
    Multiplicative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// When false, every pair goes straight to the statistical path.
    pub forecast_enabled: bool,
    /// Minimum finite points required before a forecast is attempted.
    pub min_points: usize,
    pub daily_seasonality: bool,
    pub weekly_seasonality: bool,
    pub daily_fourier_order: usize,
    pub weekly_fourier_order: usize,
    pub seasonality_mode: SeasonalityMode,
    /// Width of the uncertainty interval, in (0, 1).
    pub interval_width: f64,
    pub changepoints: usize,
    /// Fraction of history over which changepoints are placed.
    pub changepoint_range: f64,
    pub changepoint_prior_scale: f64,
    pub uncertainty_samples: usize,
    pub seed: u64,
    pub forecast_timeout_ms: u64,
    /// Slopes (units per sample) smaller than this are "stable".
    pub trend_stability_epsilon: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            forecast_enabled: true,
            min_points: 10,
            daily_seasonality: true,
            weekly_seasonality: true,
            daily_fourier_order: 4,
            weekly_fourier_order: 3,
            seasonality_mode: SeasonalityMode::Additive,
            interval_width: 0.90,
            changepoints: 10,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            uncertainty_samples: 200,
            seed: 42,
            forecast_timeout_ms: 30_000,
            trend_stability_epsilon: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub iqr_multiplier: f64,
    pub zscore_threshold: f64,
    /// Anomalies with these severities are removed before peak computation.
    pub exclude_severities: Vec<Severity>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            iqr_multiplier: 1.5,
            zscore_threshold: 3.0,
            exclude_severities: vec![Severity::Low, Severity::Medium, Severity::High],
        }
    }
}

impl AnomalyConfig {
    pub fn excludes(&self, severity: Severity) -> bool {
        self.exclude_severities.contains(&severity)
    }
}

// ── Prime time ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimeTimeConfig {
    /// Percentile (0-100) over the 24 hourly aggregates.
    pub percentile: f64,
    pub min_duration_minutes: u32,
    /// Fraction of observed days a window must be elevated on.
    pub min_consistency: f64,
    /// Fraction of a window's hours that must be candidates on a given day.
    pub hour_match_fraction: f64,
    pub max_windows: usize,
    /// Samples below this value are ignored (maintenance periods).
    pub min_traffic_threshold: f64,
    pub merge_across_midnight: bool,
}

impl Default for PrimeTimeConfig {
    fn default() -> Self {
        Self {
            percentile: 75.0,
            min_duration_minutes: 60,
            min_consistency: 0.6,
            hour_match_fraction: 0.5,
            max_windows: 3,
            min_traffic_threshold: 0.0,
            merge_across_midnight: true,
        }
    }
}

// ── Rate calculation ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMethod {
    #[default]
    NearestHundred,
    NearestFifty,
    NearestTen,
    Exact,
}

impl RoundingMethod {
    pub fn step(&self) -> u64 {
        match self {
            RoundingMethod::NearestHundred => 100,
            RoundingMethod::NearestFifty => 50,
            RoundingMethod::NearestTen => 10,
            RoundingMethod::Exact => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RoundingMethod::NearestHundred => "nearest_hundred",
            RoundingMethod::NearestFifty => "nearest_fifty",
            RoundingMethod::NearestTen => "nearest_ten",
            RoundingMethod::Exact => "exact",
        }
    }
}

/// Coefficient-of-variation and peak-to-mean cut-offs for pattern classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternThresholds {
    pub variable_cv: f64,
    pub variable_peak_ratio: f64,
    pub moderately_spiky_cv: f64,
    pub moderately_spiky_peak_ratio: f64,
    pub spiky_cv: f64,
    pub spiky_peak_ratio: f64,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            variable_cv: 0.3,
            variable_peak_ratio: 2.0,
            moderately_spiky_cv: 0.6,
            moderately_spiky_peak_ratio: 4.0,
            spiky_cv: 1.0,
            spiky_peak_ratio: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternMultipliers {
    pub stable: f64,
    pub variable: f64,
    pub moderately_spiky: f64,
    pub spiky: f64,
}

impl Default for PatternMultipliers {
    fn default() -> Self {
        Self {
            stable: 1.0,
            variable: 1.05,
            moderately_spiky: 1.1,
            spiky: 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub coverage: f64,
    pub anomaly_free: f64,
    pub consistency: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            coverage: 0.4,
            anomaly_free: 0.3,
            consistency: 0.3,
        }
    }
}

impl ConfidenceWeights {
    pub fn total(&self) -> f64 {
        self.coverage + self.anomaly_free + self.consistency
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateCalculationConfig {
    pub peak_multiplier: f64,
    pub safety_margin: f64,
    pub min_rate_limit: u64,
    pub max_rate_limit: u64,
    pub rounding_method: RoundingMethod,
    pub enable_cache_adjustment: bool,
    pub cache_adjustment_factor: f64,
    /// Flat factor used when no observed cache profile is available.
    pub default_cache_multiplier: f64,
    pub trend_increase_pct: f64,
    pub trend_decrease_pct: f64,
    pub pattern_thresholds: PatternThresholds,
    pub pattern_multipliers: PatternMultipliers,
    pub confidence_weights: ConfidenceWeights,
    /// Extra factor per tenant id.
    pub tenant_multipliers: BTreeMap<String, f64>,
    /// Extra factor per endpoint substring; the first matching key wins.
    pub endpoint_multipliers: BTreeMap<String, f64>,
}

impl Default for RateCalculationConfig {
    fn default() -> Self {
        Self {
            peak_multiplier: 2.5,
            safety_margin: 1.5,
            min_rate_limit: 100,
            max_rate_limit: 50_000,
            rounding_method: RoundingMethod::NearestHundred,
            enable_cache_adjustment: true,
            cache_adjustment_factor: 0.3,
            default_cache_multiplier: 1.0,
            trend_increase_pct: 0.10,
            trend_decrease_pct: 0.05,
            pattern_thresholds: PatternThresholds::default(),
            pattern_multipliers: PatternMultipliers::default(),
            confidence_weights: ConfidenceWeights::default(),
            tenant_multipliers: BTreeMap::new(),
            endpoint_multipliers: BTreeMap::new(),
        }
    }
}

// ── Cache ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Hit ratio assumed when there are no outcome counts.
    pub default_hit_ratio: f64,
    pub bypass_penalty: f64,
    pub ttl_penalty: f64,
    /// Per-period slope above which a cache trend counts as moving.
    pub trend_slope_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_hit_ratio: 0.15,
            bypass_penalty: 0.3,
            ttl_penalty: 0.2,
            trend_slope_threshold: 0.01,
        }
    }
}

// ── Pipeline ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub lookback_days: u32,
    pub max_workers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_timeout_secs: Option<u64>,
    pub excluded_tenants: Vec<String>,
    pub excluded_endpoints: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            max_workers: 4,
            batch_timeout_secs: None,
            excluded_tenants: Vec::new(),
            excluded_endpoints: Vec::new(),
        }
    }
}

// ── Loading and validation ─────────────────────────────────────────

impl RatewiseConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: RatewiseConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations no run could use.
    pub fn validate(&self) -> ConfigResult<()> {
        let rate = &self.rate;
        if rate.min_rate_limit > rate.max_rate_limit {
            return Err(ConfigError::InvalidBounds {
                min: rate.min_rate_limit,
                max: rate.max_rate_limit,
            });
        }
        if rate.min_rate_limit == 0 {
            return Err(ConfigError::invalid("rate.min_rate_limit", "must be at least 1"));
        }
        positive("rate.peak_multiplier", rate.peak_multiplier)?;
        positive("rate.safety_margin", rate.safety_margin)?;
        positive("rate.default_cache_multiplier", rate.default_cache_multiplier)?;
        non_negative("rate.cache_adjustment_factor", rate.cache_adjustment_factor)?;
        fraction("rate.trend_increase_pct", rate.trend_increase_pct)?;
        fraction("rate.trend_decrease_pct", rate.trend_decrease_pct)?;

        let pm = &rate.pattern_multipliers;
        positive("rate.pattern_multipliers.stable", pm.stable)?;
        positive("rate.pattern_multipliers.variable", pm.variable)?;
        positive("rate.pattern_multipliers.moderately_spiky", pm.moderately_spiky)?;
        positive("rate.pattern_multipliers.spiky", pm.spiky)?;

        let pt = &rate.pattern_thresholds;
        non_negative("rate.pattern_thresholds.variable_cv", pt.variable_cv)?;
        non_negative("rate.pattern_thresholds.variable_peak_ratio", pt.variable_peak_ratio)?;
        non_negative("rate.pattern_thresholds.moderately_spiky_cv", pt.moderately_spiky_cv)?;
        non_negative(
            "rate.pattern_thresholds.moderately_spiky_peak_ratio",
            pt.moderately_spiky_peak_ratio,
        )?;
        non_negative("rate.pattern_thresholds.spiky_cv", pt.spiky_cv)?;
        non_negative("rate.pattern_thresholds.spiky_peak_ratio", pt.spiky_peak_ratio)?;

        let w = &rate.confidence_weights;
        non_negative("rate.confidence_weights.coverage", w.coverage)?;
        non_negative("rate.confidence_weights.anomaly_free", w.anomaly_free)?;
        non_negative("rate.confidence_weights.consistency", w.consistency)?;
        if w.total() <= 0.0 {
            return Err(ConfigError::invalid(
                "rate.confidence_weights",
                "weights must have a positive sum",
            ));
        }

        for (tenant, factor) in &rate.tenant_multipliers {
            if !(factor.is_finite() && *factor > 0.0) {
                return Err(ConfigError::invalid(
                    "rate.tenant_multipliers",
                    format!("{tenant} has non-positive factor {factor}"),
                ));
            }
        }
        for (endpoint, factor) in &rate.endpoint_multipliers {
            if !(factor.is_finite() && *factor > 0.0) {
                return Err(ConfigError::invalid(
                    "rate.endpoint_multipliers",
                    format!("{endpoint} has non-positive factor {factor}"),
                ));
            }
        }

        let a = &self.analyzer;
        if !(a.interval_width > 0.0 && a.interval_width < 1.0) {
            return Err(ConfigError::invalid(
                "analyzer.interval_width",
                format!("{} is not in (0, 1)", a.interval_width),
            ));
        }
        fraction("analyzer.changepoint_range", a.changepoint_range)?;
        positive("analyzer.changepoint_prior_scale", a.changepoint_prior_scale)?;
        non_negative("analyzer.trend_stability_epsilon", a.trend_stability_epsilon)?;
        if a.forecast_timeout_ms == 0 {
            return Err(ConfigError::invalid("analyzer.forecast_timeout_ms", "must be positive"));
        }
        if a.uncertainty_samples < 2 {
            return Err(ConfigError::invalid("analyzer.uncertainty_samples", "must be at least 2"));
        }

        positive("anomaly.iqr_multiplier", self.anomaly.iqr_multiplier)?;
        positive("anomaly.zscore_threshold", self.anomaly.zscore_threshold)?;

        let p = &self.prime_time;
        if !(0.0..=100.0).contains(&p.percentile) {
            return Err(ConfigError::invalid(
                "prime_time.percentile",
                format!("{} is not in [0, 100]", p.percentile),
            ));
        }
        fraction("prime_time.min_consistency", p.min_consistency)?;
        fraction("prime_time.hour_match_fraction", p.hour_match_fraction)?;
        non_negative("prime_time.min_traffic_threshold", p.min_traffic_threshold)?;
        if p.max_windows == 0 {
            return Err(ConfigError::invalid("prime_time.max_windows", "must be at least 1"));
        }

        let c = &self.cache;
        fraction("cache.default_hit_ratio", c.default_hit_ratio)?;
        non_negative("cache.bypass_penalty", c.bypass_penalty)?;
        non_negative("cache.ttl_penalty", c.ttl_penalty)?;
        non_negative("cache.trend_slope_threshold", c.trend_slope_threshold)?;

        if self.pipeline.max_workers == 0 {
            return Err(ConfigError::invalid("pipeline.max_workers", "must be at least 1"));
        }
        if self.pipeline.lookback_days == 0 {
            return Err(ConfigError::invalid("pipeline.lookback_days", "must be at least 1"));
        }
        if self.pipeline.batch_timeout_secs == Some(0) {
            return Err(ConfigError::invalid("pipeline.batch_timeout_secs", "must be positive"));
        }

        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be positive")))
    }
}

fn non_negative(field: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must not be negative")))
    }
}

fn fraction(field: &'static str, value: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is not in [0, 1]")))
    }
}
