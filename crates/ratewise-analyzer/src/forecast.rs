//! Seasonal regression forecast with uncertainty intervals.
//!
//! The model is a piecewise-linear trend (hinge terms at evenly spaced
//! changepoints) plus Fourier series for daily and weekly seasonality,
//! fitted by ridge-penalised least squares on values scaled to `[0, 1]`.
//!
//! ```text
//! additive:        y = trend(t) + Σ season_k(τ)
//! multiplicative:  y = trend(t) · (1 + Σ season_k(τ))
//! ```
//!
//! `t` is time normalised over the history; `τ` is absolute epoch seconds so
//! seasonal phase is the same for every series. Interval offsets are
//! empirical quantiles of seeded Gaussian draws scaled by the residual sigma,
//! so a given input always yields the same bounds.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

use ratewise_core::config::{AnalyzerConfig, SeasonalityMode};
use ratewise_core::stats::quantile_sorted;
use ratewise_core::{Anomaly, DetectionMethod, MetricSeries, SeasonKind, Severity};

use crate::cancel::CancelToken;
use crate::linalg::{SymMatrix, cholesky_solve};

/// Rows processed between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 512;

/// Ridge applied to seasonal coefficients, per sample.
const SEASONAL_RIDGE: f64 = 1e-6;

/// Ridge applied to changepoint coefficients, per sample, before dividing by the prior scale.
const CHANGEPOINT_RIDGE: f64 = 1e-3;

/// Relative tolerance for "outside the interval" on exact fits.
const INTERVAL_TOLERANCE: f64 = 1e-9;

/// Why a forecast could not be produced. Always recovered by the statistical path.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForecastError {
    #[error("insufficient data: {points} points, need {required}")]
    InsufficientData { points: usize, required: usize },

    #[error("forecasting disabled by configuration")]
    Disabled,

    #[error("forecast deadline exceeded")]
    DeadlineExceeded,

    #[error("forecast normal equations are singular")]
    Singular,

    #[error("forecast produced non-finite values")]
    NonFinite,

    #[error("trend is not positive; multiplicative seasonality is undefined")]
    NonPositiveTrend,
}

/// One fitted seasonal component evaluated at every sample.
///
/// Additive components are in series units; multiplicative ones are relative
/// to the trend.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalComponent {
    pub kind: SeasonKind,
    pub values: Vec<f64>,
}

/// In-sample predictions for every historical timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub yhat: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub trend: Vec<f64>,
    pub seasonal: Vec<SeasonalComponent>,
    pub sigma: f64,
}

impl Forecast {
    /// Points outside `[lower, upper]`, graded by distance past the nearest bound.
    ///
    /// A point more than two interval widths past its bound is high, more
    /// than one is medium, anything else low. When the interval has no width
    /// every real deviation is high.
    pub fn anomalies(&self, series: &MetricSeries) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        for (i, point) in series.points().iter().enumerate() {
            let (yhat, lower, upper) = (self.yhat[i], self.lower[i], self.upper[i]);
            let tolerance = INTERVAL_TOLERANCE * yhat.abs().max(1.0);
            let distance = if point.value > upper + tolerance {
                point.value - upper
            } else if point.value < lower - tolerance {
                lower - point.value
            } else {
                continue;
            };

            let span = upper - lower;
            let severity = if span <= tolerance {
                Severity::High
            } else {
                let ratio = distance / span;
                if ratio > 2.0 {
                    Severity::High
                } else if ratio > 1.0 {
                    Severity::Medium
                } else {
                    Severity::Low
                }
            };

            anomalies.push(Anomaly {
                timestamp: point.timestamp,
                actual: point.value,
                expected: yhat,
                lower,
                upper,
                severity,
                method: DetectionMethod::Forecast,
            });
        }
        anomalies
    }
}

/// Column layout of the design matrix.
struct Design {
    n: usize,
    trend_cols: usize,
    seasons: Vec<(SeasonKind, usize)>,
    /// Trend columns then seasonal columns, row-major.
    rows: Vec<f64>,
}

impl Design {
    fn build(
        series: &MetricSeries,
        config: &AnalyzerConfig,
        cancel: &CancelToken,
    ) -> Result<Self, ForecastError> {
        let points = series.points();
        let n = points.len();
        let first = points[0].timestamp;
        let total = (points[n - 1].timestamp - first).num_milliseconds() as f64 / 1000.0;

        let changepoints: Vec<f64> = (1..=config.changepoints)
            .map(|j| config.changepoint_range * j as f64 / config.changepoints as f64)
            .collect();

        let span = series.span().num_milliseconds() as f64 / 1000.0;
        let mut seasons = Vec::new();
        if config.daily_seasonality
            && config.daily_fourier_order > 0
            && span >= SeasonKind::Daily.period_secs()
        {
            seasons.push((SeasonKind::Daily, config.daily_fourier_order));
        }
        if config.weekly_seasonality
            && config.weekly_fourier_order > 0
            && span >= SeasonKind::Weekly.period_secs()
        {
            seasons.push((SeasonKind::Weekly, config.weekly_fourier_order));
        }

        let trend_cols = 2 + changepoints.len();
        let seasonal_cols: usize = seasons.iter().map(|(_, order)| 2 * order).sum();
        let width = trend_cols + seasonal_cols;
        let mut rows = Vec::with_capacity(n * width);

        for (i, point) in points.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(ForecastError::DeadlineExceeded);
            }
            let t = if total > 0.0 {
                (point.timestamp - first).num_milliseconds() as f64 / 1000.0 / total
            } else {
                0.0
            };
            rows.push(1.0);
            rows.push(t);
            rows.extend(changepoints.iter().map(|c| (t - c).max(0.0)));

            let epoch = point.timestamp.timestamp_millis() as f64 / 1000.0;
            for (kind, order) in &seasons {
                let base = 2.0 * PI * epoch / kind.period_secs();
                for m in 1..=*order {
                    let angle = base * m as f64;
                    rows.push(angle.sin());
                    rows.push(angle.cos());
                }
            }
        }

        Ok(Self {
            n,
            trend_cols,
            seasons,
            rows,
        })
    }

    fn width(&self) -> usize {
        self.rows.len() / self.n.max(1)
    }

    fn row(&self, i: usize) -> &[f64] {
        let w = self.width();
        &self.rows[i * w..(i + 1) * w]
    }

    /// Ridge-penalised least squares over the columns in `cols`.
    fn solve(
        &self,
        cols: std::ops::Range<usize>,
        target: &[f64],
        ridge: &[f64],
        cancel: &CancelToken,
    ) -> Result<Vec<f64>, ForecastError> {
        let p = cols.len();
        let mut xtx = SymMatrix::zeros(p);
        let mut xty = vec![0.0; p];

        for (i, y) in target.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(ForecastError::DeadlineExceeded);
            }
            let row = &self.row(i)[cols.clone()];
            xtx.add_outer_upper(row);
            for (acc, x) in xty.iter_mut().zip(row) {
                *acc += x * y;
            }
        }
        xtx.symmetrize();
        for (j, r) in ridge.iter().enumerate() {
            xtx.add(j, j, *r);
        }

        cholesky_solve(&xtx, &xty).ok_or(ForecastError::Singular)
    }

    fn evaluate(&self, i: usize, cols: std::ops::Range<usize>, beta: &[f64]) -> f64 {
        self.row(i)[cols].iter().zip(beta).map(|(x, b)| x * b).sum()
    }
}

/// Fit the model and produce in-sample predictions with intervals.
pub fn fit(
    series: &MetricSeries,
    config: &AnalyzerConfig,
    cancel: &CancelToken,
) -> Result<Forecast, ForecastError> {
    let n = series.len();
    let required = config.min_points.max(2);
    if n < required {
        return Err(ForecastError::InsufficientData { points: n, required });
    }

    let raw = series.values();
    let scale = raw.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let scale = if scale > 0.0 { scale } else { 1.0 };
    let y: Vec<f64> = raw.iter().map(|v| v / scale).collect();

    let design = Design::build(series, config, cancel)?;
    let trend_range = 0..design.trend_cols;
    let seasonal_range = design.trend_cols..design.width();

    let hinge_ridge = n as f64 * CHANGEPOINT_RIDGE / config.changepoint_prior_scale;
    let mut trend_ridge = vec![0.0, 0.0];
    trend_ridge.resize(design.trend_cols, hinge_ridge);
    let seasonal_ridge = vec![n as f64 * SEASONAL_RIDGE; seasonal_range.len()];

    let (trend, seasonal_beta, yhat) = match config.seasonality_mode {
        SeasonalityMode::Additive => {
            let all = 0..design.width();
            let mut ridge = trend_ridge.clone();
            ridge.extend_from_slice(&seasonal_ridge);
            let beta = design.solve(all, &y, &ridge, cancel)?;
            let (beta_trend, beta_season) = beta.split_at(design.trend_cols);
            let trend: Vec<f64> = (0..n)
                .map(|i| design.evaluate(i, trend_range.clone(), beta_trend))
                .collect();
            let season: Vec<f64> = (0..n)
                .map(|i| design.evaluate(i, seasonal_range.clone(), beta_season))
                .collect();
            let yhat: Vec<f64> = trend.iter().zip(&season).map(|(t, s)| t + s).collect();
            (trend, beta_season.to_vec(), yhat)
        }
        SeasonalityMode::Multiplicative => {
            let beta_trend = design.solve(trend_range.clone(), &y, &trend_ridge, cancel)?;
            let trend: Vec<f64> = (0..n)
                .map(|i| design.evaluate(i, trend_range.clone(), &beta_trend))
                .collect();
            if trend.iter().any(|t| *t <= INTERVAL_TOLERANCE) {
                return Err(ForecastError::NonPositiveTrend);
            }
            let beta_season = if seasonal_range.is_empty() {
                Vec::new()
            } else {
                let relative: Vec<f64> = y.iter().zip(&trend).map(|(v, t)| v / t - 1.0).collect();
                design.solve(seasonal_range.clone(), &relative, &seasonal_ridge, cancel)?
            };
            let yhat: Vec<f64> = (0..n)
                .map(|i| {
                    let s = design.evaluate(i, seasonal_range.clone(), &beta_season);
                    trend[i] * (1.0 + s)
                })
                .collect();
            (trend, beta_season, yhat)
        }
    };
    if cancel.is_cancelled() {
        return Err(ForecastError::DeadlineExceeded);
    }

    let params = design.width();
    let ssr: f64 = y.iter().zip(&yhat).map(|(a, b)| (a - b).powi(2)).sum();
    let dof = n.saturating_sub(params).max(1);
    let sigma = (ssr / dof as f64).sqrt() * scale;

    let (q_lo, q_hi) = interval_offsets(config);

    // Per-component values, unscaled for additive mode.
    let mut seasonal = Vec::with_capacity(design.seasons.len());
    let mut offset = 0;
    for (kind, order) in &design.seasons {
        let cols = 2 * order;
        let start = design.trend_cols + offset;
        let beta = &seasonal_beta[offset..offset + cols];
        let values = (0..n)
            .map(|i| {
                let v = design.evaluate(i, start..start + cols, beta);
                match config.seasonality_mode {
                    SeasonalityMode::Additive => v * scale,
                    SeasonalityMode::Multiplicative => v,
                }
            })
            .collect();
        seasonal.push(SeasonalComponent {
            kind: *kind,
            values,
        });
        offset += cols;
    }

    let yhat: Vec<f64> = yhat.iter().map(|v| v * scale).collect();
    let trend: Vec<f64> = trend.iter().map(|v| v * scale).collect();
    let lower: Vec<f64> = yhat.iter().map(|v| v + sigma * q_lo).collect();
    let upper: Vec<f64> = yhat.iter().map(|v| v + sigma * q_hi).collect();

    let finite = |v: &[f64]| v.iter().all(|x| x.is_finite());
    if !sigma.is_finite() || !finite(&yhat) || !finite(&lower) || !finite(&upper) {
        return Err(ForecastError::NonFinite);
    }

    debug!(
        points = n,
        params,
        seasons = design.seasons.len(),
        sigma,
        "forecast fitted"
    );

    Ok(Forecast {
        yhat,
        lower,
        upper,
        trend,
        seasonal,
        sigma,
    })
}

/// Lower and upper standard-normal offsets for the configured interval width.
fn interval_offsets(config: &AnalyzerConfig) -> (f64, f64) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let samples = config.uncertainty_samples.max(2);
    let mut draws: Vec<f64> = (0..samples).map(|_| standard_normal(&mut rng)).collect();
    draws.sort_by(f64::total_cmp);
    let w = config.interval_width;
    (
        quantile_sorted(&draws, (1.0 - w) / 2.0),
        quantile_sorted(&draws, (1.0 + w) / 2.0),
    )
}

/// Box-Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen_range(0.0..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use ratewise_core::DataPoint;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap()
    }

    /// Hourly samples for `days` days.
    fn hourly(days: i64, f: impl Fn(i64) -> f64) -> MetricSeries {
        let points = (0..days * 24)
            .map(|h| DataPoint::new(start() + Duration::hours(h), f(h)))
            .collect();
        MetricSeries::new(points).unwrap()
    }

    #[test]
    fn constant_series_has_no_anomalies() {
        let series = hourly(7, |_| 100.0);
        let forecast = fit(&series, &AnalyzerConfig::default(), &CancelToken::new()).unwrap();
        assert!(forecast.anomalies(&series).is_empty());
        assert!(forecast.yhat.iter().all(|v| (v - 100.0).abs() < 1e-6));
    }

    #[test]
    fn single_spike_is_high_severity() {
        let series = hourly(14, |h| if h == 80 { 1000.0 } else { 100.0 });
        let forecast = fit(&series, &AnalyzerConfig::default(), &CancelToken::new()).unwrap();
        let anomalies = forecast.anomalies(&series);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::High);
        assert_eq!(anomalies[0].actual, 1000.0);
    }

    #[test]
    fn daily_pattern_is_captured() {
        let series = hourly(14, |h| {
            let hour = (h % 24) as f64;
            200.0 + 100.0 * (2.0 * PI * hour / 24.0).sin()
        });
        let forecast = fit(&series, &AnalyzerConfig::default(), &CancelToken::new()).unwrap();
        let daily = forecast
            .seasonal
            .iter()
            .find(|c| c.kind == SeasonKind::Daily)
            .unwrap();
        let max = daily.values.iter().cloned().fold(f64::MIN, f64::max);
        assert!((max - 100.0).abs() < 5.0, "daily amplitude {max}");
        assert!(forecast.anomalies(&series).is_empty());
    }

    #[test]
    fn short_history_skips_weekly_component() {
        let series = hourly(2, |h| 50.0 + (h % 24) as f64);
        let forecast = fit(&series, &AnalyzerConfig::default(), &CancelToken::new()).unwrap();
        let kinds: Vec<SeasonKind> = forecast.seasonal.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![SeasonKind::Daily]);
    }

    #[test]
    fn multiplicative_mode_fits() {
        let config = AnalyzerConfig {
            seasonality_mode: SeasonalityMode::Multiplicative,
            ..AnalyzerConfig::default()
        };
        let series = hourly(7, |h| {
            let hour = (h % 24) as f64;
            100.0 * (1.0 + 0.5 * (2.0 * PI * hour / 24.0).cos())
        });
        let forecast = fit(&series, &config, &CancelToken::new()).unwrap();
        let worst = series
            .values()
            .iter()
            .zip(&forecast.yhat)
            .map(|(y, f)| (y - f).abs())
            .fold(0.0, f64::max);
        assert!(worst < 5.0, "worst residual {worst}");
    }

    #[test]
    fn multiplicative_mode_rejects_zero_trend() {
        let config = AnalyzerConfig {
            seasonality_mode: SeasonalityMode::Multiplicative,
            ..AnalyzerConfig::default()
        };
        let series = hourly(3, |_| 0.0);
        assert_eq!(
            fit(&series, &config, &CancelToken::new()).unwrap_err(),
            ForecastError::NonPositiveTrend
        );
    }

    #[test]
    fn cancelled_token_aborts_fit() {
        let series = hourly(7, |_| 100.0);
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(
            fit(&series, &AnalyzerConfig::default(), &token).unwrap_err(),
            ForecastError::DeadlineExceeded
        );
    }

    #[test]
    fn too_few_points_is_insufficient() {
        let series = hourly(1, |_| 1.0);
        let short = MetricSeries::new(series.points()[..5].to_vec()).unwrap();
        assert!(matches!(
            fit(&short, &AnalyzerConfig::default(), &CancelToken::new()),
            Err(ForecastError::InsufficientData { points: 5, required: 10 })
        ));
    }

    #[test]
    fn intervals_are_reproducible() {
        let series = hourly(7, |h| 100.0 + ((h * 37) % 11) as f64);
        let a = fit(&series, &AnalyzerConfig::default(), &CancelToken::new()).unwrap();
        let b = fit(&series, &AnalyzerConfig::default(), &CancelToken::new()).unwrap();
        assert_eq!(a, b);
        assert!(a.lower.iter().zip(&a.upper).all(|(l, u)| l < u));
    }
}
