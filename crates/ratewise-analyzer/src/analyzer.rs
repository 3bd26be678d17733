//! Traffic pattern analysis with forecast-or-fallback dispatch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use ratewise_core::config::{AnalyzerConfig, AnomalyConfig};
use ratewise_core::stats::{self, linear_fit};
use ratewise_core::{
    AnalysisMethod, MetricSeries, RatewiseConfig, SeasonalSummary, TrafficAnalysis, TrendDirection,
    TrendSummary,
};

use crate::cancel::CancelToken;
use crate::forecast::{self, Forecast, ForecastError};
use crate::statistical;

/// Produces a [`TrafficAnalysis`] for any series.
///
/// Cheap to clone; the async entry point moves a clone onto a blocking thread.
#[derive(Debug, Clone)]
pub struct TrafficAnalyzer {
    analyzer: AnalyzerConfig,
    anomaly: AnomalyConfig,
}

impl TrafficAnalyzer {
    pub fn new(config: &RatewiseConfig) -> Self {
        Self {
            analyzer: config.analyzer.clone(),
            anomaly: config.anomaly.clone(),
        }
    }

    pub fn forecast_timeout(&self) -> Duration {
        Duration::from_millis(self.analyzer.forecast_timeout_ms)
    }

    /// Analyse on the current thread.
    ///
    /// The forecast fit polls its deadline cooperatively, so this returns
    /// shortly after `forecast_timeout_ms` at the latest.
    pub fn analyze(&self, series: &MetricSeries) -> TrafficAnalysis {
        let token = CancelToken::new().with_deadline(Instant::now() + self.forecast_timeout());
        self.analyze_with_token(series, &token)
    }

    /// Analyse with an externally controlled cancellation token.
    pub fn analyze_with_token(&self, series: &MetricSeries, token: &CancelToken) -> TrafficAnalysis {
        match self.try_forecast(series, token) {
            Ok((forecast, analysis)) => {
                debug!(
                    points = series.len(),
                    anomalies = analysis.anomalies.len(),
                    sigma = forecast.sigma,
                    "forecast analysis complete"
                );
                analysis
            }
            Err(err) => self.fallback(series, err),
        }
    }

    /// Analyse on a blocking thread under a hard deadline.
    ///
    /// On expiry the fit is cancelled and the statistical path runs instead,
    /// so the caller is never blocked past the forecast timeout. Cancelling
    /// `parent` (e.g. at a batch deadline) has the same effect.
    pub async fn analyze_with_deadline(
        &self,
        series: Arc<MetricSeries>,
        parent: Option<&CancelToken>,
    ) -> TrafficAnalysis {
        let timeout = self.forecast_timeout();
        let token = parent
            .map(CancelToken::child)
            .unwrap_or_default()
            .with_deadline(Instant::now() + timeout);

        let worker = {
            let this = self.clone();
            let series = Arc::clone(&series);
            let token = token.clone();
            tokio::task::spawn_blocking(move || this.analyze_with_token(&series, &token))
        };

        match tokio::time::timeout(timeout, worker).await {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "forecast worker failed");
                self.statistical(&series, Some(format!("forecast worker failed: {join_err}")))
            }
            Err(_) => {
                token.cancel();
                self.fallback(&series, ForecastError::DeadlineExceeded)
            }
        }
    }

    fn try_forecast(
        &self,
        series: &MetricSeries,
        token: &CancelToken,
    ) -> Result<(Forecast, TrafficAnalysis), ForecastError> {
        if !self.analyzer.forecast_enabled {
            return Err(ForecastError::Disabled);
        }
        let forecast = forecast::fit(series, &self.analyzer, token)?;
        let anomalies = forecast.anomalies(series);

        let fit = linear_fit(&forecast.trend);
        let trend = TrendSummary {
            direction: TrendDirection::from_slope(
                fit.slope,
                self.analyzer.trend_stability_epsilon,
            ),
            slope: fit.slope,
            mean: stats::mean(&forecast.trend),
            std: stats::population_std(&forecast.trend),
            start_value: forecast.trend.first().copied().unwrap_or(0.0),
            end_value: forecast.trend.last().copied().unwrap_or(0.0),
        };

        let seasonality = forecast
            .seasonal
            .iter()
            .map(|c| SeasonalSummary {
                kind: c.kind,
                mean: stats::mean(&c.values),
                std: stats::population_std(&c.values),
                min: stats::min(&c.values).unwrap_or(0.0),
                max: stats::max(&c.values).unwrap_or(0.0),
            })
            .collect();

        let analysis = TrafficAnalysis {
            method: AnalysisMethod::Forecast,
            fallback_reason: None,
            points_analyzed: series.len(),
            trend,
            seasonality,
            anomalies,
        };
        Ok((forecast, analysis))
    }

    fn fallback(&self, series: &MetricSeries, err: ForecastError) -> TrafficAnalysis {
        match err {
            ForecastError::Disabled | ForecastError::InsufficientData { .. } => {
                debug!(reason = %err, "using statistical analysis")
            }
            _ => warn!(reason = %err, points = series.len(), "forecast degraded to statistical analysis"),
        }
        self.statistical(series, Some(err.to_string()))
    }

    /// IQR / z-score outliers and a plain linear trend on raw values.
    pub fn statistical(&self, series: &MetricSeries, reason: Option<String>) -> TrafficAnalysis {
        let values = series.values();
        let anomalies = statistical::detect_outliers(
            series,
            self.anomaly.iqr_multiplier,
            self.anomaly.zscore_threshold,
        );

        let trend = if values.is_empty() {
            TrendSummary::flat()
        } else {
            let fit = linear_fit(&values);
            TrendSummary {
                direction: TrendDirection::from_slope(
                    fit.slope,
                    self.analyzer.trend_stability_epsilon,
                ),
                slope: fit.slope,
                mean: stats::mean(&values),
                std: stats::sample_std(&values),
                start_value: fit.intercept,
                end_value: fit.intercept + fit.slope * (values.len() - 1) as f64,
            }
        };

        TrafficAnalysis {
            method: AnalysisMethod::Statistical,
            fallback_reason: reason,
            points_analyzed: values.len(),
            trend,
            seasonality: Vec::new(),
            anomalies,
        }
    }

    /// Copy of `series` without anomalies whose severity is excluded.
    pub fn clean_series(&self, series: &MetricSeries, analysis: &TrafficAnalysis) -> MetricSeries {
        let excluded: HashSet<_> = analysis
            .anomalies
            .iter()
            .filter(|a| self.anomaly.excludes(a.severity))
            .map(|a| a.timestamp)
            .collect();
        if excluded.is_empty() {
            return series.clone();
        }
        series.filter(|p| !excluded.contains(&p.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use ratewise_core::{DataPoint, Severity};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap()
    }

    fn per_minute(count: i64, f: impl Fn(i64) -> f64) -> MetricSeries {
        MetricSeries::new(
            (0..count)
                .map(|m| DataPoint::new(start() + ChronoDuration::minutes(m), f(m)))
                .collect(),
        )
        .unwrap()
    }

    fn analyzer() -> TrafficAnalyzer {
        TrafficAnalyzer::new(&RatewiseConfig::default())
    }

    #[test]
    fn short_series_uses_statistical_path() {
        let analysis = analyzer().analyze(&per_minute(5, |_| 10.0));
        assert_eq!(analysis.method, AnalysisMethod::Statistical);
        assert!(analysis.fallback_reason.unwrap().contains("insufficient data"));
        assert_eq!(analysis.points_analyzed, 5);
    }

    #[test]
    fn empty_series_is_stable_and_quiet() {
        let analysis = analyzer().analyze(&MetricSeries::empty());
        assert_eq!(analysis.method, AnalysisMethod::Statistical);
        assert_eq!(analysis.trend.direction, TrendDirection::Stable);
        assert!(analysis.anomalies.is_empty());
    }

    #[test]
    fn disabled_forecast_records_reason() {
        let mut config = RatewiseConfig::default();
        config.analyzer.forecast_enabled = false;
        let analysis = TrafficAnalyzer::new(&config).analyze(&per_minute(100, |_| 10.0));
        assert_eq!(analysis.method, AnalysisMethod::Statistical);
        assert_eq!(
            analysis.fallback_reason.as_deref(),
            Some("forecasting disabled by configuration")
        );
    }

    #[test]
    fn forecast_path_tags_method_and_trend() {
        let analysis = analyzer().analyze(&per_minute(2 * 1440, |m| 100.0 + m as f64 * 0.5));
        assert_eq!(analysis.method, AnalysisMethod::Forecast);
        assert_eq!(analysis.trend.direction, TrendDirection::Increasing);
        assert!((analysis.trend.slope - 0.5).abs() < 0.01);
        assert!(analysis.fallback_reason.is_none());
    }

    #[test]
    fn statistical_trend_detects_decrease() {
        let analysis = analyzer().statistical(&per_minute(50, |m| 500.0 - m as f64), None);
        assert_eq!(analysis.trend.direction, TrendDirection::Decreasing);
        assert!((analysis.trend.start_value - 500.0).abs() < 1e-9);
    }

    #[test]
    fn clean_series_drops_excluded_anomalies() {
        let series = per_minute(1440, |m| if m == 700 { 1000.0 } else { 100.0 });
        let a = analyzer();
        let analysis = a.analyze(&series);
        assert_eq!(analysis.count_with_severity(Severity::High), 1);
        let clean = a.clean_series(&series, &analysis);
        assert_eq!(clean.len(), series.len() - analysis.anomalies.len());
        assert!(clean.values().iter().all(|v| *v < 1000.0));
    }

    #[test]
    fn clean_series_respects_severity_filter() {
        let mut config = RatewiseConfig::default();
        config.anomaly.exclude_severities = vec![Severity::Low];
        let a = TrafficAnalyzer::new(&config);
        let series = per_minute(1440, |m| if m == 700 { 1000.0 } else { 100.0 });
        let analysis = a.analyze(&series);
        let clean = a.clean_series(&series, &analysis);
        assert!(clean.values().contains(&1000.0));
    }

    #[tokio::test]
    async fn deadline_expiry_degrades_to_statistical() {
        let mut config = RatewiseConfig::default();
        config.analyzer.forecast_timeout_ms = 1;
        let a = TrafficAnalyzer::new(&config);
        let parent = CancelToken::new();
        parent.cancel();
        let series = Arc::new(per_minute(7 * 1440, |_| 100.0));
        let analysis = a.analyze_with_deadline(series, Some(&parent)).await;
        assert_eq!(analysis.method, AnalysisMethod::Statistical);
        assert_eq!(
            analysis.fallback_reason.as_deref(),
            Some("forecast deadline exceeded")
        );
    }

    #[tokio::test]
    async fn async_analysis_matches_blocking() {
        let a = analyzer();
        let series = per_minute(1440, |m| 100.0 + (m % 60) as f64);
        let blocking = a.analyze(&series);
        let spawned = a.analyze_with_deadline(Arc::new(series), None).await;
        assert_eq!(blocking, spawned);
    }
}
