//! Per-pair composition of the four components.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ratewise_analyzer::{CancelToken, TrafficAnalyzer};
use ratewise_cache::{CacheProfileCollector, CacheTrendReport, DEFAULT_PERIOD_HOURS};
use ratewise_calculator::{CalculationInput, RateLimitCalculator};
use ratewise_core::error::ConfigResult;
use ratewise_core::{
    Anomaly, CacheOutcomeCounts, CacheProfile, MetricSeries, PairKey, PrimeTimeWindow,
    RateLimitDecision, RatewiseConfig, TrafficAnalysis,
};
use ratewise_primetime::PrimeTimeDetector;

use crate::provider::CacheCountsProvider;

/// Everything produced for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairEvaluation {
    pub analysis: TrafficAnalysis,
    pub windows: Vec<PrimeTimeWindow>,
    pub cache: CacheProfile,
    pub decision: RateLimitDecision,
}

/// Validated configuration plus the components built from it.
///
/// Holds no mutable state; one instance serves any number of concurrent pairs.
#[derive(Debug)]
pub struct Pipeline {
    config: Arc<RatewiseConfig>,
    analyzer: TrafficAnalyzer,
    detector: PrimeTimeDetector,
    collector: CacheProfileCollector,
    calculator: RateLimitCalculator,
}

impl Pipeline {
    /// Validate `config` and build the components. Invalid configuration is
    /// the only error that stops a run before any pair is evaluated.
    pub fn new(config: RatewiseConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            analyzer: TrafficAnalyzer::new(&config),
            detector: PrimeTimeDetector::new(&config),
            collector: CacheProfileCollector::new(&config),
            calculator: RateLimitCalculator::new(&config),
            config: Arc::new(config),
        })
    }

    /// The validated configuration every stage was built from.
    pub fn config(&self) -> &RatewiseConfig {
        &self.config
    }

    /// Target lookback window for series fetches and confidence coverage.
    pub fn lookback(&self) -> Duration {
        Duration::days(i64::from(self.config.pipeline.lookback_days))
    }

    /// Reason the pair is skipped, if it is.
    pub fn exclusion_reason(&self, pair: &PairKey) -> Option<String> {
        let p = &self.config.pipeline;
        if p.excluded_tenants.iter().any(|t| *t == pair.tenant) {
            return Some(format!("tenant {} is excluded", pair.tenant));
        }
        if p.excluded_endpoints.iter().any(|e| *e == pair.endpoint) {
            return Some(format!("endpoint {} is excluded", pair.endpoint));
        }
        None
    }

    /// Run the whole pipeline on the current thread.
    pub fn evaluate(
        &self,
        pair: &PairKey,
        series: &MetricSeries,
        counts: Option<&CacheOutcomeCounts>,
    ) -> PairEvaluation {
        let analysis = self.analyzer.analyze(series);
        self.finish(pair, series, analysis, counts)
    }

    /// Like [`evaluate`](Self::evaluate), with the forecast on a blocking
    /// thread under its deadline. Cancelling `parent` degrades the forecast.
    pub async fn evaluate_async(
        &self,
        pair: &PairKey,
        series: Arc<MetricSeries>,
        counts: Option<&CacheOutcomeCounts>,
        parent: Option<&CancelToken>,
    ) -> PairEvaluation {
        let analysis = self
            .analyzer
            .analyze_with_deadline(Arc::clone(&series), parent)
            .await;
        self.finish(pair, &series, analysis, counts)
    }

    fn finish(
        &self,
        pair: &PairKey,
        series: &MetricSeries,
        analysis: TrafficAnalysis,
        counts: Option<&CacheOutcomeCounts>,
    ) -> PairEvaluation {
        let excluded: Vec<Anomaly> = analysis
            .anomalies
            .iter()
            .filter(|a| self.config.anomaly.excludes(a.severity))
            .cloned()
            .collect();
        let windows = self.detector.detect(series, &excluded);
        let clean = self.analyzer.clean_series(series, &analysis);
        let cache = self.collector.profile(counts);

        let decision = self.calculator.calculate(&CalculationInput {
            pair,
            clean: &clean,
            windows: &windows,
            analysis: &analysis,
            cache: Some(&cache),
            target_lookback: self.lookback(),
        });

        if decision.insufficient_data {
            warn!(
                tenant = %pair.tenant,
                endpoint = %pair.endpoint,
                points = series.len(),
                "insufficient data, falling back to minimum limit"
            );
        } else {
            debug!(
                tenant = %pair.tenant,
                endpoint = %pair.endpoint,
                method = analysis.method.label(),
                anomalies = analysis.anomalies.len(),
                windows = windows.len(),
                "pair evaluated"
            );
        }
        info!(
            tenant = %pair.tenant,
            endpoint = %pair.endpoint,
            limit = decision.recommended_limit,
            confidence = decision.confidence,
            "rate limit decided"
        );

        PairEvaluation {
            analysis,
            windows,
            cache,
            decision,
        }
    }

    /// Cache profiles over the standard periods, limited to the lookback.
    ///
    /// A period whose counts cannot be read is treated as having no data.
    pub fn cache_trend_report(
        &self,
        pair: &PairKey,
        provider: &dyn CacheCountsProvider,
    ) -> CacheTrendReport {
        let periods: Vec<(u32, Option<CacheOutcomeCounts>)> = DEFAULT_PERIOD_HOURS
            .iter()
            .map(|&hours| {
                let counts = provider
                    .counts(pair, Duration::hours(i64::from(hours)))
                    .unwrap_or_else(|err| {
                        warn!(tenant = %pair.tenant, endpoint = %pair.endpoint, hours, error = %err, "cache counts unavailable");
                        None
                    });
                (hours, counts)
            })
            .collect();
        let lookback_hours = self.config.pipeline.lookback_days.saturating_mul(24);
        self.collector
            .trend_report(pair.clone(), &periods, lookback_hours)
    }
}
