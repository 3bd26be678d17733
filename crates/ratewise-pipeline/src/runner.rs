//! Bounded batch execution over many (tenant, endpoint) pairs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use ratewise_analyzer::CancelToken;
use ratewise_core::PairKey;

use crate::pipeline::{PairEvaluation, Pipeline};
use crate::provider::{CacheCountsProvider, SeriesProvider};
use crate::report::{BatchReport, BatchSummary};

/// Why a pair has no decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SourceUnavailable,
    BatchDeadlineExceeded,
    WorkerPanicked,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SourceUnavailable => "source unavailable",
            Self::BatchDeadlineExceeded => "batch deadline exceeded",
            Self::WorkerPanicked => "worker panicked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    Decided(Box<PairEvaluation>),
    Failed { kind: FailureKind, message: String },
    Excluded { reason: String },
}

impl PairOutcome {
    pub fn evaluation(&self) -> Option<&PairEvaluation> {
        match self {
            Self::Decided(eval) => Some(eval),
            _ => None,
        }
    }

    fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }
}

/// One entry per requested pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReport {
    #[serde(flatten)]
    pub pair: PairKey,
    #[serde(flatten)]
    pub outcome: PairOutcome,
}

/// Runs a [`Pipeline`] over many pairs on a bounded worker pool.
#[derive(Clone)]
pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    series: Arc<dyn SeriesProvider>,
    cache: Arc<dyn CacheCountsProvider>,
}

impl BatchRunner {
    pub fn new(
        pipeline: Arc<Pipeline>,
        series: Arc<dyn SeriesProvider>,
        cache: Arc<dyn CacheCountsProvider>,
    ) -> Self {
        Self {
            pipeline,
            series,
            cache,
        }
    }

    /// The pipeline each pair is evaluated with.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Evaluate every pair and return one report entry per pair, in request order.
    ///
    /// At most `pipeline.max_workers` pairs are in flight. When
    /// `pipeline.batch_timeout_secs` elapses, outstanding work is cancelled and
    /// the report is marked partial; decisions made so far are kept.
    pub async fn run(&self, pairs: Vec<PairKey>) -> BatchReport {
        let started = Instant::now();
        let settings = &self.pipeline.config().pipeline;
        let deadline = settings
            .batch_timeout_secs
            .map(|secs| started + Duration::from_secs(secs));

        info!(
            pairs = pairs.len(),
            workers = settings.max_workers,
            batch_timeout_secs = ?settings.batch_timeout_secs,
            "starting batch"
        );

        let root = CancelToken::new();
        let permits = Arc::new(Semaphore::new(settings.max_workers.max(1)));
        let mut slots: Vec<Option<PairOutcome>> = (0..pairs.len()).map(|_| None).collect();
        let mut task_index = HashMap::new();
        let mut tasks = JoinSet::new();

        for (index, pair) in pairs.iter().enumerate() {
            if let Some(reason) = self.pipeline.exclusion_reason(pair) {
                debug!(tenant = %pair.tenant, endpoint = %pair.endpoint, %reason, "pair excluded");
                slots[index] = Some(PairOutcome::Excluded { reason });
                continue;
            }

            let span = info_span!("pair", tenant = %pair.tenant, endpoint = %pair.endpoint);
            let job = PairJob {
                runner: self.clone(),
                pair: pair.clone(),
                permits: Arc::clone(&permits),
                token: root.clone(),
            };
            let handle = tasks.spawn(async move { (index, job.run().await) }.instrument(span));
            task_index.insert(handle.id(), index);
        }

        let mut partial = false;
        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next_with_id()).await {
                    Ok(next) => next,
                    Err(_) => {
                        partial = true;
                        break;
                    }
                },
                None => tasks.join_next_with_id().await,
            };
            let Some(result) = next else { break };
            record(&mut slots, &task_index, result);
        }

        if partial {
            warn!(
                outstanding = tasks.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "batch deadline exceeded, returning partial results"
            );
            root.cancel();
            permits.close();
            tasks.abort_all();
            while let Some(result) = tasks.join_next_with_id().await {
                record(&mut slots, &task_index, result);
            }
        }

        let reports: Vec<PairReport> = pairs
            .into_iter()
            .zip(slots)
            .map(|(pair, outcome)| PairReport {
                pair,
                outcome: outcome.unwrap_or_else(|| {
                    PairOutcome::failed(
                        FailureKind::BatchDeadlineExceeded,
                        "batch deadline exceeded before the pair finished",
                    )
                }),
            })
            .collect();

        let summary = BatchSummary::from_reports(&reports, partial, started.elapsed());
        info!(
            total = summary.total,
            decided = summary.decided,
            failed = summary.failed,
            excluded = summary.excluded,
            partial,
            "batch complete"
        );
        BatchReport {
            pairs: reports,
            summary,
        }
    }
}

/// Store a finished task's outcome in its request slot.
fn record(
    slots: &mut [Option<PairOutcome>],
    task_index: &HashMap<tokio::task::Id, usize>,
    result: Result<(tokio::task::Id, (usize, PairOutcome)), JoinError>,
) {
    match result {
        Ok((_, (index, outcome))) => slots[index] = Some(outcome),
        Err(err) => {
            let Some(&index) = task_index.get(&err.id()) else {
                return;
            };
            let outcome = if err.is_panic() {
                warn!(error = %err, "pair worker panicked");
                PairOutcome::failed(FailureKind::WorkerPanicked, err.to_string())
            } else {
                PairOutcome::failed(
                    FailureKind::BatchDeadlineExceeded,
                    "cancelled at batch deadline",
                )
            };
            slots[index] = Some(outcome);
        }
    }
}

struct PairJob {
    runner: BatchRunner,
    pair: PairKey,
    permits: Arc<Semaphore>,
    token: CancelToken,
}

impl PairJob {
    async fn run(self) -> PairOutcome {
        let Ok(_permit) = self.permits.acquire_owned().await else {
            return PairOutcome::failed(
                FailureKind::BatchDeadlineExceeded,
                "batch closed before the pair started",
            );
        };
        let pipeline = &self.runner.pipeline;
        let lookback = pipeline.lookback();

        let series = match self.runner.series.series(&self.pair, lookback) {
            Ok(series) => series,
            Err(err) => {
                warn!(error = %err, "series unavailable");
                return PairOutcome::failed(FailureKind::SourceUnavailable, err.to_string());
            }
        };
        let counts = self
            .runner
            .cache
            .counts(&self.pair, lookback)
            .unwrap_or_else(|err| {
                warn!(error = %err, "cache counts unavailable, using default profile");
                None
            });

        let eval = pipeline
            .evaluate_async(&self.pair, Arc::new(series), counts.as_ref(), Some(&self.token))
            .await;
        PairOutcome::Decided(Box::new(eval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_serializes_with_status_tag() {
        let report = PairReport {
            pair: PairKey::new("acme", "/api"),
            outcome: PairOutcome::failed(FailureKind::SourceUnavailable, "down"),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tenant"], "acme");
        assert_eq!(json["endpoint"], "/api");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "source_unavailable");
        assert_eq!(json["message"], "down");
    }

    #[test]
    fn excluded_has_no_evaluation() {
        let outcome = PairOutcome::Excluded {
            reason: "tenant x is excluded".into(),
        };
        assert!(outcome.evaluation().is_none());
    }
}
