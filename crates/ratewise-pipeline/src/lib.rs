//! ratewise-pipeline — per-pair decision runs and bounded batches.
//!
//! # Per pair
//!
//! ```text
//! SeriesProvider ──► MetricSeries ──► TrafficAnalyzer ──► TrafficAnalysis
//!                         │                                 │ anomalies
//!                         ├──────────► PrimeTimeDetector ◄──┤
//!                         │                 │ windows       │ clean series
//! CacheCountsProvider ──► CacheProfileCollector ──► RateLimitCalculator ──► RateLimitDecision
//! ```
//!
//! # Batch
//!
//! Pairs run on a worker pool bounded by `pipeline.max_workers`. Each
//! forecast has its own deadline; an optional batch deadline cancels
//! outstanding work and returns the decisions already made. Configuration
//! is validated once, before any pair runs; every other failure stays with
//! its pair.

pub mod pipeline;
pub mod provider;
pub mod report;
pub mod runner;

pub use pipeline::{PairEvaluation, Pipeline};
pub use provider::{CacheCountsProvider, MemorySnapshot, NoCacheData, SeriesProvider};
pub use report::{BatchReport, BatchSummary, format_batch_report};
pub use runner::{BatchRunner, FailureKind, PairOutcome, PairReport};
