//! ratewise-core — shared vocabulary for the rate-limit decision pipeline.
//!
//! Holds the data model (series, anomalies, analyses, prime-time windows,
//! cache profiles, decisions), the fully-resolved configuration value passed
//! into every component, the error taxonomy, and the small statistics
//! helpers the components share.

pub mod config;
pub mod error;
pub mod series;
pub mod stats;
pub mod types;

pub use config::RatewiseConfig;
pub use error::{ConfigError, SeriesError, SourceError};
pub use series::{DataPoint, MetricSeries};
pub use types::*;
