//! ratewise-analyzer — turns a traffic series into trend, seasonality, and anomalies.
//!
//! # Dispatch
//!
//! ```text
//! MetricSeries
//!     │
//!     ├─ forecast disabled / < min_points ──────────────┐
//!     │                                                 │
//!     ▼                                                 ▼
//! forecast::fit (spawn_blocking, deadline, CancelToken)  statistical
//!     │  ok                      │ error / timeout       (IQR + z-score,
//!     ▼                          └──────────────────────► linear trend)
//! interval anomalies + trend + seasonal summaries         │
//!     │                                                 │
//!     └──────────────► TrafficAnalysis { method, .. } ◄─┘
//! ```
//!
//! Every non-empty input yields a `TrafficAnalysis`; forecast failures are
//! recorded as `fallback_reason` and never surface as errors.

pub mod analyzer;
pub mod cancel;
pub mod forecast;
mod linalg;
pub mod statistical;

pub use analyzer::TrafficAnalyzer;
pub use cancel::CancelToken;
pub use forecast::{Forecast, ForecastError};
