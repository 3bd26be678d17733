//! ratewise-cache — cache outcome counts to ratios and an efficiency score.
//!
//! The profile feeds the rate calculator's cache adjustment. The multi-period
//! trend view and its report are for people only and never reach the
//! calculator.
//!
//! ```text
//! efficiency = clamp(hit − bypass × bypass_penalty − (expired + stale) × ttl_penalty, 0, 1)
//! ```

pub mod collector;
pub mod report;
pub mod trend;

pub use collector::CacheProfileCollector;
pub use report::render_cache_report;
pub use trend::{CacheTrend, CacheTrendReport, DEFAULT_PERIOD_HOURS, PeriodProfile};
