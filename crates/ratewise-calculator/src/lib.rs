//! ratewise-calculator — the rate limit decision function.
//!
//! # Formula (v3)
//!
//! ```text
//! effective_peak = mean(window.average_peak)        // or mean(clean series)
//! rate  = effective_peak × peak_multiplier
//! rate ×= pattern multiplier   (stable / variable / moderately_spiky / spiky)
//! rate ×= 1 + hit_ratio × cache_adjustment_factor   // or default_cache_multiplier
//! rate ×= 1 ± trend pct                             // increasing / decreasing
//! rate ×= tenant multiplier × endpoint multiplier   // when configured
//! rate ×= safety_margin
//! limit = round_up(clamp(rate, min, max)), re-clamped
//! ```
//!
//! Every step is recorded as a `MultiplierStep` and in the rationale, so a
//! decision can be audited without re-running the pipeline. No data at all
//! yields `min_rate_limit` with zero confidence.

pub mod calculator;
pub mod confidence;
pub mod pattern;
pub mod rationale;

pub use calculator::{CalculationInput, RateLimitCalculator};
