//! ratewise-primetime — recurring daily peak windows.
//!
//! ```text
//! samples ─► hourly means (24 buckets, UTC) ─► percentile threshold
//!         ─► contiguous candidate hours ─► min duration
//!         ─► cross-day consistency ─► anomaly-free average peak
//!         ─► sort by aggregate traffic, cap at max_windows
//! ```
//!
//! Flat traffic, where no hour stands out, yields a single window on the
//! busiest hour.

pub mod detector;
pub mod report;

pub use detector::PrimeTimeDetector;
pub use report::format_windows;
