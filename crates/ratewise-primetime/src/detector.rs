//! Prime time window detection.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use tracing::debug;

use ratewise_core::config::PrimeTimeConfig;
use ratewise_core::stats::{self, quantile};
use ratewise_core::{Anomaly, MetricSeries, PrimeTimeWindow, RatewiseConfig};

const HOURS: usize = 24;

/// Hourly means for one set of samples; `None` where an hour has no data.
type HourlyMeans = [Option<f64>; HOURS];

/// Finds the recurring hours of day where a pair's traffic peaks.
#[derive(Debug, Clone)]
pub struct PrimeTimeDetector {
    config: PrimeTimeConfig,
}

/// A run of contiguous candidate hours, inclusive, possibly wrapping midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HourRun {
    start: u8,
    end: u8,
}

impl HourRun {
    fn hours(&self) -> Vec<u8> {
        let mut hours = vec![self.start];
        let mut h = self.start;
        while h != self.end {
            h = (h + 1) % HOURS as u8;
            hours.push(h);
        }
        hours
    }
}

impl PrimeTimeDetector {
    pub fn new(config: &RatewiseConfig) -> Self {
        Self {
            config: config.prime_time.clone(),
        }
    }

    /// Detect windows in `series`, ignoring every sample in `anomalies`.
    ///
    /// Anomalous samples take no part in the hourly aggregates, the cut-off,
    /// the per-day consistency or the window averages. Windows are ordered by
    /// aggregate traffic, highest first.
    pub fn detect(&self, series: &MetricSeries, anomalies: &[Anomaly]) -> Vec<PrimeTimeWindow> {
        let excluded: HashSet<DateTime<Utc>> = anomalies.iter().map(|a| a.timestamp).collect();
        let usable = series.filter(|p| {
            p.value >= self.config.min_traffic_threshold && !excluded.contains(&p.timestamp)
        });
        if usable.is_empty() {
            return Vec::new();
        }

        let hourly = hourly_means(usable.points().iter().map(|p| (p.timestamp, p.value)));
        let present: Vec<f64> = hourly.iter().flatten().copied().collect();
        let (Some(lo), Some(hi)) = (stats::min(&present), stats::max(&present)) else {
            return Vec::new();
        };

        let days = daily_hourly_means(&usable);

        if hi - lo <= tolerance(hi) {
            let busiest = busiest_hour(&hourly);
            debug!(hour = busiest, "flat traffic, using busiest hour");
            let run = HourRun {
                start: busiest,
                end: busiest,
            };
            return self
                .build_window(run, &hourly, hi, &days, &usable)
                .into_iter()
                .collect();
        }

        let Some(cutoff) = Cutoff::over(&present, self.config.percentile) else {
            return Vec::new();
        };
        let threshold = cutoff.threshold;
        let candidates = candidate_hours(&hourly, &cutoff);
        let runs = self.contiguous_runs(&candidates);

        let mut windows: Vec<PrimeTimeWindow> = runs
            .into_iter()
            .filter(|run| {
                run.hours().len() as u32 * 60 >= self.config.min_duration_minutes
            })
            .filter_map(|run| self.build_window(run, &hourly, threshold, &days, &usable))
            .filter(|w| {
                let keep = w.consistency_score >= self.config.min_consistency;
                if !keep {
                    debug!(
                        window = %w.label(),
                        consistency = w.consistency_score,
                        "discarding inconsistent window"
                    );
                }
                keep
            })
            .collect();

        windows.sort_by(|a, b| {
            b.aggregate_traffic
                .total_cmp(&a.aggregate_traffic)
                .then(a.start_hour.cmp(&b.start_hour))
        });
        windows.truncate(self.config.max_windows);
        windows
    }

    fn contiguous_runs(&self, candidates: &[bool; HOURS]) -> Vec<HourRun> {
        let mut runs = Vec::new();
        let mut start: Option<u8> = None;
        for hour in 0..HOURS {
            match (candidates[hour], start) {
                (true, None) => start = Some(hour as u8),
                (false, Some(s)) => {
                    runs.push(HourRun {
                        start: s,
                        end: hour as u8 - 1,
                    });
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            runs.push(HourRun {
                start: s,
                end: HOURS as u8 - 1,
            });
        }

        if self.config.merge_across_midnight && runs.len() > 1 {
            let first = runs[0];
            let last = runs[runs.len() - 1];
            if first.start == 0 && last.end == HOURS as u8 - 1 {
                runs.remove(0);
                let merged = runs.len() - 1;
                runs[merged] = HourRun {
                    start: last.start,
                    end: first.end,
                };
            }
        }
        runs
    }

    fn build_window(
        &self,
        run: HourRun,
        hourly: &HourlyMeans,
        threshold: f64,
        days: &BTreeMap<NaiveDate, HourlyMeans>,
        usable: &MetricSeries,
    ) -> Option<PrimeTimeWindow> {
        let hours = run.hours();
        let in_window = |ts: &DateTime<Utc>| hours.contains(&(ts.hour() as u8));

        let peaks: Vec<f64> = usable
            .points()
            .iter()
            .filter(|p| in_window(&p.timestamp))
            .map(|p| p.value)
            .collect();
        if peaks.is_empty() {
            debug!(start = run.start, end = run.end, "window has no clean samples");
            return None;
        }

        let aggregates: Vec<f64> = hours
            .iter()
            .filter_map(|h| hourly[*h as usize])
            .collect();

        Some(PrimeTimeWindow {
            start_hour: run.start,
            end_hour: run.end,
            percentile_threshold: threshold,
            consistency_score: self.consistency(&hours, days),
            average_peak: stats::mean(&peaks),
            aggregate_traffic: stats::mean(&aggregates),
            sample_count: peaks.len(),
        })
    }

    /// Fraction of days with data in `hours` on which those hours were elevated.
    ///
    /// A day is elevated when at least `hour_match_fraction` of the window
    /// hours it observed clear that day's own percentile cut-off.
    fn consistency(&self, hours: &[u8], days: &BTreeMap<NaiveDate, HourlyMeans>) -> f64 {
        let mut days_with_data = 0usize;
        let mut consistent = 0usize;

        for day in days.values() {
            let present: Vec<f64> = day.iter().flatten().copied().collect();
            let Some(cutoff) = Cutoff::over(&present, self.config.percentile) else {
                continue;
            };
            let observed: Vec<f64> = hours.iter().filter_map(|h| day[*h as usize]).collect();
            if observed.is_empty() {
                continue;
            }
            days_with_data += 1;
            let matched = observed.iter().filter(|v| cutoff.admits(**v)).count();
            if matched as f64 / observed.len() as f64 >= self.config.hour_match_fraction {
                consistent += 1;
            }
        }

        if days_with_data == 0 {
            0.0
        } else {
            consistent as f64 / days_with_data as f64
        }
    }
}

fn tolerance(reference: f64) -> f64 {
    1e-9 * reference.abs().max(1.0)
}

/// Percentile cut-off over one set of hourly means.
///
/// When the percentile lands on the lowest mean, "at or above" would admit
/// every hour, so only hours strictly above it qualify. A set with no spread
/// at all admits every hour.
#[derive(Debug, Clone, Copy)]
struct Cutoff {
    threshold: f64,
    strict: bool,
    flat: bool,
}

impl Cutoff {
    fn over(means: &[f64], percentile: f64) -> Option<Self> {
        let threshold = quantile(means, percentile / 100.0)?;
        let lo = stats::min(means)?;
        let hi = stats::max(means)?;
        Some(Self {
            threshold,
            strict: threshold - lo <= tolerance(threshold),
            flat: hi - lo <= tolerance(hi),
        })
    }

    fn admits(&self, value: f64) -> bool {
        if self.flat {
            true
        } else if self.strict {
            value > self.threshold + tolerance(self.threshold)
        } else {
            value >= self.threshold - tolerance(self.threshold)
        }
    }
}

fn hourly_means(samples: impl Iterator<Item = (DateTime<Utc>, f64)>) -> HourlyMeans {
    let mut sums = [0.0; HOURS];
    let mut counts = [0usize; HOURS];
    for (ts, value) in samples {
        let h = ts.hour() as usize;
        sums[h] += value;
        counts[h] += 1;
    }
    let mut means = [None; HOURS];
    for h in 0..HOURS {
        if counts[h] > 0 {
            means[h] = Some(sums[h] / counts[h] as f64);
        }
    }
    means
}

fn daily_hourly_means(series: &MetricSeries) -> BTreeMap<NaiveDate, HourlyMeans> {
    let mut by_day: BTreeMap<NaiveDate, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
    for p in series.points() {
        by_day
            .entry(p.timestamp.date_naive())
            .or_default()
            .push((p.timestamp, p.value));
    }
    by_day
        .into_iter()
        .map(|(day, samples)| (day, hourly_means(samples.into_iter())))
        .collect()
}

fn candidate_hours(hourly: &HourlyMeans, cutoff: &Cutoff) -> [bool; HOURS] {
    let mut candidates = [false; HOURS];
    for (h, mean) in hourly.iter().enumerate() {
        if let Some(m) = mean {
            candidates[h] = cutoff.admits(*m);
        }
    }
    candidates
}

/// Hour with the highest mean; the earliest wins ties.
fn busiest_hour(hourly: &HourlyMeans) -> u8 {
    let mut best: Option<(usize, f64)> = None;
    for (h, mean) in hourly.iter().enumerate() {
        if let Some(m) = mean {
            if best.is_none_or(|(_, b)| *m > b) {
                best = Some((h, *m));
            }
        }
    }
    best.map(|(h, _)| h as u8).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ratewise_core::{DataPoint, DetectionMethod, Severity};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap()
    }

    /// Per-minute samples for `days` days, valued by (day, hour).
    fn series(days: i64, f: impl Fn(i64, u32) -> f64) -> MetricSeries {
        let points = (0..days * 1440)
            .map(|m| {
                let ts = start() + Duration::minutes(m);
                DataPoint::new(ts, f(m / 1440, ts.hour()))
            })
            .collect();
        MetricSeries::new(points).unwrap()
    }

    fn detector() -> PrimeTimeDetector {
        PrimeTimeDetector::new(&RatewiseConfig::default())
    }

    fn anomaly_at(ts: DateTime<Utc>, value: f64) -> Anomaly {
        Anomaly {
            timestamp: ts,
            actual: value,
            expected: 100.0,
            lower: 90.0,
            upper: 110.0,
            severity: Severity::High,
            method: DetectionMethod::Forecast,
        }
    }

    #[test]
    fn evening_peak_is_detected() {
        let s = series(7, |_, h| if (19..=22).contains(&h) { 500.0 } else { 100.0 });
        let windows = detector().detect(&s, &[]);
        assert_eq!(windows.len(), 1);
        let w = &windows[0];
        assert_eq!((w.start_hour, w.end_hour), (19, 22));
        assert_eq!(w.average_peak, 500.0);
        assert_eq!(w.consistency_score, 1.0);
        assert_eq!(w.sample_count, 7 * 4 * 60);
    }

    #[test]
    fn flat_traffic_yields_busiest_hour() {
        let s = series(7, |_, _| 100.0);
        let windows = detector().detect(&s, &[]);
        assert_eq!(windows.len(), 1);
        assert_eq!((windows[0].start_hour, windows[0].end_hour), (0, 0));
        assert_eq!(windows[0].average_peak, 100.0);
    }

    #[test]
    fn anomalies_are_excluded_from_average() {
        let spike_ts = start() + Duration::hours(20) + Duration::minutes(5);
        let s = series(2, |_, h| if (19..=22).contains(&h) { 500.0 } else { 100.0 });
        let points: Vec<DataPoint> = s
            .points()
            .iter()
            .map(|p| {
                if p.timestamp == spike_ts {
                    DataPoint::new(p.timestamp, 5000.0)
                } else {
                    *p
                }
            })
            .collect();
        let spiked = MetricSeries::new(points).unwrap();

        let raw = detector().detect(&spiked, &[]);
        let clean = detector().detect(&spiked, &[anomaly_at(spike_ts, 5000.0)]);
        assert!(raw[0].average_peak > 500.0);
        assert_eq!(clean[0].average_peak, 500.0);
        assert_eq!(clean[0].sample_count, raw[0].sample_count - 1);
    }

    #[test]
    fn windows_wrap_past_midnight() {
        let s = series(3, |_, h| if h >= 22 || h <= 1 { 400.0 } else { 100.0 });
        let windows = detector().detect(&s, &[]);
        assert_eq!(windows.len(), 1);
        assert_eq!((windows[0].start_hour, windows[0].end_hour), (22, 1));
        assert_eq!(windows[0].hours(), vec![22, 23, 0, 1]);
    }

    #[test]
    fn no_wrap_when_merge_disabled() {
        let mut config = RatewiseConfig::default();
        config.prime_time.merge_across_midnight = false;
        let s = series(3, |_, h| if h >= 22 || h <= 1 { 400.0 } else { 100.0 });
        let windows = PrimeTimeDetector::new(&config).detect(&s, &[]);
        assert_eq!(windows.len(), 2);
    }

    #[test]
    fn excluded_spike_cannot_create_a_window() {
        let spike_ts = start() + Duration::days(3) + Duration::hours(14) + Duration::minutes(7);
        let points: Vec<DataPoint> = series(7, |_, _| 100.0)
            .points()
            .iter()
            .map(|p| {
                let value = if p.timestamp == spike_ts { 1000.0 } else { p.value };
                DataPoint::new(p.timestamp, value)
            })
            .collect();
        let s = MetricSeries::new(points).unwrap();

        let windows = detector().detect(&s, &[anomaly_at(spike_ts, 1000.0)]);
        assert!(windows.iter().all(|w| !w.contains_hour(14)));
        // With the spike gone the week is flat: one busiest-hour window.
        assert_eq!(windows.len(), 1);
        assert_eq!((windows[0].start_hour, windows[0].end_hour), (0, 0));
        assert_eq!(windows[0].average_peak, 100.0);
    }

    #[test]
    fn excluded_spike_does_not_make_its_hour_consistent() {
        // Hour 3 only rises above the evening peak through one flagged spike.
        let spike_ts = start() + Duration::days(2) + Duration::hours(3);
        let evening = series(7, |_, h| if (18..=21).contains(&h) { 300.0 } else { 100.0 });
        let points: Vec<DataPoint> = evening
            .points()
            .iter()
            .map(|p| {
                let value = if p.timestamp == spike_ts { 200_000.0 } else { p.value };
                DataPoint::new(p.timestamp, value)
            })
            .collect();
        let s = MetricSeries::new(points).unwrap();

        let windows = detector().detect(&s, &[anomaly_at(spike_ts, 200_000.0)]);
        assert!(windows.iter().all(|w| !w.contains_hour(3)));
        assert_eq!(windows.len(), 1);
        assert_eq!((windows[0].start_hour, windows[0].end_hour), (18, 21));
        assert_eq!(windows[0].consistency_score, 1.0);
    }

    #[test]
    fn inconsistent_window_is_discarded() {
        // Hour 3 is huge on one day only, hours 18-21 are elevated every day.
        let s = series(7, |day, h| match (day, h) {
            (0, 3) => 10_000.0,
            (_, 18..=21) => 300.0,
            _ => 100.0,
        });
        let windows = detector().detect(&s, &[]);
        assert!(windows.iter().all(|w| !w.contains_hour(3)));
        assert!(windows.iter().any(|w| w.start_hour == 18 && w.end_hour == 21));
    }

    #[test]
    fn results_are_capped_and_sorted() {
        let mut config = RatewiseConfig::default();
        config.prime_time.max_windows = 2;
        config.prime_time.percentile = 50.0;
        let s = series(3, |_, h| match h {
            2..=4 => 200.0,
            9..=11 => 400.0,
            15..=17 => 300.0,
            _ => 100.0,
        });
        let windows = PrimeTimeDetector::new(&config).detect(&s, &[]);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start_hour, 9);
        assert_eq!(windows[1].start_hour, 15);
    }

    #[test]
    fn low_traffic_is_ignored() {
        let mut config = RatewiseConfig::default();
        config.prime_time.min_traffic_threshold = 1.0;
        let s = series(1, |_, _| 0.0);
        assert!(PrimeTimeDetector::new(&config).detect(&s, &[]).is_empty());
    }

    #[test]
    fn empty_series_has_no_windows() {
        assert!(detector().detect(&MetricSeries::empty(), &[]).is_empty());
    }

    #[test]
    fn short_windows_are_dropped() {
        let mut config = RatewiseConfig::default();
        config.prime_time.min_duration_minutes = 180;
        let s = series(3, |_, h| match h {
            5 => 900.0,
            18..=21 => 300.0,
            _ => 100.0,
        });
        let windows = PrimeTimeDetector::new(&config).detect(&s, &[]);
        assert!(windows.iter().all(|w| w.duration_minutes() >= 180));
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start_hour, 18);
    }
}
