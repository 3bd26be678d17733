use std::f64::consts::PI;
use std::path::Path;

use anyhow::{Context, bail};
use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ratewise_cache::DEFAULT_PERIOD_HOURS;
use ratewise_core::CacheOutcomeCounts;

use crate::snapshot::{Snapshot, SnapshotPair, SnapshotPoint};

const ENDPOINTS: [&str; 5] = [
    "/api/v1/items",
    "/api/v1/search",
    "/api/v1/orders",
    "/api/v1/users",
    "/api/v1/checkout",
];
const SPIKE_PROBABILITY: f64 = 0.001;

pub struct SynthOptions<'a> {
    pub tenants: usize,
    pub endpoints: usize,
    pub days: u32,
    pub interval_minutes: u32,
    pub seed: u64,
    pub start: Option<&'a str>,
}

pub fn synth(output: &str, opts: &SynthOptions<'_>) -> anyhow::Result<()> {
    let start = match opts.start {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid --start {s}"))?
            .with_timezone(&Utc),
        None => {
            Utc::now().duration_trunc(Duration::hours(1))? - Duration::days(i64::from(opts.days))
        }
    };
    let snapshot = generate(opts, start)?;
    snapshot.save(Path::new(output))?;

    let samples: usize = snapshot.pairs.iter().map(|p| p.series.len()).sum();
    println!(
        "✓ Wrote {} pairs ({samples} samples) to {output}",
        snapshot.pairs.len()
    );
    Ok(())
}

/// Deterministic for a given seed and start.
pub(crate) fn generate(opts: &SynthOptions<'_>, start: DateTime<Utc>) -> anyhow::Result<Snapshot> {
    if opts.tenants == 0 || opts.endpoints == 0 {
        bail!("--tenants and --endpoints must be at least 1");
    }
    if opts.days == 0 || opts.interval_minutes == 0 {
        bail!("--days and --interval-minutes must be at least 1");
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let samples = i64::from(opts.days) * 1440 / i64::from(opts.interval_minutes);
    let step = Duration::minutes(i64::from(opts.interval_minutes));

    let mut pairs = Vec::with_capacity(opts.tenants * opts.endpoints);
    for t in 0..opts.tenants {
        for e in 0..opts.endpoints {
            let endpoint = ENDPOINTS
                .get(e)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("/api/v1/resource{e}"));
            let base = rng.gen_range(50.0..150.0);

            let series: Vec<SnapshotPoint> = (0..samples)
                .map(|k| {
                    let timestamp = start + step * k as i32;
                    let value = traffic(&mut rng, base, timestamp);
                    SnapshotPoint {
                        timestamp,
                        value: Some(value),
                    }
                })
                .collect();

            let hit_ratio = rng.gen_range(0.1..0.9);
            let per_hour = base * 60.0;
            let mut cache_periods = std::collections::BTreeMap::new();
            for hours in DEFAULT_PERIOD_HOURS {
                if hours > opts.days * 24 {
                    continue;
                }
                let drift: f64 = rng.gen_range(-0.05..0.05);
                let total = per_hour * f64::from(hours);
                cache_periods.insert(hours, counts(total, (hit_ratio + drift).clamp(0.0, 1.0)));
            }
            let total = per_hour * 24.0 * f64::from(opts.days);

            pairs.push(SnapshotPair {
                tenant: format!("tenant-{:02}", t + 1),
                endpoint,
                series,
                cache: Some(counts(total, hit_ratio)),
                cache_periods,
            });
        }
    }
    Ok(Snapshot { pairs })
}

/// Daily sine shape, evening boost, quieter weekends, Gaussian noise, rare spikes.
fn traffic(rng: &mut StdRng, base: f64, at: DateTime<Utc>) -> f64 {
    let hour = at.hour();
    let mut shape = (0.3 + 0.7 * (2.0 * PI * (f64::from(hour) - 6.0) / 24.0).sin()).max(0.1);
    if (19..=22).contains(&hour) {
        shape *= 2.5;
    }
    if at.weekday().num_days_from_monday() >= 5 {
        shape *= 0.7;
    }
    let mut value = (base * shape + gaussian(rng) * base * 0.2).max(0.0);
    if rng.gen_range(0.0..1.0) < SPIKE_PROBABILITY {
        let u: f64 = rng.gen_range(0.0..1.0);
        value += -(1.0 - u).ln() * base * 3.0;
    }
    value
}

fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn counts(total: f64, hit_ratio: f64) -> CacheOutcomeCounts {
    let total = total.round() as u64;
    let share = |f: f64| (total as f64 * f).round() as u64;
    let hit = share(hit_ratio);
    let bypass = share(0.03);
    let expired = share(0.05);
    let stale = share(0.02);
    CacheOutcomeCounts {
        hit,
        bypass,
        expired,
        stale,
        miss: total.saturating_sub(hit + bypass + expired + stale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn options(seed: u64) -> SynthOptions<'static> {
        SynthOptions {
            tenants: 2,
            endpoints: 3,
            days: 2,
            interval_minutes: 15,
            seed,
            start: None,
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn same_seed_same_snapshot() {
        let a = generate(&options(7), start()).unwrap();
        let b = generate(&options(7), start()).unwrap();
        let c = generate(&options(8), start()).unwrap();
        let json = |s: &Snapshot| serde_json::to_string(s).unwrap();
        assert_eq!(json(&a), json(&b));
        assert_ne!(json(&a), json(&c));
    }

    #[test]
    fn shape_of_snapshot() {
        let snapshot = generate(&options(1), start()).unwrap();
        assert_eq!(snapshot.pairs.len(), 6);
        let first = &snapshot.pairs[0];
        assert_eq!(first.tenant, "tenant-01");
        assert_eq!(first.endpoint, "/api/v1/items");
        assert_eq!(first.series.len(), 2 * 96);
        assert_eq!(first.series[1].timestamp - first.series[0].timestamp, Duration::minutes(15));
        assert!(first.series.iter().all(|p| p.value.is_some_and(|v| v >= 0.0)));
        // 72h and 168h periods exceed the two-day range.
        assert_eq!(first.cache_periods.keys().copied().collect::<Vec<_>>(), vec![1, 6, 24]);
    }

    #[test]
    fn counts_add_up() {
        let c = counts(1000.0, 0.6);
        assert_eq!(c.total(), 1000);
        assert_eq!(c.hit, 600);
    }

    #[test]
    fn rejects_empty_dimensions() {
        let mut opts = options(1);
        opts.tenants = 0;
        assert!(generate(&opts, start()).is_err());
    }

    #[test]
    fn writes_file_with_explicit_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let opts = SynthOptions {
            start: Some("2026-03-02T00:00:00Z"),
            ..options(3)
        };
        synth(path.to_str().unwrap(), &opts).unwrap();
        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded.pairs[0].series[0].timestamp, start());
    }
}
