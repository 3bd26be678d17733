//! Data sources for a run.
//!
//! Providers return snapshots: the pipeline never queries, authenticates,
//! or retries. Whatever a provider returns is treated as immutable for the
//! duration of the run.

use std::collections::{BTreeMap, HashMap};

use chrono::Duration;

use ratewise_core::{CacheOutcomeCounts, MetricSeries, PairKey, SourceError};

/// Supplies the traffic series for a pair over a lookback window.
pub trait SeriesProvider: Send + Sync {
    fn series(&self, pair: &PairKey, lookback: Duration) -> Result<MetricSeries, SourceError>;
}

/// Supplies raw cache outcome counts for a pair over a window.
///
/// `Ok(None)` means no cache data exists, which is a normal state.
pub trait CacheCountsProvider: Send + Sync {
    fn counts(
        &self,
        pair: &PairKey,
        window: Duration,
    ) -> Result<Option<CacheOutcomeCounts>, SourceError>;
}

/// Cache provider for deployments without cache metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCacheData;

impl CacheCountsProvider for NoCacheData {
    fn counts(&self, _: &PairKey, _: Duration) -> Result<Option<CacheOutcomeCounts>, SourceError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Default)]
struct SnapshotEntry {
    series: MetricSeries,
    cache: Option<CacheOutcomeCounts>,
    /// Counts for specific window lengths, keyed by hours.
    cache_periods: BTreeMap<u32, CacheOutcomeCounts>,
}

/// In-memory snapshot serving both providers.
///
/// Pairs that were never inserted are reported as unavailable.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    entries: HashMap<PairKey, SnapshotEntry>,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        pair: PairKey,
        series: MetricSeries,
        cache: Option<CacheOutcomeCounts>,
    ) {
        let entry = self.entries.entry(pair).or_default();
        entry.series = series;
        entry.cache = cache;
    }

    /// Counts to serve for windows of exactly `hours` hours.
    pub fn insert_cache_period(&mut self, pair: PairKey, hours: u32, counts: CacheOutcomeCounts) {
        self.entries
            .entry(pair)
            .or_default()
            .cache_periods
            .insert(hours, counts);
    }

    /// Pairs in the snapshot, sorted.
    pub fn pairs(&self) -> Vec<PairKey> {
        let mut pairs: Vec<PairKey> = self.entries.keys().cloned().collect();
        pairs.sort();
        pairs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, pair: &PairKey) -> Result<&SnapshotEntry, SourceError> {
        self.entries.get(pair).ok_or_else(|| SourceError::Unavailable {
            source_name: "snapshot".to_string(),
            message: format!("no data for {pair}"),
        })
    }
}

impl SeriesProvider for MemorySnapshot {
    fn series(&self, pair: &PairKey, _lookback: Duration) -> Result<MetricSeries, SourceError> {
        Ok(self.entry(pair)?.series.clone())
    }
}

impl CacheCountsProvider for MemorySnapshot {
    fn counts(
        &self,
        pair: &PairKey,
        window: Duration,
    ) -> Result<Option<CacheOutcomeCounts>, SourceError> {
        let entry = self.entry(pair)?;
        let hours = u32::try_from(window.num_hours()).unwrap_or(u32::MAX);
        Ok(entry
            .cache_periods
            .get(&hours)
            .copied()
            .or(entry.cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_pair_is_unavailable() {
        let snapshot = MemorySnapshot::new();
        let err = snapshot
            .series(&PairKey::new("t", "/a"), Duration::days(7))
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[test]
    fn period_counts_override_default_counts() {
        let pair = PairKey::new("t", "/a");
        let mut snapshot = MemorySnapshot::new();
        let base = CacheOutcomeCounts {
            hit: 1,
            ..CacheOutcomeCounts::default()
        };
        let hourly = CacheOutcomeCounts {
            hit: 9,
            ..CacheOutcomeCounts::default()
        };
        snapshot.insert(pair.clone(), MetricSeries::empty(), Some(base));
        snapshot.insert_cache_period(pair.clone(), 1, hourly);

        let one_hour = snapshot.counts(&pair, Duration::hours(1)).unwrap();
        let one_week = snapshot.counts(&pair, Duration::days(7)).unwrap();
        assert_eq!(one_hour, Some(hourly));
        assert_eq!(one_week, Some(base));
    }

    #[test]
    fn pairs_are_sorted() {
        let mut snapshot = MemorySnapshot::new();
        snapshot.insert(PairKey::new("b", "/x"), MetricSeries::empty(), None);
        snapshot.insert(PairKey::new("a", "/y"), MetricSeries::empty(), None);
        let pairs = snapshot.pairs();
        assert_eq!(pairs[0].tenant, "a");
        assert_eq!(snapshot.len(), 2);
    }
}
