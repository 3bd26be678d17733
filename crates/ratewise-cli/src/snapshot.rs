//! JSON snapshot files: the CLI's stand-in for a metrics backend.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ratewise_core::{CacheOutcomeCounts, DataPoint, MetricSeries, PairKey};
use ratewise_pipeline::MemorySnapshot;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub pairs: Vec<SnapshotPair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPair {
    pub tenant: String,
    pub endpoint: String,
    #[serde(default)]
    pub series: Vec<SnapshotPoint>,
    #[serde(default)]
    pub cache: Option<CacheOutcomeCounts>,
    /// Cache counts for specific window lengths, keyed by hours.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cache_periods: BTreeMap<u32, CacheOutcomeCounts>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnapshotPoint {
    pub timestamp: DateTime<Utc>,
    /// `null` marks a missing sample.
    pub value: Option<f64>,
}

impl Snapshot {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse snapshot {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write snapshot {}", path.display()))
    }

    /// Pairs in file order.
    pub fn pair_keys(&self) -> Vec<PairKey> {
        self.pairs
            .iter()
            .map(|p| PairKey::new(&p.tenant, &p.endpoint))
            .collect()
    }

    /// Index the snapshot for the pipeline providers.
    ///
    /// Missing samples are dropped and the rest sorted by timestamp.
    pub fn into_memory(self) -> MemorySnapshot {
        let mut memory = MemorySnapshot::new();
        for p in self.pairs {
            let key = PairKey::new(p.tenant, p.endpoint);
            let points = p
                .series
                .iter()
                .map(|s| DataPoint::new(s.timestamp, s.value.unwrap_or(f64::NAN)))
                .collect();
            memory.insert(key.clone(), MetricSeries::from_unordered(points), p.cache);
            for (hours, counts) in p.cache_periods {
                memory.insert_cache_period(key.clone(), hours, counts);
            }
        }
        memory
    }
}
