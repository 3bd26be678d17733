//! Cache profile collection.

use tracing::debug;

use ratewise_core::config::CacheConfig;
use ratewise_core::{CacheOutcomeCounts, CacheProfile, ProfileOrigin, RatewiseConfig};

/// Builds cache profiles from raw outcome counts, falling back to the
/// configured default when there is too little data.
#[derive(Debug, Clone)]
pub struct CacheProfileCollector {
    config: CacheConfig,
}

impl CacheProfileCollector {
    pub fn new(config: &RatewiseConfig) -> Self {
        Self {
            config: config.cache.clone(),
        }
    }

    /// Profile from raw outcome counts.
    ///
    /// Missing counts, or counts that sum to zero, give the default profile.
    pub fn profile(&self, counts: Option<&CacheOutcomeCounts>) -> CacheProfile {
        let Some(counts) = counts.filter(|c| c.total() > 0) else {
            debug!(
                hit_ratio = self.config.default_hit_ratio,
                "no cache outcome data, using default profile"
            );
            return self.default_profile();
        };

        let total = counts.total() as f64;
        let ratio = |n: u64| n as f64 / total;
        let (hit, miss, bypass, expired, stale) = (
            ratio(counts.hit),
            ratio(counts.miss),
            ratio(counts.bypass),
            ratio(counts.expired),
            ratio(counts.stale),
        );

        CacheProfile {
            hit_ratio: hit,
            miss_ratio: miss,
            bypass_ratio: bypass,
            expired_ratio: expired,
            stale_ratio: stale,
            efficiency_score: self.efficiency_score(hit, bypass, expired + stale),
            total_requests: counts.total(),
            limiter_requests: counts.limiter_requests(),
            origin: ProfileOrigin::Observed,
        }
    }

    /// The configured fallback: default hit ratio, everything else a miss.
    pub fn default_profile(&self) -> CacheProfile {
        let hit = self.config.default_hit_ratio;
        CacheProfile {
            hit_ratio: hit,
            miss_ratio: 1.0 - hit,
            bypass_ratio: 0.0,
            expired_ratio: 0.0,
            stale_ratio: 0.0,
            efficiency_score: self.efficiency_score(hit, 0.0, 0.0),
            total_requests: 0,
            limiter_requests: 0,
            origin: ProfileOrigin::Default,
        }
    }

    /// Hit ratio less bypass and TTL penalties, clamped to `[0, 1]`.
    pub fn efficiency_score(&self, hit_ratio: f64, bypass_ratio: f64, ttl_ratio: f64) -> f64 {
        let score = hit_ratio
            - bypass_ratio * self.config.bypass_penalty
            - ttl_ratio * self.config.ttl_penalty;
        score.clamp(0.0, 1.0)
    }

    pub fn trend_slope_threshold(&self) -> f64 {
        self.config.trend_slope_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> CacheProfileCollector {
        CacheProfileCollector::new(&RatewiseConfig::default())
    }

    #[test]
    fn ratios_from_counts() {
        let counts = CacheOutcomeCounts {
            hit: 600,
            miss: 300,
            bypass: 50,
            expired: 30,
            stale: 20,
        };
        let profile = collector().profile(Some(&counts));
        assert_eq!(profile.origin, ProfileOrigin::Observed);
        assert_eq!(profile.total_requests, 1000);
        assert_eq!(profile.limiter_requests, 400);
        assert!((profile.hit_ratio - 0.6).abs() < 1e-12);
        assert!((profile.bypass_ratio - 0.05).abs() < 1e-12);
        // 0.6 - 0.05 * 0.3 - 0.05 * 0.2
        assert!((profile.efficiency_score - 0.575).abs() < 1e-12);
    }

    #[test]
    fn zero_counts_use_default_profile() {
        let profile = collector().profile(Some(&CacheOutcomeCounts::default()));
        assert!(profile.is_default());
        assert_eq!(profile.hit_ratio, 0.15);
        assert_eq!(profile.total_requests, 0);

        assert!(collector().profile(None).is_default());
    }

    #[test]
    fn efficiency_is_clamped() {
        let c = collector();
        assert_eq!(c.efficiency_score(0.0, 1.0, 1.0), 0.0);
        assert_eq!(c.efficiency_score(1.0, 0.0, 0.0), 1.0);
    }

    #[test]
    fn huge_counts_keep_ratios_in_range() {
        let counts = CacheOutcomeCounts {
            hit: u64::MAX,
            miss: u64::MAX,
            ..CacheOutcomeCounts::default()
        };
        let profile = collector().profile(Some(&counts));
        assert_eq!(profile.total_requests, u64::MAX);
        assert_eq!(profile.limiter_requests, u64::MAX);
        assert!(profile.hit_ratio <= 1.0);
        assert!((0.0..=1.0).contains(&profile.efficiency_score));
    }

    #[test]
    fn all_bypass_scores_zero() {
        let counts = CacheOutcomeCounts {
            bypass: 10,
            ..CacheOutcomeCounts::default()
        };
        let profile = collector().profile(Some(&counts));
        assert_eq!(profile.bypass_ratio, 1.0);
        assert_eq!(profile.efficiency_score, 0.0);
    }
}
