//! Markdown cache report.

use crate::trend::CacheTrendReport;

pub fn render_cache_report(report: &CacheTrendReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("## Cache analysis: {}\n\n", report.pair));

    if report.periods.is_empty() {
        out.push_str("_No cache outcome data in the lookback window._\n\n");
    } else {
        out.push_str(
            "| Period | Requests | To limiter | Hit | Miss | Bypass | Expired | Stale | Efficiency |\n",
        );
        out.push_str("|---|---:|---:|---:|---:|---:|---:|---:|---:|\n");
        for period in &report.periods {
            let p = &period.profile;
            out.push_str(&format!(
                "| {}h | {} | {} | {:.1}% | {:.1}% | {:.1}% | {:.1}% | {:.1}% | {:.2} |\n",
                period.hours,
                p.total_requests,
                p.limiter_requests,
                p.hit_ratio * 100.0,
                p.miss_ratio * 100.0,
                p.bypass_ratio * 100.0,
                p.expired_ratio * 100.0,
                p.stale_ratio * 100.0,
                p.efficiency_score,
            ));
        }
        out.push('\n');
        out.push_str(&format!(
            "- Hit ratio trend: **{}** (average {:.1}%)\n",
            report.hit_ratio_trend.label(),
            report.average_hit_ratio * 100.0
        ));
        out.push_str(&format!(
            "- Efficiency trend: **{}** (average {:.2})\n\n",
            report.efficiency_trend.label(),
            report.average_efficiency
        ));
    }

    out.push_str("### Recommendations\n\n");
    for r in &report.recommendations {
        out.push_str(&format!("- {r}\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheProfileCollector;
    use ratewise_core::{CacheOutcomeCounts, PairKey, RatewiseConfig};

    #[test]
    fn renders_table_and_recommendations() {
        let collector = CacheProfileCollector::new(&RatewiseConfig::default());
        let counts = CacheOutcomeCounts {
            hit: 850,
            miss: 150,
            ..CacheOutcomeCounts::default()
        };
        let report =
            collector.trend_report(PairKey::new("1234", "/v1/items"), &[(24, Some(counts))], 168);
        let md = render_cache_report(&report);
        assert!(md.starts_with("## Cache analysis: 1234/v1/items"));
        assert!(md.contains("| 24h | 1000 | 150 | 85.0% | 15.0% |"));
        assert!(md.contains("Excellent cache hit ratio"));
        assert!(md.contains("- Hit ratio trend: **stable**"));
    }

    #[test]
    fn empty_report_notes_missing_data() {
        let collector = CacheProfileCollector::new(&RatewiseConfig::default());
        let report = collector.trend_report(PairKey::new("1234", "/v1/items"), &[], 168);
        let md = render_cache_report(&report);
        assert!(md.contains("No cache outcome data"));
        assert!(md.contains("Insufficient cache data"));
    }
}
