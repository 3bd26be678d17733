use std::path::Path;

use ratewise_cache::render_cache_report;
use ratewise_pipeline::Pipeline;

use crate::snapshot::Snapshot;

pub fn cache_report(input: &str, config: Option<&str>) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(super::load_config(config)?)?;
    let snapshot = Snapshot::load(Path::new(input))?;
    let pairs = snapshot.pair_keys();
    let memory = snapshot.into_memory();

    for pair in &pairs {
        let report = pipeline.cache_trend_report(pair, &memory);
        println!("{}", render_cache_report(&report));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::commands::synth::{SynthOptions, generate};

    #[test]
    fn reports_every_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let opts = SynthOptions {
            tenants: 1,
            endpoints: 1,
            days: 1,
            interval_minutes: 60,
            seed: 5,
            start: None,
        };
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        generate(&opts, start).unwrap().save(&path).unwrap();

        cache_report(path.to_str().unwrap(), None).unwrap();
    }
}
