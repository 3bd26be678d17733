use std::path::Path;
use std::sync::Arc;

use ratewise_pipeline::{BatchRunner, Pipeline, format_batch_report};
use tracing::info;

use crate::snapshot::Snapshot;

pub async fn recommend(input: &str, config: Option<&str>, format: &str) -> anyhow::Result<()> {
    // Configuration problems stop the run before the snapshot is touched.
    let pipeline = Arc::new(Pipeline::new(super::load_config(config)?)?);

    let snapshot = Snapshot::load(Path::new(input))?;
    let pairs = snapshot.pair_keys();
    info!(input, pairs = pairs.len(), "snapshot loaded");
    let memory = Arc::new(snapshot.into_memory());
    let runner = BatchRunner::new(pipeline, memory.clone(), memory);

    let report = runner.run(pairs).await;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => println!("{}", format_batch_report(&report)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::commands::synth::{SynthOptions, generate};

    fn write_snapshot(dir: &Path) -> String {
        let opts = SynthOptions {
            tenants: 1,
            endpoints: 2,
            days: 2,
            interval_minutes: 30,
            seed: 11,
            start: None,
        };
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
        let path = dir.join("snapshot.json");
        generate(&opts, start).unwrap().save(&path).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn recommends_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_snapshot(dir.path());
        recommend(&input, None, "text").await.unwrap();
        recommend(&input, None, "json").await.unwrap();
    }

    #[tokio::test]
    async fn bad_config_fails_before_reading_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("ratewise.toml");
        std::fs::write(&config, "[pipeline]\nmax_workers = 0\n").unwrap();

        let err = recommend("does-not-exist.json", config.to_str(), "text")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("max_workers"));
    }

    #[tokio::test]
    async fn missing_snapshot_is_an_error() {
        let err = recommend("does-not-exist.json", None, "text").await.unwrap_err();
        assert!(err.to_string().contains("failed to read snapshot"));
    }
}
