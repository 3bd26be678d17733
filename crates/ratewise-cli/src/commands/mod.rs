pub mod cache_report;
pub mod config;
pub mod recommend;
pub mod synth;

use std::path::Path;

use anyhow::Context;
use ratewise_core::RatewiseConfig;

/// Load and validate configuration, or fall back to defaults.
pub(crate) fn load_config(path: Option<&str>) -> anyhow::Result<RatewiseConfig> {
    match path {
        Some(path) => RatewiseConfig::from_file(Path::new(path))
            .with_context(|| format!("invalid configuration in {path}")),
        None => Ok(RatewiseConfig::default()),
    }
}
