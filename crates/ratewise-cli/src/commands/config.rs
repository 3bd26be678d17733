use std::path::Path;

use anyhow::bail;
use ratewise_core::RatewiseConfig;

pub fn init(path: &str, force: bool) -> anyhow::Result<()> {
    let output = Path::new(path);
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }
    std::fs::write(output, RatewiseConfig::default().to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}

pub fn check(path: &str) -> anyhow::Result<()> {
    let config = super::load_config(Some(path))?;
    let rate = &config.rate;
    println!("✓ {path} is valid");
    println!(
        "  limits:    [{}, {}], {}",
        rate.min_rate_limit,
        rate.max_rate_limit,
        rate.rounding_method.label()
    );
    println!(
        "  formula:   peak x{} x pattern x cache x trend x{}",
        rate.peak_multiplier, rate.safety_margin
    );
    println!(
        "  forecast:  {} (timeout {} ms)",
        if config.analyzer.forecast_enabled { "enabled" } else { "disabled" },
        config.analyzer.forecast_timeout_ms
    );
    println!(
        "  batch:     {} day lookback, {} workers",
        config.pipeline.lookback_days, config.pipeline.max_workers
    );
    Ok(())
}
