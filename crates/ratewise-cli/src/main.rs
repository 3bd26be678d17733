use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod snapshot;

#[derive(Parser)]
#[command(
    name = "ratewise",
    about = "ratewise — adaptive rate limit recommendations from traffic history",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format on stderr: text or json
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend a rate limit for every pair in a snapshot
    Recommend {
        /// Snapshot JSON file
        #[arg(short, long)]
        input: String,
        /// Configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
    /// Manage ratewise.toml
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate a deterministic synthetic snapshot.
    ///
    /// Traffic follows a daily sine curve with an evening boost (19:00-22:59),
    /// lower weekends, Gaussian noise and occasional spikes.
    Synth {
        #[arg(short, long)]
        output: String,
        #[arg(long, default_value_t = 2)]
        tenants: usize,
        #[arg(long, default_value_t = 2)]
        endpoints: usize,
        #[arg(long, default_value_t = 7)]
        days: u32,
        /// Minutes between samples
        #[arg(long, default_value_t = 1)]
        interval_minutes: u32,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// First timestamp, RFC 3339 (default: `days` before now, on the hour)
        #[arg(long)]
        start: Option<String>,
    },
    /// Show cache profiles and trends for every pair in a snapshot
    CacheReport {
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a configuration file with every default spelled out
    Init {
        #[arg(short, long, default_value = "ratewise.toml")]
        path: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Parse and validate a configuration file
    Check {
        #[arg(short, long, default_value = "ratewise.toml")]
        path: String,
    },
}

fn init_logging(format: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("ratewise=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_format)?;

    match cli.command {
        Commands::Recommend {
            input,
            config,
            format,
        } => commands::recommend::recommend(&input, config.as_deref(), &format).await,
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => commands::config::init(&path, force),
            ConfigAction::Check { path } => commands::config::check(&path),
        },
        Commands::Synth {
            output,
            tenants,
            endpoints,
            days,
            interval_minutes,
            seed,
            start,
        } => commands::synth::synth(
            &output,
            &commands::synth::SynthOptions {
                tenants,
                endpoints,
                days,
                interval_minutes,
                seed,
                start: start.as_deref(),
            },
        ),
        Commands::CacheReport { input, config } => {
            commands::cache_report::cache_report(&input, config.as_deref())
        }
    }
}
