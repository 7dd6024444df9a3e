use clap::Parser;
use netatmo_exporter::config::{self, ConfigSources};
use netatmo_exporter::pipeline;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Copy the latest Netatmo weather-station readings into InfluxDB.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file with [influx] and [netatmo] sections (TOML or YAML)
    #[arg(short, long, default_value = "config.toml", env = "NETATMO_EXPORTER_CONFIG")]
    config: PathBuf,

    /// Dedicated InfluxDB config file, replacing the [influx] section
    #[arg(long, value_name = "PATH")]
    influx_config: Option<PathBuf>,

    /// Dedicated Netatmo config file, replacing the [netatmo] section.
    /// Refreshed tokens are written back to this file.
    #[arg(long, value_name = "PATH")]
    netatmo_config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let sources = ConfigSources::new(
        &args.config,
        args.influx_config.as_deref(),
        args.netatmo_config.as_deref(),
    );

    let now = chrono::Utc::now().timestamp();
    match pipeline::run(&sources, config::process_env, now).await {
        Ok(summary) => info!("Done: {:?}", summary),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
