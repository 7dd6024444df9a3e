mod export;

use anyhow::{Context, Result};
use clap::Parser;
use netatmo_exporter::batching::Batcher;
use netatmo_exporter::config::{self, InfluxSettings, Section, SectionSource};
use netatmo_exporter::db::InfluxClient;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PROGRESS_EVERY_ROWS: usize = 500;
const TYPE_CONFLICT: u16 = 422;

/// Import Netatmo CSV exports into InfluxDB.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file with an [influx] section (YAML or TOML)
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    /// Directory containing Netatmo CSV exports
    #[arg(short = 'd', long, default_value = "./data")]
    folder: PathBuf,

    /// Value of the `station` tag on every imported point
    #[arg(long, default_value = "Mein Zuhause (Wetterstation Innensensor)")]
    station: String,

    /// Points per write; defaults to the configured batch_size
    #[arg(long)]
    batch_size: Option<usize>,

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

    if let Err(e) = run(args).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let source = SectionSource {
        path: args.config.clone(),
        nested: true,
    };
    let settings: InfluxSettings =
        config::load_section(&source, Section::Influx, config::process_env)?;

    let client = InfluxClient::new(&settings)?;
    let mut batcher = Batcher::new(client, args.batch_size.unwrap_or(settings.batch_size));

    for path in csv_files(&args.folder)? {
        info!(
            "Importing {} …",
            path.file_name().unwrap_or_default().to_string_lossy()
        );
        import_file(&path, &args.station, &mut batcher).await?;
    }

    info!("Done. {} points written.", batcher.written());
    Ok(())
}

fn csv_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let pattern = folder.join("*.csv");
    let pattern = pattern
        .to_str()
        .with_context(|| format!("folder {} is not valid UTF-8", folder.display()))?;

    let mut files = glob::glob(pattern)
        .with_context(|| format!("invalid folder pattern {}", pattern))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to list CSV exports")?;
    files.sort();
    Ok(files)
}

async fn import_file(path: &Path, station: &str, batcher: &mut Batcher) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut records = export::reader(file).into_records();
    let header = export::read_header(&mut records)
        .with_context(|| format!("{} is not a Netatmo export", path.display()))?;

    let mut rows = 0;
    for record in records {
        let record = record.with_context(|| format!("failed to read {}", path.display()))?;
        let Some(points) = export::row_points(&header, station, &record) else {
            continue;
        };

        rows += 1;
        if rows % PROGRESS_EVERY_ROWS == 0 {
            info!("  processed {} rows...", rows);
        }

        for point in points {
            batcher.queue(point);
        }
        if batcher.is_full() {
            flush_skipping_conflicts(batcher, rows).await?;
        }
    }

    flush_skipping_conflicts(batcher, rows).await?;
    info!(
        "  → finished {} rows from {}",
        rows,
        path.file_name().unwrap_or_default().to_string_lossy()
    );
    Ok(())
}

/// Flushes, treating a batch rejected for a field type conflict as skipped.
async fn flush_skipping_conflicts(batcher: &mut Batcher, rows: usize) -> Result<()> {
    match batcher.flush().await {
        Err(e) if e.write_status().map(|s| s.as_u16()) == Some(TYPE_CONFLICT) => {
            warn!("  ⚠  Skipping batch at ~{} rows due to type conflict", rows);
            Ok(())
        }
        other => Ok(other?),
    }
}
