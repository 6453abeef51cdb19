//! Waste Scanner - finds idle and wasted cloud resources
//!
//! Runs the selected pipelines concurrently against an inventory snapshot
//! and writes one report per pipeline.

use anyhow::{bail, Context, Result};
use clap::Parser;
use scanner_lib::{
    pipelines::ALL_PIPELINES,
    sources::{Collaborators, SnapshotBackend},
    ScannerMetrics, StructuredLogger,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod scan;
mod summary;

use scan::ScanOutcome;
use summary::OutputFormat;

const SCANNER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cloud waste scanner
#[derive(Parser)]
#[command(name = "waste-scanner")]
#[command(author, version, about = "Scans cloud inventory for idle and wasted resources", long_about = None)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, short, env = "SCANNER_CONFIG")]
    config: Option<PathBuf>,

    /// Inventory snapshot to scan
    #[arg(long, short, required_unless_present = "list")]
    inventory: Option<PathBuf>,

    /// Pipeline to run; repeat to run several (default: all configured)
    #[arg(long = "pipeline", short = 'p', value_name = "NAME")]
    pipelines: Vec<String>,

    /// Report directory, overrides the configured one
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Summary format
    #[arg(long, short, default_value = "table")]
    format: OutputFormat,

    /// Write Prometheus metrics to this textfile after the run
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// List available pipelines and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list {
        for name in ALL_PIPELINES {
            println!("{name}");
        }
        return Ok(());
    }

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let mut config = config::ScannerConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    config.pipelines = config.selected_pipelines(&cli.pipelines)?;
    config.validate()?;

    let inventory_path = cli
        .inventory
        .context("--inventory is required to run a scan")?;
    let backend = Arc::new(SnapshotBackend::load(&inventory_path)?);
    let collaborators = Collaborators::from_backend(backend);

    let metrics = ScannerMetrics::new();
    let logger = StructuredLogger::new(chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string());
    logger.log_run_started(SCANNER_VERSION, &config.pipelines);

    let ScanOutcome { rows, failed } =
        scan::run_pipelines(&config, &collaborators, &metrics, &logger).await;

    logger.log_run_finished(rows.len() - failed, failed);
    summary::print_summary(&rows, cli.format);

    if let Some(path) = &cli.metrics_file {
        let body = metrics.render()?;
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!(path = %path.display(), "Metrics written");
    }

    if failed > 0 {
        bail!("{failed} of {} pipelines failed", rows.len());
    }

    summary::print_success(&format!("Reports written to {}", config.output_dir.display()));
    Ok(())
}
