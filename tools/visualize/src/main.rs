//! Renders the report charts from an existing unified hotspot table without
//! running the earlier stages.

use std::env::var;
use std::path::PathBuf;

use anyhow::{Context, Result};
use canopy_core::{Pipeline, PipelineConfig};
use clap::Parser;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render deforestation charts from the unified table")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Unified CSV to read instead of the configured stage-3 input.
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        tracing_subscriber::EnvFilter::new(match args.verbose {
            0 => "visualize=info,canopy_core=info",
            1 => "visualize=debug,canopy_core=debug",
            _ => "trace",
        })
    };
    tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(filter).init();
    debug!(?args, "parsed arguments");

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    let input = args.input.unwrap_or_else(|| config.chart_input());

    let pipeline = Pipeline::new(config);
    let unified = pipeline
        .load_unified(&input)
        .with_context(|| format!("reading unified table {}", input.display()))?;
    let charts = pipeline.stage_visualize(&unified).context("rendering charts")?;

    for path in charts.paths() {
        println!("{}", path.display());
    }
    Ok(())
}
