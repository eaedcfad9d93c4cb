use std::env::var;
use std::path::PathBuf;

use anyhow::{Context, Result};
use canopy_core::{Pipeline, PipelineConfig};
use clap::Parser;
use tracing::debug;

/// Runs the full deforestation pipeline: boundaries, hotspot analysis and
/// report charts.
#[derive(Parser, Debug)]
#[command(name = "canopy", about = "Deforestation monitoring pipeline")]
struct Args {
    /// JSON configuration; defaults apply to every missing key.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable logging.
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    if var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    } else if !quiet {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(match verbose {
                0 => "canopy=info,canopy_core=info",
                1 => "canopy=debug,canopy_core=debug",
                2 => "canopy=trace,canopy_core=trace",
                3.. => "trace",
            })
            .try_init()
            .ok();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);
    debug!(?args, "parsed arguments");

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    let pipeline = Pipeline::new(config);
    let report = pipeline
        .run_with(|summary| println!("{summary}"))
        .context("running deforestation pipeline")?;

    println!(
        "Correlação ({} de {} municípios com dados completos):",
        report.correlation.rows_used, report.correlation.rows_total
    );
    for (label, row) in report.correlation.labels.iter().zip(&report.correlation.matrix) {
        let cells: Vec<String> = row.iter().map(|r| format!("{r:>8.2}")).collect();
        println!("  {label:<22}{}", cells.join(""));
    }
    println!();
    println!("Municípios:          {} ({})", report.boundaries.display(), report.municipalities);
    println!("Indicadores:         {}", report.indicators_csv.display());
    println!("Focos:               {} ({})", report.hotspots.display(), report.hotspot_count);
    println!("Resumo:              {}", report.summary_path.display());
    println!("Tabela unificada:    {}", report.unified.display());
    println!("Fonte dos gráficos:  {}", report.chart_input.display());
    println!("Matriz de correlação: {}", report.correlation_path.display());
    for path in report.charts.paths() {
        println!("Gráfico:             {}", path.display());
    }
    Ok(())
}
