//! Campus Energy - batch analysis of building energy-meter readings.
//!
//! Loads per-building CSV exports, aggregates them into daily and weekly
//! windows, renders a three-panel dashboard and writes summary reports.

mod aggregate;
mod error;
mod export;
mod ingest;
mod logging;
mod peak;
mod plot;
mod table;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Energy dashboard and summary generator for campus meter data
#[derive(Parser, Debug)]
#[command(name = "campus-energy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing one or more meter CSV files
    #[arg(short, long, env = "CAMPUS_ENERGY_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Directory for exported CSV and text reports
    #[arg(short, long, env = "CAMPUS_ENERGY_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Dashboard image path (.png or .svg, default: <output-dir>/dashboard.png)
    #[arg(long, env = "CAMPUS_ENERGY_DASHBOARD")]
    dashboard: Option<PathBuf>,

    /// Log filter directive (error, warn, info, debug, trace)
    #[arg(long, env = "CAMPUS_ENERGY_LOG", default_value = "info")]
    log_level: String,
}

fn run(args: &Args) -> Result<()> {
    println!("\n=== Starting Campus Energy Pipeline ===");

    let combined = ingest::ingest_data(&args.data_dir)
        .with_context(|| format!("Failed to ingest readings from {}", args.data_dir.display()))?;
    info!(table = combined.name(), rows = combined.len(), "readings loaded");

    println!("\nRunning aggregations...");
    let daily = aggregate::calculate_daily_totals(&combined).context("Daily aggregation failed")?;
    let weekly =
        aggregate::calculate_weekly_aggregates(&combined).context("Weekly aggregation failed")?;
    let summaries =
        aggregate::building_wise_summary(&combined).context("Building summary failed")?;

    println!("Creating dashboard...");
    let dashboard_path = args
        .dashboard
        .clone()
        .unwrap_or_else(|| args.output_dir.join("dashboard.png"));
    plot::create_dashboard(&combined, &daily, &weekly, &dashboard_path)
        .with_context(|| format!("Failed to create dashboard at {}", dashboard_path.display()))?;

    println!("Exporting cleaned data...");
    export::export_cleaned_data(&combined, &args.output_dir.join("cleaned_energy_data.csv"))
        .context("Failed to export cleaned data")?;

    println!("Exporting building summary...");
    export::export_building_summary(&summaries, &args.output_dir.join("building_summary.csv"))
        .context("Failed to export building summary")?;

    println!("Generating executive summary...");
    export::generate_summary(
        &combined,
        &summaries,
        &daily,
        &weekly,
        &args.output_dir.join("summary.txt"),
    )
    .context("Failed to write executive summary")?;

    println!("\nAll tasks completed successfully!");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);
    run(&args)
}
