//! Writing artifacts to disk: the dashboard image, cleaned readings, the
//! building summary and the executive text report.

use crate::aggregate::BuildingSummary;
use crate::error::{EnergyError, Result};
use crate::peak::get_peak_hour_data;
use crate::plot::Figure;
use crate::table::{timestamp_format, Reading, Table};
use std::fmt::{self, Write as _};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Output encoding, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(ImageFormat::Png),
            "svg" => Some(ImageFormat::Svg),
            _ => None,
        }
    }
}

/// Persist `figure` at `path` and return the path written.
///
/// Missing parent directories are created. The image is written to a
/// temporary file next to `path` and renamed into place, so an existing file
/// is replaced whole or not at all. The figure is consumed and released on
/// every path out of this function.
pub fn save_figure(figure: Figure, path: &Path, dpi: u32) -> Result<PathBuf> {
    let format = ImageFormat::from_path(path)
        .ok_or_else(|| EnergyError::UnsupportedFormat(path.to_path_buf()))?;

    let dir = ensure_parent_dir(path)?;

    let bytes = match format {
        ImageFormat::Png => figure.to_png(dpi)?,
        ImageFormat::Svg => figure.svg().as_bytes().to_vec(),
    };
    drop(figure);

    write_atomically(&dir, path, &bytes)?;

    info!(path = %path.display(), dpi, bytes = bytes.len(), "dashboard saved");
    println!("Dashboard successfully saved to {}", path.display());
    Ok(path.to_path_buf())
}

/// Write the combined readings as `building,timestamp,kwh` CSV.
pub fn export_cleaned_data(readings: &Table, path: &Path) -> Result<PathBuf> {
    let rows = readings.readings()?;
    let dir = ensure_parent_dir(path)?;

    let mut buf = csv::Writer::from_writer(Vec::new());
    for row in &rows {
        buf.serialize(row).map_err(|e| EnergyError::csv(path, e))?;
    }
    let bytes = buf
        .into_inner()
        .map_err(|e| EnergyError::io(path, e.into_error()))?;
    write_atomically(&dir, path, &bytes)?;

    info!(path = %path.display(), rows = rows.len(), "cleaned data exported");
    println!("Cleaned data saved to {}", path.display());
    Ok(path.to_path_buf())
}

/// Write one CSV row per building summary.
pub fn export_building_summary(summaries: &[BuildingSummary], path: &Path) -> Result<PathBuf> {
    let dir = ensure_parent_dir(path)?;

    let mut buf = csv::Writer::from_writer(Vec::new());
    for summary in summaries {
        buf.serialize(summary).map_err(|e| EnergyError::csv(path, e))?;
    }
    let bytes = buf
        .into_inner()
        .map_err(|e| EnergyError::io(path, e.into_error()))?;
    write_atomically(&dir, path, &bytes)?;

    info!(path = %path.display(), buildings = summaries.len(), "building summary exported");
    println!("Building summary saved to {}", path.display());
    Ok(path.to_path_buf())
}

/// Build the executive summary, print it and save it to `path`.
pub fn generate_summary(
    readings: &Table,
    summaries: &[BuildingSummary],
    daily: &Table,
    weekly: &Table,
    path: &Path,
) -> Result<String> {
    let report = summary_report(readings, summaries, daily, weekly)?;
    let dir = ensure_parent_dir(path)?;
    write_atomically(&dir, path, report.as_bytes())?;

    println!("\n{}", report);
    info!(path = %path.display(), "executive summary written");
    Ok(report)
}

/// Executive summary text for the given tables
pub fn summary_report(
    readings: &Table,
    summaries: &[BuildingSummary],
    daily: &Table,
    weekly: &Table,
) -> Result<String> {
    let daily_rows = daily.readings()?;
    let weekly_rows = weekly.readings()?;
    let peaks = get_peak_hour_data(readings)?.readings()?;

    let peak = peaks.iter().max_by(|a, b| a.kwh.total_cmp(&b.kwh));

    let mut out = String::new();
    write_report(
        &mut out,
        readings.len(),
        summaries,
        &daily_rows,
        &weekly_rows,
        peak,
    )
    .map_err(|e| EnergyError::Encode(format!("summary report: {e}")))?;

    Ok(out)
}

fn write_report(
    out: &mut String,
    reading_count: usize,
    summaries: &[BuildingSummary],
    daily_rows: &[Reading],
    weekly_rows: &[Reading],
    peak: Option<&Reading>,
) -> fmt::Result {
    let total: f64 = summaries.iter().map(|s| s.total_kwh).sum();
    let top = summaries
        .iter()
        .max_by(|a, b| a.total_kwh.total_cmp(&b.total_kwh));

    writeln!(out, "{}", "=".repeat(60))?;
    writeln!(out, "              CAMPUS ENERGY EXECUTIVE SUMMARY")?;
    writeln!(out, "{}", "=".repeat(60))?;
    writeln!(out, "Readings: {}  Buildings: {}", reading_count, summaries.len())?;
    writeln!(out, "Total campus consumption: {:.2} kWh", total)?;

    if let Some(top) = top {
        writeln!(
            out,
            "Highest-consuming building: {} ({:.2} kWh)",
            top.building, top.total_kwh
        )?;
    }
    if let Some(peak) = peak {
        writeln!(
            out,
            "Peak load: {:.2} kWh at {} in {}",
            peak.kwh,
            peak.timestamp.format(timestamp_format::FORMAT),
            peak.building
        )?;
    }

    writeln!(out)?;
    writeln!(out, "Trends:")?;
    let busiest_day = daily_rows.iter().max_by(|a, b| a.kwh.total_cmp(&b.kwh));
    let first_day = daily_rows.iter().map(|r| r.timestamp).min();
    let last_day = daily_rows.iter().map(|r| r.timestamp).max();
    match (first_day, last_day, busiest_day) {
        (Some(first), Some(last), Some(busiest)) => {
            writeln!(
                out,
                "  Daily: {} rows from {} to {}, highest day {:.2} kWh ({} on {})",
                daily_rows.len(),
                first.format("%Y-%m-%d"),
                last.format("%Y-%m-%d"),
                busiest.kwh,
                busiest.building,
                busiest.timestamp.format("%Y-%m-%d")
            )?;
        }
        _ => writeln!(out, "  Daily: no data")?,
    }
    if weekly_rows.is_empty() {
        writeln!(out, "  Weekly: no data")?;
    } else {
        let mean = weekly_rows.iter().map(|r| r.kwh).sum::<f64>() / weekly_rows.len() as f64;
        writeln!(
            out,
            "  Weekly: {} rows, average weekly reading {:.2} kWh",
            weekly_rows.len(),
            mean
        )?;
    }

    if !summaries.is_empty() {
        writeln!(out)?;
        writeln!(
            out,
            "{:<20} {:>12} {:>10} {:>10} {:>10} {:>8}",
            "Building", "Total kWh", "Mean", "Min", "Max", "Count"
        )?;
        writeln!(out, "{}", "-".repeat(75))?;
        for s in summaries {
            writeln!(
                out,
                "{:<20} {:>12.2} {:>10.2} {:>10.2} {:>10.2} {:>8}",
                s.building, s.total_kwh, s.mean_kwh, s.min_kwh, s.max_kwh, s.readings
            )?;
        }
    }
    writeln!(out, "{}", "=".repeat(60))?;

    Ok(())
}

/// Create the parent directory of `path` if needed and return it.
/// An empty parent means the current directory.
fn ensure_parent_dir(path: &Path) -> Result<PathBuf> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| EnergyError::io(dir, e))?;
            Ok(dir.to_path_buf())
        }
        _ => Ok(PathBuf::from(".")),
    }
}

/// Replace `path` with `bytes` via a temporary file in `dir`
fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| EnergyError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| EnergyError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| EnergyError::io(path, e))?;
    tmp.persist(path).map_err(|e| EnergyError::io(path, e.error))?;
    Ok(())
}
