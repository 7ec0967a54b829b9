//! CSV ingestion of raw meter readings.

use crate::error::{EnergyError, Result};
use crate::table::{timestamp_format, Reading, Table, BUILDING, KWH, TIMESTAMP};
use csv::StringRecord;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of loading a single file
#[derive(Debug, Clone, Default)]
pub struct FileStats {
    pub path: PathBuf,
    pub accepted: usize,
    pub dropped: usize,
}

/// Load every `*.csv` file in `dir` into one combined readings table.
///
/// Files without a `building` column take their building name from the file
/// stem. Rows with an unparseable timestamp or kWh value are dropped.
pub fn ingest_data<P: AsRef<Path>>(dir: P) -> Result<Table> {
    let dir = dir.as_ref();
    let files = find_csv_files(dir)?;
    if files.is_empty() {
        return Err(EnergyError::EmptyDataset(dir.to_path_buf()));
    }

    let mut readings = Vec::new();
    for path in &files {
        let stats = load_file(path, &mut readings)?;
        if stats.dropped > 0 {
            warn!(
                file = %stats.path.display(),
                dropped = stats.dropped,
                accepted = stats.accepted,
                "dropped invalid rows"
            );
        } else {
            debug!(file = %stats.path.display(), accepted = stats.accepted, "loaded file");
        }
    }

    if readings.is_empty() {
        return Err(EnergyError::EmptyDataset(dir.to_path_buf()));
    }

    readings.sort_by(|a, b| {
        a.building
            .cmp(&b.building)
            .then(a.timestamp.cmp(&b.timestamp))
    });

    info!(files = files.len(), readings = readings.len(), "ingested readings");
    Table::from_readings("combined", &readings)
}

/// CSV files directly inside `dir`, sorted by name
fn find_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| EnergyError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| EnergyError::io(dir, e))?.path();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse one file, appending its valid rows to `out`
pub fn load_file(path: &Path, out: &mut Vec<Reading>) -> Result<FileStats> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| EnergyError::csv(path, e))?;
    let headers = rdr.headers().map_err(|e| EnergyError::csv(path, e))?.clone();

    let table_name = path.display().to_string();
    let position = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let ts_idx = position(TIMESTAMP).ok_or_else(|| EnergyError::missing_column(&table_name, TIMESTAMP))?;
    let kwh_idx = position(KWH).ok_or_else(|| EnergyError::missing_column(&table_name, KWH))?;
    let building_idx = position(BUILDING);
    let fallback_building = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut stats = FileStats {
        path: path.to_path_buf(),
        ..Default::default()
    };

    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| EnergyError::csv(path, e))?;
        match parse_record(&record, ts_idx, kwh_idx, building_idx, &fallback_building) {
            Some(reading) => {
                out.push(reading);
                stats.accepted += 1;
            }
            None => {
                // +2: header line and 1-based numbering
                debug!(file = %path.display(), line = line + 2, "skipping invalid row");
                stats.dropped += 1;
            }
        }
    }

    Ok(stats)
}

fn parse_record(
    record: &StringRecord,
    ts_idx: usize,
    kwh_idx: usize,
    building_idx: Option<usize>,
    fallback_building: &str,
) -> Option<Reading> {
    let timestamp = timestamp_format::parse(record.get(ts_idx)?)?;
    let kwh: f64 = record.get(kwh_idx)?.parse().ok()?;
    if !kwh.is_finite() {
        return None;
    }
    let building = match building_idx {
        Some(idx) => record.get(idx)?.to_string(),
        None => fallback_building.to_string(),
    };
    if building.is_empty() {
        return None;
    }
    Some(Reading::new(building, timestamp, kwh))
}
