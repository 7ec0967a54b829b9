//! Peak-hour extraction: the highest reading per building.

use crate::error::Result;
use crate::table::{Table, BUILDING, KWH, READING_COLUMNS};
use std::collections::BTreeMap;

/// One row per building holding that building's maximum kWh reading.
///
/// The result is a selection of rows from `readings` (every column is kept),
/// ordered by building. When several readings share the maximum, the first
/// one in input order is kept. NaN readings never win.
pub fn get_peak_hour_data(readings: &Table) -> Result<Table> {
    readings.require(&READING_COLUMNS)?;
    let buildings = readings.text(BUILDING)?;
    let kwh = readings.floats(KWH)?;

    let mut best: BTreeMap<&str, usize> = BTreeMap::new();
    for (idx, (building, value)) in buildings.iter().zip(kwh).enumerate() {
        if value.is_nan() {
            continue;
        }
        best.entry(building.as_str())
            .and_modify(|cur| {
                if *value > kwh[*cur] {
                    *cur = idx;
                }
            })
            .or_insert(idx);
    }

    let indices: Vec<usize> = best.into_values().collect();
    Ok(readings.take(&indices).renamed("peaks"))
}
