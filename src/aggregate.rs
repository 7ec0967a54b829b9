//! Daily, weekly and per-building aggregation of readings.

use crate::error::Result;
use crate::table::{Reading, Table, BUILDING, KWH};
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Totals for one building across the whole dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingSummary {
    pub building: String,
    pub total_kwh: f64,
    pub mean_kwh: f64,
    pub min_kwh: f64,
    pub max_kwh: f64,
    pub readings: usize,
}

/// Sum of kWh per building per calendar day.
///
/// The `timestamp` column of the result holds midnight of each day.
pub fn calculate_daily_totals(readings: &Table) -> Result<Table> {
    let mut totals: BTreeMap<(String, NaiveDate), f64> = BTreeMap::new();
    for r in readings.readings()? {
        *totals.entry((r.building, r.timestamp.date())).or_default() += r.kwh;
    }
    window_table("daily", totals)
}

/// Mean kWh per building per week. Weeks run Monday to Sunday and are
/// labelled by their closing Sunday.
pub fn calculate_weekly_aggregates(readings: &Table) -> Result<Table> {
    let mut sums: BTreeMap<(String, NaiveDate), (f64, usize)> = BTreeMap::new();
    for r in readings.readings()? {
        let slot = sums.entry((r.building, week_ending(r.timestamp.date()))).or_default();
        slot.0 += r.kwh;
        slot.1 += 1;
    }
    let means = sums
        .into_iter()
        .map(|(key, (sum, count))| (key, sum / count as f64))
        .collect();
    window_table("weekly", means)
}

/// Per-building total, mean, min and max, ordered by building.
pub fn building_wise_summary(readings: &Table) -> Result<Vec<BuildingSummary>> {
    readings.require(&[BUILDING, KWH])?;
    let buildings = readings.text(BUILDING)?;
    let kwh = readings.floats(KWH)?;

    let mut grouped: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (b, k) in buildings.iter().zip(kwh) {
        grouped.entry(b.as_str()).or_default().push(*k);
    }

    Ok(grouped
        .into_iter()
        .map(|(building, values)| {
            let total: f64 = values.iter().sum();
            BuildingSummary {
                building: building.to_string(),
                total_kwh: total,
                mean_kwh: total / values.len() as f64,
                min_kwh: values.iter().cloned().fold(f64::INFINITY, f64::min),
                max_kwh: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                readings: values.len(),
            }
        })
        .collect())
}

/// Sunday closing the Monday-based week containing `date`
pub fn week_ending(date: NaiveDate) -> NaiveDate {
    let days_to_sunday = 6 - date.weekday().num_days_from_monday() as i64;
    date + Duration::days(days_to_sunday)
}

fn window_table(name: &str, values: BTreeMap<(String, NaiveDate), f64>) -> Result<Table> {
    let rows: Vec<Reading> = values
        .into_iter()
        .map(|((building, date), kwh)| Reading::new(building, date.and_time(chrono::NaiveTime::MIN), kwh))
        .collect();
    Table::from_readings(name, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnergyError;
    use crate::table::tests::{readings_table, ts};
    use crate::table::{Column, TIMESTAMP};

    fn sample() -> Table {
        readings_table(
            "combined",
            &[
                ("Lib", ts("2024-01-01", 8), 5.0),
                ("Lib", ts("2024-01-01", 9), 9.0),
                ("Lib", ts("2024-01-02", 9), 4.0),
                ("Lib", ts("2024-01-08", 9), 2.0),
                ("Gym", ts("2024-01-01", 8), 3.0),
            ],
        )
    }

    #[test]
    fn test_week_ending_is_sunday() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(week_ending(monday), sunday);
        assert_eq!(week_ending(sunday), sunday);
    }

    #[test]
    fn test_daily_totals_sum_per_day() {
        let daily = calculate_daily_totals(&sample()).unwrap();
        let rows = daily.readings().unwrap();
        assert_eq!(daily.name(), "daily");
        assert_eq!(
            rows,
            vec![
                Reading::new("Gym", ts("2024-01-01", 0), 3.0),
                Reading::new("Lib", ts("2024-01-01", 0), 14.0),
                Reading::new("Lib", ts("2024-01-02", 0), 4.0),
                Reading::new("Lib", ts("2024-01-08", 0), 2.0),
            ]
        );
    }

    #[test]
    fn test_weekly_aggregates_average_per_week() {
        let weekly = calculate_weekly_aggregates(&sample()).unwrap();
        let rows = weekly.readings().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], Reading::new("Lib", ts("2024-01-07", 0), 6.0));
        assert_eq!(rows[2], Reading::new("Lib", ts("2024-01-14", 0), 2.0));
    }

    #[test]
    fn test_building_summary() {
        let summary = building_wise_summary(&sample()).unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].building, "Gym");
        let lib = &summary[1];
        assert_eq!(lib.total_kwh, 20.0);
        assert_eq!(lib.mean_kwh, 5.0);
        assert_eq!(lib.min_kwh, 2.0);
        assert_eq!(lib.max_kwh, 9.0);
        assert_eq!(lib.readings, 4);
    }

    #[test]
    fn test_empty_table_gives_empty_aggregates() {
        let empty = readings_table("combined", &[]);
        assert!(calculate_daily_totals(&empty).unwrap().is_empty());
        assert!(calculate_weekly_aggregates(&empty).unwrap().is_empty());
        assert!(building_wise_summary(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_missing_kwh_fails() {
        let table = Table::new("combined")
            .with_column(BUILDING, Column::Text(vec!["Lib".into()]))
            .unwrap()
            .with_column(TIMESTAMP, Column::Timestamp(vec![ts("2024-01-01", 8)]))
            .unwrap();
        let err = calculate_daily_totals(&table).unwrap_err();
        assert!(matches!(err, EnergyError::MissingColumn { ref column, .. } if column == "kwh"));
    }
}
