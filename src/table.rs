//! Column-oriented tables with named, typed columns.
//!
//! Every stage of the pipeline passes readings around as a [`Table`] so that a
//! missing or mistyped column is reported by name instead of producing a
//! silently wrong chart.

use crate::error::{EnergyError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const BUILDING: &str = "building";
pub const TIMESTAMP: &str = "timestamp";
pub const KWH: &str = "kwh";

/// The three columns every readings-shaped table carries.
pub const READING_COLUMNS: [&str; 3] = [BUILDING, TIMESTAMP, KWH];

/// A single meter reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub building: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub kwh: f64,
}

impl Reading {
    pub fn new(building: impl Into<String>, timestamp: NaiveDateTime, kwh: f64) -> Self {
        Self {
            building: building.into(),
            timestamp,
            kwh,
        }
    }
}

/// Values of one column
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Text(Vec<String>),
    Timestamp(Vec<NaiveDateTime>),
    Float(Vec<f64>),
}

impl Column {
    fn len(&self) -> usize {
        match self {
            Column::Text(v) => v.len(),
            Column::Timestamp(v) => v.len(),
            Column::Float(v) => v.len(),
        }
    }

    fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Text(v) => Column::Text(indices.iter().map(|&i| v[i].clone()).collect()),
            Column::Timestamp(v) => Column::Timestamp(indices.iter().map(|&i| v[i]).collect()),
            Column::Float(v) => Column::Float(indices.iter().map(|&i| v[i]).collect()),
        }
    }
}

/// An immutable, named table
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<(String, Column)>,
    rows: usize,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: 0,
        }
    }

    /// Append a column. Its length must match the columns already present.
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        if !self.columns.is_empty() && column.len() != self.rows {
            return Err(EnergyError::ColumnLength {
                table: self.name,
                column: name,
                expected: self.rows,
                actual: column.len(),
            });
        }
        self.rows = column.len();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = column,
            None => self.columns.push((name, column)),
        }
        Ok(self)
    }

    /// Build a `building`/`timestamp`/`kwh` table from typed readings.
    pub fn from_readings<'a, I>(name: impl Into<String>, readings: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Reading>,
    {
        let mut buildings = Vec::new();
        let mut timestamps = Vec::new();
        let mut kwh = Vec::new();
        for r in readings {
            buildings.push(r.building.clone());
            timestamps.push(r.timestamp);
            kwh.push(r.kwh);
        }
        Table::new(name)
            .with_column(BUILDING, Column::Text(buildings))?
            .with_column(TIMESTAMP, Column::Timestamp(timestamps))?
            .with_column(KWH, Column::Float(kwh))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| EnergyError::missing_column(&self.name, name))
    }

    /// Fail on the first of `names` that is not present.
    pub fn require(&self, names: &[&str]) -> Result<()> {
        for name in names {
            self.column(name)?;
        }
        Ok(())
    }

    pub fn text(&self, name: &str) -> Result<&[String]> {
        match self.column(name)? {
            Column::Text(v) => Ok(v),
            _ => Err(self.type_error(name, "text")),
        }
    }

    pub fn timestamps(&self, name: &str) -> Result<&[NaiveDateTime]> {
        match self.column(name)? {
            Column::Timestamp(v) => Ok(v),
            _ => Err(self.type_error(name, "timestamp")),
        }
    }

    pub fn floats(&self, name: &str) -> Result<&[f64]> {
        match self.column(name)? {
            Column::Float(v) => Ok(v),
            _ => Err(self.type_error(name, "numeric")),
        }
    }

    /// Rows at `indices`, in that order, across every column.
    pub fn take(&self, indices: &[usize]) -> Table {
        Table {
            name: self.name.clone(),
            columns: self
                .columns
                .iter()
                .map(|(n, c)| (n.clone(), c.take(indices)))
                .collect(),
            rows: indices.len(),
        }
    }

    /// Same table under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Typed view of the `building`/`timestamp`/`kwh` columns.
    pub fn readings(&self) -> Result<Vec<Reading>> {
        let buildings = self.text(BUILDING)?;
        let timestamps = self.timestamps(TIMESTAMP)?;
        let kwh = self.floats(KWH)?;
        Ok(buildings
            .iter()
            .zip(timestamps)
            .zip(kwh)
            .map(|((b, t), k)| Reading::new(b.clone(), *t, *k))
            .collect())
    }

    fn type_error(&self, column: &str, expected: &'static str) -> EnergyError {
        EnergyError::ColumnType {
            table: self.name.clone(),
            column: column.to_string(),
            expected,
        }
    }
}

/// `%Y-%m-%d %H:%M:%S` on the way out, any accepted layout on the way in.
pub mod timestamp_format {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    const LAYOUTS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];

    /// Parse the timestamp layouts found in meter exports.
    pub fn parse(s: &str) -> Option<NaiveDateTime> {
        let s = s.trim();
        for layout in LAYOUTS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(s, layout) {
                return Some(ts);
            }
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Some(ts.naive_utc());
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{s}'")))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub(crate) fn ts(date: &str, hour: u32) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    pub(crate) fn readings_table(name: &str, rows: &[(&str, NaiveDateTime, f64)]) -> Table {
        let readings: Vec<Reading> = rows
            .iter()
            .map(|(b, t, k)| Reading::new(*b, *t, *k))
            .collect();
        Table::from_readings(name, &readings).unwrap()
    }

    #[test]
    fn test_missing_column_is_reported_by_name() {
        let table = Table::new("weekly")
            .with_column(BUILDING, Column::Text(vec!["Lib".into()]))
            .unwrap();
        let err = table.floats(KWH).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("kwh"));
        assert!(msg.contains("weekly"));
    }

    #[test]
    fn test_wrong_column_type() {
        let table = Table::new("daily")
            .with_column(KWH, Column::Text(vec!["high".into()]))
            .unwrap();
        assert!(matches!(
            table.floats(KWH),
            Err(EnergyError::ColumnType { expected: "numeric", .. })
        ));
    }

    #[test]
    fn test_column_length_mismatch() {
        let result = Table::new("t")
            .with_column(BUILDING, Column::Text(vec!["a".into(), "b".into()]))
            .unwrap()
            .with_column(KWH, Column::Float(vec![1.0]));
        assert!(matches!(result, Err(EnergyError::ColumnLength { expected: 2, actual: 1, .. })));
    }

    #[test]
    fn test_with_column_replaces_same_name() {
        let table = Table::new("t")
            .with_column(KWH, Column::Float(vec![1.0, 2.0]))
            .unwrap()
            .with_column(KWH, Column::Float(vec![3.0, 4.0]))
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.floats(KWH).unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_from_readings_empty_is_empty_table() {
        let rows: Vec<Reading> = Vec::new();
        let table = Table::from_readings("daily", &rows).unwrap();
        assert!(table.is_empty());
        table.require(&READING_COLUMNS).unwrap();
    }

    #[test]
    fn test_take_selects_rows_in_order() {
        let table = readings_table(
            "combined",
            &[
                ("Lib", ts("2024-01-01", 8), 5.0),
                ("Gym", ts("2024-01-01", 9), 3.0),
                ("Lab", ts("2024-01-01", 10), 7.0),
            ],
        );
        let picked = table.take(&[2, 0]);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked.text(BUILDING).unwrap(), &["Lab".to_string(), "Lib".to_string()]);
        assert_eq!(picked.floats(KWH).unwrap(), &[7.0, 5.0]);
    }

    #[test]
    fn test_readings_round_trip_through_table() {
        let rows = vec![Reading::new("Lib", ts("2024-01-01", 8), 5.0)];
        let table = Table::from_readings("combined", &rows).unwrap();
        assert_eq!(table.readings().unwrap(), rows);
        table.require(&READING_COLUMNS).unwrap();
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let expected = ts("2024-01-01", 8);
        assert_eq!(timestamp_format::parse("2024-01-01 08:00:00"), Some(expected));
        assert_eq!(timestamp_format::parse("2024-01-01T08:00"), Some(expected));
        assert_eq!(timestamp_format::parse("2024-01-01T08:00:00Z"), Some(expected));
        assert_eq!(timestamp_format::parse("2024-01-01"), Some(ts("2024-01-01", 0)));
        assert_eq!(timestamp_format::parse("yesterday"), None);
    }
}
