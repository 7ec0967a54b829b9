//! Error type shared by the ingest, aggregation, rendering and export stages.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the energy pipeline.
#[derive(Error, Debug)]
pub enum EnergyError {
    /// A table does not carry a column the operation needs.
    #[error("table '{table}' is missing required column '{column}'")]
    MissingColumn { table: String, column: String },

    /// A column exists but holds a different kind of value.
    #[error("column '{column}' in table '{table}' is not a {expected} column")]
    ColumnType {
        table: String,
        column: String,
        expected: &'static str,
    },

    /// A column was added whose length disagrees with the rest of the table.
    #[error("column '{column}' in table '{table}' has {actual} rows, expected {expected}")]
    ColumnLength {
        table: String,
        column: String,
        expected: usize,
        actual: usize,
    },

    /// Ingest found nothing usable.
    #[error("no readings found in {0}")]
    EmptyDataset(PathBuf),

    /// The output extension does not map to a known image format.
    #[error("unsupported output format for {0} (expected .png or .svg)")]
    UnsupportedFormat(PathBuf),

    /// Drawing into the in-memory figure failed.
    #[error("failed to render {panel}: {message}")]
    Render { panel: &'static str, message: String },

    /// Rasterizing or encoding the figure failed.
    #[error("failed to encode figure: {0}")]
    Encode(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl EnergyError {
    pub fn missing_column(table: &str, column: &str) -> Self {
        Self::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EnergyError>;
