//! Error types for nowcast-io.

use std::path::PathBuf;

/// Error type for all fallible operations in the nowcast-io crate.
///
/// Covers missing files, Parquet and Arrow failures, schema problems in the
/// input tables, and errors raised while turning rows into panels, catalogs
/// or history tables.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when a required file or directory does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path that could not be found.
        path: PathBuf,
    },

    /// Wraps an error originating from the Parquet or Arrow libraries, or
    /// from the file system while reading or writing a table.
    #[error("parquet error: {reason}")]
    Parquet {
        /// Description of the underlying failure.
        reason: String,
    },

    /// Returned when a required column is absent from a table.
    #[error("column '{name}' not found in {}", path.display())]
    MissingColumn {
        /// Name of the missing column.
        name: String,
        /// Path to the file that was inspected.
        path: PathBuf,
    },

    /// Returned when a column has an unexpected Arrow type.
    #[error("column '{name}' in {} must be {expected}", path.display())]
    ColumnType {
        /// Name of the offending column.
        name: String,
        /// Expected Arrow type.
        expected: &'static str,
        /// Path to the file that was inspected.
        path: PathBuf,
    },

    /// Returned when a table's rows are inconsistent (duplicate periods,
    /// null keys, unparseable labels).
    #[error("{count} validation error(s): {details}")]
    Validation {
        /// Number of accumulated validation failures.
        count: usize,
        /// Human-readable summary of the failures.
        details: String,
    },

    /// Returned when a vintage directory name is not a `YYYY-MM-DD` date.
    #[error("vintage directory '{name}' is not a release date (expected YYYY-MM-DD)")]
    InvalidVintageName {
        /// Directory name that failed to parse.
        name: String,
    },

    /// Wraps an error originating from the nowcast-calendar crate.
    #[error("calendar error: {reason}")]
    Calendar {
        /// Description of the underlying calendar failure.
        reason: String,
    },

    /// Wraps an error originating from the nowcast-panel crate.
    #[error("panel error: {reason}")]
    Panel {
        /// Description of the underlying panel failure.
        reason: String,
    },

    /// Wraps an error originating from the nowcast-history crate.
    #[error("history error: {reason}")]
    History {
        /// Description of the underlying history failure.
        reason: String,
    },
}

impl From<parquet::errors::ParquetError> for IoError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        IoError::Parquet {
            reason: e.to_string(),
        }
    }
}

impl From<arrow::error::ArrowError> for IoError {
    fn from(e: arrow::error::ArrowError) -> Self {
        IoError::Parquet {
            reason: e.to_string(),
        }
    }
}

impl From<nowcast_calendar::CalendarError> for IoError {
    fn from(e: nowcast_calendar::CalendarError) -> Self {
        IoError::Calendar {
            reason: e.to_string(),
        }
    }
}

impl From<nowcast_panel::PanelError> for IoError {
    fn from(e: nowcast_panel::PanelError) -> Self {
        IoError::Panel {
            reason: e.to_string(),
        }
    }
}

impl From<nowcast_history::HistoryError> for IoError {
    fn from(e: nowcast_history::HistoryError) -> Self {
        IoError::History {
            reason: e.to_string(),
        }
    }
}
