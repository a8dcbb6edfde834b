//! Series catalog table (`series.parquet`).

use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use nowcast_panel::{Frequency, SeriesCatalog, SeriesMeta};
use tracing::debug;

use crate::error::IoError;
use crate::parquet_read::{read_batches, required_string, string_column, string_or_empty};
use crate::parquet_write::write_batches;
use crate::writer::WriterConfig;

const SERIES: &str = "series";
const LABEL: &str = "label";
const FREQ: &str = "freq";
const SECTOR: &str = "broad_sector";
const TOPIC: &str = "topic";

/// Reads the series catalog.
///
/// `series` and `freq` (`"M"` or `"Q"`) are required; `label`,
/// `broad_sector` and `topic` may be absent or null.
///
/// # Errors
///
/// | Variant | Trigger |
/// |---------|---------|
/// | [`IoError::FileNotFound`] | `path` does not exist |
/// | [`IoError::MissingColumn`] / [`IoError::ColumnType`] | `series` or `freq` missing or not Utf8 |
/// | [`IoError::Validation`] | null series id or frequency |
/// | [`IoError::Panel`] | unknown frequency code or duplicate series id |
pub fn read_catalog(path: &Path) -> Result<SeriesCatalog, IoError> {
    let batches = read_batches(path)?;
    let mut series = Vec::new();
    for batch in &batches {
        let ids = string_column(batch, SERIES, path)?;
        let freqs = string_column(batch, FREQ, path)?;
        let optional = |name: &str| match batch.column_by_name(name) {
            Some(_) => string_column(batch, name, path).map(Some),
            None => Ok(None),
        };
        let labels = optional(LABEL)?;
        let sectors = optional(SECTOR)?;
        let topics = optional(TOPIC)?;

        for row in 0..batch.num_rows() {
            let frequency: Frequency = required_string(freqs, FREQ, row)?.parse()?;
            let mut meta = SeriesMeta::new(required_string(ids, SERIES, row)?, frequency);
            if let Some(col) = labels {
                meta = meta.with_label(string_or_empty(col, row));
            }
            if let Some(col) = sectors {
                meta = meta.with_sector(string_or_empty(col, row));
            }
            if let Some(col) = topics {
                meta = meta.with_topic(string_or_empty(col, row));
            }
            series.push(meta);
        }
    }
    debug!(path = %path.display(), n_series = series.len(), "read series catalog");
    Ok(SeriesCatalog::new(series)?)
}

/// Writes `catalog` in the layout [`read_catalog`] expects.
///
/// # Errors
///
/// Returns [`IoError::Validation`] for an invalid `config`, or
/// [`IoError::Parquet`] if writing fails.
pub fn write_catalog(path: &Path, catalog: &SeriesCatalog, config: &WriterConfig) -> Result<(), IoError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(SERIES, DataType::Utf8, false),
        Field::new(LABEL, DataType::Utf8, false),
        Field::new(FREQ, DataType::Utf8, false),
        Field::new(SECTOR, DataType::Utf8, false),
        Field::new(TOPIC, DataType::Utf8, false),
    ]));
    let column = |f: &dyn Fn(&SeriesMeta) -> String| -> ArrayRef {
        Arc::new(StringArray::from(catalog.iter().map(f).collect::<Vec<_>>()))
    };
    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![
            column(&|m| m.id().to_string()),
            column(&|m| m.label().to_string()),
            column(&|m| m.frequency().to_string()),
            column(&|m| m.sector().to_string()),
            column(&|m| m.topic().to_string()),
        ],
    )?;
    write_batches(path, &[batch], schema, config.properties()?)
}
