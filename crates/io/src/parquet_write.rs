//! Low-level Parquet column building.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::error::IoError;

/// Builds a wide table: a Utf8 key column followed by one nullable Float64
/// column per name. `NaN` values are written as nulls.
pub(crate) fn wide_batch(
    key: &str,
    labels: Vec<String>,
    columns: &[(String, Vec<f64>)],
) -> Result<RecordBatch, IoError> {
    let mut fields = vec![Field::new(key, DataType::Utf8, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(StringArray::from(labels))];
    for (name, values) in columns {
        fields.push(Field::new(name, DataType::Float64, true));
        let values: Vec<Option<f64>> = values
            .iter()
            .map(|v| if v.is_nan() { None } else { Some(*v) })
            .collect();
        arrays.push(Arc::new(Float64Array::from(values)));
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Writes a sequence of [`RecordBatch`]es to a Parquet file at `path`,
/// creating parent directories as needed.
///
/// # Errors
///
/// Returns [`IoError::Parquet`] if file creation, batch writing, or file
/// finalisation fails.
pub(crate) fn write_batches(
    path: &Path,
    batches: &[RecordBatch],
    schema: Arc<Schema>,
    props: WriterProperties,
) -> Result<(), IoError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| IoError::Parquet {
            reason: e.to_string(),
        })?;
    }
    let file = std::fs::File::create(path).map_err(|e| IoError::Parquet {
        reason: e.to_string(),
    })?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;

    for batch in batches {
        writer.write(batch)?;
    }

    writer.close()?;
    Ok(())
}
