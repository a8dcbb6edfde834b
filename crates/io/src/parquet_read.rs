//! Low-level Parquet reading and column extraction.

use std::path::Path;

use arrow::array::{Array, AsArray, Float64Array, RecordBatch, StringArray};
use arrow::datatypes::Float64Type;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::IoError;

/// Reads all record batches from a Parquet file.
///
/// # Errors
///
/// Returns [`IoError::FileNotFound`] if the file does not exist, or
/// [`IoError::Parquet`] if the file cannot be opened or read.
pub(crate) fn read_batches(path: &Path) -> Result<Vec<RecordBatch>, IoError> {
    if !path.exists() {
        return Err(IoError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let file = std::fs::File::open(path).map_err(|e| IoError::Parquet {
        reason: e.to_string(),
    })?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let reader = builder.build()?;

    let batches: Vec<RecordBatch> = reader.collect::<Result<Vec<_>, _>>()?;

    Ok(batches)
}

/// Names of the columns in `batch` other than `key`, in schema order.
pub(crate) fn value_columns(batch: &RecordBatch, key: &str) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|name| name != key)
        .collect()
}

/// Borrows the Utf8 column `name` of `batch`.
///
/// # Errors
///
/// [`IoError::MissingColumn`] if absent, [`IoError::ColumnType`] if the
/// column is not Utf8.
pub(crate) fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a StringArray, IoError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| IoError::MissingColumn {
            name: name.to_string(),
            path: path.to_path_buf(),
        })?
        .as_string_opt::<i32>()
        .ok_or_else(|| IoError::ColumnType {
            name: name.to_string(),
            expected: "Utf8",
            path: path.to_path_buf(),
        })
}

/// Borrows the Float64 column `name` of `batch`.
///
/// # Errors
///
/// [`IoError::MissingColumn`] if absent, [`IoError::ColumnType`] if the
/// column is not Float64.
pub(crate) fn float_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a Float64Array, IoError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| IoError::MissingColumn {
            name: name.to_string(),
            path: path.to_path_buf(),
        })?
        .as_primitive_opt::<Float64Type>()
        .ok_or_else(|| IoError::ColumnType {
            name: name.to_string(),
            expected: "Float64",
            path: path.to_path_buf(),
        })
}

/// Value at `row`, with nulls read as `NaN`.
pub(crate) fn float_or_nan(col: &Float64Array, row: usize) -> f64 {
    if col.is_null(row) {
        f64::NAN
    } else {
        col.value(row)
    }
}

/// Value at `row`, with nulls read as the empty string.
pub(crate) fn string_or_empty(col: &StringArray, row: usize) -> &str {
    if col.is_null(row) { "" } else { col.value(row) }
}

/// Non-null value at `row`.
///
/// # Errors
///
/// Returns [`IoError::Validation`] naming the column and row if the entry
/// is null.
pub(crate) fn required_string<'a>(
    col: &'a StringArray,
    name: &str,
    row: usize,
) -> Result<&'a str, IoError> {
    if col.is_null(row) {
        return Err(IoError::Validation {
            count: 1,
            details: format!("null '{name}' in row {row}"),
        });
    }
    Ok(col.value(row))
}
