//! Nowcast and news history tables (`nowcast.parquet`, `news.parquet`).
//!
//! Both tables are rewritten in full after every merge; appending and
//! superseding rows is the job of [`nowcast_history::History`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::NaiveDate;
use nowcast_history::{NewsHistory, NewsRecord, NowcastHistory, NowcastRecord};
use tracing::debug;

use crate::error::IoError;
use crate::parquet_read::{float_column, read_batches, required_string, string_column, string_or_empty, value_columns};
use crate::parquet_write::write_batches;
use crate::writer::WriterConfig;

const DATE: &str = "date";
const QUARTER: &str = "quarter";
const DATE_FORMAT: &str = "%Y-%m-%d";

const NEWS_TEXT: [&str; 6] = [
    "impact_date",
    "updated_variable",
    "update_date",
    "update_kind",
    "impacted_variable",
    "broad_sector",
];
const NEWS_VALUES: [&str; 5] = ["observed", "forecast", "news", "weight", "impact"];
const TOPIC: &str = "topic";

fn parse_date(label: &str) -> Result<NaiveDate, IoError> {
    NaiveDate::parse_from_str(label, DATE_FORMAT).map_err(|e| IoError::Validation {
        count: 1,
        details: format!("invalid date '{label}': {e}"),
    })
}

fn text(values: Vec<String>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

fn numbers(values: Vec<f64>) -> ArrayRef {
    Arc::new(Float64Array::from(values))
}

/// Writes the nowcast history: `date`, `quarter`, then one Float64 column
/// per target variable (null where a record has no value for it).
///
/// # Errors
///
/// Returns [`IoError::Validation`] for an invalid `config`, or
/// [`IoError::Parquet`] if writing fails.
pub fn write_nowcast_history(
    path: &Path,
    history: &NowcastHistory,
    config: &WriterConfig,
) -> Result<(), IoError> {
    let records = history.records();
    let variables: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.values.keys().map(String::as_str))
        .collect();

    let mut fields = vec![
        Field::new(DATE, DataType::Utf8, false),
        Field::new(QUARTER, DataType::Utf8, false),
    ];
    let mut columns = vec![
        text(records.iter().map(|r| r.date.format(DATE_FORMAT).to_string()).collect()),
        text(records.iter().map(|r| r.quarter.to_string()).collect()),
    ];
    for var in &variables {
        fields.push(Field::new(*var, DataType::Float64, true));
        let values: Vec<Option<f64>> = records.iter().map(|r| r.values.get(*var).copied()).collect();
        columns.push(Arc::new(Float64Array::from(values)));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(Arc::clone(&schema), columns)?;
    write_batches(path, &[batch], schema, config.properties()?)?;
    debug!(path = %path.display(), rows = records.len(), "wrote nowcast history");
    Ok(())
}

/// Reads a nowcast history written by [`write_nowcast_history`].
///
/// # Errors
///
/// | Variant | Trigger |
/// |---------|---------|
/// | [`IoError::FileNotFound`] | `path` does not exist |
/// | [`IoError::MissingColumn`] / [`IoError::ColumnType`] | schema does not match |
/// | [`IoError::Validation`] | null key or malformed date |
/// | [`IoError::Calendar`] | malformed quarter |
/// | [`IoError::History`] | two rows share a date and quarter |
pub fn read_nowcast_history(path: &Path) -> Result<NowcastHistory, IoError> {
    let batches = read_batches(path)?;
    let mut records = Vec::new();
    for batch in &batches {
        let dates = string_column(batch, DATE, path)?;
        let quarters = string_column(batch, QUARTER, path)?;
        let variables: Vec<(String, &Float64Array)> = value_columns(batch, DATE)
            .into_iter()
            .filter(|name| name != QUARTER)
            .map(|name| float_column(batch, &name, path).map(|col| (name, col)))
            .collect::<Result<_, _>>()?;

        for row in 0..batch.num_rows() {
            let values: BTreeMap<String, f64> = variables
                .iter()
                .filter(|(_, col)| col.is_valid(row))
                .map(|(name, col)| (name.clone(), col.value(row)))
                .collect();
            records.push(NowcastRecord {
                date: parse_date(required_string(dates, DATE, row)?)?,
                quarter: required_string(quarters, QUARTER, row)?.parse()?,
                values,
            });
        }
    }
    Ok(NowcastHistory::from_records(records)?)
}

/// Writes the news history, one row per [`NewsRecord`].
///
/// Periods are written as `YYYY-MM` / `YYYYQn` labels and the update kind as
/// `release`, `revision` or `withdrawal`.
///
/// # Errors
///
/// Returns [`IoError::Validation`] for an invalid `config`, or
/// [`IoError::Parquet`] if writing fails.
pub fn write_news_history(path: &Path, history: &NewsHistory, config: &WriterConfig) -> Result<(), IoError> {
    let records = history.records();
    let mut fields = vec![
        Field::new(DATE, DataType::Utf8, false),
        Field::new(QUARTER, DataType::Utf8, false),
    ];
    fields.extend(NEWS_TEXT[..5].iter().map(|n| Field::new(*n, DataType::Utf8, false)));
    fields.extend(NEWS_VALUES.iter().map(|n| Field::new(*n, DataType::Float64, false)));
    fields.push(Field::new(NEWS_TEXT[5], DataType::Utf8, false));
    fields.push(Field::new(TOPIC, DataType::Utf8, false));

    let strings = |f: fn(&NewsRecord) -> String| text(records.iter().map(f).collect());
    let floats = |f: fn(&NewsRecord) -> f64| numbers(records.iter().map(f).collect());
    let columns = vec![
        strings(|r| r.date.format(DATE_FORMAT).to_string()),
        strings(|r| r.quarter.to_string()),
        strings(|r| r.impact_date.to_string()),
        strings(|r| r.updated_variable.clone()),
        strings(|r| r.update_date.to_string()),
        strings(|r| r.update_kind.to_string()),
        strings(|r| r.impacted_variable.clone()),
        floats(|r| r.observed),
        floats(|r| r.forecast),
        floats(|r| r.news),
        floats(|r| r.weight),
        floats(|r| r.impact),
        strings(|r| r.sector.clone()),
        strings(|r| r.topic.clone()),
    ];

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(Arc::clone(&schema), columns)?;
    write_batches(path, &[batch], schema, config.properties()?)?;
    debug!(path = %path.display(), rows = records.len(), "wrote news history");
    Ok(())
}

/// Reads a news history written by [`write_news_history`].
///
/// # Errors
///
/// | Variant | Trigger |
/// |---------|---------|
/// | [`IoError::FileNotFound`] | `path` does not exist |
/// | [`IoError::MissingColumn`] / [`IoError::ColumnType`] | schema does not match |
/// | [`IoError::Validation`] | null key or malformed date |
/// | [`IoError::Calendar`] | malformed period label |
/// | [`IoError::History`] | unknown update kind |
pub fn read_news_history(path: &Path) -> Result<NewsHistory, IoError> {
    let batches = read_batches(path)?;
    let mut records = Vec::new();
    for batch in &batches {
        let dates = string_column(batch, DATE, path)?;
        let quarters = string_column(batch, QUARTER, path)?;
        let utf8 = |name: &str| string_column(batch, name, path);
        let float64 = |name: &str| float_column(batch, name, path);
        let (impact_dates, updated, update_dates, kinds, impacted) = (
            utf8(NEWS_TEXT[0])?,
            utf8(NEWS_TEXT[1])?,
            utf8(NEWS_TEXT[2])?,
            utf8(NEWS_TEXT[3])?,
            utf8(NEWS_TEXT[4])?,
        );
        let (sectors, topics) = (utf8(NEWS_TEXT[5])?, utf8(TOPIC)?);
        let (observed, forecast, news, weight, impact) = (
            float64(NEWS_VALUES[0])?,
            float64(NEWS_VALUES[1])?,
            float64(NEWS_VALUES[2])?,
            float64(NEWS_VALUES[3])?,
            float64(NEWS_VALUES[4])?,
        );

        for row in 0..batch.num_rows() {
            records.push(NewsRecord {
                date: parse_date(required_string(dates, DATE, row)?)?,
                quarter: required_string(quarters, QUARTER, row)?.parse()?,
                impact_date: required_string(impact_dates, NEWS_TEXT[0], row)?.parse()?,
                updated_variable: required_string(updated, NEWS_TEXT[1], row)?.to_string(),
                update_date: required_string(update_dates, NEWS_TEXT[2], row)?.parse()?,
                update_kind: required_string(kinds, NEWS_TEXT[3], row)?.parse()?,
                impacted_variable: required_string(impacted, NEWS_TEXT[4], row)?.to_string(),
                observed: observed.value(row),
                forecast: forecast.value(row),
                news: news.value(row),
                weight: weight.value(row),
                impact: impact.value(row),
                sector: string_or_empty(sectors, row).to_string(),
                topic: string_or_empty(topics, row).to_string(),
            });
        }
    }
    Ok(NewsHistory::from_records(records)?)
}
