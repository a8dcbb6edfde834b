//! Vintage directories: discovery, reading and writing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use ndarray::{Array2, Axis};
use nowcast_calendar::{CalendarError, Month, Period, Quarter};
use nowcast_panel::{Panel, Vintage};
use tracing::{debug, info};

use crate::error::IoError;
use crate::parquet_read::{float_column, float_or_nan, read_batches, required_string, string_column, value_columns};
use crate::parquet_write::{wide_batch, write_batches};
use crate::writer::WriterConfig;

const MONTHLY_FILE: &str = "monthly.parquet";
const QUARTERLY_FILE: &str = "quarterly.parquet";
const MONTH_KEY: &str = "date";
const QUARTER_KEY: &str = "quarter";
const DIR_FORMAT: &str = "%Y-%m-%d";

/// A vintage directory found under a data root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VintageEntry {
    release_date: NaiveDate,
    path: PathBuf,
}

impl VintageEntry {
    /// Release date parsed from the directory name.
    pub fn release_date(&self) -> NaiveDate {
        self.release_date
    }

    /// Path of the vintage directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Lists the vintage directories under `root`, oldest release first.
///
/// Only sub-directories named `YYYY-MM-DD` are vintages; other entries are
/// skipped.
///
/// # Errors
///
/// Returns [`IoError::FileNotFound`] if `root` is not a directory, or
/// [`IoError::Parquet`] if it cannot be listed.
pub fn list_vintages(root: &Path) -> Result<Vec<VintageEntry>, IoError> {
    if !root.is_dir() {
        return Err(IoError::FileNotFound {
            path: root.to_path_buf(),
        });
    }
    let io_err = |e: std::io::Error| IoError::Parquet {
        reason: format!("{}: {e}", root.display()),
    };

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(root).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_dir() {
            continue;
        }
        match release_date_of(&path) {
            Ok(release_date) => entries.push(VintageEntry { release_date, path }),
            Err(_) => debug!(path = %path.display(), "skipping non-vintage directory"),
        }
    }
    entries.sort();
    info!(root = %root.display(), n_vintages = entries.len(), "listed vintages");
    Ok(entries)
}

/// Reads the vintage stored in `dir`.
///
/// The release date comes from the directory name. `monthly.parquet` is
/// required; a missing `quarterly.parquet` yields an empty quarterly panel.
/// Rows may arrive in any order and with gaps: the panels span the first
/// to the last period present, with absent periods missing.
///
/// # Errors
///
/// | Variant | Trigger |
/// |---------|---------|
/// | [`IoError::InvalidVintageName`] | directory name is not `YYYY-MM-DD` |
/// | [`IoError::FileNotFound`] | `monthly.parquet` is absent |
/// | [`IoError::MissingColumn`] / [`IoError::ColumnType`] | key column absent, or a value column not Float64 |
/// | [`IoError::Calendar`] | a period label does not parse |
/// | [`IoError::Validation`] | a period appears twice, or a key is null |
/// | [`IoError::Panel`] | a series appears in both files, or holds infinite values |
#[tracing::instrument(skip_all, fields(dir = %dir.display()))]
pub fn read_vintage(dir: &Path) -> Result<Vintage, IoError> {
    let release_date = release_date_of(dir)?;
    let monthly = read_panel::<Month>(&dir.join(MONTHLY_FILE), MONTH_KEY, Month::from_date(release_date))?;
    let quarterly_path = dir.join(QUARTERLY_FILE);
    let quarterly = if quarterly_path.exists() {
        read_panel::<Quarter>(&quarterly_path, QUARTER_KEY, Quarter::from_date(release_date))?
    } else {
        debug!("no quarterly file");
        Panel::empty(Quarter::from_date(release_date), Vec::new())?
    };
    debug!(
        n_monthly = monthly.n_series(),
        n_quarterly = quarterly.n_series(),
        "read vintage"
    );
    Ok(Vintage::new(release_date, monthly, quarterly)?)
}

/// Writes `vintage` under `root/<release date>/` and returns that directory.
///
/// # Errors
///
/// Returns [`IoError::Validation`] for an invalid `config`, or
/// [`IoError::Parquet`] if writing fails.
pub fn write_vintage(root: &Path, vintage: &Vintage, config: &WriterConfig) -> Result<PathBuf, IoError> {
    let dir = root.join(vintage.release_date().format(DIR_FORMAT).to_string());
    write_panel(&dir.join(MONTHLY_FILE), MONTH_KEY, vintage.monthly(), config)?;
    write_panel(&dir.join(QUARTERLY_FILE), QUARTER_KEY, vintage.quarterly(), config)?;
    Ok(dir)
}

fn release_date_of(dir: &Path) -> Result<NaiveDate, IoError> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    NaiveDate::parse_from_str(name, DIR_FORMAT).map_err(|_| IoError::InvalidVintageName {
        name: name.to_string(),
    })
}

fn read_panel<P>(path: &Path, key: &str, fallback_start: P) -> Result<Panel<P>, IoError>
where
    P: Period + FromStr<Err = CalendarError>,
{
    let batches = read_batches(path)?;
    let columns = batches
        .first()
        .map(|b| value_columns(b, key))
        .unwrap_or_default();

    let mut rows: BTreeMap<P, Vec<f64>> = BTreeMap::new();
    let mut duplicates = Vec::new();
    for batch in &batches {
        let keys = string_column(batch, key, path)?;
        let values = columns
            .iter()
            .map(|c| float_column(batch, c, path))
            .collect::<Result<Vec<_>, _>>()?;
        for row in 0..batch.num_rows() {
            let period: P = required_string(keys, key, row)?.parse()?;
            let obs = values.iter().map(|col| float_or_nan(col, row)).collect();
            if rows.insert(period, obs).is_some() {
                duplicates.push(format!("duplicate {key} {period}"));
            }
        }
    }
    if !duplicates.is_empty() {
        return Err(IoError::Validation {
            count: duplicates.len(),
            details: duplicates.join("; "),
        });
    }

    let (Some(&start), Some(&end)) = (rows.keys().next(), rows.keys().next_back()) else {
        return Ok(Panel::empty(fallback_start, columns)?);
    };
    let n = start.steps_to(end) as usize + 1;
    let mut values = Array2::from_elem((n, columns.len()), f64::NAN);
    for (period, obs) in rows {
        let t = start.steps_to(period) as usize;
        for (j, v) in obs.into_iter().enumerate() {
            values[[t, j]] = v;
        }
    }
    Ok(Panel::new(start, columns, values)?)
}

fn write_panel<P: Period>(
    path: &Path,
    key: &str,
    panel: &Panel<P>,
    config: &WriterConfig,
) -> Result<(), IoError> {
    let labels = panel.periods().iter().map(ToString::to_string).collect();
    let columns: Vec<(String, Vec<f64>)> = panel
        .columns()
        .iter()
        .zip(panel.values().axis_iter(Axis(1)))
        .map(|(id, col)| (id.clone(), col.to_vec()))
        .collect();
    let batch = wide_batch(key, labels, &columns)?;
    let schema = batch.schema();
    write_batches(path, &[batch], schema, config.properties()?)
}
