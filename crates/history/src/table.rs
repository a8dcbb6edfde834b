//! Append-only history tables keyed by `(quarter, date)`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use nowcast_calendar::Quarter;
use tracing::debug;

use crate::error::HistoryError;
use crate::record::{NewsRecord, NowcastRecord};

/// A row that belongs to exactly one `(quarter, date)` key.
pub trait Record: Clone {
    /// `true` when at most one record may exist per key.
    const UNIQUE_PER_KEY: bool;

    /// Quarter the record refers to.
    fn quarter(&self) -> Quarter;

    /// Release date the record was produced for.
    fn date(&self) -> NaiveDate;

    /// Sort key.
    fn key(&self) -> (Quarter, NaiveDate) {
        (self.quarter(), self.date())
    }
}

impl Record for NowcastRecord {
    const UNIQUE_PER_KEY: bool = true;

    fn quarter(&self) -> Quarter {
        self.quarter
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl Record for NewsRecord {
    const UNIQUE_PER_KEY: bool = false;

    fn quarter(&self) -> Quarter {
        self.quarter
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Outcome of [`History::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppendSummary {
    /// Records inserted.
    pub added: usize,
    /// Previously stored records that were superseded.
    pub replaced: usize,
}

/// Table of records ordered by `(quarter, date)`.
///
/// Rows are never edited in place; appending a batch for a key that is
/// already present drops the stored rows of that key and inserts the batch.
/// Within one key, records keep their insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct History<R> {
    records: Vec<R>,
}

/// Nowcast history.
pub type NowcastHistory = History<NowcastRecord>;

/// News history.
pub type NewsHistory = History<NewsRecord>;

impl<R: Record> Default for History<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> History<R> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Builds a table from stored rows (e.g. read back from disk).
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::DuplicateRecord`] if a key that allows one
    /// record occurs more than once.
    pub fn from_records(mut records: Vec<R>) -> Result<Self, HistoryError> {
        records.sort_by_key(|r| r.key());
        if R::UNIQUE_PER_KEY {
            if let Some(w) = records.windows(2).find(|w| w[0].key() == w[1].key()) {
                return Err(HistoryError::DuplicateRecord {
                    key: format_key(w[1].key()),
                });
            }
        }
        Ok(Self { records })
    }

    /// Appends one batch, superseding any stored rows with the same key.
    ///
    /// An empty batch is a no-op; use [`History::replace`] to clear a key.
    ///
    /// # Errors
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Records with different `(quarter, date)` | [`HistoryError::MixedBatch`] |
    /// | Two records in a one-per-key table | [`HistoryError::DuplicateRecord`] |
    pub fn append(&mut self, batch: Vec<R>) -> Result<AppendSummary, HistoryError> {
        match batch.first() {
            Some(first) => {
                let key = first.key();
                self.replace(key, batch)
            }
            None => Ok(AppendSummary::default()),
        }
    }

    /// Replaces the stored rows of `key` with `batch`.
    ///
    /// An empty batch removes the key from the table.
    ///
    /// # Errors
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | A record whose `(quarter, date)` is not `key` | [`HistoryError::MixedBatch`] |
    /// | Two records in a one-per-key table | [`HistoryError::DuplicateRecord`] |
    pub fn replace(
        &mut self,
        key: (Quarter, NaiveDate),
        batch: Vec<R>,
    ) -> Result<AppendSummary, HistoryError> {
        if let Some(other) = batch.iter().find(|r| r.key() != key) {
            return Err(HistoryError::MixedBatch {
                first: format_key(key),
                other: format_key(other.key()),
            });
        }
        if R::UNIQUE_PER_KEY && batch.len() > 1 {
            return Err(HistoryError::DuplicateRecord {
                key: format_key(key),
            });
        }

        let before = self.records.len();
        self.records.retain(|r| r.key() != key);
        let replaced = before - self.records.len();
        let at = self.records.partition_point(|r| r.key() < key);
        let added = batch.len();
        self.records.splice(at..at, batch);
        debug!(key = %format_key(key), added, replaced, "replaced history rows");
        Ok(AppendSummary { added, replaced })
    }

    /// All records in `(quarter, date)` order.
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records for one quarter, oldest release first.
    pub fn for_quarter(&self, quarter: Quarter) -> impl Iterator<Item = &R> {
        self.records.iter().filter(move |r| r.quarter() == quarter)
    }

    /// Latest release date recorded for `quarter`.
    pub fn latest_date(&self, quarter: Quarter) -> Option<NaiveDate> {
        self.for_quarter(quarter).map(Record::date).max()
    }

    /// Consumes the table, returning its records.
    pub fn into_records(self) -> Vec<R> {
        self.records
    }
}

impl History<NowcastRecord> {
    /// Final nowcast per quarter: the record with the latest date.
    pub fn final_by_quarter(&self) -> BTreeMap<Quarter, &NowcastRecord> {
        let mut out = BTreeMap::new();
        for r in &self.records {
            // rows are sorted by date within a quarter
            out.insert(r.quarter, r);
        }
        out
    }
}

fn format_key((quarter, date): (Quarter, NaiveDate)) -> String {
    format!("{quarter} @ {date}")
}
