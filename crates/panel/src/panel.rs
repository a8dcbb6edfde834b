//! Period-indexed panel of series with explicit missing values.

use std::collections::HashSet;

use ndarray::{Array2, ArrayView1, Axis};
use nowcast_calendar::{Period, period_range};

use crate::error::PanelError;

/// A contiguous, period-indexed matrix of observations.
///
/// Rows are consecutive periods starting at `start`, columns are series.
/// Missing observations are stored as `NaN`; infinities are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel<P> {
    start: P,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl<P: Period> Panel<P> {
    /// Creates a panel from a start period, column ids and a
    /// `(n_periods, n_series)` value matrix.
    ///
    /// # Errors
    ///
    /// | Variant | Trigger |
    /// |---------|---------|
    /// | [`PanelError::ShapeMismatch`] | `columns.len() != values.ncols()` |
    /// | [`PanelError::DuplicateSeries`] | a column id repeats |
    /// | [`PanelError::NonFiniteData`] | a value is infinite |
    pub fn new(start: P, columns: Vec<String>, values: Array2<f64>) -> Result<Self, PanelError> {
        if columns.len() != values.ncols() {
            return Err(PanelError::ShapeMismatch {
                columns: columns.len(),
                ncols: values.ncols(),
            });
        }
        let mut seen = HashSet::with_capacity(columns.len());
        for c in &columns {
            if !seen.insert(c.as_str()) {
                return Err(PanelError::DuplicateSeries { series: c.clone() });
            }
        }
        for (j, col) in values.axis_iter(Axis(1)).enumerate() {
            if col.iter().any(|v| v.is_infinite()) {
                return Err(PanelError::NonFiniteData {
                    series: columns[j].clone(),
                });
            }
        }
        Ok(Self {
            start,
            columns,
            values,
        })
    }

    /// A panel with the given columns and no rows.
    pub fn empty(start: P, columns: Vec<String>) -> Result<Self, PanelError> {
        let n = columns.len();
        Self::new(start, columns, Array2::zeros((0, n)))
    }

    /// First period of the panel.
    pub fn start(&self) -> P {
        self.start
    }

    /// Last period, or `None` when the panel has no rows.
    pub fn end(&self) -> Option<P> {
        match self.values.nrows() {
            0 => None,
            n => Some(self.start.offset(n as i64 - 1)),
        }
    }

    /// Number of periods (rows).
    pub fn n_periods(&self) -> usize {
        self.values.nrows()
    }

    /// Number of series (columns).
    pub fn n_series(&self) -> usize {
        self.values.ncols()
    }

    /// Column ids in storage order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The raw `(n_periods, n_series)` value matrix.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// All periods covered by the panel.
    pub fn periods(&self) -> Vec<P> {
        match self.end() {
            Some(end) => period_range(self.start, end),
            None => Vec::new(),
        }
    }

    /// Column position of `id`.
    pub fn column_index(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == id)
    }

    /// View of one column.
    pub fn column(&self, id: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(id).map(|j| self.values.column(j))
    }

    /// Row position of `period`, if inside the panel.
    pub fn row_index(&self, period: P) -> Option<usize> {
        let k = self.start.steps_to(period);
        (k >= 0 && (k as usize) < self.values.nrows()).then_some(k as usize)
    }

    /// Observed value of `id` at `period`; `None` when missing or out of range.
    pub fn get(&self, period: P, id: &str) -> Option<f64> {
        let i = self.row_index(period)?;
        let j = self.column_index(id)?;
        let v = self.values[[i, j]];
        (!v.is_nan()).then_some(v)
    }

    /// Number of non-missing observations of `id`.
    pub fn n_observed(&self, id: &str) -> usize {
        self.column(id)
            .map_or(0, |c| c.iter().filter(|v| !v.is_nan()).count())
    }

    /// Last period at which `id` is observed.
    pub fn last_observed(&self, id: &str) -> Option<P> {
        let col = self.column(id)?;
        col.iter()
            .rposition(|v| !v.is_nan())
            .map(|i| self.start.offset(i as i64))
    }

    /// Returns a copy with `value` stored at `(period, id)`.
    ///
    /// The panel is extended with missing rows when `period` lies outside
    /// its range. Passing `NaN` removes an observation.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::UnknownSeries`] if `id` is not a column, or
    /// [`PanelError::NonFiniteData`] for an infinite value.
    pub fn with_value(&self, period: P, id: &str, value: f64) -> Result<Self, PanelError> {
        let j = self
            .column_index(id)
            .ok_or_else(|| PanelError::UnknownSeries {
                series: id.to_string(),
            })?;
        if value.is_infinite() {
            return Err(PanelError::NonFiniteData {
                series: id.to_string(),
            });
        }
        let end = match self.end() {
            Some(end) if end >= period => end,
            _ => period,
        };
        let start = self.start.min(period);
        let mut out = self.reindexed(start, end);
        let i = start.steps_to(period) as usize;
        out.values[[i, j]] = value;
        Ok(out)
    }

    /// Copy of the panel re-indexed onto `[start, end]`; rows outside the
    /// original range are missing, rows outside the new range are dropped.
    pub fn reindexed(&self, start: P, end: P) -> Self {
        let n = (start.steps_to(end) + 1).max(0) as usize;
        let mut values = Array2::from_elem((n, self.n_series()), f64::NAN);
        for (i, row) in self.values.axis_iter(Axis(0)).enumerate() {
            let k = start.steps_to(self.start.offset(i as i64));
            if k >= 0 && (k as usize) < n {
                values.row_mut(k as usize).assign(&row);
            }
        }
        Self {
            start,
            columns: self.columns.clone(),
            values,
        }
    }

    /// Applies `f(column_id, value)` to every observed entry, keeping `NaN`s.
    pub(crate) fn map_observed<F>(&self, mut f: F) -> Self
    where
        F: FnMut(usize, f64) -> f64,
    {
        let mut values = self.values.clone();
        for (j, mut col) in values.axis_iter_mut(Axis(1)).enumerate() {
            col.mapv_inplace(|v| if v.is_nan() { v } else { f(j, v) });
        }
        Self {
            start: self.start,
            columns: self.columns.clone(),
            values,
        }
    }

    /// Keeps only the columns for which `keep` returns `true`.
    pub(crate) fn select_columns<F>(&self, keep: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let idx: Vec<usize> = (0..self.columns.len())
            .filter(|&j| keep(&self.columns[j]))
            .collect();
        Self {
            start: self.start,
            columns: idx.iter().map(|&j| self.columns[j].clone()).collect(),
            values: self.values.select(Axis(1), &idx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use nowcast_calendar::Month;

    fn m(y: i32, mo: u8) -> Month {
        Month::new(y, mo).unwrap()
    }

    fn panel() -> Panel<Month> {
        Panel::new(
            m(2020, 1),
            vec!["A".into(), "B".into()],
            array![[1.0, f64::NAN], [2.0, 5.0], [f64::NAN, 6.0]],
        )
        .unwrap()
    }

    #[test]
    fn accessors() {
        let p = panel();
        assert_eq!(p.start(), m(2020, 1));
        assert_eq!(p.end(), Some(m(2020, 3)));
        assert_eq!(p.n_periods(), 3);
        assert_eq!(p.n_series(), 2);
        assert_eq!(p.get(m(2020, 2), "B"), Some(5.0));
        assert_eq!(p.get(m(2020, 1), "B"), None);
        assert_eq!(p.get(m(2021, 1), "A"), None);
        assert_eq!(p.n_observed("A"), 2);
        assert_eq!(p.last_observed("A"), Some(m(2020, 2)));
        assert_eq!(p.last_observed("C"), None);
    }

    #[test]
    fn shape_mismatch() {
        let err = Panel::new(m(2020, 1), vec!["A".into()], array![[1.0, 2.0]]).unwrap_err();
        assert_eq!(
            err,
            PanelError::ShapeMismatch {
                columns: 1,
                ncols: 2
            }
        );
    }

    #[test]
    fn infinite_rejected() {
        let err = Panel::new(m(2020, 1), vec!["A".into()], array![[f64::INFINITY]]).unwrap_err();
        assert!(matches!(err, PanelError::NonFiniteData { .. }));
    }

    #[test]
    fn with_value_extends_forward() {
        let p = panel().with_value(m(2020, 5), "A", 9.0).unwrap();
        assert_eq!(p.n_periods(), 5);
        assert_eq!(p.get(m(2020, 5), "A"), Some(9.0));
        assert_eq!(p.get(m(2020, 4), "A"), None);
        assert_eq!(p.get(m(2020, 2), "B"), Some(5.0));
    }

    #[test]
    fn with_value_extends_backward() {
        let p = panel().with_value(m(2019, 12), "B", -1.0).unwrap();
        assert_eq!(p.start(), m(2019, 12));
        assert_eq!(p.get(m(2019, 12), "B"), Some(-1.0));
        assert_eq!(p.get(m(2020, 1), "A"), Some(1.0));
    }

    #[test]
    fn with_value_unknown_series() {
        assert!(matches!(
            panel().with_value(m(2020, 1), "Z", 1.0),
            Err(PanelError::UnknownSeries { .. })
        ));
    }

    #[test]
    fn reindex_truncates_and_pads() {
        let p = panel().reindexed(m(2020, 2), m(2020, 4));
        assert_eq!(p.n_periods(), 3);
        assert_eq!(p.get(m(2020, 2), "A"), Some(2.0));
        assert_eq!(p.get(m(2020, 1), "A"), None);
        assert!(p.values().row(2).iter().all(|v| v.is_nan()));
    }
}
