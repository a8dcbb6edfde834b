//! A release-dated snapshot of the monthly and quarterly panels.

use std::collections::HashSet;

use chrono::NaiveDate;
use nowcast_calendar::{Month, Period, Quarter};

use crate::error::PanelError;
use crate::panel::Panel;
use crate::series::Frequency;

/// The state of the data as known on one release date.
///
/// Vintages are ordered by [`Vintage::release_date`]; the vintage's
/// quarter is the quarter containing that date.
#[derive(Debug, Clone, PartialEq)]
pub struct Vintage {
    release_date: NaiveDate,
    monthly: Panel<Month>,
    quarterly: Panel<Quarter>,
}

impl Vintage {
    /// Creates a vintage from its two panels.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::DuplicateSeries`] if a series id appears in both
    /// panels.
    pub fn new(
        release_date: NaiveDate,
        monthly: Panel<Month>,
        quarterly: Panel<Quarter>,
    ) -> Result<Self, PanelError> {
        let monthly_ids: HashSet<&str> = monthly.columns().iter().map(String::as_str).collect();
        if let Some(dup) = quarterly
            .columns()
            .iter()
            .find(|c| monthly_ids.contains(c.as_str()))
        {
            return Err(PanelError::DuplicateSeries {
                series: dup.clone(),
            });
        }
        Ok(Self {
            release_date,
            monthly,
            quarterly,
        })
    }

    /// Release date of this vintage.
    pub fn release_date(&self) -> NaiveDate {
        self.release_date
    }

    /// Quarter containing the release date.
    pub fn quarter(&self) -> Quarter {
        Quarter::from_date(self.release_date)
    }

    /// Monthly panel.
    pub fn monthly(&self) -> &Panel<Month> {
        &self.monthly
    }

    /// Quarterly panel.
    pub fn quarterly(&self) -> &Panel<Quarter> {
        &self.quarterly
    }

    /// All series ids, monthly first, each in panel order.
    pub fn series_ids(&self) -> impl Iterator<Item = &str> {
        self.monthly
            .columns()
            .iter()
            .chain(self.quarterly.columns())
            .map(String::as_str)
    }

    /// Frequency of `id`, or `None` if the vintage does not carry it.
    pub fn frequency_of(&self, id: &str) -> Option<Frequency> {
        if self.monthly.column_index(id).is_some() {
            Some(Frequency::Monthly)
        } else if self.quarterly.column_index(id).is_some() {
            Some(Frequency::Quarterly)
        } else {
            None
        }
    }

    /// Non-missing observations of `id`, in period order.
    pub fn observations(&self, id: &str) -> Vec<f64> {
        let col = self
            .monthly
            .column(id)
            .or_else(|| self.quarterly.column(id));
        col.map_or_else(Vec::new, |c| {
            c.iter().copied().filter(|v| !v.is_nan()).collect()
        })
    }

    /// Returns a copy stamped with a different release date.
    pub fn with_release_date(&self, release_date: NaiveDate) -> Self {
        Self {
            release_date,
            ..self.clone()
        }
    }

    /// Returns a copy with one monthly observation set (or removed, if `NaN`).
    pub fn with_monthly_value(&self, month: Month, id: &str, value: f64) -> Result<Self, PanelError> {
        Ok(Self {
            monthly: self.monthly.with_value(month, id, value)?,
            ..self.clone()
        })
    }

    /// Returns a copy with one quarterly observation set (or removed, if `NaN`).
    pub fn with_quarterly_value(
        &self,
        quarter: Quarter,
        id: &str,
        value: f64,
    ) -> Result<Self, PanelError> {
        Ok(Self {
            quarterly: self.quarterly.with_value(quarter, id, value)?,
            ..self.clone()
        })
    }

    /// Returns a copy holding only the series for which `keep` is `true`.
    pub fn retain_series<F>(&self, keep: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        Self {
            release_date: self.release_date,
            monthly: self.monthly.select_columns(&keep),
            quarterly: self.quarterly.select_columns(&keep),
        }
    }

    /// Returns a copy without the periods before `start`.
    ///
    /// The quarterly panel keeps the quarter containing `start` only when
    /// `start` is that quarter's first month.
    pub fn since(&self, start: Month) -> Self {
        let first_quarter = if start.position_in_quarter() == 0 {
            start.quarter()
        } else {
            start.quarter().succ()
        };
        Self {
            release_date: self.release_date,
            monthly: trim_front(&self.monthly, start),
            quarterly: trim_front(&self.quarterly, first_quarter),
        }
    }

    pub(crate) fn map_panels<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&str, f64) -> f64,
    {
        let mcols = self.monthly.columns().to_vec();
        let qcols = self.quarterly.columns().to_vec();
        Self {
            release_date: self.release_date,
            monthly: self.monthly.map_observed(|j, v| f(&mcols[j], v)),
            quarterly: self.quarterly.map_observed(|j, v| f(&qcols[j], v)),
        }
    }
}

fn trim_front<P: Period>(panel: &Panel<P>, start: P) -> Panel<P> {
    match panel.end() {
        Some(end) if panel.start() < start => panel.reindexed(start, end.max(start.offset(-1))),
        _ => panel.clone(),
    }
}
