//! Rows of the nowcast and news tables.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use nowcast_calendar::{Month, Quarter};

use crate::error::HistoryError;

/// Nowcast of the target variables for one quarter, as of one release date.
#[derive(Debug, Clone, PartialEq)]
pub struct NowcastRecord {
    /// Release date of the vintage.
    pub date: NaiveDate,
    /// Quarter being nowcast.
    pub quarter: Quarter,
    /// Predicted value per target variable, in original units.
    pub values: BTreeMap<String, f64>,
}

/// What moved a forecast between two vintages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateKind {
    /// Missing before, observed now.
    Release,
    /// Observed in both vintages with a different value.
    Revision,
    /// Observed before, missing now.
    Withdrawal,
    /// Model parameters re-estimated on the current vintage.
    Reestimation,
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Release => "release",
            Self::Revision => "revision",
            Self::Withdrawal => "withdrawal",
            Self::Reestimation => "reestimation",
        })
    }
}

impl FromStr for UpdateKind {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "release" => Ok(Self::Release),
            "revision" => Ok(Self::Revision),
            "withdrawal" => Ok(Self::Withdrawal),
            "reestimation" => Ok(Self::Reestimation),
            _ => Err(HistoryError::InvalidUpdateKind {
                label: s.to_string(),
            }),
        }
    }
}

/// Contribution of one data update to the revision of one target forecast.
///
/// `impact = news × weight`, all in original units.
///
/// A [`UpdateKind::Reestimation`] row carries the effect of new parameters
/// instead: `observed` is the re-estimated model's forecast, `forecast` the
/// forecast from the same data under the old parameters, and `weight` is 1.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsRecord {
    /// Release date of the current vintage.
    pub date: NaiveDate,
    /// Quarter being nowcast.
    pub quarter: Quarter,
    /// Period of the impacted forecast (the quarter's last month).
    pub impact_date: Month,
    /// Series that was updated (empty on re-estimation rows).
    pub updated_variable: String,
    /// Period of the updated observation (quarter-end month for quarterly series).
    pub update_date: Month,
    /// Kind of update.
    pub update_kind: UpdateKind,
    /// Target variable whose forecast moved.
    pub impacted_variable: String,
    /// Observed value after the update (before it, for withdrawals).
    pub observed: f64,
    /// Value expected for the observation given the earlier information.
    pub forecast: f64,
    /// Unexpected part of the update.
    pub news: f64,
    /// Effect of one unit of news on the target.
    pub weight: f64,
    /// `news × weight`.
    pub impact: f64,
    /// Broad sector of the updated series.
    pub sector: String,
    /// Topic of the updated series.
    pub topic: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_kind_labels() {
        for kind in [
            UpdateKind::Release,
            UpdateKind::Revision,
            UpdateKind::Withdrawal,
            UpdateKind::Reestimation,
        ] {
            assert_eq!(kind.to_string().parse::<UpdateKind>().unwrap(), kind);
        }
        assert_eq!(" Release ".parse::<UpdateKind>().unwrap(), UpdateKind::Release);
        assert!(matches!(
            "benchmark".parse::<UpdateKind>(),
            Err(HistoryError::InvalidUpdateKind { .. })
        ));
    }
}
