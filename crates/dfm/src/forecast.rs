//! Quarterly forecasts from a fitted model.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use nowcast_calendar::{Period, Quarter};
use nowcast_history::NowcastRecord;
use nowcast_panel::Frequency;

use crate::error::DfmError;
use crate::fit::FittedModel;
use crate::kalman;

/// Predicted value of one quarterly variable, in original units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableForecast {
    mean: f64,
    variance: f64,
}

impl VariableForecast {
    /// Smoothed expectation of the variable's common component.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Predictive variance of a fresh observation (state uncertainty plus
    /// idiosyncratic noise).
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Predictive standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Forecasts of every quarterly variable for one quarter.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    quarter: Quarter,
    date: NaiveDate,
    values: BTreeMap<String, VariableForecast>,
}

impl Forecast {
    /// Quarter forecast.
    pub fn quarter(&self) -> Quarter {
        self.quarter
    }

    /// Release date of the data the forecast conditions on.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Forecast of `variable`, if it is a quarterly series of the model.
    pub fn get(&self, variable: &str) -> Option<&VariableForecast> {
        self.values.get(variable)
    }

    /// All forecasts keyed by variable id.
    pub fn values(&self) -> &BTreeMap<String, VariableForecast> {
        &self.values
    }
}

impl FittedModel {
    /// Forecasts every quarterly variable for `quarter` given the model's
    /// current data.
    ///
    /// The data grid is padded with missing months up to the quarter's last
    /// month (or back to it, for quarters before the sample), then filtered
    /// and smoothed. Any horizon is accepted; far from the data the forecast
    /// reverts to the unconditional mean.
    ///
    /// # Errors
    ///
    /// | Variant | Trigger |
    /// |---------|---------|
    /// | [`DfmError::UnknownVariable`] | a quarterly series has no standardization scaling |
    /// | [`DfmError::SingularCovariance`] | the Kalman filter breaks down |
    pub fn forecast(&self, quarter: Quarter) -> Result<Forecast, DfmError> {
        let target = quarter.last_month();
        let data = self.data().covering(target, target);
        // the padded grid always contains the target month
        let t = data.start.steps_to(target) as usize;

        let ss = self.state_space();
        let out = kalman::filter(&ss, &data.y)?;
        let smoothed = kalman::smooth(&ss, &out);
        let (mean, cov) = (&smoothed.mean[t], &smoothed.cov[t]);

        let mut values = BTreeMap::new();
        for (i, s) in self.structure().series().iter().enumerate() {
            if s.frequency != Frequency::Quarterly {
                continue;
            }
            let scaling = self
                .standardization()
                .get(&s.id)
                .ok_or_else(|| DfmError::UnknownVariable {
                    variable: s.id.clone(),
                })?;
            let z = ss.z.row(i);
            let signal_var = z.dot(&cov.dot(&z));
            values.insert(
                s.id.clone(),
                VariableForecast {
                    mean: scaling.unapply(z.dot(mean)),
                    variance: scaling.unapply_variance(signal_var + ss.h[i]),
                },
            );
        }

        Ok(Forecast {
            quarter,
            date: self.data_date(),
            values,
        })
    }

    /// Nowcast record for the quarter containing the data release date.
    ///
    /// # Errors
    ///
    /// Same as [`FittedModel::forecast`].
    pub fn nowcast_record(&self) -> Result<NowcastRecord, DfmError> {
        let quarter = Quarter::from_date(self.data_date());
        let forecast = self.forecast(quarter)?;
        Ok(NowcastRecord {
            date: forecast.date,
            quarter,
            values: forecast
                .values
                .into_iter()
                .map(|(id, f)| (id, f.mean))
                .collect(),
        })
    }
}
