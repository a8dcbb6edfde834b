//! Fitted dynamic factor models.

use std::sync::Arc;

use chrono::NaiveDate;
use ndarray::Array2;
use nowcast_calendar::{Month, Period, Quarter};
use nowcast_panel::{PanelError, StandardizationParams, Vintage};
use tracing::{debug, info, info_span};

use crate::em::{self, Convergence, EmConfig};
use crate::error::DfmError;
use crate::kalman::{self, StateSpace};
use crate::params::{DfmParams, initial_params};
use crate::spec::FactorSpec;
use crate::state_space::ModelStructure;

/// Standardized observations on the monthly model grid.
///
/// Rows are consecutive months from `start`; columns follow the model's
/// series order. Quarterly values sit on the last month of their quarter.
///
/// **Not part of the public API.**
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ModelData {
    pub(crate) start: Month,
    pub(crate) y: Array2<f64>,
}

impl ModelData {
    /// Lays a standardized vintage out on the monthly grid of `structure`.
    ///
    /// Model series the vintage lacks are all-missing; vintage series the
    /// model does not know are ignored.
    pub(crate) fn from_vintage(structure: &ModelStructure, z: &Vintage) -> Result<Self, DfmError> {
        let monthly = z.monthly();
        let quarterly = z.quarterly();
        let Some(monthly_end) = monthly.end() else {
            return Err(PanelError::EmptyPanel {
                release_date: z.release_date(),
            }
            .into());
        };

        let mut start = monthly.start();
        let mut end = monthly_end;
        if let Some(q_end) = quarterly.end() {
            start = start.min(quarterly.start().last_month());
            end = end.max(q_end.last_month());
        }

        let ignored: Vec<&str> = z
            .series_ids()
            .filter(|id| structure.series_index(id).is_none())
            .collect();
        if !ignored.is_empty() {
            debug!(?ignored, "series outside the model are ignored");
        }

        let n = start.steps_to(end) as usize + 1;
        let mut y = Array2::from_elem((n, structure.n_series()), f64::NAN);
        for (i, s) in structure.series().iter().enumerate() {
            if let Some(col) = monthly.column(&s.id) {
                let offset = start.steps_to(monthly.start()) as usize;
                for (r, v) in col.iter().enumerate() {
                    y[[offset + r, i]] = *v;
                }
            } else if let Some(col) = quarterly.column(&s.id) {
                for (r, v) in col.iter().enumerate() {
                    let month = quarterly.start().offset(r as i64).last_month();
                    y[[start.steps_to(month) as usize, i]] = *v;
                }
            }
        }
        Ok(Self { start, y })
    }

    /// Last month of the grid.
    pub(crate) fn end(&self) -> Month {
        self.start.offset(self.y.nrows() as i64 - 1)
    }

    /// Row of `month`, if it lies on the grid.
    pub(crate) fn row_of(&self, month: Month) -> Option<usize> {
        let r = self.start.steps_to(month);
        (r >= 0 && (r as usize) < self.y.nrows()).then_some(r as usize)
    }

    /// Copy padded with missing rows so that the grid spans `start..=end`
    /// (the existing rows are always kept).
    pub(crate) fn covering(&self, start: Month, end: Month) -> Self {
        let start = start.min(self.start);
        let end = end.max(self.end());
        let n = start.steps_to(end) as usize + 1;
        let offset = start.steps_to(self.start) as usize;
        let mut y = Array2::from_elem((n, self.y.ncols()), f64::NAN);
        y.slice_mut(ndarray::s![offset..offset + self.y.nrows(), ..])
            .assign(&self.y);
        Self { start, y }
    }

    /// Re-maps the columns from one model's series order to another's.
    /// Series unknown to `from` are all-missing.
    pub(crate) fn project(&self, from: &ModelStructure, to: &ModelStructure) -> Self {
        let mut y = Array2::from_elem((self.y.nrows(), to.n_series()), f64::NAN);
        for (i, s) in to.series().iter().enumerate() {
            if let Some(j) = from.series_index(&s.id) {
                y.column_mut(i).assign(&self.y.column(j));
            }
        }
        Self {
            start: self.start,
            y,
        }
    }

    /// Number of non-missing entries.
    pub(crate) fn n_observed(&self) -> usize {
        self.y.iter().filter(|v| !v.is_nan()).count()
    }
}

/// A dynamic factor model estimated by EM, produced by [`FactorSpec::fit()`].
///
/// The model carries the standardization it was estimated under and the
/// standardized data it was last filtered on. It is an immutable value:
/// [`FittedModel::refilter`] and [`FittedModel::reestimate`] return new
/// models.
///
/// ```mermaid
/// graph LR
///     A["FittedModel"] --> B[".forecast(quarter)?"]
///     A --> C[".refilter(&vintage)? (same parameters)"]
///     A --> D[".reestimate(&vintage, &config)? (warm-started EM)"]
///     A --> E["news(&previous, &current, &request)?"]
/// ```
#[derive(Debug, Clone)]
pub struct FittedModel {
    spec: FactorSpec,
    structure: ModelStructure,
    params: DfmParams,
    standardization: Arc<StandardizationParams>,
    data: ModelData,
    estimation_date: NaiveDate,
    data_date: NaiveDate,
    log_likelihood: f64,
    convergence: Convergence,
}

impl FittedModel {
    /// The specification the model was built from.
    pub fn spec(&self) -> &FactorSpec {
        &self.spec
    }

    /// Estimated parameters (standardized units).
    pub fn params(&self) -> &DfmParams {
        &self.params
    }

    /// Standardization parameters shared with every model of the same epoch.
    pub fn standardization(&self) -> &Arc<StandardizationParams> {
        &self.standardization
    }

    /// Standardization epoch.
    pub fn epoch(&self) -> Quarter {
        self.standardization.epoch()
    }

    /// Release date of the vintage the parameters were estimated on.
    pub fn estimation_date(&self) -> NaiveDate {
        self.estimation_date
    }

    /// Release date of the vintage the model was last filtered on.
    pub fn data_date(&self) -> NaiveDate {
        self.data_date
    }

    /// Log-likelihood of the current data under the parameters.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// EM convergence status of the estimation.
    pub fn convergence(&self) -> Convergence {
        self.convergence
    }

    /// Model series ids, monthly first.
    pub fn series(&self) -> impl Iterator<Item = &str> {
        self.structure.series().iter().map(|s| s.id.as_str())
    }

    /// First month of the model grid.
    pub fn grid_start(&self) -> Month {
        self.data.start
    }

    /// Last month of the model grid.
    pub fn grid_end(&self) -> Month {
        self.data.end()
    }

    /// Number of non-missing observations.
    pub fn n_observations(&self) -> usize {
        self.data.n_observed()
    }

    /// Number of free parameters.
    pub fn n_parameters(&self) -> usize {
        self.structure.n_parameters()
    }

    /// Akaike information criterion: `2k − 2ℓ`.
    pub fn aic(&self) -> f64 {
        2.0 * self.n_parameters() as f64 - 2.0 * self.log_likelihood
    }

    /// Bayesian information criterion: `k ln(n) − 2ℓ`, with `n` the number
    /// of non-missing observations.
    pub fn bic(&self) -> f64 {
        let n = self.n_observations().max(1) as f64;
        self.n_parameters() as f64 * n.ln() - 2.0 * self.log_likelihood
    }

    /// Filters a new vintage with the parameters and standardization held
    /// fixed.
    ///
    /// The returned model keeps the estimation date and convergence status;
    /// its data date and log-likelihood refer to `vintage`.
    ///
    /// # Errors
    ///
    /// | Variant | Trigger |
    /// |---------|---------|
    /// | [`DfmError::Panel`] | the vintage carries a series the standardization does not know, or has no monthly rows |
    /// | [`DfmError::SingularCovariance`] | the Kalman filter breaks down |
    pub fn refilter(&self, vintage: &Vintage) -> Result<Self, DfmError> {
        let _span = info_span!("refilter", release_date = %vintage.release_date()).entered();
        let z = self.standardization.standardize(vintage)?;
        let data = ModelData::from_vintage(&self.structure, &z)?;
        let out = kalman::filter(&self.state_space(), &data.y)?;
        debug!(log_likelihood = out.log_likelihood, "refiltered");
        Ok(Self {
            data,
            data_date: vintage.release_date(),
            log_likelihood: out.log_likelihood,
            ..self.clone()
        })
    }

    /// Re-estimates the parameters on `vintage` with the standardization
    /// held fixed.
    ///
    /// EM starts from the current parameters when the model structure is
    /// unchanged, and from principal components otherwise (e.g. when a
    /// series appears or disappears).
    ///
    /// # Errors
    ///
    /// Same as [`FactorSpec::fit()`].
    pub fn reestimate(&self, vintage: &Vintage, config: &EmConfig) -> Result<Self, DfmError> {
        config.validate()?;
        let _span = info_span!("reestimate", release_date = %vintage.release_date()).entered();
        let z = self.standardization.standardize(vintage)?;
        let structure =
            ModelStructure::new(&self.spec, z.monthly().columns(), z.quarterly().columns())?;
        let data = ModelData::from_vintage(&structure, &z)?;
        check_observations(&structure, &data, config.min_observations())?;

        let init = if structure == self.structure {
            debug!("warm start from previous parameters");
            self.params.clone()
        } else {
            debug!("model structure changed, starting from principal components");
            initial_params(&structure, &data.y, config.min_obs_variance())
        };
        let outcome = em::estimate(&structure, &data.y, init, config)?;
        info!(
            log_likelihood = outcome.log_likelihood,
            convergence = %outcome.convergence,
            "re-estimated model"
        );
        Ok(Self {
            spec: self.spec.clone(),
            structure,
            params: outcome.params,
            standardization: Arc::clone(&self.standardization),
            data,
            estimation_date: vintage.release_date(),
            data_date: vintage.release_date(),
            log_likelihood: outcome.log_likelihood,
            convergence: outcome.convergence,
        })
    }

    pub(crate) fn structure(&self) -> &ModelStructure {
        &self.structure
    }

    pub(crate) fn data(&self) -> &ModelData {
        &self.data
    }

    pub(crate) fn state_space(&self) -> StateSpace {
        self.structure.state_space(&self.params)
    }
}

/// Estimates `spec` on `vintage`; see [`FactorSpec::fit()`].
pub(crate) fn fit_spec(
    spec: &FactorSpec,
    vintage: &Vintage,
    standardization: Arc<StandardizationParams>,
    config: &EmConfig,
) -> Result<FittedModel, DfmError> {
    config.validate()?;
    let _span = info_span!(
        "fit",
        release_date = %vintage.release_date(),
        blocks = spec.blocks().len()
    )
    .entered();

    let z = standardization.standardize(vintage)?;
    let structure = ModelStructure::new(spec, z.monthly().columns(), z.quarterly().columns())?;
    let data = ModelData::from_vintage(&structure, &z)?;
    check_observations(&structure, &data, config.min_observations())?;

    let init = initial_params(&structure, &data.y, config.min_obs_variance());
    let outcome = em::estimate(&structure, &data.y, init, config)?;
    info!(
        series = structure.n_series(),
        state_dim = structure.state_dim(),
        log_likelihood = outcome.log_likelihood,
        convergence = %outcome.convergence,
        "fitted dynamic factor model"
    );

    Ok(FittedModel {
        spec: spec.clone(),
        structure,
        params: outcome.params,
        standardization,
        data,
        estimation_date: vintage.release_date(),
        data_date: vintage.release_date(),
        log_likelihood: outcome.log_likelihood,
        convergence: outcome.convergence,
    })
}

fn check_observations(
    structure: &ModelStructure,
    data: &ModelData,
    min: usize,
) -> Result<(), DfmError> {
    for (i, s) in structure.series().iter().enumerate() {
        let n = data.y.column(i).iter().filter(|v| !v.is_nan()).count();
        if n < min {
            return Err(DfmError::InsufficientData {
                series: s.id.clone(),
                n,
                min,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nowcast_panel::Panel;

    fn month(y: i32, m: u8) -> Month {
        Month::new(y, m).unwrap()
    }

    fn structure() -> ModelStructure {
        let spec = FactorSpec::builder()
            .block("G", 1, 1)
            .assign("A", &["G"])
            .assign("B", &["G"])
            .assign("Q", &["G"])
            .build()
            .unwrap();
        ModelStructure::new(&spec, &["A".into(), "B".into()], &["Q".into()]).unwrap()
    }

    fn vintage() -> Vintage {
        let monthly = Panel::new(
            month(2024, 2),
            vec!["A".into(), "B".into()],
            ndarray::array![[1.0, 2.0], [3.0, f64::NAN], [5.0, 6.0]],
        )
        .unwrap();
        let quarterly = Panel::new(
            Quarter::new(2023, 4).unwrap(),
            vec!["Q".into()],
            ndarray::array![[7.0], [8.0]],
        )
        .unwrap();
        Vintage::new(NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(), monthly, quarterly).unwrap()
    }

    #[test]
    fn grid_spans_both_frequencies() {
        let data = ModelData::from_vintage(&structure(), &vintage()).unwrap();
        assert_eq!(data.start, month(2023, 12));
        assert_eq!(data.end(), month(2024, 4));
        assert_eq!(data.y.dim(), (5, 3));
        assert_eq!(data.y[[0, 2]], 7.0);
        assert_eq!(data.y[[3, 2]], 8.0);
        assert!(data.y[[1, 0]].is_nan());
        assert_eq!(data.y[[2, 0]], 1.0);
        assert!(data.y[[3, 1]].is_nan());
        assert_eq!(data.n_observed(), 7);
        assert_eq!(data.row_of(month(2024, 3)), Some(3));
        assert_eq!(data.row_of(month(2024, 5)), None);
    }

    #[test]
    fn covering_pads_both_ends() {
        let data = ModelData::from_vintage(&structure(), &vintage()).unwrap();
        let wide = data.covering(month(2023, 11), month(2024, 6));
        assert_eq!(wide.start, month(2023, 11));
        assert_eq!(wide.end(), month(2024, 6));
        assert_eq!(wide.y[[1, 2]], 7.0);
        assert!(wide.y.row(7).iter().all(|v| v.is_nan()));
        assert_eq!(wide.n_observed(), data.n_observed());
    }

    #[test]
    fn empty_monthly_panel_rejected() {
        let v = Vintage::new(
            NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
            Panel::empty(month(2024, 1), vec!["A".into()]).unwrap(),
            Panel::empty(Quarter::new(2024, 1).unwrap(), vec![]).unwrap(),
        )
        .unwrap();
        let err = ModelData::from_vintage(&structure(), &v).unwrap_err();
        assert!(matches!(err, DfmError::Panel(PanelError::EmptyPanel { .. })));
    }

    #[test]
    fn insufficient_observations() {
        let s = structure();
        let data = ModelData::from_vintage(&s, &vintage()).unwrap();
        let err = check_observations(&s, &data, 3).unwrap_err();
        assert_eq!(
            err,
            DfmError::InsufficientData {
                series: "B".into(),
                n: 2,
                min: 3
            }
        );
    }
}
