//! Banbura–Modugno news decomposition between two fitted models.
//!
//! The revision of a target forecast between two vintages is split into one
//! contribution per changed observation, in three exact stages evaluated
//! with the previous model's parameters:
//!
//! ```text
//! previous data ──revisions──▶ revised ──withdrawals──▶ thinned ──releases──▶ current data
//! ```
//!
//! Within a stage the smoothed target is linear in the data, so:
//!
//! * revisions contribute `w⁽ᵖ⁾ · (new − old)`, with `w⁽ᵖ⁾` the smoother's
//!   weight on the observation under the previous observation pattern;
//! * withdrawals contribute `−w⁽ᵖ⁾ · (old − E[y | thinned])`;
//! * releases contribute `w⁽ᶜ⁾ · (y − E[y | thinned])`, with `w⁽ᶜ⁾` the weight
//!   under the current pattern, equal to the regression coefficient
//!   `Cov(target, news) Var(news)⁻¹` of the orthogonalised news.
//!
//! The contributions therefore sum to the updated minus the previous
//! forecast up to rounding. When the current model carries re-estimated
//! parameters, one more row per target holds the remaining gap to the
//! current model's own forecast.

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use nowcast_calendar::{Period, Quarter};
use nowcast_history::{NewsRecord, UpdateKind};
use nowcast_panel::{Scaling, SeriesCatalog};
use tracing::{debug, info_span};

use crate::error::DfmError;
use crate::fit::FittedModel;
use crate::kalman::{self, FilterOutput, StateSpace};

/// What to decompose.
#[derive(Debug, Clone)]
pub struct NewsRequest {
    targets: Vec<String>,
    quarter: Option<Quarter>,
    catalog: Option<SeriesCatalog>,
}

impl NewsRequest {
    /// Decomposes the forecasts of `targets` for the quarter containing the
    /// current model's data release date.
    pub fn new<S: Into<String>>(targets: impl IntoIterator<Item = S>) -> Self {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            quarter: None,
            catalog: None,
        }
    }

    /// Decomposes the forecasts for `quarter` instead.
    pub fn with_quarter(mut self, quarter: Quarter) -> Self {
        self.quarter = Some(quarter);
        self
    }

    /// Tags news rows with the sector and topic of each updated series.
    pub fn with_catalog(mut self, catalog: SeriesCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Target variables.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

/// Totals for one impacted variable, in its original units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewsSummary {
    /// Forecast from the previous data.
    pub previous_forecast: f64,
    /// Forecast from the current data under the previous parameters.
    pub updated_forecast: f64,
    /// Sum of the impacts of releases.
    pub news_impact: f64,
    /// Sum of the impacts of revisions and withdrawals.
    pub revision_impact: f64,
    /// Current model's own forecast minus `updated_forecast`, when the two
    /// models' parameters differ.
    pub parameter_revision: Option<f64>,
}

impl NewsSummary {
    /// `updated_forecast − previous_forecast`.
    pub fn total_revision(&self) -> f64 {
        self.updated_forecast - self.previous_forecast
    }
}

/// Result of [`news`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewsDecomposition {
    quarter: Quarter,
    records: Vec<NewsRecord>,
    summaries: BTreeMap<String, NewsSummary>,
}

impl NewsDecomposition {
    /// Quarter whose forecasts were decomposed.
    pub fn quarter(&self) -> Quarter {
        self.quarter
    }

    /// One row per (update, impacted variable) with a non-zero weight, plus
    /// one [`UpdateKind::Reestimation`] row per target when the parameters
    /// changed.
    pub fn records(&self) -> &[NewsRecord] {
        &self.records
    }

    /// Totals per impacted variable.
    pub fn summaries(&self) -> &BTreeMap<String, NewsSummary> {
        &self.summaries
    }

    /// Summary of `variable`.
    pub fn summary(&self, variable: &str) -> Option<&NewsSummary> {
        self.summaries.get(variable)
    }

    /// Consumes the decomposition, returning its rows.
    pub fn into_records(self) -> Vec<NewsRecord> {
        self.records
    }
}

/// How one cell of the model grid changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Release,
    Revision,
    Withdrawal,
}

impl Change {
    fn kind(self) -> UpdateKind {
        match self {
            Self::Release => UpdateKind::Release,
            Self::Revision => UpdateKind::Revision,
            Self::Withdrawal => UpdateKind::Withdrawal,
        }
    }
}

/// One changed cell of the model grid.
#[derive(Debug, Clone, Copy)]
struct Update {
    row: usize,
    series: usize,
    kind: Change,
    /// Previous value (standardized, `NaN` for releases).
    old: f64,
    /// Current value (standardized, `NaN` for withdrawals).
    new: f64,
}

/// Attributes the revision of the target forecasts between `previous` and
/// `current` to the individual data updates.
///
/// All quantities use the previous model's parameters; the current model
/// contributes its data and, for the parameter revision, its own forecast.
///
/// # Errors
///
/// | Variant | Trigger |
/// |---------|---------|
/// | [`DfmError::IncomparableModels`] | the models do not share standardization parameters |
/// | [`DfmError::UnknownVariable`] | a target is not a series of the previous model |
/// | [`DfmError::SingularCovariance`] | a Kalman filter run breaks down |
pub fn news(
    previous: &FittedModel,
    current: &FittedModel,
    request: &NewsRequest,
) -> Result<NewsDecomposition, DfmError> {
    let (a, b) = (previous.standardization(), current.standardization());
    if !(Arc::ptr_eq(a, b) || a == b) {
        return Err(DfmError::IncomparableModels);
    }

    let quarter = request
        .quarter
        .unwrap_or_else(|| Quarter::from_date(current.data_date()));
    let _span = info_span!(
        "news",
        previous = %previous.data_date(),
        current = %current.data_date(),
        %quarter
    )
    .entered();

    let structure = previous.structure();
    let mut targets = Vec::with_capacity(request.targets.len());
    for id in &request.targets {
        let i = structure
            .series_index(id)
            .ok_or_else(|| DfmError::UnknownVariable { variable: id.clone() })?;
        let scaling = scaling_of(previous, id)?;
        targets.push((id.as_str(), i, scaling));
    }

    // common grid covering both vintages and the impact month
    let impact_month = quarter.last_month();
    let cur_data = current.data().project(current.structure(), structure);
    let start = previous.data().start.min(cur_data.start).min(impact_month);
    let end = previous.data().end().max(cur_data.end()).max(impact_month);
    let y_prev = previous.data().covering(start, end);
    let y_cur = cur_data.covering(start, end);
    let t_star = start.steps_to(impact_month) as usize;

    let updates = classify(&y_prev.y, &y_cur.y);
    debug!(updates = updates.len(), "classified data updates");

    // previous data with revisions applied and withdrawn points removed
    let mut y_mid = y_prev.y.clone();
    for u in &updates {
        match u.kind {
            Change::Revision => y_mid[[u.row, u.series]] = u.new,
            Change::Withdrawal => y_mid[[u.row, u.series]] = f64::NAN,
            Change::Release => {}
        }
    }

    let ss = previous.state_space();
    let run_prev = kalman::filter(&ss, &y_prev.y)?;
    let run_mid = kalman::filter(&ss, &y_mid)?;
    let run_cur = kalman::filter(&ss, &y_cur.y)?;
    let x_prev = kalman::smooth(&ss, &run_prev).mean;
    let x_mid = kalman::smooth(&ss, &run_mid).mean;
    let x_cur = kalman::smooth(&ss, &run_cur).mean;

    let mut records = Vec::new();
    let mut summaries = BTreeMap::new();
    let mut totals: Vec<(f64, f64)> = vec![(0.0, 0.0); targets.len()];

    for u in &updates {
        let id = &structure.series()[u.series].id;
        let scaling = scaling_of(previous, id)?;
        let (run, sign) = match u.kind {
            Change::Release => (&run_cur, 1.0),
            Change::Revision => (&run_prev, 1.0),
            Change::Withdrawal => (&run_prev, -1.0),
        };
        let state_weight = impulse_weight(&ss, run, y_prev.y.dim(), u, t_star);

        // standardized observed value, expectation and news
        let expected = |row: usize| ss.z.row(u.series).dot(&x_mid[row]);
        let (observed, forecast, news_std) = match u.kind {
            Change::Release => {
                let e = expected(u.row);
                (u.new, e, u.new - e)
            }
            Change::Revision => (u.new, u.old, u.new - u.old),
            Change::Withdrawal => {
                let e = expected(u.row);
                (u.old, e, u.old - e)
            }
        };

        for (k, (target, ti, target_scaling)) in targets.iter().enumerate() {
            let w_std = sign * ss.z.row(*ti).dot(&state_weight);
            if w_std == 0.0 {
                continue;
            }
            let impact = w_std * news_std * target_scaling.scale();
            match u.kind {
                Change::Release => totals[k].0 += impact,
                Change::Revision | Change::Withdrawal => totals[k].1 += impact,
            }
            let (sector, topic) = request
                .catalog
                .as_ref()
                .and_then(|c| c.get(id))
                .map_or((String::new(), String::new()), |m| {
                    (m.sector().to_string(), m.topic().to_string())
                });
            records.push(NewsRecord {
                date: current.data_date(),
                quarter,
                impact_date: impact_month,
                updated_variable: id.clone(),
                update_date: start.offset(u.row as i64),
                update_kind: u.kind.kind(),
                impacted_variable: (*target).to_string(),
                observed: scaling.unapply(observed),
                forecast: scaling.unapply(forecast),
                news: news_std * scaling.scale(),
                weight: w_std * target_scaling.scale() / scaling.scale(),
                impact,
                sector,
                topic,
            });
        }
    }

    let own = if current.params() == previous.params() && current.structure() == structure {
        None
    } else {
        Some(current.forecast(quarter)?)
    };
    for (k, (target, ti, target_scaling)) in targets.iter().enumerate() {
        let z = ss.z.row(*ti);
        let previous_forecast = target_scaling.unapply(z.dot(&x_prev[t_star]));
        let updated_forecast = target_scaling.unapply(z.dot(&x_cur[t_star]));
        let own_forecast = own.as_ref().and_then(|f| f.get(target)).map(|f| f.mean());
        let parameter_revision = own_forecast.map(|mean| mean - updated_forecast);
        if let Some(mean) = own_forecast {
            records.push(NewsRecord {
                date: current.data_date(),
                quarter,
                impact_date: impact_month,
                updated_variable: String::new(),
                update_date: impact_month,
                update_kind: UpdateKind::Reestimation,
                impacted_variable: (*target).to_string(),
                observed: mean,
                forecast: updated_forecast,
                news: mean - updated_forecast,
                weight: 1.0,
                impact: mean - updated_forecast,
                sector: String::new(),
                topic: String::new(),
            });
        }
        summaries.insert(
            (*target).to_string(),
            NewsSummary {
                previous_forecast,
                updated_forecast,
                news_impact: totals[k].0,
                revision_impact: totals[k].1,
                parameter_revision,
            },
        );
    }

    debug!(rows = records.len(), "news decomposition done");
    Ok(NewsDecomposition {
        quarter,
        records,
        summaries,
    })
}

fn scaling_of(model: &FittedModel, id: &str) -> Result<Scaling, DfmError> {
    model
        .standardization()
        .get(id)
        .copied()
        .ok_or_else(|| DfmError::UnknownVariable {
            variable: id.to_string(),
        })
}

/// Cells that differ between the two data matrices, in row-major order.
fn classify(prev: &Array2<f64>, cur: &Array2<f64>) -> Vec<Update> {
    let mut out = Vec::new();
    for ((row, series), &old) in prev.indexed_iter() {
        let new = cur[[row, series]];
        let kind = match (old.is_nan(), new.is_nan()) {
            (true, false) => Change::Release,
            (false, true) => Change::Withdrawal,
            (false, false) if old != new => Change::Revision,
            _ => continue,
        };
        out.push(Update {
            row,
            series,
            kind,
            old,
            new,
        });
    }
    out
}

/// Smoothed state at `t_star` per unit of the observation `u`, under the
/// observation pattern of `run`.
fn impulse_weight(
    ss: &StateSpace,
    run: &FilterOutput,
    dim: (usize, usize),
    u: &Update,
    t_star: usize,
) -> Array1<f64> {
    let mut impulse = Array2::<f64>::zeros(dim);
    impulse[[u.row, u.series]] = 1.0;
    let means = kalman::smoothed_means(ss, run, &impulse);
    means[t_star].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn classify_kinds() {
        let nan = f64::NAN;
        let prev = array![[1.0, nan], [2.0, 3.0]];
        let cur = array![[1.0, 4.0], [2.5, nan]];
        let updates = classify(&prev, &cur);
        let kinds: Vec<(usize, usize, UpdateKind)> =
            updates.iter().map(|u| (u.row, u.series, u.kind.kind())).collect();
        assert_eq!(
            kinds,
            vec![
                (0, 1, UpdateKind::Release),
                (1, 0, UpdateKind::Revision),
                (1, 1, UpdateKind::Withdrawal),
            ]
        );
    }

    #[test]
    fn request_builder() {
        let q = Quarter::new(2024, 1).unwrap();
        let r = NewsRequest::new(["RGDP", "GDP"]).with_quarter(q);
        assert_eq!(r.targets(), ["RGDP".to_string(), "GDP".to_string()]);
        assert_eq!(r.quarter, Some(q));
    }
}
