//! Expectation–maximisation for the mixed-frequency factor model.
//!
//! Each iteration filters and smooths with the current parameters
//! (E-step) and updates them in closed form (M-step, Bańbura–Modugno with
//! missing data and diagonal observation noise):
//!
//! * loadings per series, restricted to the blocks it is assigned to;
//! * VAR coefficients and process covariance per block;
//! * observation variances, floored at `min_obs_variance`, or, with
//!   idiosyncratic AR(1) states, each state's coefficient and innovation
//!   variance (the observation variance then stays at the floor).
//!
//! ```mermaid
//! stateDiagram-v2
//!     [*] --> Initialized
//!     Initialized --> Filtering
//!     Filtering --> Updating
//!     Updating --> Filtering
//!     Filtering --> Converged
//!     Converged --> [*]
//! ```

use std::fmt;

use ndarray::{Array1, Array2, s};
use tracing::{debug, trace, warn};

use crate::error::DfmError;
use crate::kalman::{self, Smoothed};
use crate::linalg;
use crate::params::{DfmParams, MAX_IDIOSYNCRATIC_AR};
use crate::state_space::ModelStructure;

/// Lower bound for the diagonal of an updated process covariance.
const MIN_PROCESS_VARIANCE: f64 = 1e-8;

/// Configuration for EM estimation.
///
/// # Example
///
/// ```
/// use nowcast_dfm::EmConfig;
///
/// let config = EmConfig::new().with_max_iterations(200).with_tolerance(1e-5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct EmConfig {
    max_iterations: usize,
    tolerance: f64,
    min_obs_variance: f64,
    min_observations: usize,
}

impl EmConfig {
    /// Creates a configuration with defaults.
    ///
    /// Defaults: `max_iterations = 500`, `tolerance = 1e-6`,
    /// `min_obs_variance = 1e-4`, `min_observations = 12`.
    pub fn new() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-6,
            min_obs_variance: 1e-4,
            min_observations: 12,
        }
    }

    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    /// Sets the relative log-likelihood tolerance.
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// Sets the floor for observation variances.
    pub fn with_min_obs_variance(mut self, v: f64) -> Self {
        self.min_obs_variance = v;
        self
    }

    /// Sets the minimum number of observations per series.
    pub fn with_min_observations(mut self, n: usize) -> Self {
        self.min_observations = n;
        self
    }

    /// Returns the iteration cap.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Returns the relative log-likelihood tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Returns the observation variance floor.
    pub fn min_obs_variance(&self) -> f64 {
        self.min_obs_variance
    }

    /// Returns the minimum number of observations per series.
    pub fn min_observations(&self) -> usize {
        self.min_observations
    }

    /// Validates this configuration.
    ///
    /// Checks that `max_iterations >= 1`, `tolerance` is finite and
    /// positive, `min_obs_variance` is finite and positive and
    /// `min_observations >= 1`.
    pub fn validate(&self) -> Result<(), DfmError> {
        let invalid = |reason: String| Err(DfmError::InvalidConfig { reason });
        if self.max_iterations < 1 {
            return invalid("max_iterations must be >= 1".to_string());
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return invalid(format!("tolerance must be finite and > 0, got {}", self.tolerance));
        }
        if !self.min_obs_variance.is_finite() || self.min_obs_variance <= 0.0 {
            return invalid(format!(
                "min_obs_variance must be finite and > 0, got {}",
                self.min_obs_variance
            ));
        }
        if self.min_observations < 1 {
            return invalid("min_observations must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for EmConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of an EM run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Convergence {
    /// The relative log-likelihood change fell below the tolerance.
    Converged {
        /// Number of likelihood evaluations.
        iterations: usize,
        /// Final relative change.
        relative_change: f64,
    },
    /// The iteration cap was reached; the best parameters seen are kept.
    NotConverged {
        /// Number of likelihood evaluations.
        iterations: usize,
        /// Last relative change.
        relative_change: f64,
    },
}

impl Convergence {
    /// Returns `true` unless EM stopped at the iteration cap.
    pub fn is_converged(&self) -> bool {
        !matches!(self, Self::NotConverged { .. })
    }
}

impl fmt::Display for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged { iterations, .. } => write!(f, "converged after {iterations} iterations"),
            Self::NotConverged {
                iterations,
                relative_change,
            } => write!(
                f,
                "not converged after {iterations} iterations (relative change {relative_change:.3e})"
            ),
        }
    }
}

/// Phases of the estimator, logged as it moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmState {
    Initialized,
    Filtering,
    Updating,
    Converged,
}

impl fmt::Display for EmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initialized => "initialized",
            Self::Filtering => "filtering",
            Self::Updating => "updating",
            Self::Converged => "converged",
        })
    }
}

/// Result of [`estimate`].
#[derive(Debug, Clone)]
pub(crate) struct EmOutcome {
    pub(crate) params: DfmParams,
    pub(crate) log_likelihood: f64,
    pub(crate) convergence: Convergence,
}

/// `(a - b) / mean(|a|, |b|)`: positive when the likelihood went up.
pub(crate) fn relative_change(current: f64, previous: f64) -> f64 {
    let denom = 0.5 * (current.abs() + previous.abs());
    let diff = current - previous;
    if denom > 0.0 { diff / denom } else { diff }
}

/// Best parameters seen so far and the stopping rule.
///
/// EM stops once the likelihood moves by less than the tolerance in either
/// direction. The parameters handed back are the best-scoring ones seen,
/// not necessarily the last.
#[derive(Debug)]
struct Progress {
    best: Option<(DfmParams, f64)>,
    previous: Option<f64>,
    change: f64,
}

impl Progress {
    fn new() -> Self {
        Self {
            best: None,
            previous: None,
            change: f64::INFINITY,
        }
    }

    /// Records the likelihood of `params`; returns `true` once settled.
    fn observe(&mut self, params: &DfmParams, ll: f64, tolerance: f64) -> bool {
        if self.best.as_ref().is_none_or(|(_, b)| ll > *b) {
            self.best = Some((params.clone(), ll));
        }
        let settled = match self.previous {
            Some(prev) => {
                self.change = relative_change(ll, prev);
                if self.change < 0.0 {
                    debug!(relative_change = self.change, "log-likelihood decreased");
                }
                self.change.abs() < tolerance
            }
            None => false,
        };
        self.previous = Some(ll);
        settled
    }

    fn into_best(self) -> Option<(DfmParams, f64)> {
        self.best
    }
}

/// Runs EM from `init` on the standardized observation matrix `y`.
#[tracing::instrument(skip_all, fields(series = structure.n_series(), periods = y.nrows()))]
pub(crate) fn estimate(
    structure: &ModelStructure,
    y: &Array2<f64>,
    init: DfmParams,
    config: &EmConfig,
) -> Result<EmOutcome, DfmError> {
    let mut state = EmState::Initialized;
    debug!(%state, "starting EM");

    let mut params = init;
    let mut progress = Progress::new();
    let mut settled_at = None;

    for iteration in 1..=config.max_iterations {
        state = EmState::Filtering;
        trace!(%state, iteration);
        let ss = structure.state_space(&params);
        let out = kalman::filter(&ss, y)?;
        let ll = out.log_likelihood;

        if progress.observe(&params, ll, config.tolerance) {
            state = EmState::Converged;
            debug!(%state, iteration, log_likelihood = ll, relative_change = progress.change, "EM finished");
            settled_at = Some(iteration);
            break;
        }

        state = EmState::Updating;
        trace!(%state, iteration, log_likelihood = ll);
        let smoothed = kalman::smooth(&ss, &out);
        params = m_step(structure, y, &params, &smoothed, config);
    }

    let change = progress.change;
    let (params, log_likelihood) = progress.into_best().ok_or_else(|| DfmError::InvalidConfig {
        reason: "max_iterations must be >= 1".to_string(),
    })?;
    let convergence = match settled_at {
        Some(iterations) => Convergence::Converged {
            iterations,
            relative_change: change,
        },
        None => {
            warn!(
                iterations = config.max_iterations,
                relative_change = change,
                log_likelihood,
                "EM reached the iteration cap without converging"
            );
            Convergence::NotConverged {
                iterations: config.max_iterations,
                relative_change: change,
            }
        }
    };
    Ok(EmOutcome {
        params,
        log_likelihood,
        convergence,
    })
}

/// Closed-form parameter update from smoothed moments.
pub(crate) fn m_step(
    structure: &ModelStructure,
    y: &Array2<f64>,
    current: &DfmParams,
    smoothed: &Smoothed,
    config: &EmConfig,
) -> DfmParams {
    let n = y.nrows();
    let m = structure.state_dim();

    // E[x xᵀ] per period.
    let second: Vec<Array2<f64>> = smoothed
        .mean
        .iter()
        .zip(&smoothed.cov)
        .map(|(x, v)| outer(x, x) + v)
        .collect();

    let mut loadings = current.loadings().clone();
    let mut obs_var = current.obs_var().clone();
    for i in 0..structure.n_series() {
        let mut s_xx = Array2::<f64>::zeros((m, m));
        let mut s_yx = Array1::<f64>::zeros(m);
        let mut s_yy = 0.0;
        let mut count = 0usize;
        for t in 0..n {
            let yt = y[[t, i]];
            if yt.is_nan() {
                continue;
            }
            s_xx += &second[t];
            s_yx.scaled_add(yt, &smoothed.mean[t]);
            s_yy += yt * yt;
            count += 1;
        }
        if count == 0 {
            continue;
        }

        // the idiosyncratic lags enter with unit loading: regress y - dᵀx
        let idio = structure.idiosyncratic_row(i);
        let target = match &idio {
            Some(d) => &s_yx - &s_xx.dot(d),
            None => s_yx.clone(),
        };
        let c = structure.selector(i);
        let den = c.dot(&s_xx).dot(&c.t());
        let num = c.dot(&target);
        let lambda = match linalg::inverse_spd(&den) {
            Some(inv) => inv.dot(&num),
            None => {
                debug!(series = %structure.series()[i].id, "loading update skipped: singular moments");
                structure.loadings_of(i, current)
            }
        };
        for (col, value) in structure.loading_columns(i).into_iter().zip(lambda.iter()) {
            loadings[[i, col]] = *value;
        }

        if idio.is_none() {
            let z = c.t().dot(&lambda);
            let r = (s_yy - 2.0 * z.dot(&s_yx) + z.dot(&s_xx.dot(&z))) / count as f64;
            obs_var[i] = r.max(config.min_obs_variance());
        }
    }

    let mut total = Array2::<f64>::zeros((m, m));
    for e in &second {
        total += e;
    }
    let mut transition = Vec::with_capacity(structure.blocks().len());
    let mut process_cov = Vec::with_capacity(structure.blocks().len());
    for (b, block) in structure.blocks().iter().enumerate() {
        let cur = block.current();
        let reg = block.regressors();
        let s_ff = total.slice(s![cur.clone(), cur.clone()]).to_owned();
        let s_fz = total.slice(s![cur.clone(), reg.clone()]).to_owned();
        let s_zz = total.slice(s![reg.clone(), reg.clone()]).to_owned();

        match linalg::solve(&s_zz, &s_fz.t().to_owned()) {
            Some(a_t) => {
                let a = a_t.t().to_owned();
                let mut q = (&s_ff - &a.dot(&s_fz.t())) / n as f64;
                linalg::clean_covariance(&mut q);
                for d in q.diag_mut() {
                    *d = d.max(MIN_PROCESS_VARIANCE);
                }
                transition.push(a);
                process_cov.push(q);
            }
            None => {
                debug!(block = %block.name, "VAR update skipped: singular moments");
                transition.push(current.transition()[b].clone());
                process_cov.push(current.process_cov()[b].clone());
            }
        }
    }

    let params = DfmParams::new(loadings, transition, process_cov, obs_var);
    if structure.idiosyncratic().is_empty() {
        return params;
    }

    // AR(1) per idiosyncratic state, from the same-period moments of
    // [e_t, e_{t-1}]
    let mut ar = current.idiosyncratic_ar().clone();
    let mut var = current.idiosyncratic_var().clone();
    for (i, idio) in structure.idiosyncratic().iter().enumerate() {
        let o = idio.state_offset;
        let (s_ee, s_el, s_ll) = (total[[o, o]], total[[o, o + 1]], total[[o + 1, o + 1]]);
        if !s_ll.is_finite() || s_ll <= f64::EPSILON {
            debug!(series = %structure.series()[i].id, "idiosyncratic update skipped: no variance");
            continue;
        }
        let rho = (s_el / s_ll).clamp(-MAX_IDIOSYNCRATIC_AR, MAX_IDIOSYNCRATIC_AR);
        ar[i] = rho;
        var[i] = ((s_ee - rho * s_el) / n as f64).max(MIN_PROCESS_VARIANCE);
    }
    params.with_idiosyncratic(ar, var)
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let col = a.view().insert_axis(ndarray::Axis(1));
    let row = b.view().insert_axis(ndarray::Axis(0));
    col.dot(&row)
}
