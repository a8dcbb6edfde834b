//! Model parameters and their principal-components starting values.

use ndarray::{Array1, Array2, Axis, s};
use nowcast_panel::Frequency;
use tracing::debug;

use crate::linalg;
use crate::state_space::ModelStructure;

/// Bound on the magnitude of an idiosyncratic AR(1) coefficient.
pub(crate) const MAX_IDIOSYNCRATIC_AR: f64 = 0.99;

/// Parameters of a dynamic factor model, in standardized units.
///
/// | Field | Shape | Meaning |
/// |-------|-------|---------|
/// | `loadings` | series × factors | zero where a series does not load on a block |
/// | `transition[b]` | `k_b × k_b·p_b` | VAR coefficients `[A_1 … A_p]` of block `b` |
/// | `process_cov[b]` | `k_b × k_b` | innovation covariance of block `b` |
/// | `obs_var` | series | observation noise variances |
/// | `idiosyncratic_ar` | series or empty | AR(1) coefficients of the idiosyncratic states |
/// | `idiosyncratic_var` | series or empty | innovation variances of the idiosyncratic states |
///
/// With idiosyncratic AR(1) states the observation noise is held at the
/// EM variance floor and the idiosyncratic dynamics carry the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct DfmParams {
    loadings: Array2<f64>,
    transition: Vec<Array2<f64>>,
    process_cov: Vec<Array2<f64>>,
    obs_var: Array1<f64>,
    idiosyncratic_ar: Array1<f64>,
    idiosyncratic_var: Array1<f64>,
}

impl DfmParams {
    pub(crate) fn new(
        loadings: Array2<f64>,
        transition: Vec<Array2<f64>>,
        process_cov: Vec<Array2<f64>>,
        obs_var: Array1<f64>,
    ) -> Self {
        Self {
            loadings,
            transition,
            process_cov,
            obs_var,
            idiosyncratic_ar: Array1::zeros(0),
            idiosyncratic_var: Array1::zeros(0),
        }
    }

    pub(crate) fn with_idiosyncratic(mut self, ar: Array1<f64>, var: Array1<f64>) -> Self {
        self.idiosyncratic_ar = ar;
        self.idiosyncratic_var = var;
        self
    }

    /// Factor loadings (series × factors).
    pub fn loadings(&self) -> &Array2<f64> {
        &self.loadings
    }

    /// Per-block VAR coefficients.
    pub fn transition(&self) -> &[Array2<f64>] {
        &self.transition
    }

    /// Per-block process noise covariances.
    pub fn process_cov(&self) -> &[Array2<f64>] {
        &self.process_cov
    }

    /// Observation noise variances.
    pub fn obs_var(&self) -> &Array1<f64> {
        &self.obs_var
    }

    /// AR(1) coefficients of the idiosyncratic states; empty when the
    /// idiosyncratic errors are white noise.
    pub fn idiosyncratic_ar(&self) -> &Array1<f64> {
        &self.idiosyncratic_ar
    }

    /// Innovation variances of the idiosyncratic states; empty when the
    /// idiosyncratic errors are white noise.
    pub fn idiosyncratic_var(&self) -> &Array1<f64> {
        &self.idiosyncratic_var
    }
}

/// Starting values from principal components.
///
/// Works on a zero-filled copy of the standardized panel in which each
/// quarterly value is spread over the months its aggregation spans (divided
/// by the sum of the aggregation weights). Blocks are extracted in declaration
/// order, each from the residual left by the previous ones. The leading
/// eigenvectors of a block's residual covariance are its loadings; the
/// resulting factors are regressed on their own lags for the VAR, and the
/// residual variances of the actual observations give the noise variances
/// (or seed the idiosyncratic AR(1) states, when the model has them).
pub(crate) fn initial_params(
    structure: &ModelStructure,
    y: &Array2<f64>,
    min_obs_variance: f64,
) -> DfmParams {
    let (n, n_series) = y.dim();
    let mut residual = fill_panel(structure, y);
    let mut loadings = Array2::<f64>::zeros((n_series, structure.factor_dim()));
    let mut transition = Vec::with_capacity(structure.blocks().len());
    let mut process_cov = Vec::with_capacity(structure.blocks().len());
    let mut factors = Vec::with_capacity(structure.blocks().len());

    for (b, block) in structure.blocks().iter().enumerate() {
        let members: Vec<usize> = (0..n_series)
            .filter(|&i| structure.series()[i].blocks.contains(&b))
            .collect();
        let x = residual.select(Axis(1), &members);
        let cov = x.t().dot(&x) / n.max(1) as f64;
        let (values, vectors) = linalg::symmetric_eigen(&cov);
        let v = vectors.slice(s![.., ..block.factors]).to_owned();
        let f = x.dot(&v);
        debug!(
            block = %block.name,
            leading_eigenvalue = values.get(0).copied().unwrap_or(0.0),
            "extracted initial factors"
        );

        for (row, &i) in members.iter().enumerate() {
            for c in 0..block.factors {
                loadings[[i, block.factor_offset + c]] = v[[row, c]];
            }
        }
        let explained = f.dot(&v.t());
        for (col, &i) in members.iter().enumerate() {
            let mut r = residual.column_mut(i);
            r -= &explained.column(col);
        }

        let (a, q) = var_ols(&f, block.order);
        transition.push(a);
        process_cov.push(q);
        factors.push(f);
    }

    let errors = fitted_errors(structure, y, &loadings, &factors);
    let obs_var = Array1::from_iter(errors.columns().into_iter().map(|e| {
        let (ss, count) = e
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(ss, count), v| (ss + v * v, count + 1));
        if count == 0 {
            1.0
        } else {
            (ss / count as f64).max(min_obs_variance)
        }
    }));

    let params = DfmParams::new(loadings, transition, process_cov, obs_var);
    if structure.idiosyncratic().is_empty() {
        params
    } else {
        idiosyncratic_start(structure, &errors, params, min_obs_variance)
    }
}

/// Observations minus their principal-components fit; `NaN` where missing.
fn fitted_errors(
    structure: &ModelStructure,
    y: &Array2<f64>,
    loadings: &Array2<f64>,
    factors: &[Array2<f64>],
) -> Array2<f64> {
    let (n, n_series) = y.dim();
    let mut errors = Array2::from_elem((n, n_series), f64::NAN);
    for i in 0..n_series {
        let weights = structure.lag_weights(i);
        for t in 0..n {
            let yt = y[[t, i]];
            if yt.is_nan() {
                continue;
            }
            let mut fitted = 0.0;
            for &b in &structure.series()[i].blocks {
                let block = &structure.blocks()[b];
                for (j, w) in weights.iter().enumerate() {
                    if t < j {
                        continue;
                    }
                    for c in 0..block.factors {
                        fitted += w * loadings[[i, block.factor_offset + c]] * factors[b][[t - j, c]];
                    }
                }
            }
            errors[[t, i]] = yt - fitted;
        }
    }
    errors
}

/// AR(1) starting values for the idiosyncratic states.
///
/// The coefficient comes from consecutive observed errors (none for
/// quarterly series, which start at zero). The innovation variance keeps
/// the error variance, deflated by `1 − ρ²` and by the squared aggregation
/// weights; observation noise drops to `floor`.
fn idiosyncratic_start(
    structure: &ModelStructure,
    errors: &Array2<f64>,
    mut params: DfmParams,
    floor: f64,
) -> DfmParams {
    let n_series = errors.ncols();
    let mut ar = Array1::<f64>::zeros(n_series);
    let mut var = Array1::<f64>::zeros(n_series);
    for (i, e) in errors.columns().into_iter().enumerate() {
        let (mut cross, mut lagged) = (0.0, 0.0);
        for t in 1..e.len() {
            if !e[t].is_nan() && !e[t - 1].is_nan() {
                cross += e[t] * e[t - 1];
                lagged += e[t - 1] * e[t - 1];
            }
        }
        let rho = if lagged > 0.0 {
            (cross / lagged).clamp(-MAX_IDIOSYNCRATIC_AR, MAX_IDIOSYNCRATIC_AR)
        } else {
            0.0
        };
        let gain: f64 = structure.lag_weights(i).iter().map(|w| w * w).sum();
        ar[i] = rho;
        var[i] = (params.obs_var[i] * (1.0 - rho * rho) / gain.max(f64::EPSILON)).max(floor);
    }
    debug!(?ar, "idiosyncratic AR(1) starting values");
    params.obs_var = Array1::from_elem(n_series, floor);
    params.with_idiosyncratic(ar, var)
}

/// Zero-filled monthly proxy of the observation matrix.
fn fill_panel(structure: &ModelStructure, y: &Array2<f64>) -> Array2<f64> {
    let (n, n_series) = y.dim();
    let weights = structure.aggregation_weights();
    let span = weights.len().max(1);
    let weight_sum: f64 = weights.iter().sum();
    let spread = if weight_sum.abs() > f64::EPSILON { weight_sum } else { 1.0 };
    let mut x = Array2::<f64>::zeros((n, n_series));
    for i in 0..n_series {
        let quarterly = structure.series()[i].frequency == Frequency::Quarterly;
        for t in 0..n {
            let v = y[[t, i]];
            if v.is_nan() {
                continue;
            }
            if quarterly {
                for back in 0..span.min(t + 1) {
                    x[[t - back, i]] = v / spread;
                }
            } else {
                x[[t, i]] = v;
            }
        }
    }
    x
}

/// VAR(p) by least squares on the rows of `f`; falls back to a white-noise
/// process when the regression is degenerate.
fn var_ols(f: &Array2<f64>, order: usize) -> (Array2<f64>, Array2<f64>) {
    let (n, k) = f.dim();
    let white_noise = || {
        let mut q = f.t().dot(f) / n.max(1) as f64;
        linalg::clean_covariance(&mut q);
        for d in q.diag_mut() {
            *d = d.max(1e-4);
        }
        (Array2::zeros((k, k * order)), q)
    };
    if n <= order + k * order {
        return white_noise();
    }

    let rows = n - order;
    let mut lhs = Array2::<f64>::zeros((rows, k));
    let mut rhs = Array2::<f64>::zeros((rows, k * order));
    for t in order..n {
        lhs.row_mut(t - order).assign(&f.row(t));
        for lag in 1..=order {
            rhs.slice_mut(s![t - order, (lag - 1) * k..lag * k])
                .assign(&f.row(t - lag));
        }
    }
    let xtx = rhs.t().dot(&rhs);
    let xty = rhs.t().dot(&lhs);
    let Some(coef) = linalg::solve(&xtx, &xty) else {
        return white_noise();
    };
    let a = coef.t().to_owned();
    let resid = &lhs - &rhs.dot(&coef);
    let mut q = resid.t().dot(&resid) / rows as f64;
    linalg::clean_covariance(&mut q);
    for d in q.diag_mut() {
        *d = d.max(1e-4);
    }
    (a, q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{FactorSpec, TimeAggregation};
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn var_ols_recovers_ar1() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let n = 4000;
        let mut f = Array2::<f64>::zeros((n, 1));
        for t in 1..n {
            f[[t, 0]] = 0.6 * f[[t - 1, 0]] + normal.sample(&mut rng);
        }
        let (a, q) = var_ols(&f, 1);
        assert_abs_diff_eq!(a[[0, 0]], 0.6, epsilon = 0.05);
        assert_abs_diff_eq!(q[[0, 0]], 1.0, epsilon = 0.1);
    }

    #[test]
    fn var_ols_degenerate_falls_back() {
        let f = Array2::<f64>::zeros((10, 1));
        let (a, q) = var_ols(&f, 1);
        assert_eq!(a[[0, 0]], 0.0);
        assert!(q[[0, 0]] > 0.0);
    }

    #[test]
    fn quarterly_values_fill_the_aggregation_span() {
        let spec = FactorSpec::builder()
            .block("G", 1, 1)
            .assign("M", &["G"])
            .assign("Q", &["G"])
            .aggregation(TimeAggregation::MarianoMurasawa)
            .build()
            .unwrap();
        let structure =
            ModelStructure::new(&spec, &["M".to_string()], &["Q".to_string()]).unwrap();
        let mut y = Array2::from_elem((8, 2), f64::NAN);
        y.column_mut(0).fill(0.5);
        y[[6, 1]] = 18.0;

        let x = fill_panel(&structure, &y);
        let spread: Vec<f64> = x.column(1).to_vec();
        assert_eq!(spread, vec![0.0, 0.0, 2.0, 2.0, 2.0, 2.0, 2.0, 0.0]);
        assert!(x.column(0).iter().all(|v| *v == 0.5));
    }

    #[test]
    fn initial_params_shapes_and_zero_pattern() {
        let spec = FactorSpec::builder()
            .block("G", 1, 2)
            .block("R", 1, 1)
            .assign("A", &["G"])
            .assign("B", &["G", "R"])
            .assign("C", &["G", "R"])
            .build()
            .unwrap();
        let ids: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let structure = ModelStructure::new(&spec, &ids, &[]).unwrap();

        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let y = Array2::from_shape_fn((60, 3), |(t, i)| {
            if i == 2 && t % 5 == 0 {
                f64::NAN
            } else {
                (t as f64 * 0.3).sin() + 0.3 * normal.sample(&mut rng)
            }
        });
        let p = initial_params(&structure, &y, 1e-4);
        assert_eq!(p.loadings().dim(), (3, 2));
        assert_eq!(p.loadings()[[0, 1]], 0.0);
        assert_eq!(p.transition()[0].dim(), (1, 2));
        assert_eq!(p.transition()[1].dim(), (1, 1));
        assert!(p.obs_var().iter().all(|v| *v >= 1e-4 && v.is_finite()));
    }
}
