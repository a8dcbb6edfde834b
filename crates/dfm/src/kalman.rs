//! Kalman filter and fixed-interval smoother for panels with missing data.
//!
//! At each period the rows of `y` that are `NaN` are dropped, so any
//! missingness pattern is handled without imputation. The smoother is the
//! Durbin–Koopman backward recursion on `(r_t, N_t)`, which never inverts a
//! predicted state covariance.
//!
//! The filter keeps its gains, which makes the mean recursions linear in the
//! data for a fixed observation pattern: [`smoothed_means`] replays them on
//! other data with the same pattern.
//!
//! **Not part of the public API.**

use std::f64::consts::PI;

use ndarray::{Array1, Array2, Axis};

use crate::error::DfmError;
use crate::linalg;

/// Linear Gaussian state-space model with diagonal observation noise.
#[derive(Debug, Clone)]
pub(crate) struct StateSpace {
    /// Transition `T` (m×m).
    pub(crate) t: Array2<f64>,
    /// Design `Z` (n×m).
    pub(crate) z: Array2<f64>,
    /// Process noise covariance `Q` (m×m).
    pub(crate) q: Array2<f64>,
    /// Observation noise variances (n).
    pub(crate) h: Array1<f64>,
    /// Initial state mean.
    pub(crate) a0: Array1<f64>,
    /// Initial state covariance.
    pub(crate) p0: Array2<f64>,
}

/// Quantities of one measurement update.
#[derive(Debug, Clone)]
pub(crate) struct UpdateStep {
    /// Indices of the series observed at this period.
    pub(crate) observed: Vec<usize>,
    /// Innovation `v = y_o - Z_o a`.
    pub(crate) v: Array1<f64>,
    /// `F⁻¹` with `F = Z_o P Z_oᵀ + H_o`.
    pub(crate) f_inv: Array2<f64>,
    /// `P Z_oᵀ F⁻¹` (m × n_o).
    pub(crate) gain: Array2<f64>,
}

/// Output of [`filter`].
#[derive(Debug, Clone)]
pub(crate) struct FilterOutput {
    /// `a_{t|t-1}`.
    pub(crate) a_pred: Vec<Array1<f64>>,
    /// `P_{t|t-1}`.
    pub(crate) p_pred: Vec<Array2<f64>>,
    /// `a_{t|t}`.
    #[allow(dead_code)]
    pub(crate) a_filt: Vec<Array1<f64>>,
    /// `P_{t|t}`.
    #[allow(dead_code)]
    pub(crate) p_filt: Vec<Array2<f64>>,
    pub(crate) steps: Vec<UpdateStep>,
    pub(crate) log_likelihood: f64,
}

/// Smoothed state moments.
#[derive(Debug, Clone)]
pub(crate) struct Smoothed {
    pub(crate) mean: Vec<Array1<f64>>,
    pub(crate) cov: Vec<Array2<f64>>,
}

/// Runs the Kalman filter over the rows of `y` (periods × series).
///
/// # Errors
///
/// [`DfmError::SingularCovariance`] if an innovation covariance is not
/// positive definite or the state becomes non-finite.
pub(crate) fn filter(ss: &StateSpace, y: &Array2<f64>) -> Result<FilterOutput, DfmError> {
    let n = y.nrows();
    let mut out = FilterOutput {
        a_pred: Vec::with_capacity(n),
        p_pred: Vec::with_capacity(n),
        a_filt: Vec::with_capacity(n),
        p_filt: Vec::with_capacity(n),
        steps: Vec::with_capacity(n),
        log_likelihood: 0.0,
    };

    let mut a = ss.a0.clone();
    let mut p = ss.p0.clone();
    let ln_2pi = (2.0 * PI).ln();

    for (t, row) in y.axis_iter(Axis(0)).enumerate() {
        let observed: Vec<usize> = (0..row.len()).filter(|&i| !row[i].is_nan()).collect();

        let (a_f, p_f, step) = if observed.is_empty() {
            (
                a.clone(),
                p.clone(),
                UpdateStep {
                    observed,
                    v: Array1::zeros(0),
                    f_inv: Array2::zeros((0, 0)),
                    gain: Array2::zeros((a.len(), 0)),
                },
            )
        } else {
            let z_o = ss.z.select(Axis(0), &observed);
            let y_o = Array1::from_iter(observed.iter().map(|&i| row[i]));
            let v = &y_o - &z_o.dot(&a);
            let pz = p.dot(&z_o.t());
            let mut f = z_o.dot(&pz);
            for (k, &i) in observed.iter().enumerate() {
                f[[k, k]] += ss.h[i];
            }
            linalg::symmetrize(&mut f);
            let chol = linalg::cholesky(&f).ok_or_else(|| DfmError::SingularCovariance {
                period: t,
                reason: "innovation covariance is not positive definite".to_string(),
            })?;
            let f_inv = chol.inverse();
            let gain = pz.dot(&f_inv);

            let fv = f_inv.dot(&v);
            out.log_likelihood -=
                0.5 * (observed.len() as f64 * ln_2pi + chol.log_det() + v.dot(&fv));

            let a_f = &a + &gain.dot(&v);
            let mut p_f = &p - &gain.dot(&pz.t());
            linalg::clean_covariance(&mut p_f);
            (
                a_f,
                p_f,
                UpdateStep {
                    observed,
                    v,
                    f_inv,
                    gain,
                },
            )
        };

        if a_f.iter().chain(p_f.iter()).any(|x| !x.is_finite()) {
            return Err(DfmError::SingularCovariance {
                period: t,
                reason: "filtered state is not finite".to_string(),
            });
        }

        let a_next = ss.t.dot(&a_f);
        let mut p_next = ss.t.dot(&p_f).dot(&ss.t.t()) + &ss.q;
        linalg::clean_covariance(&mut p_next);

        out.a_pred.push(std::mem::replace(&mut a, a_next));
        out.p_pred.push(std::mem::replace(&mut p, p_next));
        out.a_filt.push(a_f);
        out.p_filt.push(p_f);
        out.steps.push(step);
    }

    Ok(out)
}

/// Durbin–Koopman smoother: smoothed means and covariances for every period.
pub(crate) fn smooth(ss: &StateSpace, out: &FilterOutput) -> Smoothed {
    let n = out.steps.len();
    let m = ss.a0.len();
    let mut mean = vec![Array1::zeros(m); n];
    let mut cov = vec![Array2::zeros((m, m)); n];

    let mut r = Array1::<f64>::zeros(m);
    let mut big_n = Array2::<f64>::zeros((m, m));
    let tt = ss.t.t();

    for t in (0..n).rev() {
        let step = &out.steps[t];
        let tr = tt.dot(&r);
        let tnt = tt.dot(&big_n).dot(&ss.t);
        if step.observed.is_empty() {
            r = tr;
            big_n = tnt;
        } else {
            let z_o = ss.z.select(Axis(0), &step.observed);
            // L = T (I - K Z_o) with K = P Z_oᵀ F⁻¹.
            let kz = step.gain.dot(&z_o);
            let l = &ss.t - &ss.t.dot(&kz);
            let inner = step.f_inv.dot(&step.v) - step.gain.t().dot(&tr);
            r = z_o.t().dot(&inner) + &tr;
            big_n = z_o.t().dot(&step.f_inv).dot(&z_o) + l.t().dot(&big_n).dot(&l);
        }
        linalg::symmetrize(&mut big_n);

        let p = &out.p_pred[t];
        mean[t] = &out.a_pred[t] + &p.dot(&r);
        let mut v = p - &p.dot(&big_n).dot(p);
        linalg::clean_covariance(&mut v);
        cov[t] = v;
    }

    Smoothed { mean, cov }
}

/// Smoothed means for data `y` that share the observation pattern of the
/// filter run in `out`, reusing its gains.
///
/// Only the entries of `y` at observed positions are read. With `a0 = 0`
/// the result is linear in `y`, so a unit impulse returns the smoother's
/// weight on that observation.
pub(crate) fn smoothed_means(ss: &StateSpace, out: &FilterOutput, y: &Array2<f64>) -> Vec<Array1<f64>> {
    let n = out.steps.len();
    let m = ss.a0.len();

    let mut a_pred = Vec::with_capacity(n);
    let mut innovations = Vec::with_capacity(n);
    let mut a = ss.a0.clone();
    for (t, step) in out.steps.iter().enumerate() {
        let a_f = if step.observed.is_empty() {
            innovations.push(Array1::zeros(0));
            a.clone()
        } else {
            let z_o = ss.z.select(Axis(0), &step.observed);
            let y_o = Array1::from_iter(step.observed.iter().map(|&i| y[[t, i]]));
            let v = &y_o - &z_o.dot(&a);
            let a_f = &a + &step.gain.dot(&v);
            innovations.push(v);
            a_f
        };
        let next = ss.t.dot(&a_f);
        a_pred.push(std::mem::replace(&mut a, next));
    }

    let tt = ss.t.t();
    let mut r = Array1::<f64>::zeros(m);
    let mut mean = vec![Array1::zeros(m); n];
    for t in (0..n).rev() {
        let step = &out.steps[t];
        let tr = tt.dot(&r);
        r = if step.observed.is_empty() {
            tr
        } else {
            let z_o = ss.z.select(Axis(0), &step.observed);
            let inner = step.f_inv.dot(&innovations[t]) - step.gain.t().dot(&tr);
            z_o.t().dot(&inner) + &tr
        };
        mean[t] = &a_pred[t] + &out.p_pred[t].dot(&r);
    }
    mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn scalar_ar1() -> StateSpace {
        StateSpace {
            t: array![[0.5]],
            z: array![[1.0]],
            q: array![[1.0]],
            h: array![1.0],
            a0: array![0.0],
            p0: array![[4.0 / 3.0]],
        }
    }

    #[test]
    fn ar1_hand_computed() {
        let ss = scalar_ar1();
        let y = array![[1.0], [0.0]];
        let out = filter(&ss, &y).unwrap();
        assert_abs_diff_eq!(out.a_filt[0][0], 4.0 / 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.p_filt[0][[0, 0]], 4.0 / 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.a_pred[1][0], 2.0 / 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.p_pred[1][[0, 0]], 8.0 / 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.a_filt[1][0], 2.0 / 15.0, epsilon = 1e-12);

        let ln_2pi = (2.0 * PI).ln();
        let expected = -0.5 * (ln_2pi + (7.0_f64 / 3.0).ln() + 3.0 / 7.0)
            - 0.5 * (ln_2pi + (15.0_f64 / 7.0).ln() + 4.0 / 105.0);
        assert_abs_diff_eq!(out.log_likelihood, expected, epsilon = 1e-12);

        let sm = smooth(&ss, &out);
        assert_abs_diff_eq!(sm.mean[1][0], 2.0 / 15.0, epsilon = 1e-12);
        assert_abs_diff_eq!(sm.mean[0][0], 8.0 / 15.0, epsilon = 1e-12);
    }

    #[test]
    fn missing_period_skips_update() {
        let ss = scalar_ar1();
        let y = array![[f64::NAN], [1.0]];
        let out = filter(&ss, &y).unwrap();
        assert!(out.steps[0].observed.is_empty());
        assert_abs_diff_eq!(out.a_filt[0][0], 0.0);
        assert_abs_diff_eq!(out.p_pred[1][[0, 0]], 0.25 * 4.0 / 3.0 + 1.0, epsilon = 1e-12);
    }

    #[test]
    fn replay_matches_smoother_and_is_linear() {
        let ss = StateSpace {
            t: array![[0.7, 0.0], [0.2, 0.4]],
            z: array![[1.0, 0.0], [0.5, 1.0], [0.0, 2.0]],
            q: array![[1.0, 0.1], [0.1, 0.5]],
            h: array![0.3, 0.2, 0.4],
            a0: array![0.0, 0.0],
            p0: array![[2.0, 0.1], [0.1, 1.0]],
        };
        let y = array![
            [0.3, f64::NAN, 1.0],
            [f64::NAN, f64::NAN, f64::NAN],
            [-0.4, 0.2, f64::NAN],
            [1.1, -0.5, 0.7]
        ];
        let out = filter(&ss, &y).unwrap();
        let sm = smooth(&ss, &out);
        let replayed = smoothed_means(&ss, &out, &y);
        for (a, b) in sm.mean.iter().zip(&replayed) {
            for (x, z) in a.iter().zip(b.iter()) {
                assert_abs_diff_eq!(*x, *z, epsilon = 1e-12);
            }
        }

        // Sum of impulse responses weighted by the data reproduces the mean.
        let mut total = Array1::<f64>::zeros(2);
        for ((t, i), v) in y.indexed_iter() {
            if v.is_nan() {
                continue;
            }
            let mut e = Array2::<f64>::zeros(y.dim());
            e[[t, i]] = 1.0;
            let w = smoothed_means(&ss, &out, &e);
            total = total + &w[3] * *v;
        }
        assert_abs_diff_eq!(total[0], sm.mean[3][0], epsilon = 1e-12);
        assert_abs_diff_eq!(total[1], sm.mean[3][1], epsilon = 1e-12);
    }

    #[test]
    fn singular_innovation_covariance() {
        let ss = StateSpace {
            t: array![[0.0]],
            z: array![[0.0]],
            q: array![[0.0]],
            h: array![0.0],
            a0: array![0.0],
            p0: array![[0.0]],
        };
        let err = filter(&ss, &array![[1.0]]).unwrap_err();
        assert!(matches!(err, DfmError::SingularCovariance { period: 0, .. }));
    }

    type M2 = [[f64; 2]; 2];

    fn mul(a: M2, b: M2) -> M2 {
        let mut c = [[0.0; 2]; 2];
        for i in 0..2 {
            for j in 0..2 {
                c[i][j] = a[i][0] * b[0][j] + a[i][1] * b[1][j];
            }
        }
        c
    }

    fn transpose(a: M2) -> M2 {
        [[a[0][0], a[1][0]], [a[0][1], a[1][1]]]
    }

    fn mat_vec(a: M2, v: [f64; 2]) -> [f64; 2] {
        [a[0][0] * v[0] + a[0][1] * v[1], a[1][0] * v[0] + a[1][1] * v[1]]
    }

    #[test]
    fn two_state_two_series_closed_form() {
        let t: M2 = [[0.6, 0.2], [0.0, 0.5]];
        let z: M2 = [[1.0, 0.0], [0.5, 1.0]];
        let q: M2 = [[1.0, 0.0], [0.0, 0.5]];
        let h = [0.2, 0.3];
        let p0: M2 = [[1.5, 0.1], [0.1, 0.8]];
        let y = [[0.4, -0.2], [1.1, 0.7], [-0.3, 0.1], [0.0, -0.9], [0.8, 0.5]];

        let ss = StateSpace {
            t: Array2::from_shape_fn((2, 2), |(i, j)| t[i][j]),
            z: Array2::from_shape_fn((2, 2), |(i, j)| z[i][j]),
            q: Array2::from_shape_fn((2, 2), |(i, j)| q[i][j]),
            h: array![h[0], h[1]],
            a0: array![0.0, 0.0],
            p0: Array2::from_shape_fn((2, 2), |(i, j)| p0[i][j]),
        };
        let data = Array2::from_shape_fn((5, 2), |(r, c)| y[r][c]);
        let out = filter(&ss, &data).unwrap();

        let mut a = [0.0, 0.0];
        let mut p = p0;
        let mut ll = 0.0;
        for (k, obs) in y.iter().enumerate() {
            let za = mat_vec(z, a);
            let v = [obs[0] - za[0], obs[1] - za[1]];
            let mut f = mul(mul(z, p), transpose(z));
            f[0][0] += h[0];
            f[1][1] += h[1];
            let det = f[0][0] * f[1][1] - f[0][1] * f[1][0];
            let f_inv = [[f[1][1] / det, -f[0][1] / det], [-f[1][0] / det, f[0][0] / det]];
            let gain = mul(mul(p, transpose(z)), f_inv);
            let kv = mat_vec(gain, v);
            let a_f = [a[0] + kv[0], a[1] + kv[1]];
            let kzp = mul(mul(gain, z), p);
            let p_f = [
                [p[0][0] - kzp[0][0], p[0][1] - kzp[0][1]],
                [p[1][0] - kzp[1][0], p[1][1] - kzp[1][1]],
            ];
            let fv = mat_vec(f_inv, v);
            ll -= 0.5 * (2.0 * (2.0 * PI).ln() + det.ln() + v[0] * fv[0] + v[1] * fv[1]);

            for i in 0..2 {
                assert_abs_diff_eq!(out.a_filt[k][i], a_f[i], epsilon = 1e-12);
                for j in 0..2 {
                    assert_abs_diff_eq!(out.p_filt[k][[i, j]], p_f[i][j], epsilon = 1e-12);
                }
            }

            a = mat_vec(t, a_f);
            let tp = mul(mul(t, p_f), transpose(t));
            p = [
                [tp[0][0] + q[0][0], tp[0][1] + q[0][1]],
                [tp[1][0] + q[1][0], tp[1][1] + q[1][1]],
            ];
        }
        assert_abs_diff_eq!(out.log_likelihood, ll, epsilon = 1e-10);
    }

    #[test]
    fn one_more_observation_adds_its_predictive_density() {
        let ss = StateSpace {
            t: array![[0.7, 0.0], [0.2, 0.4]],
            z: array![[1.0, 0.0], [0.5, 1.0], [0.0, 2.0]],
            q: array![[1.0, 0.1], [0.1, 0.5]],
            h: array![0.3, 0.2, 0.4],
            a0: array![0.0, 0.0],
            p0: array![[2.0, 0.1], [0.1, 1.0]],
        };
        let nan = f64::NAN;
        let y = array![
            [0.3, nan, 1.0],
            [nan, 0.4, nan],
            [-0.4, 0.2, nan],
            [1.1, nan, 0.7],
            [nan, -0.5, 0.1],
            [0.2, 0.3, nan]
        ];
        let (row, col, value) = (3, 1, 0.7);

        let without = filter(&ss, &y).unwrap();
        let sm = smooth(&ss, &without);
        let z = ss.z.row(col);
        let mean = z.dot(&sm.mean[row]);
        let var = z.dot(&sm.cov[row].dot(&z)) + ss.h[col];
        let log_density = -0.5 * ((2.0 * PI).ln() + var.ln() + (value - mean).powi(2) / var);

        let mut more = y.clone();
        more[[row, col]] = value;
        let with = filter(&ss, &more).unwrap();

        assert_abs_diff_eq!(
            with.log_likelihood - without.log_likelihood,
            log_density,
            epsilon = 1e-10
        );
        assert!(log_density <= -0.5 * (2.0 * PI * ss.h[col]).ln());
    }
}
