//! Dense linear algebra for the Kalman recursions and EM.
//!
//! The model works on `ndarray` matrices; factorisations are delegated to
//! `nalgebra` and converted at the boundary. State dimensions stay in the
//! tens, so the copies are cheap next to the `O(n³)` work.
//!
//! **Not part of the public API.**

use nalgebra::{Cholesky, DMatrix, Dyn};
use ndarray::{Array1, Array2};

/// Pivot magnitude below which a solve reports a singular system.
const PIVOT_TOL: f64 = 1e-14;

/// Maximum number of doubling steps for the Lyapunov solver.
const LYAPUNOV_MAX_STEPS: usize = 64;

fn to_nalgebra(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn to_ndarray(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Cholesky factor `A = L Lᵀ` of a symmetric positive-definite matrix.
pub(crate) struct SpdFactor(Cholesky<f64, Dyn>);

impl SpdFactor {
    /// Lower factor `L`.
    #[cfg(test)]
    pub(crate) fn l(&self) -> Array2<f64> {
        to_ndarray(&self.0.l())
    }

    /// `ln |A|`.
    pub(crate) fn log_det(&self) -> f64 {
        2.0 * self.0.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>()
    }

    /// `A⁻¹`, symmetrized.
    pub(crate) fn inverse(&self) -> Array2<f64> {
        let mut inv = to_ndarray(&self.0.inverse());
        symmetrize(&mut inv);
        inv
    }
}

/// Factorises `a`, or `None` if it is not (numerically) positive definite.
pub(crate) fn cholesky(a: &Array2<f64>) -> Option<SpdFactor> {
    let factor = to_nalgebra(a).cholesky()?;
    let positive = factor
        .l_dirty()
        .diagonal()
        .iter()
        .all(|d| *d > 0.0 && d.is_finite());
    positive.then_some(SpdFactor(factor))
}

/// Inverse of a symmetric positive-definite matrix.
pub(crate) fn inverse_spd(a: &Array2<f64>) -> Option<Array2<f64>> {
    cholesky(a).map(|f| f.inverse())
}

/// Solves `A X = B` by LU decomposition with partial pivoting.
///
/// Returns `None` when `A` is singular to working precision.
pub(crate) fn solve(a: &Array2<f64>, b: &Array2<f64>) -> Option<Array2<f64>> {
    let lu = to_nalgebra(a).lu();
    if lu
        .u()
        .diagonal()
        .iter()
        .any(|d| !d.is_finite() || d.abs() < PIVOT_TOL)
    {
        return None;
    }
    lu.solve(&to_nalgebra(b)).map(|x| to_ndarray(&x))
}

/// Eigen-decomposition of a symmetric matrix.
///
/// Returns eigenvalues in descending order and the matching eigenvectors as
/// columns.
pub(crate) fn symmetric_eigen(a: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let eigen = to_nalgebra(a).symmetric_eigen();
    let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
    order.sort_by(|&i, &j| eigen.eigenvalues[j].total_cmp(&eigen.eigenvalues[i]));
    let values = Array1::from_iter(order.iter().map(|&i| eigen.eigenvalues[i]));
    let mut vectors = Array2::<f64>::zeros((a.nrows(), order.len()));
    for (dst, &src) in order.iter().enumerate() {
        for r in 0..a.nrows() {
            vectors[[r, dst]] = eigen.eigenvectors[(r, src)];
        }
    }
    (values, vectors)
}

/// Stationary solution `P = T P Tᵀ + Q` by the doubling algorithm.
///
/// Returns `None` when the iteration does not settle, which happens when
/// `T` has an eigenvalue on or outside the unit circle.
pub(crate) fn discrete_lyapunov(t: &Array2<f64>, q: &Array2<f64>) -> Option<Array2<f64>> {
    let mut p = q.clone();
    let mut a = t.clone();
    for _ in 0..LYAPUNOV_MAX_STEPS {
        let next = &p + &a.dot(&p).dot(&a.t());
        if next.iter().any(|x| !x.is_finite()) {
            return None;
        }
        let diff = (&next - &p).iter().fold(0.0_f64, |m, x| m.max(x.abs()));
        let size = next.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
        p = next;
        if diff <= 1e-12 * (1.0 + size) {
            symmetrize(&mut p);
            return Some(p);
        }
        a = a.dot(&a);
    }
    None
}

/// Replaces `a` by `(a + aᵀ) / 2`.
pub(crate) fn symmetrize(a: &mut Array2<f64>) {
    let n = a.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let m = 0.5 * (a[[i, j]] + a[[j, i]]);
            a[[i, j]] = m;
            a[[j, i]] = m;
        }
    }
}

/// Symmetrizes `a` and clamps negative diagonal entries to zero.
pub(crate) fn clean_covariance(a: &mut Array2<f64>) {
    symmetrize(a);
    for d in a.diag_mut() {
        if *d < 0.0 {
            *d = 0.0;
        }
    }
}
