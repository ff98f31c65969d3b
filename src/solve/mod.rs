//! Linear and Quadratic Sub-problem Solvers
//!
//! The update rules only need two contracts from the outside world:
//! - [`LinearSolver`]: a dense solve $`Ax = b`$, plus a path specialized to
//!   symmetric diagonally dominant M-matrices (SDDM) that may keep its
//!   factorization between calls
//! - [`QpSolver`]: $`\min_{x \geq 0} \frac12 x^TPx + q^Tx`$
//!
//! [`DenseSolver`] and [`ProjectedGaussSeidel`] implement them with
//! `ndarray-linalg`. The [`repair`](fn.repair_sddm.html) routines turn a
//! numerically messy Hessian into a matrix the SDDM path accepts.

mod qp;
pub use qp::*;
mod repair;
pub use repair::*;

use crate::error::Result;
use log::warn;
use ndarray::prelude::*;
use ndarray::OwnedRepr;
use ndarray_linalg::{CholeskyFactorized, FactorizeC, Solve, SolveC, SVD, UPLO};

/// Solves square linear systems for the update rules.
pub trait LinearSolver {
    /// General dense solve.
    fn solve(&mut self, a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>>;

    /// Solve for an SDD M-matrix. With `reuse_factorization` set, a cached
    /// factorization of the same size is used instead of `a`; the caller must
    /// know that `a` has not changed since it was cached.
    fn solve_sddm(
        &mut self,
        a: &Array2<f64>,
        b: &Array1<f64>,
        reuse_factorization: bool,
    ) -> Result<Array1<f64>>;

    /// Drops any cached factorization.
    fn reset(&mut self);
}

/// LU for general systems, Cholesky for SDDM systems.
#[derive(Default)]
pub struct DenseSolver {
    factorization: Option<CholeskyFactorized<OwnedRepr<f64>>>,
}

impl DenseSolver {
    pub fn new() -> Self {
        DenseSolver::default()
    }

    /// True while a factorization is cached.
    pub fn is_factorized(&self) -> bool {
        self.factorization.is_some()
    }
}

impl LinearSolver for DenseSolver {
    fn solve(&mut self, a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(a.solve(b)?)
    }

    fn solve_sddm(
        &mut self,
        a: &Array2<f64>,
        b: &Array1<f64>,
        reuse_factorization: bool,
    ) -> Result<Array1<f64>> {
        if reuse_factorization {
            if let Some(factor) = &self.factorization {
                if factor.factor.nrows() == b.len() {
                    return Ok(factor.solvec(b)?);
                }
            }
        }
        match a.factorizec(UPLO::Lower) {
            Ok(factor) => {
                let x = factor.solvec(b)?;
                if reuse_factorization {
                    self.factorization = Some(factor);
                }
                Ok(x)
            }
            // semi-definite Laplacians land here
            Err(err) => {
                warn!("cholesky failed ({}), falling back to LU", err);
                self.solve(a, b)
            }
        }
    }

    fn reset(&mut self) {
        self.factorization = None;
    }
}

/// Moore-Penrose pseudo-inverse
///
/// Singular values below `rcond` times the largest are treated as zero.
pub fn pinv(a: &Array2<f64>, rcond: f64) -> Result<Array2<f64>> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Ok(Array2::zeros((n, m)));
    }
    let (u, s, vt) = a.svd(true, true)?;
    // both were requested
    let (u, vt) = match (u, vt) {
        (Some(u), Some(vt)) => (u, vt),
        _ => unreachable!(),
    };
    let k = s.len();
    let cutoff = rcond * s.fold(0., |m: f64, &v| m.max(v));
    let s_inv = s.mapv(|v| if v > cutoff { 1. / v } else { 0. });
    let us = &u.slice(s![.., ..k]) * &s_inv;
    Ok(vt.slice(s![..k, ..]).t().dot(&us.t()))
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;

    #[test]
    fn dense_solve() {
        let A = array![[3., 1.], [1., 2.]];
        let x = array![1., -2.];
        let b = A.dot(&x);
        let mut solver = DenseSolver::new();
        assert_abs_diff_eq!(solver.solve(&A, &b).unwrap(), x, epsilon = 1e-12);
        assert_abs_diff_eq!(solver.solve_sddm(&A, &b, false).unwrap(), x, epsilon = 1e-12);
        assert!(!solver.is_factorized());
    }

    #[test]
    fn sddm_reuses_factorization_until_reset() {
        let A = array![[2., -1.], [-1., 2.]];
        let B = array![[4., -1.], [-1., 4.]];
        let b = array![1., 1.];
        let mut solver = DenseSolver::new();
        let x = solver.solve_sddm(&A, &b, true).unwrap();
        assert!(solver.is_factorized());
        assert_abs_diff_eq!(A.dot(&x), b, epsilon = 1e-12);

        // B is ignored while the factorization of A is cached
        let y = solver.solve_sddm(&B, &b, true).unwrap();
        assert_abs_diff_eq!(y, x, epsilon = 1e-12);

        solver.reset();
        let y = solver.solve_sddm(&B, &b, true).unwrap();
        assert_abs_diff_eq!(B.dot(&y), b, epsilon = 1e-12);
    }

    #[test]
    fn pinv_of_singular_matrix() {
        let A = array![[1., 1.], [1., 1.]];
        let P = pinv(&A, 1e-15).unwrap();
        assert_abs_diff_eq!(P, array![[0.25, 0.25], [0.25, 0.25]], epsilon = 1e-12);
        // Penrose: A P A = A
        assert_abs_diff_eq!(A.dot(&P).dot(&A), A, epsilon = 1e-12);
    }

    #[test]
    fn pinv_of_invertible_matrix_is_inverse() {
        let M = Array::random((4, 4), Normal::new(0., 1.).unwrap());
        let A = M.t().dot(&M) + Array2::<f64>::eye(4);
        let P = pinv(&A, 1e-15).unwrap();
        assert_abs_diff_eq!(P.dot(&A), Array2::eye(4), epsilon = 1e-8);
    }
}
