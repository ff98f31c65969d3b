use crate::error::{BcdError, Result};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// Solves $`\min_{x \geq 0} \frac12 x^TPx + q^Tx`$ for a positive
/// semi-definite $`P`$.
pub trait QpSolver {
    fn solve_nonneg(&mut self, p: &Array2<f64>, q: &Array1<f64>) -> Result<Array1<f64>>;
}

/// Projected Gauss-Seidel
///
/// Sweeps the coordinates in order, minimizing exactly over each one and
/// clamping at zero:
/// ```math
/// x_i \leftarrow \max\left(0, x_i - \frac{(Px + q)_i}{P_{ii}}\right)
/// ```
/// Stops when a sweep moves no coordinate by more than `tolerance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectedGaussSeidel {
    pub max_sweeps: usize,
    pub tolerance: f64,
}

impl Default for ProjectedGaussSeidel {
    fn default() -> Self {
        ProjectedGaussSeidel {
            max_sweeps: 10_000,
            tolerance: 1e-13,
        }
    }
}

impl QpSolver for ProjectedGaussSeidel {
    fn solve_nonneg(&mut self, p: &Array2<f64>, q: &Array1<f64>) -> Result<Array1<f64>> {
        let n = q.len();
        if p.dim() != (n, n) {
            return Err(BcdError::contract(format!(
                "qp needs a square {}x{} matrix, got {:?}",
                n,
                n,
                p.dim()
            )));
        }
        let mut x = Array1::zeros(n);
        for _sweep in 0..self.max_sweeps {
            let mut largest = 0f64;
            for i in 0..n {
                let pii = p[[i, i]];
                let gi = p.row(i).dot(&x) + q[i];
                let xi = if pii > 0. {
                    (x[i] - gi / pii).max(0.)
                } else if gi >= 0. {
                    // flat coordinate, the bound is optimal
                    0.
                } else {
                    return Err(BcdError::contract(format!(
                        "qp is unbounded below along coordinate {}",
                        i
                    )));
                };
                largest = largest.max((xi - x[i]).abs());
                x[i] = xi;
            }
            if largest <= self.tolerance {
                break;
            }
        }
        Ok(x)
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;

    #[test]
    fn clamps_the_infeasible_coordinate() {
        let P = array![[2., 0.], [0., 2.]];
        let q = array![-2., 4.];
        let x = ProjectedGaussSeidel::default().solve_nonneg(&P, &q).unwrap();
        assert_abs_diff_eq!(x, array![1., 0.], epsilon = 1e-12);
    }

    #[test]
    fn interior_solution_matches_linear_solve() {
        let P = array![[4., 1.], [1., 3.]];
        let x_star = array![1., 2.];
        let q = -P.dot(&x_star);
        let x = ProjectedGaussSeidel::default().solve_nonneg(&P, &q).unwrap();
        assert_abs_diff_eq!(x, x_star, epsilon = 1e-10);
    }

    #[test]
    fn kkt_conditions_hold() {
        let A = Array::random((10, 4), Normal::new(0., 1.).unwrap());
        let P = A.t().dot(&A);
        let q = Array::random(4, Normal::new(0., 1.).unwrap());
        let x = ProjectedGaussSeidel::default().solve_nonneg(&P, &q).unwrap();
        let g = P.dot(&x) + &q;
        for i in 0..4 {
            assert!(x[i] >= 0.);
            assert!(g[i] >= -1e-8);
            assert!((x[i] * g[i]).abs() <= 1e-8);
        }
    }

    #[test]
    fn unbounded_problem_is_rejected() {
        let P = Array2::zeros((1, 1));
        let q = array![-1.];
        assert!(ProjectedGaussSeidel::default().solve_nonneg(&P, &q).is_err());
    }
}
