use super::{add_ridge, check_rows, LossModel, Regularization};
use crate::block::restrict;
use crate::error::{BcdError, Result};
use ndarray::prelude::*;

/// Regularized Least Squares
///
/// ```math
/// f(x) = \frac12 \|Ax - b\|_2^2 + \frac{\lambda_2}{2} \|x\|_2^2
/// ```
/// The block Hessian $`A_b^TA_b + \lambda_2 I`$ does not depend on $`x`$.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    a: Array2<f64>,
    b: Array1<f64>,
    l2: f64,
    lipschitz: Array1<f64>,
}

impl LeastSquares {
    pub fn new(a: Array2<f64>, b: Array1<f64>, l2: f64) -> Result<Self> {
        check_rows("least squares", a.nrows(), b.len())?;
        let lipschitz = a.mapv(|v| v * v).sum_axis(Axis(0)) + l2;
        Ok(LeastSquares { a, b, l2, lipschitz })
    }

    fn residual(&self, x: ArrayView1<f64>) -> Array1<f64> {
        self.a.dot(&x) - &self.b
    }

    /// $`A_b^TA_b + \lambda_2 I`$
    fn gram(&self, block: Option<&[usize]>) -> Array2<f64> {
        let g = match block {
            None => self.a.t().dot(&self.a),
            Some(b) => {
                let ab = self.a.select(Axis(1), b);
                ab.t().dot(&ab)
            }
        };
        add_ridge(g, self.l2)
    }
}

impl LossModel for LeastSquares {
    fn n_params(&self) -> usize {
        self.a.ncols()
    }

    fn lipschitz(&self) -> ArrayView1<'_, f64> {
        self.lipschitz.view()
    }

    fn value(&self, x: ArrayView1<f64>) -> Result<f64> {
        let r = self.residual(x);
        Ok(0.5 * r.dot(&r) + 0.5 * self.l2 * x.dot(&x))
    }

    fn gradient(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array1<f64> {
        let r = self.residual(x);
        let reg = restrict(x, block) * self.l2;
        match block {
            None => self.a.t().dot(&r) + reg,
            Some(b) => self.a.select(Axis(1), b).t().dot(&r) + reg,
        }
    }

    fn hessian(&self, _x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        self.gram(block)
    }

    fn is_quadratic(&self) -> bool {
        true
    }

    fn has_constant_hessian(&self) -> bool {
        self.l2 == 0.
    }
}

/// Non-negative Least Squares with an L1 penalty
///
/// ```math
/// f(x) = \frac12 \|Ax - b\|_2^2 + \lambda_1 \sum_j x_j + \frac{\lambda_2}{2} \|x\|_2^2,
/// \quad x \geq 0
/// ```
/// On the feasible set $`\|x\|_1 = \sum_j x_j`$, so the penalty is linear and
/// its gradient is the constant $`\lambda_1`$.
#[derive(Debug, Clone)]
pub struct NonNegLeastSquares {
    ls: LeastSquares,
    l1: f64,
}

impl NonNegLeastSquares {
    /// Fails when `reg.l1` is zero.
    pub fn new(a: Array2<f64>, b: Array1<f64>, reg: Regularization) -> Result<Self> {
        if reg.l1 == 0. {
            return Err(BcdError::contract(
                "non-negative least squares needs a non-zero L1 weight",
            ));
        }
        Ok(NonNegLeastSquares {
            ls: LeastSquares::new(a, b, reg.l2)?,
            l1: reg.l1,
        })
    }

    pub fn l1(&self) -> f64 {
        self.l1
    }
}

impl LossModel for NonNegLeastSquares {
    fn n_params(&self) -> usize {
        self.ls.n_params()
    }

    fn lipschitz(&self) -> ArrayView1<'_, f64> {
        self.ls.lipschitz()
    }

    /// Fails on a point with a negative entry.
    fn value(&self, x: ArrayView1<f64>) -> Result<f64> {
        if let Some(j) = x.iter().position(|&v| v < 0.) {
            return Err(BcdError::contract(format!(
                "x[{}] = {} is infeasible for non-negative least squares",
                j, x[j]
            )));
        }
        Ok(self.ls.value(x)? + self.l1 * x.sum())
    }

    fn gradient(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array1<f64> {
        self.ls.gradient(x, block) + self.l1
    }

    fn hessian(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        self.ls.hessian(x, block)
    }

    fn is_quadratic(&self) -> bool {
        true
    }
}
