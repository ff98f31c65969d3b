use super::{add_ridge, check_rows, sigmoid, softplus, LossModel};
use crate::block::restrict;
use crate::error::Result;
use ndarray::prelude::*;
use ndarray::Zip;

/// Binary Logistic Regression
///
/// With labels $`b_i \in \{-1, +1\}`$,
/// ```math
/// f(x) = \sum_i \log\left(1 + e^{-b_i a_i^Tx}\right) + \frac{\lambda_2}{2} \|x\|_2^2
/// ```
/// evaluated in log-sum-exp form so large margins don't overflow.
///
/// The sigmoid has a $`\frac14`$-Lipschitz derivative, which gives the
/// curvature bound $`\frac14 A_b^TA_b + \lambda_2 I`$ used by
/// [`block_curvature`](trait.LossModel.html#method.block_curvature).
#[derive(Debug, Clone)]
pub struct Logistic {
    a: Array2<f64>,
    b: Array1<f64>,
    l2: f64,
    lipschitz: Array1<f64>,
}

impl Logistic {
    pub fn new(a: Array2<f64>, b: Array1<f64>, l2: f64) -> Result<Self> {
        check_rows("logistic", a.nrows(), b.len())?;
        let lipschitz = a.mapv(|v| v * v).sum_axis(Axis(0)) * 0.25 + l2;
        Ok(Logistic {
            a,
            b,
            l2,
            lipschitz,
        })
    }
}

impl LossModel for Logistic {
    fn n_params(&self) -> usize {
        self.a.ncols()
    }

    fn lipschitz(&self) -> ArrayView1<'_, f64> {
        self.lipschitz.view()
    }

    fn value(&self, x: ArrayView1<f64>) -> Result<f64> {
        let pred = self.a.dot(&x);
        let loss: f64 = pred
            .iter()
            .zip(self.b.iter())
            .map(|(&p, &b)| softplus(-b * p))
            .sum();
        Ok(loss + 0.5 * self.l2 * x.dot(&x))
    }

    fn gradient(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array1<f64> {
        let pred = self.a.dot(&x);
        // -b / (1 + exp(b * pred))
        let residual = Zip::from(&pred)
            .and(&self.b)
            .map_collect(|&p, &b| -b * sigmoid(-b * p));
        let reg = restrict(x, block) * self.l2;
        match block {
            None => self.a.t().dot(&residual) + reg,
            Some(blk) => self.a.select(Axis(1), blk).t().dot(&residual) + reg,
        }
    }

    fn hessian(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        let pred = self.a.dot(&x);
        let weights = Zip::from(&pred).and(&self.b).map_collect(|&p, &b| {
            let s = sigmoid(b * p);
            s * (1. - s)
        });
        let ab = match block {
            None => self.a.to_owned(),
            Some(blk) => self.a.select(Axis(1), blk),
        };
        let weighted = &ab * &weights.insert_axis(Axis(1));
        add_ridge(ab.t().dot(&weighted), self.l2)
    }

    fn block_curvature(&self, _x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        let ab = match block {
            None => self.a.to_owned(),
            Some(blk) => self.a.select(Axis(1), blk),
        };
        add_ridge(ab.t().dot(&ab) * 0.25, self.l2)
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::max_eigenvalue;
    use crate::loss::testing::*;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;

    fn random_problem(n: usize, d: usize, l2: f64) -> Logistic {
        let A = Array::random((n, d), Normal::new(0., 1.).unwrap());
        let b = Array::random(n, Normal::new(0., 1.).unwrap()).mapv(|v: f64| v.signum());
        Logistic::new(A, b, l2).unwrap()
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let loss = random_problem(12, 5, 0.4);
        for _ in 0..3 {
            let x = Array::random(5, Normal::new(0., 1.).unwrap());
            check_gradient(&loss, x.view(), 1e-5);
            check_block_gradient(&loss, x.view(), &[1, 3]);
            check_block_hessian(&loss, x.view(), &[4, 0, 2]);
        }
    }

    #[test]
    fn hessian_matches_finite_differences() {
        let loss = random_problem(9, 3, 0.1);
        let x = Array::random(3, Normal::new(0., 1.).unwrap());
        assert_abs_diff_eq!(
            loss.hessian(x.view(), None),
            numerical_hessian(&loss, x.view()),
            epsilon = 1e-5
        );
    }

    #[test]
    fn value_is_stable_for_large_margins() {
        let loss = Logistic::new(array![[1.], [-1.]], array![1., -1.], 0.).unwrap();
        let f = loss.value(array![1000.].view()).unwrap();
        assert!(f.is_finite());
        assert_abs_diff_eq!(f, 0., epsilon = 1e-300);
        let f = loss.value(array![-1000.].view()).unwrap();
        assert_abs_diff_eq!(f, 2000., epsilon = 1e-9);
    }

    #[test]
    fn curvature_bounds_hessian() {
        let loss = random_problem(15, 4, 0.);
        let x = Array::random(4, Normal::new(0., 1.).unwrap());
        let block = [0, 2, 3];
        let gap = loss.block_curvature(x.view(), Some(&block)) - loss.hessian(x.view(), Some(&block));
        // the bound minus the Hessian is positive semi-definite
        assert!(-max_eigenvalue(&(-gap)).unwrap() >= -1e-10);
    }

    #[test]
    fn lipschitz_closed_form() {
        let loss = Logistic::new(array![[2., -1.], [1., 0.]], array![1., -1.], 0.).unwrap();
        assert_abs_diff_eq!(loss.lipschitz(), array![1.25, 0.25]);
    }
}
