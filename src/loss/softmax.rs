use super::{add_ridge, check_rows, LossModel};
use crate::error::{BcdError, Result};
use ndarray::prelude::*;

/// Multiclass Logistic (Softmax) Regression
///
/// The parameters are a features×classes matrix $`X`$, flattened row-major,
/// so coordinate `f * n_classes + c` is the weight of feature `f` for class
/// `c`. With one-hot targets $`Y`$,
/// ```math
/// f(X) = \sum_i \log \sum_c e^{(AX)_{ic}} - \langle AX, Y \rangle + \frac{\lambda_2}{2} \|X\|_F^2
/// ```
///
/// The exact Hessian couples classes through the softmax probabilities
/// $`p`$: $`p_c(1-p_c)`$ on the class diagonal and $`-p_{c_1}p_{c_2}`$ off it.
/// The curvature bound replaces that with Böhning's
/// $`\frac12 (I - \frac1k 11^T)`$.
#[derive(Debug, Clone)]
pub struct Softmax {
    a: Array2<f64>,
    y: Array2<f64>,
    l2: f64,
    lipschitz: Array1<f64>,
}

impl Softmax {
    pub fn new(a: Array2<f64>, y: Array2<f64>, l2: f64) -> Result<Self> {
        check_rows("softmax", a.nrows(), y.nrows())?;
        if y.ncols() < 2 {
            return Err(BcdError::contract("softmax needs at least two classes"));
        }
        let k = y.ncols();
        let lipschitz = tile(&(a.mapv(|v| v * v).sum_axis(Axis(0)) * 0.25 + l2), k);
        Ok(Softmax {
            a,
            y,
            l2,
            lipschitz,
        })
    }

    pub fn n_features(&self) -> usize {
        self.a.ncols()
    }

    pub fn n_classes(&self) -> usize {
        self.y.ncols()
    }

    /// Flat coordinate to (feature, class).
    fn unravel(&self, j: usize) -> (usize, usize) {
        (j / self.n_classes(), j % self.n_classes())
    }

    fn reshape(&self, x: ArrayView1<f64>) -> Array2<f64> {
        let k = self.n_classes();
        Array2::from_shape_fn((self.n_features(), k), |(f, c)| x[f * k + c])
    }

    fn scores(&self, x: ArrayView1<f64>) -> Array2<f64> {
        self.a.dot(&self.reshape(x))
    }

    fn all(&self) -> Vec<usize> {
        (0..self.n_params()).collect()
    }
}

/// Repeats every entry of `v` `k` times, matching the row-major layout.
fn tile(v: &Array1<f64>, k: usize) -> Array1<f64> {
    Array1::from_shape_fn(v.len() * k, |j| v[j / k])
}

/// Row-wise softmax, shifted by the row max.
fn probabilities(scores: &Array2<f64>) -> Array2<f64> {
    let mut p = scores.to_owned();
    for mut row in p.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let total = row.sum();
        row /= total;
    }
    p
}

fn logsumexp(row: ArrayView1<f64>) -> f64 {
    let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    max + row.mapv(|v| (v - max).exp()).sum().ln()
}

impl LossModel for Softmax {
    fn n_params(&self) -> usize {
        self.n_features() * self.n_classes()
    }

    fn lipschitz(&self) -> ArrayView1<'_, f64> {
        self.lipschitz.view()
    }

    fn value(&self, x: ArrayView1<f64>) -> Result<f64> {
        let scores = self.scores(x);
        let normalizer: f64 = scores.rows().into_iter().map(logsumexp).sum();
        let agreement = (&scores * &self.y).sum();
        Ok(normalizer - agreement + 0.5 * self.l2 * x.dot(&x))
    }

    fn gradient(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array1<f64> {
        let residual = probabilities(&self.scores(x)) - &self.y;
        match block {
            None => {
                let g = self.a.t().dot(&residual);
                Array1::from_iter(g.iter().cloned()) + &(&x * self.l2)
            }
            // only the (feature, class) diagonal of A^T R is needed
            Some(blk) => blk
                .iter()
                .map(|&j| {
                    let (f, c) = self.unravel(j);
                    self.a.column(f).dot(&residual.column(c)) + self.l2 * x[j]
                })
                .collect(),
        }
    }

    fn hessian(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        let all;
        let blk = match block {
            Some(b) => b,
            None => {
                all = self.all();
                &all[..]
            }
        };
        let p = probabilities(&self.scores(x));
        let pairs: Vec<(usize, usize)> = blk.iter().map(|&j| self.unravel(j)).collect();
        let mut h = Array2::zeros((blk.len(), blk.len()));
        for (i, &(f1, c1)) in pairs.iter().enumerate() {
            for (j, &(f2, c2)) in pairs.iter().enumerate().skip(i) {
                let s = if c1 == c2 {
                    p.column(c1).mapv(|v| v * (1. - v))
                } else {
                    -(&p.column(c1) * &p.column(c2))
                };
                let v = (&s * &self.a.column(f1)).dot(&self.a.column(f2));
                h[[i, j]] = v;
                h[[j, i]] = v;
            }
        }
        add_ridge(h, self.l2)
    }

    fn block_curvature(&self, _x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        let n_classes = self.n_classes();
        let all;
        let (blk, k) = match block {
            Some(b) => {
                let mut classes: Vec<usize> = b.iter().map(|&j| j % n_classes).collect();
                classes.sort_unstable();
                classes.dedup();
                (b, n_classes.min(classes.len() + 1))
            }
            None => {
                all = self.all();
                (&all[..], n_classes)
            }
        };
        let pairs: Vec<(usize, usize)> = blk.iter().map(|&j| self.unravel(j)).collect();
        let features: Vec<usize> = pairs.iter().map(|&(f, _)| f).collect();
        let af = self.a.select(Axis(1), &features);
        let gram = af.t().dot(&af);

        let kf = k as f64;
        let mut h = gram;
        for (i, &(_, c1)) in pairs.iter().enumerate() {
            for (j, &(_, c2)) in pairs.iter().enumerate() {
                let s = if c1 == c2 {
                    0.5 * (1. - 1. / kf)
                } else {
                    -0.5 / kf
                };
                h[[i, j]] *= s;
            }
        }
        add_ridge(h, self.l2)
    }
}
