use super::{add_ridge, sigmoid, softplus, LossModel};
use crate::block::{full, sub_matrix};
use crate::error::{BcdError, Result};
use ndarray::prelude::*;

/// A weighted graph over labeled and unlabeled nodes, for label propagation.
///
/// The optimization variables are the scores of the unlabeled nodes, in the
/// order given by `unlabeled`.
#[derive(Debug, Clone)]
pub struct LabelGraph {
    /// Symmetric edge weights over every node.
    pub w: Array2<f64>,
    /// Labels of every node; only the labeled entries are read.
    pub y: Array1<f64>,
    pub labeled: Vec<usize>,
    pub unlabeled: Vec<usize>,
}

/// Edge weights split by endpoint type. These are fixed by the graph; the
/// pairwise differences/products depend on `x` and are rebuilt every call.
#[derive(Debug, Clone)]
struct Edges {
    w_uu: Array2<f64>,
    /// $`W_{UU} + W_{UU}^T`$, the weight each pair contributes to a gradient.
    w_sym: Array2<f64>,
    w_ul: Array2<f64>,
    y_l: Array1<f64>,
}

impl Edges {
    fn new(graph: LabelGraph) -> Result<Self> {
        let n = graph.w.nrows();
        if !graph.w.is_square() || graph.y.len() != n {
            return Err(BcdError::contract(format!(
                "label graph has {:?} weights for {} labels",
                graph.w.dim(),
                graph.y.len()
            )));
        }
        if let Some(&j) = graph
            .labeled
            .iter()
            .chain(graph.unlabeled.iter())
            .find(|&&j| j >= n)
        {
            return Err(BcdError::contract(format!(
                "node {} out of range for a graph of {} nodes",
                j, n
            )));
        }
        let w_uu = sub_matrix(&graph.w, &graph.unlabeled, &graph.unlabeled);
        let w_sym = &w_uu + &w_uu.t();
        Ok(Edges {
            w_ul: sub_matrix(&graph.w, &graph.unlabeled, &graph.labeled),
            y_l: graph.y.select(Axis(0), &graph.labeled),
            w_uu,
            w_sym,
        })
    }

    fn n(&self) -> usize {
        self.w_uu.nrows()
    }

    /// Unlabeled-unlabeled plus unlabeled-labeled penalties.
    fn value(&self, x: ArrayView1<f64>, penalty: impl Fn(f64, f64) -> f64) -> f64 {
        let mut total = 0.;
        for (i, &xi) in x.iter().enumerate() {
            for (j, &xj) in x.iter().enumerate() {
                total += self.w_uu[[i, j]] * penalty(xi, xj);
            }
            for (l, &yl) in self.y_l.iter().enumerate() {
                total += self.w_ul[[i, l]] * penalty(xi, yl);
            }
        }
        total
    }
}

fn rows(block: Option<&[usize]>, n: usize) -> Vec<usize> {
    match block {
        Some(b) => b.to_vec(),
        None => full(n),
    }
}

/// Huber Label Propagation Energy
///
/// ```math
/// f(x) = \sum_{i,j \in U} w_{ij} h_\epsilon(x_i - x_j)
///      + \sum_{i \in U, l \in L} w_{il} h_\epsilon(x_i - y_l)
///      + \frac{\lambda_2}{2} \|x\|_2^2
/// ```
/// where $`h_\epsilon`$ is the Huber function with $`\epsilon = 1`$. Since
/// $`h_\epsilon'' \leq 1`$, the curvature bound is the graph Laplacian with
/// every edge active.
#[derive(Debug, Clone)]
pub struct HuberEnergy {
    edges: Edges,
    eps: f64,
    l2: f64,
    lipschitz: Array1<f64>,
}

impl HuberEnergy {
    pub fn new(graph: LabelGraph, l2: f64) -> Result<Self> {
        let edges = Edges::new(graph)?;
        let mut energy = HuberEnergy {
            edges,
            eps: 1.,
            l2,
            lipschitz: Array1::zeros(0),
        };
        let zero = Array1::zeros(energy.edges.n());
        energy.lipschitz = energy.curvature(zero.view(), &full(energy.edges.n()), |_| 1.).diag().to_owned();
        Ok(energy)
    }

    fn huber(&self, z: f64) -> f64 {
        if z.abs() <= self.eps {
            0.5 * z * z
        } else {
            self.eps * (z.abs() - 0.5 * self.eps)
        }
    }

    fn huber_p(&self, z: f64) -> f64 {
        if z.abs() <= self.eps {
            z
        } else {
            self.eps * z.signum()
        }
    }

    fn huber_pp(&self, z: f64) -> f64 {
        if z.abs() <= self.eps {
            1.
        } else {
            0.
        }
    }

    /// Block Hessian with `hpp` standing in for the Huber second derivative.
    fn curvature(&self, x: ArrayView1<f64>, blk: &[usize], hpp: impl Fn(f64) -> f64) -> Array2<f64> {
        let e = &self.edges;
        let m = blk.len();
        let mut h = Array2::zeros((m, m));
        for (r, &i) in blk.iter().enumerate() {
            for (s, &j) in blk.iter().enumerate() {
                if i != j {
                    h[[r, s]] = -e.w_sym[[i, j]] * hpp(x[i] - x[j]);
                }
            }
            let mut diag = 0.;
            for (j, &xj) in x.iter().enumerate() {
                if j != i {
                    diag += e.w_sym[[i, j]] * hpp(x[i] - xj);
                }
            }
            for (l, &yl) in e.y_l.iter().enumerate() {
                diag += e.w_ul[[i, l]] * hpp(x[i] - yl);
            }
            h[[r, r]] = diag;
        }
        add_ridge(h, self.l2)
    }
}

impl LossModel for HuberEnergy {
    fn n_params(&self) -> usize {
        self.edges.n()
    }

    fn lipschitz(&self) -> ArrayView1<'_, f64> {
        self.lipschitz.view()
    }

    fn value(&self, x: ArrayView1<f64>) -> Result<f64> {
        let pairs = self.edges.value(x, |a, b| self.huber(a - b));
        Ok(pairs + 0.5 * self.l2 * x.dot(&x))
    }

    fn gradient(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array1<f64> {
        let e = &self.edges;
        rows(block, e.n())
            .into_iter()
            .map(|i| {
                let unlabeled: f64 = x
                    .iter()
                    .enumerate()
                    .map(|(j, &xj)| e.w_sym[[i, j]] * self.huber_p(x[i] - xj))
                    .sum();
                let labeled: f64 = e
                    .y_l
                    .iter()
                    .enumerate()
                    .map(|(l, &yl)| e.w_ul[[i, l]] * self.huber_p(x[i] - yl))
                    .sum();
                unlabeled + labeled + self.l2 * x[i]
            })
            .collect()
    }

    fn hessian(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        self.curvature(x, &rows(block, self.edges.n()), |z| self.huber_pp(z))
    }

    fn block_curvature(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        self.curvature(x, &rows(block, self.edges.n()), |_| 1.)
    }
}

/// Logistic Label Propagation Energy
///
/// Rewards agreement in sign between neighbours through
/// $`\ell(z) = \log(1 + e^{-z})`$ of the score products:
/// ```math
/// f(x) = \sum_{i,j \in U} w_{ij} \ell(x_i x_j)
///      + \sum_{i \in U, l \in L} w_{il} \ell(x_i y_l)
///      + \frac{\lambda_2}{2} \|x\|_2^2
/// ```
/// The objective is unbounded below along the all-agreeing directions
/// without some ridge, so a zero $`\lambda_2`$ is replaced by `1e-3`.
#[derive(Debug, Clone)]
pub struct LogisticEnergy {
    edges: Edges,
    l2: f64,
    lipschitz: Array1<f64>,
}

/// $`\ell'(z) = \sigma(z) - 1`$
fn logistic_p(z: f64) -> f64 {
    -sigmoid(-z)
}

/// $`\ell''(z) = \sigma(z)(1 - \sigma(z))`$
fn logistic_pp(z: f64) -> f64 {
    sigmoid(z) * sigmoid(-z)
}

impl LogisticEnergy {
    pub fn new(graph: LabelGraph, l2: f64) -> Result<Self> {
        let edges = Edges::new(graph)?;
        let l2 = if l2 == 0. { 1e-3 } else { l2 };
        // degree-based estimate, the exact curvature scales with x
        let y2 = edges.y_l.mapv(|v| v * v);
        let lipschitz = (edges.w_sym.sum_axis(Axis(1)) + edges.w_ul.dot(&y2)) * 0.25 + l2;
        Ok(LogisticEnergy {
            edges,
            l2,
            lipschitz,
        })
    }

    pub fn l2(&self) -> f64 {
        self.l2
    }
}

impl LossModel for LogisticEnergy {
    fn n_params(&self) -> usize {
        self.edges.n()
    }

    fn lipschitz(&self) -> ArrayView1<'_, f64> {
        self.lipschitz.view()
    }

    fn value(&self, x: ArrayView1<f64>) -> Result<f64> {
        let pairs = self.edges.value(x, |a, b| softplus(-a * b));
        Ok(pairs + 0.5 * self.l2 * x.dot(&x))
    }

    fn gradient(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array1<f64> {
        let e = &self.edges;
        rows(block, e.n())
            .into_iter()
            .map(|i| {
                let unlabeled: f64 = x
                    .iter()
                    .enumerate()
                    .map(|(j, &xj)| e.w_sym[[i, j]] * logistic_p(x[i] * xj) * xj)
                    .sum();
                let labeled: f64 = e
                    .y_l
                    .iter()
                    .enumerate()
                    .map(|(l, &yl)| e.w_ul[[i, l]] * logistic_p(x[i] * yl) * yl)
                    .sum();
                unlabeled + labeled + self.l2 * x[i]
            })
            .collect()
    }

    fn hessian(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        let e = &self.edges;
        let blk = rows(block, e.n());
        let m = blk.len();
        let mut h = Array2::zeros((m, m));
        for (r, &i) in blk.iter().enumerate() {
            for (s, &j) in blk.iter().enumerate() {
                let z = x[i] * x[j];
                h[[r, s]] = e.w_sym[[i, j]] * (logistic_pp(z) * z + logistic_p(z));
            }
            let unlabeled: f64 = x
                .iter()
                .enumerate()
                .map(|(j, &xj)| e.w_sym[[i, j]] * logistic_pp(x[i] * xj) * xj * xj)
                .sum();
            let labeled: f64 = e
                .y_l
                .iter()
                .enumerate()
                .map(|(l, &yl)| e.w_ul[[i, l]] * logistic_pp(x[i] * yl) * yl * yl)
                .sum();
            h[[r, r]] += unlabeled + labeled;
        }
        add_ridge(h, self.l2)
    }
}
