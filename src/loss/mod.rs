//! Objectives for Block Coordinate Descent
//!
//! Every objective implements [`LossModel`]: the value, the gradient and the
//! curvature restricted to an arbitrary block of coordinates. A block is a
//! list of flat coordinate indices; `None` stands for all coordinates.
//!
//! For a block $`b`$ with complement $`c`$, the block gradient is
//! ```math
//! g_b = \nabla_b f(x_b, x_c)
//! ```
//! with $`x_c`$ held fixed, and the block curvature is the $`|b| \times |b|`$
//! matrix $`\nabla^2_{bb} f`$ (or an upper bound on it, for the losses where
//! the exact Hessian moves with $`x`$). A single-index block gives a 1×1
//! matrix.
//!
//! Available objectives:
//! - [least squares](struct.LeastSquares.html) and its
//!   [non-negative L1 version](struct.NonNegLeastSquares.html)
//! - [binary logistic](struct.Logistic.html)
//! - [multiclass softmax](struct.Softmax.html)
//! - [quadratic energy](struct.QuadraticEnergy.html) $`\frac12 x^TAx - b^Tx`$
//! - Huber and logistic [pairwise energies](struct.HuberEnergy.html) on a
//!   label propagation graph

mod energy;
pub use energy::*;
mod least_squares;
pub use least_squares::*;
mod logistic;
pub use logistic::*;
mod pairwise;
pub use pairwise::*;
mod softmax;
pub use softmax::*;

use std::fmt;
use std::str::FromStr;

use crate::error::{BcdError, Result};
use ndarray::prelude::*;
use ndarray_linalg::{EigValsh, UPLO};
use serde::{Deserialize, Serialize};

/// Objective, gradient and block curvature of a fixed problem instance.
pub trait LossModel {
    /// Length of the parameter vector.
    fn n_params(&self) -> usize;

    /// Per-coordinate upper bounds on the second derivative.
    fn lipschitz(&self) -> ArrayView1<'_, f64>;

    /// Objective at `x`, regularization included.
    fn value(&self, x: ArrayView1<f64>) -> Result<f64>;

    /// Gradient over `block`, in block order.
    fn gradient(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array1<f64>;

    /// Exact curvature over `block × block`.
    fn hessian(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64>;

    /// Curvature used for majorization steps. Defaults to the Hessian; losses
    /// with an analytic upper bound return that instead.
    fn block_curvature(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        self.hessian(x, block)
    }

    /// Largest eigenvalue of [`block_curvature`](#method.block_curvature).
    fn block_lipschitz(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Result<f64> {
        max_eigenvalue(&self.block_curvature(x, block))
    }

    /// True when the objective is a quadratic, so one Newton step on a block
    /// lands on the block minimizer.
    fn is_quadratic(&self) -> bool {
        false
    }

    /// True when the Hessian cannot change between iterates. Only plain,
    /// unregularized least squares claims this.
    fn has_constant_hessian(&self) -> bool {
        false
    }
}

/// L1/L2 regularization weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Regularization {
    pub l1: f64,
    pub l2: f64,
}

/// The short names of the available objectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LossKind {
    #[serde(rename = "ls")]
    LeastSquares,
    #[serde(rename = "lsl1nn")]
    NonNegLeastSquares,
    #[serde(rename = "lg")]
    Logistic,
    #[serde(rename = "sf")]
    Softmax,
    #[serde(rename = "bp")]
    QuadraticEnergy,
    #[serde(rename = "bp_huber")]
    HuberEnergy,
    #[serde(rename = "bp_lg")]
    LogisticEnergy,
}

impl LossKind {
    pub fn name(self) -> &'static str {
        match self {
            LossKind::LeastSquares => "ls",
            LossKind::NonNegLeastSquares => "lsl1nn",
            LossKind::Logistic => "lg",
            LossKind::Softmax => "sf",
            LossKind::QuadraticEnergy => "bp",
            LossKind::HuberEnergy => "bp_huber",
            LossKind::LogisticEnergy => "bp_lg",
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LossKind {
    type Err = BcdError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "ls" => LossKind::LeastSquares,
            "lsl1nn" => LossKind::NonNegLeastSquares,
            "lg" => LossKind::Logistic,
            "sf" => LossKind::Softmax,
            "bp" => LossKind::QuadraticEnergy,
            "bp_huber" => LossKind::HuberEnergy,
            "bp_lg" => LossKind::LogisticEnergy,
            _ => return Err(BcdError::UnknownLoss(s.to_string())),
        })
    }
}

/// Targets of a dataset: a vector for the single output losses, a one-hot
/// matrix for softmax.
#[derive(Debug, Clone)]
pub enum Targets {
    Vector(Array1<f64>),
    OneHot(Array2<f64>),
}

/// Raw inputs of a problem instance.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub a: Array2<f64>,
    pub b: Targets,
    /// Graph for the pairwise energies.
    pub graph: Option<LabelGraph>,
}

/// One of the available objectives, chosen at run time.
#[derive(Debug, Clone)]
pub enum Loss {
    LeastSquares(LeastSquares),
    NonNegLeastSquares(NonNegLeastSquares),
    Logistic(Logistic),
    Softmax(Softmax),
    QuadraticEnergy(QuadraticEnergy),
    HuberEnergy(HuberEnergy),
    LogisticEnergy(LogisticEnergy),
}

impl Loss {
    /// Builds the objective named by `kind` over `data`.
    ///
    /// Only non-negative least squares has an L1 term; a non-zero `reg.l1`
    /// for any other loss is rejected.
    pub fn create(kind: LossKind, data: Dataset, reg: Regularization) -> Result<Loss> {
        if reg.l1 != 0. && kind != LossKind::NonNegLeastSquares {
            return Err(BcdError::contract(format!(
                "loss `{}` has no L1 term, got l1 = {}",
                kind, reg.l1
            )));
        }
        let Dataset { a, b, graph } = data;
        let vector = |b: Targets| match b {
            Targets::Vector(b) => Ok(b),
            Targets::OneHot(_) => Err(BcdError::contract(format!(
                "loss `{}` needs vector targets",
                kind
            ))),
        };
        let need_graph = |g: Option<LabelGraph>| {
            g.ok_or_else(|| BcdError::contract(format!("loss `{}` needs a label graph", kind)))
        };
        Ok(match kind {
            LossKind::LeastSquares => Loss::LeastSquares(LeastSquares::new(a, vector(b)?, reg.l2)?),
            LossKind::NonNegLeastSquares => {
                Loss::NonNegLeastSquares(NonNegLeastSquares::new(a, vector(b)?, reg)?)
            }
            LossKind::Logistic => Loss::Logistic(Logistic::new(a, vector(b)?, reg.l2)?),
            LossKind::Softmax => match b {
                Targets::OneHot(y) => Loss::Softmax(Softmax::new(a, y, reg.l2)?),
                Targets::Vector(_) => {
                    return Err(BcdError::contract("softmax needs one-hot targets"))
                }
            },
            LossKind::QuadraticEnergy => {
                Loss::QuadraticEnergy(QuadraticEnergy::new(a, vector(b)?, reg.l2)?)
            }
            LossKind::HuberEnergy => Loss::HuberEnergy(HuberEnergy::new(need_graph(graph)?, reg.l2)?),
            LossKind::LogisticEnergy => {
                Loss::LogisticEnergy(LogisticEnergy::new(need_graph(graph)?, reg.l2)?)
            }
        })
    }

    pub fn kind(&self) -> LossKind {
        match self {
            Loss::LeastSquares(_) => LossKind::LeastSquares,
            Loss::NonNegLeastSquares(_) => LossKind::NonNegLeastSquares,
            Loss::Logistic(_) => LossKind::Logistic,
            Loss::Softmax(_) => LossKind::Softmax,
            Loss::QuadraticEnergy(_) => LossKind::QuadraticEnergy,
            Loss::HuberEnergy(_) => LossKind::HuberEnergy,
            Loss::LogisticEnergy(_) => LossKind::LogisticEnergy,
        }
    }

    fn inner(&self) -> &dyn LossModel {
        match self {
            Loss::LeastSquares(l) => l,
            Loss::NonNegLeastSquares(l) => l,
            Loss::Logistic(l) => l,
            Loss::Softmax(l) => l,
            Loss::QuadraticEnergy(l) => l,
            Loss::HuberEnergy(l) => l,
            Loss::LogisticEnergy(l) => l,
        }
    }
}

impl LossModel for Loss {
    fn n_params(&self) -> usize {
        self.inner().n_params()
    }

    fn lipschitz(&self) -> ArrayView1<'_, f64> {
        self.inner().lipschitz()
    }

    fn value(&self, x: ArrayView1<f64>) -> Result<f64> {
        self.inner().value(x)
    }

    fn gradient(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array1<f64> {
        self.inner().gradient(x, block)
    }

    fn hessian(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        self.inner().hessian(x, block)
    }

    fn block_curvature(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        self.inner().block_curvature(x, block)
    }

    fn block_lipschitz(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Result<f64> {
        self.inner().block_lipschitz(x, block)
    }

    fn is_quadratic(&self) -> bool {
        self.inner().is_quadratic()
    }

    fn has_constant_hessian(&self) -> bool {
        self.inner().has_constant_hessian()
    }
}

/// Largest eigenvalue of a symmetric matrix, 0 for an empty one.
pub fn max_eigenvalue(h: &Array2<f64>) -> Result<f64> {
    if h.is_empty() {
        return Ok(0.);
    }
    let eigs = h.eigvalsh(UPLO::Lower)?;
    Ok(eigs.fold(f64::NEG_INFINITY, |m, &e| m.max(e)))
}

/// $`1/(1+e^{-z})`$ without overflow
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0. {
        1. / (1. + (-z).exp())
    } else {
        let e = z.exp();
        e / (1. + e)
    }
}

/// $`\log(1+e^{z})`$ in log-sum-exp form
pub(crate) fn softplus(z: f64) -> f64 {
    z.max(0.) + (-z.abs()).exp().ln_1p()
}

/// `m + l2 * I`
pub(crate) fn add_ridge(mut m: Array2<f64>, l2: f64) -> Array2<f64> {
    if l2 != 0. {
        m.diag_mut().mapv_inplace(|d| d + l2);
    }
    m
}

pub(crate) fn check_rows(what: &str, rows: usize, len: usize) -> Result<()> {
    if rows != len {
        return Err(BcdError::contract(format!(
            "{}: design has {} rows but {} targets",
            what, rows, len
        )));
    }
    Ok(())
}
