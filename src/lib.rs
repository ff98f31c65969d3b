//! The `block-descent` crate minimizes smooth objectives over an `ndarray`
//! parameter vector by block coordinate descent: every iteration selects a
//! block of coordinates and moves only those.
//!
//! It is organized the way a run is put together:
//! - [`loss`]: objectives with block gradients and block curvature
//!   (least squares, logistic, softmax, quadratic and pairwise energies)
//! - [`select`]: how coordinates are split into blocks, and which block
//!   goes next
//! - [`update`]: how a block is moved (Lipschitz and Newton steps, SDDM
//!   repaired Newton, non-negative rules, exact energy solves, GaBP)
//! - [`line_search`]: backtracking with quadratic/cubic interpolation
//! - [`solve`]: dense linear and non-negative QP solvers
//! - [`train`]: the iteration loop with its divergence and convergence checks
//!
//! ```no_run
//! use block_descent::loss::{Dataset, Loss, LossKind, Regularization, Targets};
//! use block_descent::select::{PartitionRule, SelectionRule};
//! use block_descent::train::{train, TrainConfig};
//! use block_descent::update::UpdateRule;
//! use ndarray::array;
//!
//! # fn main() -> block_descent::error::Result<()> {
//! let data = Dataset {
//!     a: array![[1., 2.], [3., 4.], [5., 6.]],
//!     b: Targets::Vector(array![1., 0., 1.]),
//!     graph: None,
//! };
//! let loss = Loss::create(LossKind::LeastSquares, data, Regularization::default())?;
//! let partition = PartitionRule::Order.partition(&loss, 1)?;
//! let mut selector = SelectionRule::Cyclic.selector(partition, 1, 0)?;
//! let run = train(&loss, UpdateRule::Lipschitz, selector.as_mut(), TrainConfig::default())?;
//! println!("final loss {}", run.history.losses()[run.history.len() - 1]);
//! # Ok(())
//! # }
//! ```
//!
//! The crate only logs through the `log` facade; install any logger to see
//! per-iteration progress (`info`) and per-update details (`debug`).

#![cfg_attr(all(rustc_nightly, test), feature(test))]
#[cfg(all(rustc_nightly, test))]
extern crate test;

#[cfg(feature = "intel-mkl-static")]
extern crate intel_mkl_src;

pub mod block;
pub mod error;
pub mod history;
pub mod line_search;
pub mod loss;
pub mod select;
pub mod solve;
pub mod train;
pub mod update;

pub use error::{BcdError, Result};
