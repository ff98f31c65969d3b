//! Backtracking Line Search with Polynomial Interpolation
//!
//! Finds a step length $`\alpha`$ along a direction generator $`D(\alpha)`$
//! restricted to a block, such that the Armijo condition
//! ```math
//! F(x + D(\alpha)) \leq F(x) + \epsilon \alpha \phi, \qquad \phi = g^T D(\alpha_0)
//! ```
//! holds. The first rejected trial is refined by quadratic interpolation, the
//! following ones by cubic interpolation through the last two rejected
//! $`(\alpha, z)`$ pairs, where $`z = F(x + D(\alpha)) - F(x) - \alpha\phi`$.

use crate::error::{BcdError, Result};
use log::{trace, warn};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// Tolerances of [`backtracking`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearchOptions {
    /// $`\epsilon`$ in the Armijo condition
    pub sufficient_decrease: f64,
    /// The search gives up once the largest step entry is this small.
    pub min_step: f64,
    /// Interpolated steps are clamped to `[shrink_min, shrink_max] * alpha_prev`.
    pub shrink_min: f64,
    pub shrink_max: f64,
}

impl Default for LineSearchOptions {
    fn default() -> Self {
        LineSearchOptions {
            sufficient_decrease: 1e-10,
            min_step: 1e-9,
            shrink_min: 1e-3,
            shrink_max: 0.6,
        }
    }
}

/// Identity projection for unconstrained searches.
pub fn unconstrained(v: f64) -> f64 {
    v
}

/// Projection onto $`v \geq 0`$.
pub fn nonnegative(v: f64) -> f64 {
    v.max(0.)
}

/// `x` with `x[block] = project(x[block] + d)`
pub fn trial_point(
    x: ArrayView1<f64>,
    block: &[usize],
    d: &Array1<f64>,
    project: impl Fn(f64) -> f64,
) -> Array1<f64> {
    let mut xc = x.to_owned();
    for (&j, &dj) in block.iter().zip(d.iter()) {
        xc[j] = project(x[j] + dj);
    }
    xc
}

/// Backtracking Armijo Line Search
///
/// Parameters
/// ----------
/// - __x:__          current iterate
/// - __grad:__       gradient at `x` restricted to `block`
/// - __block:__      coordinates moved by the direction
/// - __objective:__  the full objective $`F`$
/// - __direction:__  step generator $`D(\alpha)`$, one entry per block index
/// - __alpha0:__     initial step length, typically 1
/// - __project:__    applied to every trial coordinate, see [`nonnegative`]
///
/// Returns the accepted step length, or 0 when the step shrank below
/// `opts.min_step` without satisfying sufficient decrease. A direction that is
/// not a descent direction ($`\phi > 0`$) is a contract violation.
#[allow(clippy::too_many_arguments)]
pub fn backtracking(
    x: ArrayView1<f64>,
    grad: ArrayView1<f64>,
    block: &[usize],
    objective: impl Fn(ArrayView1<f64>) -> Result<f64>,
    direction: impl Fn(f64) -> Array1<f64>,
    alpha0: f64,
    project: impl Fn(f64) -> f64,
    opts: &LineSearchOptions,
) -> Result<f64> {
    let f0 = objective(x)?;
    let mut alpha = alpha0;
    let mut d = direction(alpha);
    let phi = grad.dot(&d);
    // zero gradients happen on blocks that are cut off from the labeled nodes
    if !(phi <= 0.) {
        return Err(BcdError::contract(format!(
            "line search needs a descent direction, got g'd = {}",
            phi
        )));
    }

    let mut rejected: Option<(f64, f64)> = None;
    let mut trial = objective(trial_point(x, block, &d, &project).view())?;
    while !(trial <= f0 + opts.sufficient_decrease * alpha * phi) {
        let z = trial - f0 - alpha * phi;
        let alpha_prev = alpha;
        alpha = match rejected {
            None => -(phi * alpha * alpha) / (2. * z),
            Some((alpha_old, z_old)) => cubic_minimizer(alpha, z, alpha_old, z_old, phi),
        };
        rejected = Some((alpha_prev, z));

        let (lo, hi) = (opts.shrink_min * alpha_prev, opts.shrink_max * alpha_prev);
        if alpha.is_nan() || alpha > hi {
            trace!("interpolated step {} too large, using {}", alpha, hi);
            alpha = hi;
        } else if alpha < lo {
            trace!("interpolated step {} too small, using {}", alpha, lo);
            alpha = lo;
        }

        d = direction(alpha);
        if d.fold(0., |m: f64, v| m.max(v.abs())) <= opts.min_step {
            warn!("backtracking line search failed, rejecting the step");
            return Ok(0.);
        }
        trial = objective(trial_point(x, block, &d, &project).view())?;
    }
    Ok(alpha)
}

/// Minimizer of the cubic through $`z(\alpha)`$ and $`z(\alpha_{old})`$ with
/// slope $`\phi`$ at zero.
fn cubic_minimizer(alpha: f64, z: f64, alpha_old: f64, z_old: f64, phi: f64) -> f64 {
    let c = 1. / ((alpha - alpha_old) * alpha_old.powi(2) * alpha.powi(2));
    let a = c * (alpha_old.powi(2) * z - alpha.powi(2) * z_old);
    let b = c * (-alpha_old.powi(3) * z + alpha.powi(3) * z_old);
    (-b + (b * b - 3. * a * phi).sqrt()) / (3. * a)
}


#[cfg(all(rustc_nightly, test))]
mod benches {
    use super::*;
    use test::Bencher;

    #[bench]
    fn backtrack_long_step(bench: &mut Bencher) {
        let x = Array1::<f64>::ones(64);
        let g = x.clone();
        let block: Vec<usize> = (0..64).collect();
        let opts = LineSearchOptions::default();
        bench.iter(|| {
            backtracking(
                x.view(),
                g.view(),
                &block,
                |x| Ok(x.dot(&x)),
                |a| &g * (-100. * a),
                1.,
                unconstrained,
                &opts,
            )
        });
    }
}
