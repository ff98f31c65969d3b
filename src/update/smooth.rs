//! Gradient steps sized by a curvature bound

use super::RuleState;
use crate::block::{gather, scaled_add};
use crate::error::Result;
use crate::line_search::unconstrained;
use crate::loss::LossModel;
use crate::solve::pinv;
use log::{debug, warn};
use ndarray::prelude::*;

/// `x_b = project(x_b - g_b / L_b)` with `L_b` from
/// [`block_lipschitz`](../loss/trait.LossModel.html#method.block_lipschitz).
pub(super) fn bounded_step<L>(
    x: &mut Array1<f64>,
    blk: &[usize],
    loss: &L,
    project: impl Fn(f64) -> f64,
) -> Result<()>
where
    L: LossModel + ?Sized,
{
    let g = loss.gradient(x.view(), Some(blk));
    let lb = loss.block_lipschitz(x.view(), Some(blk))?;
    if !(lb > 0.) {
        debug!("block has no curvature, skipping");
        return Ok(());
    }
    for (&j, &gj) in blk.iter().zip(g.iter()) {
        x[j] = project(x[j] - gj / lb);
    }
    Ok(())
}

pub(super) fn lipschitz<L>(x: &mut Array1<f64>, blk: &[usize], loss: &L) -> Result<()>
where
    L: LossModel + ?Sized,
{
    bounded_step(x, blk, loss, unconstrained)
}

/// $`x_b \leftarrow x_b - H_b^{+} g_b`$
///
/// The pseudo-inverse keeps singular blocks (repeated or empty columns)
/// from blowing up the step.
pub(super) fn newton_upper_bound<L>(
    x: &mut Array1<f64>,
    blk: &[usize],
    loss: &L,
    state: &RuleState,
) -> Result<()>
where
    L: LossModel + ?Sized,
{
    let g = loss.gradient(x.view(), Some(blk));
    let h = loss.block_curvature(x.view(), Some(blk));
    let d = -pinv(&h, state.options.pinv_rcond)?.dot(&g);
    scaled_add(x, blk, 1., &d);
    Ok(())
}

/// Gradient step with an estimated smoothness constant
///
/// Starts from the largest estimate stored for the block and doubles it until
/// ```math
/// f(x_b - g_b/L) \leq f(x) - \frac{1}{2L} \|g_b\|_2^2
/// ```
/// The accepted constant is stored back for every coordinate of the block.
pub(super) fn adaptive_lipschitz<L>(
    x: &mut Array1<f64>,
    blk: &[usize],
    loss: &L,
    state: &mut RuleState,
) -> Result<()>
where
    L: LossModel + ?Sized,
{
    let g = loss.gradient(x.view(), Some(blk));
    let g_sq = g.dot(&g);
    if g_sq == 0. {
        return Ok(());
    }
    let f = loss.value(x.view())?;
    let mut lb = gather(&state.la_lipschitz, blk).fold(0., |m: f64, &v| m.max(v));

    for _ in 0..state.options.la_max_doublings {
        let mut trial = x.clone();
        scaled_add(&mut trial, blk, -1. / lb, &g);
        if loss.value(trial.view())? <= f - g_sq / (2. * lb) {
            for &j in blk {
                state.la_lipschitz[j] = lb;
            }
            *x = trial;
            debug!("LA accepted L = {}", lb);
            return Ok(());
        }
        lb *= 2.;
    }
    warn!("LA found no sufficient decrease, keeping the block");
    Ok(())
}
