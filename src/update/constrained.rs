//! Rules that keep the iterate in $`x \geq 0`$

use super::newton::search_and_step;
use super::smooth::bounded_step;
use super::RuleState;
use crate::block::{assign, gather};
use crate::error::{BcdError, Result};
use crate::line_search::nonnegative;
use crate::loss::LossModel;
use log::debug;
use ndarray::prelude::*;

pub(super) fn projected_lipschitz<L>(x: &mut Array1<f64>, blk: &[usize], loss: &L) -> Result<()>
where
    L: LossModel + ?Sized,
{
    bounded_step(x, blk, loss, nonnegative)
}

/// Two-metric projection Newton
///
/// Coordinates sitting on the bound with a positive gradient form the
/// active set. They get a diagonal metric scaled by the sum of their
/// Lipschitz bounds, the free ones the Newton metric of their sub-block.
/// The combined direction is searched with every trial projected onto
/// $`x \geq 0`$.
pub(super) fn active_set_newton<L>(
    x: &mut Array1<f64>,
    blk: &[usize],
    loss: &L,
    state: &mut RuleState,
) -> Result<()>
where
    L: LossModel + ?Sized,
{
    let k = blk.len();
    let g = loss.gradient(x.view(), Some(blk));
    let h = loss.hessian(x.view(), Some(blk));
    let lipschitz = loss.lipschitz();

    let threshold = state.options.active_threshold;
    let active: Vec<bool> = blk
        .iter()
        .zip(g.iter())
        .map(|(&j, &gj)| x[j] < threshold && gj > 0.)
        .collect();
    let active_l: f64 = blk
        .iter()
        .zip(&active)
        .filter(|(_, &a)| a)
        .map(|(&j, _)| lipschitz[j])
        .sum();
    let active_l = if active_l > 0. { active_l } else { 1. };
    debug!(
        "TMP-NN: {} active of {}",
        active.iter().filter(|&&a| a).count(),
        k
    );

    let mut metric = Array2::zeros((k, k));
    let mut scaled = Array1::zeros(k);
    for i in 0..k {
        if active[i] {
            scaled[i] = g[i] / active_l;
            metric[[i, i]] = 1.;
        } else {
            scaled[i] = g[i];
            for j in (0..k).filter(|&j| !active[j]) {
                metric[[i, j]] = h[[i, j]];
            }
        }
    }

    let dir = -state.solver.solve(&metric, &scaled)?;
    search_and_step(
        x,
        blk,
        &scaled,
        &dir,
        loss,
        nonnegative,
        &state.options.line_search,
    )?;
    Ok(())
}

/// Exact minimizer of the block over $`x_b \geq 0`$.
///
/// For a quadratic, the block sub-problem is
/// $`\frac12 x_b^T H_{bb} x_b + (g_b - H_{bb} x_b^{old})^T x_b`$ up to a constant.
pub(super) fn nonneg_qp<L>(
    x: &mut Array1<f64>,
    blk: &[usize],
    loss: &L,
    state: &mut RuleState,
) -> Result<()>
where
    L: LossModel + ?Sized,
{
    if !loss.is_quadratic() {
        return Err(BcdError::contract("qp-nn needs a quadratic loss"));
    }
    let p = loss.hessian(x.view(), Some(blk));
    let q = loss.gradient(x.view(), Some(blk)) - p.dot(&gather(x, blk));
    let xb = state.qp.solve_nonneg(&p, &q)?;
    assign(x, blk, &xb.mapv(nonnegative));
    Ok(())
}
