use super::RuleState;
use crate::error::Result;
use crate::line_search::{backtracking, unconstrained, LineSearchOptions};
use crate::loss::LossModel;
use crate::solve::repair_sddm;
use log::debug;
use ndarray::prelude::*;

/// Searches along `dir` from `x` and moves the block by the accepted step.
pub(super) fn search_and_step<L>(
    x: &mut Array1<f64>,
    blk: &[usize],
    g: &Array1<f64>,
    dir: &Array1<f64>,
    loss: &L,
    project: fn(f64) -> f64,
    opts: &LineSearchOptions,
) -> Result<f64>
where
    L: LossModel + ?Sized,
{
    let alpha = backtracking(
        x.view(),
        g.view(),
        blk,
        |z| loss.value(z),
        |a| dir * a,
        1.,
        project,
        opts,
    )?;
    debug!("alpha: {}", alpha);
    for (&j, &dj) in blk.iter().zip(dir.iter()) {
        x[j] = project(x[j] + alpha * dj);
    }
    Ok(alpha)
}

/// Newton direction $`-H_{bb}^{-1} g_b`$ followed by a line search.
pub(super) fn line_search_newton<L>(
    x: &mut Array1<f64>,
    blk: &[usize],
    loss: &L,
    state: &mut RuleState,
) -> Result<()>
where
    L: LossModel + ?Sized,
{
    let g = loss.gradient(x.view(), Some(blk));
    let h = loss.hessian(x.view(), Some(blk));
    let dir = -state.solver.solve(&h, &g)?;
    search_and_step(x, blk, &g, &dir, loss, unconstrained, &state.options.line_search)?;
    Ok(())
}

/// Newton direction on the Hessian repaired into an SDD M-matrix.
///
/// The solver's factorization is dropped at iteration 0 and, when `reuse`
/// is set, kept for every later call.
pub(super) fn sddm<L>(
    x: &mut Array1<f64>,
    blk: &[usize],
    loss: &L,
    state: &mut RuleState,
    iteration: usize,
    reuse: bool,
) -> Result<()>
where
    L: LossModel + ?Sized,
{
    if iteration == 0 {
        state.solver.reset();
    }
    let h = repair_sddm(loss.hessian(x.view(), Some(blk)));
    let g = loss.gradient(x.view(), Some(blk));
    let dir = state.solver.solve_sddm(&h, &(-&g), reuse)?;
    search_and_step(x, blk, &g, &dir, loss, unconstrained, &state.options.line_search)?;
    Ok(())
}
