//! Exact block solves for quadratic energies

use super::RuleState;
use crate::block::{assign, gather};
use crate::error::{BcdError, Result};
use crate::loss::LossModel;
use ndarray::prelude::*;

/// Which solver path an exact update takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Path {
    General,
    Sddm,
    /// SDDM path keeping the factorization across iterations.
    SddmReused,
}

/// The block sub-system $`H_{bb} x_b = H_{bb} x_b^{old} - g_b`$, which for
/// the quadratic energy is $`A_{bb} x_b = b_b - A_{bc} x_c`$.
fn sub_system<L>(x: &Array1<f64>, blk: &[usize], loss: &L) -> Result<(Array2<f64>, Array1<f64>)>
where
    L: LossModel + ?Sized,
{
    if !loss.is_quadratic() {
        return Err(BcdError::contract(
            "exact block updates need a quadratic loss",
        ));
    }
    let h = loss.hessian(x.view(), Some(blk));
    let rhs = h.dot(&gather(x, blk)) - loss.gradient(x.view(), Some(blk));
    Ok((h, rhs))
}

pub(super) fn exact<L>(
    x: &mut Array1<f64>,
    blk: &[usize],
    loss: &L,
    state: &mut RuleState,
    path: Path,
) -> Result<()>
where
    L: LossModel + ?Sized,
{
    let (h, rhs) = sub_system(x, blk, loss)?;
    let xb = match path {
        Path::General => state.solver.solve(&h, &rhs)?,
        Path::Sddm => state.solver.solve_sddm(&h, &rhs, false)?,
        Path::SddmReused => state.solver.solve_sddm(&h, &rhs, true)?,
    };
    assign(x, blk, &xb);
    Ok(())
}

pub(super) fn belief_propagation<L>(
    x: &mut Array1<f64>,
    blk: &[usize],
    loss: &L,
    state: &mut RuleState,
) -> Result<()>
where
    L: LossModel + ?Sized,
{
    let (h, rhs) = sub_system(x, blk, loss)?;
    let xb = gabp(
        &h,
        &rhs,
        state.options.gabp_max_iter,
        state.options.gabp_tolerance,
    )?;
    assign(x, blk, &xb);
    Ok(())
}

/// Gaussian Belief Propagation for $`Ax = b`$
///
/// `p[[i, j]]` and `u[[i, j]]` hold the precision and mean of the message
/// from node `i` to node `j`; the diagonals hold the node priors
/// $`a_{ii}`$ and $`b_i / a_{ii}`$. Messages are swept in place until their
/// means change by less than `tolerance` (squared norm), or `max_iter`
/// sweeps. Exact on tree-structured systems, convergent on diagonally
/// dominant ones.
pub fn gabp(a: &Array2<f64>, b: &Array1<f64>, max_iter: usize, tolerance: f64) -> Result<Array1<f64>> {
    let n = b.len();
    if a.dim() != (n, n) {
        return Err(BcdError::contract(format!(
            "gabp needs a square {}x{} system, got {:?}",
            n,
            n,
            a.dim()
        )));
    }
    if a.diag().iter().any(|&d| d == 0.) {
        return Err(BcdError::contract("gabp needs a non-zero diagonal"));
    }
    let mut p = Array2::from_diag(&a.diag());
    let mut u = Array2::from_diag(&(b / &a.diag()));

    for _sweep in 0..max_iter {
        let old_u = u.clone();
        for i in 0..n {
            for j in 0..n {
                if i == j || a[[i, j]] == 0. {
                    continue;
                }
                // everything node i hears, except from j
                let p_excl = p.column(i).sum() - p[[j, i]];
                if p_excl == 0. {
                    return Err(BcdError::contract(format!(
                        "gabp message precision vanished on edge ({}, {})",
                        i, j
                    )));
                }
                p[[i, j]] = -a[[i, j]] * a[[j, i]] / p_excl;
                let h_excl = ((&p.column(i) * &u.column(i)).sum() - p[[j, i]] * u[[j, i]]) / p_excl;
                u[[i, j]] = -a[[i, j]] * h_excl / p[[i, j]];
            }
        }
        if (&u - &old_u).mapv(|v| v * v).sum() < tolerance {
            break;
        }
    }

    Ok(Array1::from_shape_fn(n, |i| {
        (&p.column(i) * &u.column(i)).sum() / p.column(i).sum()
    }))
}
