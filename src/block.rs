//! Coordinate blocks and gather/scatter helpers
//!
//! A block is an ordered list of flat coordinate indices. `None` in place of
//! a block always means "every coordinate".

use crate::error::{BcdError, Result};
use ndarray::prelude::*;
use ndarray::Data;

/// The block covering `0..n`.
pub fn full(n: usize) -> Vec<usize> {
    (0..n).collect()
}

/// Indices in `0..n` that are not in `block`, in increasing order.
pub fn complement(block: &[usize], n: usize) -> Vec<usize> {
    let mut mask = vec![true; n];
    for &j in block {
        mask[j] = false;
    }
    (0..n).filter(|&j| mask[j]).collect()
}

/// Checks that every index is below `n` and appears once.
pub fn validate(block: &[usize], n: usize) -> Result<()> {
    let mut seen = vec![false; n];
    for &j in block {
        if j >= n {
            return Err(BcdError::contract(format!(
                "block index {} out of range for {} parameters",
                j, n
            )));
        }
        if seen[j] {
            return Err(BcdError::contract(format!("duplicate block index {}", j)));
        }
        seen[j] = true;
    }
    Ok(())
}

/// `x[block]`
pub fn gather<S>(x: &ArrayBase<S, Ix1>, block: &[usize]) -> Array1<f64>
where
    S: Data<Elem = f64>,
{
    x.select(Axis(0), block)
}

/// `a[rows][:, cols]`
pub fn sub_matrix<S>(a: &ArrayBase<S, Ix2>, rows: &[usize], cols: &[usize]) -> Array2<f64>
where
    S: Data<Elem = f64>,
{
    a.select(Axis(0), rows).select(Axis(1), cols)
}

/// `x[block] = values`
pub fn assign(x: &mut Array1<f64>, block: &[usize], values: &Array1<f64>) {
    for (&j, &v) in block.iter().zip(values.iter()) {
        x[j] = v;
    }
}

/// `x[block] += alpha * d`
pub fn scaled_add(x: &mut Array1<f64>, block: &[usize], alpha: f64, d: &Array1<f64>) {
    for (&j, &dj) in block.iter().zip(d.iter()) {
        x[j] += alpha * dj;
    }
}

/// `x[block]`, or all of `x` for `None`.
pub(crate) fn restrict(x: ArrayView1<f64>, block: Option<&[usize]>) -> Array1<f64> {
    match block {
        None => x.to_owned(),
        Some(b) => gather(&x, b),
    }
}
