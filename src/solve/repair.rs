use log::warn;
use ndarray::prelude::*;
use ndarray::Zip;

/// `|a - a^T| <= atol + rtol * |a^T|` entry-wise, with numpy's default
/// tolerances.
pub fn is_symmetric(a: &Array2<f64>) -> bool {
    let (rtol, atol) = (1e-5, 1e-8);
    a.is_square()
        && Zip::from(a)
            .and(&a.t())
            .all(|&x, &y| (x - y).abs() <= atol + rtol * y.abs())
}

/// Row-wise margin $`2|a_{ii}| - \sum_j |a_{ij}|`$. Non-negative rows are
/// diagonally dominant.
pub fn diagonal_dominance(a: &Array2<f64>) -> Array1<f64> {
    let row_sums = a.mapv(f64::abs).sum_axis(Axis(1));
    a.diag().mapv(|d| 2. * d.abs()) - row_sums
}

/// Every off-diagonal entry is non-positive.
pub fn is_m_matrix(a: &Array2<f64>) -> bool {
    a.indexed_iter().all(|((i, j), &v)| i == j || v <= 0.)
}

/// Symmetric and diagonally dominant.
pub fn is_sdd(a: &Array2<f64>) -> bool {
    is_symmetric(a) && diagonal_dominance(a).iter().all(|&m| m >= 0.)
}

/// Turns a curvature matrix into a symmetric diagonally dominant M-matrix.
///
/// 1. An asymmetric matrix is replaced by $`(H + H^T)/2`$.
/// 2. Rows with a negative dominance margin get the deficit added to the
///    magnitude of their diagonal.
/// 3. Positive off-diagonal entries are moved onto the diagonal, and a
///    negative diagonal is replaced by its magnitude.
/// 4. Rows left on the dominance boundary (zero rows included) get `1e-4`
///    on the diagonal. Every margin is then positive, so the result is
///    strictly diagonally dominant and positive definite.
///
/// Every stage that fires is logged; none of them fail.
pub fn repair_sddm(mut h: Array2<f64>) -> Array2<f64> {
    let n = h.nrows();

    if !is_symmetric(&h) {
        warn!("curvature is not symmetric, averaging it with its transpose");
        h = (&h + &h.t()) * 0.5;
    }

    let margins = diagonal_dominance(&h);
    if margins.iter().any(|&m| m < 0.) {
        warn!("curvature is not diagonally dominant, raising the diagonal");
        Zip::from(h.diag_mut()).and(&margins).for_each(|d, &m| {
            let deficit = (-m).max(0.);
            *d += if *d >= 0. { deficit } else { -deficit };
        });
    }

    if !is_m_matrix(&h) || h.diag().iter().any(|&d| d < 0.) {
        warn!("curvature is not an M-matrix, folding positive entries into the diagonal");
        let mut diag = h.diag().mapv(f64::abs);
        for i in 0..n {
            for j in 0..n {
                if i != j && h[[i, j]] > 0. {
                    diag[i] += h[[i, j]];
                    h[[i, j]] = 0.;
                }
            }
        }
        h.diag_mut().assign(&diag);
    }

    let scale = h.fold(0., |m: f64, v| m.max(v.abs())).max(1.);
    let boundary: Vec<usize> = diagonal_dominance(&h)
        .iter()
        .enumerate()
        .filter(|(_, &m)| m <= 1e-12 * scale)
        .map(|(i, _)| i)
        .collect();
    if !boundary.is_empty() {
        warn!(
            "{} of {} rows are on the dominance boundary, lifting their diagonal",
            boundary.len(),
            n
        );
        for i in boundary {
            h[[i, i]] += 1e-4;
        }
    }
    h
}
