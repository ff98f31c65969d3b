use super::{add_ridge, LossModel};
use crate::block::{complement, gather, sub_matrix};
use crate::error::{BcdError, Result};
use ndarray::prelude::*;

/// Quadratic Energy of a Gaussian Graphical Model
///
/// ```math
/// f(x) = \frac12 x^TAx - b^Tx + \frac{\lambda_2}{2} \|x\|_2^2
/// ```
/// for a symmetric $`A`$. Splitting into a block $`b`$ and its complement
/// $`c`$, the block gradient is written in the form of the block sub-system
/// ```math
/// g_b = A_{bb} x_b + (A_{bc} x_c - b_b) + \lambda_2 x_b
/// ```
/// so that the block minimizer solves $`A_{bb} x_b = -(A_{bc} x_c - b_b)`$,
/// which is what the exact block updates rely on.
#[derive(Debug, Clone)]
pub struct QuadraticEnergy {
    a: Array2<f64>,
    b: Array1<f64>,
    l2: f64,
    lipschitz: Array1<f64>,
}

impl QuadraticEnergy {
    pub fn new(a: Array2<f64>, b: Array1<f64>, l2: f64) -> Result<Self> {
        if !a.is_square() || a.nrows() != b.len() {
            return Err(BcdError::contract(format!(
                "quadratic energy needs a square system, got {:?} and {}",
                a.dim(),
                b.len()
            )));
        }
        let lipschitz = a.diag().to_owned() + l2;
        Ok(QuadraticEnergy { a, b, l2, lipschitz })
    }
}

impl LossModel for QuadraticEnergy {
    fn n_params(&self) -> usize {
        self.a.ncols()
    }

    fn lipschitz(&self) -> ArrayView1<'_, f64> {
        self.lipschitz.view()
    }

    fn value(&self, x: ArrayView1<f64>) -> Result<f64> {
        Ok(0.5 * x.dot(&self.a.dot(&x)) - self.b.dot(&x) + 0.5 * self.l2 * x.dot(&x))
    }

    fn gradient(&self, x: ArrayView1<f64>, block: Option<&[usize]>) -> Array1<f64> {
        match block {
            None => x.dot(&self.a) - &self.b + &(&x * self.l2),
            Some(blk) => {
                let rest = complement(blk, self.n_params());
                let a_bc = sub_matrix(&self.a, blk, &rest);
                let a_bb = sub_matrix(&self.a, blk, blk);
                let x_b = gather(&x, blk);
                let y_prime = a_bc.dot(&gather(&x, &rest)) - gather(&self.b, blk);
                a_bb.dot(&x_b) + y_prime + x_b * self.l2
            }
        }
    }

    fn hessian(&self, _x: ArrayView1<f64>, block: Option<&[usize]>) -> Array2<f64> {
        let h = match block {
            None => self.a.to_owned(),
            Some(blk) => sub_matrix(&self.a, blk, blk),
        };
        add_ridge(h, self.l2)
    }

    fn is_quadratic(&self) -> bool {
        true
    }
}
