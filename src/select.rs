//! Block Partitions and Selection Rules
//!
//! A [`PartitionRule`] splits the coordinates into fixed blocks once per run,
//! or returns `None` for variable blocks that are picked afresh every
//! iteration. A [`Selector`] then hands the training loop one block per
//! iteration.
//!
//! | Partition | Description |
//! |---|---|
//! | `VB` | no partition, variable blocks |
//! | `Order` | contiguous blocks `0..k, k..2k, ...` |
//! | `Sort` | blocks of coordinates sorted by decreasing Lipschitz bound |
//!
//! | Selection | Description |
//! |---|---|
//! | `Cyclic` | partition blocks in order |
//! | `Random` | uniformly random partition block, seeded |
//! | `GS` | Gauss-Southwell: largest gradient magnitude |

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{BcdError, Result};
use crate::loss::LossModel;
use ndarray::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// A fixed split of the coordinates into disjoint blocks.
pub type Partition = Vec<Vec<usize>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionRule {
    #[serde(rename = "VB")]
    VariableBlocks,
    #[serde(rename = "Order")]
    Order,
    #[serde(rename = "Sort")]
    Sort,
}

impl PartitionRule {
    pub fn name(self) -> &'static str {
        match self {
            PartitionRule::VariableBlocks => "VB",
            PartitionRule::Order => "Order",
            PartitionRule::Sort => "Sort",
        }
    }

    /// Splits the coordinates of `loss` into blocks of `block_size`; the last
    /// block takes the remainder.
    pub fn partition(self, loss: &dyn LossModel, block_size: usize) -> Result<Option<Partition>> {
        if block_size == 0 {
            return Err(BcdError::contract("block size must be positive"));
        }
        let n = loss.n_params();
        let order: Vec<usize> = match self {
            PartitionRule::VariableBlocks => return Ok(None),
            PartitionRule::Order => (0..n).collect(),
            PartitionRule::Sort => {
                let lipschitz = loss.lipschitz();
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&i, &j| {
                    lipschitz[j]
                        .partial_cmp(&lipschitz[i])
                        .unwrap_or(Ordering::Equal)
                });
                order
            }
        };
        Ok(Some(order.chunks(block_size).map(<[usize]>::to_vec).collect()))
    }
}

impl fmt::Display for PartitionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PartitionRule {
    type Err = BcdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "VB" => Ok(PartitionRule::VariableBlocks),
            "Order" => Ok(PartitionRule::Order),
            "Sort" => Ok(PartitionRule::Sort),
            _ => Err(BcdError::UnknownSelection(s.to_string())),
        }
    }
}

/// Picks the block updated at each iteration.
pub trait Selector {
    fn select(&mut self, x: ArrayView1<f64>, loss: &dyn LossModel, iteration: usize) -> Vec<usize>;
}

/// Visits the partition blocks in order, wrapping around.
#[derive(Debug, Clone)]
pub struct Cyclic {
    blocks: Partition,
}

impl Cyclic {
    pub fn new(blocks: Partition) -> Result<Self> {
        if blocks.is_empty() {
            return Err(BcdError::contract("cyclic selection needs a partition"));
        }
        Ok(Cyclic { blocks })
    }
}

impl Selector for Cyclic {
    fn select(&mut self, _x: ArrayView1<f64>, _loss: &dyn LossModel, iteration: usize) -> Vec<usize> {
        self.blocks[iteration % self.blocks.len()].clone()
    }
}

/// Draws a partition block uniformly at random, with replacement.
#[derive(Debug, Clone)]
pub struct Randomized {
    blocks: Partition,
    rng: StdRng,
}

impl Randomized {
    pub fn new(blocks: Partition, seed: u64) -> Result<Self> {
        if blocks.is_empty() {
            return Err(BcdError::contract("random selection needs a partition"));
        }
        Ok(Randomized {
            blocks,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl Selector for Randomized {
    fn select(&mut self, _x: ArrayView1<f64>, _loss: &dyn LossModel, _iteration: usize) -> Vec<usize> {
        let k = self.rng.gen_range(0..self.blocks.len());
        self.blocks[k].clone()
    }
}

/// Gauss-Southwell selection
///
/// With a partition, the block with the largest gradient norm. Without one,
/// the `block_size` coordinates with the largest gradient magnitude, largest
/// first.
#[derive(Debug, Clone)]
pub struct GaussSouthwell {
    blocks: Option<Partition>,
    block_size: usize,
}

impl GaussSouthwell {
    pub fn new(blocks: Option<Partition>, block_size: usize) -> Self {
        GaussSouthwell { blocks, block_size }
    }
}

impl Selector for GaussSouthwell {
    fn select(&mut self, x: ArrayView1<f64>, loss: &dyn LossModel, _iteration: usize) -> Vec<usize> {
        let g = loss.gradient(x, None);
        match &self.blocks {
            Some(blocks) => {
                let norm = |b: &Vec<usize>| b.iter().map(|&j| g[j] * g[j]).sum::<f64>();
                blocks
                    .iter()
                    .max_by(|a, b| norm(*a).partial_cmp(&norm(*b)).unwrap_or(Ordering::Equal))
                    .cloned()
                    .unwrap_or_default()
            }
            None => {
                let mut order: Vec<usize> = (0..g.len()).collect();
                order.sort_by(|&i, &j| {
                    g[j].abs()
                        .partial_cmp(&g[i].abs())
                        .unwrap_or(Ordering::Equal)
                });
                order.truncate(self.block_size);
                order
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionRule {
    Cyclic,
    Random,
    #[serde(rename = "GS")]
    GaussSouthwell,
}

impl SelectionRule {
    pub fn name(self) -> &'static str {
        match self {
            SelectionRule::Cyclic => "Cyclic",
            SelectionRule::Random => "Random",
            SelectionRule::GaussSouthwell => "GS",
        }
    }

    /// Builds the selector over `partition`; `seed` only matters for `Random`.
    pub fn selector(
        self,
        partition: Option<Partition>,
        block_size: usize,
        seed: u64,
    ) -> Result<Box<dyn Selector>> {
        let fixed = |p: Option<Partition>| {
            p.ok_or_else(|| {
                BcdError::contract(format!("`{}` selection needs a fixed partition", self))
            })
        };
        Ok(match self {
            SelectionRule::Cyclic => Box::new(Cyclic::new(fixed(partition)?)?),
            SelectionRule::Random => Box::new(Randomized::new(fixed(partition)?, seed)?),
            SelectionRule::GaussSouthwell => Box::new(GaussSouthwell::new(partition, block_size)),
        })
    }
}

impl fmt::Display for SelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SelectionRule {
    type Err = BcdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Cyclic" => Ok(SelectionRule::Cyclic),
            "Random" => Ok(SelectionRule::Random),
            "GS" => Ok(SelectionRule::GaussSouthwell),
            _ => Err(BcdError::UnknownSelection(s.to_string())),
        }
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::LeastSquares;

    fn scaled_columns() -> LeastSquares {
        // column norms 1, 9, 4, 16, 0
        let A = array![[1., 3., 0., 4., 0.], [0., 0., 2., 0., 0.]];
        LeastSquares::new(A, array![1., 1.], 0.).unwrap()
    }

    #[test]
    fn partitions() {
        let loss = scaled_columns();
        let order = PartitionRule::Order.partition(&loss, 2).unwrap().unwrap();
        assert_eq!(order, vec![vec![0, 1], vec![2, 3], vec![4]]);
        let sort = PartitionRule::Sort.partition(&loss, 2).unwrap().unwrap();
        assert_eq!(sort, vec![vec![3, 1], vec![2, 0], vec![4]]);
        assert!(PartitionRule::VariableBlocks.partition(&loss, 2).unwrap().is_none());
        assert!(PartitionRule::Order.partition(&loss, 0).is_err());
    }

    #[test]
    fn cyclic_wraps_around() {
        let loss = scaled_columns();
        let x = Array1::zeros(5);
        let mut s = Cyclic::new(vec![vec![0, 1], vec![2]]).unwrap();
        let picks: Vec<Vec<usize>> = (0..3).map(|i| s.select(x.view(), &loss, i)).collect();
        assert_eq!(picks, vec![vec![0, 1], vec![2], vec![0, 1]]);
    }

    #[test]
    fn random_is_reproducible() {
        let loss = scaled_columns();
        let x = Array1::zeros(5);
        let blocks = PartitionRule::Order.partition(&loss, 1).unwrap().unwrap();
        let mut a = Randomized::new(blocks.clone(), 7).unwrap();
        let mut b = Randomized::new(blocks, 7).unwrap();
        for i in 0..20 {
            assert_eq!(a.select(x.view(), &loss, i), b.select(x.view(), &loss, i));
        }
    }

    #[test]
    fn gauss_southwell_picks_steepest() {
        let loss = scaled_columns();
        // gradient at 0 is -A^T b = [-1, -3, -2, -4, 0]
        let x = Array1::zeros(5);
        let mut vb = GaussSouthwell::new(None, 2);
        assert_eq!(vb.select(x.view(), &loss, 0), vec![3, 1]);
        let mut fb = GaussSouthwell::new(Some(vec![vec![0, 1], vec![2, 4]]), 2);
        assert_eq!(fb.select(x.view(), &loss, 0), vec![0, 1]);
    }

    #[test]
    fn rule_names() {
        assert_eq!("GS".parse::<SelectionRule>().unwrap(), SelectionRule::GaussSouthwell);
        assert_eq!("Sort".parse::<PartitionRule>().unwrap().to_string(), "Sort");
        assert!(matches!(
            "OMP".parse::<SelectionRule>(),
            Err(BcdError::UnknownSelection(_))
        ));
        assert!(SelectionRule::Cyclic.selector(None, 2, 0).is_err());
        assert!(SelectionRule::GaussSouthwell.selector(None, 2, 0).is_ok());
    }
}
