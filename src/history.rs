//! Run history and its persisted form

use std::fmt;
use std::io::{Read, Write};

use crate::error::Result;
use crate::loss::{LossKind, Regularization};
use crate::select::{PartitionRule, SelectionRule};
use crate::update::UpdateRule;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// Snapshot taken at the start of every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub iteration: usize,
    pub loss: f64,
    /// Block updated in the previous iteration, empty at iteration 0.
    pub selected: Vec<usize>,
    /// Running average of the update time so far, in seconds.
    pub time: f64,
    pub x: Array1<f64>,
}

/// Append-only list of [`HistoryRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    records: Vec<HistoryRecord>,
}

impl History {
    pub fn new() -> Self {
        History::default()
    }

    pub fn push(&mut self, record: HistoryRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&HistoryRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Loss per recorded iteration.
    pub fn losses(&self) -> Array1<f64> {
        self.records.iter().map(|r| r.loss).collect()
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn read_json<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Deterministic name of a run, used to find a persisted history again.
///
/// Formats as
/// `{dataset}_{loss}_{block}_{partition}_{selection}_{rule}_{iters}_{l1}_{l2}`,
/// where the block size reads 0 for rules that always update every
/// coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunKey {
    pub dataset: String,
    pub loss: LossKind,
    pub block_size: usize,
    pub partition: PartitionRule,
    pub selection: SelectionRule,
    pub rule: UpdateRule,
    pub n_iters: usize,
    pub regularization: Regularization,
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let block_size = if self.rule.is_full() { 0 } else { self.block_size };
        write!(
            f,
            "{}_{}_{}_{}_{}_{}_{}_{}_{}",
            self.dataset,
            self.loss,
            block_size,
            self.partition,
            self.selection,
            self.rule,
            self.n_iters,
            self.regularization.l1,
            self.regularization.l2
        )
    }
}
