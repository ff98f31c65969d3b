//! The Block Coordinate Descent Loop
//!
//! [`Trainer`] is a small state machine:
//! ```text
//! Init -> Iterate -> Iterate -> ... -> Converged | Terminated
//!                 \-> Diverged (error)
//! ```
//! Each `Iterate` step evaluates the loss, records it, checks for divergence
//! and convergence, then asks the [`Selector`] for a block and applies the
//! [`UpdateRule`] to it.

use std::time::Instant;

use crate::block;
use crate::error::{BcdError, Result};
use crate::history::{History, HistoryRecord};
use crate::loss::LossModel;
use crate::select::Selector;
use crate::update::{RuleState, UpdateOptions, UpdateRule};
use log::{debug, info};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// Stopping criteria and rule tunables of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Number of updates; the history holds one more record than this.
    pub n_iters: usize,
    /// Known minimum of the objective, enables the convergence test.
    pub optimal_loss: Option<f64>,
    /// Converged once `loss - optimal_loss <= tolerance`.
    pub tolerance: f64,
    /// Iterations before the convergence test kicks in.
    pub warmup: usize,
    /// Slack allowed on the monotone decrease before a run is diverged.
    pub increase_tolerance: f64,
    pub update: UpdateOptions,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            n_iters: 100,
            optimal_loss: None,
            tolerance: 1e-8,
            warmup: 5,
            increase_tolerance: 1e-6,
            update: UpdateOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Init,
    Iterate,
    Converged,
    Diverged,
    Terminated,
}

impl LoopState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            LoopState::Converged | LoopState::Diverged | LoopState::Terminated
        )
    }
}

/// What a finished run hands back.
#[derive(Debug, Clone)]
pub struct Run {
    pub state: LoopState,
    pub x: Array1<f64>,
    pub history: History,
}

/// Owns the iterate and drives the updates of one run.
pub struct Trainer<'a, L: LossModel> {
    loss: &'a L,
    rule: UpdateRule,
    selector: &'a mut dyn Selector,
    config: TrainConfig,
    rule_state: RuleState,
    state: LoopState,
    x: Array1<f64>,
    history: History,
    iteration: usize,
    selected: Vec<usize>,
    avg_update_time: f64,
}

impl<'a, L: LossModel> Trainer<'a, L> {
    pub fn new(
        loss: &'a L,
        rule: UpdateRule,
        selector: &'a mut dyn Selector,
        config: TrainConfig,
    ) -> Self {
        let n = loss.n_params();
        Trainer {
            loss,
            rule,
            selector,
            rule_state: RuleState::new(n, config.update),
            config,
            state: LoopState::Init,
            x: Array1::zeros(n),
            history: History::new(),
            iteration: 0,
            selected: Vec::new(),
            avg_update_time: 0.,
        }
    }

    /// Replaces the rule state, e.g. to plug in other solvers. Only
    /// meaningful before the first step.
    pub fn with_rule_state(mut self, rule_state: RuleState) -> Self {
        self.rule_state = rule_state;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn x(&self) -> ArrayView1<'_, f64> {
        self.x.view()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Advances the state machine by one transition.
    ///
    /// On an error the trainer is left `Diverged` with the offending loss as
    /// the last history record.
    pub fn step(&mut self) -> Result<LoopState> {
        self.state = match self.state {
            LoopState::Init => {
                self.x.fill(0.);
                self.iteration = 0;
                LoopState::Iterate
            }
            LoopState::Iterate => match self.iterate() {
                Ok(state) => state,
                Err(err) => {
                    self.state = LoopState::Diverged;
                    return Err(err);
                }
            },
            finished => finished,
        };
        Ok(self.state)
    }

    /// Steps until the run converges or runs out of iterations.
    pub fn run(mut self) -> Result<Run> {
        while !self.step()?.is_finished() {}
        Ok(Run {
            state: self.state,
            x: self.x,
            history: self.history,
        })
    }

    fn iterate(&mut self) -> Result<LoopState> {
        let i = self.iteration;
        let loss = self.loss.value(self.x.view())?;
        let previous = self.history.last().map(|r| r.loss);
        self.history.push(HistoryRecord {
            iteration: i,
            loss,
            selected: std::mem::take(&mut self.selected),
            time: self.avg_update_time,
            x: self.x.clone(),
        });

        if !loss.is_finite() {
            return Err(BcdError::NonFinite {
                iteration: i,
                value: loss,
            });
        }
        let dis2opt = self.config.optimal_loss.map(|opt| loss - opt);
        info!(
            "{} - {} - loss: {:.16e} - dis2opt: {} - nz: {}/{} - avg_update_time: {:.2e}s",
            i,
            self.rule,
            loss,
            dis2opt.map_or_else(|| "n/a".to_string(), |d| format!("{:.16e}", d)),
            self.x.iter().filter(|&&v| v != 0.).count(),
            self.x.len(),
            self.avg_update_time
        );

        if let Some(previous) = previous {
            if loss > previous + self.config.increase_tolerance {
                return Err(BcdError::LossIncreased {
                    iteration: i,
                    previous,
                    current: loss,
                });
            }
        }
        if i > self.config.warmup && dis2opt.map_or(false, |d| d <= self.config.tolerance) {
            info!("converged after {} iterations", i);
            return Ok(LoopState::Converged);
        }
        if i >= self.config.n_iters {
            return Ok(LoopState::Terminated);
        }

        let n = self.x.len();
        let block = if self.rule.is_full() {
            block::full(n)
        } else {
            self.selector.select(self.x.view(), self.loss, i)
        };
        debug!("iteration {}: selected {:?}", i, block);

        let start = Instant::now();
        self.rule
            .apply(&mut self.x, &block, self.loss, &mut self.rule_state, i)?;
        let elapsed = start.elapsed().as_secs_f64();
        self.avg_update_time = (self.avg_update_time * i as f64 + elapsed) / (i as f64 + 1.);

        self.selected = block;
        self.iteration += 1;
        Ok(LoopState::Iterate)
    }
}

/// Runs `rule` from $`x = 0`$ with blocks from `selector`.
pub fn train<L: LossModel>(
    loss: &L,
    rule: UpdateRule,
    selector: &mut dyn Selector,
    config: TrainConfig,
) -> Result<Run> {
    Trainer::new(loss, rule, selector, config).run()
}
