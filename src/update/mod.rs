//! Block Update Rules
//!
//! Given the iterate $`x`$, a block $`b`$ and a [`LossModel`], an
//! [`UpdateRule`] moves $`x_b`$ (or all of $`x`$, for the `-full` rules).
//!
//! | Rule | Step |
//! |---|---|
//! | `Lb` | $`x_b \leftarrow x_b - g_b / L_b`$ |
//! | `Hb` | $`x_b \leftarrow x_b - H_b^{+} g_b`$ with the curvature bound $`H_b`$ |
//! | `LA` | `Lb` with a per-coordinate estimate of $`L_b`$, doubled until sufficient decrease |
//! | `LS`, `LS-full` | Newton direction $`-H_{bb}^{-1}g_b`$ with a line search |
//! | `SDDM`, `SDDM-full` | `LS` on the Hessian repaired into an SDD M-matrix |
//! | `Lb-NN` | `Lb` projected onto $`x \geq 0`$ |
//! | `TMP-NN` | projected Newton on the free coordinates, active set held at the bound |
//! | `qp-nn` | exact non-negative block minimizer |
//! | `bpExact`, `bpExact-lap`, and their `-full` versions | exact solve of the block sub-system |
//! | `bpGabp` | Gaussian belief propagation on the block sub-system |
//!
//! Side state that has to survive between iterations lives in [`RuleState`].

mod constrained;
mod energy;
pub use energy::gabp;
mod newton;
mod smooth;

use std::fmt;
use std::str::FromStr;

use crate::block;
use crate::error::{BcdError, Result};
use crate::line_search::LineSearchOptions;
use crate::loss::LossModel;
use crate::solve::{DenseSolver, LinearSolver, ProjectedGaussSeidel, QpSolver};
use log::debug;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// The available block update strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateRule {
    #[serde(rename = "Lb", alias = "quadraticEg")]
    Lipschitz,
    #[serde(rename = "Hb", alias = "newtonUpperBound")]
    NewtonUpperBound,
    #[serde(rename = "LA")]
    AdaptiveLipschitz,
    #[serde(rename = "LS")]
    LineSearchNewton,
    #[serde(rename = "LS-full")]
    LineSearchNewtonFull,
    #[serde(rename = "SDDM")]
    Sddm,
    #[serde(rename = "SDDM-full")]
    SddmFull,
    #[serde(rename = "Lb-NN")]
    ProjectedLipschitz,
    #[serde(rename = "TMP-NN")]
    ActiveSetNewton,
    #[serde(rename = "qp-nn")]
    NonNegQp,
    #[serde(rename = "bpExact")]
    BpExact,
    #[serde(rename = "bpExact-full")]
    BpExactFull,
    #[serde(rename = "bpExact-lap")]
    BpExactLap,
    #[serde(rename = "bpExact-lap-full")]
    BpExactLapFull,
    #[serde(rename = "bpGabp")]
    BpGabp,
}

impl UpdateRule {
    pub const ALL: [UpdateRule; 15] = [
        UpdateRule::Lipschitz,
        UpdateRule::NewtonUpperBound,
        UpdateRule::AdaptiveLipschitz,
        UpdateRule::LineSearchNewton,
        UpdateRule::LineSearchNewtonFull,
        UpdateRule::Sddm,
        UpdateRule::SddmFull,
        UpdateRule::ProjectedLipschitz,
        UpdateRule::ActiveSetNewton,
        UpdateRule::NonNegQp,
        UpdateRule::BpExact,
        UpdateRule::BpExactFull,
        UpdateRule::BpExactLap,
        UpdateRule::BpExactLapFull,
        UpdateRule::BpGabp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UpdateRule::Lipschitz => "Lb",
            UpdateRule::NewtonUpperBound => "Hb",
            UpdateRule::AdaptiveLipschitz => "LA",
            UpdateRule::LineSearchNewton => "LS",
            UpdateRule::LineSearchNewtonFull => "LS-full",
            UpdateRule::Sddm => "SDDM",
            UpdateRule::SddmFull => "SDDM-full",
            UpdateRule::ProjectedLipschitz => "Lb-NN",
            UpdateRule::ActiveSetNewton => "TMP-NN",
            UpdateRule::NonNegQp => "qp-nn",
            UpdateRule::BpExact => "bpExact",
            UpdateRule::BpExactFull => "bpExact-full",
            UpdateRule::BpExactLap => "bpExact-lap",
            UpdateRule::BpExactLapFull => "bpExact-lap-full",
            UpdateRule::BpGabp => "bpGabp",
        }
    }

    /// Rules that ignore the selected block and update every coordinate.
    pub fn is_full(self) -> bool {
        matches!(
            self,
            UpdateRule::LineSearchNewtonFull
                | UpdateRule::SddmFull
                | UpdateRule::BpExactFull
                | UpdateRule::BpExactLapFull
        )
    }

    /// Updates `x` in place.
    ///
    /// Only the entries in `block` change, unless the rule
    /// [`is_full`](#method.is_full), in which case `block` is ignored.
    /// `iteration` is the training loop counter; the rules that cache a
    /// factorization drop it at iteration 0.
    pub fn apply<L>(
        self,
        x: &mut Array1<f64>,
        block: &[usize],
        loss: &L,
        state: &mut RuleState,
        iteration: usize,
    ) -> Result<()>
    where
        L: LossModel + ?Sized,
    {
        let n = loss.n_params();
        if x.len() != n {
            return Err(BcdError::contract(format!(
                "iterate has {} entries, loss has {} parameters",
                x.len(),
                n
            )));
        }
        let all;
        let blk = if self.is_full() {
            all = block::full(n);
            &all[..]
        } else {
            block::validate(block, n)?;
            block
        };
        debug!("{}: block size {}, param size {}", self, blk.len(), n);
        if blk.is_empty() {
            return Ok(());
        }

        match self {
            UpdateRule::Lipschitz => smooth::lipschitz(x, blk, loss),
            UpdateRule::NewtonUpperBound => smooth::newton_upper_bound(x, blk, loss, state),
            UpdateRule::AdaptiveLipschitz => smooth::adaptive_lipschitz(x, blk, loss, state),
            UpdateRule::LineSearchNewton | UpdateRule::LineSearchNewtonFull => {
                newton::line_search_newton(x, blk, loss, state)
            }
            UpdateRule::Sddm => newton::sddm(x, blk, loss, state, iteration, false),
            UpdateRule::SddmFull => {
                let reuse = loss.has_constant_hessian();
                newton::sddm(x, blk, loss, state, iteration, reuse)
            }
            UpdateRule::ProjectedLipschitz => constrained::projected_lipschitz(x, blk, loss),
            UpdateRule::ActiveSetNewton => constrained::active_set_newton(x, blk, loss, state),
            UpdateRule::NonNegQp => constrained::nonneg_qp(x, blk, loss, state),
            UpdateRule::BpExact | UpdateRule::BpExactFull => {
                energy::exact(x, blk, loss, state, energy::Path::General)
            }
            UpdateRule::BpExactLap => energy::exact(x, blk, loss, state, energy::Path::Sddm),
            UpdateRule::BpExactLapFull => {
                if iteration == 0 {
                    state.solver.reset();
                }
                energy::exact(x, blk, loss, state, energy::Path::SddmReused)
            }
            UpdateRule::BpGabp => energy::belief_propagation(x, blk, loss, state),
        }
    }
}

impl fmt::Display for UpdateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UpdateRule {
    type Err = BcdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "quadraticEg" => Ok(UpdateRule::Lipschitz),
            "newtonUpperBound" => Ok(UpdateRule::NewtonUpperBound),
            _ => UpdateRule::ALL
                .iter()
                .copied()
                .find(|r| r.name() == s)
                .ok_or_else(|| BcdError::UnknownRule(s.to_string())),
        }
    }
}

/// Tunables of the update rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOptions {
    /// Relative singular value cutoff of the pseudo-inverse in `Hb`.
    pub pinv_rcond: f64,
    /// `TMP-NN` holds coordinates below this with a positive gradient at 0.
    pub active_threshold: f64,
    pub gabp_max_iter: usize,
    /// Squared change of the messages below which `bpGabp` stops.
    pub gabp_tolerance: f64,
    /// Starting per-coordinate estimate for `LA`.
    pub la_initial: f64,
    pub la_max_doublings: usize,
    pub line_search: LineSearchOptions,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions {
            pinv_rcond: 1e-10,
            active_threshold: 1e-4,
            gabp_max_iter: 100,
            gabp_tolerance: 1e-8,
            la_initial: 1.,
            la_max_doublings: 200,
            line_search: LineSearchOptions::default(),
        }
    }
}

/// State carried by the update rules from one iteration to the next.
pub struct RuleState {
    pub options: UpdateOptions,
    la_lipschitz: Array1<f64>,
    solver: Box<dyn LinearSolver>,
    qp: Box<dyn QpSolver>,
}

impl RuleState {
    /// Dense LAPACK solvers and projected Gauss-Seidel for the QP.
    pub fn new(n_params: usize, options: UpdateOptions) -> Self {
        RuleState {
            la_lipschitz: Array1::from_elem(n_params, options.la_initial),
            options,
            solver: Box::new(DenseSolver::new()),
            qp: Box::new(ProjectedGaussSeidel::default()),
        }
    }

    pub fn with_linear_solver(mut self, solver: Box<dyn LinearSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_qp_solver(mut self, qp: Box<dyn QpSolver>) -> Self {
        self.qp = qp;
        self
    }

    /// The per-coordinate smoothness estimates accepted so far by `LA`.
    pub fn la_lipschitz(&self) -> ArrayView1<'_, f64> {
        self.la_lipschitz.view()
    }
}

impl fmt::Debug for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleState")
            .field("options", &self.options)
            .field("la_lipschitz", &self.la_lipschitz)
            .finish()
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::{LeastSquares, Logistic, NonNegLeastSquares, QuadraticEnergy, Regularization};
    use approx::assert_abs_diff_eq;
    use ndarray_linalg::Solve;
    use ndarray_rand::rand_distr::{Normal, Uniform};
    use ndarray_rand::RandomExt;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn random_ls(n: usize, d: usize, l2: f64) -> LeastSquares {
        let A = Array::random((n, d), Normal::new(0., 1.).unwrap());
        let b = Array::random(n, Normal::new(0., 1.).unwrap());
        LeastSquares::new(A, b, l2).unwrap()
    }

    fn spd(n: usize) -> Array2<f64> {
        let M = Array::random((n, n), Normal::new(0., 1.).unwrap());
        M.t().dot(&M) + Array2::<f64>::eye(n)
    }

    /// Records what the rules ask of the linear solver.
    #[derive(Default)]
    struct Calls {
        resets: usize,
        reuse: Vec<bool>,
    }

    struct RecordingSolver {
        inner: DenseSolver,
        calls: Rc<RefCell<Calls>>,
    }

    impl LinearSolver for RecordingSolver {
        fn solve(&mut self, a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
            self.inner.solve(a, b)
        }

        fn solve_sddm(&mut self, a: &Array2<f64>, b: &Array1<f64>, reuse: bool) -> Result<Array1<f64>> {
            self.calls.borrow_mut().reuse.push(reuse);
            self.inner.solve_sddm(a, b, reuse)
        }

        fn reset(&mut self) {
            self.calls.borrow_mut().resets += 1;
            self.inner.reset();
        }
    }

    fn recording_state(n: usize) -> (RuleState, Rc<RefCell<Calls>>) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let solver = RecordingSolver {
            inner: DenseSolver::new(),
            calls: calls.clone(),
        };
        let state = RuleState::new(n, UpdateOptions::default()).with_linear_solver(Box::new(solver));
        (state, calls)
    }

    #[test]
    fn names_and_aliases() {
        for rule in UpdateRule::ALL.iter() {
            assert_eq!(rule.to_string().parse::<UpdateRule>().unwrap(), *rule);
        }
        assert_eq!("quadraticEg".parse::<UpdateRule>().unwrap(), UpdateRule::Lipschitz);
        assert_eq!(
            "newtonUpperBound".parse::<UpdateRule>().unwrap(),
            UpdateRule::NewtonUpperBound
        );
        let err = "Newton".parse::<UpdateRule>().unwrap_err();
        assert_eq!(err.to_string(), "update rule `Newton` doesn't exist");
        assert!(UpdateRule::SddmFull.is_full());
        assert!(!UpdateRule::Sddm.is_full());
    }

    #[test]
    fn serde_uses_short_names() {
        let json = serde_json::to_string(&UpdateRule::BpExactLapFull).unwrap();
        assert_eq!(json, "\"bpExact-lap-full\"");
        let rule: UpdateRule = serde_json::from_str("\"quadraticEg\"").unwrap();
        assert_eq!(rule, UpdateRule::Lipschitz);
    }

    #[test]
    fn full_newton_upper_bound_solves_least_squares() {
        let A = Array::random((4, 3), Normal::new(0., 1.).unwrap());
        let b = array![1., -2., 0.5, 3.];
        let x_star = A.t().dot(&A).solve(&A.t().dot(&b)).unwrap();
        let loss = LeastSquares::new(A, b, 0.).unwrap();
        let mut x = Array1::zeros(3);
        let mut state = RuleState::new(3, UpdateOptions::default());
        UpdateRule::NewtonUpperBound
            .apply(&mut x, &[0, 1, 2], &loss, &mut state, 0)
            .unwrap();
        assert!((&x - &x_star).mapv(|v| v * v).sum().sqrt() < 1e-8);
    }

    #[test]
    fn bound_steps_never_increase_a_quadratic() {
        let loss = random_ls(20, 6, 0.1);
        let mut state = RuleState::new(6, UpdateOptions::default());
        let mut x = Array::random(6, Normal::new(0., 1.).unwrap());
        let blocks: [&[usize]; 4] = [&[0], &[1, 2], &[5, 3, 4], &[0, 1, 2, 3, 4, 5]];
        for rule in [UpdateRule::Lipschitz, UpdateRule::NewtonUpperBound].iter() {
            for blk in blocks.iter() {
                let before = loss.value(x.view()).unwrap();
                rule.apply(&mut x, blk, &loss, &mut state, 1).unwrap();
                assert!(loss.value(x.view()).unwrap() <= before + 1e-12);
            }
        }
    }

    #[test]
    fn rules_only_touch_the_block() {
        let loss = random_ls(15, 5, 0.2);
        let blk = [3, 1];
        for rule in [
            UpdateRule::Lipschitz,
            UpdateRule::NewtonUpperBound,
            UpdateRule::AdaptiveLipschitz,
            UpdateRule::LineSearchNewton,
            UpdateRule::Sddm,
        ]
        .iter()
        {
            let mut state = RuleState::new(5, UpdateOptions::default());
            let x0 = Array::random(5, Normal::new(0., 1.).unwrap());
            let mut x = x0.clone();
            rule.apply(&mut x, &blk, &loss, &mut state, 0).unwrap();
            for j in block::complement(&blk, 5) {
                assert_eq!(x[j], x0[j]);
            }
            assert!(loss.value(x.view()).unwrap() <= loss.value(x0.view()).unwrap() + 1e-12);
        }
    }

    #[test]
    fn adaptive_lipschitz_caches_its_estimate() {
        let A = array![[10., 0.], [0., 1.]];
        let loss = LeastSquares::new(A, array![1., 1.], 0.).unwrap();
        let mut state = RuleState::new(2, UpdateOptions::default());
        let mut x = Array1::zeros(2);
        UpdateRule::AdaptiveLipschitz
            .apply(&mut x, &[0], &loss, &mut state, 0)
            .unwrap();
        // curvature 100 along coordinate 0: 1 doubled up to 128
        assert_abs_diff_eq!(state.la_lipschitz()[0], 128.);
        assert_abs_diff_eq!(state.la_lipschitz()[1], 1.);
        assert_abs_diff_eq!(x[0], 10. / 128.);
    }

    #[test]
    fn line_search_newton_decreases_logistic() {
        let A = Array::random((30, 4), Normal::new(0., 1.).unwrap());
        let b = Array::random(30, Normal::new(0., 1.).unwrap()).mapv(|v: f64| v.signum());
        let loss = Logistic::new(A, b, 0.5).unwrap();
        let mut state = RuleState::new(4, UpdateOptions::default());
        let mut x = Array1::zeros(4);
        let mut previous = loss.value(x.view()).unwrap();
        for it in 0..10 {
            UpdateRule::LineSearchNewtonFull
                .apply(&mut x, &[], &loss, &mut state, it)
                .unwrap();
            let current = loss.value(x.view()).unwrap();
            assert!(current <= previous + 1e-12);
            previous = current;
        }
        assert_abs_diff_eq!(loss.gradient(x.view(), None), Array1::zeros(4), epsilon = 1e-6);
    }

    #[test]
    fn sddm_resets_and_reuses_only_for_constant_hessians() {
        let loss = random_ls(12, 4, 0.);
        let (mut state, calls) = recording_state(4);
        let mut x = Array1::zeros(4);
        for it in 0..3 {
            UpdateRule::SddmFull.apply(&mut x, &[], &loss, &mut state, it).unwrap();
        }
        assert_eq!(calls.borrow().resets, 1);
        assert_eq!(calls.borrow().reuse, vec![true, true, true]);

        let loss = random_ls(12, 4, 0.5);
        let (mut state, calls) = recording_state(4);
        UpdateRule::SddmFull.apply(&mut x, &[], &loss, &mut state, 0).unwrap();
        UpdateRule::Sddm.apply(&mut x, &[0, 1], &random_ls(12, 4, 0.), &mut state, 1).unwrap();
        assert_eq!(calls.borrow().reuse, vec![false, false]);
    }

    #[test]
    fn nonnegative_rules_stay_feasible() {
        let A = Array::random((20, 6), Uniform::new(0., 1.));
        let b = Array::random(20, Normal::new(0., 1.).unwrap());
        let reg = Regularization { l1: 0.5, l2: 0. };
        let loss = NonNegLeastSquares::new(A, b, reg).unwrap();
        for rule in [
            UpdateRule::ProjectedLipschitz,
            UpdateRule::ActiveSetNewton,
            UpdateRule::NonNegQp,
        ]
        .iter()
        {
            let mut state = RuleState::new(6, UpdateOptions::default());
            let mut x = Array1::zeros(6);
            let mut previous = loss.value(x.view()).unwrap();
            for it in 0..12 {
                let blk = [it % 6, (it + 1) % 6, (it + 3) % 6];
                rule.apply(&mut x, &blk, &loss, &mut state, it).unwrap();
                assert!(x.iter().all(|&v| v >= 0.));
                let current = loss.value(x.view()).unwrap();
                assert!(current <= previous + 1e-10);
                previous = current;
            }
        }
    }

    #[test]
    fn qp_block_satisfies_kkt() {
        let A = Array::random((15, 5), Normal::new(0., 1.).unwrap());
        let b = Array::random(15, Normal::new(0., 1.).unwrap());
        let loss = NonNegLeastSquares::new(A, b, Regularization { l1: 0.1, l2: 0. }).unwrap();
        let mut state = RuleState::new(5, UpdateOptions::default());
        let mut x = Array1::zeros(5);
        let blk = [0, 2, 4];
        UpdateRule::NonNegQp.apply(&mut x, &blk, &loss, &mut state, 0).unwrap();
        let g = loss.gradient(x.view(), Some(&blk));
        for (i, &j) in blk.iter().enumerate() {
            assert!(x[j] >= 0.);
            assert!(g[i] >= -1e-7);
            assert!((x[j] * g[i]).abs() <= 1e-7);
        }
    }

    #[test]
    fn active_set_holds_the_bound_and_steps_the_free_coordinates() {
        let A = array![[1., 0.5, 0.], [0., 1., 0.], [0., 0., 1.]];
        let b = array![2., 1., -1.];
        let loss = NonNegLeastSquares::new(A, b, Regularization { l1: 0.1, l2: 0. }).unwrap();
        let blk = [0, 1, 2];

        // at 0 the gradient is [-1.9, -1.9, 1.1]: coordinate 2 is held
        let mut x = Array1::zeros(3);
        let g0 = loss.gradient(x.view(), Some(&blk));
        assert_abs_diff_eq!(g0, array![-1.9, -1.9, 1.1], epsilon = 1e-12);

        let mut state = RuleState::new(3, UpdateOptions::default());
        UpdateRule::ActiveSetNewton.apply(&mut x, &blk, &loss, &mut state, 0).unwrap();
        assert_eq!(x[2], 0.);
        // free pair: the Newton step on [[1, 0.5], [0.5, 1.25]]
        assert_abs_diff_eq!(x, array![1.425, 0.95, 0.], epsilon = 1e-10);

        let mut y = Array1::zeros(3);
        let mut state = RuleState::new(3, UpdateOptions::default());
        UpdateRule::NonNegQp.apply(&mut y, &blk, &loss, &mut state, 0).unwrap();
        assert_abs_diff_eq!(x, y, epsilon = 1e-8);

        // a fixed point stays put
        let before = x.clone();
        UpdateRule::ActiveSetNewton.apply(&mut x, &blk, &loss, &mut state, 1).unwrap();
        assert_abs_diff_eq!(x, before, epsilon = 1e-12);
    }

    #[test]
    fn exact_block_matches_full_solution() {
        let A = spd(5);
        let b = Array::random(5, Normal::new(0., 1.).unwrap());
        let x_star = A.solve(&b).unwrap();
        let loss = QuadraticEnergy::new(A, b, 0.).unwrap();
        let blk = [3, 1];

        let mut x = x_star.clone();
        x[3] = 10.;
        x[1] = -10.;
        let mut state = RuleState::new(5, UpdateOptions::default());
        UpdateRule::BpExact.apply(&mut x, &blk, &loss, &mut state, 0).unwrap();
        assert_abs_diff_eq!(x, x_star, epsilon = 1e-10);

        let mut x = Array1::zeros(5);
        UpdateRule::BpExactFull.apply(&mut x, &blk, &loss, &mut state, 0).unwrap();
        assert_abs_diff_eq!(x, x_star, epsilon = 1e-10);
    }

    #[test]
    fn exact_block_minimizes_the_sub_problem() {
        let A = spd(5);
        let b = Array::random(5, Normal::new(0., 1.).unwrap());
        let loss = QuadraticEnergy::new(A, b, 0.3).unwrap();
        let blk = [0, 4];
        let mut x = Array::random(5, Normal::new(0., 1.).unwrap());
        let mut state = RuleState::new(5, UpdateOptions::default());
        UpdateRule::BpExact.apply(&mut x, &blk, &loss, &mut state, 0).unwrap();
        assert_abs_diff_eq!(loss.gradient(x.view(), Some(&blk)), Array1::zeros(2), epsilon = 1e-10);
    }

    #[test]
    fn laplacian_and_message_passing_agree_with_exact() {
        // diagonally dominant M-matrix
        let A = array![
            [4., -1., 0., -1., 0.],
            [-1., 4., -1., 0., -1.],
            [0., -1., 4., -1., 0.],
            [-1., 0., -1., 4., -1.],
            [0., -1., 0., -1., 4.]
        ];
        let b = array![1., 2., 0., -1., 3.];
        let loss = QuadraticEnergy::new(A, b, 0.).unwrap();
        let x0 = Array::random(5, Normal::new(0., 1.).unwrap());
        let blk = [0, 1, 3];

        let mut state = RuleState::new(5, UpdateOptions::default());
        let mut exact = x0.clone();
        UpdateRule::BpExact.apply(&mut exact, &blk, &loss, &mut state, 0).unwrap();
        for rule in [UpdateRule::BpExactLap, UpdateRule::BpGabp].iter() {
            let mut x = x0.clone();
            rule.apply(&mut x, &blk, &loss, &mut state, 0).unwrap();
            assert_abs_diff_eq!(x, exact, epsilon = 1e-4);
        }

        let (mut state, calls) = recording_state(5);
        let mut x = Array1::zeros(5);
        for it in 0..2 {
            UpdateRule::BpExactLapFull.apply(&mut x, &[], &loss, &mut state, it).unwrap();
        }
        assert_eq!(calls.borrow().resets, 1);
        assert_eq!(calls.borrow().reuse, vec![true, true]);
        assert_abs_diff_eq!(loss.gradient(x.view(), None), Array1::zeros(5), epsilon = 1e-10);
    }

    #[test]
    fn exact_rules_need_a_quadratic() {
        let loss = Logistic::new(array![[1., 0.], [0., 1.]], array![1., -1.], 0.).unwrap();
        let mut state = RuleState::new(2, UpdateOptions::default());
        let mut x = Array1::zeros(2);
        for rule in [UpdateRule::BpExact, UpdateRule::BpGabp, UpdateRule::NonNegQp].iter() {
            let err = rule.apply(&mut x, &[0], &loss, &mut state, 0);
            assert!(matches!(err, Err(BcdError::ContractViolation(_))));
        }
    }

    #[test]
    fn bad_inputs_are_rejected() {
        let loss = random_ls(5, 3, 0.);
        let mut state = RuleState::new(3, UpdateOptions::default());
        let mut x = Array1::zeros(3);
        assert!(UpdateRule::Lipschitz.apply(&mut x, &[3], &loss, &mut state, 0).is_err());
        assert!(UpdateRule::Lipschitz.apply(&mut x, &[1, 1], &loss, &mut state, 0).is_err());
        let mut short = Array1::zeros(2);
        assert!(UpdateRule::Lipschitz.apply(&mut short, &[0], &loss, &mut state, 0).is_err());
        // empty blocks are a no-op
        UpdateRule::NewtonUpperBound.apply(&mut x, &[], &loss, &mut state, 0).unwrap();
        assert_eq!(x, Array1::<f64>::zeros(3));
    }
}
