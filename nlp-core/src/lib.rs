//! nlp-core: an interior point solver for smooth nonlinear programs
//!
//! Solves problems of the form
//!
//! ```text
//! minimize    f(x)
//! subject to  g_L <= g(x) <= g_U
//!             x_L <= x <= x_U
//! ```
//!
//! where f and g are twice continuously differentiable. The result is a
//! local solution, or a diagnosed failure status.
//!
//! # Algorithm
//!
//! A primal-dual barrier method:
//!
//! - **Newton steps** on the barrier optimality conditions, from a reduced
//!   symmetric indefinite KKT system
//! - **Inertia correction** by diagonal regularization, so every direction
//!   is a descent direction for the barrier problem
//! - **Filter line search** with second-order corrections
//! - **Feasibility restoration** when no acceptable step exists
//! - **Monotone or adaptive** barrier parameter updates
//!
//! # Example
//!
//! ```ignore
//! use nlp_core::{solve, NlpProblem, SolverSettings};
//!
//! let mut problem = MyProblem::new();
//! let result = solve(&mut problem, &SolverSettings::default())?;
//!
//! println!("Status: {}", result.status);
//! println!("Objective: {}", result.obj_val);
//! println!("Solution: {:?}", result.x);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // line search and restoration pass many iterate pieces

pub mod error;
pub mod ipm;
pub mod linalg;
pub mod problem;
pub mod settings;
pub mod util;

pub use error::{EvalError, SolverError, SolverResult};
pub use linalg::backend::LinearSolverKind;
pub use problem::{
    AlgorithmMode, ConvergenceStatus, EvalCounts, EvalResult, IterationSummary, NlpProblem, SolveInfo,
    SolveResult,
};
pub use settings::{MuStrategy, SolverSettings};

/// Configured solver with an optional per-iteration callback.
///
/// The callback sees every iteration summary (restoration iterations
/// included) after the problem's own `intermediate_callback`; returning
/// `false` stops the solve with [`ConvergenceStatus::UserStop`].
pub struct Solver<'c> {
    settings: SolverSettings,
    callback: Option<Box<dyn FnMut(&IterationSummary) -> bool + 'c>>,
}

impl<'c> Solver<'c> {
    pub fn new(settings: SolverSettings) -> Self {
        Self {
            settings,
            callback: None,
        }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn with_intermediate_callback(mut self, callback: impl FnMut(&IterationSummary) -> bool + 'c) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Solve `problem` from its starting point.
    ///
    /// Returns `Err` only when no iterate can be produced (invalid options or
    /// problem, failed evaluation at the starting point, linear solver setup
    /// failure). Every algorithmic outcome is an `Ok` result with a status.
    pub fn solve(&mut self, problem: &mut dyn NlpProblem) -> SolverResult<SolveResult> {
        self.settings.validate()?;
        match self.callback.as_mut() {
            Some(callback) => ipm::solve_nlp(problem, &self.settings, callback.as_mut()),
            None => ipm::solve_nlp(problem, &self.settings, &mut |_: &IterationSummary| true),
        }
    }
}

/// Main solve entry point.
///
/// # Example
///
/// ```ignore
/// use nlp_core::{solve, SolverSettings};
///
/// let settings = SolverSettings { tol: 1e-10, ..Default::default() };
/// let result = solve(&mut problem, &settings)?;
/// assert!(result.status.is_success());
/// ```
pub fn solve(problem: &mut dyn NlpProblem, settings: &SolverSettings) -> SolverResult<SolveResult> {
    Solver::new(settings.clone()).solve(problem)
}
