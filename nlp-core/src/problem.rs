//! Problem interface and solve results.
//!
//! Problems are described by implementing [`NlpProblem`]:
//!
//! ```text
//! minimize    f(x)
//! subject to  g_L <= g(x) <= g_U
//!             x_L <= x <= x_U
//! ```
//!
//! Bounds at or beyond ±1e19 (configurable) are treated as infinite. A
//! constraint row with `g_L == g_U` is an equality.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Result type of problem callbacks.
pub type EvalResult<T> = Result<T, EvalError>;

/// A smooth nonlinear program.
///
/// Jacobian and Hessian are exchanged as triplets: the structure methods are
/// called once per solve and must return the same pattern every time; the
/// value methods fill one value per structure entry, in the same order.
/// Duplicate entries are summed.
pub trait NlpProblem {
    fn num_variables(&self) -> usize;
    fn num_constraints(&self) -> usize;

    /// Fill variable bounds.
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]);

    /// Fill constraint bounds.
    fn constraint_bounds(&self, g_l: &mut [f64], g_u: &mut [f64]);

    /// Fill the starting point.
    fn initial_point(&self, x: &mut [f64]);

    /// Initial constraint multipliers and bound multipliers `(lambda, z_l, z_u)`.
    ///
    /// `None` (the default) lets the solver initialize them.
    fn initial_multipliers(&self) -> Option<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        None
    }

    fn objective(&mut self, x: &[f64]) -> EvalResult<f64>;
    fn objective_grad(&mut self, x: &[f64], grad: &mut [f64]) -> EvalResult<()>;
    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> EvalResult<()>;

    /// Jacobian sparsity as (row, col) pairs.
    fn jacobian_structure(&self) -> Vec<(usize, usize)>;
    fn jacobian_values(&mut self, x: &[f64], vals: &mut [f64]) -> EvalResult<()>;

    /// Hessian of the Lagrangian sparsity as (row, col) pairs with row >= col.
    ///
    /// The default is the dense lower triangle, matching the default
    /// [`hessian_values`](Self::hessian_values) that assembles the Hessian
    /// from Hessian-vector products.
    fn hessian_structure(&self) -> Vec<(usize, usize)> {
        let n = self.num_variables();
        let mut entries = Vec::with_capacity(n * (n + 1) / 2);
        for row in 0..n {
            for col in 0..=row {
                entries.push((row, col));
            }
        }
        entries
    }

    /// Values of `obj_factor ∇²f(x) + Σ lambda_i ∇²g_i(x)` for the
    /// [`hessian_structure`](Self::hessian_structure) entries.
    fn hessian_values(
        &mut self,
        x: &[f64],
        obj_factor: f64,
        lambda: &[f64],
        vals: &mut [f64],
    ) -> EvalResult<()> {
        let n = self.num_variables();
        let mut e = vec![0.0; n];
        let mut hv = vec![0.0; n];
        let mut k = 0;
        let mut dense = vec![0.0; n * n];
        for j in 0..n {
            e[j] = 1.0;
            self.hessian_vector_product(x, obj_factor, lambda, &e, &mut hv)?;
            e[j] = 0.0;
            for i in 0..n {
                dense[i * n + j] = hv[i];
            }
        }
        for row in 0..n {
            for col in 0..=row {
                if k >= vals.len() {
                    return Err(EvalError::Failed(
                        "hessian_structure does not match the dense default".to_string(),
                    ));
                }
                vals[k] = 0.5 * (dense[row * n + col] + dense[col * n + row]);
                k += 1;
            }
        }
        Ok(())
    }

    /// Product of the Hessian of the Lagrangian with `v`.
    fn hessian_vector_product(
        &mut self,
        _x: &[f64],
        _obj_factor: f64,
        _lambda: &[f64],
        _v: &[f64],
        _hv: &mut [f64],
    ) -> EvalResult<()> {
        Err(EvalError::NotProvided("hessian_vector_product"))
    }

    /// Called once per iteration; returning `false` stops the solve.
    fn intermediate_callback(&mut self, _summary: &IterationSummary) -> bool {
        true
    }
}

/// Which algorithm phase produced an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmMode {
    Regular,
    RestorationPhase,
}

/// Diagnostic scalars reported once per iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationSummary {
    pub mode: AlgorithmMode,
    pub iter: usize,
    pub obj_value: f64,
    /// Primal infeasibility (max norm)
    pub inf_pr: f64,
    /// Dual infeasibility (max norm)
    pub inf_du: f64,
    pub mu: f64,
    /// Max norm of the last primal step; 0 before the first direction
    pub d_norm: f64,
    /// Hessian perturbation δw of the last direction
    pub regularization_size: f64,
    pub alpha_du: f64,
    pub alpha_pr: f64,
    pub ls_trials: usize,
}

/// Terminal (and non-terminal) outcomes of the convergence test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    Continue,
    Converged,
    ConvergedToAcceptablePoint,
    MaxIterExceeded,
    CpuTimeExceeded,
    Diverging,
    RestorationFailure,
    /// A negligible step was taken with μ already at its lower limit
    StopAtTinyStep,
    UserStop,
}

impl ConvergenceStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConvergenceStatus::Continue)
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::Converged | ConvergenceStatus::ConvergedToAcceptablePoint
        )
    }
}

impl fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceStatus::Continue => write!(f, "Continue"),
            ConvergenceStatus::Converged => write!(f, "Converged"),
            ConvergenceStatus::ConvergedToAcceptablePoint => write!(f, "Converged to Acceptable Point"),
            ConvergenceStatus::MaxIterExceeded => write!(f, "MaxIter Exceeded"),
            ConvergenceStatus::CpuTimeExceeded => write!(f, "CPU Time Exceeded"),
            ConvergenceStatus::Diverging => write!(f, "Diverging Iterates"),
            ConvergenceStatus::RestorationFailure => write!(f, "Restoration Failure"),
            ConvergenceStatus::StopAtTinyStep => write!(f, "Search Direction Becomes Too Small"),
            ConvergenceStatus::UserStop => write!(f, "User Stop"),
        }
    }
}

/// Solve result with the final iterate and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveResult {
    pub status: ConvergenceStatus,

    /// Primal solution x (length n)
    pub x: Vec<f64>,

    /// Constraint multipliers (length m, original row order)
    pub lambda: Vec<f64>,

    /// Multipliers of the lower variable bounds (0 where unbounded)
    pub z_l: Vec<f64>,

    /// Multipliers of the upper variable bounds (0 where unbounded)
    pub z_u: Vec<f64>,

    /// Objective value at x
    pub obj_val: f64,

    /// Constraint values g(x)
    pub g: Vec<f64>,

    pub info: SolveInfo,
}

/// Number of callback evaluations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCounts {
    pub obj: usize,
    pub grad: usize,
    pub constr: usize,
    pub jac: usize,
    pub hess: usize,
}

/// Solve statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolveInfo {
    /// Iterations, including restoration iterations
    pub iters: usize,

    /// Wall-clock solve time (milliseconds)
    pub solve_time_ms: u64,

    pub evals: EvalCounts,

    /// Final dual infeasibility (max norm)
    pub dual_inf: f64,

    /// Final constraint violation of the original problem (max norm)
    pub constr_viol: f64,

    /// Final complementarity with respect to the target mu (max norm)
    pub compl: f64,

    /// Final overall (scaled) NLP error
    pub nlp_error: f64,

    /// Final barrier parameter μ
    pub mu: f64,

    /// Hessian perturbation of the last direction
    pub last_regularization: f64,

    /// Number of restoration phase calls
    pub restoration_calls: usize,

    /// Regular-phase steps accepted after a second-order correction
    pub soc_steps: usize,
}
