//! Termination tests.
//!
//! The check runs once per iteration, after the intermediate callback:
//! optimality first, then the "acceptable point" counter, then the
//! divergence, iteration and time limits.

use std::time::Duration;

use super::quantities::{IterateQuantities, IterationInfo};
use crate::problem::{AlgorithmMode, ConvergenceStatus, IterationSummary};
use crate::settings::SolverSettings;
use crate::util::Norm;

/// Relaxed tolerance used for dual infeasibility and complementarity on
/// square problems, where only feasibility matters.
const SQUARE_PROBLEM_TOL: f64 = 1e300;

/// Everything a convergence test may look at for one iteration.
pub struct ConvergenceState<'a> {
    pub iter: usize,
    /// Added to `iter` in the iteration summary (restoration iterations)
    pub iter_offset: usize,
    pub quantities: &'a IterateQuantities,
    pub mu: f64,
    pub info: &'a IterationInfo,
    pub elapsed: Duration,
    pub mode: AlgorithmMode,
}

impl ConvergenceState<'_> {
    pub fn summary(&self) -> IterationSummary {
        let q = self.quantities;
        IterationSummary {
            mode: self.mode,
            iter: self.iter + self.iter_offset,
            obj_value: q.f(),
            inf_pr: q.primal_infeasibility(Norm::Max),
            inf_du: q.dual_infeasibility(Norm::Max),
            mu: self.mu,
            d_norm: self.info.step_norm(),
            regularization_size: self.info.regularization,
            alpha_du: self.info.alpha_dual,
            alpha_pr: self.info.alpha_primal,
            ls_trials: self.info.ls_trials,
        }
    }
}

/// Callback invoked with every iteration summary; `false` stops the solve.
pub type IterationCallback<'c> = dyn FnMut(&IterationSummary) -> bool + 'c;

pub trait ConvergenceCheck {
    fn check_convergence(&mut self, state: &ConvergenceState<'_>, callback: &mut IterationCallback<'_>) -> ConvergenceStatus;
}

/// Scalar measures the optimality test decides on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceMeasures {
    pub iter: usize,
    pub overall_error: f64,
    pub dual_inf: f64,
    pub constr_viol: f64,
    pub compl_inf: f64,
    pub objective: f64,
    pub max_abs_x: f64,
    pub elapsed: f64,
    pub square: bool,
}

impl ConvergenceMeasures {
    pub fn from_state(state: &ConvergenceState<'_>, mu_target: f64) -> Self {
        let q = state.quantities;
        Self {
            iter: state.iter,
            overall_error: q.nlp_error(mu_target),
            dual_inf: q.dual_infeasibility(Norm::Max),
            constr_viol: q.constraint_violation(Norm::Max),
            compl_inf: q.complementarity(mu_target, Norm::Max),
            objective: q.f(),
            max_abs_x: q.max_abs_x(),
            elapsed: state.elapsed.as_secs_f64(),
            square: q.layout().is_square(),
        }
    }
}

/// Optimality-error based convergence test.
#[derive(Debug, Clone)]
pub struct OptimalityErrorCheck {
    tol: f64,
    dual_inf_tol: f64,
    constr_viol_tol: f64,
    compl_inf_tol: f64,
    acceptable_tol: f64,
    acceptable_iter: usize,
    acceptable_dual_inf_tol: f64,
    acceptable_constr_viol_tol: f64,
    acceptable_compl_inf_tol: f64,
    acceptable_obj_change_tol: f64,
    diverging_iterates_tol: f64,
    max_iter: usize,
    max_cpu_time: f64,
    mu_target: f64,

    acceptable_counter: usize,
    /// Objective at the last iteration the acceptable test ran
    last_obj: Option<f64>,
    curr_obj: Option<f64>,
    last_obj_iter: Option<usize>,
}

impl OptimalityErrorCheck {
    pub fn new(settings: &SolverSettings) -> Self {
        Self {
            tol: settings.tol,
            dual_inf_tol: settings.dual_inf_tol,
            constr_viol_tol: settings.constr_viol_tol,
            compl_inf_tol: settings.compl_inf_tol,
            acceptable_tol: settings.acceptable_tol,
            acceptable_iter: settings.acceptable_iter,
            acceptable_dual_inf_tol: settings.acceptable_dual_inf_tol,
            acceptable_constr_viol_tol: settings.acceptable_constr_viol_tol,
            acceptable_compl_inf_tol: settings.acceptable_compl_inf_tol,
            acceptable_obj_change_tol: settings.acceptable_obj_change_tol,
            diverging_iterates_tol: settings.diverging_iterates_tol,
            max_iter: settings.max_iter,
            max_cpu_time: settings.max_cpu_time,
            mu_target: settings.mu_target,
            acceptable_counter: 0,
            last_obj: None,
            curr_obj: None,
            last_obj_iter: None,
        }
    }

    pub fn acceptable_counter(&self) -> usize {
        self.acceptable_counter
    }

    pub fn mu_target(&self) -> f64 {
        self.mu_target
    }

    /// Decide on the measures of one iteration.
    pub fn decide(&mut self, m: &ConvergenceMeasures) -> ConvergenceStatus {
        let (dual_inf_tol, compl_inf_tol) = if m.square {
            (SQUARE_PROBLEM_TOL, SQUARE_PROBLEM_TOL)
        } else {
            (self.dual_inf_tol, self.compl_inf_tol)
        };

        if m.overall_error <= self.tol
            && m.dual_inf <= dual_inf_tol
            && m.constr_viol <= self.constr_viol_tol
            && m.compl_inf <= compl_inf_tol
        {
            return ConvergenceStatus::Converged;
        }

        if self.acceptable_iter > 0 {
            if self.current_is_acceptable(m) {
                self.acceptable_counter += 1;
            } else {
                self.acceptable_counter = 0;
            }
            if self.acceptable_counter >= self.acceptable_iter {
                return ConvergenceStatus::ConvergedToAcceptablePoint;
            }
        }

        if !(m.max_abs_x <= self.diverging_iterates_tol) {
            return ConvergenceStatus::Diverging;
        }
        if m.iter >= self.max_iter {
            return ConvergenceStatus::MaxIterExceeded;
        }
        if m.elapsed > self.max_cpu_time {
            return ConvergenceStatus::CpuTimeExceeded;
        }
        ConvergenceStatus::Continue
    }

    fn current_is_acceptable(&mut self, m: &ConvergenceMeasures) -> bool {
        if self.last_obj_iter != Some(m.iter) {
            self.last_obj = self.curr_obj;
            self.curr_obj = Some(m.objective);
            self.last_obj_iter = Some(m.iter);
        }

        let (dual_inf_tol, compl_inf_tol) = if m.square {
            (SQUARE_PROBLEM_TOL, SQUARE_PROBLEM_TOL)
        } else {
            (self.acceptable_dual_inf_tol, self.acceptable_compl_inf_tol)
        };

        let obj_ok = match self.last_obj {
            Some(last) => (m.objective - last).abs() / m.objective.abs().max(1.0) <= self.acceptable_obj_change_tol,
            None => true,
        };

        m.overall_error <= self.acceptable_tol
            && m.dual_inf <= dual_inf_tol
            && m.constr_viol <= self.acceptable_constr_viol_tol
            && m.compl_inf <= compl_inf_tol
            && obj_ok
    }
}

impl ConvergenceCheck for OptimalityErrorCheck {
    fn check_convergence(&mut self, state: &ConvergenceState<'_>, callback: &mut IterationCallback<'_>) -> ConvergenceStatus {
        if !callback(&state.summary()) {
            return ConvergenceStatus::UserStop;
        }
        let measures = ConvergenceMeasures::from_state(state, self.mu_target);
        self.decide(&measures)
    }
}
