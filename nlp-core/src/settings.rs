//! Solver configuration.
//!
//! All options are plain fields with documented defaults. The settings are
//! read once at the start of a solve and validated before any iteration.

use serde::{Deserialize, Serialize};

use crate::error::{SolverError, SolverResult};
use crate::linalg::backend::LinearSolverKind;

/// Barrier parameter update strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MuStrategy {
    /// Fiacco-McCormick: decrease mu once the barrier subproblem is solved.
    #[default]
    Monotone,

    /// Choose mu every iteration from the complementarity of the iterate,
    /// falling back to monotone mode when progress stalls.
    Adaptive,
}

impl std::str::FromStr for MuStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "monotone" => Ok(MuStrategy::Monotone),
            "adaptive" => Ok(MuStrategy::Adaptive),
            other => Err(format!("unknown mu strategy '{}'", other)),
        }
    }
}

/// Interior-point solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    // === Termination ===
    /// Maximum number of iterations (restoration iterations included)
    pub max_iter: usize,

    /// Maximum wall-clock time in seconds
    pub max_cpu_time: f64,

    /// Tolerance on the scaled overall NLP error
    pub tol: f64,

    /// Absolute tolerance on the dual infeasibility
    pub dual_inf_tol: f64,

    /// Absolute tolerance on the constraint violation
    pub constr_viol_tol: f64,

    /// Absolute tolerance on the complementarity
    pub compl_inf_tol: f64,

    /// "Acceptable" overall error tolerance
    pub acceptable_tol: f64,

    /// Number of consecutive acceptable iterations before stopping (0 disables)
    pub acceptable_iter: usize,

    pub acceptable_dual_inf_tol: f64,
    pub acceptable_constr_viol_tol: f64,
    pub acceptable_compl_inf_tol: f64,

    /// Relative objective change allowed between acceptable iterations
    pub acceptable_obj_change_tol: f64,

    /// Iterates with max|x| above this are declared diverging
    pub diverging_iterates_tol: f64,

    // === Barrier parameter ===
    pub mu_strategy: MuStrategy,

    /// Initial barrier parameter
    pub mu_init: f64,

    /// Limiting value of mu the method drives toward
    pub mu_target: f64,

    /// Lower bound on mu for the adaptive strategy
    pub mu_min: f64,

    /// Upper bound on mu for the adaptive strategy, as a factor of the
    /// initial average complementarity
    pub mu_max_fact: f64,

    /// κ_ε: subproblem solved when barrier error <= barrier_tol_factor * mu
    pub barrier_tol_factor: f64,

    /// κ_μ in the monotone update
    pub mu_linear_decrease_factor: f64,

    /// θ_μ in the monotone update
    pub mu_superlinear_decrease_power: f64,

    /// Lower bound on the fraction-to-the-boundary parameter
    pub tau_min: f64,

    /// Scaling factor σ₀ of the centrality oracle
    pub adaptive_mu_sigma_factor: f64,

    /// Exponent of the centrality measure in the oracle
    pub adaptive_mu_centrality_exponent: f64,

    /// Lower limit for mu relative to the previous mu in free mode
    pub adaptive_mu_lower_ratio: f64,

    /// Upper limit for mu relative to the previous mu in free mode
    pub adaptive_mu_upper_ratio: f64,

    /// Length of the KKT error reference list
    pub adaptive_mu_kkterror_red_iters: usize,

    /// Required KKT error reduction relative to the reference list
    pub adaptive_mu_kkterror_red_fact: f64,

    /// mu = factor * avg complementarity when switching to monotone mode
    pub adaptive_mu_monotone_init_factor: f64,

    // === Line search ===
    pub theta_max_fact: f64,
    pub theta_min_fact: f64,
    /// Armijo constant
    pub eta_phi: f64,
    pub delta: f64,
    pub s_phi: f64,
    pub s_theta: f64,
    pub gamma_phi: f64,
    pub gamma_theta: f64,
    pub alpha_min_frac: f64,
    pub alpha_red_factor: f64,

    /// Maximum number of second-order corrections per iteration
    pub max_soc: usize,
    pub kappa_soc: f64,

    /// Hard limit on backtracking trials per iteration
    pub max_line_search_trials: usize,

    /// Bound multiplier safeguard κ_Σ
    pub kappa_sigma: f64,

    /// Linear damping of one-sided bounds in the barrier objective
    pub kappa_d: f64,

    /// Relative step size below which the full step is taken without a search
    pub tiny_step_tol: f64,

    // === Regularization ===
    pub first_hessian_perturbation: f64,
    pub min_hessian_perturbation: f64,
    pub max_hessian_perturbation: f64,
    pub perturb_inc_fact_first: f64,
    pub perturb_inc_fact: f64,
    pub perturb_dec_fact: f64,
    pub jacobian_regularization_value: f64,
    pub jacobian_regularization_exponent: f64,

    /// Maximum number of factorizations for one direction
    pub max_perturbation_trials: usize,

    // === Restoration phase ===
    /// Enter the restoration phase in the first iteration
    pub start_with_resto: bool,
    pub resto_max_iter: usize,
    /// ρ: weight of the constraint relaxation variables
    pub resto_penalty_parameter: f64,
    /// ζ: weight of the proximity term
    pub resto_proximity_weight: f64,
    /// Restoration succeeds once θ <= factor * θ at entry
    pub required_infeasibility_reduction: f64,
    /// Bound multipliers above this are reset to 1 after restoration
    pub bound_mult_reset_threshold: f64,

    // === Initialization ===
    pub bound_push: f64,
    pub bound_frac: f64,
    pub bound_mult_init_val: f64,
    pub bound_relax_factor: f64,
    pub nlp_lower_bound_inf: f64,
    pub nlp_upper_bound_inf: f64,

    // === Linear algebra ===
    pub linear_solver: LinearSolverKind,

    /// Use a CAMD fill-reducing ordering for the KKT matrix
    pub kkt_ordering: bool,

    /// Iterative refinement steps for KKT solves
    pub kkt_refine_iters: usize,

    // === Output ===
    /// Log one line per iteration at info level (debug level otherwise)
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        let linear_solver = std::env::var("NLP_LINEAR_SOLVER")
            .ok()
            .and_then(|s| s.parse::<LinearSolverKind>().ok())
            .unwrap_or_default();
        let kkt_refine_iters = std::env::var("NLP_KKT_REFINE_ITERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(1);

        Self {
            max_iter: 3000,
            max_cpu_time: 1e6,
            tol: 1e-8,
            dual_inf_tol: 1.0,
            constr_viol_tol: 1e-4,
            compl_inf_tol: 1e-4,
            acceptable_tol: 1e-6,
            acceptable_iter: 15,
            acceptable_dual_inf_tol: 1e10,
            acceptable_constr_viol_tol: 1e-2,
            acceptable_compl_inf_tol: 1e-2,
            acceptable_obj_change_tol: 1e20,
            diverging_iterates_tol: 1e20,

            mu_strategy: MuStrategy::Monotone,
            mu_init: 0.1,
            mu_target: 0.0,
            mu_min: 1e-11,
            mu_max_fact: 1e3,
            barrier_tol_factor: 10.0,
            mu_linear_decrease_factor: 0.2,
            mu_superlinear_decrease_power: 1.5,
            tau_min: 0.99,
            adaptive_mu_sigma_factor: 0.1,
            adaptive_mu_centrality_exponent: 3.0,
            adaptive_mu_lower_ratio: 1e-2,
            adaptive_mu_upper_ratio: 10.0,
            adaptive_mu_kkterror_red_iters: 4,
            adaptive_mu_kkterror_red_fact: 0.9999,
            adaptive_mu_monotone_init_factor: 0.8,

            theta_max_fact: 1e4,
            theta_min_fact: 1e-4,
            eta_phi: 1e-8,
            delta: 1.0,
            s_phi: 2.3,
            s_theta: 1.1,
            gamma_phi: 1e-8,
            gamma_theta: 1e-5,
            alpha_min_frac: 0.05,
            alpha_red_factor: 0.5,
            max_soc: 4,
            kappa_soc: 0.99,
            max_line_search_trials: 40,
            kappa_sigma: 1e10,
            kappa_d: 1e-5,
            tiny_step_tol: 10.0 * f64::EPSILON,

            first_hessian_perturbation: 1e-4,
            min_hessian_perturbation: 1e-20,
            max_hessian_perturbation: 1e20,
            perturb_inc_fact_first: 100.0,
            perturb_inc_fact: 8.0,
            perturb_dec_fact: 1.0 / 3.0,
            jacobian_regularization_value: 1e-8,
            jacobian_regularization_exponent: 0.25,
            max_perturbation_trials: 60,

            start_with_resto: false,
            resto_max_iter: 500,
            resto_penalty_parameter: 1000.0,
            resto_proximity_weight: 1.0,
            required_infeasibility_reduction: 0.9,
            bound_mult_reset_threshold: 1000.0,

            bound_push: 1e-2,
            bound_frac: 1e-2,
            bound_mult_init_val: 1.0,
            bound_relax_factor: 1e-8,
            nlp_lower_bound_inf: -1e19,
            nlp_upper_bound_inf: 1e19,

            linear_solver,
            kkt_ordering: true,
            kkt_refine_iters,

            verbose: false,
        }
    }
}

fn positive(name: &'static str, value: f64) -> SolverResult<()> {
    if value > 0.0 && !value.is_nan() {
        Ok(())
    } else {
        Err(SolverError::invalid_option(name, value, "must be positive"))
    }
}

fn non_negative(name: &'static str, value: f64) -> SolverResult<()> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(SolverError::invalid_option(name, value, "must be non-negative"))
    }
}

fn open_unit(name: &'static str, value: f64) -> SolverResult<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(SolverError::invalid_option(name, value, "must lie in (0, 1)"))
    }
}

impl SolverSettings {
    /// Check every option against its admissible range.
    pub fn validate(&self) -> SolverResult<()> {
        positive("max_cpu_time", self.max_cpu_time)?;
        positive("tol", self.tol)?;
        if !(self.dual_inf_tol > 0.0 && self.dual_inf_tol <= 1.0) {
            return Err(SolverError::invalid_option(
                "dual_inf_tol",
                self.dual_inf_tol,
                "must lie in (0, 1]",
            ));
        }
        positive("constr_viol_tol", self.constr_viol_tol)?;
        positive("compl_inf_tol", self.compl_inf_tol)?;
        positive("acceptable_tol", self.acceptable_tol)?;
        positive("acceptable_dual_inf_tol", self.acceptable_dual_inf_tol)?;
        positive("acceptable_constr_viol_tol", self.acceptable_constr_viol_tol)?;
        positive("acceptable_compl_inf_tol", self.acceptable_compl_inf_tol)?;
        non_negative("acceptable_obj_change_tol", self.acceptable_obj_change_tol)?;
        positive("diverging_iterates_tol", self.diverging_iterates_tol)?;

        positive("mu_init", self.mu_init)?;
        non_negative("mu_target", self.mu_target)?;
        positive("mu_min", self.mu_min)?;
        positive("mu_max_fact", self.mu_max_fact)?;
        positive("barrier_tol_factor", self.barrier_tol_factor)?;
        open_unit("mu_linear_decrease_factor", self.mu_linear_decrease_factor)?;
        if !(self.mu_superlinear_decrease_power > 1.0 && self.mu_superlinear_decrease_power < 2.0) {
            return Err(SolverError::invalid_option(
                "mu_superlinear_decrease_power",
                self.mu_superlinear_decrease_power,
                "must lie in (1, 2)",
            ));
        }
        open_unit("tau_min", self.tau_min)?;
        positive("adaptive_mu_sigma_factor", self.adaptive_mu_sigma_factor)?;
        positive("adaptive_mu_centrality_exponent", self.adaptive_mu_centrality_exponent)?;
        if !(self.adaptive_mu_lower_ratio > 0.0 && self.adaptive_mu_lower_ratio <= 1.0) {
            return Err(SolverError::invalid_option(
                "adaptive_mu_lower_ratio",
                self.adaptive_mu_lower_ratio,
                "must lie in (0, 1]",
            ));
        }
        if self.adaptive_mu_upper_ratio < 1.0 {
            return Err(SolverError::invalid_option(
                "adaptive_mu_upper_ratio",
                self.adaptive_mu_upper_ratio,
                "must be at least 1",
            ));
        }
        open_unit("adaptive_mu_kkterror_red_fact", self.adaptive_mu_kkterror_red_fact)?;
        open_unit("adaptive_mu_monotone_init_factor", self.adaptive_mu_monotone_init_factor)?;

        positive("theta_max_fact", self.theta_max_fact)?;
        positive("theta_min_fact", self.theta_min_fact)?;
        if self.theta_min_fact >= self.theta_max_fact {
            return Err(SolverError::invalid_option(
                "theta_min_fact",
                self.theta_min_fact,
                "must be smaller than theta_max_fact",
            ));
        }
        if !(self.eta_phi > 0.0 && self.eta_phi < 0.5) {
            return Err(SolverError::invalid_option("eta_phi", self.eta_phi, "must lie in (0, 0.5)"));
        }
        positive("delta", self.delta)?;
        if self.s_phi <= 1.0 {
            return Err(SolverError::invalid_option("s_phi", self.s_phi, "must be greater than 1"));
        }
        if self.s_theta <= 1.0 {
            return Err(SolverError::invalid_option("s_theta", self.s_theta, "must be greater than 1"));
        }
        open_unit("gamma_phi", self.gamma_phi)?;
        open_unit("gamma_theta", self.gamma_theta)?;
        open_unit("alpha_min_frac", self.alpha_min_frac)?;
        open_unit("alpha_red_factor", self.alpha_red_factor)?;
        open_unit("kappa_soc", self.kappa_soc)?;
        if self.max_line_search_trials == 0 {
            return Err(SolverError::invalid_option(
                "max_line_search_trials",
                self.max_line_search_trials,
                "must be at least 1",
            ));
        }
        if self.kappa_sigma < 1.0 {
            return Err(SolverError::invalid_option("kappa_sigma", self.kappa_sigma, "must be at least 1"));
        }
        non_negative("kappa_d", self.kappa_d)?;
        non_negative("tiny_step_tol", self.tiny_step_tol)?;

        positive("first_hessian_perturbation", self.first_hessian_perturbation)?;
        positive("min_hessian_perturbation", self.min_hessian_perturbation)?;
        if self.max_hessian_perturbation <= self.first_hessian_perturbation {
            return Err(SolverError::invalid_option(
                "max_hessian_perturbation",
                self.max_hessian_perturbation,
                "must exceed first_hessian_perturbation",
            ));
        }
        if self.perturb_inc_fact_first <= 1.0 || self.perturb_inc_fact <= 1.0 {
            return Err(SolverError::invalid_option(
                "perturb_inc_fact",
                self.perturb_inc_fact.min(self.perturb_inc_fact_first),
                "increase factors must be greater than 1",
            ));
        }
        open_unit("perturb_dec_fact", self.perturb_dec_fact)?;
        positive("jacobian_regularization_value", self.jacobian_regularization_value)?;
        non_negative("jacobian_regularization_exponent", self.jacobian_regularization_exponent)?;
        if self.max_perturbation_trials == 0 {
            return Err(SolverError::invalid_option(
                "max_perturbation_trials",
                self.max_perturbation_trials,
                "must be at least 1",
            ));
        }

        positive("resto_penalty_parameter", self.resto_penalty_parameter)?;
        non_negative("resto_proximity_weight", self.resto_proximity_weight)?;
        open_unit("required_infeasibility_reduction", self.required_infeasibility_reduction)?;
        positive("bound_mult_reset_threshold", self.bound_mult_reset_threshold)?;

        positive("bound_push", self.bound_push)?;
        if !(self.bound_frac > 0.0 && self.bound_frac <= 0.5) {
            return Err(SolverError::invalid_option("bound_frac", self.bound_frac, "must lie in (0, 0.5]"));
        }
        positive("bound_mult_init_val", self.bound_mult_init_val)?;
        non_negative("bound_relax_factor", self.bound_relax_factor)?;
        if self.nlp_lower_bound_inf >= self.nlp_upper_bound_inf {
            return Err(SolverError::invalid_option(
                "nlp_lower_bound_inf",
                self.nlp_lower_bound_inf,
                "must be smaller than nlp_upper_bound_inf",
            ));
        }

        Ok(())
    }
}
