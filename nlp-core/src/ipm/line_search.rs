//! Filter line search with second-order corrections.
//!
//! A trial point is accepted either as an f-type step (switching condition
//! and Armijo decrease of the barrier objective, near feasibility) or as a
//! filter step (sufficient decrease of θ or φ and not dominated by the
//! filter). Filter steps augment the filter with the current pair.
//!
//! The search is a finite state machine: `Searching` ends in `Accepted` or
//! `Exhausted`, the latter once the step size drops below `alpha_min` or
//! the trial budget is spent.

use super::direction::SearchDirectionSolver;
use super::filter::Filter;
use super::iterate::{Iterate, SearchDirection};
use super::nlp::{NlpAdapter, ProblemLayout};
use super::quantities::{barrier_value, primal_infeasibility, IterateQuantities};
use crate::error::SolverError;
use crate::settings::SolverSettings;
use crate::util::Norm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearchState {
    Searching,
    Accepted,
    Exhausted,
}

/// Acceptance rule that admitted a trial point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Switching condition and Armijo decrease; the filter is not augmented
    Armijo,
    /// Sufficient reduction of θ or φ; the filter is augmented
    Filter,
    /// Negligible step taken without a search
    TinyStep,
}

#[derive(Debug)]
pub struct AcceptedStep {
    pub quantities: IterateQuantities,
    pub alpha_primal: f64,
    pub alpha_dual: f64,
    pub trials: usize,
    pub acceptance: Acceptance,
    pub second_order_correction: bool,
}

#[derive(Debug)]
pub enum LineSearchOutcome {
    Accepted(Box<AcceptedStep>),
    Exhausted { trials: usize },
}

#[derive(Debug, Clone)]
struct LineSearchParams {
    theta_max_fact: f64,
    theta_min_fact: f64,
    eta_phi: f64,
    delta: f64,
    s_phi: f64,
    s_theta: f64,
    gamma_phi: f64,
    gamma_theta: f64,
    alpha_min_frac: f64,
    alpha_red_factor: f64,
    max_soc: usize,
    kappa_soc: f64,
    max_trials: usize,
    kappa_sigma: f64,
    kappa_d: f64,
    tiny_step_tol: f64,
}

/// Trial function values at a primal point.
struct Trial {
    x: Vec<f64>,
    s: Vec<f64>,
    f: f64,
    c: Vec<f64>,
    d: Vec<f64>,
    theta: f64,
    phi: f64,
}

pub struct FilterLineSearch {
    params: LineSearchParams,
    filter: Filter,
    state: LineSearchState,
    theta_max: Option<f64>,
    theta_min: f64,
}

impl FilterLineSearch {
    pub fn new(settings: &SolverSettings) -> Self {
        Self {
            params: LineSearchParams {
                theta_max_fact: settings.theta_max_fact,
                theta_min_fact: settings.theta_min_fact,
                eta_phi: settings.eta_phi,
                delta: settings.delta,
                s_phi: settings.s_phi,
                s_theta: settings.s_theta,
                gamma_phi: settings.gamma_phi,
                gamma_theta: settings.gamma_theta,
                alpha_min_frac: settings.alpha_min_frac,
                alpha_red_factor: settings.alpha_red_factor,
                max_soc: settings.max_soc,
                kappa_soc: settings.kappa_soc,
                max_trials: settings.max_line_search_trials,
                kappa_sigma: settings.kappa_sigma,
                kappa_d: settings.kappa_d,
                tiny_step_tol: settings.tiny_step_tol,
            },
            filter: Filter::new(),
            state: LineSearchState::Searching,
            theta_max: None,
            theta_min: 0.0,
        }
    }

    pub fn state(&self) -> LineSearchState {
        self.state
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Forget all filter entries (new barrier subproblem).
    pub fn reset_filter(&mut self) {
        self.filter.clear();
    }

    /// Restart after a successful restoration phase, measuring the
    /// infeasibility envelope against the restored point.
    pub fn reset_after_restoration(&mut self, theta: f64) {
        self.filter.clear();
        self.theta_max = Some(self.params.theta_max_fact * theta.max(1.0));
        self.theta_min = self.params.theta_min_fact * theta.max(1.0);
    }

    fn init_envelope(&mut self, theta: f64) -> f64 {
        match self.theta_max {
            Some(theta_max) => theta_max,
            None => {
                let theta_max = self.params.theta_max_fact * theta.max(1.0);
                self.theta_max = Some(theta_max);
                self.theta_min = self.params.theta_min_fact * theta.max(1.0);
                theta_max
            }
        }
    }

    /// The step size is large enough that the predicted objective decrease
    /// dominates the infeasibility.
    fn switching_condition(&self, alpha: f64, gbd: f64, theta: f64) -> bool {
        let p = &self.params;
        gbd < 0.0 && alpha * (-gbd).powf(p.s_phi) > p.delta * theta.powf(p.s_theta)
    }

    /// Smallest step size before the search gives up.
    fn alpha_min(&self, gbd: f64, theta: f64) -> f64 {
        let p = &self.params;
        let mut alpha = p.gamma_theta;
        if gbd < 0.0 {
            alpha = alpha.min(p.gamma_phi * theta / -gbd);
            if theta <= self.theta_min {
                alpha = alpha.min(p.delta * theta.powf(p.s_theta) / (-gbd).powf(p.s_phi));
            }
        }
        p.alpha_min_frac * alpha
    }

    fn check_acceptability(
        &self,
        theta: f64,
        phi: f64,
        trial_theta: f64,
        trial_phi: f64,
        alpha: f64,
        gbd: f64,
        theta_max: f64,
    ) -> Option<Acceptance> {
        let p = &self.params;
        if !trial_phi.is_finite() || !(trial_theta <= theta_max) {
            return None;
        }

        let acceptance = if self.switching_condition(alpha, gbd, theta) && theta <= self.theta_min {
            if trial_phi - phi <= p.eta_phi * alpha * gbd {
                Acceptance::Armijo
            } else {
                return None;
            }
        } else if trial_theta <= (1.0 - p.gamma_theta) * theta || trial_phi <= phi - p.gamma_phi * theta {
            Acceptance::Filter
        } else {
            return None;
        };

        if self.filter.is_acceptable(trial_theta, trial_phi) {
            Some(acceptance)
        } else {
            None
        }
    }

    fn is_tiny_step(&self, q: &IterateQuantities, dir: &SearchDirection) -> bool {
        if q.primal_infeasibility(Norm::Max) > 1e-4 {
            return false;
        }
        let it = q.iterate();
        let relative = |v: &[f64], dv: &[f64]| {
            v.iter()
                .zip(dv)
                .fold(0.0_f64, |acc, (vi, di)| acc.max(di.abs() / (1.0 + vi.abs())))
        };
        relative(&it.x, &dir.dx).max(relative(&it.s, &dir.ds)) < self.params.tiny_step_tol
    }

    fn evaluate_trial(
        &self,
        nlp: &mut NlpAdapter<'_>,
        layout: &ProblemLayout,
        x: Vec<f64>,
        s: Vec<f64>,
        mu: f64,
    ) -> Option<Trial> {
        let evaluated = nlp.eval_f(&x).and_then(|f| nlp.eval_c_d(&x).map(|(c, d)| (f, c, d)));
        match evaluated {
            Ok((f, c, d)) => {
                let theta = primal_infeasibility(&c, &d, &s, Norm::One);
                let phi = barrier_value(layout, f, &x, &s, mu, self.params.kappa_d);
                Some(Trial { x, s, f, c, d, theta, phi })
            }
            Err(e) => {
                log::trace!("trial point rejected: {}", e);
                None
            }
        }
    }

    /// Search along `dir` from `q` for an acceptable trial point.
    pub(crate) fn find_acceptable_point(
        &mut self,
        nlp: &mut NlpAdapter<'_>,
        q: &IterateQuantities,
        dir: &SearchDirection,
        mu: f64,
        tau: f64,
        solver: &mut SearchDirectionSolver,
    ) -> Result<LineSearchOutcome, SolverError> {
        self.state = LineSearchState::Searching;
        let layout = q.layout().clone();
        let it = q.iterate();

        let theta = q.theta();
        let phi = q.barrier_objective(mu, self.params.kappa_d);
        let gbd = q.barrier_directional_derivative(dir, mu, self.params.kappa_d);
        let theta_max = self.init_envelope(theta);

        let alpha_max = q.primal_fraction_to_boundary(dir, tau);
        let alpha_dual = it.dual_fraction_to_boundary(dir, tau);

        if self.is_tiny_step(q, dir) {
            let (x, s) = it.primal_trial(dir, alpha_max);
            if let Some(trial) = self.evaluate_trial(nlp, &layout, x, s, mu) {
                if let Some(step) = self.finish(nlp, q, dir, trial, alpha_max, alpha_dual, mu, 1, Acceptance::TinyStep, false) {
                    log::debug!("tiny step accepted without line search");
                    return Ok(LineSearchOutcome::Accepted(Box::new(step)));
                }
            }
        }

        let alpha_min = self.alpha_min(gbd, theta);
        let mut alpha = alpha_max;
        let mut trials = 0;

        while self.state == LineSearchState::Searching {
            if trials >= self.params.max_trials || (trials > 0 && alpha < alpha_min) {
                self.state = LineSearchState::Exhausted;
                break;
            }
            trials += 1;

            let (x, s) = it.primal_trial(dir, alpha);
            let Some(trial) = self.evaluate_trial(nlp, &layout, x, s, mu) else {
                alpha *= self.params.alpha_red_factor;
                continue;
            };

            if let Some(acceptance) = self.check_acceptability(theta, phi, trial.theta, trial.phi, alpha, gbd, theta_max) {
                if let Some(step) = self.finish(nlp, q, dir, trial, alpha, alpha_dual, mu, trials, acceptance, false) {
                    self.augment_filter(acceptance, theta, phi);
                    return Ok(LineSearchOutcome::Accepted(Box::new(step)));
                }
            } else if trials == 1 && self.params.max_soc > 0 && trial.theta >= theta {
                if let Some(step) = self.second_order_correction(nlp, q, trial, alpha, gbd, mu, tau, theta_max, solver)? {
                    self.augment_filter(step.acceptance, theta, phi);
                    return Ok(LineSearchOutcome::Accepted(Box::new(step)));
                }
            }

            alpha *= self.params.alpha_red_factor;
        }

        log::debug!(
            "line search exhausted after {} trials (alpha {:.2e} < alpha_min {:.2e})",
            trials,
            alpha,
            alpha_min
        );
        Ok(LineSearchOutcome::Exhausted { trials })
    }

    fn augment_filter(&mut self, acceptance: Acceptance, theta: f64, phi: f64) {
        if acceptance == Acceptance::Filter {
            let p = &self.params;
            self.filter.add((1.0 - p.gamma_theta) * theta, phi - p.gamma_phi * theta);
        }
    }

    /// Up to `max_soc` corrections of the first rejected trial, each solved
    /// with the existing factorization.
    fn second_order_correction(
        &mut self,
        nlp: &mut NlpAdapter<'_>,
        q: &IterateQuantities,
        first: Trial,
        alpha: f64,
        gbd: f64,
        mu: f64,
        tau: f64,
        theta_max: f64,
        solver: &mut SearchDirectionSolver,
    ) -> Result<Option<AcceptedStep>, SolverError> {
        let layout = q.layout().clone();
        let it = q.iterate();
        let theta = q.theta();
        let phi = q.barrier_objective(mu, self.params.kappa_d);

        let mut alpha_soc = alpha;
        let mut c_soc: Vec<f64> = q.c().iter().zip(&first.c).map(|(ck, ct)| alpha_soc * ck + ct).collect();
        let mut dms_soc: Vec<f64> = q
            .d()
            .iter()
            .zip(&it.s)
            .zip(first.d.iter().zip(&first.s))
            .map(|((dk, sk), (dt, st))| alpha_soc * (dk - sk) + (dt - st))
            .collect();
        let mut theta_soc_old = first.theta;

        for k in 0..self.params.max_soc {
            let Some(dir_soc) = solver.solve_soc(q, mu, &c_soc, &dms_soc)? else {
                break;
            };
            alpha_soc = q.primal_fraction_to_boundary(&dir_soc, tau);
            let (x, s) = it.primal_trial(&dir_soc, alpha_soc);
            let Some(trial) = self.evaluate_trial(nlp, &layout, x, s, mu) else {
                break;
            };

            if let Some(acceptance) = self.check_acceptability(theta, phi, trial.theta, trial.phi, alpha, gbd, theta_max) {
                let alpha_dual = it.dual_fraction_to_boundary(&dir_soc, tau);
                let trial_theta = trial.theta;
                if let Some(step) = self.finish(nlp, q, &dir_soc, trial, alpha_soc, alpha_dual, mu, 1, acceptance, true) {
                    log::trace!("second-order correction {} accepted (theta {:.2e})", k + 1, trial_theta);
                    return Ok(Some(step));
                }
                break;
            }

            if trial.theta > self.params.kappa_soc * theta_soc_old {
                break;
            }
            theta_soc_old = trial.theta;
            for (cs, ct) in c_soc.iter_mut().zip(&trial.c) {
                *cs = alpha_soc * *cs + ct;
            }
            for ((ds, dt), st) in dms_soc.iter_mut().zip(&trial.d).zip(&trial.s) {
                *ds = alpha_soc * *ds + (dt - st);
            }
        }
        Ok(None)
    }

    /// Build the accepted iterate; `None` if its derivatives cannot be
    /// evaluated, in which case the trial counts as rejected.
    fn finish(
        &mut self,
        nlp: &mut NlpAdapter<'_>,
        q: &IterateQuantities,
        dir: &SearchDirection,
        trial: Trial,
        alpha_primal: f64,
        alpha_dual: f64,
        mu: f64,
        trials: usize,
        acceptance: Acceptance,
        second_order_correction: bool,
    ) -> Option<AcceptedStep> {
        let layout = q.layout().clone();
        let mut iterate = q.iterate().accept(trial.x, trial.s, dir, alpha_primal, alpha_dual);
        correct_bound_multipliers(&mut iterate, &layout, mu, self.params.kappa_sigma);

        match IterateQuantities::from_trial(nlp, iterate, trial.f, trial.c, trial.d) {
            Ok(quantities) => {
                self.state = LineSearchState::Accepted;
                Some(AcceptedStep {
                    quantities,
                    alpha_primal,
                    alpha_dual,
                    trials,
                    acceptance,
                    second_order_correction,
                })
            }
            Err(e) => {
                log::trace!("derivatives failed at trial point: {}", e);
                None
            }
        }
    }
}

/// Keep every bound multiplier within `[μ/(κσ·slack), κσ·μ/slack]`.
pub fn correct_bound_multipliers(iterate: &mut Iterate, layout: &ProblemLayout, mu: f64, kappa_sigma: f64) {
    let clamp = |z: &mut f64, slack: f64| {
        let lo = mu / (kappa_sigma * slack);
        let hi = kappa_sigma * mu / slack;
        *z = z.max(lo).min(hi);
    };
    for (z, &j) in iterate.z_l.iter_mut().zip(&layout.x_lower) {
        clamp(z, iterate.x[j] - layout.x_l[j]);
    }
    for (z, &j) in iterate.z_u.iter_mut().zip(&layout.x_upper) {
        clamp(z, layout.x_u[j] - iterate.x[j]);
    }
    for (v, &i) in iterate.v_l.iter_mut().zip(&layout.d_lower) {
        clamp(v, iterate.s[i] - layout.d_l[i]);
    }
    for (v, &i) in iterate.v_u.iter_mut().zip(&layout.d_upper) {
        clamp(v, layout.d_u[i] - iterate.s[i]);
    }
}
