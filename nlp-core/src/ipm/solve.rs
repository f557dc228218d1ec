//! Outer iteration driver.
//!
//! Per iteration: convergence check, barrier update, Newton direction, filter
//! line search. When no direction or no acceptable step exists the driver
//! falls back to the feasibility restoration phase, which is itself an
//! instance of this driver on a reformulated problem.

use std::time::Instant;

use super::barrier::BarrierUpdater;
use super::convergence::{ConvergenceCheck, ConvergenceState, IterationCallback};
use super::diagnostics::DiagnosticsConfig;
use super::direction::{DirectionOutcome, SearchDirectionSolver};
use super::init::IterateInitializer;
use super::line_search::{Acceptance, FilterLineSearch, LineSearchOutcome};
use super::nlp::NlpAdapter;
use super::quantities::{IterateQuantities, IterationInfo};
use super::restoration::{restore, RestorationOutcome};
use crate::error::SolverResult;
use crate::problem::{AlgorithmMode, ConvergenceStatus, IterationSummary};
use crate::settings::SolverSettings;
use crate::util::Norm;

/// Final state of one run of the driver.
#[derive(Debug)]
pub(crate) struct AlgorithmOutput {
    pub status: ConvergenceStatus,
    /// Last accepted iterate
    pub quantities: IterateQuantities,
    /// Iterations performed, restoration iterations included
    pub iters: usize,
    pub mu: f64,
    pub info: IterationInfo,
    pub restoration_calls: usize,
    pub soc_steps: usize,
}


pub(crate) struct Algorithm<'s> {
    settings: &'s SolverSettings,
    mode: AlgorithmMode,
    allow_restoration: bool,
    keep_interior_start: bool,
    report_start: bool,
    iter_offset: usize,
}

impl<'s> Algorithm<'s> {
    pub fn new(settings: &'s SolverSettings, mode: AlgorithmMode) -> Self {
        Self {
            settings,
            mode,
            allow_restoration: true,
            keep_interior_start: false,
            report_start: true,
            iter_offset: 0,
        }
    }

    /// A failed step ends the run with `RestorationFailure`.
    pub fn without_restoration(mut self) -> Self {
        self.allow_restoration = false;
        self
    }

    pub fn keep_interior_start(mut self) -> Self {
        self.keep_interior_start = true;
        self
    }

    /// The starting point was already reported by an enclosing run.
    pub fn without_start_report(mut self) -> Self {
        self.report_start = false;
        self
    }

    /// Iterations already spent by an enclosing run.
    pub fn with_iter_offset(mut self, offset: usize) -> Self {
        self.iter_offset = offset;
        self
    }

    pub fn optimize(
        &self,
        nlp: &mut NlpAdapter<'_>,
        check: &mut dyn ConvergenceCheck,
        callback: &mut IterationCallback<'_>,
    ) -> SolverResult<AlgorithmOutput> {
        let settings = self.settings;
        let start = Instant::now();
        let diag = DiagnosticsConfig::from_env();

        let mut q = IterateInitializer::new(settings)
            .keep_interior(self.keep_interior_start)
            .initialize(nlp)?;
        let mut solver = SearchDirectionSolver::new(nlp, settings)?;
        let mut barrier = BarrierUpdater::new(settings, &q);
        let mut line_search = FilterLineSearch::new(settings);
        let mut info = IterationInfo::default();
        let mut iter = 0;
        let mut restoration_calls = 0;
        let mut soc_steps = 0;

        if self.mode == AlgorithmMode::Regular {
            let layout = q.layout();
            log::debug!(
                "problem: {} variables ({} bounds), {} equality and {} inequality constraints",
                layout.n,
                layout.x_lower.len() + layout.x_upper.len(),
                layout.n_c(),
                layout.n_d()
            );
            self.log_header();
        }

        let status = loop {
            let state = ConvergenceState {
                iter,
                iter_offset: self.iter_offset,
                quantities: &q,
                mu: barrier.mu(),
                info: &info,
                elapsed: start.elapsed(),
                mode: self.mode,
            };
            let summary = state.summary();
            let report = iter > 0 || self.report_start;
            let status = if report {
                let mut notify = |s: &IterationSummary| nlp.intermediate_callback(s) && callback(s);
                check.check_convergence(&state, &mut notify)
            } else {
                check.check_convergence(&state, &mut |_: &IterationSummary| true)
            };
            if report {
                self.log_iteration(&summary);
            }
            if diag.should_log(iter) {
                self.log_diagnostics(&q, barrier.mu(), &line_search, &diag);
            }
            if status.is_terminal() {
                break status;
            }

            let update = barrier.update(&q, info.tiny_step);
            if update.changed {
                line_search.reset_filter();
            }
            // A tiny step is only followed up by a smaller μ.
            if info.tiny_step && !update.changed {
                log::debug!("tiny step with mu {:.2e} at its lower limit", update.mu);
                break ConvergenceStatus::StopAtTinyStep;
            }
            let mu = update.mu;

            let step = if iter == 0 && settings.start_with_resto && self.allow_restoration {
                None
            } else {
                let it = q.iterate();
                match nlp.eval_hessian(&it.x, 1.0, &it.y_c, &it.y_d) {
                    Ok(hess) => match solver.compute(&q, &hess, mu)? {
                        DirectionOutcome::Computed(dir) => {
                            info.d_norm = Some(dir.primal_norm_max());
                            info.regularization = solver.regularization().delta_w;
                            match line_search.find_acceptable_point(nlp, &q, &dir, mu, update.tau, &mut solver)? {
                                LineSearchOutcome::Accepted(step) => Some(step),
                                LineSearchOutcome::Exhausted { trials } => {
                                    log::debug!("line search exhausted after {} trials", trials);
                                    info.ls_trials = trials;
                                    None
                                }
                            }
                        }
                        DirectionOutcome::Fatal => {
                            log::debug!("no usable factorization of the KKT system");
                            None
                        }
                    },
                    Err(e) => {
                        log::debug!("hessian evaluation failed: {}", e);
                        None
                    }
                }
            };

            if let Some(step) = step {
                info.alpha_primal = step.alpha_primal;
                info.alpha_dual = step.alpha_dual;
                info.ls_trials = step.trials;
                info.tiny_step = step.acceptance == Acceptance::TinyStep;
                if step.second_order_correction {
                    soc_steps += 1;
                }
                q = step.quantities;
                iter += 1;
                continue;
            }

            if !self.allow_restoration {
                break ConvergenceStatus::RestorationFailure;
            }
            log::warn!(
                "iteration {}: entering restoration phase (theta {:.2e})",
                iter + self.iter_offset,
                q.theta()
            );
            restoration_calls += 1;
            line_search.reset_filter();
            let outcome = restore(
                nlp,
                &q,
                mu,
                settings,
                iter + self.iter_offset,
                start.elapsed(),
                callback,
            )?;
            // The restored point gets the index after the last restoration iteration.
            match outcome {
                RestorationOutcome::Restored { quantities, iterations } => {
                    q = quantities;
                    iter += iterations + 1;
                    line_search.reset_after_restoration(q.theta());
                    barrier.notify_restoration();
                    info.alpha_primal = 1.0;
                    info.alpha_dual = 1.0;
                    info.ls_trials = 0;
                    info.tiny_step = false;
                }
                RestorationOutcome::Failed { iterations } => {
                    iter += iterations + 1;
                    break ConvergenceStatus::RestorationFailure;
                }
                RestorationOutcome::Stopped { status, iterations } => {
                    iter += iterations + 1;
                    break status;
                }
            }
        };

        if self.mode == AlgorithmMode::Regular {
            self.log_footer(status, iter, &q, start);
        }

        Ok(AlgorithmOutput {
            status,
            quantities: q,
            iters: iter,
            mu: barrier.mu(),
            info,
            restoration_calls,
            soc_steps,
        })
    }

    fn log_level(&self) -> log::Level {
        if self.settings.verbose {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }

    fn log_header(&self) {
        log::log!(
            self.log_level(),
            "{:>5} {:>14} {:>9} {:>9} {:>6} {:>9} {:>6} {:>9} {:>9} {:>3}",
            "iter",
            "objective",
            "inf_pr",
            "inf_du",
            "lg(mu)",
            "||d||",
            "lg(rg)",
            "alpha_du",
            "alpha_pr",
            "ls"
        );
    }

    fn log_iteration(&self, s: &IterationSummary) {
        let marker = match s.mode {
            AlgorithmMode::Regular => ' ',
            AlgorithmMode::RestorationPhase => 'r',
        };
        let reg = if s.regularization_size > 0.0 {
            format!("{:6.1}", s.regularization_size.log10())
        } else {
            "     -".to_string()
        };
        log::log!(
            self.log_level(),
            "{:>4}{} {:>14.7e} {:>9.2e} {:>9.2e} {:>6.1} {:>9.2e} {} {:>9.2e} {:>9.2e} {:>3}",
            s.iter,
            marker,
            s.obj_value,
            s.inf_pr,
            s.inf_du,
            s.mu.log10(),
            s.d_norm,
            reg,
            s.alpha_du,
            s.alpha_pr,
            s.ls_trials
        );
    }

    fn log_diagnostics(&self, q: &IterateQuantities, mu: f64, line_search: &FilterLineSearch, diag: &DiagnosticsConfig) {
        log::debug!(
            "  compl {:.3e} avg {:.3e} centrality {:.3e} max|x| {:.3e}",
            q.complementarity(0.0, Norm::Max),
            q.average_complementarity(),
            q.centrality(),
            q.max_abs_x()
        );
        if diag.filter {
            log::debug!(
                "  barrier error {:.3e} nlp error {:.3e} filter size {} ({:?})",
                q.barrier_error(mu),
                q.nlp_error(self.settings.mu_target),
                line_search.filter().len(),
                line_search.state()
            );
        }
    }

    fn log_footer(&self, status: ConvergenceStatus, iters: usize, q: &IterateQuantities, start: Instant) {
        log::log!(
            self.log_level(),
            "{} after {} iterations in {:.3}s: objective {:.10e}, constraint violation {:.2e}, dual infeasibility {:.2e}",
            status,
            iters,
            start.elapsed().as_secs_f64(),
            q.f(),
            q.constraint_violation(Norm::Max),
            q.dual_infeasibility(Norm::Max)
        );
    }
}
