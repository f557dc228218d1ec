//! Primal-dual interior point method with a filter line search.
//!
//! Inequality rows get slack variables, so each iteration solves the barrier
//! problem
//!
//! ```text
//! minimize    f(x) - μ Σ ln(bound slacks)
//! subject to  c(x) = 0,   d(x) - s = 0
//! ```
//!
//! by one Newton step on its primal-dual optimality conditions, globalized by
//! a filter line search and a feasibility restoration phase.

pub mod barrier;
pub mod convergence;
pub mod diagnostics;
pub mod direction;
pub mod filter;
pub mod init;
pub mod iterate;
pub mod line_search;
pub mod nlp;
pub mod quantities;
pub mod regularization;
pub mod restoration;
pub mod solve;

use std::time::Instant;

use crate::error::SolverResult;
use crate::problem::{AlgorithmMode, NlpProblem, SolveInfo, SolveResult};
use crate::settings::SolverSettings;
use crate::util::Norm;
use convergence::{IterationCallback, OptimalityErrorCheck};
use nlp::NlpAdapter;
use solve::Algorithm;

/// Run the interior point method on `problem`.
///
/// Settings must already be validated.
pub(crate) fn solve_nlp(
    problem: &mut dyn NlpProblem,
    settings: &SolverSettings,
    callback: &mut IterationCallback<'_>,
) -> SolverResult<SolveResult> {
    let start = Instant::now();
    let mut nlp = NlpAdapter::new(problem, settings)?;
    let mut check = OptimalityErrorCheck::new(settings);
    let output = Algorithm::new(settings, AlgorithmMode::Regular).optimize(&mut nlp, &mut check, callback)?;

    let q = &output.quantities;
    let layout = q.layout();
    let it = q.iterate();

    let mut z_l = vec![0.0; layout.n];
    for (&j, &z) in layout.x_lower.iter().zip(&it.z_l) {
        z_l[j] = z;
    }
    let mut z_u = vec![0.0; layout.n];
    for (&j, &z) in layout.x_upper.iter().zip(&it.z_u) {
        z_u[j] = z;
    }

    let info = SolveInfo {
        iters: output.iters,
        solve_time_ms: start.elapsed().as_millis() as u64,
        evals: nlp.counts(),
        dual_inf: q.dual_infeasibility(Norm::Max),
        constr_viol: q.constraint_violation(Norm::Max),
        compl: q.complementarity(settings.mu_target, Norm::Max),
        nlp_error: q.nlp_error(settings.mu_target),
        mu: output.mu,
        last_regularization: output.info.regularization,
        restoration_calls: output.restoration_calls,
        soc_steps: output.soc_steps,
    };

    Ok(SolveResult {
        status: output.status,
        x: it.x.clone(),
        lambda: layout.lambda(&it.y_c, &it.y_d),
        z_l,
        z_u,
        obj_val: q.f(),
        g: q.g(),
        info,
    })
}
