//! Feasibility restoration phase.
//!
//! When no acceptable step can be found, the method solves
//!
//! ```text
//! minimize    ρ Σ (p + n) + (ζ √μ / 2) ‖D_R (x - x_R)‖²
//! subject to  g_L <= g(x) - p + n <= g_U,   x_L <= x <= x_U,   p, n >= 0
//! ```
//!
//! with the same interior-point algorithm (monotone μ, no nested
//! restoration). The subproblem ends successfully once the infeasibility of
//! the original constraints has dropped to a fraction of the value at entry.
//! A subproblem that converges without that reduction has found a point of
//! local infeasibility.

use std::rc::Rc;
use std::time::Duration;

use super::convergence::{ConvergenceCheck, ConvergenceState, IterationCallback, OptimalityErrorCheck};
use super::iterate::Iterate;
use super::nlp::{NlpAdapter, ProblemLayout};
use super::quantities::IterateQuantities;
use super::solve::Algorithm;
use crate::error::{SolverError, SolverResult};
use crate::problem::{AlgorithmMode, ConvergenceStatus, EvalResult, IterationSummary, NlpProblem};
use crate::settings::{MuStrategy, SolverSettings};
use crate::util::{norm, Norm};

/// Initial relaxation `(p, n)` of a constraint residual `r`, minimizing the
/// restoration barrier problem for fixed x.
pub fn initial_relaxation(r: f64, rho: f64, mu: f64) -> (f64, f64) {
    let a = (mu - rho * r) / (2.0 * rho);
    let n = a + (a * a + mu * r / (2.0 * rho)).sqrt();
    (r + n, n)
}

/// The restoration subproblem, built on top of the outer problem.
///
/// Variables are ordered `[x (n); p (m); n (m)]`.
pub(crate) struct RestorationNlp<'a, 'p> {
    outer: &'a mut NlpAdapter<'p>,
    layout: Rc<ProblemLayout>,
    x_ref: Vec<f64>,
    scaling: Vec<f64>,
    rho: f64,
    eta: f64,
    mu: f64,
    p0: Vec<f64>,
    n0: Vec<f64>,
    z_l_ref: Vec<f64>,
    z_u_ref: Vec<f64>,
    outer_jac_nnz: usize,
    outer_hess_nnz: usize,
}

impl<'a, 'p> RestorationNlp<'a, 'p> {
    pub fn new(outer: &'a mut NlpAdapter<'p>, q: &IterateQuantities, mu: f64, settings: &SolverSettings) -> Self {
        let layout = q.layout().clone();
        let it = q.iterate();
        let rho = settings.resto_penalty_parameter;

        let g = q.g();
        let mut p0 = vec![0.0; layout.m];
        let mut n0 = vec![0.0; layout.m];
        for (k, &row) in layout.eq_rows.iter().enumerate() {
            (p0[row], n0[row]) = initial_relaxation(q.c()[k], rho, mu);
        }
        for (k, &row) in layout.ineq_rows.iter().enumerate() {
            let r = g[row] - g[row].clamp(layout.d_l[k], layout.d_u[k]);
            (p0[row], n0[row]) = initial_relaxation(r, rho, mu);
        }

        let mut z_l_ref = vec![0.0; layout.n];
        for (&j, &z) in layout.x_lower.iter().zip(&it.z_l) {
            z_l_ref[j] = z.min(rho);
        }
        let mut z_u_ref = vec![0.0; layout.n];
        for (&j, &z) in layout.x_upper.iter().zip(&it.z_u) {
            z_u_ref[j] = z.min(rho);
        }

        let scaling = it.x.iter().map(|xr| 1.0_f64.min(1.0 / xr.abs())).collect();
        let outer_jac_nnz = outer.jacobian_structure().len();
        let outer_hess_nnz = outer.hessian_structure().len();

        Self {
            outer,
            x_ref: it.x.clone(),
            scaling,
            rho,
            eta: settings.resto_proximity_weight * mu.sqrt(),
            mu,
            p0,
            n0,
            z_l_ref,
            z_u_ref,
            outer_jac_nnz,
            outer_hess_nnz,
            layout,
        }
    }
}

impl NlpProblem for RestorationNlp<'_, '_> {
    fn num_variables(&self) -> usize {
        self.layout.n + 2 * self.layout.m
    }

    fn num_constraints(&self) -> usize {
        self.layout.m
    }

    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        let n = self.layout.n;
        x_l[..n].copy_from_slice(&self.layout.x_l);
        x_u[..n].copy_from_slice(&self.layout.x_u);
        x_l[n..].fill(0.0);
        x_u[n..].fill(f64::INFINITY);
    }

    fn constraint_bounds(&self, g_l: &mut [f64], g_u: &mut [f64]) {
        let layout = &self.layout;
        for (k, &row) in layout.eq_rows.iter().enumerate() {
            g_l[row] = layout.c_rhs[k];
            g_u[row] = layout.c_rhs[k];
        }
        for (k, &row) in layout.ineq_rows.iter().enumerate() {
            g_l[row] = layout.d_l[k];
            g_u[row] = layout.d_u[k];
        }
    }

    fn initial_point(&self, x: &mut [f64]) {
        let (n, m) = (self.layout.n, self.layout.m);
        x[..n].copy_from_slice(&self.x_ref);
        x[n..n + m].copy_from_slice(&self.p0);
        x[n + m..].copy_from_slice(&self.n0);
    }

    fn initial_multipliers(&self) -> Option<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let mut z_l = self.z_l_ref.clone();
        z_l.extend(self.p0.iter().map(|p| self.mu / p));
        z_l.extend(self.n0.iter().map(|n| self.mu / n));
        let mut z_u = self.z_u_ref.clone();
        z_u.resize(self.num_variables(), 0.0);
        Some((vec![0.0; self.layout.m], z_l, z_u))
    }

    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        let n = self.layout.n;
        let relaxation: f64 = x[n..].iter().sum();
        let proximity: f64 = x[..n]
            .iter()
            .zip(&self.x_ref)
            .zip(&self.scaling)
            .map(|((xi, xr), dr)| (dr * (xi - xr)).powi(2))
            .sum();
        Ok(self.rho * relaxation + 0.5 * self.eta * proximity)
    }

    fn objective_grad(&mut self, x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        let n = self.layout.n;
        for j in 0..n {
            grad[j] = self.eta * self.scaling[j] * self.scaling[j] * (x[j] - self.x_ref[j]);
        }
        grad[n..].fill(self.rho);
        Ok(())
    }

    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> EvalResult<()> {
        let (n, m) = (self.layout.n, self.layout.m);
        self.outer.eval_g(&x[..n], g)?;
        for i in 0..m {
            g[i] += x[n + m + i] - x[n + i];
        }
        Ok(())
    }

    fn jacobian_structure(&self) -> Vec<(usize, usize)> {
        let (n, m) = (self.layout.n, self.layout.m);
        let mut structure = self.outer.jacobian_structure().to_vec();
        structure.extend((0..m).map(|i| (i, n + i)));
        structure.extend((0..m).map(|i| (i, n + m + i)));
        structure
    }

    fn jacobian_values(&mut self, x: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        let (n, m) = (self.layout.n, self.layout.m);
        let k = self.outer_jac_nnz;
        self.outer.eval_jac_values(&x[..n], &mut vals[..k])?;
        vals[k..k + m].fill(-1.0);
        vals[k + m..].fill(1.0);
        Ok(())
    }

    fn hessian_structure(&self) -> Vec<(usize, usize)> {
        let mut structure = self.outer.hessian_structure().to_vec();
        structure.extend((0..self.layout.n).map(|j| (j, j)));
        structure
    }

    fn hessian_values(&mut self, x: &[f64], obj_factor: f64, lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        let n = self.layout.n;
        let k = self.outer_hess_nnz;
        self.outer.eval_hess_values(&x[..n], 0.0, lambda, &mut vals[..k])?;
        for j in 0..n {
            vals[k + j] = obj_factor * self.eta * self.scaling[j] * self.scaling[j];
        }
        Ok(())
    }

    fn intermediate_callback(&mut self, summary: &IterationSummary) -> bool {
        self.outer.intermediate_callback(summary)
    }
}

/// Infeasibility of the original constraints at a restoration iterate,
/// `‖[c(x); d(x) - s]‖₁` with `g(x) = g_R + p - n`.
pub fn original_infeasibility(q: &IterateQuantities, n: usize, m: usize) -> f64 {
    let layout = q.layout();
    let x = &q.iterate().x;
    let relax = |row: usize| x[n + row] - x[n + m + row];
    let mut theta = 0.0;
    for (k, &row) in layout.eq_rows.iter().enumerate() {
        theta += (q.c()[k] + relax(row)).abs();
    }
    for (k, &row) in layout.ineq_rows.iter().enumerate() {
        theta += (q.d()[k] + relax(row) - q.iterate().s[k]).abs();
    }
    theta
}

/// Success when the original infeasibility is reduced enough; a converged
/// subproblem short of that is a locally infeasible point.
pub struct RestorationConvergenceCheck {
    inner: OptimalityErrorCheck,
    n: usize,
    m: usize,
    target: f64,
    reached: bool,
}

impl RestorationConvergenceCheck {
    pub fn new(settings: &SolverSettings, n: usize, m: usize, target: f64) -> Self {
        Self {
            inner: OptimalityErrorCheck::new(settings),
            n,
            m,
            target,
            reached: false,
        }
    }

    pub fn reached(&self) -> bool {
        self.reached
    }
}

impl ConvergenceCheck for RestorationConvergenceCheck {
    fn check_convergence(&mut self, state: &ConvergenceState<'_>, callback: &mut IterationCallback<'_>) -> ConvergenceStatus {
        let status = self.inner.check_convergence(state, callback);
        if status == ConvergenceStatus::UserStop {
            return status;
        }
        let theta = original_infeasibility(state.quantities, self.n, self.m);
        if state.iter > 0 && theta <= self.target {
            self.reached = true;
            return ConvergenceStatus::Converged;
        }
        if status.is_success() {
            log::warn!(
                "restoration phase converged to a point of local infeasibility (theta {:.2e})",
                theta
            );
            return ConvergenceStatus::RestorationFailure;
        }
        status
    }
}

pub(crate) enum RestorationOutcome {
    Restored { quantities: IterateQuantities, iterations: usize },
    Failed { iterations: usize },
    Stopped { status: ConvergenceStatus, iterations: usize },
}

/// Slacks at the restored point: `d(x)` where it lies strictly inside the
/// inequality bounds, otherwise the (interior) slack of the subproblem.
pub fn restored_slacks(layout: &ProblemLayout, d: &[f64], resto_s: &[f64]) -> Vec<f64> {
    d.iter()
        .zip(resto_s)
        .zip(layout.d_l.iter().zip(&layout.d_u))
        .map(|((&dk, &sk), (&lo, &hi))| if lo < dk && dk < hi { dk } else { sk })
        .collect()
}

/// Run the restoration phase from `q` and map its result back.
pub(crate) fn restore(
    nlp: &mut NlpAdapter<'_>,
    q: &IterateQuantities,
    mu: f64,
    settings: &SolverSettings,
    iter_offset: usize,
    elapsed: Duration,
    callback: &mut IterationCallback<'_>,
) -> SolverResult<RestorationOutcome> {
    let layout = q.layout().clone();
    let (n, m) = (layout.n, layout.m);
    let theta_entry = q.theta();
    let target = settings.required_infeasibility_reduction * theta_entry;

    // The iteration that entered restoration counts against the outer limit.
    let remaining_time = settings.max_cpu_time - elapsed.as_secs_f64();
    let remaining_iter = settings.max_iter.saturating_sub(iter_offset + 1);
    if remaining_time <= 0.0 {
        return Ok(RestorationOutcome::Stopped {
            status: ConvergenceStatus::CpuTimeExceeded,
            iterations: 0,
        });
    }
    if remaining_iter == 0 {
        return Ok(RestorationOutcome::Stopped {
            status: ConvergenceStatus::MaxIterExceeded,
            iterations: 0,
        });
    }
    let outer_iter_limit = remaining_iter <= settings.resto_max_iter;

    let resto_settings = SolverSettings {
        mu_strategy: MuStrategy::Monotone,
        mu_init: mu.max(q.primal_infeasibility(Norm::Max)),
        bound_relax_factor: 0.0,
        max_iter: settings.resto_max_iter.min(remaining_iter),
        max_cpu_time: remaining_time,
        start_with_resto: false,
        ..settings.clone()
    };

    let (output, reached) = {
        let mut resto_nlp = RestorationNlp::new(nlp, q, mu, settings);
        let mut inner = NlpAdapter::new(&mut resto_nlp, &resto_settings)?;
        let mut check = RestorationConvergenceCheck::new(&resto_settings, n, m, target);
        let result = Algorithm::new(&resto_settings, AlgorithmMode::RestorationPhase)
            .without_restoration()
            .keep_interior_start()
            .without_start_report()
            .with_iter_offset(iter_offset)
            .optimize(&mut inner, &mut check, callback);
        match result {
            Ok(output) => (output, check.reached()),
            Err(SolverError::InitialEvaluation(e)) => {
                log::warn!("restoration phase could not start: {}", e);
                return Ok(RestorationOutcome::Failed { iterations: 0 });
            }
            Err(e) => return Err(e),
        }
    };
    let iterations = output.iters;

    match output.status {
        ConvergenceStatus::Converged if reached => {}
        status @ (ConvergenceStatus::UserStop | ConvergenceStatus::CpuTimeExceeded) => {
            return Ok(RestorationOutcome::Stopped { status, iterations })
        }
        ConvergenceStatus::MaxIterExceeded if outer_iter_limit => {
            return Ok(RestorationOutcome::Stopped {
                status: ConvergenceStatus::MaxIterExceeded,
                iterations,
            })
        }
        status => {
            log::warn!("restoration phase failed: {}", status);
            return Ok(RestorationOutcome::Failed { iterations });
        }
    }

    let inner_it = output.quantities.iterate();
    let x = inner_it.x[..n].to_vec();
    let d = match nlp.eval_c_d(&x) {
        Ok((_, d)) => d,
        Err(e) => {
            log::warn!("evaluation at the restored point failed: {}", e);
            return Ok(RestorationOutcome::Failed { iterations });
        }
    };
    let mut iterate = Iterate {
        s: restored_slacks(&layout, &d, &inner_it.s),
        x,
        y_c: vec![0.0; layout.n_c()],
        y_d: vec![0.0; layout.n_d()],
        z_l: inner_it.z_l[..layout.x_lower.len()].to_vec(),
        z_u: inner_it.z_u[..layout.x_upper.len()].to_vec(),
        v_l: inner_it.v_l.clone(),
        v_u: inner_it.v_u.clone(),
    };
    let max_mult = [&iterate.z_l, &iterate.z_u, &iterate.v_l, &iterate.v_u]
        .iter()
        .map(|v| norm(v, Norm::Max))
        .fold(0.0_f64, f64::max);
    if max_mult > settings.bound_mult_reset_threshold {
        for v in [&mut iterate.z_l, &mut iterate.z_u, &mut iterate.v_l, &mut iterate.v_u] {
            v.fill(1.0);
        }
    }

    let quantities = match IterateQuantities::evaluate(nlp, iterate) {
        Ok(quantities) => quantities,
        Err(e) => {
            log::warn!("evaluation at the restored point failed: {}", e);
            return Ok(RestorationOutcome::Failed { iterations });
        }
    };
    if !(quantities.theta() < theta_entry) {
        log::warn!(
            "restored point does not reduce the infeasibility ({:.2e} >= {:.2e})",
            quantities.theta(),
            theta_entry
        );
        return Ok(RestorationOutcome::Failed { iterations });
    }

    log::debug!(
        "restoration phase succeeded after {} iterations: theta {:.2e} -> {:.2e}",
        iterations,
        theta_entry,
        quantities.theta()
    );
    Ok(RestorationOutcome::Restored { quantities, iterations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipm::init::IterateInitializer;
    use crate::ipm::nlp::tests::SmallProblem;

    #[test]
    fn test_initial_relaxation_is_positive_and_consistent() {
        for &r in &[-3.0, -1e-6, 0.0, 1e-6, 2.5] {
            let (p, n) = initial_relaxation(r, 1000.0, 0.1);
            assert!(p > 0.0 && n > 0.0, "r = {}: p = {}, n = {}", r, p, n);
            assert!((p - n - r).abs() < 1e-12);
        }
        // Without residual both relaxations sit at the barrier minimizer μ/ρ
        let (p, n) = initial_relaxation(0.0, 1000.0, 0.1);
        assert!((p - 1e-4).abs() < 1e-15 && (n - 1e-4).abs() < 1e-15);
    }

    #[test]
    fn test_restored_slacks_follow_constraint_values() {
        let mut problem = SmallProblem;
        let settings = SolverSettings::default();
        let nlp = NlpAdapter::new(&mut problem, &settings).unwrap();
        let layout = nlp.layout();
        // The single inequality row is 0 <= x0 x1 <= 4
        assert_eq!(layout.n_d(), 1);
        assert_eq!(restored_slacks(layout, &[2.5], &[1e-3]), vec![2.5]);
        // Outside or on a bound the subproblem's slack is kept
        assert_eq!(restored_slacks(layout, &[5.0], &[3.9]), vec![3.9]);
        assert_eq!(restored_slacks(layout, &[layout.d_l[0]], &[1e-3]), vec![1e-3]);
    }

    #[test]
    fn test_restoration_problem_reproduces_original_constraints() {
        let mut problem = SmallProblem;
        let settings = SolverSettings::default();
        let mut nlp = NlpAdapter::new(&mut problem, &settings).unwrap();
        let q = IterateInitializer::new(&settings).initialize(&mut nlp).unwrap();
        let g_outer = q.g();

        let mut resto = RestorationNlp::new(&mut nlp, &q, 0.1, &settings);
        assert_eq!(resto.num_variables(), 6);
        let mut x0 = vec![0.0; 6];
        resto.initial_point(&mut x0);

        // g(x) - p + n at the start equals the projection of g onto its bounds
        let mut g = vec![0.0; 2];
        resto.constraints(&x0, &mut g).unwrap();
        for i in 0..2 {
            let shift = x0[2 + i] - x0[4 + i];
            assert!((g[i] + shift - g_outer[i]).abs() < 1e-12);
        }

        let structure = resto.jacobian_structure();
        let mut vals = vec![0.0; structure.len()];
        resto.jacobian_values(&x0, &mut vals).unwrap();
        assert_eq!(structure.len(), 4 + 4);
        assert_eq!(&vals[4..6], &[-1.0, -1.0]);
        assert_eq!(&vals[6..], &[1.0, 1.0]);

        // ρ Σ(p + n) at x_R
        let f = resto.objective(&x0).unwrap();
        let expected: f64 = 1000.0 * x0[2..].iter().sum::<f64>();
        assert!((f - expected).abs() < 1e-12);

        let (lambda, z_l, _) = resto.initial_multipliers().unwrap();
        assert_eq!(lambda, vec![0.0, 0.0]);
        assert!((z_l[2] * x0[2] - 0.1).abs() < 1e-12);
    }
}
