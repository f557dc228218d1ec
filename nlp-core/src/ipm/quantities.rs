//! Derived quantities of an iterate.
//!
//! Evaluations that every component needs (f, c, d, ∇f, Jacobians, slacks,
//! Lagrangian gradients) are computed when the iterate is built. Scalar
//! measures (infeasibilities, complementarity, errors, barrier values) are
//! computed on first request and cached, so each one is computed at most
//! once per iterate no matter how many components ask for it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::iterate::{fraction_to_boundary, Iterate, SearchDirection};
use super::nlp::{JacobianBlock, NlpAdapter, ProblemLayout};
use crate::problem::EvalResult;
use crate::util::{dot, norm, Norm, NormAccumulator};

/// Scale threshold s_max of the scaled optimality error.
const S_MAX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum QuantityKey {
    PrimalInf(Norm),
    DualInf(Norm),
    Compl(u64, Norm),
    ConstrViol(Norm),
    NlpError(u64),
    BarrierError(u64),
    BarrierObj(u64, u64),
    AvgCompl,
    Centrality,
    DualScaling,
    ComplScaling,
    MaxAbsX,
}

pub struct IterateQuantities {
    layout: Rc<ProblemLayout>,
    iterate: Iterate,

    f: f64,
    grad_f: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
    jac_c: JacobianBlock,
    jac_d: JacobianBlock,

    slack_x_l: Vec<f64>,
    slack_x_u: Vec<f64>,
    slack_s_l: Vec<f64>,
    slack_s_u: Vec<f64>,

    /// ∇f + Jcᵀy_c + Jdᵀy_d - z_L + z_U
    grad_lag_x: Vec<f64>,
    /// -y_d - v_L + v_U
    grad_lag_s: Vec<f64>,

    cache: RefCell<HashMap<QuantityKey, f64>>,
}

impl std::fmt::Debug for IterateQuantities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterateQuantities")
            .field("f", &self.f)
            .field("x", &self.iterate.x)
            .field("s", &self.iterate.s)
            .finish()
    }
}

impl IterateQuantities {
    /// Evaluate everything at `iterate`.
    pub(crate) fn evaluate(nlp: &mut NlpAdapter<'_>, iterate: Iterate) -> EvalResult<Self> {
        let f = nlp.eval_f(&iterate.x)?;
        let (c, d) = nlp.eval_c_d(&iterate.x)?;
        Self::from_trial(nlp, iterate, f, c, d)
    }

    /// Complete an iterate whose function values are already known from
    /// the line search.
    pub(crate) fn from_trial(
        nlp: &mut NlpAdapter<'_>,
        iterate: Iterate,
        f: f64,
        c: Vec<f64>,
        d: Vec<f64>,
    ) -> EvalResult<Self> {
        let grad_f = nlp.eval_grad_f(&iterate.x)?;
        let (jac_c, jac_d) = nlp.eval_jacobians(&iterate.x)?;
        Ok(Self::assemble(nlp.layout().clone(), iterate, f, grad_f, c, d, jac_c, jac_d))
    }

    fn assemble(
        layout: Rc<ProblemLayout>,
        iterate: Iterate,
        f: f64,
        grad_f: Vec<f64>,
        c: Vec<f64>,
        d: Vec<f64>,
        jac_c: JacobianBlock,
        jac_d: JacobianBlock,
    ) -> Self {
        let x = &iterate.x;
        let s = &iterate.s;
        let slack_x_l = layout.x_lower.iter().map(|&j| x[j] - layout.x_l[j]).collect();
        let slack_x_u = layout.x_upper.iter().map(|&j| layout.x_u[j] - x[j]).collect();
        let slack_s_l = layout.d_lower.iter().map(|&k| s[k] - layout.d_l[k]).collect();
        let slack_s_u = layout.d_upper.iter().map(|&k| layout.d_u[k] - s[k]).collect();

        let mut grad_lag_x = grad_f.clone();
        jac_c.mul_transpose_add(&iterate.y_c, &mut grad_lag_x);
        jac_d.mul_transpose_add(&iterate.y_d, &mut grad_lag_x);
        for (&j, &z) in layout.x_lower.iter().zip(&iterate.z_l) {
            grad_lag_x[j] -= z;
        }
        for (&j, &z) in layout.x_upper.iter().zip(&iterate.z_u) {
            grad_lag_x[j] += z;
        }

        let mut grad_lag_s: Vec<f64> = iterate.y_d.iter().map(|y| -y).collect();
        for (&k, &v) in layout.d_lower.iter().zip(&iterate.v_l) {
            grad_lag_s[k] -= v;
        }
        for (&k, &v) in layout.d_upper.iter().zip(&iterate.v_u) {
            grad_lag_s[k] += v;
        }

        Self {
            layout,
            iterate,
            f,
            grad_f,
            c,
            d,
            jac_c,
            jac_d,
            slack_x_l,
            slack_x_u,
            slack_s_l,
            slack_s_u,
            grad_lag_x,
            grad_lag_s,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn cached(&self, key: QuantityKey, compute: impl FnOnce() -> f64) -> f64 {
        if let Some(&v) = self.cache.borrow().get(&key) {
            return v;
        }
        let v = compute();
        self.cache.borrow_mut().insert(key, v);
        v
    }

    pub fn layout(&self) -> &Rc<ProblemLayout> {
        &self.layout
    }

    pub fn iterate(&self) -> &Iterate {
        &self.iterate
    }

    pub fn f(&self) -> f64 {
        self.f
    }

    pub fn grad_f(&self) -> &[f64] {
        &self.grad_f
    }

    pub fn c(&self) -> &[f64] {
        &self.c
    }

    pub fn d(&self) -> &[f64] {
        &self.d
    }

    pub fn jac_c(&self) -> &JacobianBlock {
        &self.jac_c
    }

    pub fn jac_d(&self) -> &JacobianBlock {
        &self.jac_d
    }

    pub fn slack_x_l(&self) -> &[f64] {
        &self.slack_x_l
    }

    pub fn slack_x_u(&self) -> &[f64] {
        &self.slack_x_u
    }

    pub fn slack_s_l(&self) -> &[f64] {
        &self.slack_s_l
    }

    pub fn slack_s_u(&self) -> &[f64] {
        &self.slack_s_u
    }

    /// Full constraint vector g(x) in the original row order.
    pub fn g(&self) -> Vec<f64> {
        self.layout.assemble_g(&self.c, &self.d)
    }

    /// Norm of the residual `[c; d - s]`.
    pub fn primal_infeasibility(&self, n: Norm) -> f64 {
        self.cached(QuantityKey::PrimalInf(n), || {
            primal_infeasibility(&self.c, &self.d, &self.iterate.s, n)
        })
    }

    /// θ: one-norm of the primal residual, used by the filter.
    pub fn theta(&self) -> f64 {
        self.primal_infeasibility(Norm::One)
    }

    /// Norm of the Lagrangian gradient with respect to (x, s).
    pub fn dual_infeasibility(&self, n: Norm) -> f64 {
        self.cached(QuantityKey::DualInf(n), || {
            let mut acc = NormAccumulator::new(n);
            acc.extend(&self.grad_lag_x);
            acc.extend(&self.grad_lag_s);
            acc.finish()
        })
    }

    /// Norm of the perturbed complementarity `slack * multiplier - mu`.
    pub fn complementarity(&self, mu: f64, n: Norm) -> f64 {
        self.cached(QuantityKey::Compl(mu.to_bits(), n), || {
            let mut acc = NormAccumulator::new(n);
            self.for_each_complementarity(|p| acc.push(p - mu));
            acc.finish()
        })
    }

    fn for_each_complementarity(&self, mut visit: impl FnMut(f64)) {
        let it = &self.iterate;
        for (sl, z) in [
            (&self.slack_x_l, &it.z_l),
            (&self.slack_x_u, &it.z_u),
            (&self.slack_s_l, &it.v_l),
            (&self.slack_s_u, &it.v_u),
        ] {
            for (a, b) in sl.iter().zip(z.iter()) {
                visit(a * b);
            }
        }
    }

    /// Violation of the original (unrelaxed) constraints and variable bounds.
    pub fn constraint_violation(&self, n: Norm) -> f64 {
        self.cached(QuantityKey::ConstrViol(n), || {
            let layout = &self.layout;
            let mut acc = NormAccumulator::new(n);
            acc.extend(&self.c);
            for (k, &row) in layout.ineq_rows.iter().enumerate() {
                let v = self.d[k];
                acc.push((layout.g_l_orig[row] - v).max(v - layout.g_u_orig[row]).max(0.0));
            }
            for &j in &layout.x_lower {
                acc.push((layout.x_l_orig[j] - self.iterate.x[j]).max(0.0));
            }
            for &j in &layout.x_upper {
                acc.push((self.iterate.x[j] - layout.x_u_orig[j]).max(0.0));
            }
            acc.finish()
        })
    }

    /// s_d = max(s_max, (‖y‖₁ + ‖z‖₁) / (m + n_bounds)) / s_max
    pub fn dual_scaling(&self) -> f64 {
        self.cached(QuantityKey::DualScaling, || {
            let it = &self.iterate;
            let count = it.y_c.len() + it.y_d.len() + self.layout.num_bounds();
            if count == 0 {
                return 1.0;
            }
            let sum = norm(&it.y_c, Norm::One)
                + norm(&it.y_d, Norm::One)
                + self.bound_multiplier_one_norm();
            S_MAX.max(sum / count as f64) / S_MAX
        })
    }

    /// s_c = max(s_max, ‖z‖₁ / n_bounds) / s_max
    pub fn complementarity_scaling(&self) -> f64 {
        self.cached(QuantityKey::ComplScaling, || {
            let count = self.layout.num_bounds();
            if count == 0 {
                return 1.0;
            }
            S_MAX.max(self.bound_multiplier_one_norm() / count as f64) / S_MAX
        })
    }

    fn bound_multiplier_one_norm(&self) -> f64 {
        let it = &self.iterate;
        norm(&it.z_l, Norm::One) + norm(&it.z_u, Norm::One) + norm(&it.v_l, Norm::One) + norm(&it.v_u, Norm::One)
    }

    /// Scaled optimality error of the internal (bound-relaxed) problem.
    /// The unrelaxed violation is judged on its own by the convergence test.
    pub fn nlp_error(&self, mu_target: f64) -> f64 {
        self.cached(QuantityKey::NlpError(mu_target.to_bits()), || {
            let dual = self.dual_infeasibility(Norm::Max) / self.dual_scaling();
            let primal = self.primal_infeasibility(Norm::Max);
            let compl = self.complementarity(mu_target, Norm::Max) / self.complementarity_scaling();
            dual.max(primal).max(compl)
        })
    }

    /// Scaled optimality error of the barrier subproblem for `mu`.
    pub fn barrier_error(&self, mu: f64) -> f64 {
        self.cached(QuantityKey::BarrierError(mu.to_bits()), || {
            let dual = self.dual_infeasibility(Norm::Max) / self.dual_scaling();
            let primal = self.primal_infeasibility(Norm::Max);
            let compl = self.complementarity(mu, Norm::Max) / self.complementarity_scaling();
            dual.max(primal).max(compl)
        })
    }

    /// Barrier objective φ_μ at this iterate.
    pub fn barrier_objective(&self, mu: f64, kappa_d: f64) -> f64 {
        self.cached(QuantityKey::BarrierObj(mu.to_bits(), kappa_d.to_bits()), || {
            barrier_value(&self.layout, self.f, &self.iterate.x, &self.iterate.s, mu, kappa_d)
        })
    }

    /// Average complementarity over all bounds (0 without bounds).
    pub fn average_complementarity(&self) -> f64 {
        self.cached(QuantityKey::AvgCompl, || {
            let count = self.layout.num_bounds();
            if count == 0 {
                return 0.0;
            }
            let mut sum = 0.0;
            self.for_each_complementarity(|p| sum += p);
            sum / count as f64
        })
    }

    /// ξ = min complementarity / average complementarity, in (0, 1].
    pub fn centrality(&self) -> f64 {
        self.cached(QuantityKey::Centrality, || {
            let avg = self.average_complementarity();
            if avg <= 0.0 {
                return 1.0;
            }
            let mut min = f64::INFINITY;
            self.for_each_complementarity(|p| min = min.min(p));
            min / avg
        })
    }

    pub fn max_abs_x(&self) -> f64 {
        self.cached(QuantityKey::MaxAbsX, || norm(&self.iterate.x, Norm::Max))
    }

    /// Directional derivative of φ_μ along the primal part of `dir`.
    pub fn barrier_directional_derivative(&self, dir: &SearchDirection, mu: f64, kappa_d: f64) -> f64 {
        let layout = &self.layout;
        let damp = kappa_d * mu;
        let mut value = dot(&self.grad_f, &dir.dx);
        for (k, (&j, &sl)) in layout.x_lower.iter().zip(&self.slack_x_l).enumerate() {
            value -= mu * dir.dx[j] / sl;
            if layout.x_lower_one_sided(k) {
                value += damp * dir.dx[j];
            }
        }
        for (k, (&j, &su)) in layout.x_upper.iter().zip(&self.slack_x_u).enumerate() {
            value += mu * dir.dx[j] / su;
            if layout.x_upper_one_sided(k) {
                value -= damp * dir.dx[j];
            }
        }
        for (k, (&i, &tl)) in layout.d_lower.iter().zip(&self.slack_s_l).enumerate() {
            value -= mu * dir.ds[i] / tl;
            if layout.d_lower_one_sided(k) {
                value += damp * dir.ds[i];
            }
        }
        for (k, (&i, &tu)) in layout.d_upper.iter().zip(&self.slack_s_u).enumerate() {
            value += mu * dir.ds[i] / tu;
            if layout.d_upper_one_sided(k) {
                value -= damp * dir.ds[i];
            }
        }
        value
    }

    /// Largest α in (0, 1] keeping all primal slacks above (1 - τ) of
    /// their current value along `dir`.
    pub fn primal_fraction_to_boundary(&self, dir: &SearchDirection, tau: f64) -> f64 {
        let layout = &self.layout;
        let dx_l: Vec<f64> = layout.x_lower.iter().map(|&j| dir.dx[j]).collect();
        let dx_u: Vec<f64> = layout.x_upper.iter().map(|&j| -dir.dx[j]).collect();
        let ds_l: Vec<f64> = layout.d_lower.iter().map(|&i| dir.ds[i]).collect();
        let ds_u: Vec<f64> = layout.d_upper.iter().map(|&i| -dir.ds[i]).collect();
        fraction_to_boundary(tau, &self.slack_x_l, &dx_l)
            .min(fraction_to_boundary(tau, &self.slack_x_u, &dx_u))
            .min(fraction_to_boundary(tau, &self.slack_s_l, &ds_l))
            .min(fraction_to_boundary(tau, &self.slack_s_u, &ds_u))
    }

    /// Primal-dual Hessian terms Σx = Z_L/S_L + Z_U/S_U (length n).
    pub fn sigma_x(&self) -> Vec<f64> {
        let mut sigma = vec![0.0; self.layout.n];
        for ((&j, &sl), &z) in self.layout.x_lower.iter().zip(&self.slack_x_l).zip(&self.iterate.z_l) {
            sigma[j] += z / sl;
        }
        for ((&j, &su), &z) in self.layout.x_upper.iter().zip(&self.slack_x_u).zip(&self.iterate.z_u) {
            sigma[j] += z / su;
        }
        sigma
    }

    /// Σs = V_L/T_L + V_U/T_U (length n_d).
    pub fn sigma_s(&self) -> Vec<f64> {
        let mut sigma = vec![0.0; self.layout.n_d()];
        for ((&i, &tl), &v) in self.layout.d_lower.iter().zip(&self.slack_s_l).zip(&self.iterate.v_l) {
            sigma[i] += v / tl;
        }
        for ((&i, &tu), &v) in self.layout.d_upper.iter().zip(&self.slack_s_u).zip(&self.iterate.v_u) {
            sigma[i] += v / tu;
        }
        sigma
    }

    /// Gradients of the barrier Lagrangian with respect to x and s, with
    /// the bound multipliers eliminated through μ / slack.
    pub fn barrier_residuals(&self, mu: f64, kappa_d: f64) -> (Vec<f64>, Vec<f64>) {
        let layout = &self.layout;
        let damp = kappa_d * mu;

        let mut r_x = self.grad_f.clone();
        self.jac_c.mul_transpose_add(&self.iterate.y_c, &mut r_x);
        self.jac_d.mul_transpose_add(&self.iterate.y_d, &mut r_x);
        for (k, (&j, &sl)) in layout.x_lower.iter().zip(&self.slack_x_l).enumerate() {
            r_x[j] -= mu / sl;
            if layout.x_lower_one_sided(k) {
                r_x[j] += damp;
            }
        }
        for (k, (&j, &su)) in layout.x_upper.iter().zip(&self.slack_x_u).enumerate() {
            r_x[j] += mu / su;
            if layout.x_upper_one_sided(k) {
                r_x[j] -= damp;
            }
        }

        let mut r_s: Vec<f64> = self.iterate.y_d.iter().map(|y| -y).collect();
        for (k, (&i, &tl)) in layout.d_lower.iter().zip(&self.slack_s_l).enumerate() {
            r_s[i] -= mu / tl;
            if layout.d_lower_one_sided(k) {
                r_s[i] += damp;
            }
        }
        for (k, (&i, &tu)) in layout.d_upper.iter().zip(&self.slack_s_u).enumerate() {
            r_s[i] += mu / tu;
            if layout.d_upper_one_sided(k) {
                r_s[i] -= damp;
            }
        }
        (r_x, r_s)
    }
}

/// Norm of `[c; d - s]`.
pub fn primal_infeasibility(c: &[f64], d: &[f64], s: &[f64], n: Norm) -> f64 {
    let mut acc = NormAccumulator::new(n);
    acc.extend(c);
    for (di, si) in d.iter().zip(s) {
        acc.push(di - si);
    }
    acc.finish()
}

/// Barrier objective `f - μ Σ ln(slack) + κ_d μ Σ_one-sided slack`.
///
/// Returns +inf if any slack is not strictly positive.
pub fn barrier_value(layout: &ProblemLayout, f: f64, x: &[f64], s: &[f64], mu: f64, kappa_d: f64) -> f64 {
    let damp = kappa_d * mu;
    let mut log_sum = 0.0;
    let mut damping = 0.0;

    let mut visit = |slack: f64, one_sided: bool| -> bool {
        if !(slack > 0.0) {
            return false;
        }
        log_sum += slack.ln();
        if one_sided {
            damping += slack;
        }
        true
    };

    for (k, &j) in layout.x_lower.iter().enumerate() {
        if !visit(x[j] - layout.x_l[j], layout.x_lower_one_sided(k)) {
            return f64::INFINITY;
        }
    }
    for (k, &j) in layout.x_upper.iter().enumerate() {
        if !visit(layout.x_u[j] - x[j], layout.x_upper_one_sided(k)) {
            return f64::INFINITY;
        }
    }
    for (k, &i) in layout.d_lower.iter().enumerate() {
        if !visit(s[i] - layout.d_l[i], layout.d_lower_one_sided(k)) {
            return f64::INFINITY;
        }
    }
    for (k, &i) in layout.d_upper.iter().enumerate() {
        if !visit(layout.d_u[i] - s[i], layout.d_upper_one_sided(k)) {
            return f64::INFINITY;
        }
    }

    f - mu * log_sum + damp * damping
}

/// Per-iteration bookkeeping reported next to the iterate.
#[derive(Debug, Clone, Copy, Default)]
pub struct IterationInfo {
    /// Primal step norm of the last direction; `None` before the first one
    pub d_norm: Option<f64>,
    pub alpha_primal: f64,
    pub alpha_dual: f64,
    pub ls_trials: usize,
    /// Hessian perturbation δw of the last direction
    pub regularization: f64,
    /// The last step was accepted without a line search
    pub tiny_step: bool,
}

impl IterationInfo {
    pub fn step_norm(&self) -> f64 {
        self.d_norm.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipm::nlp::tests::SmallProblem;
    use crate::problem::NlpProblem;
    use crate::settings::SolverSettings;

    fn quantities(nlp: &mut NlpAdapter<'_>) -> IterateQuantities {
        let iterate = Iterate {
            x: vec![0.5, 0.5],
            s: vec![0.5],
            y_c: vec![1.0],
            y_d: vec![-2.0],
            z_l: vec![3.0],
            z_u: vec![],
            v_l: vec![0.5],
            v_u: vec![0.25],
        };
        IterateQuantities::evaluate(nlp, iterate).unwrap()
    }

    #[test]
    fn test_residuals_and_measures() {
        let mut problem = SmallProblem;
        let settings = SolverSettings {
            bound_relax_factor: 0.0,
            ..Default::default()
        };
        let mut nlp = NlpAdapter::new(&mut problem, &settings).unwrap();
        let q = quantities(&mut nlp);

        // c = x0 + x1 - 1 = 0, d - s = 0.25 - 0.5
        assert_eq!(q.c(), &[0.0]);
        assert_eq!(q.d(), &[0.25]);
        assert_eq!(q.theta(), 0.25);
        assert_eq!(q.primal_infeasibility(Norm::Max), 0.25);

        // ∇f = (-1, 1); Jcᵀ y_c = (1, 1); Jdᵀ y_d = (-1, -1); -z_L on x0
        // grad_lag_x = (-1 + 1 - 1 - 3, 1 + 1 - 1) = (-4, 1)
        // grad_lag_s = 2 - 0.5 + 0.25 = 1.75
        assert_eq!(q.dual_infeasibility(Norm::Max), 4.0);
        assert_eq!(q.dual_infeasibility(Norm::One), 6.75);

        // products: 0.5*3, 0.5*0.5, 3.5*0.25
        assert_eq!(q.complementarity(0.0, Norm::Max), 1.5);
        assert!((q.average_complementarity() - (1.5 + 0.25 + 0.875) / 3.0).abs() < 1e-15);
        assert!((q.centrality() - 0.25 / q.average_complementarity()).abs() < 1e-15);

        // Multipliers are small: both scalings are 1.
        assert_eq!(q.dual_scaling(), 1.0);
        assert_eq!(q.complementarity_scaling(), 1.0);
        assert_eq!(q.nlp_error(0.0), 4.0);
        assert_eq!(q.constraint_violation(Norm::Max), 0.0);
    }

    #[test]
    fn test_quantities_are_cached() {
        let mut problem = SmallProblem;
        let settings = SolverSettings::default();
        let mut nlp = NlpAdapter::new(&mut problem, &settings).unwrap();
        let q = quantities(&mut nlp);

        let first = q.barrier_error(0.1);
        assert_eq!(q.cache.borrow().len(), 6);
        let second = q.barrier_error(0.1);
        assert_eq!(first, second);
        assert_eq!(q.cache.borrow().len(), 6);
    }

    #[test]
    fn test_barrier_value_outside_bounds() {
        let mut problem = SmallProblem;
        let settings = SolverSettings::default();
        let nlp = NlpAdapter::new(&mut problem, &settings).unwrap();
        let layout = nlp.layout();
        assert_eq!(barrier_value(layout, 0.0, &[-1.0, 0.0], &[1.0], 0.1, 0.0), f64::INFINITY);
        let inside = barrier_value(layout, 2.0, &[1.0, 0.0], &[1.0], 0.1, 0.0);
        assert!(inside.is_finite());
    }

    #[test]
    fn test_directional_derivative_matches_finite_difference() {
        let mut problem = SmallProblem;
        let settings = SolverSettings::default();
        let mut nlp = NlpAdapter::new(&mut problem, &settings).unwrap();
        let q = quantities(&mut nlp);
        let dir = SearchDirection {
            dx: vec![0.1, -0.2],
            ds: vec![0.3],
            dy_c: vec![0.0],
            dy_d: vec![0.0],
            dz_l: vec![0.0],
            dz_u: vec![],
            dv_l: vec![0.0],
            dv_u: vec![0.0],
        };
        let (mu, kappa_d) = (0.1, 1e-2);
        let h = 1e-7;
        let (x, s) = q.iterate().primal_trial(&dir, h);
        let mut problem = SmallProblem;
        let f_h = problem.objective(&x).unwrap();
        let phi_h = barrier_value(q.layout(), f_h, &x, &s, mu, kappa_d);
        let fd = (phi_h - q.barrier_objective(mu, kappa_d)) / h;
        let exact = q.barrier_directional_derivative(&dir, mu, kappa_d);
        assert!((fd - exact).abs() < 1e-5, "fd {} vs exact {}", fd, exact);
    }

    /// min 0  s.t.  x >= 1
    struct FlatAboveOne;

    impl NlpProblem for FlatAboveOne {
        fn num_variables(&self) -> usize {
            1
        }
        fn num_constraints(&self) -> usize {
            0
        }
        fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
            x_l[0] = 1.0;
            x_u[0] = 1e20;
        }
        fn constraint_bounds(&self, _g_l: &mut [f64], _g_u: &mut [f64]) {}
        fn initial_point(&self, x: &mut [f64]) {
            x[0] = 2.0;
        }
        fn objective(&mut self, _x: &[f64]) -> EvalResult<f64> {
            Ok(0.0)
        }
        fn objective_grad(&mut self, _x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
            grad[0] = 0.0;
            Ok(())
        }
        fn constraints(&mut self, _x: &[f64], _g: &mut [f64]) -> EvalResult<()> {
            Ok(())
        }
        fn jacobian_structure(&self) -> Vec<(usize, usize)> {
            Vec::new()
        }
        fn jacobian_values(&mut self, _x: &[f64], _vals: &mut [f64]) -> EvalResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_nlp_error_ignores_bound_relaxation() {
        let mut problem = FlatAboveOne;
        let mut nlp = NlpAdapter::new(&mut problem, &SolverSettings::default()).unwrap();
        // Inside the relaxed bound 1 - 1e-8, outside the original one.
        let iterate = Iterate {
            x: vec![1.0 - 5e-9],
            s: vec![],
            y_c: vec![],
            y_d: vec![],
            z_l: vec![0.0],
            z_u: vec![],
            v_l: vec![],
            v_u: vec![],
        };
        let q = IterateQuantities::evaluate(&mut nlp, iterate).unwrap();

        let viol = q.constraint_violation(Norm::Max);
        assert!(viol > 4e-9 && viol < 6e-9, "violation {}", viol);
        assert_eq!(q.primal_infeasibility(Norm::Max), 0.0);
        assert_eq!(q.nlp_error(0.0), 0.0);
    }

    #[test]
    fn test_step_norm_before_first_direction() {
        assert_eq!(IterationInfo::default().step_norm(), 0.0);
    }
}
