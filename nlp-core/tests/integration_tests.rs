//! End-to-end integration tests for the NLP solver.
//!
//! These tests run the full interior point pipeline through the public
//! `solve` API on small problems with known solutions.

use nlp_core::{
    solve, AlgorithmMode, ConvergenceStatus, EvalError, EvalResult, IterationSummary, LinearSolverKind, MuStrategy,
    NlpProblem, Solver, SolverError, SolverSettings,
};

/// Hock-Schittkowski problem 71.
///
/// min x0 x3 (x0 + x1 + x2) + x2
/// s.t. x0 x1 x2 x3 >= 25, Σ x_i² = 40, 1 <= x <= 5
struct Hs071;

impl NlpProblem for Hs071 {
    fn num_variables(&self) -> usize {
        4
    }
    fn num_constraints(&self) -> usize {
        2
    }
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        x_l.fill(1.0);
        x_u.fill(5.0);
    }
    fn constraint_bounds(&self, g_l: &mut [f64], g_u: &mut [f64]) {
        g_l[0] = 25.0;
        g_u[0] = 2e19;
        g_l[1] = 40.0;
        g_u[1] = 40.0;
    }
    fn initial_point(&self, x: &mut [f64]) {
        x.copy_from_slice(&[1.0, 5.0, 5.0, 1.0]);
    }
    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        Ok(x[0] * x[3] * (x[0] + x[1] + x[2]) + x[2])
    }
    fn objective_grad(&mut self, x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        grad[0] = x[3] * (2.0 * x[0] + x[1] + x[2]);
        grad[1] = x[0] * x[3];
        grad[2] = x[0] * x[3] + 1.0;
        grad[3] = x[0] * (x[0] + x[1] + x[2]);
        Ok(())
    }
    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> EvalResult<()> {
        g[0] = x[0] * x[1] * x[2] * x[3];
        g[1] = x.iter().map(|v| v * v).sum();
        Ok(())
    }
    fn jacobian_structure(&self) -> Vec<(usize, usize)> {
        (0..2).flat_map(|i| (0..4).map(move |j| (i, j))).collect()
    }
    fn jacobian_values(&mut self, x: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals[0] = x[1] * x[2] * x[3];
        vals[1] = x[0] * x[2] * x[3];
        vals[2] = x[0] * x[1] * x[3];
        vals[3] = x[0] * x[1] * x[2];
        for j in 0..4 {
            vals[4 + j] = 2.0 * x[j];
        }
        Ok(())
    }
    fn hessian_values(&mut self, x: &[f64], obj_factor: f64, lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        // Dense lower triangle, row-major: (0,0) (1,0) (1,1) (2,0) (2,1) (2,2) (3,0) ...
        let of = obj_factor;
        let (l0, l1) = (lambda[0], lambda[1]);
        vals[0] = of * 2.0 * x[3] + 2.0 * l1;
        vals[1] = of * x[3] + l0 * x[2] * x[3];
        vals[2] = 2.0 * l1;
        vals[3] = of * x[3] + l0 * x[1] * x[3];
        vals[4] = l0 * x[0] * x[3];
        vals[5] = 2.0 * l1;
        vals[6] = of * (2.0 * x[0] + x[1] + x[2]) + l0 * x[1] * x[2];
        vals[7] = of * x[0] + l0 * x[0] * x[2];
        vals[8] = of * x[0] + l0 * x[0] * x[1];
        vals[9] = 2.0 * l1;
        Ok(())
    }
}

fn rosenbrock(x: &[f64]) -> f64 {
    100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
}

fn rosenbrock_grad(x: &[f64], grad: &mut [f64]) {
    grad[0] = -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]);
    grad[1] = 200.0 * (x[1] - x[0] * x[0]);
}

/// Lower triangle (h00, h10, h11) of the Rosenbrock Hessian.
fn rosenbrock_hess(x: &[f64]) -> [f64; 3] {
    [1200.0 * x[0] * x[0] - 400.0 * x[1] + 2.0, -400.0 * x[0], 200.0]
}

/// Rosenbrock's function from (-1.2, 1), unconstrained.
struct Rosenbrock;

impl NlpProblem for Rosenbrock {
    fn num_variables(&self) -> usize {
        2
    }
    fn num_constraints(&self) -> usize {
        0
    }
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        x_l.fill(-1e20);
        x_u.fill(1e20);
    }
    fn constraint_bounds(&self, _g_l: &mut [f64], _g_u: &mut [f64]) {}
    fn initial_point(&self, x: &mut [f64]) {
        x.copy_from_slice(&[-1.2, 1.0]);
    }
    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        Ok(rosenbrock(x))
    }
    fn objective_grad(&mut self, x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        rosenbrock_grad(x, grad);
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
    fn hessian_values(&mut self, x: &[f64], obj_factor: f64, _lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        for (v, h) in vals.iter_mut().zip(rosenbrock_hess(x)) {
            *v = obj_factor * h;
        }
        Ok(())
    }
}

/// Rosenbrock with Hessian-vector products only.
struct RosenbrockProducts;

impl NlpProblem for RosenbrockProducts {
    fn num_variables(&self) -> usize {
        2
    }
    fn num_constraints(&self) -> usize {
        0
    }
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        x_l.fill(-1e20);
        x_u.fill(1e20);
    }
    fn constraint_bounds(&self, _g_l: &mut [f64], _g_u: &mut [f64]) {}
    fn initial_point(&self, x: &mut [f64]) {
        x.copy_from_slice(&[-1.2, 1.0]);
    }
    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        Ok(rosenbrock(x))
    }
    fn objective_grad(&mut self, x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        rosenbrock_grad(x, grad);
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
    fn hessian_vector_product(
        &mut self,
        x: &[f64],
        obj_factor: f64,
        _lambda: &[f64],
        v: &[f64],
        hv: &mut [f64],
    ) -> EvalResult<()> {
        let [h00, h10, h11] = rosenbrock_hess(x);
        hv[0] = obj_factor * (h00 * v[0] + h10 * v[1]);
        hv[1] = obj_factor * (h10 * v[0] + h11 * v[1]);
        Ok(())
    }
}

/// min ½‖x‖² s.t. x0 + x1 + x2 = 3, x0 - x1 = 1.
///
/// Closed form x = Aᵀ(AAᵀ)⁻¹b = (1.5, 0.5, 1).
struct EqualityQp;

impl NlpProblem for EqualityQp {
    fn num_variables(&self) -> usize {
        3
    }
    fn num_constraints(&self) -> usize {
        2
    }
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        x_l.fill(f64::NEG_INFINITY);
        x_u.fill(f64::INFINITY);
    }
    fn constraint_bounds(&self, g_l: &mut [f64], g_u: &mut [f64]) {
        g_l.copy_from_slice(&[3.0, 1.0]);
        g_u.copy_from_slice(&[3.0, 1.0]);
    }
    fn initial_point(&self, x: &mut [f64]) {
        x.fill(0.0);
    }
    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        Ok(0.5 * x.iter().map(|v| v * v).sum::<f64>())
    }
    fn objective_grad(&mut self, x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        grad.copy_from_slice(x);
        Ok(())
    }
    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> EvalResult<()> {
        g[0] = x[0] + x[1] + x[2];
        g[1] = x[0] - x[1];
        Ok(())
    }
    fn jacobian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1)]
    }
    fn jacobian_values(&mut self, _x: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals.copy_from_slice(&[1.0, 1.0, 1.0, 1.0, -1.0]);
        Ok(())
    }
    fn hessian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (1, 1), (2, 2)]
    }
    fn hessian_values(&mut self, _x: &[f64], obj_factor: f64, _lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals.fill(obj_factor);
        Ok(())
    }
}

/// x0² + x1² = 4, x0 - x1 = 0 with a constant objective.
struct SquareSystem;

impl NlpProblem for SquareSystem {
    fn num_variables(&self) -> usize {
        2
    }
    fn num_constraints(&self) -> usize {
        2
    }
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        x_l.fill(-1e19);
        x_u.fill(1e19);
    }
    fn constraint_bounds(&self, g_l: &mut [f64], g_u: &mut [f64]) {
        g_l.copy_from_slice(&[4.0, 0.0]);
        g_u.copy_from_slice(&[4.0, 0.0]);
    }
    fn initial_point(&self, x: &mut [f64]) {
        x.copy_from_slice(&[1.0, 0.5]);
    }
    fn objective(&mut self, _x: &[f64]) -> EvalResult<f64> {
        Ok(0.0)
    }
    fn objective_grad(&mut self, _x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        grad.fill(0.0);
        Ok(())
    }
    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> EvalResult<()> {
        g[0] = x[0] * x[0] + x[1] * x[1];
        g[1] = x[0] - x[1];
        Ok(())
    }
    fn jacobian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (0, 1), (1, 0), (1, 1)]
    }
    fn jacobian_values(&mut self, x: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals.copy_from_slice(&[2.0 * x[0], 2.0 * x[1], 1.0, -1.0]);
        Ok(())
    }
    fn hessian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (1, 1)]
    }
    fn hessian_values(&mut self, _x: &[f64], _obj_factor: f64, lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals.fill(2.0 * lambda[0]);
        Ok(())
    }
}

/// x0² + x1² <= 1 and x0 + x1 >= 3 have no common point.
struct Infeasible;

impl NlpProblem for Infeasible {
    fn num_variables(&self) -> usize {
        2
    }
    fn num_constraints(&self) -> usize {
        2
    }
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        x_l.fill(-1e19);
        x_u.fill(1e19);
    }
    fn constraint_bounds(&self, g_l: &mut [f64], g_u: &mut [f64]) {
        g_l.copy_from_slice(&[-1e19, 3.0]);
        g_u.copy_from_slice(&[1.0, 1e19]);
    }
    fn initial_point(&self, x: &mut [f64]) {
        x.copy_from_slice(&[0.5, 0.5]);
    }
    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        Ok(x[0] + x[1])
    }
    fn objective_grad(&mut self, _x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        grad.fill(1.0);
        Ok(())
    }
    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> EvalResult<()> {
        g[0] = x[0] * x[0] + x[1] * x[1];
        g[1] = x[0] + x[1];
        Ok(())
    }
    fn jacobian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (0, 1), (1, 0), (1, 1)]
    }
    fn jacobian_values(&mut self, x: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals.copy_from_slice(&[2.0 * x[0], 2.0 * x[1], 1.0, 1.0]);
        Ok(())
    }
    fn hessian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (1, 1)]
    }
    fn hessian_values(&mut self, _x: &[f64], _obj_factor: f64, lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals.fill(2.0 * lambda[0]);
        Ok(())
    }
}

/// min 2(x0² + x1² - 1) - x0 s.t. x0² + x1² = 1, from a point on the circle.
///
/// Full Newton steps increase both f and the infeasibility near the
/// solution (1, 0).
struct Maratos;

impl NlpProblem for Maratos {
    fn num_variables(&self) -> usize {
        2
    }
    fn num_constraints(&self) -> usize {
        1
    }
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        x_l.fill(-1e19);
        x_u.fill(1e19);
    }
    fn constraint_bounds(&self, g_l: &mut [f64], g_u: &mut [f64]) {
        g_l[0] = 1.0;
        g_u[0] = 1.0;
    }
    fn initial_point(&self, x: &mut [f64]) {
        x.copy_from_slice(&[0.5_f64.cos(), 0.5_f64.sin()]);
    }
    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        Ok(2.0 * (x[0] * x[0] + x[1] * x[1] - 1.0) - x[0])
    }
    fn objective_grad(&mut self, x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        grad[0] = 4.0 * x[0] - 1.0;
        grad[1] = 4.0 * x[1];
        Ok(())
    }
    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> EvalResult<()> {
        g[0] = x[0] * x[0] + x[1] * x[1];
        Ok(())
    }
    fn jacobian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (0, 1)]
    }
    fn jacobian_values(&mut self, x: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals[0] = 2.0 * x[0];
        vals[1] = 2.0 * x[1];
        Ok(())
    }
    fn hessian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (1, 1)]
    }
    fn hessian_values(&mut self, _x: &[f64], obj_factor: f64, lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals.fill(4.0 * obj_factor + 2.0 * lambda[0]);
        Ok(())
    }
}

/// min x⁴ from x = 1: Newton steps shrink x by a third and never finish.
struct Quartic;

impl NlpProblem for Quartic {
    fn num_variables(&self) -> usize {
        1
    }
    fn num_constraints(&self) -> usize {
        0
    }
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        x_l[0] = -1e19;
        x_u[0] = 1e19;
    }
    fn constraint_bounds(&self, _g_l: &mut [f64], _g_u: &mut [f64]) {}
    fn initial_point(&self, x: &mut [f64]) {
        x[0] = 1.0;
    }
    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        Ok(x[0].powi(4))
    }
    fn objective_grad(&mut self, x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        grad[0] = 4.0 * x[0].powi(3);
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
    fn hessian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0)]
    }
    fn hessian_values(&mut self, x: &[f64], obj_factor: f64, _lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals[0] = obj_factor * 12.0 * x[0] * x[0];
        Ok(())
    }
}

/// Objective that cannot be evaluated anywhere.
struct BrokenObjective;

impl NlpProblem for BrokenObjective {
    fn num_variables(&self) -> usize {
        1
    }
    fn num_constraints(&self) -> usize {
        0
    }
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        x_l[0] = 0.0;
        x_u[0] = 1.0;
    }
    fn constraint_bounds(&self, _g_l: &mut [f64], _g_u: &mut [f64]) {}
    fn initial_point(&self, x: &mut [f64]) {
        x[0] = 0.5;
    }
    fn objective(&mut self, _x: &[f64]) -> EvalResult<f64> {
        Err(EvalError::Failed("domain error".to_string()))
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

fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tol, "component {}: {} vs expected {}", i, a, e);
    }
}

#[test]
fn test_hs071() {
    let result = solve(&mut Hs071, &SolverSettings::default()).expect("solve failed");

    println!("\n=== HS071 Result ===");
    println!("Status: {}", result.status);
    println!("x = {:?}", result.x);
    println!("obj = {}", result.obj_val);
    println!("iters = {}", result.info.iters);

    assert_eq!(result.status, ConvergenceStatus::Converged);
    assert!((result.obj_val - 17.014017).abs() < 1e-5, "objective {}", result.obj_val);
    assert_close(&result.x, &[1.0, 4.742999, 3.821151, 1.379408], 1e-5);
    assert!(result.info.constr_viol < 1e-7);

    // Bound multipliers are only active where the bound is
    assert!(result.z_l[0] > 0.1, "x0 sits at its lower bound");
    assert!(result.z_l[1] < 1e-6 && result.z_u[1] < 1e-6);
    assert_eq!(result.lambda.len(), 2);
    assert!((result.g[1] - 40.0).abs() < 1e-7);
}

#[test]
fn test_hs071_adaptive_mu() {
    let settings = SolverSettings {
        mu_strategy: MuStrategy::Adaptive,
        ..Default::default()
    };
    let result = solve(&mut Hs071, &settings).expect("solve failed");
    assert!(result.status.is_success(), "status {}", result.status);
    assert!((result.obj_val - 17.014017).abs() < 1e-4, "objective {}", result.obj_val);
}

#[test]
fn test_both_backends_agree() {
    let mut solutions = Vec::new();
    for kind in [LinearSolverKind::SparseLdl, LinearSolverKind::DenseEigen] {
        let settings = SolverSettings {
            linear_solver: kind,
            ..Default::default()
        };
        let result = solve(&mut Hs071, &settings).expect("solve failed");
        assert_eq!(result.status, ConvergenceStatus::Converged, "backend {:?}", kind);
        solutions.push(result.x);
    }
    assert_close(&solutions[0], &solutions[1], 1e-6);
}

#[test]
fn test_rosenbrock() {
    let result = solve(&mut Rosenbrock, &SolverSettings::default()).expect("solve failed");
    assert_eq!(result.status, ConvergenceStatus::Converged);
    assert_close(&result.x, &[1.0, 1.0], 1e-6);
    assert!(result.obj_val < 1e-12);
    assert_eq!(result.info.restoration_calls, 0);
}

#[test]
fn test_rosenbrock_from_hessian_products() {
    let result = solve(&mut RosenbrockProducts, &SolverSettings::default()).expect("solve failed");
    assert_eq!(result.status, ConvergenceStatus::Converged);
    assert_close(&result.x, &[1.0, 1.0], 1e-6);
}

#[test]
fn test_equality_qp_matches_closed_form() {
    let result = solve(&mut EqualityQp, &SolverSettings::default()).expect("solve failed");
    assert_eq!(result.status, ConvergenceStatus::Converged);
    assert_close(&result.x, &[1.5, 0.5, 1.0], 1e-8);
    // ∇f + Jᵀλ = 0 gives λ = -(AAᵀ)⁻¹b = (-1, -0.5)
    assert_close(&result.lambda, &[-1.0, -0.5], 1e-6);
    assert!(result.info.iters < 10, "took {} iterations", result.info.iters);
}

#[test]
fn test_square_system() {
    let result = solve(&mut SquareSystem, &SolverSettings::default()).expect("solve failed");
    assert!(result.status.is_success(), "status {}", result.status);
    let r = 2.0_f64.sqrt();
    assert_close(&result.x, &[r, r], 1e-6);
}

#[test]
fn test_infeasible_problem_fails_gracefully() {
    let result = solve(&mut Infeasible, &SolverSettings::default()).expect("solve failed");
    assert!(!result.status.is_success(), "an infeasible problem reported {}", result.status);
    assert!(result.info.constr_viol > 0.1);
    assert!(result.x.iter().all(|v| v.is_finite()));
}

#[test]
fn test_second_order_correction_avoids_maratos_effect() {
    let result = solve(&mut Maratos, &SolverSettings::default()).expect("solve failed");
    assert_eq!(result.status, ConvergenceStatus::Converged);
    assert_close(&result.x, &[1.0, 0.0], 1e-6);
    assert!(result.info.soc_steps >= 1, "no corrected step taken");
    assert_eq!(result.info.restoration_calls, 0);
}

#[test]
fn test_converges_after_restoration() {
    let settings = SolverSettings {
        start_with_resto: true,
        ..Default::default()
    };
    let result = solve(&mut Hs071, &settings).expect("solve failed");
    assert_eq!(result.status, ConvergenceStatus::Converged);
    assert!(result.info.restoration_calls >= 1);
    assert!((result.obj_val - 17.014017).abs() < 1e-5, "objective {}", result.obj_val);
}

#[test]
fn test_restoration_iterations_are_reported_once() {
    let mut seen = Vec::new();
    let result = {
        let settings = SolverSettings {
            start_with_resto: true,
            ..Default::default()
        };
        let mut solver = Solver::new(settings).with_intermediate_callback(|s: &IterationSummary| {
            seen.push((s.iter, s.mode));
            true
        });
        solver.solve(&mut Hs071).expect("solve failed")
    };
    assert_eq!(seen[0], (0, AlgorithmMode::Regular));
    assert!(seen.iter().any(|&(_, mode)| mode == AlgorithmMode::RestorationPhase));
    for pair in seen.windows(2) {
        assert_eq!(pair[1].0, pair[0].0 + 1, "summaries {:?}", seen);
    }
    assert_eq!(seen.last().map(|&(iter, _)| iter), Some(result.info.iters));
    assert_eq!(seen.last().map(|&(_, mode)| mode), Some(AlgorithmMode::Regular));
}

#[test]
fn test_iteration_limit_inside_restoration() {
    // No iteration left once restoration is entered
    let settings = SolverSettings {
        start_with_resto: true,
        max_iter: 1,
        ..Default::default()
    };
    let result = solve(&mut Hs071, &settings).expect("solve failed");
    assert_eq!(result.status, ConvergenceStatus::MaxIterExceeded);
    assert_eq!(result.info.iters, 1);
    assert_eq!(result.info.restoration_calls, 1);

    // The outer limit cuts the restoration phase short
    let settings = SolverSettings {
        start_with_resto: true,
        max_iter: 3,
        ..Default::default()
    };
    let result = solve(&mut Hs071, &settings).expect("solve failed");
    assert_eq!(result.status, ConvergenceStatus::MaxIterExceeded);
    assert_eq!(result.info.iters, 3);
}

#[test]
fn test_tiny_steps_with_mu_at_floor_stop() {
    let settings = SolverSettings {
        mu_init: 1e-9,
        tiny_step_tol: 1.0,
        ..Default::default()
    };
    let result = solve(&mut Quartic, &settings).expect("solve failed");
    assert_eq!(result.status, ConvergenceStatus::StopAtTinyStep);
    assert!(result.info.iters < 10, "took {} iterations", result.info.iters);
    assert!(result.x[0] > 0.0 && result.x[0] < 1.0);
}

#[test]
fn test_max_iter_zero() {
    let settings = SolverSettings {
        max_iter: 0,
        ..Default::default()
    };
    let result = solve(&mut Hs071, &settings).expect("solve failed");
    assert_eq!(result.status, ConvergenceStatus::MaxIterExceeded);
    assert_eq!(result.info.iters, 0);
    // The returned point is the pushed starting point
    assert!(result.x.iter().all(|&v| (1.0..=5.0).contains(&v)));
}

#[test]
fn test_callback_stops_solve() {
    let mut seen = Vec::new();
    let result = {
        let mut solver = Solver::new(SolverSettings::default()).with_intermediate_callback(|s: &IterationSummary| {
            seen.push(s.iter);
            s.iter < 2
        });
        solver.solve(&mut Hs071).expect("solve failed")
    };
    assert_eq!(result.status, ConvergenceStatus::UserStop);
    assert_eq!(seen, vec![0, 1, 2]);
    assert_eq!(result.info.iters, 2);
}

#[test]
fn test_summary_reports_steps() {
    let mut summaries = Vec::new();
    {
        let mut solver =
            Solver::new(SolverSettings::default()).with_intermediate_callback(|s: &IterationSummary| {
                summaries.push(*s);
                true
            });
        solver.solve(&mut Rosenbrock).expect("solve failed");
    }
    assert_eq!(summaries[0].d_norm, 0.0);
    assert_eq!(summaries[0].ls_trials, 0);
    assert!(summaries[1..].iter().all(|s| s.ls_trials >= 1 && s.alpha_pr > 0.0));
}

#[test]
fn test_invalid_option_rejected_before_solving() {
    let settings = SolverSettings {
        tol: -1.0,
        ..Default::default()
    };
    match solve(&mut Hs071, &settings) {
        Err(SolverError::InvalidOption { name, .. }) => assert_eq!(name, "tol"),
        other => panic!("expected an invalid option error, got {:?}", other.map(|r| r.status)),
    }
}

#[test]
fn test_failed_start_evaluation_is_an_error() {
    let result = solve(&mut BrokenObjective, &SolverSettings::default());
    assert!(matches!(result, Err(SolverError::InitialEvaluation(_))));
}

#[test]
fn test_evaluation_counts() {
    let result = solve(&mut Hs071, &SolverSettings::default()).expect("solve failed");
    let evals = result.info.evals;
    assert!(evals.obj >= result.info.iters);
    assert!(evals.hess >= result.info.iters);
    assert!(evals.jac >= 1 && evals.constr >= 1 && evals.grad >= 1);
}
