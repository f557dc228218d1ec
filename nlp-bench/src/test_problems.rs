//! Shared test problem definitions for regression and benchmarking.

use nlp_core::{EvalResult, NlpProblem};

/// Test problem definition.
#[derive(Clone)]
pub struct TestProblem {
    pub name: &'static str,
    pub problem_class: &'static str,
    pub builder: fn() -> Box<dyn NlpProblem>,
    pub expected_objective: Option<f64>,
    pub expected_iterations: Option<usize>,
    pub expected_to_fail: bool,
    pub source: &'static str,
}

// ============================================================================
// Hock-Schittkowski problems
// ============================================================================

/// HS071: min x0 x3 (x0 + x1 + x2) + x2, x0 x1 x2 x3 >= 25, ‖x‖² = 40, 1 <= x <= 5
pub struct Hs071;

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
        g_l.copy_from_slice(&[25.0, 40.0]);
        g_u.copy_from_slice(&[2e19, 40.0]);
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
        g[0] = x.iter().product();
        g[1] = x.iter().map(|v| v * v).sum();
        Ok(())
    }
    fn jacobian_structure(&self) -> Vec<(usize, usize)> {
        (0..2).flat_map(|i| (0..4).map(move |j| (i, j))).collect()
    }
    fn jacobian_values(&mut self, x: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        let prod: f64 = x.iter().product();
        for j in 0..4 {
            // x_j >= 1 inside the bounds
            vals[j] = prod / x[j];
            vals[4 + j] = 2.0 * x[j];
        }
        Ok(())
    }
    fn hessian_values(&mut self, x: &[f64], obj_factor: f64, lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        let (of, l0, l1) = (obj_factor, lambda[0], lambda[1]);
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

/// HS035: convex QP with one linear inequality and x >= 0.
pub struct Hs035;

impl NlpProblem for Hs035 {
    fn num_variables(&self) -> usize {
        3
    }
    fn num_constraints(&self) -> usize {
        1
    }
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        x_l.fill(0.0);
        x_u.fill(1e19);
    }
    fn constraint_bounds(&self, g_l: &mut [f64], g_u: &mut [f64]) {
        g_l[0] = -1e19;
        g_u[0] = 3.0;
    }
    fn initial_point(&self, x: &mut [f64]) {
        x.fill(0.5);
    }
    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        Ok(9.0 - 8.0 * x[0] - 6.0 * x[1] - 4.0 * x[2]
            + 2.0 * x[0] * x[0]
            + 2.0 * x[1] * x[1]
            + x[2] * x[2]
            + 2.0 * x[0] * x[1]
            + 2.0 * x[0] * x[2])
    }
    fn objective_grad(&mut self, x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        grad[0] = -8.0 + 4.0 * x[0] + 2.0 * x[1] + 2.0 * x[2];
        grad[1] = -6.0 + 4.0 * x[1] + 2.0 * x[0];
        grad[2] = -4.0 + 2.0 * x[2] + 2.0 * x[0];
        Ok(())
    }
    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> EvalResult<()> {
        g[0] = x[0] + x[1] + 2.0 * x[2];
        Ok(())
    }
    fn jacobian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (0, 1), (0, 2)]
    }
    fn jacobian_values(&mut self, _x: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals.copy_from_slice(&[1.0, 1.0, 2.0]);
        Ok(())
    }
    fn hessian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (1, 0), (1, 1), (2, 0), (2, 2)]
    }
    fn hessian_values(&mut self, _x: &[f64], obj_factor: f64, _lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        for (v, h) in vals.iter_mut().zip([4.0, 2.0, 4.0, 2.0, 2.0]) {
            *v = obj_factor * h;
        }
        Ok(())
    }
}

/// HS006: min (1 - x0)² s.t. 10 (x1 - x0²) = 0.
pub struct Hs006;

impl NlpProblem for Hs006 {
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
        g_l[0] = 0.0;
        g_u[0] = 0.0;
    }
    fn initial_point(&self, x: &mut [f64]) {
        x.copy_from_slice(&[-1.2, 1.0]);
    }
    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        Ok((1.0 - x[0]).powi(2))
    }
    fn objective_grad(&mut self, x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        grad[0] = -2.0 * (1.0 - x[0]);
        grad[1] = 0.0;
        Ok(())
    }
    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> EvalResult<()> {
        g[0] = 10.0 * (x[1] - x[0] * x[0]);
        Ok(())
    }
    fn jacobian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (0, 1)]
    }
    fn jacobian_values(&mut self, x: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals[0] = -20.0 * x[0];
        vals[1] = 10.0;
        Ok(())
    }
    fn hessian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0)]
    }
    fn hessian_values(&mut self, _x: &[f64], obj_factor: f64, lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        vals[0] = 2.0 * obj_factor - 20.0 * lambda[0];
        Ok(())
    }
}

// ============================================================================
// Unconstrained problems
// ============================================================================

/// Chained Rosenbrock function Σ 100 (x_{i+1} - x_i²)² + (1 - x_i)².
///
/// With n = 2 this is the classic Rosenbrock problem.
pub struct ChainedRosenbrock {
    pub n: usize,
}

impl NlpProblem for ChainedRosenbrock {
    fn num_variables(&self) -> usize {
        self.n
    }
    fn num_constraints(&self) -> usize {
        0
    }
    fn variable_bounds(&self, x_l: &mut [f64], x_u: &mut [f64]) {
        x_l.fill(-1e19);
        x_u.fill(1e19);
    }
    fn constraint_bounds(&self, _g_l: &mut [f64], _g_u: &mut [f64]) {}
    fn initial_point(&self, x: &mut [f64]) {
        for (j, v) in x.iter_mut().enumerate() {
            *v = if j % 2 == 0 { -1.2 } else { 1.0 };
        }
    }
    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        Ok(x
            .windows(2)
            .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (1.0 - w[0]).powi(2))
            .sum())
    }
    fn objective_grad(&mut self, x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        grad.fill(0.0);
        for i in 0..self.n - 1 {
            let r = x[i + 1] - x[i] * x[i];
            grad[i] += -400.0 * x[i] * r - 2.0 * (1.0 - x[i]);
            grad[i + 1] += 200.0 * r;
        }
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
        let mut entries: Vec<(usize, usize)> = (0..self.n).map(|j| (j, j)).collect();
        entries.extend((0..self.n - 1).map(|i| (i + 1, i)));
        entries
    }
    fn hessian_values(&mut self, x: &[f64], obj_factor: f64, _lambda: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        let n = self.n;
        vals.fill(0.0);
        for i in 0..n - 1 {
            vals[i] += 1200.0 * x[i] * x[i] - 400.0 * x[i + 1] + 2.0;
            vals[i + 1] += 200.0;
            vals[n + i] = -400.0 * x[i];
        }
        for v in vals.iter_mut() {
            *v *= obj_factor;
        }
        Ok(())
    }
}

// ============================================================================
// Square and infeasible systems
// ============================================================================

/// Circle `x0² + x1² = r²` intersected with `x0 - x1 = offset`.
///
/// As an equality system it is square; with `infeasible` the circle becomes
/// the inequality `x0² + x1² <= 1` and the line `x0 + x1 >= 3`.
pub struct CircleLine {
    pub infeasible: bool,
}

impl NlpProblem for CircleLine {
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
        if self.infeasible {
            g_l.copy_from_slice(&[-1e19, 3.0]);
            g_u.copy_from_slice(&[1.0, 1e19]);
        } else {
            g_l.copy_from_slice(&[4.0, 0.0]);
            g_u.copy_from_slice(&[4.0, 0.0]);
        }
    }
    fn initial_point(&self, x: &mut [f64]) {
        x.copy_from_slice(&[1.0, 0.5]);
    }
    fn objective(&mut self, x: &[f64]) -> EvalResult<f64> {
        Ok(if self.infeasible { x[0] + x[1] } else { 0.0 })
    }
    fn objective_grad(&mut self, _x: &[f64], grad: &mut [f64]) -> EvalResult<()> {
        grad.fill(if self.infeasible { 1.0 } else { 0.0 });
        Ok(())
    }
    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> EvalResult<()> {
        g[0] = x[0] * x[0] + x[1] * x[1];
        g[1] = if self.infeasible { x[0] + x[1] } else { x[0] - x[1] };
        Ok(())
    }
    fn jacobian_structure(&self) -> Vec<(usize, usize)> {
        vec![(0, 0), (0, 1), (1, 0), (1, 1)]
    }
    fn jacobian_values(&mut self, x: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        let slope = if self.infeasible { 1.0 } else { -1.0 };
        vals.copy_from_slice(&[2.0 * x[0], 2.0 * x[1], 1.0, slope]);
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

// ============================================================================
// Problem Registry
// ============================================================================

fn build_hs071() -> Box<dyn NlpProblem> {
    Box::new(Hs071)
}

fn build_hs035() -> Box<dyn NlpProblem> {
    Box::new(Hs035)
}

fn build_hs006() -> Box<dyn NlpProblem> {
    Box::new(Hs006)
}

fn build_rosenbrock() -> Box<dyn NlpProblem> {
    Box::new(ChainedRosenbrock { n: 2 })
}

fn build_chained_rosenbrock() -> Box<dyn NlpProblem> {
    Box::new(ChainedRosenbrock { n: 100 })
}

fn build_square_circle() -> Box<dyn NlpProblem> {
    Box::new(CircleLine { infeasible: false })
}

fn build_infeasible_circle() -> Box<dyn NlpProblem> {
    Box::new(CircleLine { infeasible: true })
}

pub fn test_problems() -> Vec<TestProblem> {
    vec![
        TestProblem {
            name: "HS071",
            problem_class: "NLP",
            builder: build_hs071,
            expected_objective: Some(17.014017145),
            expected_iterations: Some(8),
            expected_to_fail: false,
            source: "Hock-Schittkowski",
        },
        TestProblem {
            name: "HS035",
            problem_class: "QP",
            builder: build_hs035,
            expected_objective: Some(1.0 / 9.0),
            expected_iterations: Some(7),
            expected_to_fail: false,
            source: "Hock-Schittkowski",
        },
        TestProblem {
            name: "HS006",
            problem_class: "NLP",
            builder: build_hs006,
            expected_objective: Some(0.0),
            expected_iterations: None,
            expected_to_fail: false,
            source: "Hock-Schittkowski",
        },
        TestProblem {
            name: "ROSENBROCK",
            problem_class: "UNC",
            builder: build_rosenbrock,
            expected_objective: Some(0.0),
            expected_iterations: None,
            expected_to_fail: false,
            source: "synthetic",
        },
        TestProblem {
            name: "CHAINED_ROSENBROCK_100",
            problem_class: "UNC",
            builder: build_chained_rosenbrock,
            expected_objective: Some(0.0),
            expected_iterations: None,
            expected_to_fail: false,
            source: "synthetic",
        },
        TestProblem {
            name: "SQUARE_CIRCLE",
            problem_class: "SQUARE",
            builder: build_square_circle,
            expected_objective: Some(0.0),
            expected_iterations: None,
            expected_to_fail: false,
            source: "synthetic",
        },
        TestProblem {
            name: "INFEASIBLE_CIRCLE",
            problem_class: "NLP",
            builder: build_infeasible_circle,
            expected_objective: None,
            expected_iterations: None,
            expected_to_fail: true,
            source: "synthetic",
        },
    ]
}

pub fn find_problem(name: &str) -> Option<TestProblem> {
    test_problems()
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
}
