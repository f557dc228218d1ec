//! Internal view of the user problem.
//!
//! The adapter splits the constraints into equalities `c(x) = g(x) - g_L`
//! and inequalities `d(x)` with slack bounds `d_L <= s <= d_U`, relaxes
//! finite bounds slightly, and counts every callback evaluation.

use std::rc::Rc;

use crate::error::{EvalError, SolverError, SolverResult};
use crate::linalg::kkt::KktStructure;
use crate::linalg::sparse::{from_triplets, spmv, spmv_transpose, SparseCsc};
use crate::problem::{EvalCounts, EvalResult, IterationSummary, NlpProblem};
use crate::settings::SolverSettings;

/// Bound and row classification of a problem, fixed for the whole solve.
#[derive(Debug, Clone)]
pub struct ProblemLayout {
    pub n: usize,
    pub m: usize,

    /// Original row indices of the equality constraints
    pub eq_rows: Vec<usize>,
    /// Original row indices of the inequality constraints
    pub ineq_rows: Vec<usize>,
    /// Right-hand side g_L of each equality row
    pub c_rhs: Vec<f64>,

    /// Relaxed variable bounds (±inf where absent)
    pub x_l: Vec<f64>,
    pub x_u: Vec<f64>,
    /// Variables with a finite lower / upper bound
    pub x_lower: Vec<usize>,
    pub x_upper: Vec<usize>,

    /// Relaxed slack bounds, one per inequality row
    pub d_l: Vec<f64>,
    pub d_u: Vec<f64>,
    /// Inequality rows (index into `ineq_rows`) with a finite lower / upper bound
    pub d_lower: Vec<usize>,
    pub d_upper: Vec<usize>,

    /// Unrelaxed user bounds, used for the reported constraint violation
    pub x_l_orig: Vec<f64>,
    pub x_u_orig: Vec<f64>,
    pub g_l_orig: Vec<f64>,
    pub g_u_orig: Vec<f64>,
}

impl ProblemLayout {
    pub fn n_c(&self) -> usize {
        self.eq_rows.len()
    }

    pub fn n_d(&self) -> usize {
        self.ineq_rows.len()
    }

    /// Total number of finite variable and slack bounds.
    pub fn num_bounds(&self) -> usize {
        self.x_lower.len() + self.x_upper.len() + self.d_lower.len() + self.d_upper.len()
    }

    /// As many equality constraints as variables: the problem is a system
    /// of equations and only feasibility matters.
    pub fn is_square(&self) -> bool {
        self.n == self.n_c()
    }

    pub fn x_lower_one_sided(&self, k: usize) -> bool {
        !self.x_u[self.x_lower[k]].is_finite()
    }

    pub fn x_upper_one_sided(&self, k: usize) -> bool {
        !self.x_l[self.x_upper[k]].is_finite()
    }

    pub fn d_lower_one_sided(&self, k: usize) -> bool {
        !self.d_u[self.d_lower[k]].is_finite()
    }

    pub fn d_upper_one_sided(&self, k: usize) -> bool {
        !self.d_l[self.d_upper[k]].is_finite()
    }

    /// Build the full constraint vector from its equality and inequality parts.
    pub fn assemble_g(&self, c: &[f64], d: &[f64]) -> Vec<f64> {
        let mut g = vec![0.0; self.m];
        for (k, &row) in self.eq_rows.iter().enumerate() {
            g[row] = c[k] + self.c_rhs[k];
        }
        for (k, &row) in self.ineq_rows.iter().enumerate() {
            g[row] = d[k];
        }
        g
    }

    /// Multipliers in the original row order.
    pub fn lambda(&self, y_c: &[f64], y_d: &[f64]) -> Vec<f64> {
        let mut lambda = vec![0.0; self.m];
        for (k, &row) in self.eq_rows.iter().enumerate() {
            lambda[row] = y_c[k];
        }
        for (k, &row) in self.ineq_rows.iter().enumerate() {
            lambda[row] = y_d[k];
        }
        lambda
    }

    /// Split original-order multipliers into (y_c, y_d).
    pub fn split_lambda(&self, lambda: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let y_c = self.eq_rows.iter().map(|&row| lambda[row]).collect();
        let y_d = self.ineq_rows.iter().map(|&row| lambda[row]).collect();
        (y_c, y_d)
    }
}

/// Values of one Jacobian block, kept both in structure order (for the
/// KKT assembly) and as a CSC matrix (for products).
#[derive(Debug, Clone)]
pub struct JacobianBlock {
    pub values: Vec<f64>,
    pub mat: SparseCsc,
}

impl JacobianBlock {
    fn new(nrows: usize, ncols: usize, structure: &[(usize, usize)], values: Vec<f64>) -> Self {
        let mat = from_triplets(
            nrows,
            ncols,
            structure.iter().zip(&values).map(|(&(r, c), &v)| (r, c, v)),
        );
        Self { values, mat }
    }

    /// out = J v
    pub fn mul(&self, v: &[f64], out: &mut [f64]) {
        spmv(&self.mat, v, out, 1.0, 0.0);
    }

    /// out += Jᵀ y
    pub fn mul_transpose_add(&self, y: &[f64], out: &mut [f64]) {
        spmv_transpose(&self.mat, y, out, 1.0, 1.0);
    }
}

#[derive(Debug, Clone, Copy)]
enum RowKind {
    Eq(usize),
    Ineq(usize),
}

pub(crate) struct NlpAdapter<'p> {
    problem: &'p mut dyn NlpProblem,
    layout: Rc<ProblemLayout>,

    jac_structure: Vec<(usize, usize)>,
    /// For each Jacobian entry, the block it belongs to and its slot there
    jac_route: Vec<RowKind>,
    jac_c_structure: Vec<(usize, usize)>,
    jac_d_structure: Vec<(usize, usize)>,
    hess_structure: Vec<(usize, usize)>,

    counts: EvalCounts,
    g_buf: Vec<f64>,
    jac_buf: Vec<f64>,
}

fn relax(bound: f64, factor: f64, lower: bool) -> f64 {
    let shift = factor * bound.abs().max(1.0);
    if lower {
        bound - shift
    } else {
        bound + shift
    }
}

impl<'p> NlpAdapter<'p> {
    pub fn new(problem: &'p mut dyn NlpProblem, settings: &SolverSettings) -> SolverResult<Self> {
        let n = problem.num_variables();
        let m = problem.num_constraints();

        let mut x_l_orig = vec![0.0; n];
        let mut x_u_orig = vec![0.0; n];
        problem.variable_bounds(&mut x_l_orig, &mut x_u_orig);
        let mut g_l_orig = vec![0.0; m];
        let mut g_u_orig = vec![0.0; m];
        problem.constraint_bounds(&mut g_l_orig, &mut g_u_orig);

        let lower_inf = settings.nlp_lower_bound_inf;
        let upper_inf = settings.nlp_upper_bound_inf;
        let relax_factor = settings.bound_relax_factor;

        let mut x_l = vec![f64::NEG_INFINITY; n];
        let mut x_u = vec![f64::INFINITY; n];
        let mut x_lower = Vec::new();
        let mut x_upper = Vec::new();
        for j in 0..n {
            let (lo, hi) = (x_l_orig[j], x_u_orig[j]);
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(SolverError::InvalidProblem(format!(
                    "variable {} has inconsistent bounds [{}, {}]",
                    j, lo, hi
                )));
            }
            if lo > lower_inf {
                x_l[j] = relax(lo, relax_factor, true);
                x_lower.push(j);
            }
            if hi < upper_inf {
                x_u[j] = relax(hi, relax_factor, false);
                x_upper.push(j);
            }
            // Slacks of a fixed variable are zero without relaxation.
            if !(x_l[j] < x_u[j]) {
                return Err(SolverError::InvalidProblem(format!(
                    "variable {} is fixed at {} and bound_relax_factor is 0",
                    j, lo
                )));
            }
        }

        let mut eq_rows = Vec::new();
        let mut ineq_rows = Vec::new();
        let mut c_rhs = Vec::new();
        let mut d_l = Vec::new();
        let mut d_u = Vec::new();
        let mut d_lower = Vec::new();
        let mut d_upper = Vec::new();
        let mut row_kind = Vec::with_capacity(m);
        for i in 0..m {
            let (lo, hi) = (g_l_orig[i], g_u_orig[i]);
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(SolverError::InvalidProblem(format!(
                    "constraint {} has inconsistent bounds [{}, {}]",
                    i, lo, hi
                )));
            }
            if lo == hi {
                row_kind.push(RowKind::Eq(eq_rows.len()));
                eq_rows.push(i);
                c_rhs.push(lo);
            } else {
                let k = ineq_rows.len();
                row_kind.push(RowKind::Ineq(k));
                ineq_rows.push(i);
                if lo > lower_inf {
                    d_l.push(relax(lo, relax_factor, true));
                    d_lower.push(k);
                } else {
                    d_l.push(f64::NEG_INFINITY);
                }
                if hi < upper_inf {
                    d_u.push(relax(hi, relax_factor, false));
                    d_upper.push(k);
                } else {
                    d_u.push(f64::INFINITY);
                }
            }
        }

        let jac_structure = problem.jacobian_structure();
        let mut jac_route = Vec::with_capacity(jac_structure.len());
        let mut jac_c_structure = Vec::new();
        let mut jac_d_structure = Vec::new();
        for &(row, col) in &jac_structure {
            if row >= m || col >= n {
                return Err(SolverError::InvalidProblem(format!(
                    "jacobian entry ({}, {}) outside a {}x{} matrix",
                    row, col, m, n
                )));
            }
            match row_kind[row] {
                RowKind::Eq(k) => {
                    jac_route.push(RowKind::Eq(jac_c_structure.len()));
                    jac_c_structure.push((k, col));
                }
                RowKind::Ineq(k) => {
                    jac_route.push(RowKind::Ineq(jac_d_structure.len()));
                    jac_d_structure.push((k, col));
                }
            }
        }

        let hess_structure = problem.hessian_structure();
        for &(row, col) in &hess_structure {
            if row >= n || col > row {
                return Err(SolverError::InvalidProblem(format!(
                    "hessian entry ({}, {}) is not in the lower triangle of a {}x{} matrix",
                    row, col, n, n
                )));
            }
        }

        let layout = ProblemLayout {
            n,
            m,
            eq_rows,
            ineq_rows,
            c_rhs,
            x_l,
            x_u,
            x_lower,
            x_upper,
            d_l,
            d_u,
            d_lower,
            d_upper,
            x_l_orig,
            x_u_orig,
            g_l_orig,
            g_u_orig,
        };

        Ok(Self {
            problem,
            layout: Rc::new(layout),
            jac_buf: vec![0.0; jac_structure.len()],
            jac_structure,
            jac_route,
            jac_c_structure,
            jac_d_structure,
            hess_structure,
            counts: EvalCounts::default(),
            g_buf: vec![0.0; m],
        })
    }

    pub fn layout(&self) -> &Rc<ProblemLayout> {
        &self.layout
    }

    pub fn counts(&self) -> EvalCounts {
        self.counts
    }

    pub fn jacobian_structure(&self) -> &[(usize, usize)] {
        &self.jac_structure
    }

    pub fn hessian_structure(&self) -> &[(usize, usize)] {
        &self.hess_structure
    }

    pub fn kkt_structure(&self) -> KktStructure {
        KktStructure {
            hess: self.hess_structure.clone(),
            jac_c: self.jac_c_structure.clone(),
            jac_d: self.jac_d_structure.clone(),
        }
    }

    pub fn initial_point(&self) -> Vec<f64> {
        let mut x = vec![0.0; self.layout.n];
        self.problem.initial_point(&mut x);
        x
    }

    pub fn initial_multipliers(&self) -> Option<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        self.problem.initial_multipliers()
    }

    pub fn intermediate_callback(&mut self, summary: &IterationSummary) -> bool {
        self.problem.intermediate_callback(summary)
    }

    pub fn eval_f(&mut self, x: &[f64]) -> EvalResult<f64> {
        self.counts.obj += 1;
        let f = self.problem.objective(x)?;
        if !f.is_finite() {
            return Err(EvalError::NonFinite("objective"));
        }
        Ok(f)
    }

    pub fn eval_grad_f(&mut self, x: &[f64]) -> EvalResult<Vec<f64>> {
        self.counts.grad += 1;
        let mut grad = vec![0.0; self.layout.n];
        self.problem.objective_grad(x, &mut grad)?;
        if grad.iter().any(|v| !v.is_finite()) {
            return Err(EvalError::NonFinite("objective gradient"));
        }
        Ok(grad)
    }

    /// Full constraint vector in the original row order.
    pub fn eval_g(&mut self, x: &[f64], g: &mut [f64]) -> EvalResult<()> {
        self.counts.constr += 1;
        self.problem.constraints(x, g)?;
        if g.iter().any(|v| !v.is_finite()) {
            return Err(EvalError::NonFinite("constraints"));
        }
        Ok(())
    }

    /// Equality residuals c(x) and inequality values d(x).
    pub fn eval_c_d(&mut self, x: &[f64]) -> EvalResult<(Vec<f64>, Vec<f64>)> {
        let mut g = std::mem::take(&mut self.g_buf);
        let result = self.eval_g(x, &mut g);
        let split = result.map(|_| {
            let layout = &self.layout;
            let c = layout
                .eq_rows
                .iter()
                .zip(&layout.c_rhs)
                .map(|(&row, &rhs)| g[row] - rhs)
                .collect();
            let d = layout.ineq_rows.iter().map(|&row| g[row]).collect();
            (c, d)
        });
        self.g_buf = g;
        split
    }

    /// Jacobian values in the user's structure order.
    pub fn eval_jac_values(&mut self, x: &[f64], vals: &mut [f64]) -> EvalResult<()> {
        self.counts.jac += 1;
        self.problem.jacobian_values(x, vals)?;
        if vals.iter().any(|v| !v.is_finite()) {
            return Err(EvalError::NonFinite("jacobian"));
        }
        Ok(())
    }

    pub fn eval_jacobians(&mut self, x: &[f64]) -> EvalResult<(JacobianBlock, JacobianBlock)> {
        let mut vals = std::mem::take(&mut self.jac_buf);
        let result = self.eval_jac_values(x, &mut vals);
        let blocks = result.map(|_| {
            let mut c_vals = vec![0.0; self.jac_c_structure.len()];
            let mut d_vals = vec![0.0; self.jac_d_structure.len()];
            for (route, &v) in self.jac_route.iter().zip(&vals) {
                match *route {
                    RowKind::Eq(k) => c_vals[k] = v,
                    RowKind::Ineq(k) => d_vals[k] = v,
                }
            }
            let n = self.layout.n;
            (
                JacobianBlock::new(self.layout.n_c(), n, &self.jac_c_structure, c_vals),
                JacobianBlock::new(self.layout.n_d(), n, &self.jac_d_structure, d_vals),
            )
        });
        self.jac_buf = vals;
        blocks
    }

    /// Lagrangian Hessian values in the user's structure order.
    pub fn eval_hess_values(
        &mut self,
        x: &[f64],
        obj_factor: f64,
        lambda: &[f64],
        vals: &mut [f64],
    ) -> EvalResult<()> {
        self.counts.hess += 1;
        self.problem.hessian_values(x, obj_factor, lambda, vals)?;
        if vals.iter().any(|v| !v.is_finite()) {
            return Err(EvalError::NonFinite("hessian"));
        }
        Ok(())
    }

    pub fn eval_hessian(&mut self, x: &[f64], obj_factor: f64, y_c: &[f64], y_d: &[f64]) -> EvalResult<Vec<f64>> {
        let lambda = self.layout.lambda(y_c, y_d);
        let mut vals = vec![0.0; self.hess_structure.len()];
        self.eval_hess_values(x, obj_factor, &lambda, &mut vals)?;
        Ok(vals)
    }
}
