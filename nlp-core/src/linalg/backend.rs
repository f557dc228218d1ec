//! Symmetric indefinite solver interface.
//!
//! The interior-point method needs more than a solution from the linear
//! algebra layer: it needs the inertia of the factored matrix to decide
//! whether the Newton direction is usable. Backends therefore report either
//! the inertia of a successful factorization or that the matrix is singular.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::dense::DenseEigenSolver;
use super::ldl::{LdlError, LdlSolver};
use super::sparse::SparseCsc;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    Message(String),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("fill-reducing ordering failed: {0}")]
    Ordering(String),
    #[error(transparent)]
    Ldl(#[from] LdlError),
}

/// Counts of positive, negative and zero eigenvalues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inertia {
    pub positive: usize,
    pub negative: usize,
    pub zero: usize,
}

impl Inertia {
    pub fn new(positive: usize, negative: usize, zero: usize) -> Self {
        Self {
            positive,
            negative,
            zero,
        }
    }
}

/// Outcome of a numeric factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorStatus {
    /// Factorization succeeded with the given inertia.
    Success(Inertia),
    /// The matrix is (numerically) singular; no solve is possible.
    Singular,
}

/// Available linear solvers for the KKT system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinearSolverKind {
    /// Sparse LDLᵀ without pivoting; inertia from the signs of D.
    #[default]
    SparseLdl,
    /// Dense symmetric eigendecomposition; exact inertia, for small systems.
    DenseEigen,
}

impl std::str::FromStr for LinearSolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ldl" | "sparse-ldl" | "sparse_ldl" => Ok(LinearSolverKind::SparseLdl),
            "dense" | "dense-eigen" | "dense_eigen" | "eigen" => Ok(LinearSolverKind::DenseEigen),
            other => Err(format!("unknown linear solver '{}'", other)),
        }
    }
}

/// A factorization backend for symmetric (possibly indefinite) matrices.
///
/// Matrices are passed as the upper triangle in CSC form. The sparsity
/// pattern given to [`symbolic_factorization`](Self::symbolic_factorization)
/// must not change between numeric factorizations; only values do.
pub trait SymmetricSolver {
    fn symbolic_factorization(&mut self, mat: &SparseCsc) -> Result<(), BackendError>;
    fn numeric_factorization(&mut self, mat: &SparseCsc) -> Result<FactorStatus, BackendError>;
    fn solve(&self, rhs: &[f64], sol: &mut [f64]) -> Result<(), BackendError>;
    fn name(&self) -> &'static str;
}

/// Construct the backend selected in the settings.
pub fn make_solver(kind: LinearSolverKind, n: usize) -> Box<dyn SymmetricSolver> {
    match kind {
        LinearSolverKind::SparseLdl => Box::new(LdlSolver::new(n)),
        LinearSolverKind::DenseEigen => Box::new(DenseEigenSolver::new(n)),
    }
}
