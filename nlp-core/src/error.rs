//! Error types for the NLP solver.
//!
//! Terminal algorithm outcomes such as an iteration limit or a user stop are
//! not errors; they are reported through
//! [`ConvergenceStatus`](crate::ConvergenceStatus) inside an `Ok` result.
//! `SolverError` covers the cases where no iterate can be produced at all.

use thiserror::Error;

use crate::linalg::backend::BackendError;

/// Failure reported by a problem callback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The callback could not be evaluated at the given point.
    #[error("evaluation failed: {0}")]
    Failed(String),

    /// The callback is not provided by this problem.
    #[error("callback not provided: {0}")]
    NotProvided(&'static str),

    /// The callback produced NaN or infinite values.
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

/// Errors that abort a solve before (or instead of) iterating.
#[derive(Error, Debug)]
pub enum SolverError {
    /// An option is out of range or inconsistent with another option.
    #[error("invalid option {name} = {value}: {reason}")]
    InvalidOption {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// Problem dimensions, bounds or sparsity structures are inconsistent.
    #[error("invalid problem: {0}")]
    InvalidProblem(String),

    /// The starting point could not be evaluated.
    #[error("evaluation at the starting point failed: {0}")]
    InitialEvaluation(#[from] EvalError),

    /// Structural failure in the linear algebra layer.
    #[error("linear solver error: {0}")]
    LinearSolver(#[from] BackendError),
}

impl SolverError {
    pub(crate) fn invalid_option(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        SolverError::InvalidOption {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type SolverResult<T> = Result<T, SolverError>;
