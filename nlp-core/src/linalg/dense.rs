//! Dense symmetric eigendecomposition backend.
//!
//! Exact inertia for small systems. The matrix is expanded to a full
//! `DMatrix` and decomposed as A = V Λ Vᵀ; solves apply V Λ⁻¹ Vᵀ.

use nalgebra::linalg::SymmetricEigen;
use nalgebra::{DMatrix, DVector};

use super::backend::{BackendError, FactorStatus, Inertia, SymmetricSolver};
use super::sparse::SparseCsc;

pub struct DenseEigenSolver {
    n: usize,
    eigen: Option<SymmetricEigen<f64, nalgebra::Dyn>>,
}

impl DenseEigenSolver {
    pub fn new(n: usize) -> Self {
        Self { n, eigen: None }
    }

    /// Eigenvalues of the last factored matrix.
    pub fn eigenvalues(&self) -> Option<&DVector<f64>> {
        self.eigen.as_ref().map(|e| &e.eigenvalues)
    }

    fn to_dense(&self, mat: &SparseCsc) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.n, self.n);
        for (&val, (row, col)) in mat.iter() {
            dense[(row, col)] += val;
            if row != col {
                dense[(col, row)] += val;
            }
        }
        dense
    }
}

impl SymmetricSolver for DenseEigenSolver {
    fn symbolic_factorization(&mut self, mat: &SparseCsc) -> Result<(), BackendError> {
        if mat.rows() != self.n || mat.cols() != self.n {
            return Err(BackendError::DimensionMismatch {
                expected: self.n,
                actual: mat.rows(),
            });
        }
        Ok(())
    }

    fn numeric_factorization(&mut self, mat: &SparseCsc) -> Result<FactorStatus, BackendError> {
        self.symbolic_factorization(mat)?;
        self.eigen = None;

        let dense = self.to_dense(mat);
        if dense.iter().any(|v| !v.is_finite()) {
            return Ok(FactorStatus::Singular);
        }
        let eigen = SymmetricEigen::new(dense);

        let lambda_max = eigen.eigenvalues.amax();
        let tol = f64::EPSILON * (self.n.max(1) as f64) * lambda_max.max(1.0);
        let mut inertia = Inertia::default();
        for &lambda in eigen.eigenvalues.iter() {
            if lambda.abs() <= tol {
                inertia.zero += 1;
            } else if lambda > 0.0 {
                inertia.positive += 1;
            } else {
                inertia.negative += 1;
            }
        }

        if inertia.zero > 0 {
            return Ok(FactorStatus::Singular);
        }
        self.eigen = Some(eigen);
        Ok(FactorStatus::Success(inertia))
    }

    fn solve(&self, rhs: &[f64], sol: &mut [f64]) -> Result<(), BackendError> {
        let eigen = self
            .eigen
            .as_ref()
            .ok_or_else(|| BackendError::Message("no valid eigendecomposition".to_string()))?;
        if rhs.len() != self.n || sol.len() != self.n {
            return Err(BackendError::DimensionMismatch {
                expected: self.n,
                actual: rhs.len(),
            });
        }

        let b = DVector::from_column_slice(rhs);
        let mut coeffs = eigen.eigenvectors.tr_mul(&b);
        for (c, lambda) in coeffs.iter_mut().zip(eigen.eigenvalues.iter()) {
            *c /= *lambda;
        }
        let x = &eigen.eigenvectors * coeffs;
        sol.copy_from_slice(x.as_slice());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dense-eigen"
    }
}
