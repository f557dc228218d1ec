//! Sparse LDLᵀ factorization with inertia detection.
//!
//! Wraps the `ldl` crate. The factorization A = L D Lᵀ has L unit lower
//! triangular and D diagonal, so by Sylvester's law of inertia the signs of
//! D give the inertia of A. No pivoting is performed; a zero (or
//! numerically negligible) pivot is reported as a singular matrix and the
//! caller is expected to regularize and retry.

use super::backend::{BackendError, FactorStatus, Inertia, SymmetricSolver};
use super::sparse::SparseCsc;
use thiserror::Error;

/// Threshold, relative to the magnitude of its row and column, below
/// which a pivot counts as zero.
const ZERO_PIVOT_REL_TOL: f64 = 1e-15;

#[derive(Error, Debug)]
pub enum LdlError {
    /// Elimination tree could not be built (pattern not upper triangular)
    #[error("symbolic factorization failed: pattern is not upper triangular")]
    SymbolicFailed,

    /// Numeric factorization requested before symbolic
    #[error("numeric factorization requested before symbolic analysis")]
    NoSymbolic,

    /// Solve requested without a valid factorization
    #[error("solve requested without a valid factorization")]
    NoFactorization,
}

/// LDL factorization backend.
pub struct LdlSolver {
    n: usize,

    etree: Option<Vec<Option<usize>>>,

    /// L nonzero count per column
    l_nz: Option<Vec<usize>>,

    factorization: Option<LdlFactorData>,

    /// Whether the stored factors belong to the last numeric factorization
    valid: bool,

    bwork: Vec<ldl::Marker>,
    iwork: Vec<usize>,
    fwork: Vec<f64>,
    /// Largest |a_ij| in each row/column of the last factored matrix
    pivot_scale: Vec<f64>,
}

struct LdlFactorData {
    l_p: Vec<usize>,
    l_i: Vec<usize>,
    l_x: Vec<f64>,
    d: Vec<f64>,
    d_inv: Vec<f64>,
}

impl LdlSolver {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            etree: None,
            l_nz: None,
            factorization: None,
            valid: false,
            bwork: vec![ldl::Marker::Unused; n],
            iwork: vec![0; 3 * n],
            fwork: vec![0.0; n],
            pivot_scale: vec![0.0; n],
        }
    }

    /// Diagonal D of the most recent factorization.
    pub fn d_values(&self) -> Option<&[f64]> {
        self.factorization.as_ref().map(|f| f.d.as_slice())
    }

    fn check_dims(&self, mat: &SparseCsc) -> Result<(), BackendError> {
        if mat.rows() != self.n || mat.cols() != self.n {
            return Err(BackendError::DimensionMismatch {
                expected: self.n,
                actual: mat.rows(),
            });
        }
        Ok(())
    }

    /// Scale of each row/column of the symmetric matrix stored as `mat`.
    fn update_pivot_scale(&mut self, mat: &SparseCsc) {
        self.pivot_scale.fill(0.0);
        for (&v, (row, col)) in mat.iter() {
            let a = v.abs();
            self.pivot_scale[row] = self.pivot_scale[row].max(a);
            self.pivot_scale[col] = self.pivot_scale[col].max(a);
        }
    }

    fn inertia_from_pivots(d: &[f64], scale: &[f64]) -> Option<Inertia> {
        let mut inertia = Inertia::default();
        for (&di, &sc) in d.iter().zip(scale) {
            if !di.is_finite() {
                return None;
            }
            if di.abs() <= ZERO_PIVOT_REL_TOL * sc {
                inertia.zero += 1;
            } else if di > 0.0 {
                inertia.positive += 1;
            } else {
                inertia.negative += 1;
            }
        }
        Some(inertia)
    }
}

impl SymmetricSolver for LdlSolver {
    fn symbolic_factorization(&mut self, mat: &SparseCsc) -> Result<(), BackendError> {
        self.check_dims(mat)?;

        let indptr = mat.indptr();
        let a_p = indptr.raw_storage();
        let a_i = mat.indices();

        let mut work = vec![0; self.n];
        let mut l_nz = vec![0; self.n];
        let mut etree = vec![None; self.n];

        ldl::etree(self.n, a_p, a_i, &mut work, &mut l_nz, &mut etree)
            .map_err(|_| LdlError::SymbolicFailed)?;

        let nnz_l: usize = l_nz.iter().sum();
        self.factorization = Some(LdlFactorData {
            l_p: vec![0; self.n + 1],
            l_i: vec![0; nnz_l],
            l_x: vec![0.0; nnz_l],
            d: vec![0.0; self.n],
            d_inv: vec![0.0; self.n],
        });
        self.etree = Some(etree);
        self.l_nz = Some(l_nz);
        self.valid = false;
        Ok(())
    }

    fn numeric_factorization(&mut self, mat: &SparseCsc) -> Result<FactorStatus, BackendError> {
        self.check_dims(mat)?;
        self.valid = false;
        self.update_pivot_scale(mat);

        let (Some(etree), Some(l_nz), Some(f)) = (
            self.etree.as_ref(),
            self.l_nz.as_ref(),
            self.factorization.as_mut(),
        ) else {
            return Err(LdlError::NoSymbolic.into());
        };

        let indptr = mat.indptr();
        let a_p = indptr.raw_storage();
        let a_i = mat.indices();
        let a_x = mat.data();

        // ldl expects clean markers
        self.bwork.fill(ldl::Marker::Unused);
        self.iwork.fill(0);
        self.fwork.fill(0.0);

        let result = ldl::factor(
            self.n,
            a_p,
            a_i,
            a_x,
            &mut f.l_p,
            &mut f.l_i,
            &mut f.l_x,
            &mut f.d,
            &mut f.d_inv,
            l_nz,
            etree,
            &mut self.bwork,
            &mut self.iwork,
            &mut self.fwork,
        );

        // An exact zero pivot aborts the factorization.
        if result.is_err() {
            return Ok(FactorStatus::Singular);
        }

        match Self::inertia_from_pivots(&f.d, &self.pivot_scale) {
            Some(inertia) if inertia.zero == 0 => {
                self.valid = true;
                Ok(FactorStatus::Success(inertia))
            }
            _ => Ok(FactorStatus::Singular),
        }
    }

    fn solve(&self, rhs: &[f64], sol: &mut [f64]) -> Result<(), BackendError> {
        if rhs.len() != self.n || sol.len() != self.n {
            return Err(BackendError::DimensionMismatch {
                expected: self.n,
                actual: rhs.len(),
            });
        }
        let f = match (&self.factorization, self.valid) {
            (Some(f), true) => f,
            _ => return Err(LdlError::NoFactorization.into()),
        };

        sol.copy_from_slice(rhs);
        ldl::solve(self.n, &f.l_p, &f.l_i, &f.l_x, &f.d_inv, sol);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sparse-ldl"
    }
}
