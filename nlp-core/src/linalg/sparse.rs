//! Sparse matrix types and operations.
//!
//! CSC (Compressed Sparse Column) helpers on top of `sprs`. Jacobians are
//! stored as general CSC matrices; the KKT matrix is stored as its upper
//! triangle.

use sprs::{CsMat, TriMat};

/// Sparse matrix in CSC format (general, not necessarily symmetric).
pub type SparseCsc = CsMat<f64>;

/// Sparse symmetric matrix in CSC format (upper triangle only).
pub type SparseSymmetricCsc = CsMat<f64>;

/// Build a sparse CSC matrix from triplets (row, col, value).
///
/// Duplicate entries are summed; explicit zeros are kept so the pattern
/// can be reused when the values change.
pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> SparseCsc
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new((nrows, ncols));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csc()
}

/// Position of entry (row, col) in the data array of a CSC matrix.
pub fn nz_position(mat: &SparseCsc, row: usize, col: usize) -> Option<usize> {
    let indptr = mat.indptr();
    let ptr = indptr.raw_storage();
    let start = ptr[col];
    let end = ptr[col + 1];
    mat.indices()[start..end]
        .binary_search(&row)
        .ok()
        .map(|offset| start + offset)
}

/// Sparse matrix-vector product: y = alpha * A * x + beta * y
pub fn spmv(a: &SparseCsc, x: &[f64], y: &mut [f64], alpha: f64, beta: f64) {
    assert_eq!(a.cols(), x.len());
    assert_eq!(a.rows(), y.len());

    if beta == 0.0 {
        y.fill(0.0);
    } else if beta != 1.0 {
        for yi in y.iter_mut() {
            *yi *= beta;
        }
    }

    if alpha != 0.0 {
        for (val, (row, col)) in a.iter() {
            y[row] += alpha * (*val) * x[col];
        }
    }
}

/// Transpose-vector product: y = alpha * A^T * x + beta * y
pub fn spmv_transpose(a: &SparseCsc, x: &[f64], y: &mut [f64], alpha: f64, beta: f64) {
    assert_eq!(a.rows(), x.len());
    assert_eq!(a.cols(), y.len());

    if beta == 0.0 {
        y.fill(0.0);
    } else if beta != 1.0 {
        for yi in y.iter_mut() {
            *yi *= beta;
        }
    }

    if alpha != 0.0 {
        for (val, (row, col)) in a.iter() {
            y[col] += alpha * (*val) * x[row];
        }
    }
}

/// y = A x for a symmetric A stored as its upper triangle.
pub fn symm_matvec_upper(a: &SparseSymmetricCsc, x: &[f64], y: &mut [f64]) {
    y.fill(0.0);
    for (val, (row, col)) in a.iter() {
        y[row] += val * x[col];
        if row != col {
            y[col] += val * x[row];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_triplets_sums_duplicates() {
        let mat = from_triplets(2, 2, vec![(0, 0, 1.0), (1, 1, 2.0), (0, 0, 3.0)]);
        assert_eq!(mat.nnz(), 2);
        let pos = nz_position(&mat, 0, 0).unwrap();
        assert_eq!(mat.data()[pos], 4.0);
        assert!(nz_position(&mat, 1, 0).is_none());
    }

    #[test]
    fn test_spmv_and_transpose() {
        // [[1, 2], [3, 4], [0, 5]]
        let mat = from_triplets(
            3,
            2,
            vec![(0, 0, 1.0), (0, 1, 2.0), (1, 0, 3.0), (1, 1, 4.0), (2, 1, 5.0)],
        );

        let mut y = vec![0.0; 3];
        spmv(&mat, &[1.0, 2.0], &mut y, 1.0, 0.0);
        assert_eq!(y, vec![5.0, 11.0, 10.0]);

        let mut z = vec![1.0; 2];
        spmv_transpose(&mat, &[1.0, 1.0, 1.0], &mut z, 2.0, 1.0);
        // 2 * [4, 11] + [1, 1]
        assert_eq!(z, vec![9.0, 23.0]);
    }

    #[test]
    fn test_symm_matvec_upper() {
        // Full matrix [[2, 1], [1, 3]] stored as upper triangle
        let mat = from_triplets(2, 2, vec![(0, 0, 2.0), (0, 1, 1.0), (1, 1, 3.0)]);
        let mut y = vec![0.0; 2];
        symm_matvec_upper(&mat, &[1.0, 1.0], &mut y);
        assert_eq!(y, vec![3.0, 4.0]);
    }
}
