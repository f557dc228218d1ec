//! Barrier KKT matrix assembly.
//!
//! The reduced primal-dual system solved at every iteration is
//!
//! ```text
//! [ W + Σx + δw I       0            Jcᵀ       Jdᵀ   ] [dx ]
//! [ 0              Σs + δw I          0        -I    ] [ds ]
//! [ Jc                  0          -δc I        0    ] [dyc]
//! [ Jd                 -I             0       -δc I  ] [dyd]
//! ```
//!
//! The sparsity structure is fixed for a solve. It is built once, permuted
//! with a CAMD fill-reducing ordering, and every source entry (Hessian,
//! Jacobian, diagonal) gets a precomputed slot in the CSC data array so that
//! refactorizations with a different perturbation only rewrite values.

use super::backend::{BackendError, Inertia, SymmetricSolver};
use super::sparse::{nz_position, symm_matvec_upper, SparseSymmetricCsc};
use sprs::TriMat;
use sprs_suitesparse_camd::try_camd;

/// Block sizes of the KKT system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KktDims {
    pub n_x: usize,
    pub n_s: usize,
    pub n_c: usize,
    pub n_d: usize,
}

impl KktDims {
    pub fn dim(&self) -> usize {
        self.n_x + self.n_s + self.n_c + self.n_d
    }

    /// Inertia of a KKT matrix whose direction is a descent direction.
    pub fn required_inertia(&self) -> Inertia {
        Inertia::new(self.n_x + self.n_s, self.n_c + self.n_d, 0)
    }

    fn s_offset(&self) -> usize {
        self.n_x
    }

    fn c_offset(&self) -> usize {
        self.n_x + self.n_s
    }

    fn d_offset(&self) -> usize {
        self.n_x + self.n_s + self.n_c
    }
}

/// Sparsity of the derivative blocks feeding the KKT matrix.
#[derive(Debug, Clone, Default)]
pub struct KktStructure {
    /// Hessian of the Lagrangian, lower triangle (row >= col)
    pub hess: Vec<(usize, usize)>,
    /// Jacobian of the equality constraints (row within c, col)
    pub jac_c: Vec<(usize, usize)>,
    /// Jacobian of the inequality constraints (row within d, col)
    pub jac_d: Vec<(usize, usize)>,
}

/// Values for one numeric assembly.
pub struct KktValues<'a> {
    pub hess: &'a [f64],
    pub jac_c: &'a [f64],
    pub jac_d: &'a [f64],
    pub sigma_x: &'a [f64],
    pub sigma_s: &'a [f64],
    pub delta_w: f64,
    pub delta_c: f64,
}

pub struct KktMatrix {
    dims: KktDims,
    mat: SparseSymmetricCsc,

    /// Fill-reducing permutation (new index -> old index)
    perm: Option<Vec<usize>>,

    /// Inverse permutation (old index -> new index)
    perm_inv: Option<Vec<usize>>,

    hess_pos: Vec<usize>,
    jac_c_pos: Vec<usize>,
    jac_d_pos: Vec<usize>,
    slack_pos: Vec<usize>,
    diag_pos: Vec<usize>,
}

impl KktMatrix {
    /// Build the structure, compute the ordering and locate every slot.
    pub fn new(dims: KktDims, structure: &KktStructure, use_ordering: bool) -> Result<Self, BackendError> {
        let unpermuted = Self::build_pattern(dims, structure, None);
        let (perm, perm_inv) = if use_ordering && dims.dim() > 1 {
            let perm = try_camd(unpermuted.structure_view())
                .map_err(|e| BackendError::Ordering(e.to_string()))?;
            let (p, p_inv) = (perm.vec(), perm.inv_vec());
            if p.iter().enumerate().all(|(i, &pi)| i == pi) {
                (None, None)
            } else {
                (Some(p), Some(p_inv))
            }
        } else {
            (None, None)
        };

        let mat = match &perm_inv {
            Some(p_inv) => Self::build_pattern(dims, structure, Some(p_inv)),
            None => unpermuted,
        };

        let mut kkt = Self {
            dims,
            mat,
            perm,
            perm_inv,
            hess_pos: Vec::with_capacity(structure.hess.len()),
            jac_c_pos: Vec::with_capacity(structure.jac_c.len()),
            jac_d_pos: Vec::with_capacity(structure.jac_d.len()),
            slack_pos: Vec::with_capacity(dims.n_d),
            diag_pos: Vec::with_capacity(dims.dim()),
        };

        for &(i, j) in &structure.hess {
            let pos = kkt.locate(i, j)?;
            kkt.hess_pos.push(pos);
        }
        for &(row, col) in &structure.jac_c {
            let pos = kkt.locate(col, dims.c_offset() + row)?;
            kkt.jac_c_pos.push(pos);
        }
        for &(row, col) in &structure.jac_d {
            let pos = kkt.locate(col, dims.d_offset() + row)?;
            kkt.jac_d_pos.push(pos);
        }
        for i in 0..dims.n_d {
            let pos = kkt.locate(dims.s_offset() + i, dims.d_offset() + i)?;
            kkt.slack_pos.push(pos);
        }
        for i in 0..dims.dim() {
            let pos = kkt.locate(i, i)?;
            kkt.diag_pos.push(pos);
        }

        Ok(kkt)
    }

    fn build_pattern(dims: KktDims, structure: &KktStructure, perm_inv: Option<&[usize]>) -> SparseSymmetricCsc {
        let n = dims.dim();
        let mut tri = TriMat::new((n, n));
        let map_index = |idx: usize| perm_inv.map_or(idx, |p| p[idx]);
        let mut add = |row: usize, col: usize| {
            let r = map_index(row);
            let c = map_index(col);
            if r <= c {
                tri.add_triplet(r, c, 0.0);
            } else {
                tri.add_triplet(c, r, 0.0);
            }
        };

        for &(i, j) in &structure.hess {
            add(i, j);
        }
        for &(row, col) in &structure.jac_c {
            add(col, dims.c_offset() + row);
        }
        for &(row, col) in &structure.jac_d {
            add(col, dims.d_offset() + row);
        }
        for i in 0..dims.n_d {
            add(dims.s_offset() + i, dims.d_offset() + i);
        }
        // Every diagonal entry must exist so perturbations can be applied.
        for i in 0..n {
            add(i, i);
        }

        tri.to_csc()
    }

    fn locate(&self, row: usize, col: usize) -> Result<usize, BackendError> {
        let map_index = |idx: usize| self.perm_inv.as_ref().map_or(idx, |p| p[idx]);
        let (r, c) = (map_index(row), map_index(col));
        let (r, c) = if r <= c { (r, c) } else { (c, r) };
        nz_position(&self.mat, r, c)
            .ok_or_else(|| BackendError::Message(format!("KKT entry ({}, {}) missing from pattern", row, col)))
    }

    pub fn dims(&self) -> KktDims {
        self.dims
    }

    /// The assembled (permuted) upper-triangular matrix.
    pub fn matrix(&self) -> &SparseSymmetricCsc {
        &self.mat
    }

    /// Overwrite all values of the matrix.
    pub fn assemble(&mut self, values: &KktValues<'_>) {
        let dims = self.dims;
        debug_assert_eq!(values.hess.len(), self.hess_pos.len());
        debug_assert_eq!(values.jac_c.len(), self.jac_c_pos.len());
        debug_assert_eq!(values.jac_d.len(), self.jac_d_pos.len());

        let data = self.mat.data_mut();
        data.fill(0.0);

        for (&pos, &v) in self.hess_pos.iter().zip(values.hess) {
            data[pos] += v;
        }
        for (&pos, &v) in self.jac_c_pos.iter().zip(values.jac_c) {
            data[pos] += v;
        }
        for (&pos, &v) in self.jac_d_pos.iter().zip(values.jac_d) {
            data[pos] += v;
        }
        for &pos in &self.slack_pos {
            data[pos] = -1.0;
        }

        for i in 0..dims.n_x {
            data[self.diag_pos[i]] += values.sigma_x[i] + values.delta_w;
        }
        for i in 0..dims.n_s {
            data[self.diag_pos[dims.s_offset() + i]] += values.sigma_s[i] + values.delta_w;
        }
        for i in 0..(dims.n_c + dims.n_d) {
            data[self.diag_pos[dims.c_offset() + i]] -= values.delta_c;
        }
    }

    /// Solve K sol = rhs in the original ordering, refining against the
    /// assembled matrix.
    pub fn solve(
        &self,
        solver: &dyn SymmetricSolver,
        rhs: &[f64],
        sol: &mut [f64],
        refine_iters: usize,
    ) -> Result<(), BackendError> {
        let n = self.dims.dim();
        if rhs.len() != n || sol.len() != n {
            return Err(BackendError::DimensionMismatch {
                expected: n,
                actual: rhs.len(),
            });
        }

        let mut rhs_perm = vec![0.0; n];
        match &self.perm {
            Some(p) => {
                for (i, &src) in p.iter().enumerate() {
                    rhs_perm[i] = rhs[src];
                }
            }
            None => rhs_perm.copy_from_slice(rhs),
        }

        let mut sol_perm = vec![0.0; n];
        solver.solve(&rhs_perm, &mut sol_perm)?;

        if refine_iters > 0 {
            let rhs_norm = rhs_perm.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
            let mut kx = vec![0.0; n];
            let mut res = vec![0.0; n];
            let mut delta = vec![0.0; n];
            for _ in 0..refine_iters {
                symm_matvec_upper(&self.mat, &sol_perm, &mut kx);
                let mut res_norm = 0.0_f64;
                for i in 0..n {
                    res[i] = rhs_perm[i] - kx[i];
                    res_norm = res_norm.max(res[i].abs());
                }
                if !res_norm.is_finite() || res_norm <= 1e-14 * (1.0 + rhs_norm) {
                    break;
                }
                solver.solve(&res, &mut delta)?;
                for i in 0..n {
                    sol_perm[i] += delta[i];
                }
            }
        }

        match &self.perm_inv {
            Some(p_inv) => {
                for i in 0..n {
                    sol[i] = sol_perm[p_inv[i]];
                }
            }
            None => sol.copy_from_slice(&sol_perm),
        }
        Ok(())
    }
}
