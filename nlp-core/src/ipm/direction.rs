//! Newton direction from the reduced primal-dual system.

use super::iterate::SearchDirection;
use super::nlp::NlpAdapter;
use super::quantities::IterateQuantities;
use super::regularization::{Perturbation, RegularizationPolicy, RegularizationState};
use crate::linalg::backend::{make_solver, BackendError, FactorStatus, SymmetricSolver};
use crate::linalg::kkt::{KktDims, KktMatrix, KktValues};
use crate::settings::SolverSettings;

#[derive(Debug, Clone)]
pub enum DirectionOutcome {
    Computed(SearchDirection),
    /// No perturbation produced a usable factorization
    Fatal,
}

pub struct SearchDirectionSolver {
    kkt: KktMatrix,
    backend: Box<dyn SymmetricSolver>,
    policy: RegularizationPolicy,
    state: RegularizationState,
    refine_iters: usize,
    kappa_d: f64,
    /// The backend holds a factorization with the required inertia
    factored: bool,
}

impl SearchDirectionSolver {
    pub(crate) fn new(nlp: &NlpAdapter<'_>, settings: &SolverSettings) -> Result<Self, BackendError> {
        let layout = nlp.layout();
        let dims = KktDims {
            n_x: layout.n,
            n_s: layout.n_d(),
            n_c: layout.n_c(),
            n_d: layout.n_d(),
        };
        let kkt = KktMatrix::new(dims, &nlp.kkt_structure(), settings.kkt_ordering)?;
        let mut backend = make_solver(settings.linear_solver, dims.dim());
        backend.symbolic_factorization(kkt.matrix())?;
        log::debug!(
            "KKT system: dim {}, nnz {}, backend {}",
            dims.dim(),
            kkt.matrix().nnz(),
            backend.name()
        );

        Ok(Self {
            kkt,
            backend,
            policy: RegularizationPolicy::from_settings(settings),
            state: RegularizationState::default(),
            refine_iters: settings.kkt_refine_iters,
            kappa_d: settings.kappa_d,
            factored: false,
        })
    }

    pub fn regularization(&self) -> &RegularizationState {
        &self.state
    }

    /// Factor the KKT matrix at `q` (with inertia correction) and solve
    /// for the Newton direction of the barrier problem with parameter `mu`.
    pub fn compute(&mut self, q: &IterateQuantities, hess: &[f64], mu: f64) -> Result<DirectionOutcome, BackendError> {
        let sigma_x = q.sigma_x();
        let sigma_s = q.sigma_s();
        let required = self.kkt.dims().required_inertia();

        self.factored = false;
        self.state.begin();
        loop {
            self.kkt.assemble(&KktValues {
                hess,
                jac_c: &q.jac_c().values,
                jac_d: &q.jac_d().values,
                sigma_x: &sigma_x,
                sigma_s: &sigma_s,
                delta_w: self.state.delta_w,
                delta_c: self.state.delta_c,
            });

            let next = match self.backend.numeric_factorization(self.kkt.matrix())? {
                FactorStatus::Success(inertia) if inertia == required => break,
                FactorStatus::Success(inertia) => {
                    log::trace!(
                        "wrong inertia ({}, {}, {}) with δw = {:.2e}, δc = {:.2e}",
                        inertia.positive,
                        inertia.negative,
                        inertia.zero,
                        self.state.delta_w,
                        self.state.delta_c
                    );
                    if inertia.negative < required.negative && self.state.delta_c == 0.0 {
                        // Too few negative eigenvalues: the Jacobian looks rank deficient.
                        self.state.on_singular(&self.policy, mu)
                    } else {
                        self.state.on_wrong_inertia(&self.policy)
                    }
                }
                FactorStatus::Singular => {
                    log::trace!("singular KKT matrix with δw = {:.2e}, δc = {:.2e}", self.state.delta_w, self.state.delta_c);
                    self.state.on_singular(&self.policy, mu)
                }
            };

            if next == Perturbation::Fatal {
                log::debug!(
                    "no usable KKT factorization after {} trials (δw = {:.2e})",
                    self.state.trials,
                    self.state.delta_w
                );
                return Ok(DirectionOutcome::Fatal);
            }
        }
        self.state.on_success();
        self.factored = true;

        let rhs = self.rhs(q, mu, q.c(), &dms(q));
        match self.solve(q, &rhs, mu)? {
            Some(dir) => Ok(DirectionOutcome::Computed(dir)),
            None => Ok(DirectionOutcome::Fatal),
        }
    }

    /// Second-order correction: same matrix, constraint residuals replaced
    /// by `c_soc` and `dms_soc`.
    pub fn solve_soc(
        &mut self,
        q: &IterateQuantities,
        mu: f64,
        c_soc: &[f64],
        dms_soc: &[f64],
    ) -> Result<Option<SearchDirection>, BackendError> {
        if !self.factored {
            return Ok(None);
        }
        let rhs = self.rhs(q, mu, c_soc, dms_soc);
        self.solve(q, &rhs, mu)
    }

    fn rhs(&self, q: &IterateQuantities, mu: f64, c: &[f64], dms: &[f64]) -> Vec<f64> {
        let (r_x, r_s) = q.barrier_residuals(mu, self.kappa_d);
        r_x.iter()
            .chain(&r_s)
            .chain(c)
            .chain(dms)
            .map(|v| -v)
            .collect()
    }

    fn solve(&self, q: &IterateQuantities, rhs: &[f64], mu: f64) -> Result<Option<SearchDirection>, BackendError> {
        let dims = self.kkt.dims();
        let mut sol = vec![0.0; dims.dim()];
        self.kkt.solve(self.backend.as_ref(), rhs, &mut sol, self.refine_iters)?;
        if sol.iter().any(|v| !v.is_finite()) {
            log::debug!("non-finite KKT solution");
            return Ok(None);
        }
        Ok(Some(recover_direction(q, &sol, dims, mu)))
    }
}

/// d - s
fn dms(q: &IterateQuantities) -> Vec<f64> {
    q.d().iter().zip(&q.iterate().s).map(|(d, s)| d - s).collect()
}

/// Split the KKT solution and recover the bound multiplier steps
/// `dz_L = μ/S_L - z_L - Σ_L dx`, `dz_U = μ/S_U - z_U + Σ_U dx`.
fn recover_direction(q: &IterateQuantities, sol: &[f64], dims: KktDims, mu: f64) -> SearchDirection {
    let layout = q.layout();
    let it = q.iterate();
    let (dx, rest) = sol.split_at(dims.n_x);
    let (ds, rest) = rest.split_at(dims.n_s);
    let (dy_c, dy_d) = rest.split_at(dims.n_c);

    let lower = |slack: &[f64], mult: &[f64], idx: &[usize], step: &[f64]| -> Vec<f64> {
        idx.iter()
            .zip(slack.iter().zip(mult))
            .map(|(&j, (&sl, &z))| mu / sl - z - z / sl * step[j])
            .collect()
    };
    let upper = |slack: &[f64], mult: &[f64], idx: &[usize], step: &[f64]| -> Vec<f64> {
        idx.iter()
            .zip(slack.iter().zip(mult))
            .map(|(&j, (&su, &z))| mu / su - z + z / su * step[j])
            .collect()
    };

    SearchDirection {
        dz_l: lower(q.slack_x_l(), &it.z_l, &layout.x_lower, dx),
        dz_u: upper(q.slack_x_u(), &it.z_u, &layout.x_upper, dx),
        dv_l: lower(q.slack_s_l(), &it.v_l, &layout.d_lower, ds),
        dv_u: upper(q.slack_s_u(), &it.v_u, &layout.d_upper, ds),
        dx: dx.to_vec(),
        ds: ds.to_vec(),
        dy_c: dy_c.to_vec(),
        dy_d: dy_d.to_vec(),
    }
}
