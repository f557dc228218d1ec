//! Primal-dual iterate and search direction.

use crate::util::{norm, Norm};

/// Primal-dual point `(x, s, y_c, y_d, z_L, z_U, v_L, v_U)`.
///
/// Bound multipliers are stored compressed: `z_l[k]` belongs to the
/// variable `layout.x_lower[k]`, `v_l[k]` to the inequality
/// `layout.d_lower[k]`, and likewise for the upper bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Iterate {
    pub x: Vec<f64>,
    pub s: Vec<f64>,
    pub y_c: Vec<f64>,
    pub y_d: Vec<f64>,
    pub z_l: Vec<f64>,
    pub z_u: Vec<f64>,
    pub v_l: Vec<f64>,
    pub v_u: Vec<f64>,
}

/// Newton direction for every component of an [`Iterate`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDirection {
    pub dx: Vec<f64>,
    pub ds: Vec<f64>,
    pub dy_c: Vec<f64>,
    pub dy_d: Vec<f64>,
    pub dz_l: Vec<f64>,
    pub dz_u: Vec<f64>,
    pub dv_l: Vec<f64>,
    pub dv_u: Vec<f64>,
}

fn stepped(v: &[f64], dv: &[f64], alpha: f64) -> Vec<f64> {
    v.iter().zip(dv).map(|(vi, di)| vi + alpha * di).collect()
}

impl Iterate {
    /// Primal trial point `(x + α dx, s + α ds)`.
    pub fn primal_trial(&self, dir: &SearchDirection, alpha: f64) -> (Vec<f64>, Vec<f64>) {
        (stepped(&self.x, &dir.dx, alpha), stepped(&self.s, &dir.ds, alpha))
    }

    /// New iterate from an accepted primal trial. Equality and inequality
    /// multipliers move with the primal step size, bound multipliers with
    /// the dual one.
    pub fn accept(
        &self,
        x: Vec<f64>,
        s: Vec<f64>,
        dir: &SearchDirection,
        alpha_primal: f64,
        alpha_dual: f64,
    ) -> Iterate {
        Iterate {
            x,
            s,
            y_c: stepped(&self.y_c, &dir.dy_c, alpha_primal),
            y_d: stepped(&self.y_d, &dir.dy_d, alpha_primal),
            z_l: stepped(&self.z_l, &dir.dz_l, alpha_dual),
            z_u: stepped(&self.z_u, &dir.dz_u, alpha_dual),
            v_l: stepped(&self.v_l, &dir.dv_l, alpha_dual),
            v_u: stepped(&self.v_u, &dir.dv_u, alpha_dual),
        }
    }

    /// Largest α in (0, 1] keeping every bound multiplier above (1 - τ)
    /// of its current value.
    pub fn dual_fraction_to_boundary(&self, dir: &SearchDirection, tau: f64) -> f64 {
        let mut alpha = 1.0_f64;
        for (v, dv) in [
            (&self.z_l, &dir.dz_l),
            (&self.z_u, &dir.dz_u),
            (&self.v_l, &dir.dv_l),
            (&self.v_u, &dir.dv_u),
        ] {
            alpha = alpha.min(fraction_to_boundary(tau, v, dv));
        }
        alpha
    }
}

impl SearchDirection {
    /// Max norm of the primal part `(dx, ds)`.
    pub fn primal_norm_max(&self) -> f64 {
        norm(&self.dx, Norm::Max).max(norm(&self.ds, Norm::Max))
    }
}

/// Largest α in (0, 1] with `v + α dv >= (1 - τ) v`, for positive `v`.
pub fn fraction_to_boundary(tau: f64, v: &[f64], dv: &[f64]) -> f64 {
    let mut alpha = 1.0_f64;
    for (&vi, &di) in v.iter().zip(dv) {
        if di < 0.0 {
            alpha = alpha.min(-tau * vi / di);
        }
    }
    alpha
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direction(dz: f64) -> SearchDirection {
        SearchDirection {
            dx: vec![1.0],
            ds: vec![],
            dy_c: vec![2.0],
            dy_d: vec![],
            dz_l: vec![dz],
            dz_u: vec![],
            dv_l: vec![],
            dv_u: vec![],
        }
    }

    #[test]
    fn test_fraction_to_boundary() {
        assert_eq!(fraction_to_boundary(0.99, &[1.0, 2.0], &[1.0, 1.0]), 1.0);
        let alpha = fraction_to_boundary(0.99, &[1.0, 2.0], &[-2.0, -1.0]);
        assert!((alpha - 0.495).abs() < 1e-15);
        assert_eq!(fraction_to_boundary(0.99, &[], &[]), 1.0);
    }

    #[test]
    fn test_accept_uses_separate_step_sizes() {
        let it = Iterate {
            x: vec![0.0],
            s: vec![],
            y_c: vec![1.0],
            y_d: vec![],
            z_l: vec![1.0],
            z_u: vec![],
            v_l: vec![],
            v_u: vec![],
        };
        let dir = direction(-4.0);
        let alpha_du = it.dual_fraction_to_boundary(&dir, 0.99);
        assert!((alpha_du - 0.2475).abs() < 1e-15);

        let (x, s) = it.primal_trial(&dir, 0.5);
        let next = it.accept(x, s, &dir, 0.5, alpha_du);
        assert_eq!(next.x, vec![0.5]);
        assert_eq!(next.y_c, vec![2.0]);
        assert!((next.z_l[0] - 0.01).abs() < 1e-15);
        assert_eq!(dir.primal_norm_max(), 1.0);
    }
}
