//! Starting point.
//!
//! The user's x0 is moved strictly inside the (relaxed) bounds, slacks start
//! at d(x0) pushed inside their bounds, and the multipliers come either from
//! the problem or from `bound_mult_init_val`.

use super::iterate::Iterate;
use super::nlp::{NlpAdapter, ProblemLayout};
use super::quantities::IterateQuantities;
use crate::problem::EvalResult;
use crate::settings::SolverSettings;

/// Move `value` into the interior of `[lower, upper]`.
///
/// The margin to a finite bound `b` is `push * max(1, |b|)`, limited to
/// `frac` of the interval width when both bounds are finite.
pub fn push_into_interior(value: f64, lower: f64, upper: f64, push: f64, frac: f64) -> f64 {
    match (lower.is_finite(), upper.is_finite()) {
        (true, true) => {
            let width = upper - lower;
            let lo = lower + (push * lower.abs().max(1.0)).min(frac * width);
            let hi = upper - (push * upper.abs().max(1.0)).min(frac * width);
            if lo >= hi {
                0.5 * (lower + upper)
            } else {
                value.clamp(lo, hi)
            }
        }
        (true, false) => value.max(lower + push * lower.abs().max(1.0)),
        (false, true) => value.min(upper - push * upper.abs().max(1.0)),
        (false, false) => value,
    }
}

/// Builds the first iterate of a solve.
pub struct IterateInitializer<'a> {
    settings: &'a SolverSettings,
    keep_interior: bool,
}

impl<'a> IterateInitializer<'a> {
    pub fn new(settings: &'a SolverSettings) -> Self {
        Self {
            settings,
            keep_interior: false,
        }
    }

    /// Leave components of x0 that are already strictly inside their bounds
    /// untouched.
    pub fn keep_interior(mut self, keep: bool) -> Self {
        self.keep_interior = keep;
        self
    }

    pub(crate) fn initialize(&self, nlp: &mut NlpAdapter<'_>) -> EvalResult<IterateQuantities> {
        let layout = nlp.layout().clone();
        let (push, frac) = (self.settings.bound_push, self.settings.bound_frac);

        let mut x = nlp.initial_point();
        for (j, xj) in x.iter_mut().enumerate() {
            let (lo, hi) = (layout.x_l[j], layout.x_u[j]);
            if self.keep_interior && lo < *xj && *xj < hi {
                continue;
            }
            *xj = push_into_interior(*xj, lo, hi, push, frac);
        }

        let f = nlp.eval_f(&x)?;
        let (c, d) = nlp.eval_c_d(&x)?;
        let s: Vec<f64> = d
            .iter()
            .enumerate()
            .map(|(k, &dk)| push_into_interior(dk, layout.d_l[k], layout.d_u[k], push, frac))
            .collect();

        let iterate = self.initial_multipliers(nlp, &layout, x, s);
        IterateQuantities::from_trial(nlp, iterate, f, c, d)
    }

    fn initial_multipliers(&self, nlp: &NlpAdapter<'_>, layout: &ProblemLayout, x: Vec<f64>, s: Vec<f64>) -> Iterate {
        let init = self.settings.bound_mult_init_val;
        let positive_or_default = |v: f64| if v > 0.0 && v.is_finite() { v } else { init };

        let mut iterate = Iterate {
            x,
            s,
            y_c: vec![0.0; layout.n_c()],
            y_d: vec![0.0; layout.n_d()],
            z_l: vec![init; layout.x_lower.len()],
            z_u: vec![init; layout.x_upper.len()],
            v_l: vec![init; layout.d_lower.len()],
            v_u: vec![init; layout.d_upper.len()],
        };

        if let Some((lambda, z_l, z_u)) = nlp.initial_multipliers() {
            if lambda.len() == layout.m && z_l.len() == layout.n && z_u.len() == layout.n {
                let (y_c, y_d) = layout.split_lambda(&lambda);
                iterate.y_c = y_c;
                iterate.y_d = y_d;
                iterate.z_l = layout.x_lower.iter().map(|&j| positive_or_default(z_l[j])).collect();
                iterate.z_u = layout.x_upper.iter().map(|&j| positive_or_default(z_u[j])).collect();
            } else {
                log::warn!("ignoring initial multipliers with mismatched lengths");
            }
        }
        iterate
    }
}
