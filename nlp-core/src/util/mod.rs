//! Utility functions.
//!
//! Vector norms and small numerical helpers shared by the IPM components.

use serde::{Deserialize, Serialize};

/// Vector norm selector for residual measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Norm {
    One,
    Two,
    Max,
}

/// Streaming accumulator so block vectors can be normed without
/// concatenating them.
#[derive(Debug, Clone, Copy)]
pub struct NormAccumulator {
    norm: Norm,
    acc: f64,
}

impl NormAccumulator {
    pub fn new(norm: Norm) -> Self {
        Self { norm, acc: 0.0 }
    }

    #[inline]
    pub fn push(&mut self, v: f64) {
        if self.acc.is_nan() {
            return;
        }
        match self.norm {
            Norm::One => self.acc += v.abs(),
            Norm::Two => self.acc += v * v,
            Norm::Max => self.acc = self.acc.max(v.abs()),
        }
        // NaN must survive so callers can detect it.
        if v.is_nan() {
            self.acc = f64::NAN;
        }
    }

    pub fn extend(&mut self, values: &[f64]) {
        for &v in values {
            self.push(v);
        }
    }

    pub fn finish(self) -> f64 {
        match self.norm {
            Norm::Two => self.acc.sqrt(),
            _ => self.acc,
        }
    }
}

pub fn norm(v: &[f64], norm: Norm) -> f64 {
    let mut acc = NormAccumulator::new(norm);
    acc.extend(v);
    acc.finish()
}

#[inline]
pub fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, &x| acc.max(x.abs()))
}

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(ai, bi)| ai * bi).sum()
}

/// y += alpha * x
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}
