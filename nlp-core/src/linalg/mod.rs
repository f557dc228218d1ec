//! Linear algebra layer.
//!
//! Sparse matrix helpers, KKT matrix assembly and the symmetric indefinite
//! factorization backends that report inertia.

pub mod backend;
pub mod dense;
pub mod kkt;
pub mod ldl;
pub mod sparse;
