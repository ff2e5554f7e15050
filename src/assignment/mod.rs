//! Assignment problem solvers
//!
//! Optimal and k-best assignment between tracks and measurements.

pub mod hungarian;
pub mod traits;

pub use hungarian::*;
pub use traits::*;
