//! Model traits for multi-target tracking
//!
//! This module defines the core traits that describe target dynamics,
//! sensor characteristics and clutter. Birth is supplied as a plain
//! [`GaussianMixture`](crate::types::gaussian::GaussianMixture).

mod transition;
mod observation;
mod clutter;

pub use transition::*;
pub use observation::*;
pub use clutter::*;
