//! PMBM: Poisson Multi-Bernoulli Mixture tracking for Rust
//!
//! A type-safe, Gaussian-mixture implementation of the PMBM multi-target
//! tracking filter.
//!
//! # Features
//!
//! - **Type Safety**: Vector spaces and filter phases encoded in the type system
//! - **Compile-Time Checks**: Dimension mismatches caught at compile time
//! - **Track Continuity**: Persistent track identities across steps
//! - **Pluggable Association**: k-best ranked assignment behind a narrow trait
//! - **Optional Parallelism**: Child hypotheses generated on the rayon pool
//!   with the `rayon` feature
//!
//! The library logs through the [`log`] facade and never installs a logger.

pub mod assignment;
pub mod error;
pub mod filters;
pub mod models;
pub mod types;
pub mod utils;

pub use error::{PmbmError, Result};

pub mod prelude {
    pub use crate::assignment::{AssignmentRanker, MurtyRanker};
    pub use crate::error::{PmbmError, Result};
    pub use crate::filters::kalman::*;
    pub use crate::filters::pmbm::*;
    pub use crate::models::*;
    pub use crate::types::gaussian::*;
    pub use crate::types::labels::*;
    pub use crate::types::phase::*;
    pub use crate::types::spaces::*;
    pub use crate::types::transforms::*;
}
