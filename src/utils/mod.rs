//! Utility functions for multi-target tracking
//!
//! Component pruning, merging, and log-domain weight arithmetic.

mod pruning;

pub use pruning::*;
