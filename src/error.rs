//! Error types for the PMBM tracker

use thiserror::Error;

/// Errors produced by the PMBM recursion and its building blocks.
///
/// Only [`PmbmError::Configuration`] is fatal at construction time. The
/// numerical and association variants are normally recovered inside a step
/// and only surface through [`StepStats`](crate::types::phase::StepStats);
/// they reach the caller when a step cannot be completed at all, in which
/// case the prior belief is left untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PmbmError {
    /// A threshold, probability or capacity is outside its valid range.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A covariance that must be positive definite was not.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    /// The ranked-assignment solver found no feasible assignment.
    #[error("no feasible association for {tracks} tracks and {measurements} measurements")]
    InfeasibleAssociation {
        /// Number of tracks in the parent hypothesis
        tracks: usize,
        /// Number of measurements in the scan
        measurements: usize,
    },

    /// A measurement contains NaN or infinite components.
    #[error("measurement {index} contains non-finite values")]
    InvalidMeasurement {
        /// Position of the offending measurement in the scan
        index: usize,
    },

    /// Row-major data does not match the requested matrix shape.
    #[error("cost data of length {len} does not fit a {rows}x{cols} matrix")]
    DimensionMismatch {
        /// Length of the provided data
        len: usize,
        /// Requested rows
        rows: usize,
        /// Requested columns
        cols: usize,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, PmbmError>;
