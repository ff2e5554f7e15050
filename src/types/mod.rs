//! Core types for type-safe vector spaces and transformations

pub mod gaussian;
pub mod labels;
pub mod phase;
pub mod spaces;
pub mod transforms;
