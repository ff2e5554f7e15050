//! Poisson Multi-Bernoulli Mixture (PMBM) Filter
//!
//! Gaussian-mixture implementation of the PMBM filter for multi-target
//! tracking with track identities.
//!
//! # Overview
//!
//! The belief has two parts:
//! - **Poisson point process (PPP)**: objects that exist but have never
//!   been detected, as a Gaussian mixture intensity
//! - **Multi-Bernoulli mixture (MBM)**: weighted global hypotheses, each
//!   selecting one Bernoulli variant per detected track
//!
//! Every step runs:
//!
//! ```text
//! predict  ->  associate (k-best per parent)  ->  children  ->  manage  ->  extract
//! ```
//!
//! # Type Safety
//!
//! Beliefs carry a phase marker:
//!
//! ```text
//! Updated  --predict()-->  Predicted  --update()-->  Updated
//! ```
//!
//! Calling `update()` on an `Updated` belief or `predict()` on a `Predicted`
//! belief is a compile error.
//!
//! # Example
//!
//! ```
//! use pmbm::prelude::*;
//!
//! let filter = PmbmFilter::new(
//!     ConstantVelocity2D::new(1.0, 0.99),
//!     PositionSensor2D::new(1.0, 0.95),
//!     UniformClutter2D::new(1.0, (-100.0, 100.0), (-100.0, 100.0)),
//!     PmbmConfig::default_config(),
//! )
//! .unwrap();
//!
//! let birth = GaussianMixture::new().with_component(
//!     0.2,
//!     StateVector::from_array([0.0, 0.0, 0.0, 0.0]),
//!     StateCovariance::from_diagonal(&nalgebra::vector![100.0, 100.0, 4.0, 4.0]),
//! );
//! let mut belief = filter.initialize(birth).unwrap();
//!
//! for t in 0..5 {
//!     let z = Measurement::from_array([t as f64, 0.5]);
//!     let output = filter.step(&belief, &[z], 1.0).unwrap();
//!     belief = output.belief;
//! }
//!
//! let estimates = filter.extract(&belief);
//! assert_eq!(estimates.len(), 1);
//! ```
//!
//! # References
//!
//! - Williams, J. L. (2015). "Marginal multi-Bernoulli filters: RFS
//!   derivation of MHT, JIPDA, and association-based MeMBer"
//! - García-Fernández, Á. F., Williams, J. L., Granström, K., & Svensson, L.
//!   (2018). "Poisson Multi-Bernoulli Mixture Filter: Direct Derivation and
//!   Implementation"

pub mod association;
pub mod bernoulli;
pub mod config;
pub mod extraction;
pub mod filter;
pub mod hypothesis;
pub mod manager;
pub mod ppp;

pub use association::AssociationProblem;
pub use bernoulli::*;
pub use config::*;
pub use extraction::*;
pub use filter::*;
pub use hypothesis::*;
pub use manager::*;
pub use ppp::*;
