//! Tracking filters
//!
//! - [`kalman::KalmanFilter`]: (Extended) Kalman kernel for Gaussian components
//! - [`pmbm`]: Poisson Multi-Bernoulli Mixture filter

pub mod kalman;
pub mod pmbm;
