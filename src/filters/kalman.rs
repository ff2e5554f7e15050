//! Kalman kernel for Gaussian components
//!
//! Binds a transition model and an observation model to the matrix-level
//! predict and update of [`GaussianState`]. Every density in the PMBM filter
//! (undetected-object components and Bernoulli tracks) goes through here.
//!
//! For linear models this is the standard Kalman filter. Nonlinear models
//! supply their own state/measurement functions and Jacobians, which turns
//! the kernel into an extended Kalman filter.
//!
//! # Example
//!
//! ```
//! use pmbm::filters::kalman::KalmanFilter;
//! use pmbm::models::{ConstantVelocity2D, PositionSensor2D};
//! use pmbm::types::gaussian::GaussianState;
//! use pmbm::types::spaces::{StateVector, StateCovariance, Measurement};
//!
//! let filter: KalmanFilter<f64, _, _, 4, 2> = KalmanFilter::new(
//!     ConstantVelocity2D::new(1.0, 0.99),
//!     PositionSensor2D::new(5.0, 0.95),
//! );
//!
//! let prior = GaussianState::with_unit_weight(
//!     StateVector::from_array([0.0, 0.0, 1.0, 0.0]),
//!     StateCovariance::from_diagonal(&nalgebra::vector![10.0, 10.0, 1.0, 1.0]),
//! );
//!
//! let predicted = filter.predict(&prior, 1.0);
//! let updated = filter.update(&predicted, &Measurement::from_array([1.5, 0.2])).unwrap();
//! assert!(updated.state.covariance.trace() < predicted.covariance.trace());
//! ```

use core::marker::PhantomData;

use nalgebra::RealField;

use crate::error::Result;
use crate::models::{ObservationModel, TransitionModel};
use crate::types::gaussian::{GaussianState, GaussianUpdate};
use crate::types::spaces::{Measurement, StateVector};

// ============================================================================
// Kalman Filter
// ============================================================================

/// A discrete-time (extended) Kalman filter over weighted Gaussian components.
///
/// # Type Parameters
///
/// - `T`: Scalar type
/// - `Trans`: Transition model type
/// - `Obs`: Observation model type
/// - `N`: State dimension
/// - `M`: Measurement dimension
#[derive(Debug, Clone)]
pub struct KalmanFilter<T, Trans, Obs, const N: usize, const M: usize>
where
    T: RealField + Copy,
    Trans: TransitionModel<T, N>,
    Obs: ObservationModel<T, N, M>,
{
    /// Transition (motion) model
    pub transition: Trans,
    /// Observation (sensor) model
    pub observation: Obs,
    /// Phantom marker for scalar type
    _marker: PhantomData<T>,
}

impl<T, Trans, Obs, const N: usize, const M: usize> KalmanFilter<T, Trans, Obs, N, M>
where
    T: RealField + Copy,
    Trans: TransitionModel<T, N>,
    Obs: ObservationModel<T, N, M>,
{
    /// Creates a new Kalman filter with the given models.
    #[inline]
    pub fn new(transition: Trans, observation: Obs) -> Self {
        Self {
            transition,
            observation,
            _marker: PhantomData,
        }
    }

    /// Performs the prediction step.
    ///
    /// - x_pred = f(x)
    /// - P_pred = F * P * F^T + Q, with F the transition Jacobian at x
    ///
    /// The component weight is left unchanged.
    pub fn predict(&self, component: &GaussianState<T, N>, dt: T) -> GaussianState<T, N> {
        let f = self.transition.transition_matrix(&component.mean, dt);
        let q = self.transition.process_noise(dt);
        let predicted_mean = self.transition.predict_state(&component.mean, dt);

        component.predict_linearized(predicted_mean, &f, &q)
    }

    /// Performs the update step with a measurement.
    ///
    /// - y = z - h(x) (innovation)
    /// - S = H * P * H^T + R (innovation covariance)
    /// - K = P * H^T * S^{-1} (Kalman gain)
    /// - x_upd = x + K * y
    /// - P_upd = (I - K*H) * P * (I - K*H)^T + K * R * K^T (Joseph form)
    ///
    /// Also returns the log-likelihood ln N(z; h(x), S) and the squared
    /// Mahalanobis distance of the innovation.
    ///
    /// # Errors
    ///
    /// Returns [`PmbmError::NumericalInstability`](crate::PmbmError::NumericalInstability)
    /// if S is not positive definite.
    pub fn update(
        &self,
        component: &GaussianState<T, N>,
        measurement: &Measurement<T, M>,
    ) -> Result<GaussianUpdate<T, N>> {
        let h = self.observation.observation_matrix(&component.mean);
        let r = self.observation.measurement_noise();
        let predicted_measurement = self.observation.predict_measurement(&component.mean);

        component.update(measurement, predicted_measurement, &h, &r)
    }

    /// Probability that an object at `state` survives one step.
    #[inline]
    pub fn survival_probability(&self, state: &StateVector<T, N>) -> T {
        self.transition.survival_probability(state)
    }

    /// Probability that an object at `state` is detected.
    #[inline]
    pub fn detection_probability(&self, state: &StateVector<T, N>) -> T {
        self.observation.detection_probability(state)
    }
}
