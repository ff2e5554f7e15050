//! Gaussian components and mixtures
//!
//! This module provides weighted Gaussian components for representing
//! probability density functions in multi-target tracking, together with
//! the matrix-level Kalman predict and update used by every density in the
//! crate.

use nalgebra::RealField;

use crate::error::{PmbmError, Result};

use super::spaces::{Measurement, MeasurementCovariance, StateCovariance, StateVector};
use super::transforms::{InnovationFactor, ObservationMatrix, TransitionMatrix};

// ============================================================================
// Gaussian State
// ============================================================================

/// A weighted Gaussian component representing a target state estimate.
///
/// In the undetected-object density the weight is an expected object count;
/// inside a Bernoulli track the weight is unused and kept at one.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GaussianState<T: RealField, const N: usize> {
    /// Weight (expected object count in the PPP)
    pub weight: T,
    /// Mean state vector
    pub mean: StateVector<T, N>,
    /// State covariance matrix
    pub covariance: StateCovariance<T, N>,
}

/// Result of a Kalman measurement update.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianUpdate<T: RealField, const N: usize> {
    /// Posterior component (weight carried over from the prior)
    pub state: GaussianState<T, N>,
    /// Log of N(z; z_hat, S)
    pub log_likelihood: T,
    /// Squared Mahalanobis distance of the innovation under S
    pub mahalanobis_squared: T,
}

impl<T: RealField + Copy, const N: usize> GaussianUpdate<T, N> {
    /// Measurement likelihood N(z; z_hat, S).
    #[inline]
    pub fn likelihood(&self) -> T {
        self.log_likelihood.exp()
    }
}

impl<T: RealField + Copy, const N: usize> GaussianState<T, N> {
    /// Creates a new Gaussian component.
    #[inline]
    pub fn new(weight: T, mean: StateVector<T, N>, covariance: StateCovariance<T, N>) -> Self {
        Self {
            weight,
            mean,
            covariance,
        }
    }

    /// Creates a Gaussian with unit weight.
    #[inline]
    pub fn with_unit_weight(mean: StateVector<T, N>, covariance: StateCovariance<T, N>) -> Self {
        Self {
            weight: T::one(),
            mean,
            covariance,
        }
    }

    /// Scales the weight of this component.
    #[inline]
    pub fn scale_weight(&self, factor: T) -> Self {
        Self {
            weight: self.weight * factor,
            mean: self.mean,
            covariance: self.covariance,
        }
    }

    /// Returns a copy with the given weight.
    #[inline]
    pub fn with_weight(&self, weight: T) -> Self {
        Self {
            weight,
            mean: self.mean,
            covariance: self.covariance,
        }
    }

    /// Predicts this Gaussian through a linear transition model.
    #[inline]
    pub fn predict(
        &self,
        transition: &TransitionMatrix<T, N>,
        process_noise: &StateCovariance<T, N>,
    ) -> Self {
        let predicted_mean = transition.apply_state(&self.mean);
        self.predict_linearized(predicted_mean, transition, process_noise)
    }

    /// Predicts this Gaussian given an already propagated mean and the
    /// Jacobian of the transition at the prior mean.
    ///
    /// Covers both linear models (`mean = F x`) and extended-Kalman
    /// prediction through a nonlinear transition.
    pub fn predict_linearized(
        &self,
        predicted_mean: StateVector<T, N>,
        jacobian: &TransitionMatrix<T, N>,
        process_noise: &StateCovariance<T, N>,
    ) -> Self {
        let predicted_cov = jacobian
            .propagate_covariance(&self.covariance)
            .add(process_noise)
            .symmetrize();

        Self {
            weight: self.weight,
            mean: predicted_mean,
            covariance: predicted_cov,
        }
    }

    /// Updates this Gaussian with a measurement using the Kalman filter equations.
    ///
    /// `predicted_measurement` is `h(mean)`; for linear sensors it equals
    /// `H * mean`. The covariance is updated in Joseph form.
    ///
    /// # Errors
    ///
    /// Returns [`PmbmError::NumericalInstability`] if the innovation
    /// covariance is not positive definite.
    pub fn update<const M: usize>(
        &self,
        measurement: &Measurement<T, M>,
        predicted_measurement: Measurement<T, M>,
        obs_matrix: &ObservationMatrix<T, M, N>,
        meas_noise: &MeasurementCovariance<T, M>,
    ) -> Result<GaussianUpdate<T, N>> {
        let innovation = measurement.innovation(&predicted_measurement);
        let innovation_cov = obs_matrix.innovation_covariance(&self.covariance, meas_noise);

        let factor = InnovationFactor::new(&innovation_cov).ok_or_else(|| {
            PmbmError::NumericalInstability("innovation covariance is not positive definite".into())
        })?;
        let (log_likelihood, mahalanobis_squared) = factor.log_density(&innovation);

        let kalman_gain = factor.gain(&self.covariance, obs_matrix);
        let updated_mean = self.mean + kalman_gain.correct(&innovation);
        let updated_cov = kalman_gain.joseph_covariance(&self.covariance, obs_matrix, meas_noise);

        if !updated_mean.is_finite() || !updated_cov.is_finite() {
            return Err(PmbmError::NumericalInstability(
                "kalman update produced non-finite state".into(),
            ));
        }

        Ok(GaussianUpdate {
            state: Self {
                weight: self.weight,
                mean: updated_mean,
                covariance: updated_cov,
            },
            log_likelihood,
            mahalanobis_squared,
        })
    }
}

// ============================================================================
// Gaussian Mixture
// ============================================================================

/// A Gaussian mixture representing a multi-modal intensity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GaussianMixture<T: RealField, const N: usize> {
    /// The Gaussian components
    pub components: Vec<GaussianState<T, N>>,
}

impl<T: RealField + Copy, const N: usize> GaussianMixture<T, N> {
    /// Creates an empty mixture.
    #[inline]
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Creates a mixture with the given capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            components: Vec::with_capacity(capacity),
        }
    }

    /// Creates a mixture from a vector of components.
    #[inline]
    pub fn from_components(components: Vec<GaussianState<T, N>>) -> Self {
        Self { components }
    }

    /// Returns the number of components.
    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if the mixture is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Adds a component to the mixture.
    #[inline]
    pub fn push(&mut self, component: GaussianState<T, N>) {
        self.components.push(component);
    }

    /// Builder-style variant of [`push`](Self::push).
    pub fn with_component(
        mut self,
        weight: T,
        mean: StateVector<T, N>,
        covariance: StateCovariance<T, N>,
    ) -> Self {
        self.components
            .push(GaussianState::new(weight, mean, covariance));
        self
    }

    /// Extends the mixture with components from an iterator.
    #[inline]
    pub fn extend<I: IntoIterator<Item = GaussianState<T, N>>>(&mut self, iter: I) {
        self.components.extend(iter);
    }

    /// Returns the total weight (expected number of objects).
    pub fn total_weight(&self) -> T {
        self.components
            .iter()
            .fold(T::zero(), |acc, c| acc + c.weight)
    }

    /// Iterates over the components.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &GaussianState<T, N>> {
        self.components.iter()
    }
}

impl<T: RealField + Copy, const N: usize> Default for GaussianMixture<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cv_transition(dt: f64) -> TransitionMatrix<f64, 4> {
        TransitionMatrix::from_matrix(nalgebra::matrix![
            1.0, 0.0, dt, 0.0;
            0.0, 1.0, 0.0, dt;
            0.0, 0.0, 1.0, 0.0;
            0.0, 0.0, 0.0, 1.0
        ])
    }

    fn position_observation() -> ObservationMatrix<f64, 2, 4> {
        ObservationMatrix::from_matrix(nalgebra::matrix![
            1.0, 0.0, 0.0, 0.0;
            0.0, 1.0, 0.0, 0.0
        ])
    }

    #[test]
    fn test_gaussian_state_creation() {
        let mean: StateVector<f64, 4> = StateVector::from_array([0.0, 0.0, 1.0, 0.0]);
        let cov: StateCovariance<f64, 4> = StateCovariance::identity();

        let gs = GaussianState::new(0.5, mean, cov);
        assert!((gs.weight - 0.5).abs() < 1e-10);
        assert!((gs.scale_weight(2.0).weight - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_gaussian_predict() {
        let mean: StateVector<f64, 4> = StateVector::from_array([0.0, 0.0, 1.0, 2.0]);
        let cov: StateCovariance<f64, 4> = StateCovariance::identity();
        let gs = GaussianState::new(1.0, mean, cov);

        let q = StateCovariance::from_matrix(nalgebra::SMatrix::<f64, 4, 4>::identity().scale(0.01));
        let predicted = gs.predict(&cv_transition(1.0), &q);

        assert!((predicted.mean.index(0) - 1.0).abs() < 1e-10);
        assert!((predicted.mean.index(1) - 2.0).abs() < 1e-10);
        assert!(predicted.covariance.trace() > gs.covariance.trace());
        assert!(predicted.covariance.is_symmetric(1e-12));
    }

    #[test]
    fn test_gaussian_update_moves_toward_measurement() {
        let gs = GaussianState::new(
            1.0,
            StateVector::from_array([0.0, 0.0, 0.0, 0.0]),
            StateCovariance::identity().scale(10.0),
        );
        let h = position_observation();
        let r = MeasurementCovariance::identity();
        let z = Measurement::from_array([2.0, -2.0]);

        let result = gs.update(&z, h.observe(&gs.mean), &h, &r).unwrap();

        assert!(*result.state.mean.index(0) > 1.5 && *result.state.mean.index(0) < 2.0);
        assert!(*result.state.mean.index(1) < -1.5 && *result.state.mean.index(1) > -2.0);
        assert!(result.state.covariance.trace() < gs.covariance.trace());
        assert!(result.likelihood() > 0.0);
    }

    #[test]
    fn test_update_with_singular_innovation_fails() {
        let gs = GaussianState::new(
            1.0,
            StateVector::from_array([0.0, 0.0, 0.0, 0.0]),
            StateCovariance::zeros(),
        );
        let h = position_observation();
        let r = MeasurementCovariance::zeros();
        let z = Measurement::from_array([1.0, 1.0]);

        let result = gs.update(&z, h.observe(&gs.mean), &h, &r);
        assert!(matches!(result, Err(PmbmError::NumericalInstability(_))));
    }

    #[test]
    fn test_gaussian_mixture() {
        let mixture = GaussianMixture::new()
            .with_component(
                0.3,
                StateVector::<f64, 2>::from_array([0.0, 0.0]),
                StateCovariance::identity(),
            )
            .with_component(
                0.7,
                StateVector::from_array([5.0, 5.0]),
                StateCovariance::identity(),
            );

        assert_eq!(mixture.len(), 2);
        assert!((mixture.total_weight() - 1.0).abs() < 1e-10);
    }
}
