//! Sensor models
//!
//! A sensor produces `z = h(x) + v` with Gaussian noise `v ~ N(0, R)` and
//! detects an object with probability `p_D(x)`.

use nalgebra::{RealField, SMatrix};

use crate::types::spaces::{Measurement, MeasurementCovariance, StateVector};
use crate::types::transforms::ObservationMatrix;

/// Measurement process of a sensor.
///
/// Linear sensors only provide [`observation_matrix`](Self::observation_matrix).
/// Nonlinear sensors also override
/// [`predict_measurement`](Self::predict_measurement) and return the
/// Jacobian of `h` at `state` as the observation matrix.
pub trait ObservationModel<T: RealField + Copy, const N: usize, const M: usize> {
    /// H, or the Jacobian of h at `state`.
    fn observation_matrix(&self, state: &StateVector<T, N>) -> ObservationMatrix<T, M, N>;

    /// R
    fn measurement_noise(&self) -> MeasurementCovariance<T, M>;

    /// Probability of detecting an object at `state`.
    fn detection_probability(&self, state: &StateVector<T, N>) -> T;

    /// Noise-free measurement `h(x)`.
    fn predict_measurement(&self, state: &StateVector<T, N>) -> Measurement<T, M> {
        self.observation_matrix(state).observe(state)
    }
}

// ============================================================================
// Position Sensor
// ============================================================================

/// Planar position sensor.
///
/// Reads the first two state entries, so it works with [x, y, vx, vy] as
/// well as the coordinated turn state [x, y, v, φ, ω].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionSensor2D<T: RealField> {
    /// Noise standard deviation along x
    pub sigma_x: T,
    /// Noise standard deviation along y
    pub sigma_y: T,
    /// Detection probability
    pub p_detection: T,
}

impl<T: RealField + Copy> PositionSensor2D<T> {
    /// Sensor with the same noise on both axes.
    ///
    /// # Panics
    ///
    /// Panics if `sigma_pos <= 0` or `p_detection` is outside [0, 1].
    pub fn new(sigma_pos: T, p_detection: T) -> Self {
        Self::with_noise(sigma_pos, sigma_pos, p_detection)
    }

    /// Sensor with separate x and y noise.
    ///
    /// # Panics
    ///
    /// Panics if a sigma is not positive or `p_detection` is outside [0, 1].
    pub fn with_noise(sigma_x: T, sigma_y: T, p_detection: T) -> Self {
        assert!(
            sigma_x > T::zero() && sigma_y > T::zero(),
            "Measurement noise must be positive"
        );
        assert!(
            p_detection >= T::zero() && p_detection <= T::one(),
            "Detection probability must be in [0, 1]"
        );
        Self {
            sigma_x,
            sigma_y,
            p_detection,
        }
    }
}

impl<T: RealField + Copy, const N: usize> ObservationModel<T, N, 2> for PositionSensor2D<T> {
    fn observation_matrix(&self, _state: &StateVector<T, N>) -> ObservationMatrix<T, 2, N> {
        ObservationMatrix::from_matrix(SMatrix::from_fn(|row, col| {
            if row == col {
                T::one()
            } else {
                T::zero()
            }
        }))
    }

    fn measurement_noise(&self) -> MeasurementCovariance<T, 2> {
        MeasurementCovariance::from_diagonal(&nalgebra::vector![
            self.sigma_x * self.sigma_x,
            self.sigma_y * self.sigma_y
        ])
    }

    fn detection_probability(&self, _state: &StateVector<T, N>) -> T {
        self.p_detection
    }
}
