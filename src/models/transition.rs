//! Transition (motion) models for target dynamics
//!
//! Describes how targets evolve over time.

use nalgebra::RealField;

use crate::types::spaces::{StateCovariance, StateVector};
use crate::types::transforms::TransitionMatrix;

/// Trait for transition (motion) models.
///
/// Describes target dynamics in the form:
/// x_{k+1} = f(x_k) + w
///
/// where w is zero-mean Gaussian process noise with covariance Q. Linear
/// models only implement [`transition_matrix`](Self::transition_matrix)
/// and get `f(x) = F x` for free; nonlinear models also override
/// [`predict_state`](Self::predict_state) and return the Jacobian of `f`
/// from `transition_matrix`, which turns the Kalman kernel into an
/// extended Kalman predictor.
pub trait TransitionModel<T: RealField + Copy, const N: usize> {
    /// Returns the transition matrix for time step dt, linearized at `state`.
    ///
    /// Linear models ignore `state`.
    fn transition_matrix(&self, state: &StateVector<T, N>, dt: T) -> TransitionMatrix<T, N>;

    /// Returns the process noise covariance for time step dt.
    fn process_noise(&self, dt: T) -> StateCovariance<T, N>;

    /// Returns the probability that a target survives from one time step to the next.
    ///
    /// This may depend on the target state (e.g., targets leaving a surveillance region).
    fn survival_probability(&self, state: &StateVector<T, N>) -> T;

    /// Propagates a state through the transition function.
    fn predict_state(&self, state: &StateVector<T, N>, dt: T) -> StateVector<T, N> {
        self.transition_matrix(state, dt).apply_state(state)
    }
}

// ============================================================================
// Common Transition Models
// ============================================================================

/// Nearly constant velocity model in 2D.
///
/// State: [x, y, vx, vy]
///
/// Uses the discrete white noise acceleration process noise
/// ```text
/// Q = σ² [dt⁴/4   0     dt³/2   0    ]
///        [0       dt⁴/4 0       dt³/2]
///        [dt³/2   0     dt²     0    ]
///        [0       dt³/2 0       dt²  ]
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstantVelocity2D<T: RealField> {
    /// Process noise intensity (acceleration standard deviation)
    pub sigma_a: T,
    /// Survival probability
    pub p_survival: T,
}

impl<T: RealField + Copy> ConstantVelocity2D<T> {
    /// Creates a new constant velocity model.
    ///
    /// # Arguments
    /// - `sigma_a`: Process noise intensity / acceleration standard deviation (must be >= 0)
    /// - `p_survival`: Probability that a target survives to the next time step (must be in [0, 1])
    ///
    /// # Panics
    /// Panics if `sigma_a < 0` or `p_survival` is not in [0, 1].
    pub fn new(sigma_a: T, p_survival: T) -> Self {
        assert!(
            sigma_a >= T::zero(),
            "Process noise sigma_a must be non-negative"
        );
        assert!(
            p_survival >= T::zero() && p_survival <= T::one(),
            "Survival probability must be in [0, 1]"
        );
        Self {
            sigma_a,
            p_survival,
        }
    }
}

impl<T: RealField + Copy> TransitionModel<T, 4> for ConstantVelocity2D<T> {
    fn transition_matrix(&self, _state: &StateVector<T, 4>, dt: T) -> TransitionMatrix<T, 4> {
        let one = T::one();
        let zero = T::zero();

        TransitionMatrix::from_matrix(nalgebra::matrix![
            one, zero, dt, zero;
            zero, one, zero, dt;
            zero, zero, one, zero;
            zero, zero, zero, one
        ])
    }

    fn process_noise(&self, dt: T) -> StateCovariance<T, 4> {
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        let dt4 = dt3 * dt;

        let two: T = nalgebra::convert(2.0);
        let four: T = nalgebra::convert(4.0);

        let sigma_sq = self.sigma_a * self.sigma_a;

        let q11 = dt4 / four * sigma_sq;
        let q13 = dt3 / two * sigma_sq;
        let q33 = dt2 * sigma_sq;

        let zero = T::zero();

        StateCovariance::from_matrix(nalgebra::matrix![
            q11, zero, q13, zero;
            zero, q11, zero, q13;
            q13, zero, q33, zero;
            zero, q13, zero, q33
        ])
    }

    fn survival_probability(&self, _state: &StateVector<T, 4>) -> T {
        self.p_survival
    }
}

/// Coordinated turn model with nearly constant polar velocity and turn rate.
///
/// State: [x, y, v, φ, ω] with speed v, heading φ and turn rate ω (rad/s).
///
/// The mean is propagated with the exact turn:
/// - x' = x + (2v/ω)·sin(ωΔt/2)·cos(φ + ωΔt/2)
/// - y' = y + (2v/ω)·sin(ωΔt/2)·sin(φ + ωΔt/2)
/// - φ' = φ + ωΔt
///
/// falling back to straight-line motion as ω → 0. The covariance is
/// propagated with the first-order Jacobian
/// ```text
/// [1 0 Δt·cosφ −Δt·v·sinφ 0 ]
/// [0 1 Δt·sinφ  Δt·v·cosφ 0 ]
/// [0 0 1        0         0 ]
/// [0 0 0        1         Δt]
/// [0 0 0        0         1 ]
/// ```
/// and the process noise is `diag(0, 0, σ_v², 0, σ_ω²)`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoordinatedTurn2D<T: RealField> {
    /// Standard deviation of the noise on the polar velocity
    pub sigma_v: T,
    /// Standard deviation of the noise on the turn rate
    pub sigma_omega: T,
    /// Survival probability
    pub p_survival: T,
}

impl<T: RealField + Copy> CoordinatedTurn2D<T> {
    /// Creates a new coordinated turn model.
    ///
    /// # Arguments
    /// - `sigma_v`: Noise on the polar velocity (must be >= 0)
    /// - `sigma_omega`: Noise on the turn rate (must be >= 0)
    /// - `p_survival`: Probability that a target survives to the next time step (must be in [0, 1])
    ///
    /// # Panics
    /// Panics if noise parameters are negative or `p_survival` is not in [0, 1].
    pub fn new(sigma_v: T, sigma_omega: T, p_survival: T) -> Self {
        assert!(
            sigma_v >= T::zero(),
            "Process noise sigma_v must be non-negative"
        );
        assert!(
            sigma_omega >= T::zero(),
            "Process noise sigma_omega must be non-negative"
        );
        assert!(
            p_survival >= T::zero() && p_survival <= T::one(),
            "Survival probability must be in [0, 1]"
        );
        Self {
            sigma_v,
            sigma_omega,
            p_survival,
        }
    }
}

impl<T: RealField + Copy> TransitionModel<T, 5> for CoordinatedTurn2D<T> {
    fn transition_matrix(&self, state: &StateVector<T, 5>, dt: T) -> TransitionMatrix<T, 5> {
        let v = *state.index(2);
        let phi = *state.index(3);
        let (sin_phi, cos_phi) = (phi.sin(), phi.cos());
        let one = T::one();
        let zero = T::zero();

        TransitionMatrix::from_matrix(nalgebra::matrix![
            one, zero, dt * cos_phi, -dt * v * sin_phi, zero;
            zero, one, dt * sin_phi, dt * v * cos_phi, zero;
            zero, zero, one, zero, zero;
            zero, zero, zero, one, dt;
            zero, zero, zero, zero, one
        ])
    }

    fn process_noise(&self, _dt: T) -> StateCovariance<T, 5> {
        StateCovariance::from_diagonal(&nalgebra::vector![
            T::zero(),
            T::zero(),
            self.sigma_v * self.sigma_v,
            T::zero(),
            self.sigma_omega * self.sigma_omega
        ])
    }

    fn survival_probability(&self, _state: &StateVector<T, 5>) -> T {
        self.p_survival
    }

    fn predict_state(&self, state: &StateVector<T, 5>, dt: T) -> StateVector<T, 5> {
        let x = *state.index(0);
        let y = *state.index(1);
        let v = *state.index(2);
        let phi = *state.index(3);
        let omega = *state.index(4);

        let eps: T = nalgebra::convert(1e-9);
        let two: T = nalgebra::convert(2.0);

        let (dx, dy) = if omega.abs() < eps {
            (dt * v * phi.cos(), dt * v * phi.sin())
        } else {
            let half_turn = omega * dt / two;
            let chord = two * v / omega * half_turn.sin();
            (
                chord * (phi + half_turn).cos(),
                chord * (phi + half_turn).sin(),
            )
        };

        StateVector::from_array([x + dx, y + dy, v, phi + omega * dt, omega])
    }
}
