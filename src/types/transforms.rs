//! Typed linear maps and the Kalman correction
//!
//! A [`Transform`] maps vectors of one space into another, so a transition
//! matrix cannot be applied to a measurement. [`InnovationFactor`] holds the
//! Cholesky factor of an innovation covariance and derives everything a
//! measurement update needs from that single factorization: the gain, the
//! measurement log-density and the gate distance.

use ::core::marker::PhantomData;
use nalgebra::{Cholesky, Const, RealField, SMatrix, Scalar};

use super::spaces::{
    Innovation, InnovationSpace, Measurement, MeasurementCovariance, MeasurementSpace,
    StateCovariance, StateSpace, StateVector,
};

// ============================================================================
// Transform
// ============================================================================

/// A `ROWS x COLS` matrix mapping `From` vectors to `To` vectors.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct Transform<T: Scalar, const ROWS: usize, const COLS: usize, To, From> {
    inner: SMatrix<T, ROWS, COLS>,
    _spaces: PhantomData<(To, From)>,
}

/// Motion model matrix F (or its Jacobian).
pub type TransitionMatrix<T, const N: usize> = Transform<T, N, N, StateSpace, StateSpace>;

/// Sensor matrix H (or its Jacobian).
pub type ObservationMatrix<T, const M: usize, const N: usize> =
    Transform<T, M, N, MeasurementSpace, StateSpace>;

/// Gain K mapping a residual to a state correction.
pub type KalmanGain<T, const N: usize, const M: usize> =
    Transform<T, N, M, StateSpace, InnovationSpace>;

impl<T: Scalar + Copy, const ROWS: usize, const COLS: usize, To: Clone, From: Clone> Copy
    for Transform<T, ROWS, COLS, To, From>
where
    SMatrix<T, ROWS, COLS>: Copy,
{
}

impl<T: Scalar, const ROWS: usize, const COLS: usize, To, From> Transform<T, ROWS, COLS, To, From> {
    #[inline]
    pub fn from_matrix(inner: SMatrix<T, ROWS, COLS>) -> Self {
        Self {
            inner,
            _spaces: PhantomData,
        }
    }

    #[inline]
    pub fn as_matrix(&self) -> &SMatrix<T, ROWS, COLS> {
        &self.inner
    }
}

impl<T: RealField + Copy, const N: usize> TransitionMatrix<T, N> {
    /// `F x`
    #[inline]
    pub fn apply_state(&self, state: &StateVector<T, N>) -> StateVector<T, N> {
        StateVector::from_svector(self.inner * state.as_svector())
    }

    /// `F P F^T`
    #[inline]
    pub fn propagate_covariance(&self, cov: &StateCovariance<T, N>) -> StateCovariance<T, N> {
        StateCovariance::from_matrix(self.inner * cov.as_matrix() * self.inner.transpose())
    }
}

impl<T: RealField + Copy, const M: usize, const N: usize> ObservationMatrix<T, M, N> {
    /// `H x`
    #[inline]
    pub fn observe(&self, state: &StateVector<T, N>) -> Measurement<T, M> {
        Measurement::from_svector(self.inner * state.as_svector())
    }

    /// Innovation covariance `S = H P H^T + R`, symmetrized.
    pub fn innovation_covariance(
        &self,
        cov: &StateCovariance<T, N>,
        noise: &MeasurementCovariance<T, M>,
    ) -> MeasurementCovariance<T, M> {
        let hph = self.inner * cov.as_matrix() * self.inner.transpose();
        MeasurementCovariance::from_matrix(hph + noise.as_matrix()).symmetrize()
    }
}

impl<T: RealField + Copy, const N: usize, const M: usize> KalmanGain<T, N, M> {
    /// State correction `K v`.
    #[inline]
    pub fn correct(&self, innovation: &Innovation<T, M>) -> StateVector<T, N> {
        StateVector::from_svector(self.inner * innovation.as_svector())
    }

    /// Posterior covariance in Joseph form, symmetrized:
    ///
    /// ```text
    /// P+ = (I - K H) P (I - K H)^T + K R K^T
    /// ```
    pub fn joseph_covariance(
        &self,
        prior: &StateCovariance<T, N>,
        obs_matrix: &ObservationMatrix<T, M, N>,
        noise: &MeasurementCovariance<T, M>,
    ) -> StateCovariance<T, N> {
        let i_kh = SMatrix::<T, N, N>::identity() - self.inner * obs_matrix.as_matrix();
        let spread = i_kh * prior.as_matrix() * i_kh.transpose();
        let noise_term = self.inner * noise.as_matrix() * self.inner.transpose();
        StateCovariance::from_matrix(spread + noise_term).symmetrize()
    }
}

// ============================================================================
// Innovation Factor
// ============================================================================

/// Cholesky factor `S = L L^T` of an innovation covariance.
#[derive(Debug, Clone)]
pub struct InnovationFactor<T: RealField, const M: usize> {
    chol: Cholesky<T, Const<M>>,
    log_det: T,
}

impl<T: RealField + Copy, const M: usize> InnovationFactor<T, M> {
    /// Factors `S`. Returns `None` if it is not positive definite.
    pub fn new(innovation_cov: &MeasurementCovariance<T, M>) -> Option<Self> {
        let chol = Cholesky::new(*innovation_cov.as_matrix())?;
        let l = chol.l_dirty();

        let mut log_det = T::zero();
        for i in 0..M {
            let d = l[(i, i)];
            if !(d > T::zero()) || !d.is_finite() {
                return None;
            }
            log_det += d.ln();
        }
        let two: T = nalgebra::convert(2.0);

        Some(Self {
            chol,
            log_det: two * log_det,
        })
    }

    /// `ln |S|`
    #[inline]
    pub fn log_determinant(&self) -> T {
        self.log_det
    }

    /// Squared Mahalanobis distance `v^T S^{-1} v`.
    pub fn mahalanobis_squared(&self, innovation: &Innovation<T, M>) -> T {
        let v = innovation.as_svector();
        v.dot(&self.chol.solve(v))
    }

    /// Gaussian log-density of the innovation and its squared Mahalanobis
    /// distance:
    ///
    /// ```text
    /// ln N(v; 0, S) = -0.5 * (v^T S^{-1} v + ln|S| + M ln(2 pi))
    /// ```
    pub fn log_density(&self, innovation: &Innovation<T, M>) -> (T, T) {
        let d2 = self.mahalanobis_squared(innovation);
        let half: T = nalgebra::convert(0.5);
        let m: T = nalgebra::convert(M as f64);
        (-half * (d2 + self.log_det + m * T::two_pi().ln()), d2)
    }

    /// `K = P H^T S^{-1}`, computed as the transpose of `S^{-1} H P`.
    pub fn gain<const N: usize>(
        &self,
        prior: &StateCovariance<T, N>,
        obs_matrix: &ObservationMatrix<T, M, N>,
    ) -> KalmanGain<T, N, M> {
        let hp: SMatrix<T, M, N> = obs_matrix.as_matrix() * prior.as_matrix();
        KalmanGain::from_matrix(self.chol.solve(&hp).transpose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_problem() -> (
        StateCovariance<f64, 2>,
        ObservationMatrix<f64, 1, 2>,
        MeasurementCovariance<f64, 1>,
    ) {
        (
            StateCovariance::from_matrix(nalgebra::matrix![4.0, 1.0; 1.0, 3.0]),
            ObservationMatrix::from_matrix(nalgebra::matrix![1.0, 0.0]),
            MeasurementCovariance::from_matrix(nalgebra::matrix![1.0]),
        )
    }

    #[test]
    fn test_constant_velocity_step() {
        let f = TransitionMatrix::<f64, 4>::from_matrix(nalgebra::matrix![
            1.0, 0.0, 2.0, 0.0;
            0.0, 1.0, 0.0, 2.0;
            0.0, 0.0, 1.0, 0.0;
            0.0, 0.0, 0.0, 1.0
        ]);
        let h = ObservationMatrix::<f64, 2, 4>::from_matrix(nalgebra::matrix![
            1.0, 0.0, 0.0, 0.0;
            0.0, 1.0, 0.0, 0.0
        ]);

        let x = f.apply_state(&StateVector::from_array([1.0, -1.0, 0.5, 3.0]));
        let z = h.observe(&x);

        assert_eq!(*z.index(0), 2.0);
        assert_eq!(*z.index(1), 5.0);
    }

    #[test]
    fn test_gain_and_joseph_form() {
        let (p, h, r) = scalar_problem();
        let s = h.innovation_covariance(&p, &r);
        let factor = InnovationFactor::new(&s).unwrap();
        let k = factor.gain(&p, &h);

        // S = 5, K = P H^T / S = [4/5, 1/5]
        assert!((k.as_matrix()[(0, 0)] - 0.8).abs() < 1e-12);
        assert!((k.as_matrix()[(1, 0)] - 0.2).abs() < 1e-12);

        // With the optimal gain Joseph form equals (I - K H) P
        let posterior = k.joseph_covariance(&p, &h, &r);
        assert!((posterior.as_matrix()[(0, 0)] - 0.8).abs() < 1e-12);
        assert!((posterior.as_matrix()[(1, 1)] - (3.0 - 0.2)).abs() < 1e-12);

        let correction = k.correct(&Innovation::from_array([5.0]));
        assert!((correction.index(0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_log_density_closed_form() {
        // 1-D: N(1; 0, 4) = exp(-1/8) / sqrt(8 pi)
        let s = MeasurementCovariance::<f64, 1>::from_matrix(nalgebra::matrix![4.0]);
        let factor = InnovationFactor::new(&s).unwrap();

        let (ll, d2) = factor.log_density(&Innovation::from_array([1.0]));
        let expected = (-1.0_f64 / 8.0).exp() / (8.0 * core::f64::consts::PI).sqrt();

        assert!((ll.exp() - expected).abs() < 1e-12);
        assert!((d2 - 0.25).abs() < 1e-12);
        assert!((factor.log_determinant() - 4.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_singular_innovation_rejected() {
        let p = StateCovariance::<f64, 2>::zeros();
        let (_, h, _) = scalar_problem();
        let s = h.innovation_covariance(&p, &MeasurementCovariance::zeros());
        assert!(InnovationFactor::new(&s).is_none());
    }
}
