//! Typed vectors and covariances
//!
//! Every vector and covariance carries a zero-sized marker naming the space
//! it lives in. A state can never be added to a measurement, and the only
//! way to turn a measurement into an innovation is [`Measurement::innovation`].

use ::core::marker::PhantomData;
use ::core::ops::{Add, Mul, Sub};
use nalgebra::{RealField, SMatrix, SVector, Scalar};

// ============================================================================
// Space Markers
// ============================================================================

/// Object state space (position, velocity, turn rate, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateSpace;

/// Sensor measurement space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasurementSpace;

/// Measurement residuals `z - h(x)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InnovationSpace;

// ============================================================================
// Vector
// ============================================================================

/// Fixed-size column vector tagged with its space.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector<T: Scalar, const N: usize, Space> {
    inner: SVector<T, N>,
    _space: PhantomData<Space>,
}

/// Object state.
pub type StateVector<T, const N: usize> = Vector<T, N, StateSpace>;

/// Sensor measurement.
pub type Measurement<T, const M: usize> = Vector<T, M, MeasurementSpace>;

/// Measurement residual.
pub type Innovation<T, const M: usize> = Vector<T, M, InnovationSpace>;

impl<T: Scalar + Copy, const N: usize, Space: Clone> Copy for Vector<T, N, Space> {}

impl<T: Scalar, const N: usize, Space> Vector<T, N, Space> {
    #[inline]
    pub fn from_array(data: [T; N]) -> Self {
        Self::from_svector(SVector::from(data))
    }

    #[inline]
    pub fn from_svector(inner: SVector<T, N>) -> Self {
        Self {
            inner,
            _space: PhantomData,
        }
    }

    #[inline]
    pub fn as_svector(&self) -> &SVector<T, N> {
        &self.inner
    }

    #[inline]
    pub fn into_svector(self) -> SVector<T, N> {
        self.inner
    }

    /// Element `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= N`.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn index(&self, i: usize) -> &T {
        &self.inner[i]
    }
}

impl<T: RealField + Copy, const N: usize, Space> Vector<T, N, Space> {
    #[inline]
    pub fn zeros() -> Self {
        Self::from_svector(SVector::zeros())
    }

    /// True when no element is NaN or infinite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.inner.iter().all(|x| x.is_finite())
    }
}

impl<T: RealField + Copy, const M: usize> Measurement<T, M> {
    /// Residual of this measurement against a predicted one.
    #[inline]
    pub fn innovation(&self, predicted: &Measurement<T, M>) -> Innovation<T, M> {
        Innovation::from_svector(self.inner - predicted.inner)
    }
}

impl<T: RealField + Copy, const N: usize, Space> Add for Vector<T, N, Space> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::from_svector(self.inner + rhs.inner)
    }
}

impl<T: RealField + Copy, const N: usize, Space> Sub for Vector<T, N, Space> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::from_svector(self.inner - rhs.inner)
    }
}

impl<T: RealField + Copy, const N: usize, Space> Mul<T> for Vector<T, N, Space> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: T) -> Self {
        Self::from_svector(self.inner * rhs)
    }
}

// ============================================================================
// Covariance
// ============================================================================

/// Square covariance matrix tagged with the space of the vectors it describes.
///
/// Construction does not check symmetry or definiteness. Components built by
/// the filter are symmetrized after every predict and update.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Covariance<T: Scalar, const N: usize, Space> {
    inner: SMatrix<T, N, N>,
    _space: PhantomData<Space>,
}

/// Covariance of a state estimate.
pub type StateCovariance<T, const N: usize> = Covariance<T, N, StateSpace>;

/// Covariance in measurement space: sensor noise R, and the innovation
/// covariance S = H P H^T + R.
pub type MeasurementCovariance<T, const M: usize> = Covariance<T, M, MeasurementSpace>;

impl<T: Scalar + Copy, const N: usize, Space: Clone> Copy for Covariance<T, N, Space> where
    SMatrix<T, N, N>: Copy
{
}

impl<T: Scalar, const N: usize, Space> Covariance<T, N, Space> {
    #[inline]
    pub fn from_matrix(inner: SMatrix<T, N, N>) -> Self {
        Self {
            inner,
            _space: PhantomData,
        }
    }

    #[inline]
    pub fn as_matrix(&self) -> &SMatrix<T, N, N> {
        &self.inner
    }

    #[inline]
    pub fn into_matrix(self) -> SMatrix<T, N, N> {
        self.inner
    }
}

impl<T: RealField + Copy, const N: usize, Space> Covariance<T, N, Space> {
    #[inline]
    pub fn zeros() -> Self {
        Self::from_matrix(SMatrix::zeros())
    }

    #[inline]
    pub fn identity() -> Self {
        Self::from_matrix(SMatrix::identity())
    }

    /// Uncorrelated covariance with the given variances.
    #[inline]
    pub fn from_diagonal(variances: &SVector<T, N>) -> Self {
        Self::from_matrix(SMatrix::from_diagonal(variances))
    }

    #[inline]
    pub fn scale(&self, s: T) -> Self {
        Self::from_matrix(self.inner.scale(s))
    }

    #[inline]
    pub fn add(&self, other: &Self) -> Self {
        Self::from_matrix(self.inner + other.inner)
    }

    /// Total variance.
    #[inline]
    pub fn trace(&self) -> T {
        self.inner.trace()
    }

    /// `(P + P^T) / 2`
    #[inline]
    pub fn symmetrize(&self) -> Self {
        let half: T = nalgebra::convert(0.5);
        Self::from_matrix((self.inner + self.inner.transpose()) * half)
    }

    /// True if every mirrored pair differs by at most `tolerance`.
    pub fn is_symmetric(&self, tolerance: T) -> bool {
        (0..N).all(|i| {
            ((i + 1)..N).all(|j| (self.inner[(i, j)] - self.inner[(j, i)]).abs() <= tolerance)
        })
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.inner.iter().all(|x| x.is_finite())
    }

    /// True if a Cholesky factorization exists.
    #[inline]
    pub fn is_positive_definite(&self) -> bool {
        nalgebra::Cholesky::new(self.inner).is_some()
    }

    /// `d^T P^{-1} d` for a vector of the same space.
    ///
    /// Returns `None` if the matrix is not positive definite.
    pub fn mahalanobis_squared(&self, d: &Vector<T, N, Space>) -> Option<T> {
        let l = nalgebra::Cholesky::new(self.inner)?.l();
        let y = l.solve_lower_triangular(d.as_svector())?;
        Some(y.norm_squared())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_arithmetic() {
        let a: StateVector<f64, 4> = StateVector::from_array([1.0, 2.0, 3.0, 4.0]);
        let b: StateVector<f64, 4> = StateVector::from_array([0.5, 1.0, 1.5, 2.0]);

        let mid = (a + b) * 0.5;
        assert_eq!(*mid.index(0), 0.75);
        assert_eq!(*(a - b).index(3), 2.0);
    }

    #[test]
    fn test_innovation() {
        let z: Measurement<f64, 2> = Measurement::from_array([10.0, 20.0]);
        let z_hat: Measurement<f64, 2> = Measurement::from_array([9.5, 19.0]);

        let v = z.innovation(&z_hat);
        assert!((v.index(0) - 0.5).abs() < 1e-12);
        assert!((v.index(1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_finite_checks() {
        assert!(!Measurement::<f64, 2>::from_array([f64::NAN, 1.0]).is_finite());
        assert!(!StateCovariance::<f64, 2>::identity().scale(f64::INFINITY).is_finite());
        assert!(StateVector::<f64, 3>::zeros().is_finite());
    }

    #[test]
    fn test_definiteness() {
        let cov: StateCovariance<f64, 2> = StateCovariance::identity();
        assert!(cov.is_positive_definite());
        assert_eq!(cov.trace(), 2.0);

        let singular: StateCovariance<f64, 2> =
            StateCovariance::from_matrix(nalgebra::matrix![1.0, 1.0; 1.0, 1.0]);
        assert!(!singular.is_positive_definite());
        assert!(singular
            .mahalanobis_squared(&StateVector::from_array([1.0, 0.0]))
            .is_none());
    }

    #[test]
    fn test_symmetrize() {
        let skewed: StateCovariance<f64, 2> =
            StateCovariance::from_matrix(nalgebra::matrix![2.0, 1.0; 0.0, 2.0]);
        assert!(!skewed.is_symmetric(1e-12));

        let sym = skewed.symmetrize();
        assert!(sym.is_symmetric(0.0));
        assert_eq!(sym.as_matrix()[(0, 1)], 0.5);
    }

    #[test]
    fn test_mahalanobis_squared() {
        let cov: StateCovariance<f64, 2> =
            StateCovariance::from_diagonal(&nalgebra::vector![4.0, 1.0]);
        let d: StateVector<f64, 2> = StateVector::from_array([2.0, 1.0]);
        // 2^2 / 4 + 1^2 / 1
        assert!((cov.mahalanobis_squared(&d).unwrap() - 2.0).abs() < 1e-12);
    }
}
