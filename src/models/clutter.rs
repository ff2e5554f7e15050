//! Clutter models
//!
//! False alarms form a Poisson process with intensity κ(z) = λ c(z). The
//! filter weighs κ(z) against the undetected-object density whenever a
//! measurement could start a new track.

use nalgebra::{RealField, SVector};

use crate::types::spaces::Measurement;

/// Poisson clutter process.
pub trait ClutterModel<T: RealField + Copy, const M: usize> {
    /// Expected number of false alarms per scan (λ).
    fn clutter_rate(&self) -> T;

    /// Spatial density c(z) of a false alarm; integrates to one.
    fn clutter_density(&self, measurement: &Measurement<T, M>) -> T;

    /// κ(z) = λ c(z)
    fn clutter_intensity(&self, measurement: &Measurement<T, M>) -> T {
        self.clutter_rate() * self.clutter_density(measurement)
    }
}

// ============================================================================
// Uniform Clutter
// ============================================================================

/// False alarms spread uniformly over an axis-aligned box.
///
/// The density is `1 / volume` everywhere, including outside the box, so a
/// stray measurement is never impossible to explain.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UniformClutter<T: RealField, const M: usize> {
    clutter_rate: T,
    lower: SVector<T, M>,
    upper: SVector<T, M>,
    volume: T,
}

/// Uniform clutter over a rectangle in the plane.
pub type UniformClutter2D<T> = UniformClutter<T, 2>;

impl<T: RealField + Copy, const M: usize> UniformClutter<T, M> {
    /// Creates uniform clutter over `bounds[i] = (min, max)` per axis.
    ///
    /// # Panics
    ///
    /// Panics if `clutter_rate` is negative or any axis has `max <= min`.
    pub fn from_bounds(clutter_rate: T, bounds: [(T, T); M]) -> Self {
        assert!(
            clutter_rate >= T::zero(),
            "Clutter rate must be non-negative"
        );
        for (axis, (min, max)) in bounds.iter().enumerate() {
            assert!(max > min, "axis {} must have max > min", axis);
        }

        let lower: SVector<T, M> = SVector::from_fn(|i, _| bounds[i].0);
        let upper: SVector<T, M> = SVector::from_fn(|i, _| bounds[i].1);
        let volume = (upper - lower).product();

        Self {
            clutter_rate,
            lower,
            upper,
            volume,
        }
    }

    /// Volume of the surveillance region.
    pub fn volume(&self) -> T {
        self.volume
    }

    /// True if the measurement lies inside the box, edges included.
    pub fn contains(&self, measurement: &Measurement<T, M>) -> bool {
        let z = measurement.as_svector();
        (0..M).all(|i| z[i] >= self.lower[i] && z[i] <= self.upper[i])
    }
}

impl<T: RealField + Copy> UniformClutter<T, 2> {
    /// Creates uniform clutter over `x_bounds x y_bounds`.
    ///
    /// # Panics
    ///
    /// Panics if `clutter_rate` is negative or a bound has `max <= min`.
    pub fn new(clutter_rate: T, x_bounds: (T, T), y_bounds: (T, T)) -> Self {
        Self::from_bounds(clutter_rate, [x_bounds, y_bounds])
    }

    /// Area of the surveillance region.
    pub fn area(&self) -> T {
        self.volume
    }
}

impl<T: RealField + Copy, const M: usize> ClutterModel<T, M> for UniformClutter<T, M> {
    fn clutter_rate(&self) -> T {
        self.clutter_rate
    }

    fn clutter_density(&self, _measurement: &Measurement<T, M>) -> T {
        T::one() / self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planar_clutter() {
        let clutter = UniformClutter2D::new(10.0_f64, (0.0, 100.0), (-50.0, 50.0));
        let z = Measurement::from_array([50.0, 0.0]);

        assert_eq!(clutter.area(), 1e4);
        assert!((clutter.clutter_intensity(&z) - 1e-3).abs() < 1e-15);

        assert!(clutter.contains(&z));
        assert!(clutter.contains(&Measurement::from_array([0.0, -50.0])));
        assert!(!clutter.contains(&Measurement::from_array([101.0, 0.0])));
    }

    #[test]
    fn test_density_outside_region() {
        let clutter = UniformClutter::<f64, 3>::from_bounds(
            2.0,
            [(0.0, 10.0), (0.0, 5.0), (-1.0, 1.0)],
        );
        let outside = Measurement::from_array([20.0, 2.0, 0.0]);

        assert_eq!(clutter.volume(), 100.0);
        assert!(!clutter.contains(&outside));
        assert_eq!(clutter.clutter_density(&outside), 0.01);
    }

    #[test]
    fn test_zero_rate_has_no_intensity() {
        let clutter = UniformClutter2D::new(0.0_f64, (0.0, 1.0), (0.0, 1.0));
        assert_eq!(clutter.clutter_intensity(&Measurement::from_array([0.5, 0.5])), 0.0);
    }

    #[test]
    #[should_panic(expected = "axis 0 must have max > min")]
    fn test_invalid_bounds() {
        let _ = UniformClutter2D::new(1.0_f64, (10.0, 0.0), (0.0, 10.0));
    }
}
