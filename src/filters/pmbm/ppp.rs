//! Poisson point process for undetected objects
//!
//! The undetected density is a Gaussian mixture intensity whose total mass is
//! the expected number of objects that exist but have never been detected.
//! A fixed birth intensity is appended at every prediction.
//!
//! Mass leaves the density only through detection: the update scales every
//! weight by `1 - p_D`, and the removed mass reappears as one new-track
//! candidate per measurement.

use nalgebra::RealField;

use crate::error::{PmbmError, Result};
use crate::filters::kalman::KalmanFilter;
use crate::models::{ObservationModel, TransitionModel};
use crate::types::gaussian::{GaussianMixture, GaussianState};
use crate::types::phase::StepStats;
use crate::types::spaces::Measurement;
use crate::utils::{ln_floored, log_sum_exp, moment_match, prune_and_merge, PruningConfig};

// ============================================================================
// New Track Candidate
// ============================================================================

/// The "new object or clutter" explanation of one measurement.
///
/// Built from the undetected density: with detected intensity
/// `e = Σ p_D w_k N(z; z_k, S_k)` and clutter intensity `κ(z)`, the
/// candidate has existence `e / (κ + e)` and likelihood `κ + e`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrackCandidate<T: RealField, const N: usize> {
    /// ln(κ(z) + e), floored so that unexplainable measurements stay finite
    pub log_likelihood: T,
    /// Existence probability of the object the measurement would start
    pub existence: T,
    /// Moment-matched posterior; `None` when the measurement can only be clutter
    pub state: Option<GaussianState<T, N>>,
}

impl<T: RealField + Copy, const N: usize> NewTrackCandidate<T, N> {
    /// Returns true if the measurement could start a track.
    #[inline]
    pub fn spawns_track(&self) -> bool {
        self.state.is_some()
    }
}

// ============================================================================
// Poisson Density
// ============================================================================

/// Intensity of undetected objects plus the birth intensity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoissonDensity<T: RealField, const N: usize> {
    /// Undetected-object components
    pub undetected: GaussianMixture<T, N>,
    /// Birth intensity, re-added unchanged at every prediction
    pub birth: GaussianMixture<T, N>,
}

impl<T: RealField + Copy, const N: usize> PoissonDensity<T, N> {
    /// Creates the initial density: the undetected intensity equals the birth.
    ///
    /// # Errors
    ///
    /// Returns [`PmbmError::Configuration`] if a birth weight is negative or
    /// non-finite, or a covariance is not finite and symmetric.
    pub fn new(birth: GaussianMixture<T, N>) -> Result<Self> {
        validate_mixture(&birth)?;
        Ok(Self {
            undetected: birth.clone(),
            birth,
        })
    }

    /// Creates a density from explicit parts.
    pub fn from_parts(undetected: GaussianMixture<T, N>, birth: GaussianMixture<T, N>) -> Self {
        Self { undetected, birth }
    }

    /// Expected number of undetected objects.
    #[inline]
    pub fn expected_count(&self) -> T {
        self.undetected.total_weight()
    }

    /// Number of undetected components.
    #[inline]
    pub fn len(&self) -> usize {
        self.undetected.len()
    }

    /// Returns true if there are no undetected components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.undetected.is_empty()
    }

    /// Predicts the undetected intensity and appends the birth intensity.
    ///
    /// Each weight is scaled by the survival probability at the prior mean.
    pub fn predict<Trans, Obs, const M: usize>(
        &self,
        kalman: &KalmanFilter<T, Trans, Obs, N, M>,
        dt: T,
    ) -> Self
    where
        Trans: TransitionModel<T, N>,
        Obs: ObservationModel<T, N, M>,
    {
        let mut undetected =
            GaussianMixture::with_capacity(self.undetected.len() + self.birth.len());

        for component in self.undetected.iter() {
            let p_s = kalman.survival_probability(&component.mean);
            let predicted = kalman.predict(component, dt);
            undetected.push(predicted.scale_weight(p_s));
        }
        undetected.extend(self.birth.iter().cloned());

        Self {
            undetected,
            birth: self.birth.clone(),
        }
    }

    /// Builds the new-track candidate for one measurement.
    ///
    /// Components whose innovation covariance is singular are skipped and
    /// counted in `stats`.
    pub fn new_track_candidate<Trans, Obs, const M: usize>(
        &self,
        kalman: &KalmanFilter<T, Trans, Obs, N, M>,
        measurement: &Measurement<T, M>,
        clutter_intensity: T,
        stats: &mut StepStats,
    ) -> NewTrackCandidate<T, N>
    where
        Trans: TransitionModel<T, N>,
        Obs: ObservationModel<T, N, M>,
    {
        let mut log_terms = Vec::with_capacity(self.undetected.len());
        let mut posteriors = Vec::with_capacity(self.undetected.len());

        for component in self.undetected.iter() {
            let p_d = kalman.detection_probability(&component.mean);
            if p_d <= T::zero() || component.weight <= T::zero() {
                continue;
            }
            match kalman.update(component, measurement) {
                Ok(update) => {
                    log_terms.push(p_d.ln() + component.weight.ln() + update.log_likelihood);
                    posteriors.push(update.state);
                }
                Err(_) => stats.singular_covariance_count += 1,
            }
        }

        let log_detected = log_sum_exp(&log_terms);
        let log_clutter = if clutter_intensity > T::zero() {
            clutter_intensity.ln()
        } else {
            nalgebra::convert(f64::NEG_INFINITY)
        };
        let log_total = log_sum_exp(&[log_clutter, log_detected]);

        if !log_detected.is_finite() {
            return NewTrackCandidate {
                log_likelihood: ln_floored(log_total.exp()),
                existence: T::zero(),
                state: None,
            };
        }

        let existence = (log_detected - log_total).exp().min(T::one());
        let weighted: Vec<_> = log_terms
            .iter()
            .zip(&posteriors)
            .map(|(&l, c)| ((l - log_detected).exp(), c))
            .collect();
        let state = moment_match(&weighted).map(|s| s.with_weight(T::one()));

        NewTrackCandidate {
            log_likelihood: log_total,
            existence,
            state,
        }
    }

    /// Applies the missed-detection factor `1 - p_D` to every component.
    pub fn apply_missed_detection<Trans, Obs, const M: usize>(
        &self,
        kalman: &KalmanFilter<T, Trans, Obs, N, M>,
    ) -> Self
    where
        Trans: TransitionModel<T, N>,
        Obs: ObservationModel<T, N, M>,
    {
        let undetected = self
            .undetected
            .iter()
            .map(|c| {
                let p_d = kalman.detection_probability(&c.mean);
                c.scale_weight(T::one() - p_d)
            })
            .collect();

        Self {
            undetected: GaussianMixture::from_components(undetected),
            birth: self.birth.clone(),
        }
    }

    /// Prunes, merges and caps the undetected components, preserving mass.
    pub fn maintain(&self, config: &PruningConfig<T>) -> Self {
        Self {
            undetected: prune_and_merge(&self.undetected, config),
            birth: self.birth.clone(),
        }
    }

    /// Returns a pruned Bernoulli's mass to the undetected intensity.
    pub fn recycle(&mut self, component: GaussianState<T, N>) {
        if component.weight > T::zero() {
            self.undetected.push(component);
        }
    }
}

/// Checks that a mixture can serve as an intensity.
pub(crate) fn validate_mixture<T: RealField + Copy, const N: usize>(
    mixture: &GaussianMixture<T, N>,
) -> Result<()> {
    let tolerance: T = nalgebra::convert(1e-9);
    for (i, c) in mixture.iter().enumerate() {
        if !c.weight.is_finite() || c.weight < T::zero() {
            return Err(PmbmError::Configuration(format!(
                "birth component {} has invalid weight",
                i
            )));
        }
        if !c.mean.is_finite() || !c.covariance.is_finite() {
            return Err(PmbmError::Configuration(format!(
                "birth component {} is not finite",
                i
            )));
        }
        let scale = c.covariance.as_matrix().amax().max(T::one());
        if !c.covariance.is_symmetric(tolerance * scale) {
            return Err(PmbmError::Configuration(format!(
                "birth component {} has an asymmetric covariance",
                i
            )));
        }
    }
    Ok(())
}
