//! Bernoulli track components
//!
//! A Bernoulli component describes one potential object: it exists with
//! probability `r` and, if it does, its state is Gaussian. Every update
//! produces new sibling values (miss and one per measurement). The parent is
//! never modified, since it may feed several global hypotheses at once.

use nalgebra::RealField;

use crate::error::Result;
use crate::filters::kalman::KalmanFilter;
use crate::models::{ObservationModel, TransitionModel};
use crate::types::gaussian::GaussianState;
use crate::types::labels::TrackId;
use crate::types::spaces::Measurement;
use crate::utils::ln_floored;

// ============================================================================
// Bernoulli Track
// ============================================================================

/// A labeled Bernoulli component.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BernoulliTrack<T: RealField, const N: usize> {
    /// Persistent track identity
    pub id: TrackId,
    /// Existence probability r ∈ [0, 1]
    pub existence: T,
    /// Gaussian state (weight unused, kept at one)
    pub state: GaussianState<T, N>,
    /// Time step of birth
    pub birth_time: u32,
    /// Time step of the most recent detection
    pub last_detection: u32,
    /// Measurement used at the latest update (`None` for a miss)
    pub measurement_index: Option<usize>,
}

/// One outcome of a Bernoulli update together with its likelihood.
#[derive(Debug, Clone, PartialEq)]
pub struct BernoulliBranch<T: RealField, const N: usize> {
    /// Posterior Bernoulli
    pub track: BernoulliTrack<T, N>,
    /// Log-likelihood of the outcome
    pub log_likelihood: T,
}

impl<T: RealField + Copy, const N: usize> BernoulliTrack<T, N> {
    /// Creates a new track born (and detected) at `birth_time`.
    ///
    /// The existence probability is clamped to [0, 1].
    pub fn new(id: TrackId, existence: T, state: GaussianState<T, N>, birth_time: u32) -> Self {
        Self {
            id,
            existence: existence.max(T::zero()).min(T::one()),
            state: state.with_weight(T::one()),
            birth_time,
            last_detection: birth_time,
            measurement_index: None,
        }
    }

    /// Track started by measurement `index` at time `time`.
    pub(crate) fn from_measurement(
        time: u32,
        index: usize,
        existence: T,
        state: GaussianState<T, N>,
    ) -> Self {
        let mut track = Self::new(TrackId::from_measurement(time, index), existence, state, time);
        track.measurement_index = Some(index);
        track
    }

    /// Predicts the track one step ahead.
    ///
    /// - r' = p_S(x) r
    /// - state through the Kalman prediction
    pub fn predict<Trans, Obs, const M: usize>(
        &self,
        kalman: &KalmanFilter<T, Trans, Obs, N, M>,
        dt: T,
    ) -> Self
    where
        Trans: TransitionModel<T, N>,
        Obs: ObservationModel<T, N, M>,
    {
        let p_s = kalman.survival_probability(&self.state.mean);
        Self {
            id: self.id,
            existence: (p_s * self.existence).min(T::one()),
            state: kalman.predict(&self.state, dt),
            birth_time: self.birth_time,
            last_detection: self.last_detection,
            measurement_index: None,
        }
    }

    /// Missed-detection branch.
    ///
    /// - l = 1 - r p_D
    /// - r' = r (1 - p_D) / (1 - r p_D)
    ///
    /// When a miss is impossible (`r p_D = 1`) the likelihood is floored and
    /// the posterior existence is zero.
    pub fn miss(&self, p_detection: T) -> BernoulliBranch<T, N> {
        let likelihood = T::one() - self.existence * p_detection;
        let existence = if likelihood > T::zero() {
            (self.existence * (T::one() - p_detection) / likelihood)
                .max(T::zero())
                .min(T::one())
        } else {
            T::zero()
        };

        BernoulliBranch {
            track: Self {
                existence,
                measurement_index: None,
                ..self.clone()
            },
            log_likelihood: ln_floored(likelihood),
        }
    }

    /// Detection branch for measurement `index` of the scan at `time`.
    ///
    /// - l = r p_D N(z; z_hat, S)
    /// - r' = 1, Kalman-updated state
    ///
    /// Also returns the squared Mahalanobis distance of the innovation.
    /// The log-likelihood is negative infinity when `r p_D = 0`.
    ///
    /// # Errors
    ///
    /// Returns [`PmbmError::NumericalInstability`](crate::PmbmError::NumericalInstability)
    /// if the innovation covariance is not positive definite.
    pub fn detect<Trans, Obs, const M: usize>(
        &self,
        kalman: &KalmanFilter<T, Trans, Obs, N, M>,
        measurement: &Measurement<T, M>,
        index: usize,
        time: u32,
    ) -> Result<(BernoulliBranch<T, N>, T)>
    where
        Trans: TransitionModel<T, N>,
        Obs: ObservationModel<T, N, M>,
    {
        let p_d = kalman.detection_probability(&self.state.mean);
        let update = kalman.update(&self.state, measurement)?;

        let prior = self.existence * p_d;
        let log_likelihood = if prior > T::zero() {
            prior.ln() + update.log_likelihood
        } else {
            nalgebra::convert(f64::NEG_INFINITY)
        };

        let branch = BernoulliBranch {
            track: Self {
                id: self.id,
                existence: T::one(),
                state: update.state,
                birth_time: self.birth_time,
                last_detection: time,
                measurement_index: Some(index),
            },
            log_likelihood,
        };
        Ok((branch, update.mahalanobis_squared))
    }
}
