//! PMBM Filter Implementation
//!
//! Poisson Multi-Bernoulli Mixture filter for multi-target tracking.
//!
//! The PMBM density is the conjugate prior for the standard point-target
//! model: a Poisson point process describes objects that have never been
//! detected, and a mixture of multi-Bernoulli densities (the global
//! hypotheses) describes objects that have.
//!
//! # Type Safety
//!
//! The filter uses phase markers (`Predicted`/`Updated`) to ensure correct
//! operation ordering at compile time:
//! - `predict()` takes an `Updated` belief and returns a `Predicted` belief
//! - `update()` takes a `Predicted` belief and returns an `Updated` belief
//!
//! Neither consumes its input. A failed step leaves the caller's belief
//! untouched.
//!
//! # Reference
//!
//! Williams, J. L. (2015). "Marginal multi-Bernoulli filters: RFS derivation
//! of MHT, JIPDA, and association-based MeMBer"
//!
//! García-Fernández, Á. F., Williams, J. L., Granström, K., & Svensson, L.
//! (2018). "Poisson Multi-Bernoulli Mixture Filter: Direct Derivation and
//! Implementation"

use std::collections::BTreeMap;

use log::{debug, trace, warn};
use nalgebra::RealField;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::association::{BranchTable, ChildBatch};
use super::bernoulli::BernoulliTrack;
use super::config::PmbmConfig;
use super::extraction::TrackEstimate;
use super::hypothesis::{GlobalHypothesis, PmbmBelief};
use super::manager::HypothesisManager;
use super::ppp::PoissonDensity;
use crate::assignment::{AssignmentRanker, MurtyRanker};
use crate::error::{PmbmError, Result};
use crate::filters::kalman::KalmanFilter;
use crate::models::{ClutterModel, ObservationModel, TransitionModel};
use crate::types::gaussian::GaussianMixture;
use crate::types::phase::{Predicted, StepStats, Updated};
use crate::types::spaces::Measurement;
use crate::utils::to_f64;

// ============================================================================
// Step Output
// ============================================================================

/// Result of one full filter step.
#[derive(Debug, Clone)]
pub struct StepOutput<T: RealField, const N: usize> {
    /// Updated and managed belief
    pub belief: PmbmBelief<T, N, Updated>,
    /// Estimates from the best hypothesis
    pub estimates: Vec<TrackEstimate<T, N>>,
    /// Diagnostics of the step
    pub stats: StepStats,
}

// ============================================================================
// PMBM Filter
// ============================================================================

/// Gaussian-mixture PMBM filter.
///
/// # Type Parameters
///
/// - `T`: Scalar type (e.g., `f64`)
/// - `Trans`: Transition model type
/// - `Obs`: Observation model type
/// - `Clutter`: Clutter model type
/// - `N`: State dimension
/// - `M`: Measurement dimension
pub struct PmbmFilter<T, Trans, Obs, Clutter, const N: usize, const M: usize>
where
    T: RealField + Copy,
    Trans: TransitionModel<T, N>,
    Obs: ObservationModel<T, N, M>,
    Clutter: ClutterModel<T, M>,
{
    /// Kalman kernel binding the motion and sensor models
    pub kalman: KalmanFilter<T, Trans, Obs, N, M>,
    /// Clutter model
    pub clutter: Clutter,
    config: PmbmConfig<T>,
    ranker: Box<dyn AssignmentRanker>,
}

impl<T, Trans, Obs, Clutter, const N: usize, const M: usize> core::fmt::Debug
    for PmbmFilter<T, Trans, Obs, Clutter, N, M>
where
    T: RealField + Copy,
    Trans: TransitionModel<T, N> + core::fmt::Debug,
    Obs: ObservationModel<T, N, M> + core::fmt::Debug,
    Clutter: ClutterModel<T, M> + core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PmbmFilter")
            .field("kalman", &self.kalman)
            .field("clutter", &self.clutter)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T, Trans, Obs, Clutter, const N: usize, const M: usize>
    PmbmFilter<T, Trans, Obs, Clutter, N, M>
where
    T: RealField + Copy,
    Trans: TransitionModel<T, N>,
    Obs: ObservationModel<T, N, M>,
    Clutter: ClutterModel<T, M>,
{
    /// Creates a new PMBM filter using Murty's k-best ranking.
    ///
    /// # Errors
    ///
    /// Returns [`PmbmError::Configuration`] if the configuration is invalid.
    pub fn new(
        transition: Trans,
        observation: Obs,
        clutter: Clutter,
        config: PmbmConfig<T>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            kalman: KalmanFilter::new(transition, observation),
            clutter,
            config,
            ranker: Box::new(MurtyRanker),
        })
    }

    /// Replaces the ranked-assignment algorithm.
    pub fn with_ranker<R: AssignmentRanker + 'static>(mut self, ranker: R) -> Self {
        self.ranker = Box::new(ranker);
        self
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &PmbmConfig<T> {
        &self.config
    }

    /// Creates the initial belief: no detected tracks, a single empty
    /// hypothesis of weight one and the birth intensity as undetected density.
    ///
    /// # Errors
    ///
    /// Returns [`PmbmError::Configuration`] if the birth mixture has a
    /// negative or non-finite weight or an asymmetric covariance.
    pub fn initialize(&self, birth: GaussianMixture<T, N>) -> Result<PmbmBelief<T, N, Updated>> {
        let ppp = PoissonDensity::new(birth)?;
        Ok(PmbmBelief::from_components(
            ppp,
            Vec::new(),
            vec![GlobalHypothesis::empty(T::zero())],
            0,
        ))
    }

    /// Creates an initial belief with known tracks in a single hypothesis.
    ///
    /// Track identities must be distinct and have birth time 0. Tracks
    /// started by measurements get birth time 1 or later, so seeded
    /// identities can never be reused.
    ///
    /// # Errors
    ///
    /// Returns [`PmbmError::Configuration`] for an invalid birth mixture,
    /// a duplicate identity, an identity with a nonzero birth time, or an
    /// existence probability outside [0, 1].
    pub fn initialize_with_tracks(
        &self,
        birth: GaussianMixture<T, N>,
        tracks: Vec<BernoulliTrack<T, N>>,
    ) -> Result<PmbmBelief<T, N, Updated>> {
        let ppp = PoissonDensity::new(birth)?;

        let mut members = BTreeMap::new();
        for (i, track) in tracks.iter().enumerate() {
            if track.id.birth_time != 0 {
                return Err(PmbmError::Configuration(format!(
                    "seeded track {} must have birth time 0",
                    track.id
                )));
            }
            if !(track.existence >= T::zero() && track.existence <= T::one()) {
                return Err(PmbmError::Configuration(format!(
                    "track {} has existence outside [0, 1]",
                    track.id
                )));
            }
            if members.insert(track.id, i).is_some() {
                return Err(PmbmError::Configuration(format!(
                    "duplicate track identity {}",
                    track.id
                )));
            }
        }

        Ok(PmbmBelief::from_components(
            ppp,
            tracks,
            vec![GlobalHypothesis::new(T::zero(), members, 0)],
            0,
        ))
    }

    /// Predicts the belief to the next time step.
    ///
    /// Every variant in the arena is predicted once, so hypotheses keep
    /// their indices.
    pub fn predict(
        &self,
        belief: &PmbmBelief<T, N, Updated>,
        dt: T,
    ) -> PmbmBelief<T, N, Predicted> {
        let ppp = belief.ppp.predict(&self.kalman, dt);
        let arena = belief
            .arena
            .iter()
            .map(|track| track.predict(&self.kalman, dt))
            .collect();

        PmbmBelief::from_components(
            ppp,
            arena,
            belief.hypotheses.clone(),
            belief.time_step.saturating_add(1),
        )
    }

    /// Updates a predicted belief with a scan and runs hypothesis management.
    ///
    /// # Errors
    ///
    /// - [`PmbmError::InvalidMeasurement`] if a measurement is not finite
    /// - [`PmbmError::NumericalInstability`] if the hypothesis weights
    ///   cannot be normalized
    pub fn update(
        &self,
        predicted: &PmbmBelief<T, N, Predicted>,
        measurements: &[Measurement<T, M>],
    ) -> Result<(PmbmBelief<T, N, Updated>, StepStats)> {
        validate_measurements(measurements)?;

        let time = predicted.time_step;
        let k = self.config.max_hypotheses_per_parent;
        let mut stats = StepStats::default();

        let table = BranchTable::build(
            &predicted.arena,
            &predicted.ppp,
            &self.kalman,
            &self.clutter,
            measurements,
            self.config.gating_threshold,
            time,
            &mut stats,
        );

        let batches = self.generate_children(&table, &predicted.hypotheses, k);

        let mut hypotheses = Vec::new();
        for (parent, batch) in batches.into_iter().enumerate() {
            if batch.fallback {
                warn!(
                    "{}",
                    PmbmError::InfeasibleAssociation {
                        tracks: predicted.hypotheses[parent].num_tracks(),
                        measurements: measurements.len(),
                    }
                );
                stats.infeasible_association_count += 1;
            }
            trace!(
                "step {}: parent {} produced {} children",
                time,
                parent,
                batch.children.len()
            );
            for (log_weight, members) in batch.children {
                let seq = hypotheses.len() as u64;
                hypotheses.push(GlobalHypothesis::new(log_weight, members, seq));
            }
        }
        stats.hypotheses_generated = hypotheses.len();

        let ppp = predicted.ppp.apply_missed_detection(&self.kalman);
        let raw = PmbmBelief::from_components(ppp, table.arena, hypotheses, time);
        let belief = HypothesisManager::new(&self.config).manage(raw, &mut stats)?;

        if stats.singular_covariance_count > 0 {
            warn!(
                "step {}: {} singular innovation covariances treated as infeasible",
                time, stats.singular_covariance_count
            );
        }
        debug!(
            "step {}: {} measurements, {} -> {} hypotheses, {} variants, undetected mass {:.4}",
            time,
            measurements.len(),
            stats.hypotheses_generated,
            stats.hypotheses_retained,
            belief.num_variants(),
            to_f64(belief.ppp.expected_count())
        );

        Ok((belief, stats))
    }

    #[cfg(feature = "rayon")]
    fn generate_children(
        &self,
        table: &BranchTable<T, N>,
        parents: &[GlobalHypothesis<T>],
        k: usize,
    ) -> Vec<ChildBatch<T>> {
        let ranker = self.ranker.as_ref();
        parents
            .par_iter()
            .map(|parent| table.children(parent, ranker, k))
            .collect()
    }

    #[cfg(not(feature = "rayon"))]
    fn generate_children(
        &self,
        table: &BranchTable<T, N>,
        parents: &[GlobalHypothesis<T>],
        k: usize,
    ) -> Vec<ChildBatch<T>> {
        let ranker = self.ranker.as_ref();
        parents
            .iter()
            .map(|parent| table.children(parent, ranker, k))
            .collect()
    }

    /// Extracts estimates using the configured extraction threshold.
    pub fn extract(&self, belief: &PmbmBelief<T, N, Updated>) -> Vec<TrackEstimate<T, N>> {
        belief.extract(self.config.extraction_threshold)
    }

    /// Runs a full step: predict, update, manage and extract.
    ///
    /// `measurements` may be empty. On error the input belief is still
    /// valid and can be reused.
    pub fn step(
        &self,
        belief: &PmbmBelief<T, N, Updated>,
        measurements: &[Measurement<T, M>],
        dt: T,
    ) -> Result<StepOutput<T, N>> {
        validate_measurements(measurements)?;

        let predicted = self.predict(belief, dt);
        let (belief, stats) = self.update(&predicted, measurements)?;
        let estimates = self.extract(&belief);

        Ok(StepOutput {
            belief,
            estimates,
            stats,
        })
    }
}

/// Rejects scans containing NaN or infinite values.
fn validate_measurements<T: RealField + Copy, const M: usize>(
    measurements: &[Measurement<T, M>],
) -> Result<()> {
    match measurements.iter().position(|z| !z.is_finite()) {
        Some(index) => Err(PmbmError::InvalidMeasurement { index }),
        None => Ok(()),
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Owns a filter and its belief and advances them atomically.
///
/// The stored belief is replaced only when a step succeeds.
pub struct PmbmTracker<T, Trans, Obs, Clutter, const N: usize, const M: usize>
where
    T: RealField + Copy,
    Trans: TransitionModel<T, N>,
    Obs: ObservationModel<T, N, M>,
    Clutter: ClutterModel<T, M>,
{
    filter: PmbmFilter<T, Trans, Obs, Clutter, N, M>,
    belief: PmbmBelief<T, N, Updated>,
    last_stats: StepStats,
}

impl<T, Trans, Obs, Clutter, const N: usize, const M: usize>
    PmbmTracker<T, Trans, Obs, Clutter, N, M>
where
    T: RealField + Copy,
    Trans: TransitionModel<T, N>,
    Obs: ObservationModel<T, N, M>,
    Clutter: ClutterModel<T, M>,
{
    /// Creates a tracker from a filter and a birth intensity.
    ///
    /// # Errors
    ///
    /// Returns [`PmbmError::Configuration`] if the birth mixture is invalid.
    pub fn new(
        filter: PmbmFilter<T, Trans, Obs, Clutter, N, M>,
        birth: GaussianMixture<T, N>,
    ) -> Result<Self> {
        let belief = filter.initialize(birth)?;
        Ok(Self {
            filter,
            belief,
            last_stats: StepStats::default(),
        })
    }

    /// Creates a tracker from an existing belief.
    pub fn from_belief(
        filter: PmbmFilter<T, Trans, Obs, Clutter, N, M>,
        belief: PmbmBelief<T, N, Updated>,
    ) -> Self {
        Self {
            filter,
            belief,
            last_stats: StepStats::default(),
        }
    }

    /// Processes one scan and returns the current estimates.
    ///
    /// # Errors
    ///
    /// Propagates the step error; the stored belief is left unchanged.
    pub fn step(
        &mut self,
        measurements: &[Measurement<T, M>],
        dt: T,
    ) -> Result<Vec<TrackEstimate<T, N>>> {
        let output = self.filter.step(&self.belief, measurements, dt)?;
        self.belief = output.belief;
        self.last_stats = output.stats;
        Ok(output.estimates)
    }

    /// Current belief.
    #[inline]
    pub fn belief(&self) -> &PmbmBelief<T, N, Updated> {
        &self.belief
    }

    /// Statistics of the last successful step.
    #[inline]
    pub fn last_stats(&self) -> &StepStats {
        &self.last_stats
    }

    /// The underlying filter.
    #[inline]
    pub fn filter(&self) -> &PmbmFilter<T, Trans, Obs, Clutter, N, M> {
        &self.filter
    }

    /// Current estimates.
    pub fn estimates(&self) -> Vec<TrackEstimate<T, N>> {
        self.filter.extract(&self.belief)
    }

    /// Consumes the tracker and returns the belief.
    pub fn into_belief(self) -> PmbmBelief<T, N, Updated> {
        self.belief
    }
}
