//! Global hypotheses and the PMBM belief
//!
//! Bernoulli variants live in a flat arena owned by the belief. A global
//! hypothesis is a weight plus a map from track identity to the arena index
//! of the variant it selects, so variants shared by many hypotheses are
//! stored once.

use core::marker::PhantomData;
use std::collections::BTreeMap;

use nalgebra::RealField;

use super::bernoulli::BernoulliTrack;
use super::ppp::PoissonDensity;
use crate::types::labels::TrackId;
use crate::types::phase::Updated;

// ============================================================================
// Global Hypothesis
// ============================================================================

/// One mutually exclusive explanation of all measurements so far.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalHypothesis<T: RealField> {
    /// Log weight (normalized after every update)
    pub log_weight: T,
    /// Track identity to arena index of the selected variant
    pub members: BTreeMap<TrackId, usize>,
    /// Creation order within the step, used to break weight ties
    pub seq: u64,
}

impl<T: RealField + Copy> GlobalHypothesis<T> {
    /// Creates a hypothesis without tracks.
    #[inline]
    pub fn empty(log_weight: T) -> Self {
        Self {
            log_weight,
            members: BTreeMap::new(),
            seq: 0,
        }
    }

    /// Creates a hypothesis with the given members.
    #[inline]
    pub fn new(log_weight: T, members: BTreeMap<TrackId, usize>, seq: u64) -> Self {
        Self {
            log_weight,
            members,
            seq,
        }
    }

    /// Returns the weight (exponentiated log weight).
    #[inline]
    pub fn weight(&self) -> T {
        self.log_weight.exp()
    }

    /// Number of tracks in this hypothesis.
    #[inline]
    pub fn num_tracks(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the hypothesis contains the given track.
    #[inline]
    pub fn contains(&self, id: TrackId) -> bool {
        self.members.contains_key(&id)
    }

    /// Iterates over the selected variants in ascending track order.
    pub fn tracks<'a, const N: usize>(
        &'a self,
        arena: &'a [BernoulliTrack<T, N>],
    ) -> impl Iterator<Item = &'a BernoulliTrack<T, N>> + 'a {
        self.members.values().filter_map(move |&i| arena.get(i))
    }
}

// ============================================================================
// PMBM Belief
// ============================================================================

/// The full PMBM density at one phase of the recursion.
///
/// The `Phase` parameter is either [`Predicted`](crate::types::phase::Predicted)
/// or [`Updated`]. Only updated beliefs can be predicted, and only predicted
/// beliefs can be updated.
///
/// # Type Parameters
///
/// - `T`: Scalar type (e.g., `f64`)
/// - `N`: State dimension
/// - `Phase`: Either `Predicted` or `Updated`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PmbmBelief<T: RealField, const N: usize, Phase = Updated> {
    /// Undetected objects and the birth intensity
    pub ppp: PoissonDensity<T, N>,
    /// Bernoulli variants referenced by the hypotheses
    pub arena: Vec<BernoulliTrack<T, N>>,
    /// Global hypotheses
    pub hypotheses: Vec<GlobalHypothesis<T>>,
    /// Current time step
    pub time_step: u32,
    /// Phase marker
    #[cfg_attr(feature = "serde", serde(skip))]
    _phase: PhantomData<Phase>,
}

impl<T: RealField + Copy, const N: usize, Phase> PmbmBelief<T, N, Phase> {
    /// Creates a belief from its parts (for internal use).
    pub(crate) fn from_components(
        ppp: PoissonDensity<T, N>,
        arena: Vec<BernoulliTrack<T, N>>,
        hypotheses: Vec<GlobalHypothesis<T>>,
        time_step: u32,
    ) -> Self {
        Self {
            ppp,
            arena,
            hypotheses,
            time_step,
            _phase: PhantomData,
        }
    }

    /// Number of global hypotheses.
    #[inline]
    pub fn num_hypotheses(&self) -> usize {
        self.hypotheses.len()
    }

    /// Number of stored Bernoulli variants.
    #[inline]
    pub fn num_variants(&self) -> usize {
        self.arena.len()
    }

    /// Distinct track identities across all hypotheses.
    pub fn track_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self
            .hypotheses
            .iter()
            .flat_map(|h| h.members.keys().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Sum of the hypothesis weights (one after every update).
    pub fn total_weight(&self) -> T {
        self.hypotheses
            .iter()
            .fold(T::zero(), |acc, h| acc + h.weight())
    }

    /// Returns the tracks selected by a hypothesis.
    pub fn tracks_of<'a>(
        &'a self,
        hypothesis: &'a GlobalHypothesis<T>,
    ) -> impl Iterator<Item = &'a BernoulliTrack<T, N>> + 'a {
        hypothesis.tracks(&self.arena)
    }

    /// Checks the structural invariants of the belief.
    ///
    /// Every member index points into the arena at a variant with the same
    /// identity, and no measurement of the latest scan is claimed twice
    /// within a hypothesis.
    pub fn is_consistent(&self) -> bool {
        self.hypotheses.iter().all(|h| {
            let mut claimed: Vec<usize> = Vec::with_capacity(h.members.len());
            for (id, &i) in &h.members {
                let Some(track) = self.arena.get(i) else {
                    return false;
                };
                if track.id != *id {
                    return false;
                }
                if track.last_detection == self.time_step {
                    if let Some(j) = track.measurement_index {
                        if claimed.contains(&j) {
                            return false;
                        }
                        claimed.push(j);
                    }
                }
            }
            true
        })
    }
}
