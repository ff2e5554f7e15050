//! PMBM filter configuration
//!
//! All thresholds used by association, hypothesis management and
//! extraction live here. Nothing in the recursion is hard-coded.

use nalgebra::RealField;

use crate::error::{PmbmError, Result};
use crate::utils::PruningConfig;

/// Tunables of the PMBM recursion.
///
/// Probabilities and relative thresholds are plain (not log) values. The
/// merge and gating thresholds are Mahalanobis distances, respectively a
/// squared Mahalanobis distance for the gate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PmbmConfig<T: RealField> {
    /// Number of ranked assignments (children) requested per parent hypothesis
    pub max_hypotheses_per_parent: usize,
    /// Maximum number of global hypotheses kept after management
    pub max_global_hypotheses: usize,
    /// Hypotheses lighter than this fraction of the best weight are pruned
    pub hypothesis_prune_threshold: T,
    /// Bernoullis with a lower existence probability are removed
    pub min_existence_probability: T,
    /// Mahalanobis distance below which variants of the same track are merged
    pub merge_threshold: T,
    /// Minimum existence probability for a track to be reported
    pub extraction_threshold: T,
    /// Squared Mahalanobis gate on detection cells (`None` disables gating)
    pub gating_threshold: Option<T>,
    /// Weight below which undetected components are pruned
    pub ppp_prune_threshold: T,
    /// Mahalanobis distance for merging undetected components
    pub ppp_merge_threshold: T,
    /// Maximum number of undetected components
    pub max_ppp_components: usize,
    /// Move pruned Bernoullis back into the undetected density
    pub recycle_pruned_tracks: bool,
}

impl<T: RealField + Copy> PmbmConfig<T> {
    /// Creates the default configuration.
    ///
    /// Default values:
    /// - `max_hypotheses_per_parent`: 20
    /// - `max_global_hypotheses`: 100
    /// - `hypothesis_prune_threshold`: 1e-4
    /// - `min_existence_probability`: 1e-4
    /// - `merge_threshold`: 2.0
    /// - `extraction_threshold`: 0.5
    /// - `gating_threshold`: Some(25.0)
    /// - `ppp_prune_threshold`: 1e-5
    /// - `ppp_merge_threshold`: 4.0
    /// - `max_ppp_components`: 100
    /// - `recycle_pruned_tracks`: false
    pub fn default_config() -> Self {
        Self {
            max_hypotheses_per_parent: 20,
            max_global_hypotheses: 100,
            hypothesis_prune_threshold: nalgebra::convert(1e-4),
            min_existence_probability: nalgebra::convert(1e-4),
            merge_threshold: nalgebra::convert(2.0),
            extraction_threshold: nalgebra::convert(0.5),
            gating_threshold: Some(nalgebra::convert(25.0)),
            ppp_prune_threshold: nalgebra::convert(1e-5),
            ppp_merge_threshold: nalgebra::convert(4.0),
            max_ppp_components: 100,
            recycle_pruned_tracks: false,
        }
    }

    /// Creates a lightweight configuration for testing or low-latency applications.
    pub fn lightweight() -> Self {
        Self {
            max_hypotheses_per_parent: 5,
            max_global_hypotheses: 20,
            hypothesis_prune_threshold: nalgebra::convert(1e-3),
            min_existence_probability: nalgebra::convert(1e-3),
            merge_threshold: nalgebra::convert(3.0),
            extraction_threshold: nalgebra::convert(0.5),
            gating_threshold: Some(nalgebra::convert(16.0)),
            ppp_prune_threshold: nalgebra::convert(1e-4),
            ppp_merge_threshold: nalgebra::convert(4.0),
            max_ppp_components: 30,
            recycle_pruned_tracks: false,
        }
    }

    /// Creates a high-fidelity configuration that keeps more hypotheses.
    pub fn high_fidelity() -> Self {
        Self {
            max_hypotheses_per_parent: 50,
            max_global_hypotheses: 500,
            hypothesis_prune_threshold: nalgebra::convert(1e-6),
            min_existence_probability: nalgebra::convert(1e-5),
            merge_threshold: nalgebra::convert(1.0),
            extraction_threshold: nalgebra::convert(0.5),
            gating_threshold: Some(nalgebra::convert(36.0)),
            ppp_prune_threshold: nalgebra::convert(1e-6),
            ppp_merge_threshold: nalgebra::convert(2.0),
            max_ppp_components: 300,
            recycle_pruned_tracks: true,
        }
    }

    /// Sets the number of children per parent hypothesis.
    pub fn with_max_hypotheses_per_parent(mut self, k: usize) -> Self {
        self.max_hypotheses_per_parent = k;
        self
    }

    /// Sets the global hypothesis cap.
    pub fn with_max_global_hypotheses(mut self, max: usize) -> Self {
        self.max_global_hypotheses = max;
        self
    }

    /// Sets the relative hypothesis pruning threshold.
    pub fn with_hypothesis_prune_threshold(mut self, threshold: T) -> Self {
        self.hypothesis_prune_threshold = threshold;
        self
    }

    /// Sets the minimum existence probability of a kept Bernoulli.
    pub fn with_min_existence_probability(mut self, r: T) -> Self {
        self.min_existence_probability = r;
        self
    }

    /// Sets the variant merge distance.
    pub fn with_merge_threshold(mut self, threshold: T) -> Self {
        self.merge_threshold = threshold;
        self
    }

    /// Sets the extraction threshold.
    pub fn with_extraction_threshold(mut self, threshold: T) -> Self {
        self.extraction_threshold = threshold;
        self
    }

    /// Sets (or disables) the detection gate.
    pub fn with_gating_threshold(mut self, gate: Option<T>) -> Self {
        self.gating_threshold = gate;
        self
    }

    /// Sets the undetected-density maintenance parameters.
    pub fn with_ppp_pruning(mut self, prune: T, merge: T, max_components: usize) -> Self {
        self.ppp_prune_threshold = prune;
        self.ppp_merge_threshold = merge;
        self.max_ppp_components = max_components;
        self
    }

    /// Enables or disables recycling of pruned tracks.
    pub fn with_recycling(mut self, recycle: bool) -> Self {
        self.recycle_pruned_tracks = recycle;
        self
    }

    /// Pruning parameters for the undetected density.
    pub fn ppp_pruning(&self) -> PruningConfig<T> {
        PruningConfig::new(
            self.ppp_prune_threshold,
            self.ppp_merge_threshold,
            self.max_ppp_components,
        )
    }

    /// Checks every field against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`PmbmError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_hypotheses_per_parent == 0 {
            return Err(invalid("max_hypotheses_per_parent must be at least 1"));
        }
        if self.max_global_hypotheses == 0 {
            return Err(invalid("max_global_hypotheses must be at least 1"));
        }
        if self.max_ppp_components == 0 {
            return Err(invalid("max_ppp_components must be at least 1"));
        }

        check_probability("hypothesis_prune_threshold", self.hypothesis_prune_threshold)?;
        check_probability("min_existence_probability", self.min_existence_probability)?;
        check_probability("extraction_threshold", self.extraction_threshold)?;
        if self.min_existence_probability >= T::one() {
            return Err(invalid("min_existence_probability must be below 1"));
        }

        check_non_negative("merge_threshold", self.merge_threshold)?;
        check_non_negative("ppp_prune_threshold", self.ppp_prune_threshold)?;
        check_non_negative("ppp_merge_threshold", self.ppp_merge_threshold)?;

        if let Some(gate) = self.gating_threshold {
            if !(gate > T::zero()) || !gate.is_finite() {
                return Err(invalid("gating_threshold must be positive and finite"));
            }
        }

        Ok(())
    }
}

impl<T: RealField + Copy> Default for PmbmConfig<T> {
    fn default() -> Self {
        Self::default_config()
    }
}

fn invalid(message: &str) -> PmbmError {
    PmbmError::Configuration(message.into())
}

fn check_probability<T: RealField + Copy>(name: &str, value: T) -> Result<()> {
    if value >= T::zero() && value <= T::one() {
        Ok(())
    } else {
        Err(PmbmError::Configuration(format!("{} must lie in [0, 1]", name)))
    }
}

fn check_non_negative<T: RealField + Copy>(name: &str, value: T) -> Result<()> {
    if value >= T::zero() && value.is_finite() {
        Ok(())
    } else {
        Err(PmbmError::Configuration(format!(
            "{} must be finite and non-negative",
            name
        )))
    }
}
