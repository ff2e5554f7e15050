// ============================================================================
// Filter Phase Markers
// ============================================================================

/// Marker type indicating a predicted filter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Predicted;

/// Marker type indicating an updated filter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Updated;

// ============================================================================
// Step Statistics
// ============================================================================

/// Statistics from a filter step, reporting recovered numerical issues and
/// hypothesis bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Number of (component, measurement) pairs whose innovation covariance
    /// was not positive definite
    pub singular_covariance_count: usize,
    /// Number of pairs whose detection likelihood evaluated to zero
    pub zero_likelihood_count: usize,
    /// Number of (track, measurement) pairs rejected by the gate
    pub gated_pair_count: usize,
    /// Number of parent hypotheses that fell back to the all-miss child
    pub infeasible_association_count: usize,
    /// Child hypotheses produced before management
    pub hypotheses_generated: usize,
    /// Hypotheses retained after management
    pub hypotheses_retained: usize,
    /// Bernoulli components dropped for low existence
    pub bernoullis_pruned: usize,
    /// Track variants absorbed by merging
    pub variants_merged: usize,
}

impl StepStats {
    /// Returns true if any numerical or association issue was encountered.
    pub fn has_issues(&self) -> bool {
        self.singular_covariance_count > 0
            || self.zero_likelihood_count > 0
            || self.infeasible_association_count > 0
    }
}
