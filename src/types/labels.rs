//! Track identities
//!
//! Every Bernoulli track carries a label that persists across time steps,
//! enabling track continuity and trajectory estimation.

// ============================================================================
// Track Identity
// ============================================================================

/// A unique, persistent identifier for a track.
///
/// A track is born from exactly one measurement, so the pair
/// `(birth_time, index)` of the birth step and the measurement's position in
/// that scan is unique within a filter instance. Since the same measurement
/// spawns the same track in every global hypothesis, identities agree
/// across hypotheses without any shared counter.
///
/// Ordering is lexicographic on `(birth_time, index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackId {
    /// Time step when the track was born
    pub birth_time: u32,
    /// Index of the birth measurement within its scan
    pub index: u32,
}

impl TrackId {
    /// Creates a new track identity.
    #[inline]
    pub const fn new(birth_time: u32, index: u32) -> Self {
        Self { birth_time, index }
    }

    /// Identity of the track spawned by measurement `index` at `time`.
    #[inline]
    pub fn from_measurement(time: u32, index: usize) -> Self {
        Self {
            birth_time: time,
            index: u32::try_from(index).unwrap_or(u32::MAX),
        }
    }
}

impl core::fmt::Display for TrackId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.birth_time, self.index)
    }
}
