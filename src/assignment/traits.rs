//! Ranked assignment interface
//!
//! The PMBM update only needs the k cheapest assignments of a cost matrix.
//! Any algorithm producing them can be plugged into the filter.

use super::hungarian::{murty_k_best, Assignment, CostMatrix};

/// Ranks the k lowest-cost assignments of a cost matrix.
///
/// Implementations must return distinct assignments sorted by ascending
/// cost, breaking ties by the lexicographically smaller row-major mapping,
/// and never select an infinite-cost pair. An empty result means the matrix
/// has no feasible assignment.
pub trait AssignmentRanker: Send + Sync {
    /// Returns up to `k` assignments in ranking order.
    fn rank_assignments(&self, cost: &CostMatrix, k: usize) -> Vec<Assignment>;
}

/// Murty's k-best ranking over the shortest augmenting path solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct MurtyRanker;

impl AssignmentRanker for MurtyRanker {
    fn rank_assignments(&self, cost: &CostMatrix, k: usize) -> Vec<Assignment> {
        murty_k_best(cost, k)
    }
}
