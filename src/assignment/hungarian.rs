//! Hungarian Algorithm for Optimal Assignment
//!
//! Shortest augmenting path (Jonker-Volgenant style) solver for the linear
//! assignment problem in O(n²m) time, plus Murty's algorithm for ranking
//! the k best assignments.
//!
//! Infeasible pairs are marked with `f64::INFINITY`. They are never chosen,
//! and a problem in which every row cannot be matched is reported as
//! infeasible instead of being padded with a large finite cost.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{PmbmError, Result};

/// Result of an assignment problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Assignment mapping: row i is assigned to column mapping[i]
    /// None means the row is unassigned
    pub mapping: Vec<Option<usize>>,
    /// Total cost of the assignment
    pub cost: f64,
}

impl Assignment {
    /// Creates a new assignment with the given mapping and cost.
    pub fn new(mapping: Vec<Option<usize>>, cost: f64) -> Self {
        Self { mapping, cost }
    }

    /// Returns the number of assigned pairs.
    pub fn num_assigned(&self) -> usize {
        self.mapping.iter().filter(|x| x.is_some()).count()
    }

    /// Ranking order: ascending cost, then lexicographically smaller mapping.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.mapping.cmp(&other.mapping))
    }
}

/// Cost matrix for assignment problems.
///
/// `f64::INFINITY` marks an infeasible pair. NaN entries are stored as
/// infinity.
#[derive(Debug, Clone, PartialEq)]
pub struct CostMatrix {
    /// Row-major cost data
    data: Vec<f64>,
    /// Number of rows
    rows: usize,
    /// Number of columns
    cols: usize,
}

impl CostMatrix {
    /// Creates a cost matrix from row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`PmbmError::DimensionMismatch`] if `data.len() != rows * cols`.
    pub fn from_vec(mut data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(PmbmError::DimensionMismatch {
                len: data.len(),
                rows,
                cols,
            });
        }
        for value in &mut data {
            if value.is_nan() {
                *value = f64::INFINITY;
            }
        }
        Ok(Self { data, rows, cols })
    }

    /// Creates a cost matrix filled with a value.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        let value = if value.is_nan() { f64::INFINITY } else { value };
        Self {
            data: vec![value; rows * cols],
            rows,
            cols,
        }
    }

    /// Creates a cost matrix in which every pair is infeasible.
    pub fn infeasible(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, f64::INFINITY)
    }

    /// Creates a zero-filled cost matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Returns the number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Gets the cost at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Sets the cost at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = if value.is_nan() {
            f64::INFINITY
        } else {
            value
        };
    }

    /// Returns true if the pair (row, col) may be assigned.
    pub fn is_feasible(&self, row: usize, col: usize) -> bool {
        self.get(row, col) < f64::INFINITY
    }

    /// Returns the transposed matrix.
    pub fn transpose(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for j in 0..self.cols {
            for i in 0..self.rows {
                data.push(self.get(i, j));
            }
        }
        Self {
            data,
            rows: self.cols,
            cols: self.rows,
        }
    }

    /// Sum of the costs of the assigned pairs in `mapping`.
    fn cost_of(&self, mapping: &[Option<usize>]) -> f64 {
        mapping
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.map(|j| self.get(i, j)))
            .sum()
    }
}

/// Solves the linear assignment problem.
///
/// With `rows <= cols` every row is assigned to a distinct column. With more
/// rows than columns the problem is solved on the transpose, so every column
/// is used and the surplus rows stay unassigned.
///
/// Among columns with equal reduced cost the smallest index is explored
/// first, which makes the result deterministic.
///
/// # Errors
///
/// Returns [`PmbmError::InfeasibleAssociation`] if no assignment avoids the
/// infeasible (infinite-cost) pairs.
pub fn hungarian(cost: &CostMatrix) -> Result<Assignment> {
    let n_rows = cost.rows();
    let n_cols = cost.cols();

    if n_rows == 0 || n_cols == 0 {
        return Ok(Assignment::new(vec![None; n_rows], 0.0));
    }

    if n_rows > n_cols {
        let transposed = solve_rows_le_cols(&cost.transpose())?;
        let mut mapping = vec![None; n_rows];
        for (col, row) in transposed.iter().enumerate() {
            mapping[*row] = Some(col);
        }
        let total = cost.cost_of(&mapping);
        return Ok(Assignment::new(mapping, total));
    }

    let assigned = solve_rows_le_cols(cost)?;
    let mapping: Vec<Option<usize>> = assigned.into_iter().map(Some).collect();
    let total = cost.cost_of(&mapping);
    Ok(Assignment::new(mapping, total))
}

/// Shortest augmenting path with row and column potentials.
///
/// Requires `rows <= cols`. Returns the column of every row.
fn solve_rows_le_cols(cost: &CostMatrix) -> Result<Vec<usize>> {
    let n = cost.rows();
    let m = cost.cols();
    let infeasible = || PmbmError::InfeasibleAssociation {
        tracks: n,
        measurements: m,
    };

    // Index 0 is a virtual column used as the root of each augmenting path,
    // so rows and columns are stored 1-based. `owner[j] == 0` means column j
    // is free.
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; m + 1];
    let mut owner = vec![0_usize; m + 1];
    let mut way = vec![0_usize; m + 1];

    for i in 1..=n {
        owner[0] = i;
        let mut j0 = 0_usize;
        let mut min_to = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = owner[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0_usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost.get(i0 - 1, j - 1) - u[i0] - v[j];
                if reduced < min_to[j] {
                    min_to[j] = reduced;
                    way[j] = j0;
                }
                if min_to[j] < delta {
                    delta = min_to[j];
                    j1 = j;
                }
            }

            // No free column is reachable through feasible pairs
            if !delta.is_finite() || j1 == 0 {
                return Err(infeasible());
            }

            for j in 0..=m {
                if used[j] {
                    u[owner[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_to[j] -= delta;
                }
            }

            j0 = j1;
            if owner[j0] == 0 {
                break;
            }
        }

        // Flip the augmenting path
        loop {
            let j1 = way[j0];
            owner[j0] = owner[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0_usize; n];
    for j in 1..=m {
        if owner[j] != 0 {
            assignment[owner[j] - 1] = j - 1;
        }
    }
    Ok(assignment)
}

// ============================================================================
// Murty's Algorithm for K-Best Assignments
// ============================================================================

/// A node in Murty's partition tree.
///
/// Each node represents a constrained assignment problem where some
/// assignments are required (fixed) and others are forbidden (excluded).
#[derive(Debug, Clone)]
struct MurtyNode {
    /// The assignment solution for this node
    assignment: Assignment,
    /// Row indices that have fixed assignments (row -> col)
    fixed: Vec<(usize, usize)>,
    /// Excluded assignments (row, col) that cannot be made
    excluded: Vec<(usize, usize)>,
    /// The row index up to which we've partitioned
    partition_row: usize,
}

impl MurtyNode {
    fn new(assignment: Assignment) -> Self {
        Self {
            assignment,
            fixed: Vec::new(),
            excluded: Vec::new(),
            partition_row: 0,
        }
    }

    fn with_constraints(
        assignment: Assignment,
        fixed: Vec<(usize, usize)>,
        excluded: Vec<(usize, usize)>,
        partition_row: usize,
    ) -> Self {
        Self {
            assignment,
            fixed,
            excluded,
            partition_row,
        }
    }
}

/// Min-heap wrapper: the cheapest node, then the smallest mapping, pops first.
#[derive(Debug)]
struct HeapNode(MurtyNode);

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapNode {}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior
        other.0.assignment.rank_cmp(&self.0.assignment)
    }
}

/// Solves a constrained assignment problem.
///
/// Some assignments are required (fixed) and some are forbidden (excluded).
/// Returns None if no valid assignment exists.
pub fn hungarian_constrained(
    cost: &CostMatrix,
    fixed: &[(usize, usize)],
    excluded: &[(usize, usize)],
) -> Option<Assignment> {
    let n_rows = cost.rows();
    let n_cols = cost.cols();

    if n_rows == 0 || n_cols == 0 {
        return Some(Assignment::new(vec![None; n_rows], 0.0));
    }

    // Check for conflicting constraints
    for &(r1, c1) in fixed {
        for &(r2, c2) in fixed {
            if r1 != r2 && c1 == c2 {
                return None;
            }
        }
        if excluded.contains(&(r1, c1)) {
            return None;
        }
    }

    let mut modified = cost.clone();

    for &(row, col) in excluded {
        if row < n_rows && col < n_cols {
            modified.set(row, col, f64::INFINITY);
        }
    }

    // A fixed pair is enforced by forbidding every other cell in its row
    // and column
    for &(row, col) in fixed {
        if row < n_rows && col < n_cols {
            for j in 0..n_cols {
                if j != col {
                    modified.set(row, j, f64::INFINITY);
                }
            }
            for i in 0..n_rows {
                if i != row {
                    modified.set(i, col, f64::INFINITY);
                }
            }
        }
    }

    let result = hungarian(&modified).ok()?;

    for &(row, col) in fixed {
        if row < n_rows && result.mapping.get(row).copied().flatten() != Some(col) {
            return None;
        }
    }

    let real_cost = cost.cost_of(&result.mapping);
    if !real_cost.is_finite() {
        return None;
    }

    Some(Assignment::new(result.mapping, real_cost))
}

/// Finds the k-best assignments using Murty's algorithm.
///
/// Murty's algorithm partitions the solution space so the k best solutions
/// are found without exhaustive enumeration.
///
/// The result is sorted by ascending cost. Equal costs are ordered by the
/// lexicographically smaller mapping. To make that hold at the k-th
/// position, nodes tied with the k-th cost are still drained from the queue
/// before truncating, up to a bounded number of extra expansions.
///
/// A matrix with zero rows has exactly one (empty) assignment. An infeasible
/// matrix has none.
pub fn murty_k_best(cost: &CostMatrix, k: usize) -> Vec<Assignment> {
    if k == 0 {
        return Vec::new();
    }

    let best = match hungarian(cost) {
        Ok(a) => a,
        Err(_) => return Vec::new(),
    };

    let mut results: Vec<Assignment> = Vec::with_capacity(k);
    let mut heap: BinaryHeap<HeapNode> = BinaryHeap::new();
    heap.push(HeapNode(MurtyNode::new(best)));

    let n_rows = cost.rows();
    let tie_limit = k.max(n_rows).saturating_mul(4);
    let mut extra = 0_usize;

    while let Some(HeapNode(node)) = heap.pop() {
        if results.len() >= k {
            // Popped costs are non-decreasing
            let kth_cost = results[k - 1].cost;
            if node.assignment.cost > kth_cost || extra >= tie_limit {
                break;
            }
            extra += 1;
        }

        let mapping = &node.assignment.mapping;

        // For each assigned pair starting from partition_row, create a child
        // where that assignment is excluded
        for row in node.partition_row..n_rows {
            if let Some(col) = mapping[row] {
                let mut child_fixed = node.fixed.clone();
                let mut child_excluded = node.excluded.clone();

                // Fix all assignments before this row (same as in current solution)
                for (prev_row, prev_col) in mapping
                    .iter()
                    .enumerate()
                    .take(row)
                    .skip(node.partition_row)
                    .filter_map(|(r, c)| c.map(|col| (r, col)))
                {
                    if !child_fixed.iter().any(|&(r, _)| r == prev_row) {
                        child_fixed.push((prev_row, prev_col));
                    }
                }

                child_excluded.push((row, col));

                if let Some(child_assignment) =
                    hungarian_constrained(cost, &child_fixed, &child_excluded)
                {
                    heap.push(HeapNode(MurtyNode::with_constraints(
                        child_assignment,
                        child_fixed,
                        child_excluded,
                        row,
                    )));
                }
            }
        }

        results.push(node.assignment);
    }

    results.sort_by(Assignment::rank_cmp);
    results.truncate(k);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    const INF: f64 = f64::INFINITY;

    /// Every injective row -> column mapping with finite cost, rows <= cols.
    fn brute_force(cost: &CostMatrix) -> Vec<Assignment> {
        fn recurse(
            cost: &CostMatrix,
            row: usize,
            used: &mut [bool],
            current: &mut Vec<Option<usize>>,
            out: &mut Vec<Assignment>,
        ) {
            if row == cost.rows() {
                let c = cost.cost_of(current);
                if c.is_finite() {
                    out.push(Assignment::new(current.clone(), c));
                }
                return;
            }
            for col in 0..cost.cols() {
                if !used[col] && cost.is_feasible(row, col) {
                    used[col] = true;
                    current.push(Some(col));
                    recurse(cost, row + 1, used, current, out);
                    current.pop();
                    used[col] = false;
                }
            }
        }

        let mut out = Vec::new();
        recurse(
            cost,
            0,
            &mut vec![false; cost.cols()],
            &mut Vec::new(),
            &mut out,
        );
        out.sort_by(Assignment::rank_cmp);
        out
    }

    #[test]
    fn test_from_vec_dimension_mismatch() {
        let result = CostMatrix::from_vec(vec![1.0, 2.0, 3.0], 2, 2);
        assert_eq!(
            result,
            Err(PmbmError::DimensionMismatch {
                len: 3,
                rows: 2,
                cols: 2
            })
        );
    }

    #[test]
    fn test_nan_is_infeasible() {
        let cost = CostMatrix::from_vec(vec![f64::NAN, 1.0], 1, 2).unwrap();
        assert!(!cost.is_feasible(0, 0));
        assert!(cost.is_feasible(0, 1));
    }

    #[test]
    fn test_hungarian_simple() {
        let cost =
            CostMatrix::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0], 3, 3).unwrap();

        let result = hungarian(&cost).unwrap();

        // Every permutation of this matrix costs 15
        assert_eq!(result.num_assigned(), 3);
        assert!(
            (result.cost - 15.0).abs() < 1e-12,
            "Expected cost 15.0, got {}",
            result.cost
        );
    }

    #[test]
    fn test_hungarian_asymmetric() {
        let cost =
            CostMatrix::from_vec(vec![10.0, 5.0, 13.0, 3.0, 15.0, 8.0, 7.0, 4.0, 12.0], 3, 3)
                .unwrap();

        let result = hungarian(&cost).unwrap();

        // Optimal: 0->1 (5), 1->0 (3), 2->2 (12) = 20
        // or: 0->2 (13), 1->0 (3), 2->1 (4) = 20
        assert_eq!(result.num_assigned(), 3);
        assert!(
            (result.cost - 20.0).abs() < 1e-12,
            "Expected cost 20.0, got {}",
            result.cost
        );
    }

    #[test]
    fn test_hungarian_wide_with_infeasible_cells() {
        // Two tracks, two measurements, two miss columns
        let cost = CostMatrix::from_vec(
            vec![
                -5.0, 1.0, 0.5, INF, //
                -4.0, -3.0, INF, 0.5,
            ],
            2,
            4,
        )
        .unwrap();

        let result = hungarian(&cost).unwrap();

        // 0->0 and 1->1: -8 beats 1->0 with 0->miss (-3.5)
        assert_eq!(result.mapping, vec![Some(0), Some(1)]);
        assert!((result.cost + 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_hungarian_keeps_precision_with_large_costs() {
        let cost = CostMatrix::from_vec(vec![1e-9, INF, INF, 2e-9], 2, 2).unwrap();

        let result = hungarian(&cost).unwrap();
        assert_eq!(result.mapping, vec![Some(0), Some(1)]);
        assert!((result.cost - 3e-9).abs() < 1e-20);
    }

    #[test]
    fn test_hungarian_infeasible() {
        // Both rows can only take column 0
        let cost = CostMatrix::from_vec(vec![1.0, INF, 2.0, INF], 2, 2).unwrap();

        assert!(matches!(
            hungarian(&cost),
            Err(PmbmError::InfeasibleAssociation { .. })
        ));
    }

    #[test]
    fn test_hungarian_rectangular() {
        // More rows than columns
        let cost = CostMatrix::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2).unwrap();

        let result = hungarian(&cost).unwrap();

        assert_eq!(result.num_assigned(), 2);
        let brute: f64 = [
            1.0 + 4.0,
            1.0 + 6.0,
            2.0 + 3.0,
            2.0 + 5.0,
            3.0 + 6.0,
            4.0 + 5.0,
        ]
        .into_iter()
        .fold(f64::INFINITY, f64::min);
        assert!((result.cost - brute).abs() < 1e-12);
    }

    #[test]
    fn test_hungarian_empty() {
        let result = hungarian(&CostMatrix::zeros(0, 3)).unwrap();
        assert!(result.mapping.is_empty());
        assert_eq!(result.cost, 0.0);
    }

    // ============================================================================
    // Murty's Algorithm Tests
    // ============================================================================

    #[test]
    fn test_murty_k1() {
        let cost =
            CostMatrix::from_vec(vec![10.0, 5.0, 13.0, 3.0, 15.0, 8.0, 7.0, 4.0, 12.0], 3, 3)
                .unwrap();

        let hungarian_result = hungarian(&cost).unwrap();
        let murty_results = murty_k_best(&cost, 1);

        assert_eq!(murty_results.len(), 1);
        assert!(
            (murty_results[0].cost - hungarian_result.cost).abs() < 1e-12,
            "Murty k=1 should match Hungarian: {} vs {}",
            murty_results[0].cost,
            hungarian_result.cost
        );
    }

    #[test]
    fn test_murty_k1_tie_break_is_lexicographic() {
        let cost =
            CostMatrix::from_vec(vec![10.0, 5.0, 13.0, 3.0, 15.0, 8.0, 7.0, 4.0, 12.0], 3, 3)
                .unwrap();

        // Two optimal solutions cost 20: [1, 0, 2] and [2, 0, 1]
        let results = murty_k_best(&cost, 1);
        assert_eq!(results[0].mapping, vec![Some(1), Some(0), Some(2)]);
    }

    #[test]
    fn test_murty_matches_brute_force() {
        let cost = CostMatrix::from_vec(
            vec![
                -2.0, -1.5, 0.3, INF, INF, //
                -1.0, INF, INF, 0.7, INF, //
                0.5, -0.5, INF, INF, 0.1,
            ],
            3,
            5,
        )
        .unwrap();

        let expected = brute_force(&cost);
        let results = murty_k_best(&cost, 100);

        assert_eq!(results.len(), expected.len());
        for (got, want) in results.iter().zip(expected.iter()) {
            assert!((got.cost - want.cost).abs() < 1e-9);
            assert_eq!(got.mapping, want.mapping);
        }
    }

    #[test]
    fn test_murty_ties_ordered_lexicographically() {
        // All six permutations cost 15
        let cost =
            CostMatrix::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0], 3, 3).unwrap();

        let results = murty_k_best(&cost, 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].mapping, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(results[1].mapping, vec![Some(0), Some(2), Some(1)]);
        assert_eq!(results[2].mapping, vec![Some(1), Some(0), Some(2)]);
    }

    #[test]
    fn test_murty_unique_solutions() {
        let cost =
            CostMatrix::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0], 3, 3).unwrap();

        let results = murty_k_best(&cost, 10);

        // Only 3! assignments exist
        assert_eq!(results.len(), 6);
        for i in 0..results.len() {
            for j in (i + 1)..results.len() {
                assert_ne!(
                    results[i].mapping, results[j].mapping,
                    "Solutions {} and {} should be different",
                    i, j
                );
            }
        }
    }

    #[test]
    fn test_murty_2x2() {
        let cost = CostMatrix::from_vec(vec![1.0, 10.0, 10.0, 2.0], 2, 2).unwrap();

        let results = murty_k_best(&cost, 2);

        assert_eq!(results.len(), 2);
        assert!((results[0].cost - 3.0).abs() < 1e-12);
        assert!((results[1].cost - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_murty_infeasible() {
        let cost = CostMatrix::infeasible(2, 3);
        assert!(murty_k_best(&cost, 5).is_empty());
    }

    #[test]
    fn test_murty_empty() {
        let cost = CostMatrix::zeros(0, 0);
        let results = murty_k_best(&cost, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].cost, 0.0);
    }

    #[test]
    fn test_murty_k0() {
        let cost = CostMatrix::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        let results = murty_k_best(&cost, 0);
        assert!(results.is_empty());
    }

    #[test]
    fn test_hungarian_constrained_fixed() {
        let cost = CostMatrix::from_vec(vec![1.0, 10.0, 10.0, 2.0], 2, 2).unwrap();

        let result = hungarian_constrained(&cost, &[(0, 1)], &[]).unwrap();

        assert_eq!(result.mapping[0], Some(1), "Row 0 should be fixed to col 1");
        assert!((result.cost - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_hungarian_constrained_excluded() {
        let cost = CostMatrix::from_vec(vec![1.0, 10.0, 10.0, 2.0], 2, 2).unwrap();

        let result = hungarian_constrained(&cost, &[], &[(0, 0)]).unwrap();

        assert_ne!(result.mapping[0], Some(0));
    }

    #[test]
    fn test_hungarian_constrained_infeasible() {
        let cost = CostMatrix::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();

        // Fix both rows to same column
        let result = hungarian_constrained(&cost, &[(0, 0), (1, 0)], &[]);

        assert!(result.is_none(), "Should be infeasible");
    }
}
