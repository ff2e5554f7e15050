//! Data association for the PMBM update
//!
//! Every predicted Bernoulli is expanded once per scan into its miss branch
//! and one detection branch per measurement, and every measurement gets a
//! new-track candidate from the undetected density. These branches form a
//! shared [`BranchTable`]. Each parent hypothesis then only builds a small
//! cost matrix over its own tracks and asks the ranker for its k best
//! assignments.
//!
//! # Ranking matrix
//!
//! For a parent with tracks `i` and measurements `j`:
//!
//! ```text
//!              z_0 .. z_{m-1}          miss_0 .. miss_{n-1}
//! track_0   [ c_0j - new_j ... ]    [ miss_0   inf  ... ]
//! track_1   [ c_1j - new_j ... ]    [ inf    miss_1 ... ]
//! ```
//!
//! A measurement no track claims is explained by its new/clutter option,
//! so the total cost of an assignment is `Σ_j new_j` plus the ranked cost.

use std::collections::BTreeMap;

use nalgebra::RealField;

use super::bernoulli::BernoulliTrack;
use super::hypothesis::GlobalHypothesis;
use super::ppp::PoissonDensity;
use crate::assignment::{Assignment, AssignmentRanker, CostMatrix};
use crate::filters::kalman::KalmanFilter;
use crate::models::{ClutterModel, ObservationModel, TransitionModel};
use crate::types::labels::TrackId;
use crate::types::phase::StepStats;
use crate::types::spaces::Measurement;
use crate::utils::to_f64;

// ============================================================================
// Association Problem
// ============================================================================

/// Costs of one parent hypothesis against one scan.
///
/// All costs are negative log-likelihoods. Infeasible detection cells hold
/// `f64::INFINITY`.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationProblem {
    /// Row labels in ascending order
    pub tracks: Vec<TrackId>,
    /// Detection costs, one row per track and one column per measurement
    pub detection_costs: CostMatrix,
    /// Missed-detection cost per track
    pub miss_costs: Vec<f64>,
    /// New-object-or-clutter cost per measurement
    pub new_costs: Vec<f64>,
}

impl AssociationProblem {
    /// Creates a problem from its cost tables.
    pub fn new(
        tracks: Vec<TrackId>,
        detection_costs: CostMatrix,
        miss_costs: Vec<f64>,
        new_costs: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(tracks.len(), detection_costs.rows());
        debug_assert_eq!(tracks.len(), miss_costs.len());
        debug_assert_eq!(new_costs.len(), detection_costs.cols());
        Self {
            tracks,
            detection_costs,
            miss_costs,
            new_costs,
        }
    }

    /// Number of tracks (rows).
    #[inline]
    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Number of measurements.
    #[inline]
    pub fn num_measurements(&self) -> usize {
        self.new_costs.len()
    }

    /// Cost of explaining every measurement as new or clutter.
    pub fn baseline_cost(&self) -> f64 {
        self.new_costs.iter().sum()
    }

    /// Builds the `n x (m + n)` matrix handed to the ranker.
    pub fn ranking_matrix(&self) -> CostMatrix {
        let n = self.num_tracks();
        let m = self.num_measurements();
        let mut matrix = CostMatrix::infeasible(n, m + n);

        for i in 0..n {
            for j in 0..m {
                let cost = self.detection_costs.get(i, j);
                if cost.is_finite() {
                    matrix.set(i, j, cost - self.new_costs[j]);
                }
            }
            matrix.set(i, m + i, self.miss_costs[i]);
        }

        matrix
    }

    /// Total cost of a ranked assignment.
    pub fn total_cost(&self, assignment: &Assignment) -> f64 {
        self.baseline_cost() + assignment.cost
    }

    /// Decodes a ranked assignment into the measurement taken by each track
    /// (`None` for a miss).
    pub fn detections(&self, assignment: &Assignment) -> Vec<Option<usize>> {
        let m = self.num_measurements();
        assignment
            .mapping
            .iter()
            .map(|&col| col.filter(|&c| c < m))
            .collect()
    }

    /// Cost of the assignment in which every track is missed.
    pub fn all_miss_cost(&self) -> f64 {
        self.baseline_cost() + self.miss_costs.iter().sum::<f64>()
    }

    /// Ranks the `k` cheapest assignments.
    pub fn rank(&self, ranker: &dyn AssignmentRanker, k: usize) -> Vec<Assignment> {
        ranker.rank_assignments(&self.ranking_matrix(), k)
    }
}

// ============================================================================
// Branch Table
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Slot<T> {
    variant: usize,
    log_likelihood: T,
}

#[derive(Debug, Clone, Copy)]
struct NewSlot<T> {
    variant: Option<usize>,
    log_likelihood: T,
}

/// Every branch of every predicted Bernoulli for one scan.
///
/// Indices of predicted entries coincide with the arena of the predicted
/// belief. The variants produced here form the arena of the updated belief.
#[derive(Debug, Clone)]
pub(crate) struct BranchTable<T: RealField, const N: usize> {
    /// Updated variants referenced by the slots
    pub arena: Vec<BernoulliTrack<T, N>>,
    misses: Vec<Slot<T>>,
    detections: Vec<Vec<Option<Slot<T>>>>,
    births: Vec<NewSlot<T>>,
    time: u32,
}

/// Children of one parent hypothesis, before management.
#[derive(Debug, Clone)]
pub(crate) struct ChildBatch<T> {
    pub children: Vec<(T, BTreeMap<TrackId, usize>)>,
    /// The ranker found nothing and the all-miss child was used
    pub fallback: bool,
}

impl<T: RealField + Copy, const N: usize> BranchTable<T, N> {
    /// Expands all predicted Bernoullis and the undetected density against a scan.
    #[allow(clippy::too_many_arguments)]
    pub fn build<Trans, Obs, Clutter, const M: usize>(
        predicted: &[BernoulliTrack<T, N>],
        ppp: &PoissonDensity<T, N>,
        kalman: &KalmanFilter<T, Trans, Obs, N, M>,
        clutter: &Clutter,
        measurements: &[Measurement<T, M>],
        gate: Option<T>,
        time: u32,
        stats: &mut StepStats,
    ) -> Self
    where
        Trans: TransitionModel<T, N>,
        Obs: ObservationModel<T, N, M>,
        Clutter: ClutterModel<T, M>,
    {
        let mut arena = Vec::with_capacity(predicted.len() * (measurements.len() + 1));
        let mut misses = Vec::with_capacity(predicted.len());
        let mut detections = Vec::with_capacity(predicted.len());

        for track in predicted {
            let p_d = kalman.detection_probability(&track.state.mean);
            let miss = track.miss(p_d);
            misses.push(Slot {
                variant: arena.len(),
                log_likelihood: miss.log_likelihood,
            });
            arena.push(miss.track);

            let mut row = Vec::with_capacity(measurements.len());
            for (j, z) in measurements.iter().enumerate() {
                let (branch, d2) = match track.detect(kalman, z, j, time) {
                    Ok(result) => result,
                    Err(_) => {
                        stats.singular_covariance_count += 1;
                        row.push(None);
                        continue;
                    }
                };
                if gate.is_some_and(|g| d2 > g) {
                    stats.gated_pair_count += 1;
                    row.push(None);
                    continue;
                }
                if !branch.log_likelihood.is_finite() {
                    stats.zero_likelihood_count += 1;
                    row.push(None);
                    continue;
                }
                row.push(Some(Slot {
                    variant: arena.len(),
                    log_likelihood: branch.log_likelihood,
                }));
                arena.push(branch.track);
            }
            detections.push(row);
        }

        let mut births = Vec::with_capacity(measurements.len());
        for (j, z) in measurements.iter().enumerate() {
            let candidate =
                ppp.new_track_candidate(kalman, z, clutter.clutter_intensity(z), stats);
            let variant = candidate.state.map(|state| {
                arena.push(BernoulliTrack::from_measurement(
                    time,
                    j,
                    candidate.existence,
                    state,
                ));
                arena.len() - 1
            });
            births.push(NewSlot {
                variant,
                log_likelihood: candidate.log_likelihood,
            });
        }

        Self {
            arena,
            misses,
            detections,
            births,
            time,
        }
    }

    /// Number of measurements in the scan.
    #[inline]
    pub fn num_measurements(&self) -> usize {
        self.births.len()
    }

    /// Builds the association problem of one parent hypothesis.
    ///
    /// Returns the problem and, per row, the predicted entry of the track.
    pub fn problem(&self, parent: &GlobalHypothesis<T>) -> (AssociationProblem, Vec<usize>) {
        let m = self.num_measurements();
        let n = parent.members.len();

        let mut tracks = Vec::with_capacity(n);
        let mut entries = Vec::with_capacity(n);
        let mut detection_costs = CostMatrix::infeasible(n, m);
        let mut miss_costs = Vec::with_capacity(n);

        for (i, (&id, &entry)) in parent.members.iter().enumerate() {
            tracks.push(id);
            entries.push(entry);
            miss_costs.push(-to_f64(self.misses[entry].log_likelihood));
            for (j, slot) in self.detections[entry].iter().enumerate() {
                if let Some(slot) = slot {
                    detection_costs.set(i, j, -to_f64(slot.log_likelihood));
                }
            }
        }

        let new_costs = self
            .births
            .iter()
            .map(|b| -to_f64(b.log_likelihood))
            .collect();

        (
            AssociationProblem::new(tracks, detection_costs, miss_costs, new_costs),
            entries,
        )
    }

    /// Generates the children of one parent hypothesis.
    ///
    /// Children are returned in ranking order. When the ranker finds no
    /// assignment, the single all-miss child is returned instead.
    pub fn children(
        &self,
        parent: &GlobalHypothesis<T>,
        ranker: &dyn AssignmentRanker,
        k: usize,
    ) -> ChildBatch<T> {
        let (problem, entries) = self.problem(parent);
        let ranked = problem.rank(ranker, k);

        if ranked.is_empty() {
            let detections = vec![None; problem.num_tracks()];
            let members = self.members(&problem, &entries, &detections);
            let cost: T = nalgebra::convert(problem.all_miss_cost());
            let log_weight = parent.log_weight - cost;
            return ChildBatch {
                children: vec![(log_weight, members)],
                fallback: true,
            };
        }

        let children = ranked
            .iter()
            .map(|assignment| {
                let detections = problem.detections(assignment);
                let members = self.members(&problem, &entries, &detections);
                let cost: T = nalgebra::convert(problem.total_cost(assignment));
                (parent.log_weight - cost, members)
            })
            .collect();

        ChildBatch {
            children,
            fallback: false,
        }
    }

    fn members(
        &self,
        problem: &AssociationProblem,
        entries: &[usize],
        detections: &[Option<usize>],
    ) -> BTreeMap<TrackId, usize> {
        let mut members = BTreeMap::new();
        let mut claimed = vec![false; self.num_measurements()];

        for ((&id, &entry), &detection) in problem.tracks.iter().zip(entries).zip(detections) {
            let detected =
                detection.and_then(|j| self.detections[entry][j].map(|slot| (j, slot.variant)));
            let variant = match detected {
                Some((j, variant)) => {
                    claimed[j] = true;
                    variant
                }
                None => self.misses[entry].variant,
            };
            members.insert(id, variant);
        }

        for (j, birth) in self.births.iter().enumerate() {
            if claimed[j] {
                continue;
            }
            if let Some(variant) = birth.variant {
                let replaced = members.insert(TrackId::from_measurement(self.time, j), variant);
                debug_assert!(replaced.is_none(), "new track identity already in use");
            }
        }

        members
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::MurtyRanker;
    use crate::models::{ConstantVelocity2D, PositionSensor2D, UniformClutter2D};
    use crate::types::gaussian::{GaussianMixture, GaussianState};
    use crate::types::spaces::{StateCovariance, StateVector};

    type Kf = KalmanFilter<f64, ConstantVelocity2D<f64>, PositionSensor2D<f64>, 4, 2>;

    fn kalman() -> Kf {
        KalmanFilter::new(
            ConstantVelocity2D::new(0.1, 0.99),
            PositionSensor2D::new(1.0, 0.9),
        )
    }

    fn track_at(id: TrackId, x: f64, y: f64) -> BernoulliTrack<f64, 4> {
        BernoulliTrack::new(
            id,
            0.9,
            GaussianState::with_unit_weight(
                StateVector::from_array([x, y, 0.0, 0.0]),
                StateCovariance::identity(),
            ),
            0,
        )
    }

    fn empty_ppp() -> PoissonDensity<f64, 4> {
        PoissonDensity::from_parts(GaussianMixture::new(), GaussianMixture::new())
    }

    #[test]
    fn test_ranking_matrix_layout() {
        let problem = AssociationProblem::new(
            vec![TrackId::new(0, 0), TrackId::new(0, 1)],
            CostMatrix::from_vec(vec![1.0, f64::INFINITY, 3.0, 4.0], 2, 2).unwrap(),
            vec![5.0, 6.0],
            vec![0.5, 1.5],
        );

        let matrix = problem.ranking_matrix();
        assert_eq!(matrix.rows(), 2);
        assert_eq!(matrix.cols(), 4);
        assert_eq!(matrix.get(0, 0), 0.5);
        assert!(!matrix.is_feasible(0, 1));
        assert_eq!(matrix.get(1, 1), 2.5);
        assert_eq!(matrix.get(0, 2), 5.0);
        assert!(!matrix.is_feasible(0, 3));
        assert_eq!(matrix.get(1, 3), 6.0);
        assert_eq!(problem.baseline_cost(), 2.0);
        assert_eq!(problem.all_miss_cost(), 13.0);
    }

    #[test]
    fn test_ranked_total_costs() {
        let problem = AssociationProblem::new(
            vec![TrackId::new(0, 0)],
            CostMatrix::from_vec(vec![1.0], 1, 1).unwrap(),
            vec![4.0],
            vec![2.0],
        );

        let ranked = problem.rank(&MurtyRanker, 5);
        assert_eq!(ranked.len(), 2);
        // detect: 1.0; miss + new: 4.0 + 2.0
        assert_eq!(problem.total_cost(&ranked[0]), 1.0);
        assert_eq!(problem.detections(&ranked[0]), vec![Some(0)]);
        assert_eq!(problem.total_cost(&ranked[1]), 6.0);
        assert_eq!(problem.detections(&ranked[1]), vec![None]);
    }

    #[test]
    fn test_children_never_share_measurements() {
        let a = TrackId::new(0, 0);
        let b = TrackId::new(0, 1);
        let predicted = vec![track_at(a, 0.0, 0.0), track_at(b, 1.0, 0.0)];
        let measurements = vec![
            Measurement::from_array([0.2, 0.0]),
            Measurement::from_array([0.8, 0.0]),
        ];
        let clutter = UniformClutter2D::new(1.0, (-50.0, 50.0), (-50.0, 50.0));
        let mut stats = StepStats::default();

        let table = BranchTable::build(
            &predicted,
            &empty_ppp(),
            &kalman(),
            &clutter,
            &measurements,
            None,
            1,
            &mut stats,
        );

        let parent = GlobalHypothesis::new(0.0, [(a, 0), (b, 1)].into_iter().collect(), 0);
        let batch = table.children(&parent, &MurtyRanker, 20);

        assert!(!batch.fallback);
        // Each track takes z0, z1 or misses, without sharing: 7 assignments
        assert_eq!(batch.children.len(), 7);
        for (_, members) in &batch.children {
            let mut used: Vec<usize> = members
                .values()
                .filter_map(|&v| table.arena[v].measurement_index)
                .collect();
            let before = used.len();
            used.sort_unstable();
            used.dedup();
            assert_eq!(used.len(), before);
        }
        for pair in batch.children.windows(2) {
            assert!(pair[0].0 >= pair[1].0);
        }
    }

    #[test]
    fn test_gating_counts_pairs() {
        let a = TrackId::new(0, 0);
        let predicted = vec![track_at(a, 0.0, 0.0)];
        let measurements = vec![
            Measurement::from_array([0.5, 0.0]),
            Measurement::from_array([30.0, 0.0]),
        ];
        let clutter = UniformClutter2D::new(1.0, (-50.0, 50.0), (-50.0, 50.0));
        let mut stats = StepStats::default();

        let table = BranchTable::build(
            &predicted,
            &empty_ppp(),
            &kalman(),
            &clutter,
            &measurements,
            Some(9.0),
            1,
            &mut stats,
        );

        assert_eq!(stats.gated_pair_count, 1);
        let parent = GlobalHypothesis::new(0.0, [(a, 0)].into_iter().collect(), 0);
        let (problem, entries) = table.problem(&parent);
        assert_eq!(entries, vec![0]);
        assert!(problem.detection_costs.is_feasible(0, 0));
        assert!(!problem.detection_costs.is_feasible(0, 1));
    }

    #[test]
    fn test_empty_parent_spawns_candidates() {
        let birth = GaussianMixture::new().with_component(
            0.5,
            StateVector::from_array([0.0, 0.0, 0.0, 0.0]),
            StateCovariance::from_diagonal(&nalgebra::vector![4.0, 4.0, 1.0, 1.0]),
        );
        let ppp = PoissonDensity::new(birth).unwrap();
        let measurements = vec![Measurement::from_array([0.3, -0.2])];
        let clutter = UniformClutter2D::new(0.5, (-50.0, 50.0), (-50.0, 50.0));
        let mut stats = StepStats::default();

        let table = BranchTable::build(
            &[],
            &ppp,
            &kalman(),
            &clutter,
            &measurements,
            None,
            3,
            &mut stats,
        );
        let batch = table.children(&GlobalHypothesis::empty(0.0), &MurtyRanker, 5);

        assert_eq!(batch.children.len(), 1);
        let (log_weight, members) = &batch.children[0];
        assert_eq!(members.len(), 1);
        assert!(members.contains_key(&TrackId::new(3, 0)));
        assert!(log_weight.is_finite());
    }

    struct NothingRanker;

    impl AssignmentRanker for NothingRanker {
        fn rank_assignments(&self, _cost: &CostMatrix, _k: usize) -> Vec<Assignment> {
            Vec::new()
        }
    }

    #[test]
    fn test_fallback_to_all_miss() {
        let a = TrackId::new(0, 0);
        let predicted = vec![track_at(a, 0.0, 0.0)];
        let measurements = vec![Measurement::from_array([0.1, 0.0])];
        let clutter = UniformClutter2D::new(1.0, (-50.0, 50.0), (-50.0, 50.0));
        let mut stats = StepStats::default();

        let table = BranchTable::build(
            &predicted,
            &empty_ppp(),
            &kalman(),
            &clutter,
            &measurements,
            None,
            1,
            &mut stats,
        );
        let parent = GlobalHypothesis::new(0.0, [(a, 0)].into_iter().collect(), 0);
        let batch = table.children(&parent, &NothingRanker, 5);

        assert!(batch.fallback);
        assert_eq!(batch.children.len(), 1);
        let variant = batch.children[0].1[&a];
        assert_eq!(table.arena[variant].measurement_index, None);
    }
}
