//! Hypothesis management
//!
//! Runs after all children of a step have been generated and keeps the
//! mixture tractable. The steps, in order:
//!
//! 1. normalize the hypothesis weights
//! 2. prune hypotheses lighter than a fraction of the best one
//! 3. cap the number of hypotheses (stable, heaviest first)
//! 4. drop Bernoullis with low existence, optionally recycling them into
//!    the undetected density
//! 5. merge close variants of the same track
//! 6. fuse hypotheses that became identical
//! 7. renormalize
//! 8. compact the variant arena
//!
//! Finally the undetected density is pruned, merged and capped.

use core::cmp::Ordering;
use std::collections::BTreeMap;

use nalgebra::RealField;

use super::bernoulli::BernoulliTrack;
use super::config::PmbmConfig;
use super::hypothesis::{GlobalHypothesis, PmbmBelief};
use super::ppp::PoissonDensity;
use crate::error::{PmbmError, Result};
use crate::types::labels::TrackId;
use crate::types::phase::{StepStats, Updated};
use crate::utils::{log_sum_exp, mahalanobis_distance_squared, moment_match, normalize_log_weights};

/// Applies the management pipeline of a [`PmbmConfig`] to a belief.
#[derive(Debug, Clone, Copy)]
pub struct HypothesisManager<'a, T: RealField> {
    config: &'a PmbmConfig<T>,
}

impl<'a, T: RealField + Copy> HypothesisManager<'a, T> {
    /// Creates a manager using the given thresholds.
    pub fn new(config: &'a PmbmConfig<T>) -> Self {
        Self { config }
    }

    /// Runs the full pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PmbmError::NumericalInstability`] if the hypothesis weights
    /// cannot be normalized (every weight is zero or non-finite).
    pub fn manage<const N: usize>(
        &self,
        belief: PmbmBelief<T, N, Updated>,
        stats: &mut StepStats,
    ) -> Result<PmbmBelief<T, N, Updated>> {
        let time_step = belief.time_step;
        let mut ppp = belief.ppp;
        let mut arena = belief.arena;
        let mut hypotheses = belief.hypotheses;

        normalize(&mut hypotheses)?;
        self.prune_relative(&mut hypotheses);
        self.cap(&mut hypotheses);
        self.drop_unlikely_tracks(&mut hypotheses, &arena, &mut ppp, stats);
        self.merge_variants(&mut hypotheses, &mut arena, stats);
        fuse_duplicates(&mut hypotheses);
        normalize(&mut hypotheses)?;
        let arena = compact(&mut hypotheses, arena);
        let ppp = ppp.maintain(&self.config.ppp_pruning());

        stats.hypotheses_retained = hypotheses.len();
        Ok(PmbmBelief::from_components(ppp, arena, hypotheses, time_step))
    }

    /// Removes hypotheses below `hypothesis_prune_threshold` times the best weight.
    fn prune_relative(&self, hypotheses: &mut Vec<GlobalHypothesis<T>>) {
        let threshold = self.config.hypothesis_prune_threshold;
        if threshold <= T::zero() || hypotheses.is_empty() {
            return;
        }
        let neg_inf: T = nalgebra::convert(f64::NEG_INFINITY);
        let best = hypotheses
            .iter()
            .fold(neg_inf, |acc, h| acc.max(h.log_weight));
        let cutoff = best + threshold.ln();
        hypotheses.retain(|h| h.log_weight >= cutoff);
    }

    /// Keeps the `max_global_hypotheses` heaviest hypotheses.
    fn cap(&self, hypotheses: &mut Vec<GlobalHypothesis<T>>) {
        sort_by_weight(hypotheses);
        hypotheses.truncate(self.config.max_global_hypotheses);
    }

    /// Removes members with existence below `min_existence_probability`.
    fn drop_unlikely_tracks<const N: usize>(
        &self,
        hypotheses: &mut [GlobalHypothesis<T>],
        arena: &[BernoulliTrack<T, N>],
        ppp: &mut PoissonDensity<T, N>,
        stats: &mut StepStats,
    ) {
        let min = self.config.min_existence_probability;
        let mut dropped: BTreeMap<usize, T> = BTreeMap::new();

        for h in hypotheses.iter_mut() {
            let weight = h.weight();
            h.members.retain(|_, v| {
                let track = &arena[*v];
                if track.existence >= min {
                    return true;
                }
                *dropped.entry(*v).or_insert_with(T::zero) += weight * track.existence;
                false
            });
        }

        stats.bernoullis_pruned += dropped.len();
        if self.config.recycle_pruned_tracks {
            for (v, mass) in dropped {
                ppp.recycle(arena[v].state.with_weight(mass));
            }
        }
    }

    /// Moment-matches variants of the same track that lie within
    /// `merge_threshold` of each other, then re-points the hypotheses.
    fn merge_variants<const N: usize>(
        &self,
        hypotheses: &mut [GlobalHypothesis<T>],
        arena: &mut [BernoulliTrack<T, N>],
        stats: &mut StepStats,
    ) {
        let threshold = self.config.merge_threshold;
        if threshold <= T::zero() {
            return;
        }
        let threshold_sq = threshold * threshold;

        let mut mass: BTreeMap<usize, T> = BTreeMap::new();
        for h in hypotheses.iter() {
            let weight = h.weight();
            for &v in h.members.values() {
                *mass.entry(v).or_insert_with(T::zero) += weight;
            }
        }

        let mut groups: BTreeMap<TrackId, Vec<usize>> = BTreeMap::new();
        for &v in mass.keys() {
            groups.entry(arena[v].id).or_default().push(v);
        }

        let mut remap: BTreeMap<usize, usize> = BTreeMap::new();
        for mut variants in groups.into_values() {
            if variants.len() < 2 {
                continue;
            }
            variants.sort_by(|a, b| mass[b].partial_cmp(&mass[a]).unwrap_or(Ordering::Equal));

            while !variants.is_empty() {
                let leader = variants.remove(0);
                let mut cluster = vec![leader];
                variants.retain(|&v| {
                    match mahalanobis_distance_squared(&arena[leader].state, &arena[v].state) {
                        Some(d2) if d2 < threshold_sq => {
                            cluster.push(v);
                            false
                        }
                        _ => true,
                    }
                });
                if cluster.len() < 2 {
                    continue;
                }

                let weighted: Vec<_> = cluster
                    .iter()
                    .map(|v| (mass[v], &arena[*v].state))
                    .collect();
                let Some(state) = moment_match(&weighted) else {
                    continue;
                };
                let total = state.weight;
                let existence = cluster
                    .iter()
                    .fold(T::zero(), |acc, v| acc + mass[v] * arena[*v].existence)
                    / total;
                let last_detection = cluster
                    .iter()
                    .map(|v| arena[*v].last_detection)
                    .max()
                    .unwrap_or(arena[leader].last_detection);
                let leader_index = arena[leader].measurement_index;
                let measurement_index = if cluster
                    .iter()
                    .all(|v| arena[*v].measurement_index == leader_index)
                {
                    leader_index
                } else {
                    None
                };

                arena[leader] = BernoulliTrack {
                    existence: existence.min(T::one()),
                    state: state.with_weight(T::one()),
                    last_detection,
                    measurement_index,
                    ..arena[leader].clone()
                };
                for &v in &cluster[1..] {
                    remap.insert(v, leader);
                }
                stats.variants_merged += cluster.len() - 1;
            }
        }

        if remap.is_empty() {
            return;
        }
        for h in hypotheses.iter_mut() {
            for v in h.members.values_mut() {
                if let Some(&leader) = remap.get(v) {
                    *v = leader;
                }
            }
        }
    }
}

/// Normalizes hypothesis log weights so the weights sum to one.
pub(crate) fn normalize<T: RealField + Copy>(hypotheses: &mut [GlobalHypothesis<T>]) -> Result<()> {
    let mut log_weights: Vec<T> = hypotheses.iter().map(|h| h.log_weight).collect();
    if normalize_log_weights(&mut log_weights).is_none() {
        return Err(PmbmError::NumericalInstability(
            "global hypothesis weights cannot be normalized".into(),
        ));
    }
    for (h, w) in hypotheses.iter_mut().zip(log_weights) {
        h.log_weight = w;
    }
    Ok(())
}

/// Stable sort by descending weight, earlier creation first among equals.
fn sort_by_weight<T: RealField + Copy>(hypotheses: &mut [GlobalHypothesis<T>]) {
    hypotheses.sort_by(|a, b| {
        b.log_weight
            .partial_cmp(&a.log_weight)
            .unwrap_or(Ordering::Equal)
            .then(a.seq.cmp(&b.seq))
    });
}

/// Merges hypotheses with identical member maps by adding their weights.
fn fuse_duplicates<T: RealField + Copy>(hypotheses: &mut Vec<GlobalHypothesis<T>>) {
    let mut seen: BTreeMap<BTreeMap<TrackId, usize>, usize> = BTreeMap::new();
    let mut fused: Vec<GlobalHypothesis<T>> = Vec::with_capacity(hypotheses.len());

    for h in hypotheses.drain(..) {
        match seen.get(&h.members) {
            Some(&i) => {
                fused[i].log_weight = log_sum_exp(&[fused[i].log_weight, h.log_weight]);
            }
            None => {
                seen.insert(h.members.clone(), fused.len());
                fused.push(h);
            }
        }
    }

    sort_by_weight(&mut fused);
    *hypotheses = fused;
}

/// Drops unreferenced variants and renumbers the members.
fn compact<T: RealField + Copy, const N: usize>(
    hypotheses: &mut [GlobalHypothesis<T>],
    arena: Vec<BernoulliTrack<T, N>>,
) -> Vec<BernoulliTrack<T, N>> {
    let mut new_index: Vec<Option<usize>> = vec![None; arena.len()];
    let mut slots: Vec<Option<BernoulliTrack<T, N>>> = arena.into_iter().map(Some).collect();
    let mut compacted = Vec::new();

    for h in hypotheses.iter_mut() {
        for v in h.members.values_mut() {
            let index = match new_index[*v] {
                Some(i) => i,
                None => {
                    let i = compacted.len();
                    if let Some(track) = slots[*v].take() {
                        compacted.push(track);
                    }
                    new_index[*v] = Some(i);
                    i
                }
            };
            *v = index;
        }
    }

    compacted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::gaussian::{GaussianMixture, GaussianState};
    use crate::types::spaces::{StateCovariance, StateVector};

    fn variant(id: TrackId, r: f64, x: f64) -> BernoulliTrack<f64, 2> {
        BernoulliTrack::new(
            id,
            r,
            GaussianState::with_unit_weight(
                StateVector::from_array([x, 0.0]),
                StateCovariance::identity(),
            ),
            0,
        )
    }

    fn hyp(w: f64, members: &[(TrackId, usize)], seq: u64) -> GlobalHypothesis<f64> {
        GlobalHypothesis::new(w.ln(), members.iter().copied().collect(), seq)
    }

    fn belief(
        arena: Vec<BernoulliTrack<f64, 2>>,
        hypotheses: Vec<GlobalHypothesis<f64>>,
    ) -> PmbmBelief<f64, 2> {
        PmbmBelief::from_components(
            PoissonDensity::from_parts(GaussianMixture::new(), GaussianMixture::new()),
            arena,
            hypotheses,
            1,
        )
    }

    fn config() -> PmbmConfig<f64> {
        PmbmConfig::default_config()
            .with_hypothesis_prune_threshold(0.0)
            .with_merge_threshold(0.0)
            .with_min_existence_probability(0.0)
    }

    #[test]
    fn test_normalizes_weights() {
        let a = TrackId::new(0, 0);
        let input = belief(
            vec![variant(a, 0.9, 0.0), variant(a, 0.5, 10.0)],
            vec![hyp(2.0, &[(a, 0)], 0), hyp(6.0, &[(a, 1)], 1)],
        );
        let config = config();
        let mut stats = StepStats::default();

        let out = HypothesisManager::new(&config).manage(input, &mut stats).unwrap();

        assert!((out.total_weight() - 1.0).abs() < 1e-12);
        // Heaviest first
        assert!((out.hypotheses[0].weight() - 0.75).abs() < 1e-12);
        assert_eq!(stats.hypotheses_retained, 2);
    }

    #[test]
    fn test_non_finite_normalizer_fails() {
        let mut hypotheses = vec![GlobalHypothesis::<f64>::empty(f64::NEG_INFINITY)];
        assert!(matches!(
            normalize(&mut hypotheses),
            Err(PmbmError::NumericalInstability(_))
        ));
    }

    #[test]
    fn test_relative_prune_keeps_best() {
        let a = TrackId::new(0, 0);
        let input = belief(
            vec![variant(a, 0.9, 0.0), variant(a, 0.5, 10.0)],
            vec![hyp(1e-6, &[(a, 0)], 0), hyp(1.0, &[(a, 1)], 1)],
        );
        let config = config().with_hypothesis_prune_threshold(1e-3);
        let mut stats = StepStats::default();

        let out = HypothesisManager::new(&config).manage(input, &mut stats).unwrap();

        assert_eq!(out.num_hypotheses(), 1);
        assert_eq!(out.num_variants(), 1);
        assert_eq!(out.arena[0].existence, 0.5);
        assert!((out.hypotheses[0].weight() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cap_is_stable() {
        let a = TrackId::new(0, 0);
        let arena = vec![
            variant(a, 0.9, 0.0),
            variant(a, 0.8, 10.0),
            variant(a, 0.7, 20.0),
        ];
        let input = belief(
            arena,
            vec![
                hyp(1.0, &[(a, 0)], 0),
                hyp(2.0, &[(a, 1)], 1),
                hyp(2.0, &[(a, 2)], 2),
            ],
        );
        let config = config().with_max_global_hypotheses(2);
        let mut stats = StepStats::default();

        let out = HypothesisManager::new(&config).manage(input, &mut stats).unwrap();

        assert_eq!(out.num_hypotheses(), 2);
        // Equal weights: the earlier hypothesis is first
        assert_eq!(out.hypotheses[0].seq, 1);
        assert_eq!(out.hypotheses[1].seq, 2);
        assert!((out.hypotheses[0].weight() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_drop_and_recycle() {
        let a = TrackId::new(0, 0);
        let b = TrackId::new(0, 1);
        let input = belief(
            vec![variant(a, 0.9, 0.0), variant(b, 0.01, 5.0)],
            vec![hyp(1.0, &[(a, 0), (b, 1)], 0)],
        );
        let config = config()
            .with_min_existence_probability(0.05)
            .with_recycling(true);
        let mut stats = StepStats::default();

        let out = HypothesisManager::new(&config).manage(input, &mut stats).unwrap();

        assert_eq!(stats.bernoullis_pruned, 1);
        assert_eq!(out.hypotheses[0].num_tracks(), 1);
        assert!(out.hypotheses[0].contains(a));
        assert_eq!(out.num_variants(), 1);
        assert_eq!(out.ppp.len(), 1);
        assert!((out.ppp.expected_count() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_merge_and_fuse() {
        let a = TrackId::new(0, 0);
        let arena = vec![variant(a, 1.0, 0.0), variant(a, 0.5, 0.5), variant(a, 0.9, 50.0)];
        let input = belief(
            arena,
            vec![
                hyp(0.5, &[(a, 0)], 0),
                hyp(0.3, &[(a, 1)], 1),
                hyp(0.2, &[(a, 2)], 2),
            ],
        );
        let config = config().with_merge_threshold(2.0);
        let mut stats = StepStats::default();

        let out = HypothesisManager::new(&config).manage(input, &mut stats).unwrap();

        assert_eq!(stats.variants_merged, 1);
        // The first two hypotheses now point at the same variant and fuse
        assert_eq!(out.num_hypotheses(), 2);
        assert_eq!(out.num_variants(), 2);
        assert!((out.hypotheses[0].weight() - 0.8).abs() < 1e-12);

        let merged = &out.arena[out.hypotheses[0].members[&a]];
        assert!((merged.existence - (0.5 + 0.15) / 0.8).abs() < 1e-12);
        assert!((merged.state.mean.index(0) - 0.15 / 0.8).abs() < 1e-12);
        assert!(out.is_consistent());
    }

    #[test]
    fn test_compact_renumbers_in_reference_order() {
        let a = TrackId::new(0, 0);
        let b = TrackId::new(0, 1);
        let arena = vec![variant(a, 0.9, 0.0), variant(b, 0.8, 1.0), variant(a, 0.7, 9.0)];
        let mut hypotheses = vec![hyp(0.6, &[(a, 2), (b, 1)], 0)];

        let compacted = compact(&mut hypotheses, arena);

        assert_eq!(compacted.len(), 2);
        assert_eq!(hypotheses[0].members[&a], 0);
        assert_eq!(hypotheses[0].members[&b], 1);
        assert_eq!(compacted[0].existence, 0.7);
    }
}
