//! State extraction and belief summaries
//!
//! Estimates are read from the most likely global hypothesis. The belief
//! also exposes summaries that average over all hypotheses: expected
//! cardinality, marginal existence of a track and the cardinality
//! distribution.

use core::cmp::Ordering;

use nalgebra::RealField;

use super::hypothesis::{GlobalHypothesis, PmbmBelief};
use crate::types::labels::TrackId;
use crate::types::spaces::{StateCovariance, StateVector};

/// An extracted track estimate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackEstimate<T: RealField, const N: usize> {
    /// Track identity
    pub id: TrackId,
    /// State estimate
    pub mean: StateVector<T, N>,
    /// State covariance
    pub covariance: StateCovariance<T, N>,
    /// Existence probability in the selected hypothesis
    pub existence: T,
}

impl<T: RealField + Copy, const N: usize, Phase> PmbmBelief<T, N, Phase> {
    /// Returns the hypothesis with the largest weight.
    ///
    /// The first one wins ties.
    pub fn best_hypothesis(&self) -> Option<&GlobalHypothesis<T>> {
        self.hypotheses.iter().fold(None, |best, h| match best {
            Some(b) if b.log_weight >= h.log_weight => Some(b),
            _ => Some(h),
        })
    }

    /// Reports tracks of the best hypothesis with existence at least `threshold`.
    ///
    /// The output is sorted by ascending track identity.
    pub fn extract(&self, threshold: T) -> Vec<TrackEstimate<T, N>> {
        let Some(best) = self.best_hypothesis() else {
            return Vec::new();
        };

        best.tracks(&self.arena)
            .filter(|t| t.existence >= threshold)
            .map(|t| TrackEstimate {
                id: t.id,
                mean: t.state.mean,
                covariance: t.state.covariance,
                existence: t.existence,
            })
            .collect()
    }

    /// Normalized hypothesis weights, robust to un-normalized log weights.
    fn normalized_weights(&self) -> Vec<T> {
        let neg_inf: T = nalgebra::convert(f64::NEG_INFINITY);
        let max_log = self
            .hypotheses
            .iter()
            .fold(neg_inf, |acc, h| acc.max(h.log_weight));
        if !max_log.is_finite() {
            return vec![T::zero(); self.hypotheses.len()];
        }

        let weights: Vec<T> = self
            .hypotheses
            .iter()
            .map(|h| (h.log_weight - max_log).exp())
            .collect();
        let total = weights.iter().fold(T::zero(), |acc, &w| acc + w);
        weights.into_iter().map(|w| w / total).collect()
    }

    /// Expected number of detected objects, `Σ_h w_h Σ_i r_i`.
    pub fn expected_cardinality(&self) -> T {
        self.hypotheses
            .iter()
            .zip(self.normalized_weights())
            .fold(T::zero(), |acc, (h, w)| {
                acc + w * h
                    .tracks(&self.arena)
                    .fold(T::zero(), |s, t| s + t.existence)
            })
    }

    /// Marginal existence probability of a track across all hypotheses.
    pub fn marginal_existence(&self, id: TrackId) -> T {
        self.hypotheses
            .iter()
            .zip(self.normalized_weights())
            .fold(T::zero(), |acc, (h, w)| {
                match h.members.get(&id).and_then(|&v| self.arena.get(v)) {
                    Some(track) => acc + w * track.existence,
                    None => acc,
                }
            })
    }

    /// Probability of each number of detected objects.
    ///
    /// Index `n` holds P(exactly n Bernoulli tracks exist). Within a
    /// hypothesis the count is Poisson-binomial; the result mixes these over
    /// the hypothesis weights.
    pub fn cardinality_distribution(&self) -> Vec<T> {
        let max_tracks = self
            .hypotheses
            .iter()
            .map(|h| h.num_tracks())
            .max()
            .unwrap_or(0);
        let mut dist = vec![T::zero(); max_tracks + 1];

        if self.hypotheses.is_empty() {
            dist[0] = T::one();
            return dist;
        }

        for (h, w) in self.hypotheses.iter().zip(self.normalized_weights()) {
            let mut local = vec![T::zero(); h.num_tracks() + 1];
            local[0] = T::one();
            for (count, track) in h.tracks(&self.arena).enumerate() {
                let r = track.existence;
                for n in (1..=count + 1).rev() {
                    local[n] = local[n] * (T::one() - r) + local[n - 1] * r;
                }
                local[0] *= T::one() - r;
            }
            for (n, p) in local.into_iter().enumerate() {
                dist[n] += w * p;
            }
        }

        dist
    }

    /// Most likely number of detected objects.
    pub fn map_cardinality(&self) -> usize {
        self.cardinality_distribution()
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .map(|(n, _)| n)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::pmbm::bernoulli::BernoulliTrack;
    use crate::filters::pmbm::ppp::PoissonDensity;
    use crate::types::gaussian::{GaussianMixture, GaussianState};

    fn variant(id: TrackId, r: f64) -> BernoulliTrack<f64, 2> {
        BernoulliTrack::new(
            id,
            r,
            GaussianState::with_unit_weight(
                StateVector::from_array([id.index as f64, 0.0]),
                StateCovariance::identity(),
            ),
            0,
        )
    }

    fn sample_belief() -> PmbmBelief<f64, 2> {
        let a = TrackId::new(0, 0);
        let b = TrackId::new(0, 1);
        let arena = vec![variant(b, 0.9), variant(a, 0.6), variant(a, 0.2)];
        let hypotheses = vec![
            GlobalHypothesis::new(0.7_f64.ln(), [(a, 1), (b, 0)].into_iter().collect(), 0),
            GlobalHypothesis::new(0.3_f64.ln(), [(a, 2)].into_iter().collect(), 1),
        ];
        PmbmBelief::from_components(
            PoissonDensity::from_parts(GaussianMixture::new(), GaussianMixture::new()),
            arena,
            hypotheses,
            1,
        )
    }

    #[test]
    fn test_extract_sorted_and_thresholded() {
        let belief = sample_belief();

        let all = belief.extract(0.5);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, TrackId::new(0, 0));
        assert_eq!(all[1].id, TrackId::new(0, 1));

        let confident = belief.extract(0.8);
        assert_eq!(confident.len(), 1);
        assert_eq!(confident[0].id, TrackId::new(0, 1));
    }

    #[test]
    fn test_best_hypothesis_tie_goes_to_first() {
        let mut belief = sample_belief();
        belief.hypotheses[1].log_weight = belief.hypotheses[0].log_weight;
        assert_eq!(belief.best_hypothesis().unwrap().seq, 0);
    }

    #[test]
    fn test_summaries() {
        let belief = sample_belief();
        let a = TrackId::new(0, 0);
        let b = TrackId::new(0, 1);

        assert!((belief.expected_cardinality() - (0.7 * 1.5 + 0.3 * 0.2)).abs() < 1e-12);
        assert!((belief.marginal_existence(a) - (0.7 * 0.6 + 0.3 * 0.2)).abs() < 1e-12);
        assert!((belief.marginal_existence(b) - 0.63).abs() < 1e-12);
        assert_eq!(belief.marginal_existence(TrackId::new(5, 5)), 0.0);

        let dist = belief.cardinality_distribution();
        assert_eq!(dist.len(), 3);
        let total: f64 = dist.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        // P(2) = 0.7 * 0.6 * 0.9
        assert!((dist[2] - 0.378).abs() < 1e-12);
        // P(0) = 0.7 * 0.4 * 0.1 + 0.3 * 0.8
        assert!((dist[0] - 0.268).abs() < 1e-12);
        assert_eq!(belief.map_cardinality(), 1);
    }

    #[test]
    fn test_empty_belief() {
        let belief: PmbmBelief<f64, 2> = PmbmBelief::from_components(
            PoissonDensity::from_parts(GaussianMixture::new(), GaussianMixture::new()),
            Vec::new(),
            vec![GlobalHypothesis::empty(0.0)],
            0,
        );

        assert!(belief.extract(0.0).is_empty());
        assert_eq!(belief.expected_cardinality(), 0.0);
        assert_eq!(belief.cardinality_distribution(), vec![1.0]);
    }
}
