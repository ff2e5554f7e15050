//! Component pruning and merging for Gaussian mixtures
//!
//! Keeps the undetected-object mixture tractable and provides the moment
//! matching and log-domain weight arithmetic shared by the PMBM update.

use std::cmp::Ordering;

use nalgebra::{RealField, SMatrix};

use crate::types::gaussian::{GaussianMixture, GaussianState};
use crate::types::spaces::{StateCovariance, StateVector};

/// Configuration for pruning and merging operations.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PruningConfig<T: RealField> {
    /// Minimum weight threshold (components below this are removed)
    pub weight_threshold: T,
    /// Merging distance threshold (Mahalanobis distance)
    pub merge_threshold: T,
    /// Maximum number of components after pruning
    pub max_components: usize,
}

impl<T: RealField + Copy> PruningConfig<T> {
    /// Creates a pruning configuration with custom values.
    pub fn new(weight_threshold: T, merge_threshold: T, max_components: usize) -> Self {
        Self {
            weight_threshold,
            merge_threshold,
            max_components,
        }
    }
}

/// Spreads `extra` weight equally over `components`.
fn redistribute<T: RealField + Copy, const N: usize>(
    components: &mut [GaussianState<T, N>],
    extra: T,
) {
    if components.is_empty() || extra <= T::zero() {
        return;
    }
    let share = extra / nalgebra::convert::<f64, T>(components.len() as f64);
    for component in components {
        component.weight += share;
    }
}

/// Index of the heaviest component; the first one wins ties.
fn heaviest<T: RealField + Copy, const N: usize>(
    components: &[GaussianState<T, N>],
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, c) in components.iter().enumerate() {
        match best {
            Some(b) if components[b].weight >= c.weight => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Prunes components with weight below a threshold.
///
/// The weights of pruned components are redistributed equally among the
/// remaining components, so the total weight (expected number of undetected
/// objects) is preserved. If every component falls below the threshold the
/// heaviest one is kept and absorbs the whole mass.
pub fn prune_by_weight<T: RealField + Copy, const N: usize>(
    mixture: &GaussianMixture<T, N>,
    threshold: T,
) -> GaussianMixture<T, N> {
    let pruned_weight_sum: T = mixture
        .iter()
        .filter(|c| c.weight < threshold)
        .fold(T::zero(), |acc, c| acc + c.weight);

    let mut remaining: Vec<_> = mixture
        .iter()
        .filter(|c| c.weight >= threshold)
        .cloned()
        .collect();

    if remaining.is_empty() {
        return match heaviest(&mixture.components) {
            Some(i) => GaussianMixture::from_components(vec![mixture.components[i]
                .with_weight(mixture.total_weight())]),
            None => GaussianMixture::new(),
        };
    }

    redistribute(&mut remaining, pruned_weight_sum);
    GaussianMixture::from_components(remaining)
}

/// Truncates the mixture to keep only the top N components by weight.
///
/// The weights of truncated components are redistributed equally among the
/// remaining components to preserve the total weight. The sort is stable, so
/// earlier components win ties.
pub fn truncate<T: RealField + Copy, const N: usize>(
    mixture: &GaussianMixture<T, N>,
    max_components: usize,
) -> GaussianMixture<T, N> {
    if mixture.len() <= max_components {
        return mixture.clone();
    }

    let mut indexed: Vec<_> = mixture.iter().collect();
    indexed.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));

    let truncated_weight_sum: T = indexed
        .iter()
        .skip(max_components)
        .fold(T::zero(), |acc, c| acc + c.weight);

    let mut remaining: Vec<_> = indexed
        .into_iter()
        .take(max_components)
        .cloned()
        .collect();

    redistribute(&mut remaining, truncated_weight_sum);
    GaussianMixture::from_components(remaining)
}

/// Computes the squared Mahalanobis distance between two Gaussian components.
///
/// Uses the covariance of component `a`. Returns `None` if that covariance is
/// not positive definite.
pub fn mahalanobis_distance_squared<T: RealField + Copy, const N: usize>(
    a: &GaussianState<T, N>,
    b: &GaussianState<T, N>,
) -> Option<T> {
    a.covariance.mahalanobis_squared(&(b.mean - a.mean))
}

/// Moment-matches a weighted set of Gaussians into a single Gaussian.
///
/// The weights need not be normalized. The result carries the total weight,
/// the weighted mean, and the weighted covariance plus the spread of the
/// means:
///
/// ```text
/// P = Σ w_i (P_i + (m_i - m)(m_i - m)^T) / Σ w_i
/// ```
///
/// Returns `None` if the total weight is not positive.
pub fn moment_match<T: RealField + Copy, const N: usize>(
    weighted: &[(T, &GaussianState<T, N>)],
) -> Option<GaussianState<T, N>> {
    let w_sum = weighted.iter().fold(T::zero(), |acc, (w, _)| acc + *w);
    if w_sum <= T::zero() || !w_sum.is_finite() {
        return None;
    }
    let inv = T::one() / w_sum;

    let mean_sum = weighted
        .iter()
        .fold(StateVector::<T, N>::zeros(), |acc, (w, c)| acc + c.mean * *w);
    let mean = mean_sum * inv;

    let mut cov = SMatrix::<T, N, N>::zeros();
    for (w, c) in weighted {
        let d = (c.mean - mean).into_svector();
        cov += (c.covariance.as_matrix() + d * d.transpose()).scale(*w);
    }

    Some(GaussianState::new(
        w_sum,
        mean,
        StateCovariance::from_matrix(cov.scale(inv)).symmetrize(),
    ))
}

/// Merges two Gaussian components into one, weighted by their weights.
///
/// Returns `None` if both components have non-positive weights.
pub fn merge_components<T: RealField + Copy, const N: usize>(
    a: &GaussianState<T, N>,
    b: &GaussianState<T, N>,
) -> Option<GaussianState<T, N>> {
    moment_match(&[(a.weight, a), (b.weight, b)])
}

/// Merges nearby components based on Mahalanobis distance.
///
/// Repeatedly takes the heaviest remaining component and absorbs every
/// component whose mean lies within `threshold` of it.
pub fn merge_nearby<T: RealField + Copy, const N: usize>(
    mixture: &GaussianMixture<T, N>,
    threshold: T,
) -> GaussianMixture<T, N> {
    let threshold_sq = threshold * threshold;
    let mut remaining: Vec<_> = mixture.iter().cloned().collect();
    let mut merged = GaussianMixture::with_capacity(remaining.len());

    while let Some(max_idx) = heaviest(&remaining) {
        let leader = remaining.remove(max_idx);

        let mut cluster = vec![leader.clone()];
        let mut i = 0;
        while i < remaining.len() {
            match mahalanobis_distance_squared(&leader, &remaining[i]) {
                Some(d2) if d2 < threshold_sq => cluster.push(remaining.remove(i)),
                _ => i += 1,
            }
        }

        let weighted: Vec<_> = cluster.iter().map(|c| (c.weight, c)).collect();
        merged.push(moment_match(&weighted).unwrap_or(leader));
    }

    merged
}

/// Applies full pruning pipeline: weight threshold, merge, truncate.
pub fn prune_and_merge<T: RealField + Copy, const N: usize>(
    mixture: &GaussianMixture<T, N>,
    config: &PruningConfig<T>,
) -> GaussianMixture<T, N> {
    let pruned = prune_by_weight(mixture, config.weight_threshold);
    let merged = merge_nearby(&pruned, config.merge_threshold);
    truncate(&merged, config.max_components)
}

// ============================================================================
// Log-domain weights
// ============================================================================

/// Converts a scalar to `f64`, mapping unrepresentable values to NaN.
#[inline]
pub fn to_f64<T: RealField + Copy>(value: T) -> f64 {
    nalgebra::try_convert::<T, f64>(value).unwrap_or(f64::NAN)
}

/// Computes `ln Σ exp(v_i)` without overflow.
///
/// Returns negative infinity for an empty slice or when every value is
/// negative infinity. A NaN anywhere in `values` yields NaN.
pub fn log_sum_exp<T: RealField + Copy>(values: &[T]) -> T {
    let neg_inf: T = nalgebra::convert(f64::NEG_INFINITY);
    let is_nan = |x: T| x.partial_cmp(&x).is_none();
    let max = values.iter().fold(neg_inf, |acc, &v| {
        if is_nan(acc) || v <= acc {
            acc
        } else {
            v
        }
    });

    if !max.is_finite() {
        return max;
    }

    let sum = values
        .iter()
        .fold(T::zero(), |acc, &v| acc + (v - max).exp());
    max + sum.ln()
}

/// Natural logarithm clamped below at `-700`.
///
/// Lets impossible events (zero likelihood) take part in log-domain
/// arithmetic as finite but negligible terms.
pub fn ln_floored<T: RealField + Copy>(value: T) -> T {
    let floor: T = nalgebra::convert(LOG_FLOOR);
    if value > T::zero() {
        value.ln().max(floor)
    } else {
        floor
    }
}

/// Lower bound applied by [`ln_floored`].
pub const LOG_FLOOR: f64 = -700.0;

/// Normalizes log-weights in place so their exponentials sum to one.
///
/// Returns the log normalizer, or `None` (leaving the weights untouched) if
/// it is not finite.
pub fn normalize_log_weights<T: RealField + Copy>(log_weights: &mut [T]) -> Option<T> {
    let normalizer = log_sum_exp(log_weights);
    if !normalizer.is_finite() {
        return None;
    }
    for w in log_weights.iter_mut() {
        *w -= normalizer;
    }
    Some(normalizer)
}
