//! Common test helpers for PMBM integration tests

#![allow(dead_code)]

use pmbm::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};

pub type CvFilter = PmbmFilter<
    f64,
    ConstantVelocity2D<f64>,
    PositionSensor2D<f64>,
    UniformClutter2D<f64>,
    4,
    2,
>;

pub const REGION: (f64, f64) = (0.0, 200.0);

/// Creates a measurement at given position
pub fn make_measurement(x: f64, y: f64) -> Measurement<f64, 2> {
    Measurement::from_array([x, y])
}

/// Creates a constant-velocity filter over the standard test region
pub fn make_filter(
    sigma_a: f64,
    p_detection: f64,
    clutter_rate: f64,
    config: PmbmConfig<f64>,
) -> CvFilter {
    PmbmFilter::new(
        ConstantVelocity2D::new(sigma_a, 0.99),
        PositionSensor2D::new(1.0, p_detection),
        UniformClutter2D::new(clutter_rate, REGION, REGION),
        config,
    )
    .expect("valid test filter")
}

/// Creates a birth intensity with one component per location
pub fn make_birth(locations: &[(f64, f64)], weight: f64) -> GaussianMixture<f64, 4> {
    let cov = StateCovariance::from_matrix(nalgebra::matrix![
        100.0, 0.0, 0.0, 0.0;
        0.0, 100.0, 0.0, 0.0;
        0.0, 0.0, 10.0, 0.0;
        0.0, 0.0, 0.0, 10.0
    ]);
    let mut birth = GaussianMixture::new();
    for &(x, y) in locations {
        birth.push(GaussianState::new(
            weight,
            StateVector::from_array([x, y, 0.0, 0.0]),
            cov,
        ));
    }
    birth
}

/// Simulates noisy detections of constant-velocity targets plus uniform clutter.
///
/// Each target is `[x, y, vx, vy]` at step 0.
pub fn simulate_scans(
    seed: u64,
    targets: &[[f64; 4]],
    steps: usize,
    p_detection: f64,
    clutter_rate: f64,
) -> Vec<Vec<Measurement<f64, 2>>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.0).expect("valid normal");
    let clutter = Poisson::new(clutter_rate.max(1e-9)).expect("valid poisson");

    (0..steps)
        .map(|t| {
            let t = t as f64;
            let mut scan = Vec::new();
            for target in targets {
                if rng.random::<f64>() < p_detection {
                    scan.push(make_measurement(
                        target[0] + target[2] * t + noise.sample(&mut rng),
                        target[1] + target[3] * t + noise.sample(&mut rng),
                    ));
                }
            }
            let n_false: f64 = clutter.sample(&mut rng);
            for _ in 0..n_false as usize {
                scan.push(make_measurement(
                    rng.random_range(REGION.0..REGION.1),
                    rng.random_range(REGION.0..REGION.1),
                ));
            }
            scan
        })
        .collect()
}

/// Checks the structural invariants every updated belief must satisfy.
pub fn assert_belief_invariants(belief: &PmbmBelief<f64, 4>, max_hypotheses: usize) {
    assert!(!belief.hypotheses.is_empty(), "belief has no hypotheses");
    assert!(
        belief.num_hypotheses() <= max_hypotheses,
        "{} hypotheses exceed the cap of {}",
        belief.num_hypotheses(),
        max_hypotheses
    );
    assert!(
        (belief.total_weight() - 1.0).abs() < 1e-9,
        "weights sum to {}",
        belief.total_weight()
    );
    assert!(belief.is_consistent(), "inconsistent belief");

    for h in &belief.hypotheses {
        assert!(h.log_weight.is_finite());
        for track in h.tracks(&belief.arena) {
            assert!(
                (0.0..=1.0).contains(&track.existence),
                "existence {} out of range",
                track.existence
            );
            assert!(track.state.mean.is_finite());
            assert!(track.state.covariance.is_symmetric(1e-6));
            assert!(track.state.covariance.is_positive_definite());
        }
    }

    for component in belief.ppp.undetected.iter() {
        assert!(component.weight >= 0.0 && component.weight.is_finite());
        assert!(component.covariance.is_symmetric(1e-6));
    }
}
