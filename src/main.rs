//! Example usage of the PMBM library
//!
//! Two targets cross paths in light clutter. The filter keeps both
//! identities through the crossing and drops the false alarms.

use pmbm::prelude::*;

fn birth_intensity() -> GaussianMixture<f64, 4> {
    let cov = StateCovariance::from_matrix(nalgebra::matrix![
        100.0, 0.0, 0.0, 0.0;
        0.0, 100.0, 0.0, 0.0;
        0.0, 0.0, 25.0, 0.0;
        0.0, 0.0, 0.0, 25.0
    ]);

    GaussianMixture::new()
        .with_component(0.05, StateVector::from_array([10.0, 10.0, 0.0, 0.0]), cov)
        .with_component(0.05, StateVector::from_array([10.0, 90.0, 0.0, 0.0]), cov)
}

/// Noise-free positions of the two targets at step `t`.
fn truth(t: usize) -> [[f64; 2]; 2] {
    let t = t as f64;
    [[10.0 + 4.0 * t, 10.0 + 4.0 * t], [10.0 + 4.0 * t, 90.0 - 4.0 * t]]
}

fn main() -> Result<()> {
    println!("PMBM: Multi-Target Tracking Library");
    println!("===================================\n");

    let transition = ConstantVelocity2D::new(
        1.0,  // Process noise (acceleration std)
        0.99, // Survival probability
    );
    let observation = PositionSensor2D::new(
        1.0,  // Measurement noise std
        0.95, // Detection probability
    );
    let clutter = UniformClutter2D::new(
        2.0,          // Clutter rate (expected false alarms per scan)
        (0.0, 100.0), // X bounds
        (0.0, 100.0), // Y bounds
    );

    let filter = PmbmFilter::new(
        transition,
        observation,
        clutter,
        PmbmConfig::default_config(),
    )?;
    let mut tracker = PmbmTracker::new(filter, birth_intensity())?;

    // Deterministic offsets standing in for sensor noise
    let jitter = [0.4, -0.3, 0.1, -0.5, 0.2, 0.3, -0.2, -0.1, 0.5, -0.4];
    let clutter_points = [[72.0, 15.0], [33.0, 81.0], [90.0, 42.0]];

    for t in 0..20 {
        let mut scan: Vec<Measurement<f64, 2>> = truth(t)
            .iter()
            .enumerate()
            .filter(|(i, _)| !(t == 7 && *i == 1))
            .map(|(i, p)| {
                let e = jitter[(t + 3 * i) % jitter.len()];
                Measurement::from_array([p[0] + e, p[1] - e])
            })
            .collect();
        if t % 3 == 0 {
            scan.push(Measurement::from_array(clutter_points[(t / 3) % clutter_points.len()]));
        }

        let estimates = tracker.step(&scan, 1.0)?;
        let stats = tracker.last_stats();
        let belief = tracker.belief();

        println!(
            "Step {:2}: {} measurements, {} hypotheses, {:.2} expected objects",
            t,
            scan.len(),
            belief.num_hypotheses(),
            belief.expected_cardinality()
        );
        if stats.has_issues() {
            println!("  numerical issues: {:?}", stats);
        }
        for est in &estimates {
            println!(
                "  Track {}: pos=({:.1}, {:.1}), vel=({:.1}, {:.1}), r={:.2}",
                est.id,
                est.mean.index(0),
                est.mean.index(1),
                est.mean.index(2),
                est.mean.index(3),
                est.existence
            );
        }
    }

    println!("\nTracking complete!");

    // Type safety (these would not compile):
    // let predicted = tracker.filter().predict(tracker.belief(), 1.0);
    // let twice = tracker.filter().predict(&predicted, 1.0);  // ERROR: predict needs an Updated belief

    Ok(())
}
