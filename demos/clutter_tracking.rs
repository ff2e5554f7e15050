//! PMBM Tracking in Dense Clutter
//!
//! Simulates three constant-velocity targets observed with missed
//! detections and Poisson clutter, then reports how well the filter
//! recovers them. Per-step diagnostics go through the `log` facade;
//! install a logger in your own binary to see them.
//!
//! Run with: cargo run --example clutter_tracking

use pmbm::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};

const STEPS: usize = 40;
const REGION: (f64, f64) = (0.0, 200.0);
const CLUTTER_RATE: f64 = 10.0;
const P_DETECTION: f64 = 0.9;
const SIGMA: f64 = 2.0;

struct Target {
    state: [f64; 4],
    born: usize,
    dies: usize,
}

impl Target {
    fn position_at(&self, t: usize) -> Option<[f64; 2]> {
        if t < self.born || t >= self.dies {
            return None;
        }
        let dt = (t - self.born) as f64;
        Some([
            self.state[0] + self.state[2] * dt,
            self.state[1] + self.state[3] * dt,
        ])
    }
}

fn simulate(rng: &mut StdRng, targets: &[Target]) -> Vec<Vec<Measurement<f64, 2>>> {
    let noise = Normal::new(0.0, SIGMA).unwrap();
    let clutter_count = Poisson::new(CLUTTER_RATE).unwrap();

    (0..STEPS)
        .map(|t| {
            let mut scan = Vec::new();
            for target in targets {
                if let Some([x, y]) = target.position_at(t) {
                    if rng.random::<f64>() < P_DETECTION {
                        scan.push(Measurement::from_array([
                            x + noise.sample(rng),
                            y + noise.sample(rng),
                        ]));
                    }
                }
            }
            let n_false: f64 = clutter_count.sample(rng);
            for _ in 0..n_false as usize {
                scan.push(Measurement::from_array([
                    rng.random_range(REGION.0..REGION.1),
                    rng.random_range(REGION.0..REGION.1),
                ]));
            }
            scan
        })
        .collect()
}

fn main() -> Result<()> {
    println!("PMBM Tracking in Dense Clutter");
    println!("==============================\n");

    let mut rng = StdRng::seed_from_u64(42);
    let targets = [
        Target { state: [20.0, 30.0, 3.0, 2.0], born: 0, dies: STEPS },
        Target { state: [180.0, 40.0, -2.5, 2.5], born: 5, dies: 35 },
        Target { state: [100.0, 180.0, 0.5, -3.0], born: 12, dies: STEPS },
    ];
    let scans = simulate(&mut rng, &targets);

    let birth_cov = StateCovariance::from_diagonal(&nalgebra::vector![400.0, 400.0, 16.0, 16.0]);
    let mut birth = GaussianMixture::new();
    for &(x, y) in &[(20.0, 30.0), (180.0, 40.0), (100.0, 180.0), (100.0, 100.0)] {
        birth.push(GaussianState::new(
            0.03,
            StateVector::from_array([x, y, 0.0, 0.0]),
            birth_cov,
        ));
    }

    let config = PmbmConfig::high_fidelity().with_gating_threshold(Some(16.0));
    let filter = PmbmFilter::new(
        ConstantVelocity2D::new(0.5, 0.99),
        PositionSensor2D::new(SIGMA, P_DETECTION),
        UniformClutter2D::new(CLUTTER_RATE, REGION, REGION),
        config,
    )?;
    let mut tracker = PmbmTracker::new(filter, birth)?;

    let mut total_error = 0.0;
    let mut matched = 0usize;
    let mut cardinality_errors = 0usize;

    for (t, scan) in scans.iter().enumerate() {
        let estimates = tracker.step(scan, 1.0)?;
        let alive: Vec<[f64; 2]> = targets.iter().filter_map(|tg| tg.position_at(t)).collect();

        if estimates.len() != alive.len() {
            cardinality_errors += 1;
        }
        for truth in &alive {
            let closest = estimates
                .iter()
                .map(|e| {
                    let dx = e.mean.index(0) - truth[0];
                    let dy = e.mean.index(1) - truth[1];
                    (dx * dx + dy * dy).sqrt()
                })
                .fold(f64::INFINITY, f64::min);
            if closest < 10.0 {
                total_error += closest;
                matched += 1;
            }
        }

        if t % 5 == 4 {
            let stats = tracker.last_stats();
            println!(
                "Step {:2}: {:2} measurements, {} estimates ({} true), {:3} hypotheses, {} gated pairs",
                t,
                scan.len(),
                estimates.len(),
                alive.len(),
                stats.hypotheses_retained,
                stats.gated_pair_count
            );
        }
    }

    println!("\nSummary");
    println!("-------");
    println!("Matched estimates:        {}", matched);
    if matched > 0 {
        println!("Mean position error:      {:.2}", total_error / matched as f64);
    }
    println!("Steps with wrong count:   {} / {}", cardinality_errors, STEPS);
    println!(
        "Final MAP cardinality:    {}",
        tracker.belief().map_cardinality()
    );

    Ok(())
}
