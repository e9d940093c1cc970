//! Relax a synthetic four-scan square loop with accumulated drift.
//!
//! ```text
//! RUST_LOG=info cargo run --example square_loop
//! ```

use std::f64::consts::{FRAC_PI_2, PI};

use lumgraph::{relax_scans, LumError, PointCloud, PointXYZ, Pose, RelaxationConfig, ScanSet};
use lumgraph_registration::apply_transform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn scene() -> PointCloud {
    let mut rng = StdRng::seed_from_u64(42);
    (0..400)
        .map(|_| {
            PointXYZ::new(
                rng.gen_range(-4.0f32..4.0),
                rng.gen_range(-4.0f32..4.0),
                rng.gen_range(0.0f32..2.5),
            )
        })
        .collect()
}

fn main() -> Result<(), LumError> {
    env_logger::init();

    let truth = [
        Pose::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0),
        Pose::new(2.0, 0.0, 0.0, 0.0, 0.0, FRAC_PI_2),
        Pose::new(2.0, 2.0, 0.0, 0.0, 0.0, PI),
        Pose::new(0.0, 2.0, 0.0, 0.0, 0.0, -FRAC_PI_2),
    ];
    let scene = scene();

    let mut scans = ScanSet::default();
    for (k, t) in truth.iter().enumerate() {
        let d = 0.05 * k as f64;
        let initial = Pose::new(t.x + d, t.y + d, t.z, t.roll, t.pitch, t.yaw + 0.1 * d);
        scans.push(apply_transform(&scene, &t.to_isometry().inverse()), initial);
    }

    let mut config = RelaxationConfig::default();
    config.correspondence.max_correspondence_distance = 0.5;
    config.correspondence.refinement_iterations = 10;

    let output = relax_scans(&scans, &config)?;

    println!("status: {:?} after {} iterations", output.status, output.report.iterations);
    for warning in &output.warnings {
        println!("warning: {warning}");
    }
    println!("{:<5} {:<48} {:<48} {:>10}", "scan", "initial", "corrected", "error");
    for (k, (initial, corrected)) in scans.poses().iter().zip(&output.poses).enumerate() {
        println!(
            "{:<5} {:<48} {:<48} {:>10.2e}",
            k,
            initial.to_string(),
            corrected.to_string(),
            corrected.translation_distance(&truth[k])
        );
    }
    Ok(())
}
