#![allow(clippy::cast_precision_loss)]
//! Demo calibrating camera offsets against a simulated flat surface.
//!
//! Each camera sees a wall at a slightly different distance. Calibration
//! measures the offsets, and the updated session is saved as JSON.
//!
//! Run with: `RUST_LOG=info cargo run --example simulated_calibration -- [config.json]`

use rigscan::*;

fn main() -> Result<()> {
    init_logging();
    let config = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "rigscan_session.json".to_string());

    let distances = [0.48, 0.50, 0.53, 0.51];
    let cameras = distances
        .iter()
        .enumerate()
        .map(|(i, &distance)| {
            SimCamera::stereo(&format!("cam-{i}"))
                .with_scene(SimScene::Wall { distance })
                .with_noise(2)
        })
        .collect();

    let mut scanner = Scanner::new(SimulatedDriver::new(cameras));
    scanner.refresh_cameras()?;
    scanner.session_mut().calibration_surface = Vec3::new(0.3, 0.2, 0.2);
    for (i, camera) in scanner.session_mut().cameras.iter_mut().enumerate() {
        camera.set_angle(90.0 * i as f32);
    }

    for (serial, deviation) in scanner.calibrate()? {
        println!(
            "{serial}: X {:+.4}  Y {:+.4}  Z {:.4}",
            deviation.x, deviation.y, deviation.z
        );
    }

    scanner.save_config(&config)?;
    println!("Session saved to {config}");
    Ok(())
}
