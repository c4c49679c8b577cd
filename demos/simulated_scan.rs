#![allow(clippy::cast_precision_loss)]
//! Demo scanning a simulated cylinder with a ring of cameras.
//!
//! Six stereo cameras and one LiDAR surround a cylinder. The stereo cameras
//! capture together, the LiDAR afterwards, and the stitched cloud is written
//! to `<dir>/ring_scan.xyz`.
//!
//! Run with: `RUST_LOG=debug cargo run --example simulated_scan -- [dir]`

use std::time::Duration;

use rigscan::*;

fn main() -> Result<()> {
    init_logging();
    let dir = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());

    let scene = SimScene::Cylinder {
        axis_distance: 0.5,
        radius: 0.12,
    };
    let mut cameras: Vec<SimCamera> = (0..6)
        .map(|i| {
            SimCamera::stereo(&format!("d435-{i}"))
                .with_scene(scene)
                .with_noise(3)
                .with_dropout_every(97)
                .with_frame_interval(Duration::from_millis(2))
        })
        .collect();
    cameras.push(
        SimCamera::lidar("l515-0")
            .with_scene(scene)
            .with_resolution(128, 96)
            .with_frame_interval(Duration::from_millis(2)),
    );

    let mut scanner = Scanner::new(SimulatedDriver::new(cameras));
    scanner.refresh_cameras()?;

    let session = scanner.session_mut();
    session.filename = "ring_scan".to_string();
    session.frames_number = 5;
    session.dummy_frames_number = 5;
    let count = session.cameras.len();
    for (i, camera) in session.cameras.iter_mut().enumerate() {
        camera.set_angle(i as f32 * 360.0 / count as f32);
        camera.set_position_deviation(Vec3::new(0.0, 0.0, 0.5));
        let filters = camera.filters_mut();
        filters.set_enabled(SpatialParams::NAME, true)?;
        filters.set_enabled(HoleFillingParams::NAME, true)?;
    }

    let path = scanner.scan_to_file(&dir)?;
    let cloud_len = std::fs::read_to_string(&path)?.lines().count();
    println!("Stitched {cloud_len} points from {count} cameras");
    println!("Written to {}", path.display());
    Ok(())
}
