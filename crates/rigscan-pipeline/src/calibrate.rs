//! Position calibration against a flat reference surface.
//!
//! Each camera looks at a flat surface mounted at a known distance from the
//! object center. The centroid of what the camera sees tells how far the
//! camera sits off its nominal axis.

use std::time::Instant;

use rigscan_core::{Result, ScanError, ScanSession, Vec3};

use crate::acquire::CaptureSettings;
use crate::catalog::DeviceCatalog;
use crate::driver::DepthDriver;
use crate::orchestrator::{CaptureOrchestrator, ScanState};
use crate::transform::{PointCloudTransformer, StitchOptions};

/// Position deviation for a camera whose view of the surface has centroid `c`.
///
/// `surface.z` is the distance of the surface from the object center.
pub fn deviation_from_centroid(centroid: Vec3, surface: Vec3) -> Vec3 {
    Vec3::new(-centroid.x, -centroid.y, surface.z + centroid.z)
}

/// Runs a calibration capture and updates camera offsets.
pub struct Calibrator<'c, D: DepthDriver> {
    orchestrator: CaptureOrchestrator<'c, D>,
}

impl<'c, D: DepthDriver> Calibrator<'c, D> {
    pub fn new(catalog: &'c DeviceCatalog<D>) -> Self {
        Self {
            orchestrator: CaptureOrchestrator::new(catalog),
        }
    }

    pub fn state(&self) -> ScanState {
        self.orchestrator.state()
    }

    /// Captures every active camera and stores its new position deviation.
    ///
    /// Nothing in `session` changes unless every camera succeeded. Returns
    /// the new deviations by serial, in camera order.
    pub fn calibrate(&mut self, session: &mut ScanSession) -> Result<Vec<(String, Vec3)>> {
        let started = Instant::now();
        let cameras = self.orchestrator.schedule(session)?;
        let surface = session.calibration_surface;
        let transformer = PointCloudTransformer::new(
            self.orchestrator.driver(),
            StitchOptions {
                cull_overlap: false,
                debug: session.debug,
            },
        );

        let deviations = self.orchestrator.execute(
            &cameras,
            CaptureSettings::from_session(session),
            |job, cancel| {
                let cloud = transformer.filtered_points(job.camera, job.frame)?;
                cancel.check()?;
                let centroid = cloud
                    .centroid()
                    .ok_or_else(|| ScanError::EmptyPointCloud(job.camera.serial().to_string()))?;
                Ok(deviation_from_centroid(centroid, surface))
            },
        )?;

        let updated: Vec<(String, Vec3)> = cameras
            .iter()
            .map(|c| c.serial().to_string())
            .zip(deviations)
            .collect();
        for (serial, deviation) in &updated {
            if let Some(camera) = session.camera_mut(serial) {
                log::debug!(
                    "{serial}: position deviation {} -> {deviation}",
                    camera.position_deviation()
                );
                camera.set_position_deviation(*deviation);
            }
        }

        self.orchestrator.transition(ScanState::Merged);
        log::info!(
            "calibrated {} cameras in {:.2?}",
            updated.len(),
            started.elapsed()
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimCamera, SimulatedDriver};
    use rigscan_core::CameraProfile;

    #[test]
    fn test_deviation_formula() {
        let dev = deviation_from_centroid(Vec3::new(0.01, -0.02, 0.3), Vec3::new(0.4, 0.3, 0.2));
        assert!((dev - Vec3::new(-0.01, 0.02, 0.5)).length() < 1e-6);
    }

    #[test]
    fn test_calibrate_writes_back_offsets() {
        let catalog = DeviceCatalog::new(SimulatedDriver::new(vec![
            SimCamera::stereo("a"),
            SimCamera::lidar("b"),
        ]));
        let mut session = ScanSession::new();
        session.frames_number = 2;
        session.dummy_frames_number = 0;
        session.calibration_surface = Vec3::new(0.3, 0.2, 0.25);
        session.add_camera(CameraProfile::new("a"));
        session.add_camera(CameraProfile::new("b").with_angle(180.0));

        let mut calibrator = Calibrator::new(&catalog);
        let updated = calibrator.calibrate(&mut session).unwrap();
        assert_eq!(calibrator.state(), ScanState::Merged);
        assert_eq!(updated.len(), 2);

        for camera in &session.cameras {
            let dev = camera.position_deviation();
            // Wall 0.5 m away, surface 0.25 m from the center.
            assert!((dev.z - 0.75).abs() < 1e-3, "{dev}");
            assert!(dev.x.abs() < 0.01 && dev.y.abs() < 0.01, "{dev}");
        }
    }

    #[test]
    fn test_failed_calibration_leaves_session_untouched() {
        let catalog = DeviceCatalog::new(SimulatedDriver::new(vec![
            SimCamera::stereo("a"),
            SimCamera::stereo("b").with_dropout_every(1),
        ]));
        let mut session = ScanSession::new();
        session.frames_number = 1;
        session.dummy_frames_number = 0;
        session.add_camera(CameraProfile::new("a").with_position_deviation(Vec3::splat(9.0)));
        session.add_camera(CameraProfile::new("b"));

        let mut calibrator = Calibrator::new(&catalog);
        match calibrator.calibrate(&mut session) {
            Err(ScanError::EmptyPointCloud(serial)) => assert_eq!(serial, "b"),
            other => panic!("expected EmptyPointCloud, got {other:?}"),
        }
        assert_eq!(calibrator.state(), ScanState::Failed);
        assert_eq!(session.cameras[0].position_deviation(), Vec3::splat(9.0));
    }
}
