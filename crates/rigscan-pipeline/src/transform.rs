//! From depth frames to scene-frame point clouds.
//!
//! Per camera: filter the averaged capture frame, deproject it, move
//! the points to the object-centered frame, cull what the neighbors cover
//! better, and rotate into the shared scene frame.

use std::f32::consts::{FRAC_PI_2, PI};

use rigscan_core::geometry::FULL_COVERAGE;
use rigscan_core::{CameraProfile, PointCloud, RawFrame, Result, ScanError, ScanSession};

use crate::driver::FilterBackend;
use crate::filters;

/// Deprojects every valid sample of a frame into camera space (meters).
pub fn frame_to_points(frame: &RawFrame) -> PointCloud {
    let mut points = Vec::with_capacity(frame.valid_count());
    for y in 0..frame.height {
        for x in 0..frame.width {
            let d = frame.at(x, y);
            if d == 0 {
                continue;
            }
            let z = f32::from(d) * frame.depth_scale;
            points.push(frame.intrinsics.deproject(x as f32, y as f32, z));
        }
    }
    PointCloud::from_points(points)
}

/// Indices of the previous and next camera around the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbors {
    /// Closest camera at a lower mounting angle, wrapping around.
    pub prev: usize,
    /// Closest camera at a higher mounting angle, wrapping around.
    pub next: usize,
}

/// Finds each camera's neighbors by mounting angle.
///
/// The result is indexed like `cameras`. A lone camera is its own neighbor.
pub fn neighbors(cameras: &[CameraProfile]) -> Vec<Neighbors> {
    let mut order: Vec<usize> = (0..cameras.len()).collect();
    order.sort_by(|&a, &b| cameras[a].angle().total_cmp(&cameras[b].angle()));

    let n = order.len();
    let mut result = vec![Neighbors { prev: 0, next: 0 }; n];
    for (pos, &idx) in order.iter().enumerate() {
        result[idx] = Neighbors {
            prev: order[(pos + n - 1) % n],
            next: order[(pos + 1) % n],
        };
    }
    result
}

/// Azimuth range a camera keeps, in its object-centered frame.
///
/// The lower bound comes from the next camera and must lie in `(0, π/2)`,
/// the upper from the previous camera and must lie in `(π/2, π)`. Anything
/// else, including a degenerate intersection, falls back to `-π` or `π`.
/// Bounds that meet or cross give full coverage.
pub fn coverage_bounds(camera: &CameraProfile, prev: &CameraProfile, next: &CameraProfile) -> (f32, f32) {
    let bound = |neighbor: &CameraProfile, valid: std::ops::Range<f32>, fallback: f32| {
        match camera.find_critical_angle(neighbor) {
            Ok(angle) if angle > valid.start && angle < valid.end => angle,
            Ok(angle) => {
                log::debug!(
                    "critical angle {angle:.3} of {} against {} is off the visible side",
                    camera.serial(),
                    neighbor.serial()
                );
                fallback
            }
            Err(ScanError::DegenerateGeometry { serial, neighbor }) => {
                log::debug!("no usable seam between {serial} and {neighbor}");
                fallback
            }
            Err(e) => {
                log::warn!("seam of {} against {}: {e}", camera.serial(), neighbor.serial());
                fallback
            }
        }
    };

    let lower = bound(next, 0.0..FRAC_PI_2, -PI);
    let upper = bound(prev, FRAC_PI_2..PI, PI);
    if lower >= upper {
        FULL_COVERAGE
    } else {
        (lower, upper)
    }
}

/// Coverage bounds for every camera, indexed like `cameras`.
pub fn seam_bounds(cameras: &[CameraProfile]) -> Vec<(f32, f32)> {
    neighbors(cameras)
        .iter()
        .enumerate()
        .map(|(i, n)| coverage_bounds(&cameras[i], &cameras[n.prev], &cameras[n.next]))
        .collect()
}

/// Options that shape per-camera processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StitchOptions {
    /// Cull points outside each camera's coverage bounds.
    pub cull_overlap: bool,
    /// Log per-camera diagnostics.
    pub debug: bool,
}

impl StitchOptions {
    pub fn from_session(session: &ScanSession) -> Self {
        Self {
            cull_overlap: session.cull_overlap,
            debug: session.debug,
        }
    }
}

impl Default for StitchOptions {
    fn default() -> Self {
        Self {
            cull_overlap: true,
            debug: false,
        }
    }
}

/// Turns one camera's capture into points.
pub struct PointCloudTransformer<'b, B: FilterBackend + ?Sized> {
    backend: &'b B,
    options: StitchOptions,
}

impl<'b, B: FilterBackend + ?Sized> PointCloudTransformer<'b, B> {
    pub fn new(backend: &'b B, options: StitchOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> StitchOptions {
        self.options
    }

    /// Filters a capture's representative frame and deprojects it, still in
    /// camera space.
    pub fn filtered_points(&self, camera: &CameraProfile, frame: RawFrame) -> Result<PointCloud> {
        let frame = filters::apply_chain(self.backend, camera.filters(), frame)?;
        let cloud = frame_to_points(&frame);
        if self.options.debug {
            log::info!(
                "{}: {} of {} samples valid after filtering",
                camera.serial(),
                cloud.len(),
                frame.len()
            );
        }
        Ok(cloud)
    }

    /// Full per-camera processing into the scene frame.
    ///
    /// `bounds` are ignored unless culling is enabled.
    pub fn process(&self, camera: &CameraProfile, bounds: (f32, f32), frame: RawFrame) -> Result<PointCloud> {
        let mut cloud = self.filtered_points(camera, frame)?;
        camera.adjust_to_object_center(cloud.points_mut());
        if self.options.cull_overlap {
            let before = cloud.len();
            cloud.cull(bounds.0, bounds.1);
            log::debug!(
                "{}: culled to [{:.3}, {:.3}], kept {} of {before}",
                camera.serial(),
                bounds.0,
                bounds.1,
                cloud.len()
            );
        }
        camera.rotate_to_scene_frame(cloud.points_mut());
        Ok(cloud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SoftwareBackend;
    use proptest::prelude::*;
    use rigscan_core::{
        CameraModel, ConcurrencyClass, FieldOfView, Intrinsics, ResolvedIdentity, Vec3,
    };

    fn camera(serial: &str, angle: f32, depth: f32) -> CameraProfile {
        let mut cam = CameraProfile::new(serial)
            .with_angle(angle)
            .with_position_deviation(Vec3::new(0.0, 0.0, depth));
        cam.set_resolved(ResolvedIdentity {
            model: CameraModel::StereoDepth,
            concurrency: ConcurrencyClass::Simultaneous,
            fov: FieldOfView::new(70.0, 43.0),
        });
        cam
    }

    fn frame(width: u32, height: u32, depth: Vec<u16>) -> RawFrame {
        RawFrame {
            serial: "a".into(),
            timestamp: 0.0,
            width,
            height,
            depth,
            depth_scale: 0.001,
            intrinsics: Intrinsics::centered(width, height, 100.0, 100.0),
        }
    }

    #[test]
    fn test_frame_to_points_drops_zero_samples() {
        let mut depth = vec![800u16; 100];
        for i in (0..100).step_by(10) {
            depth[i] = 0;
        }
        let cloud = frame_to_points(&frame(10, 10, depth));
        assert_eq!(cloud.len(), 90);
        assert!(cloud.points().iter().all(|p| (p.z - 0.8).abs() < 1e-6));
    }

    #[test]
    fn test_neighbors_wrap_around() {
        let cams = vec![camera("b", 120.0, 0.5), camera("a", 0.0, 0.5), camera("c", 240.0, 0.5)];
        let n = neighbors(&cams);
        assert_eq!(n[1], Neighbors { prev: 2, next: 0 });
        assert_eq!(n[0], Neighbors { prev: 1, next: 2 });
        assert_eq!(n[2], Neighbors { prev: 0, next: 1 });
    }

    #[test]
    fn test_lone_camera_gets_full_coverage() {
        let cams = vec![camera("a", 0.0, 0.5)];
        assert_eq!(neighbors(&cams), vec![Neighbors { prev: 0, next: 0 }]);
        assert_eq!(seam_bounds(&cams), vec![FULL_COVERAGE]);
    }

    #[test]
    fn test_six_camera_ring_has_finite_seams() {
        let cams: Vec<_> = (0..6)
            .map(|i| camera(&i.to_string(), i as f32 * 60.0, 500.0))
            .collect();
        for (lower, upper) in seam_bounds(&cams) {
            assert!(lower > 0.0 && lower < FRAC_PI_2, "lower {lower}");
            assert!(upper > FRAC_PI_2 && upper < PI, "upper {upper}");
        }
    }

    #[test]
    fn test_wide_spacing_drops_the_lower_seam() {
        let cams = vec![camera("a", 0.0, 500.0), camera("b", 120.0, 500.0), camera("c", 240.0, 500.0)];
        for (lower, upper) in seam_bounds(&cams) {
            assert!((lower + PI).abs() < f32::EPSILON);
            assert!((upper - 2.617_994).abs() < 1e-3, "upper {upper}");
        }
    }

    #[test]
    fn test_process_without_cull_keeps_every_point() {
        let cam = camera("a", 90.0, 1.0);
        let transformer = PointCloudTransformer::new(
            &SoftwareBackend,
            StitchOptions {
                cull_overlap: false,
                debug: false,
            },
        );
        let cloud = transformer
            .process(&cam, (0.0, 0.1), frame(4, 4, vec![500; 16]))
            .unwrap();
        assert_eq!(cloud.len(), 16);
        // Center of the frame lands 0.5 m in front of the object center,
        // then a quarter turn moves +Z onto +X.
        let c = cloud.centroid().unwrap();
        assert!((c.x - 0.5).abs() < 0.05, "centroid {c}");
        assert!(c.z.abs() < 0.05);
    }

    proptest! {
        #[test]
        fn prop_one_point_per_valid_sample(
            depth in proptest::collection::vec(prop_oneof![Just(0u16), 1u16..4000], 48),
        ) {
            let frame = frame(8, 6, depth);
            let cloud = frame_to_points(&frame);
            prop_assert_eq!(cloud.len(), frame.valid_count());
            prop_assert!(cloud.points().iter().all(|p| p.z > 0.0));
        }
    }
}
