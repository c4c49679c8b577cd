//! Camera profiles.
//!
//! A [`CameraProfile`] holds everything rigscan knows about one physical
//! camera: its serial, where it is mounted, its calibrated offset and its
//! filter configuration. Hardware-derived facts (model, concurrency class,
//! field of view) are only available after [`CameraProfile::resolve`].

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::filter::{FilterChain, FilterStep};
use crate::frame::FieldOfView;
use crate::geometry;

/// Camera technology, as classified from the device name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraModel {
    /// Stereo depth cameras (D415, D435, D435I, D455).
    StereoDepth,
    /// LiDAR cameras (L515).
    Lidar,
    /// Coded-light cameras (SR305).
    CodedLight,
    /// A device this version does not know.
    Undefined,
}

impl CameraModel {
    /// Classifies a device from the name its driver reports.
    pub fn from_device_name(name: &str) -> Self {
        match name {
            "Intel RealSense D415"
            | "Intel RealSense D435"
            | "Intel RealSense D435I"
            | "Intel RealSense D455" => Self::StereoDepth,
            "Intel RealSense L515" => Self::Lidar,
            "Intel RealSense SR305" => Self::CodedLight,
            _ => Self::Undefined,
        }
    }

    /// Whether this model may stream alongside other cameras.
    pub fn concurrency_class(self) -> ConcurrencyClass {
        match self {
            Self::StereoDepth => ConcurrencyClass::Simultaneous,
            Self::Lidar | Self::CodedLight | Self::Undefined => ConcurrencyClass::Exclusive,
        }
    }
}

/// Whether a camera can stream while other cameras stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcurrencyClass {
    /// Streams in parallel with the rest of its group.
    Simultaneous,
    /// Must be the only camera streaming.
    Exclusive,
}

/// What a connected device reports about itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceIdentity {
    pub model: CameraModel,
    pub fov: FieldOfView,
}

/// Source of device identities, keyed by serial.
pub trait DeviceLookup {
    /// Looks up a connected device.
    ///
    /// Returns [`ScanError::DeviceNotFound`] if no connected device has `serial`.
    fn lookup(&self, serial: &str) -> Result<DeviceIdentity>;
}

/// Identity facts derived from hardware for one serial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedIdentity {
    pub model: CameraModel,
    pub concurrency: ConcurrencyClass,
    pub fov: FieldOfView,
}

/// A camera mounted around the scanned object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CameraProfile {
    serial: String,
    /// Mounting angle in degrees, counter-clockwise around the vertical axis.
    angle: f32,
    #[serde(with = "geometry::serde_xyz", default)]
    position_deviation: Vec3,
    #[serde(default)]
    filters: FilterChain,
    #[serde(default = "switched_on")]
    on: bool,
    #[serde(skip)]
    resolved: Option<ResolvedIdentity>,
}

fn switched_on() -> bool {
    true
}

impl CameraProfile {
    /// Creates an unresolved profile with default filters, switched on.
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            angle: 0.0,
            position_deviation: Vec3::ZERO,
            filters: FilterChain::default(),
            on: true,
            resolved: None,
        }
    }

    /// Sets the mounting angle (builder style).
    #[must_use]
    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    /// Sets the position deviation (builder style).
    #[must_use]
    pub fn with_position_deviation(mut self, deviation: Vec3) -> Self {
        self.position_deviation = deviation;
        self
    }

    /// Sets the filter chain (builder style).
    #[must_use]
    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    /// Returns the serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Changes the serial number and drops everything derived from the old one.
    pub fn set_serial(&mut self, serial: impl Into<String>) {
        self.serial = serial.into();
        self.resolved = None;
    }

    /// Returns the mounting angle in degrees.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn set_angle(&mut self, angle: f32) {
        self.angle = angle;
    }

    /// Returns the calibrated offset from the object center.
    pub fn position_deviation(&self) -> Vec3 {
        self.position_deviation
    }

    pub fn set_position_deviation(&mut self, deviation: Vec3) {
        self.position_deviation = deviation;
    }

    /// Returns the filter configuration.
    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterChain {
        &mut self.filters
    }

    /// Returns whether the camera takes part in the next capture.
    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn set_on(&mut self, on: bool) {
        self.on = on;
    }

    /// Resolves hardware-derived facts for the current serial.
    ///
    /// Does nothing if already resolved.
    pub fn resolve(&mut self, lookup: &dyn DeviceLookup) -> Result<&ResolvedIdentity> {
        if self.resolved.is_none() {
            let identity = lookup.lookup(&self.serial)?;
            log::debug!(
                "camera {} resolved as {:?} (fov {:.1}x{:.1})",
                self.serial,
                identity.model,
                identity.fov.horizontal,
                identity.fov.vertical
            );
            self.resolved = Some(ResolvedIdentity {
                model: identity.model,
                concurrency: identity.model.concurrency_class(),
                fov: identity.fov,
            });
        }
        self.identity()
    }

    /// Marks this profile as resolved without querying hardware.
    pub fn set_resolved(&mut self, resolved: ResolvedIdentity) {
        self.resolved = Some(resolved);
    }

    /// Returns whether hardware facts are available.
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Returns the resolved identity.
    ///
    /// Fails with [`ScanError::DeviceNotFound`] if [`Self::resolve`] has not succeeded.
    pub fn identity(&self) -> Result<&ResolvedIdentity> {
        self.resolved
            .as_ref()
            .ok_or_else(|| ScanError::DeviceNotFound(self.serial.clone()))
    }

    /// Returns the concurrency class of a resolved camera.
    pub fn concurrency_class(&self) -> Result<ConcurrencyClass> {
        self.identity().map(|id| id.concurrency)
    }

    /// Returns the field of view of a resolved camera.
    pub fn fov(&self) -> Result<FieldOfView> {
        self.identity().map(|id| id.fov)
    }

    /// Returns the enabled filter steps in canonical order.
    ///
    /// Every call yields new values; callers build their own primitives from them.
    pub fn active_filters(&self) -> Vec<FilterStep> {
        self.filters.active()
    }

    /// Moves points from camera space to the object-centered frame of this camera.
    ///
    /// Flips the camera axes so "forward" points away from the object center
    /// and subtracts the calibrated deviation.
    pub fn adjust_to_object_center(&self, points: &mut [Vec3]) {
        let dev = self.position_deviation;
        for p in points.iter_mut() {
            *p = Vec3::new(-(p.x + dev.x), -(p.y + dev.y), dev.z - p.z);
        }
    }

    /// Rotates object-centered points into the shared scene frame.
    ///
    /// Must run after [`Self::adjust_to_object_center`].
    pub fn rotate_to_scene_frame(&self, points: &mut [Vec3]) {
        geometry::rotate_about_vertical(points, self.angle);
    }

    /// Adjusts then rotates, in that order.
    pub fn adjust_and_rotate(&self, points: &mut [Vec3]) {
        self.adjust_to_object_center(points);
        self.rotate_to_scene_frame(points);
    }

    /// Finds the azimuth, in this camera's object-centered frame, where this
    /// camera's view cone meets `other`'s.
    ///
    /// Not symmetric: `a.find_critical_angle(b)` and `b.find_critical_angle(a)`
    /// are expressed in different frames.
    pub fn find_critical_angle(&self, other: &CameraProfile) -> Result<f32> {
        let d1 = self.position_deviation.z;
        let d2 = other.position_deviation.z;
        let fov1 = self.fov()?.half_horizontal_radians();
        let fov2 = other.fov()?.half_horizontal_radians();
        let delta = (self.angle - other.angle).to_radians();

        geometry::view_cone_intersection(d1, fov1, d2, fov2, delta).ok_or_else(|| {
            ScanError::DegenerateGeometry {
                serial: self.serial.clone(),
                neighbor: other.serial.clone(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedLookup(HashMap<String, DeviceIdentity>);

    impl DeviceLookup for FixedLookup {
        fn lookup(&self, serial: &str) -> Result<DeviceIdentity> {
            self.0
                .get(serial)
                .copied()
                .ok_or_else(|| ScanError::DeviceNotFound(serial.to_string()))
        }
    }

    fn lookup() -> FixedLookup {
        let mut devices = HashMap::new();
        devices.insert(
            "d435".to_string(),
            DeviceIdentity {
                model: CameraModel::StereoDepth,
                fov: FieldOfView::new(70.0, 43.0),
            },
        );
        devices.insert(
            "l515".to_string(),
            DeviceIdentity {
                model: CameraModel::Lidar,
                fov: FieldOfView::new(70.0, 55.0),
            },
        );
        FixedLookup(devices)
    }

    fn resolved(serial: &str, angle: f32, depth: f32) -> CameraProfile {
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

    #[test]
    fn test_model_classification() {
        assert_eq!(
            CameraModel::from_device_name("Intel RealSense D435I"),
            CameraModel::StereoDepth
        );
        assert_eq!(CameraModel::from_device_name("Intel RealSense L515"), CameraModel::Lidar);
        assert_eq!(
            CameraModel::from_device_name("Intel RealSense SR305").concurrency_class(),
            ConcurrencyClass::Exclusive
        );
        assert_eq!(CameraModel::from_device_name("Webcam"), CameraModel::Undefined);
    }

    #[test]
    fn test_resolve_and_invalidate() {
        let lookup = lookup();
        let mut cam = CameraProfile::new("d435");
        assert!(cam.fov().is_err());

        let id = cam.resolve(&lookup).unwrap();
        assert_eq!(id.concurrency, ConcurrencyClass::Simultaneous);

        cam.set_serial("l515");
        assert!(!cam.is_resolved());
        assert_eq!(
            cam.resolve(&lookup).unwrap().concurrency,
            ConcurrencyClass::Exclusive
        );
    }

    #[test]
    fn test_resolve_unknown_serial_fails() {
        let mut cam = CameraProfile::new("missing");
        match cam.resolve(&lookup()) {
            Err(ScanError::DeviceNotFound(serial)) => assert_eq!(serial, "missing"),
            other => panic!("expected DeviceNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_adjust_to_object_center() {
        let cam = CameraProfile::new("x").with_position_deviation(Vec3::new(0.1, 0.2, 0.5));
        let mut pts = [Vec3::new(1.0, 2.0, 0.4)];
        cam.adjust_to_object_center(&mut pts);
        assert!((pts[0] - Vec3::new(-1.1, -2.2, 0.1)).length() < 1e-6);
    }

    #[test]
    fn test_adjust_then_rotate_order_matters() {
        let cam = CameraProfile::new("x")
            .with_angle(90.0)
            .with_position_deviation(Vec3::new(0.05, 0.0, 0.5));
        let original = [Vec3::new(0.1, 0.0, 0.45)];

        let mut documented = original;
        cam.adjust_and_rotate(&mut documented);

        let mut reversed = original;
        cam.rotate_to_scene_frame(&mut reversed);
        cam.adjust_to_object_center(&mut reversed);

        assert!((documented[0] - reversed[0]).length() > 1e-3);
    }

    #[test]
    fn test_critical_angle_fixture() {
        let a = resolved("a", 0.0, 500.0);
        let b = resolved("b", 60.0, 520.0);

        let ab = a.find_critical_angle(&b).unwrap();
        let ba = b.find_critical_angle(&a).unwrap();

        assert!((ab - 1.045_482).abs() < 1e-4, "got {ab}");
        assert!((ba - 2.136_420).abs() < 1e-4, "got {ba}");
        assert!((ab - ba).abs() > 0.5);
    }

    #[test]
    fn test_critical_angle_wraps_around() {
        let a = resolved("a", 0.0, 500.0);
        let prev = resolved("p", 300.0, 520.0);
        let same = resolved("q", -60.0, 520.0);
        let x = a.find_critical_angle(&prev).unwrap();
        let y = a.find_critical_angle(&same).unwrap();
        assert!((x - y).abs() < 1e-4);
    }

    #[test]
    fn test_critical_angle_with_itself_is_degenerate() {
        let a = resolved("a", 30.0, 500.0);
        assert!(matches!(
            a.find_critical_angle(&a),
            Err(ScanError::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn test_critical_angle_requires_resolution() {
        let a = resolved("a", 0.0, 500.0);
        let b = CameraProfile::new("b").with_angle(60.0);
        assert!(matches!(
            a.find_critical_angle(&b),
            Err(ScanError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_json_shape() {
        let cam = CameraProfile::new("123").with_angle(45.0);
        let json = serde_json::to_string(&cam).unwrap();
        assert!(json.contains("\"Serial\":\"123\""));
        assert!(json.contains("\"PositionDeviation\":{\"X\":0.0,\"Y\":0.0,\"Z\":0.0}"));
        let back: CameraProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.serial(), "123");
        assert!((back.angle() - 45.0).abs() < f32::EPSILON);
        assert!(!back.is_resolved());
        assert_eq!(back.filters(), cam.filters());
    }
}
