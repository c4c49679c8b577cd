//! Scene geometry helpers.
//!
//! The scene frame is right-handed with +Y as the vertical axis the cameras
//! are mounted around. Azimuths are measured in the horizontal XZ plane as
//! `atan2(z, x)`.

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat3, Vec3};

/// Azimuth bounds that keep every point.
pub const FULL_COVERAGE: (f32, f32) = (-PI, PI);

/// Cotangent.
#[inline]
pub fn cot(angle: f32) -> f32 {
    1.0 / angle.tan()
}

/// Azimuth of a point in the horizontal plane, in radians.
#[inline]
pub fn azimuth(p: Vec3) -> f32 {
    p.z.atan2(p.x)
}

/// Rotation about the vertical axis by `angle_degrees`, counter-clockwise.
pub fn vertical_rotation(angle_degrees: f32) -> Mat3 {
    Mat3::from_rotation_y(angle_degrees.to_radians())
}

/// Rotates points in place about the vertical axis.
pub fn rotate_about_vertical(points: &mut [Vec3], angle_degrees: f32) {
    let rotation = vertical_rotation(angle_degrees);
    for p in points.iter_mut() {
        *p = rotation * *p;
    }
}

/// Azimuth at which two cameras' horizontal view cones intersect.
///
/// Both cones are projected onto the horizontal plane. `d1`/`d2` are the
/// distances of each camera from the object center along its own axis,
/// `half_fov1`/`half_fov2` the half horizontal fields of view and `delta` the
/// mounting angle of the first camera minus that of the second, all angles in
/// radians. The result is expressed in the first camera's object-centered
/// frame.
///
/// Returns `None` when the intersection is indeterminate (`x == 0` or a
/// non-finite intermediate).
pub fn view_cone_intersection(
    d1: f32,
    half_fov1: f32,
    d2: f32,
    half_fov2: f32,
    delta: f32,
) -> Option<f32> {
    let numerator = d2 * half_fov2.sin() / (delta + half_fov2).sin() - d1;
    let denominator = cot(half_fov1) - (FRAC_PI_2 + delta + half_fov2).tan();
    let x = numerator / denominator;
    let z = cot(half_fov1) * x + d1;

    if !x.is_finite() || !z.is_finite() || x.abs() <= f32::EPSILON * d1.abs().max(1.0) {
        return None;
    }
    Some(z.atan2(x))
}

/// Mean of a set of points, or `None` if empty.
pub fn centroid(points: &[Vec3]) -> Option<Vec3> {
    if points.is_empty() {
        return None;
    }
    let sum = points.iter().fold(Vec3::ZERO, |acc, p| acc + *p);
    Some(sum / points.len() as f32)
}

/// Serde adapter writing a [`Vec3`] as `{"X": .., "Y": .., "Z": ..}`.
pub mod serde_xyz {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Xyz {
        x: f32,
        y: f32,
        z: f32,
    }

    pub fn serialize<S: Serializer>(v: &Vec3, serializer: S) -> Result<S::Ok, S::Error> {
        Xyz {
            x: v.x,
            y: v.y,
            z: v.z,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec3, D::Error> {
        let xyz = Xyz::deserialize(deserializer)?;
        Ok(Vec3::new(xyz.x, xyz.y, xyz.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rotation_is_counter_clockwise_about_y() {
        let mut pts = [Vec3::new(0.0, 0.0, 1.0)];
        rotate_about_vertical(&mut pts, 90.0);
        assert!((pts[0] - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_azimuth() {
        assert!((azimuth(Vec3::new(0.0, 5.0, 1.0)) - FRAC_PI_2).abs() < 1e-6);
        assert!((azimuth(Vec3::new(-1.0, 0.0, 0.0)).abs() - PI).abs() < 1e-6);
    }

    #[test]
    fn test_same_camera_is_degenerate() {
        let half = 35f32.to_radians();
        assert!(view_cone_intersection(0.5, half, 0.5, half, 0.0).is_none());
    }

    #[test]
    fn test_centroid() {
        assert!(centroid(&[]).is_none());
        let c = centroid(&[Vec3::new(1.0, 2.0, 3.0), Vec3::new(3.0, 2.0, 1.0)]).unwrap();
        assert!((c - Vec3::new(2.0, 2.0, 2.0)).length() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_rotation_keeps_height_and_radius(
            x in -10.0f32..10.0, y in -10.0f32..10.0, z in -10.0f32..10.0, angle in -360.0f32..360.0
        ) {
            let before = Vec3::new(x, y, z);
            let mut pts = [before];
            rotate_about_vertical(&mut pts, angle);
            prop_assert!((pts[0].y - y).abs() < 1e-4);
            let r0 = (x * x + z * z).sqrt();
            let r1 = (pts[0].x * pts[0].x + pts[0].z * pts[0].z).sqrt();
            prop_assert!((r0 - r1).abs() < 1e-3);
        }
    }
}
