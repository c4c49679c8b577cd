//! Point clouds produced by a scan.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use glam::Vec3;

use crate::error::{Result, ScanError};
use crate::geometry;

/// An unordered set of surface samples.
///
/// Never holds `Vec3::ZERO`, which depth drivers use for "no return".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<Vec3>,
}

impl PointCloud {
    /// Creates an empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a point cloud, dropping any zero points.
    pub fn from_points(points: Vec<Vec3>) -> Self {
        let mut cloud = Self { points };
        cloud.points.retain(|p| *p != Vec3::ZERO);
        cloud
    }

    /// Returns the number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the cloud has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the points.
    #[must_use]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Returns the points for in-place transformation.
    pub fn points_mut(&mut self) -> &mut [Vec3] {
        &mut self.points
    }

    /// Consumes the cloud, returning its points.
    pub fn into_points(self) -> Vec<Vec3> {
        self.points
    }

    /// Appends another cloud.
    pub fn extend(&mut self, other: PointCloud) {
        self.points.extend(other.points);
    }

    /// Mean of all points.
    pub fn centroid(&self) -> Option<Vec3> {
        geometry::centroid(&self.points)
    }

    /// Keeps only points whose azimuth lies in `[lower, upper]` (radians).
    pub fn cull(&mut self, lower: f32, upper: f32) {
        self.points.retain(|p| {
            let a = geometry::azimuth(*p);
            lower <= a && a <= upper
        });
    }

    /// Axis-aligned bounding box as (min, max).
    pub fn bounding_box(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.points.first()?;
        Some(
            self.points
                .iter()
                .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p))),
        )
    }

    /// Writes one `x y z` line per point.
    pub fn write_xyz<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        for p in &self.points {
            writeln!(writer, "{} {} {}", p.x, p.y, p.z)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes the cloud to an `.xyz` file.
    ///
    /// Points go to a sibling `.partial` file that is renamed over `path`
    /// once complete, so a failed save leaves `path` as it was.
    pub fn save_xyz(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let partial = partial_path(path);
        let saved = std::fs::File::create(&partial)
            .map_err(ScanError::from)
            .and_then(|file| self.write_xyz(file))
            .and_then(|()| std::fs::rename(&partial, path).map_err(ScanError::from));

        if let Err(e) = saved {
            if partial.exists() {
                if let Err(cleanup) = std::fs::remove_file(&partial) {
                    log::warn!("could not remove {}: {cleanup}", partial.display());
                }
            }
            return Err(e);
        }
        log::info!("wrote {} points to {}", self.len(), path.display());
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

impl FromIterator<PointCloud> for PointCloud {
    fn from_iter<I: IntoIterator<Item = PointCloud>>(iter: I) -> Self {
        let mut merged = PointCloud::new();
        for cloud in iter {
            merged.extend(cloud);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_zero_points_dropped() {
        let cloud = PointCloud::from_points(vec![Vec3::ZERO, Vec3::X, Vec3::ZERO, Vec3::Y]);
        assert_eq!(cloud.len(), 2);
    }

    #[test]
    fn test_cull_keeps_sector() {
        let mut cloud = PointCloud::from_points(vec![
            Vec3::new(0.0, 0.0, 1.0),  // pi/2
            Vec3::new(1.0, 0.0, 0.0),  // 0
            Vec3::new(-1.0, 0.0, 0.1), // ~pi
        ]);
        cloud.cull(0.5, FRAC_PI_2 + 0.5);
        assert_eq!(cloud.points(), &[Vec3::new(0.0, 0.0, 1.0)]);
    }

    #[test]
    fn test_write_xyz() {
        let cloud = PointCloud::from_points(vec![Vec3::new(1.0, 2.5, -3.0), Vec3::new(0.0, 0.0, 4.0)]);
        let mut out = Vec::new();
        cloud.write_xyz(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1 2.5 -3\n0 0 4\n");
    }

    #[test]
    fn test_save_xyz_replaces_target_whole() {
        let path = std::env::temp_dir().join(format!("rigscan_save_{}.xyz", std::process::id()));
        std::fs::write(&path, "stale contents\n").unwrap();

        let cloud = PointCloud::from_points(vec![Vec3::X, Vec3::Y]);
        cloud.save_xyz(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1 0 0\n0 1 0\n");
        assert!(!partial_path(&path).exists());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_failed_save_leaves_no_file_behind() {
        // A directory in the way makes the final rename fail.
        let path = std::env::temp_dir().join(format!("rigscan_blocked_{}.xyz", std::process::id()));
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let cloud = PointCloud::from_points(vec![Vec3::X]);
        assert!(matches!(cloud.save_xyz(&path), Err(ScanError::IoError(_))));
        assert!(path.is_dir());
        assert!(!partial_path(&path).exists());
        std::fs::remove_dir_all(&path).unwrap();

        let missing = std::env::temp_dir().join("rigscan_no_such_dir").join("cloud.xyz");
        assert!(cloud.save_xyz(&missing).is_err());
        assert!(!missing.exists());
    }

    #[test]
    fn test_merge() {
        let merged: PointCloud = vec![
            PointCloud::from_points(vec![Vec3::X]),
            PointCloud::from_points(vec![Vec3::Y, Vec3::Z]),
        ]
        .into_iter()
        .collect();
        assert_eq!(merged.len(), 3);
        let (min, max) = merged.bounding_box().unwrap();
        assert_eq!(min, Vec3::ZERO);
        assert_eq!(max, Vec3::ONE);
    }

    proptest! {
        #[test]
        fn prop_cull_is_idempotent(
            pts in proptest::collection::vec((-5.0f32..5.0, -5.0f32..5.0, -5.0f32..5.0), 0..200),
            lower in -3.0f32..0.0,
            width in 0.0f32..3.0,
        ) {
            let points = pts.into_iter().map(|(x, y, z)| Vec3::new(x, y, z)).collect();
            let mut once = PointCloud::from_points(points);
            once.cull(lower, lower + width);
            let mut twice = once.clone();
            twice.cull(lower, lower + width);
            prop_assert_eq!(once, twice);
        }
    }
}
