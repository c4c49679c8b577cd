//! Scan session configuration.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::camera::CameraProfile;
use crate::error::Result;
use crate::geometry;

/// Cameras and global capture parameters for a scan or calibration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ScanSession {
    /// All known cameras, on or off.
    pub cameras: Vec<CameraProfile>,

    /// Frames kept per camera per shot.
    pub frames_number: u32,

    /// Warm-up frames captured and discarded before the kept ones.
    pub dummy_frames_number: u32,

    /// Output file name, without extension.
    pub filename: String,

    /// Calibration surface as (width, height, distance from center).
    #[serde(rename = "CalibraitionSurface", with = "geometry::serde_xyz")]
    pub calibration_surface: Vec3,

    /// Whether overlapping fields of view are culled at the stitching seams.
    pub cull_overlap: bool,

    /// Whether to log per-camera diagnostics.
    pub debug: bool,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            frames_number: 15,
            dummy_frames_number: 30,
            filename: "default".to_string(),
            calibration_surface: Vec3::ZERO,
            cull_overlap: true,
            debug: false,
        }
    }
}

impl ScanSession {
    /// Creates a session with default parameters and no cameras.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a camera unless one with the same serial is already known.
    ///
    /// Returns true if the camera was added.
    pub fn add_camera(&mut self, camera: CameraProfile) -> bool {
        if self.camera(camera.serial()).is_some() {
            return false;
        }
        self.cameras.push(camera);
        true
    }

    /// Returns the camera with the given serial.
    pub fn camera(&self, serial: &str) -> Option<&CameraProfile> {
        self.cameras.iter().find(|c| c.serial() == serial)
    }

    /// Returns the camera with the given serial for modification.
    pub fn camera_mut(&mut self, serial: &str) -> Option<&mut CameraProfile> {
        self.cameras.iter_mut().find(|c| c.serial() == serial)
    }

    /// Returns the cameras that are switched on.
    pub fn active_cameras(&self) -> impl Iterator<Item = &CameraProfile> {
        self.cameras.iter().filter(|c| c.is_on())
    }

    /// Parses a session from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the session to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a session from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let session = Self::from_json(&json)?;
        log::info!(
            "loaded session with {} cameras from {}",
            session.cameras.len(),
            path.as_ref().display()
        );
        Ok(session)
    }

    /// Saves the session to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }
}
