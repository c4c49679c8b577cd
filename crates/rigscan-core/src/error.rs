//! Error types for rigscan.

use thiserror::Error;

/// The main error type for rigscan operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// No connected device carries the given serial number.
    #[error("device with serial number '{0}' is not connected")]
    DeviceNotFound(String),

    /// A filter name outside the fixed catalog.
    #[error("filter '{0}' is not supported")]
    UnsupportedFilter(String),

    /// A filter step carries parameters its primitive cannot run with.
    #[error("invalid {filter} parameters: {reason}")]
    InvalidFilter { filter: &'static str, reason: String },

    /// The view cones of two cameras do not intersect at a usable angle.
    #[error("degenerate critical angle between camera '{serial}' and camera '{neighbor}'")]
    DegenerateGeometry { serial: String, neighbor: String },

    /// Driver-level failure while streaming.
    #[error("capture failed on camera '{serial}': {reason}")]
    CaptureFailure { serial: String, reason: String },

    /// A camera produced no usable points.
    #[error("camera '{0}' produced an empty point cloud")]
    EmptyPointCloud(String),

    /// Session parameters that cannot drive a capture.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No camera is switched on.
    #[error("no active cameras to scan with")]
    NoActiveCameras,

    /// The scan was cancelled because another camera failed.
    #[error("scan cancelled")]
    Cancelled,

    /// A processing error attributed to the camera that raised it.
    #[error("camera '{serial}' failed: {source}")]
    CameraFailed {
        serial: String,
        #[source]
        source: Box<ScanError>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ScanError {
    /// Attributes this error to a camera, unless it already names one.
    #[must_use]
    pub fn for_camera(self, serial: &str) -> Self {
        if self.serial().is_some() {
            return self;
        }
        Self::CameraFailed {
            serial: serial.to_string(),
            source: Box::new(self),
        }
    }

    /// Returns the serial of the camera this error is about, if any.
    pub fn serial(&self) -> Option<&str> {
        match self {
            Self::DeviceNotFound(serial) | Self::EmptyPointCloud(serial) => Some(serial),
            Self::DegenerateGeometry { serial, .. }
            | Self::CaptureFailure { serial, .. }
            | Self::CameraFailed { serial, .. } => Some(serial),
            _ => None,
        }
    }
}

/// A specialized Result type for rigscan operations.
pub type Result<T> = std::result::Result<T, ScanError>;
