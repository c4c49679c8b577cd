//! rigscan: multi-camera depth capture around a physical object.
//!
//! Several depth cameras are mounted on a ring around an object. rigscan
//! captures every camera in a hardware-safe order, filters the depth data,
//! and stitches the views into one point cloud in a shared frame.
//!
//! # Quick Start
//!
//! ```no_run
//! use rigscan::*;
//!
//! fn main() -> Result<()> {
//!     init_logging();
//!
//!     let mut scanner = Scanner::new(SimulatedDriver::new(vec![
//!         SimCamera::stereo("front"),
//!         SimCamera::stereo("back"),
//!     ]));
//!     scanner.refresh_cameras()?;
//!     scanner.session_mut().camera_mut("back").unwrap().set_angle(180.0);
//!
//!     scanner.calibrate()?;
//!     let cloud = scanner.scan()?;
//!     println!("{} points", cloud.len());
//!     Ok(())
//! }
//! ```
//!
//! # Pipeline
//!
//! - Stereo depth cameras stream in parallel; LiDAR and coded-light cameras
//!   stream one at a time after them.
//! - Each capture is averaged over its frames as they arrive, then run
//!   through the camera's [`FilterChain`], deprojected, moved to the object
//!   center, culled at the seams with its neighbors, and rotated by its
//!   mounting angle.
//! - Any failing camera fails the whole scan.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

mod scanner;

pub use scanner::Scanner;

// Re-export core types
pub use rigscan_core::{
    error::{Result, ScanError},
    geometry, CameraModel, CameraProfile, ConcurrencyClass, DecimationParams, FieldOfView,
    FilterChain, FilterKind, FilterStep, HoleFillMode, HoleFillingParams, Intrinsics, PointCloud,
    RawFrame, ScanSession, SpatialParams, TemporalParams, ThresholdParams, Mat3, Vec3,
    FILTER_NAMES,
};

// Re-export pipeline types
pub use rigscan_pipeline::{
    CaptureOrchestrator, CaptureSettings, Calibrator, DepthDriver, DepthFilter, DepthStream,
    DeviceCatalog, FilterBackend, ScanState, SimCamera, SimScene, SimulatedDriver,
    SoftwareBackend, StitchOptions, StreamEvent, StreamEventKind,
};

/// Initializes `env_logger` from `RUST_LOG`.
///
/// Safe to call more than once; later calls do nothing.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
