//! Capture pipeline for rigscan.
//!
//! This crate turns a [`ScanSession`](rigscan_core::ScanSession) into a point
//! cloud:
//! - [`DepthDriver`] and [`DepthStream`] abstract the camera hardware
//! - [`DeviceCatalog`] caches what each connected device reports
//! - [`filters`] holds the software depth filters
//! - [`CaptureOrchestrator`] schedules captures and runs processing
//! - [`Calibrator`] measures camera offsets against a flat surface
//! - [`SimulatedDriver`] stands in for hardware in tests and demos

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Pixel indices and depth samples are converted to f32 for geometry
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]

pub mod acquire;
pub mod calibrate;
pub mod catalog;
pub mod driver;
pub mod filters;
pub mod orchestrator;
pub mod sim;
pub mod transform;

pub use acquire::{CaptureSettings, FrameAcquirer};
pub use calibrate::{deviation_from_centroid, Calibrator};
pub use catalog::DeviceCatalog;
pub use driver::{DepthDriver, DepthStream, FilterBackend, SoftwareBackend};
pub use filters::{apply_chain, software_filter, DepthFilter, FrameAverager};
pub use orchestrator::{Cancellation, CaptureJob, CaptureOrchestrator, ScanState};
pub use sim::{SimCamera, SimScene, SimulatedDriver, StreamEvent, StreamEventKind};
pub use transform::{
    coverage_bounds, frame_to_points, neighbors, seam_bounds, Neighbors, PointCloudTransformer,
    StitchOptions,
};
