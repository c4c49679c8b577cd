//! Core types for rigscan.
//!
//! This crate holds the data model shared by the capture pipeline:
//! - [`CameraProfile`] with its mounting geometry and calibrated offset
//! - [`FilterChain`] configuration and its JSON wire format
//! - [`RawFrame`] depth frames and stream [`Intrinsics`]
//! - [`PointCloud`] results and the `.xyz` writer
//! - [`ScanSession`] configuration

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Pixel and sample counts are converted to f32 for geometry
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
// Wire-format structs mirror the config file field names
#![allow(clippy::struct_field_names)]
#![allow(clippy::module_name_repetitions)]

pub mod camera;
pub mod error;
pub mod filter;
pub mod frame;
pub mod geometry;
pub mod point_cloud;
pub mod session;

pub use camera::{
    CameraModel, CameraProfile, ConcurrencyClass, DeviceIdentity, DeviceLookup, ResolvedIdentity,
};
pub use error::{Result, ScanError};
pub use filter::{
    DecimationParams, FilterChain, FilterKind, FilterStep, HoleFillMode, HoleFillingParams,
    SpatialParams, TemporalParams, ThresholdParams, FILTER_NAMES,
};
pub use frame::{FieldOfView, Intrinsics, RawFrame};
pub use point_cloud::PointCloud;
pub use session::ScanSession;

// Re-export glam types for convenience
pub use glam::{Mat3, Vec3};
