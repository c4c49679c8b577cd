//! Hardware driver abstraction.
//!
//! A [`DepthDriver`] enumerates connected cameras and opens depth streams on
//! them. Everything above this module talks to hardware only through these
//! traits, so a [`crate::sim::SimulatedDriver`] can stand in for real devices.

use rigscan_core::{FilterStep, Intrinsics, RawFrame, Result};

use crate::filters::{self, DepthFilter};

/// Source of filter primitives.
///
/// The default implementation builds the software filters from
/// [`crate::filters`]; drivers with hardware-accelerated filters override it.
pub trait FilterBackend: Send + Sync {
    /// Builds a fresh primitive for one step.
    ///
    /// Called once per step per capture; primitives are never shared between
    /// cameras or captures.
    fn create_filter(&self, step: &FilterStep) -> Result<Box<dyn DepthFilter>> {
        filters::software_filter(step)
    }
}

/// The software filter backend on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareBackend;

impl FilterBackend for SoftwareBackend {}

/// Access to connected depth cameras.
pub trait DepthDriver: FilterBackend {
    /// Stream handle type returned by [`Self::start_stream`].
    type Stream: DepthStream;

    /// Lists the serials of all connected devices.
    fn enumerate_devices(&self) -> Result<Vec<String>>;

    /// Returns the product name the device reports, e.g. `"Intel RealSense D435"`.
    fn device_name(&self, serial: &str) -> Result<String>;

    /// Opens the depth stream of one device.
    fn start_stream(&self, serial: &str) -> Result<Self::Stream>;
}

/// An open depth stream, owned by exactly one capture task.
pub trait DepthStream: Send {
    /// Blocks until the next depth frame arrives.
    fn wait_for_frame(&mut self) -> Result<RawFrame>;

    /// Intrinsics of the depth stream.
    fn intrinsics(&self) -> Result<Intrinsics>;

    /// Stops streaming and releases the device.
    fn stop(self) -> Result<()>;
}
