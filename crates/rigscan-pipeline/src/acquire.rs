//! Frame acquisition from a single camera.

use std::time::Instant;

use rigscan_core::{CameraProfile, FilterChain, RawFrame, Result, ScanError, ScanSession};

use crate::driver::{DepthDriver, DepthStream};
use crate::filters::FrameAverager;

/// How many frames one capture discards and keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Warm-up frames discarded while auto-exposure settles.
    pub dummy_frames: u32,
    /// Frames averaged into the representative frame.
    pub frames: u32,
}

impl CaptureSettings {
    pub fn from_session(session: &ScanSession) -> Self {
        Self {
            dummy_frames: session.dummy_frames_number,
            frames: session.frames_number,
        }
    }

    /// Rejects settings that would capture nothing.
    pub fn validate(&self) -> Result<()> {
        if self.frames == 0 {
            return Err(ScanError::InvalidConfig(
                "frames number must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from_session(&ScanSession::default())
    }
}

/// Opens a stream, captures, and closes it again.
pub struct FrameAcquirer<'d, D: DepthDriver> {
    driver: &'d D,
    settings: CaptureSettings,
}

impl<'d, D: DepthDriver> FrameAcquirer<'d, D> {
    pub fn new(driver: &'d D, settings: CaptureSettings) -> Self {
        Self { driver, settings }
    }

    /// Captures one camera and averages its frames as they arrive.
    ///
    /// Returns the representative frame of the capture. The stream is
    /// stopped whether or not the capture succeeded.
    pub fn acquire(&self, camera: &CameraProfile) -> Result<RawFrame> {
        let serial = camera.serial();
        self.settings.validate()?;
        let started = Instant::now();
        let mut stream = self
            .driver
            .start_stream(serial)
            .map_err(|e| e.for_camera(serial))?;

        let captured = self.capture(&mut stream, camera.filters());
        let stopped = stream.stop();
        let frame = captured.map_err(|e| e.for_camera(serial))?;
        stopped.map_err(|e| e.for_camera(serial))?;

        log::debug!(
            "captured {} frames from {serial} in {:.1?}",
            self.settings.frames,
            started.elapsed()
        );
        Ok(frame)
    }

    fn capture(&self, stream: &mut D::Stream, chain: &FilterChain) -> Result<RawFrame> {
        for _ in 0..self.settings.dummy_frames {
            stream.wait_for_frame()?;
        }
        let mut averager = FrameAverager::new(self.driver, chain)?;
        for _ in 0..self.settings.frames {
            averager.push(stream.wait_for_frame()?)?;
        }
        averager.finish()
    }
}
