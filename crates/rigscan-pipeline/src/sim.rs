//! Simulated depth cameras.
//!
//! [`SimulatedDriver`] renders deterministic depth frames of simple scenes
//! and records when each stream starts and stops, so capture scheduling can
//! be checked without hardware.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rigscan_core::{Intrinsics, RawFrame, Result, ScanError};

use crate::driver::{DepthDriver, DepthStream, FilterBackend};

/// Meters per raw depth unit reported by simulated streams.
pub const SIM_DEPTH_SCALE: f32 = 0.001;

/// What a simulated camera looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimScene {
    /// A flat wall facing the camera at `distance` meters.
    Wall { distance: f32 },
    /// A vertical cylinder of `radius` whose axis is `axis_distance` meters
    /// in front of the camera.
    Cylinder { axis_distance: f32, radius: f32 },
}

impl SimScene {
    /// Metric depth along the ray through normalized image coordinates
    /// `(dx, _)`, or `None` if the ray misses.
    fn depth(&self, dx: f32) -> Option<f32> {
        match *self {
            Self::Wall { distance } => Some(distance),
            Self::Cylinder {
                axis_distance: d,
                radius: r,
            } => {
                // Ray (dx*t, t) against the circle x^2 + (z - d)^2 = r^2.
                let a = dx * dx + 1.0;
                let disc = d * d - a * (d * d - r * r);
                (disc >= 0.0).then(|| (d - disc.sqrt()) / a)
            }
        }
    }
}

/// Configuration of one simulated camera.
#[derive(Debug, Clone)]
pub struct SimCamera {
    pub serial: String,
    /// Product name, used to classify the model.
    pub name: String,
    pub intrinsics: Intrinsics,
    pub scene: SimScene,
    /// Zero every n-th sample; 0 disables dropouts.
    pub dropout_every: usize,
    /// Peak deterministic noise in raw depth units.
    pub noise: u16,
    /// Time spent waiting for each frame.
    pub frame_interval: Duration,
    /// Fail on the n-th frame of a stream (0-based).
    pub fail_at_frame: Option<usize>,
}

impl SimCamera {
    fn with_name(serial: &str, name: &str) -> Self {
        Self {
            serial: serial.to_string(),
            name: name.to_string(),
            intrinsics: Intrinsics::from_horizontal_fov(64, 48, 70.0),
            scene: SimScene::Wall { distance: 0.5 },
            dropout_every: 0,
            noise: 0,
            frame_interval: Duration::ZERO,
            fail_at_frame: None,
        }
    }

    /// A stereo depth camera (streams concurrently).
    pub fn stereo(serial: &str) -> Self {
        Self::with_name(serial, "Intel RealSense D435")
    }

    /// A LiDAR camera (streams exclusively).
    pub fn lidar(serial: &str) -> Self {
        Self::with_name(serial, "Intel RealSense L515")
    }

    #[must_use]
    pub fn with_scene(mut self, scene: SimScene) -> Self {
        self.scene = scene;
        self
    }

    #[must_use]
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        let fov = self.intrinsics.fov().horizontal;
        self.intrinsics = Intrinsics::from_horizontal_fov(width, height, fov);
        self
    }

    #[must_use]
    pub fn with_dropout_every(mut self, n: usize) -> Self {
        self.dropout_every = n;
        self
    }

    #[must_use]
    pub fn with_noise(mut self, noise: u16) -> Self {
        self.noise = noise;
        self
    }

    #[must_use]
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    #[must_use]
    pub fn failing_at_frame(mut self, frame: usize) -> Self {
        self.fail_at_frame = Some(frame);
        self
    }

    fn render(&self, frame_index: usize) -> Vec<u16> {
        let intr = self.intrinsics;
        let mut depth = Vec::with_capacity((intr.width * intr.height) as usize);
        for _ in 0..intr.height {
            for x in 0..intr.width {
                let idx = depth.len();
                if self.dropout_every > 0 && idx % self.dropout_every == 0 {
                    depth.push(0);
                    continue;
                }
                let dx = (x as f32 - intr.ppx) / intr.fx;
                let raw = self.scene.depth(dx).map_or(0, |z| {
                    let raw = (z / SIM_DEPTH_SCALE).round() as i64 + self.noise_at(idx, frame_index);
                    raw.clamp(0, i64::from(u16::MAX)) as u16
                });
                depth.push(raw);
            }
        }
        depth
    }

    fn noise_at(&self, idx: usize, frame_index: usize) -> i64 {
        if self.noise == 0 {
            return 0;
        }
        let h = (idx as u64)
            .wrapping_mul(2_654_435_761)
            .wrapping_add((frame_index as u64).wrapping_mul(40_503))
            % (2 * u64::from(self.noise) + 1);
        h as i64 - i64::from(self.noise)
    }
}

/// Whether a stream event is a start or a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventKind {
    Started,
    Stopped,
}

/// A stream start or stop observed by the simulated driver.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub serial: String,
    pub kind: StreamEventKind,
    pub at: Instant,
}

type EventLog = Arc<Mutex<Vec<StreamEvent>>>;

/// A driver over simulated cameras.
pub struct SimulatedDriver {
    cameras: Vec<SimCamera>,
    events: EventLog,
    epoch: Instant,
}

impl SimulatedDriver {
    pub fn new(cameras: Vec<SimCamera>) -> Self {
        Self {
            cameras,
            events: Arc::new(Mutex::new(Vec::new())),
            epoch: Instant::now(),
        }
    }

    fn camera(&self, serial: &str) -> Result<&SimCamera> {
        self.cameras
            .iter()
            .find(|c| c.serial == serial)
            .ok_or_else(|| ScanError::DeviceNotFound(serial.to_string()))
    }

    /// All stream events so far, in order.
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }

    /// Number of times a stream was started on `serial`.
    pub fn stream_starts(&self, serial: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.serial == serial && e.kind == StreamEventKind::Started)
            .count()
    }

    /// Start/stop pairs of every completed stream on `serial`.
    pub fn stream_windows(&self, serial: &str) -> Vec<(Instant, Instant)> {
        let mut windows = Vec::new();
        let mut open = None;
        for event in self.events.lock().iter().filter(|e| e.serial == serial) {
            match event.kind {
                StreamEventKind::Started => open = Some(event.at),
                StreamEventKind::Stopped => {
                    if let Some(start) = open.take() {
                        windows.push((start, event.at));
                    }
                }
            }
        }
        windows
    }

    /// Forgets recorded events.
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }
}

impl FilterBackend for SimulatedDriver {}

impl DepthDriver for SimulatedDriver {
    type Stream = SimStream;

    fn enumerate_devices(&self) -> Result<Vec<String>> {
        Ok(self.cameras.iter().map(|c| c.serial.clone()).collect())
    }

    fn device_name(&self, serial: &str) -> Result<String> {
        Ok(self.camera(serial)?.name.clone())
    }

    fn start_stream(&self, serial: &str) -> Result<SimStream> {
        let camera = self.camera(serial)?.clone();
        self.events.lock().push(StreamEvent {
            serial: serial.to_string(),
            kind: StreamEventKind::Started,
            at: Instant::now(),
        });
        Ok(SimStream {
            camera,
            next_frame: 0,
            events: Arc::clone(&self.events),
            epoch: self.epoch,
        })
    }
}

/// An open simulated stream.
pub struct SimStream {
    camera: SimCamera,
    next_frame: usize,
    events: EventLog,
    epoch: Instant,
}

impl DepthStream for SimStream {
    fn wait_for_frame(&mut self) -> Result<RawFrame> {
        let index = self.next_frame;
        self.next_frame += 1;
        if !self.camera.frame_interval.is_zero() {
            std::thread::sleep(self.camera.frame_interval);
        }
        if self.camera.fail_at_frame == Some(index) {
            return Err(ScanError::CaptureFailure {
                serial: self.camera.serial.clone(),
                reason: format!("frame {index} timed out"),
            });
        }

        let intr = self.camera.intrinsics;
        Ok(RawFrame {
            serial: self.camera.serial.clone(),
            timestamp: self.epoch.elapsed().as_secs_f64() * 1000.0,
            width: intr.width,
            height: intr.height,
            depth: self.camera.render(index),
            depth_scale: SIM_DEPTH_SCALE,
            intrinsics: intr,
        })
    }

    fn intrinsics(&self) -> Result<Intrinsics> {
        Ok(self.camera.intrinsics)
    }

    fn stop(self) -> Result<()> {
        self.events.lock().push(StreamEvent {
            serial: self.camera.serial,
            kind: StreamEventKind::Stopped,
            at: Instant::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_frame_is_flat() {
        let driver = SimulatedDriver::new(vec![SimCamera::stereo("a")]);
        let mut stream = driver.start_stream("a").unwrap();
        let frame = stream.wait_for_frame().unwrap();
        assert_eq!(frame.len(), 64 * 48);
        assert!(frame.depth.iter().all(|&d| d == 500));
        stream.stop().unwrap();
        assert_eq!(driver.stream_windows("a").len(), 1);
    }

    #[test]
    fn test_cylinder_is_nearest_at_center() {
        let cam = SimCamera::stereo("a").with_scene(SimScene::Cylinder {
            axis_distance: 0.5,
            radius: 0.1,
        });
        let frame = cam.render(0);
        let row = &frame[24 * 64..25 * 64];
        let center = row[32];
        assert_eq!(center, 400);
        assert_eq!(row[0], 0);
        assert!(row[28] > center);
    }

    #[test]
    fn test_dropout_and_failure_injection() {
        let driver = SimulatedDriver::new(vec![SimCamera::stereo("a")
            .with_resolution(10, 10)
            .with_dropout_every(10)
            .failing_at_frame(1)]);
        let mut stream = driver.start_stream("a").unwrap();
        assert_eq!(stream.wait_for_frame().unwrap().valid_count(), 90);
        assert!(matches!(
            stream.wait_for_frame(),
            Err(ScanError::CaptureFailure { .. })
        ));
    }
}
