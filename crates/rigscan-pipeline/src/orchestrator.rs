//! Capture scheduling.
//!
//! Stereo depth cameras do not interfere with each other and stream in
//! parallel. LiDAR and coded-light cameras do, so each of them streams
//! alone once every parallel capture has finished. Processing a capture
//! (filtering, deprojection, stitching) never touches hardware and runs as
//! soon as its frames are in.
//!
//! ```text
//! Idle -> Scheduling -> CapturingConcurrent -> CapturingExclusive -> Processing -> Merged
//! ```
//!
//! Every state before `Merged` moves to `Failed` on the first error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ScopedJoinHandle;
use std::time::Instant;

use rigscan_core::{
    CameraProfile, ConcurrencyClass, PointCloud, RawFrame, Result, ScanError, ScanSession,
};

use crate::acquire::{CaptureSettings, FrameAcquirer};
use crate::catalog::DeviceCatalog;
use crate::driver::DepthDriver;
use crate::transform::{self, PointCloudTransformer, StitchOptions};

/// Where a scan currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scheduling,
    CapturingConcurrent,
    CapturingExclusive,
    Processing,
    Merged,
    Failed,
}

/// Shared flag telling pending processing that the scan has failed.
#[derive(Debug, Default)]
pub struct Cancellation(AtomicBool);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns [`ScanError::Cancelled`] once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One camera's capture, handed to the processing step.
pub struct CaptureJob<'a> {
    /// Position of the camera in the scheduled list.
    pub index: usize,
    pub camera: &'a CameraProfile,
    /// The capture averaged into one frame.
    pub frame: RawFrame,
}

/// Runs captures in hardware-safe order and processes them as they arrive.
pub struct CaptureOrchestrator<'c, D: DepthDriver> {
    catalog: &'c DeviceCatalog<D>,
    state: ScanState,
}

impl<'c, D: DepthDriver> CaptureOrchestrator<'c, D> {
    pub fn new(catalog: &'c DeviceCatalog<D>) -> Self {
        Self {
            catalog,
            state: ScanState::Idle,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Returns the driver captures run on.
    pub fn driver(&self) -> &'c D {
        self.catalog.driver()
    }

    pub(crate) fn transition(&mut self, next: ScanState) {
        log::debug!("scan state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail<T>(&mut self, err: ScanError) -> Result<T> {
        self.transition(ScanState::Failed);
        Err(err)
    }

    /// Resolves the active cameras and returns a snapshot of them.
    ///
    /// Any camera that is not connected, or whose filter chain has invalid
    /// parameters, fails the run before a single stream is opened.
    pub fn schedule(&mut self, session: &mut ScanSession) -> Result<Vec<CameraProfile>> {
        self.transition(ScanState::Scheduling);
        if let Err(e) = CaptureSettings::from_session(session).validate() {
            return self.fail(e);
        }
        for camera in session.cameras.iter_mut().filter(|c| c.is_on()) {
            if let Err(e) = camera.resolve(self.catalog) {
                return self.fail(e);
            }
            if let Err(e) = camera.filters().validate() {
                return self.fail(e.for_camera(camera.serial()));
            }
        }
        let cameras: Vec<CameraProfile> = session.active_cameras().cloned().collect();
        if cameras.is_empty() {
            return self.fail(ScanError::NoActiveCameras);
        }
        Ok(cameras)
    }

    /// Captures every camera and runs `process` on each capture.
    ///
    /// Returns one result per camera, in the order of `cameras`. The first
    /// failure, by camera order, fails the whole run; later failures are
    /// logged and discarded.
    pub fn execute<T, F>(&mut self, cameras: &[CameraProfile], settings: CaptureSettings, process: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(CaptureJob<'_>, &Cancellation) -> Result<T> + Sync,
    {
        let mut concurrent = Vec::new();
        let mut exclusive = Vec::new();
        for (i, camera) in cameras.iter().enumerate() {
            match camera.concurrency_class() {
                Ok(ConcurrencyClass::Simultaneous) => concurrent.push(i),
                Ok(ConcurrencyClass::Exclusive) => exclusive.push(i),
                Err(e) => return self.fail(e),
            }
        }
        log::debug!(
            "{} concurrent and {} exclusive cameras",
            concurrent.len(),
            exclusive.len()
        );

        let acquirer = FrameAcquirer::new(self.driver(), settings);
        let cancel = Cancellation::new();
        let (acquirer, cancel, process) = (&acquirer, &cancel, &process);
        let mut failures: Vec<(usize, ScanError)> = Vec::new();
        let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(cameras.len()).collect();

        std::thread::scope(|s| {
            let spawn_processing = move |index: usize, frame: RawFrame| {
                let camera = &cameras[index];
                s.spawn(move || {
                    cancel.check()?;
                    let job = CaptureJob { index, camera, frame };
                    process(job, cancel).map_err(|e| match e {
                        ScanError::Cancelled => e,
                        other => {
                            cancel.cancel();
                            other.for_camera(camera.serial())
                        }
                    })
                })
            };

            self.transition(ScanState::CapturingConcurrent);
            let captures: Vec<_> = concurrent
                .iter()
                .map(|&i| {
                    let camera = &cameras[i];
                    (i, s.spawn(move || acquirer.acquire(camera)))
                })
                .collect();

            let mut captured = Vec::with_capacity(captures.len());
            for (i, handle) in captures {
                match join(handle, cameras[i].serial()) {
                    Ok(frame) => captured.push((i, frame)),
                    Err(e) => failures.push((i, e)),
                }
            }

            let mut processing = Vec::with_capacity(cameras.len());
            if failures.is_empty() {
                for (i, frame) in captured {
                    processing.push((i, spawn_processing(i, frame)));
                }

                self.transition(ScanState::CapturingExclusive);
                for &i in &exclusive {
                    if cancel.is_cancelled() {
                        log::debug!("skipping exclusive captures after a failed processing step");
                        break;
                    }
                    match acquirer.acquire(&cameras[i]) {
                        Ok(frame) => processing.push((i, spawn_processing(i, frame))),
                        Err(e) => {
                            cancel.cancel();
                            failures.push((i, e));
                            break;
                        }
                    }
                }
            } else {
                cancel.cancel();
                drop(captured);
                log::debug!("skipping exclusive captures after a failed parallel capture");
            }

            self.transition(ScanState::Processing);
            for (i, handle) in processing {
                match join(handle, cameras[i].serial()) {
                    Ok(value) => results[i] = Some(value),
                    Err(e) => {
                        cancel.cancel();
                        failures.push((i, e));
                    }
                }
            }
        });

        if let Some(err) = first_failure(failures) {
            return self.fail(err);
        }
        results
            .into_iter()
            .map(|r| r.ok_or(ScanError::Cancelled))
            .collect()
    }

    /// Captures all active cameras and stitches their clouds.
    pub fn scan(&mut self, session: &mut ScanSession) -> Result<PointCloud> {
        let started = Instant::now();
        let cameras = self.schedule(session)?;
        let options = StitchOptions::from_session(session);
        let bounds = if options.cull_overlap {
            transform::seam_bounds(&cameras)
        } else {
            vec![rigscan_core::geometry::FULL_COVERAGE; cameras.len()]
        };

        let transformer = PointCloudTransformer::new(self.driver(), options);
        let clouds = self.execute(&cameras, CaptureSettings::from_session(session), |job, cancel| {
            let cloud = transformer.process(job.camera, bounds[job.index], job.frame)?;
            cancel.check()?;
            Ok(cloud)
        })?;

        let merged: PointCloud = clouds.into_iter().collect();
        self.transition(ScanState::Merged);
        log::info!(
            "scanned {} points from {} cameras in {:.2?}",
            merged.len(),
            cameras.len(),
            started.elapsed()
        );
        Ok(merged)
    }
}

fn join<T>(handle: ScopedJoinHandle<'_, Result<T>>, serial: &str) -> Result<T> {
    handle.join().unwrap_or_else(|_| {
        Err(ScanError::CaptureFailure {
            serial: serial.to_string(),
            reason: "capture task panicked".to_string(),
        })
    })
}

/// Picks the error to report: the lowest camera index that failed for a
/// reason other than cancellation. The rest are logged.
fn first_failure(mut failures: Vec<(usize, ScanError)>) -> Option<ScanError> {
    failures.sort_by_key(|(i, e)| (matches!(e, ScanError::Cancelled), *i));
    let mut failures = failures.into_iter();
    let (_, first) = failures.next()?;
    for (_, e) in failures.filter(|(_, e)| !matches!(e, ScanError::Cancelled)) {
        log::warn!("suppressed error: {e}");
    }
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimCamera, SimulatedDriver};
    use rigscan_core::{DecimationParams, FilterKind, FilterStep, Vec3};
    use std::sync::atomic::AtomicUsize;

    fn session(serials: &[&str]) -> ScanSession {
        let mut session = ScanSession::new();
        session.frames_number = 2;
        session.dummy_frames_number = 1;
        for (i, serial) in serials.iter().enumerate() {
            session.add_camera(
                CameraProfile::new(*serial)
                    .with_angle(i as f32 * 90.0)
                    .with_position_deviation(Vec3::new(0.0, 0.0, 0.5)),
            );
        }
        session
    }

    #[test]
    fn test_no_active_cameras() {
        let catalog = DeviceCatalog::new(SimulatedDriver::new(vec![SimCamera::stereo("a")]));
        let mut session = session(&["a"]);
        session.cameras[0].set_on(false);

        let mut orchestrator = CaptureOrchestrator::new(&catalog);
        assert!(matches!(
            orchestrator.scan(&mut session),
            Err(ScanError::NoActiveCameras)
        ));
        assert_eq!(orchestrator.state(), ScanState::Failed);
    }

    #[test]
    fn test_missing_device_fails_before_streaming() {
        let catalog = DeviceCatalog::new(SimulatedDriver::new(vec![SimCamera::stereo("a")]));
        let mut session = session(&["a", "ghost"]);

        let mut orchestrator = CaptureOrchestrator::new(&catalog);
        match orchestrator.scan(&mut session) {
            Err(ScanError::DeviceNotFound(serial)) => assert_eq!(serial, "ghost"),
            other => panic!("expected DeviceNotFound, got {other:?}"),
        }
        // Only the resolution stream of "a" was opened.
        assert_eq!(catalog.driver().stream_starts("a"), 1);
    }

    #[test]
    fn test_scan_reaches_merged() {
        let catalog = DeviceCatalog::new(SimulatedDriver::new(vec![
            SimCamera::stereo("a"),
            SimCamera::lidar("b"),
        ]));
        let mut session = session(&["a", "b"]);
        session.cull_overlap = false;

        let mut orchestrator = CaptureOrchestrator::new(&catalog);
        let cloud = orchestrator.scan(&mut session).unwrap();
        assert_eq!(orchestrator.state(), ScanState::Merged);
        assert_eq!(cloud.len(), 2 * 64 * 48);
    }

    #[test]
    fn test_results_follow_camera_order() {
        let catalog = DeviceCatalog::new(SimulatedDriver::new(vec![
            SimCamera::lidar("x"),
            SimCamera::stereo("y"),
            SimCamera::stereo("z"),
        ]));
        let mut session = session(&["x", "y", "z"]);
        let mut orchestrator = CaptureOrchestrator::new(&catalog);
        let cameras = orchestrator.schedule(&mut session).unwrap();

        let calls = AtomicUsize::new(0);
        let serials = orchestrator
            .execute(&cameras, CaptureSettings::from_session(&session), |job, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                assert_eq!(job.frame.len(), 64 * 48);
                Ok(job.camera.serial().to_string())
            })
            .unwrap();
        assert_eq!(serials, vec!["x", "y", "z"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_processing_error_is_attributed() {
        let catalog = DeviceCatalog::new(SimulatedDriver::new(vec![
            SimCamera::stereo("a"),
            SimCamera::stereo("b"),
        ]));
        let mut session = session(&["a", "b"]);
        let mut orchestrator = CaptureOrchestrator::new(&catalog);
        let cameras = orchestrator.schedule(&mut session).unwrap();

        let err = orchestrator
            .execute(&cameras, CaptureSettings::from_session(&session), |job, _| {
                if job.camera.serial() == "b" {
                    Err(ScanError::EmptyPointCloud("b".into()))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert_eq!(err.serial(), Some("b"));
        assert_eq!(orchestrator.state(), ScanState::Failed);
    }

    #[test]
    fn test_processing_failure_stops_later_exclusive_captures() {
        let interval = std::time::Duration::from_millis(20);
        let catalog = DeviceCatalog::new(SimulatedDriver::new(vec![
            SimCamera::stereo("a"),
            SimCamera::lidar("l1").with_frame_interval(interval),
            SimCamera::lidar("l2").with_frame_interval(interval),
            SimCamera::lidar("l3").with_frame_interval(interval),
        ]));
        let mut session = session(&["a", "l1", "l2", "l3"]);
        let mut orchestrator = CaptureOrchestrator::new(&catalog);
        let cameras = orchestrator.schedule(&mut session).unwrap();

        let err = orchestrator
            .execute(&cameras, CaptureSettings::from_session(&session), |job, _| {
                if job.camera.serial() == "a" {
                    Err(ScanError::EmptyPointCloud("a".into()))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert_eq!(err.serial(), Some("a"));
        // The failure lands while "l1" is still capturing.
        let driver = catalog.driver();
        assert_eq!(driver.stream_starts("l2"), 1);
        assert_eq!(driver.stream_starts("l3"), 1);
    }

    #[test]
    fn test_invalid_filter_fails_before_streaming() {
        let catalog = DeviceCatalog::new(SimulatedDriver::new(vec![
            SimCamera::stereo("a"),
            SimCamera::lidar("b"),
        ]));
        let mut session = session(&["a", "b"]);
        session.cameras[0]
            .filters_mut()
            .set(FilterStep::new(FilterKind::Decimation(DecimationParams {
                filter_magnitude: 0,
            })));

        let mut orchestrator = CaptureOrchestrator::new(&catalog);
        let err = orchestrator.scan(&mut session).unwrap_err();
        assert_eq!(err.serial(), Some("a"));
        assert_eq!(orchestrator.state(), ScanState::Failed);
        assert_eq!(catalog.driver().stream_starts("a"), 1);
        assert_eq!(catalog.driver().stream_starts("b"), 1);
    }

    #[test]
    fn test_first_failure_prefers_real_errors_by_camera_order() {
        let failures = vec![
            (0, ScanError::Cancelled),
            (2, ScanError::EmptyPointCloud("c".into())),
            (1, ScanError::EmptyPointCloud("b".into())),
        ];
        match first_failure(failures) {
            Some(ScanError::EmptyPointCloud(serial)) => assert_eq!(serial, "b"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(first_failure(Vec::new()).is_none());
    }

    #[test]
    fn test_cancellation() {
        let cancel = Cancellation::new();
        assert!(cancel.check().is_ok());
        cancel.cancel();
        assert!(matches!(cancel.check(), Err(ScanError::Cancelled)));
    }
}
