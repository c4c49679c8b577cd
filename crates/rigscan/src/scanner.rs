//! The scanner: a session bound to a driver.

use std::path::{Path, PathBuf};

use rigscan_core::{CameraProfile, PointCloud, Result, ScanSession, Vec3};
use rigscan_pipeline::{Calibrator, CaptureOrchestrator, DepthDriver, DeviceCatalog, ScanState};

/// Owns a scan session and the cameras it runs on.
///
/// # Example
///
/// ```no_run
/// use rigscan::*;
///
/// fn main() -> Result<()> {
///     let driver = SimulatedDriver::new(vec![SimCamera::stereo("a"), SimCamera::lidar("b")]);
///     let mut scanner = Scanner::new(driver);
///     scanner.refresh_cameras()?;
///     let path = scanner.scan_to_file(".")?;
///     println!("wrote {}", path.display());
///     Ok(())
/// }
/// ```
pub struct Scanner<D: DepthDriver> {
    session: ScanSession,
    catalog: DeviceCatalog<D>,
    last_state: ScanState,
}

impl<D: DepthDriver> Scanner<D> {
    /// Creates a scanner with a default session and no cameras.
    pub fn new(driver: D) -> Self {
        Self::with_session(driver, ScanSession::default())
    }

    /// Creates a scanner over an existing session.
    pub fn with_session(driver: D, session: ScanSession) -> Self {
        Self {
            session,
            catalog: DeviceCatalog::new(driver),
            last_state: ScanState::Idle,
        }
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ScanSession {
        &mut self.session
    }

    pub fn catalog(&self) -> &DeviceCatalog<D> {
        &self.catalog
    }

    pub fn driver(&self) -> &D {
        self.catalog.driver()
    }

    /// State the last scan or calibration ended in.
    pub fn last_state(&self) -> ScanState {
        self.last_state
    }

    /// Adds a default profile for every connected device the session does not know.
    ///
    /// Returns the serials that were added.
    pub fn refresh_cameras(&mut self) -> Result<Vec<String>> {
        let mut added = Vec::new();
        for serial in self.catalog.connected_serials()? {
            if self.session.add_camera(CameraProfile::new(serial.clone())) {
                added.push(serial);
            }
        }
        log::info!(
            "{} cameras known, {} newly connected",
            self.session.cameras.len(),
            added.len()
        );
        Ok(added)
    }

    /// Scans with every active camera and returns the stitched cloud.
    pub fn scan(&mut self) -> Result<PointCloud> {
        let mut orchestrator = CaptureOrchestrator::new(&self.catalog);
        let result = orchestrator.scan(&mut self.session);
        self.last_state = orchestrator.state();
        result
    }

    /// Scans and writes `<filename>.xyz` into `dir`.
    ///
    /// Nothing is written if the scan fails.
    pub fn scan_to_file(&mut self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let cloud = self.scan()?;
        let path = dir.as_ref().join(format!("{}.xyz", self.session.filename));
        cloud.save_xyz(&path)?;
        Ok(path)
    }

    /// Measures every active camera's offset against the calibration surface.
    pub fn calibrate(&mut self) -> Result<Vec<(String, Vec3)>> {
        let mut calibrator = Calibrator::new(&self.catalog);
        let result = calibrator.calibrate(&mut self.session);
        self.last_state = calibrator.state();
        result
    }

    /// Saves the session as JSON.
    pub fn save_config(&self, path: impl AsRef<Path>) -> Result<()> {
        self.session.save(path)
    }

    /// Replaces the session with one loaded from JSON.
    pub fn load_config(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.session = ScanSession::load(path)?;
        Ok(())
    }
}
