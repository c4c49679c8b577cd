//! Device catalog.

use std::collections::HashMap;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use rigscan_core::{CameraModel, DeviceIdentity, DeviceLookup, Result, ScanError};

use crate::driver::{DepthDriver, DepthStream};

/// A driver together with a cache of what its devices reported.
///
/// Each distinct serial is queried at most once; later lookups are served
/// from the cache under a read lock.
pub struct DeviceCatalog<D: DepthDriver> {
    driver: D,
    identities: RwLock<HashMap<String, DeviceIdentity>>,
}

impl<D: DepthDriver> DeviceCatalog<D> {
    /// Creates an empty catalog over a driver.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            identities: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Lists the serials of all connected devices.
    pub fn connected_serials(&self) -> Result<Vec<String>> {
        self.driver.enumerate_devices()
    }

    /// Number of serials resolved so far.
    pub fn cached_len(&self) -> usize {
        self.identities.read().len()
    }

    /// Forgets what was learned about one serial.
    pub fn invalidate(&self, serial: &str) {
        self.identities.write().remove(serial);
    }

    /// Forgets everything, e.g. after devices were re-plugged.
    pub fn clear(&self) {
        self.identities.write().clear();
    }

    fn query(&self, serial: &str) -> Result<DeviceIdentity> {
        if !self.driver.enumerate_devices()?.iter().any(|s| s == serial) {
            return Err(ScanError::DeviceNotFound(serial.to_string()));
        }
        let name = self.driver.device_name(serial)?;
        let model = CameraModel::from_device_name(&name);
        if model == CameraModel::Undefined {
            log::warn!("device {serial} ({name}) is not a known model, capturing it exclusively");
        }

        let stream = self.driver.start_stream(serial)?;
        let intrinsics = stream.intrinsics();
        stream.stop()?;
        let fov = intrinsics?.fov();

        log::debug!("catalogued {serial}: {name}, {model:?}");
        Ok(DeviceIdentity { model, fov })
    }
}

impl<D: DepthDriver> DeviceLookup for DeviceCatalog<D> {
    fn lookup(&self, serial: &str) -> Result<DeviceIdentity> {
        if let Some(identity) = self.identities.read().get(serial) {
            return Ok(*identity);
        }

        // Only one upgradable reader at a time, so a serial is never queried twice.
        let identities = self.identities.upgradable_read();
        if let Some(identity) = identities.get(serial) {
            return Ok(*identity);
        }
        let identity = self.query(serial)?;
        RwLockUpgradableReadGuard::upgrade(identities).insert(serial.to_string(), identity);
        Ok(identity)
    }
}
