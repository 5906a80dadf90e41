//! [`DriverRuntime`] – process-wide driver globals.
//!
//! Exactly one runtime may be alive per process.  It owns the global
//! [`DeviceTable`] and every loaded [`Driver`]; dropping it shuts the drivers
//! down and releases the globals, so teardown happens on every exit path,
//! including early returns during startup.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use erratic_types::BridgeError;
use tracing::{info, warn};

use crate::device::Driver;
use crate::table::DeviceTable;

static ACTIVE: AtomicBool = AtomicBool::new(false);

pub struct DriverRuntime {
    table: DeviceTable,
    drivers: Vec<Arc<dyn Driver>>,
}

impl DriverRuntime {
    /// Acquire the driver globals.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DriverInit`] while another runtime is alive.
    pub fn init() -> Result<Self, BridgeError> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BridgeError::DriverInit(
                "driver globals are already initialised".to_string(),
            ));
        }
        info!("driver globals initialised");
        Ok(Self {
            table: DeviceTable::new(),
            drivers: Vec::new(),
        })
    }

    /// Take ownership of `driver` and register the devices it provides.
    pub fn load(&mut self, driver: Arc<dyn Driver>) {
        for device in driver.devices() {
            info!(driver = driver.name(), addr = %device.addr(), "device registered");
            self.table.register(device);
        }
        self.drivers.push(driver);
    }

    pub fn table(&self) -> &DeviceTable {
        &self.table
    }
}

impl Drop for DriverRuntime {
    fn drop(&mut self) {
        for driver in self.drivers.drain(..).rev() {
            info!(driver = driver.name(), "shutting down driver");
            driver.shutdown();
        }
        self.table.clear();
        if !ACTIVE.swap(false, Ordering::SeqCst) {
            warn!("driver globals were released twice");
        }
        info!("driver globals torn down");
    }
}
