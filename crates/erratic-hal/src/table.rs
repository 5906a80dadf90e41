//! [`DeviceTable`] – address-keyed lookup of every device the loaded
//! drivers provide.

use std::collections::HashMap;
use std::sync::Arc;

use erratic_types::{BridgeError, DeviceAddress};

use crate::device::Device;

#[derive(Default)]
pub struct DeviceTable {
    devices: HashMap<DeviceAddress, Arc<dyn Device>>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device` under its own address.  Any previously registered
    /// device at the same address is replaced.
    pub fn register(&mut self, device: Arc<dyn Device>) {
        self.devices.insert(device.addr(), device);
    }

    pub fn get_device(&self, addr: DeviceAddress) -> Option<Arc<dyn Device>> {
        self.devices.get(&addr).cloned()
    }

    /// Like [`get_device`][Self::get_device] but a missing device is an error.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DeviceNotFound`] when nothing is registered at
    /// `addr`.
    pub fn require(&self, addr: DeviceAddress) -> Result<Arc<dyn Device>, BridgeError> {
        self.get_device(addr)
            .ok_or(BridgeError::DeviceNotFound(addr))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }
}
