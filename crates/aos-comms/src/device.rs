use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CommsError, DeviceError};

/// Transport device reaching one or more peer machines.
///
/// The device owns delivery; inbound traffic is handed back to the vat by the
/// host calling `CommsVat::receive` (or `send_in` for the legacy format).
pub trait ChannelDevice {
    fn send_over_channel(&mut self, from: &str, to: &str, message: &str)
    -> Result<(), DeviceError>;

    /// Route future traffic addressed to `machine` back to this vat.
    fn register_inbound_callback(&mut self, machine: &str) -> Result<(), DeviceError>;
}

/// Devices installed into a vat, looked up by the names `connect` refers to.
#[derive(Default)]
pub struct DeviceTable {
    devices: BTreeMap<String, Box<dyn ChannelDevice>>,
}

impl DeviceTable {
    pub fn install(&mut self, name: impl Into<String>, device: Box<dyn ChannelDevice>) {
        self.devices.insert(name.into(), device);
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut (dyn ChannelDevice + 'static), CommsError> {
        self.devices
            .get_mut(name)
            .map(|device| device.as_mut())
            .ok_or_else(|| CommsError::UnknownDevice(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }
}

impl fmt::Debug for DeviceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.devices.keys()).finish()
    }
}
