use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::{DeviceConfig, PinRef, validate_devices};
use crate::error::AppError;

/// Mutable half of a device record.
///
/// `active` means the relay is energized right now. It stays `false` until the
/// pin has been claimed for output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceState {
    pub active: bool,
    pub claimed: bool,
}

/// What API consumers see of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceView {
    pub id: u32,
    pub name: String,
    pub active: bool,
}

#[derive(Debug)]
pub struct Device {
    id: u32,
    name: String,
    pin: PinRef,
    state: Mutex<DeviceState>,
}

impl Device {
    fn new(config: &DeviceConfig) -> Self {
        Self {
            id: config.id,
            name: config.name.clone(),
            pin: config.pin.clone(),
            state: Mutex::new(DeviceState::default()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pin(&self) -> &PinRef {
        &self.pin
    }

    pub fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    pub fn view(&self) -> DeviceView {
        self.view_with(&self.state.lock())
    }

    pub(crate) fn view_with(&self, state: &DeviceState) -> DeviceView {
        DeviceView {
            id: self.id,
            name: self.name.clone(),
            active: state.claimed && state.active,
        }
    }

    /// Holds the device for the duration of one state transition.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock()
    }
}

/// Devices in configuration order, created once at startup.
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    index: FxHashMap<u32, usize>,
}

impl DeviceRegistry {
    pub fn new(configs: &[DeviceConfig]) -> Result<Self, AppError> {
        validate_devices(configs)?;

        let devices: Vec<Device> = configs.iter().map(Device::new).collect();
        let index = devices
            .iter()
            .enumerate()
            .map(|(pos, device)| (device.id, pos))
            .collect();

        Ok(Self { devices, index })
    }

    pub fn list(&self) -> Vec<DeviceView> {
        self.devices.iter().map(Device::view).collect()
    }

    pub fn find_by_id(&self, id: u32) -> Option<&Device> {
        self.index.get(&id).map(|&pos| &self.devices[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
