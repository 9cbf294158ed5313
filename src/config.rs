use std::{collections::HashSet, fmt, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const DEFAULT_CONFIG: &str = include_str!("../config.default.json");

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub unix_socket: Option<String>,
    pub host: Option<String>,
    pub path: String,
}

/// A GPIO line addressed through its character device.
#[derive(Debug, Hash, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PinRef {
    pub chip: String,
    pub line: u32,
}

impl fmt::Display for PinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chip, self.line)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    pub id: u32,
    pub name: String,
    pub pin: PinRef,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub devices: Vec<DeviceConfig>,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_json(&contents)
    }

    /// The device table shipped with the binary.
    pub fn embedded() -> Result<Self, AppError> {
        Self::from_json(DEFAULT_CONFIG)
    }

    pub fn from_json(contents: &str) -> Result<Self, AppError> {
        let config: AppConfig = serde_json::from_str(contents)
            .map_err(|e| AppError::Config(format!("Invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.http.unix_socket.is_none() && self.http.host.is_none() {
            return Err(AppError::Config(
                "either 'unix_socket' or 'host' must be specified".into(),
            ));
        }
        validate_devices(&self.devices)
    }
}

pub(crate) fn validate_devices(devices: &[DeviceConfig]) -> Result<(), AppError> {
    let mut ids = HashSet::with_capacity(devices.len());
    let mut pins = HashSet::with_capacity(devices.len());

    for device in devices {
        if device.id == 0 {
            return Err(AppError::Config(format!(
                "device '{}' must have a positive id",
                device.name
            )));
        }
        if !ids.insert(device.id) {
            return Err(AppError::Config(format!("duplicate device id {}", device.id)));
        }
        if !pins.insert(&device.pin) {
            return Err(AppError::Config(format!(
                "pin {} is assigned to more than one device",
                device.pin
            )));
        }
    }

    Ok(())
}
