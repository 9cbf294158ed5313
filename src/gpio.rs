use serde::Serialize;

use crate::config::PinRef;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PinMode {
    Input,
    Output { initial: bool },
}

impl PinMode {
    pub fn is_writable(&self) -> bool {
        matches!(self, PinMode::Output { .. })
    }
}

/// Level to drive on a relay pin for the requested relay state.
///
/// The relay board energizes its coil while the input is pulled LOW, so an
/// energized relay needs a low (`false`) pin.
pub fn drive_value_for(energized: bool) -> bool {
    !energized
}

/// Access to the GPIO lines backing the devices.
///
/// Every call is a short blocking operation that either completes or fails
/// once; implementations must not retry.
pub trait GpioBackend: Send + Sync {
    fn configure_pin(&self, pin: &PinRef, mode: PinMode) -> Result<(), AppError>;
    fn write_pin(&self, pin: &PinRef, value: bool) -> Result<(), AppError>;
    fn read_pin(&self, pin: &PinRef) -> Result<bool, AppError>;
    /// Returns every claimed line to input and lets go of it. Keeps going past
    /// failures and reports the first one.
    fn release_all(&self) -> Result<(), AppError>;
}
