pub mod backend;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod gpio;
pub mod routes;

pub use config::{AppConfig, DeviceConfig, HttpConfig, PinRef};
pub use controller::{DeviceController, Phase};
pub use device::{Device, DeviceRegistry, DeviceState, DeviceView};
pub use error::AppError;
pub use gpio::{GpioBackend, PinMode, drive_value_for};
pub use routes::AppState;

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodBackend;
pub use backend::{GpioCall, GpioOp, MockGpioBackend};
