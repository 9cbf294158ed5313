use log::warn;
use std::path::PathBuf;

use libgpiod::{chip::Chip, line, request};
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use rustc_hash::FxHashMap;

use crate::config::PinRef;
use crate::error::AppError;
use crate::gpio::{GpioBackend, PinMode};

pub struct LibgpiodBackend {
    pins: RwLock<FxHashMap<PinRef, Mutex<PinHandle>>>, // keyed by chip and line
}

struct PinHandle {
    line: u32,
    mode: PinMode,
    request: request::Request,
}

impl PinHandle {
    fn open(pin: &PinRef, mode: PinMode) -> Result<Self, AppError> {
        let chip = open_chip(&pin.chip)?;
        let line_cfg = make_line_config(pin.line, mode)?;
        let request = request_lines(&chip, &line_cfg)?;

        Ok(Self {
            line: pin.line,
            mode,
            request,
        })
    }

    fn reconfigure(&mut self, mode: PinMode) -> Result<(), AppError> {
        let line_cfg = make_line_config(self.line, mode)?;
        self.request
            .reconfigure_lines(&line_cfg)
            .map_err(|e| AppError::Hardware(format!("reconfigure line {}: {e}", self.line)))?;
        self.mode = mode;
        Ok(())
    }
}

fn open_chip(path: &str) -> Result<Chip, AppError> {
    let p = PathBuf::from(path);
    Chip::open(&p).map_err(|e| AppError::Hardware(format!("open chip {path}: {e}")))
}

fn request_lines(chip: &Chip, line_cfg: &line::Config) -> Result<request::Request, AppError> {
    let mut req_cfg =
        request::Config::new().map_err(|e| AppError::Hardware(format!("request config: {e}")))?;
    req_cfg
        .set_consumer(env!("CARGO_PKG_NAME"))
        .map_err(|e| AppError::Hardware(format!("request consumer: {e}")))?;
    chip.request_lines(Some(&req_cfg), line_cfg)
        .map_err(|e| AppError::Hardware(format!("request lines: {e}")))
}

fn to_line_value(value: bool) -> line::Value {
    if value {
        line::Value::Active
    } else {
        line::Value::InActive
    }
}

fn make_line_settings(mode: PinMode) -> Result<line::Settings, AppError> {
    let mut ls =
        line::Settings::new().map_err(|e| AppError::Hardware(format!("libgpiod settings: {e}")))?;

    match mode {
        PinMode::Input => {
            ls.set_direction(line::Direction::Input)
                .map_err(|e| AppError::Hardware(format!("set direction: {e}")))?;
            ls.set_bias(None)
                .map_err(|e| AppError::Hardware(format!("set bias: {e}")))?;
        }
        PinMode::Output { initial } => {
            ls.set_direction(line::Direction::Output)
                .map_err(|e| AppError::Hardware(format!("set direction: {e}")))?;
            ls.set_drive(line::Drive::PushPull)
                .map_err(|e| AppError::Hardware(format!("set drive: {e}")))?;
            ls.set_output_value(to_line_value(initial))
                .map_err(|e| AppError::Hardware(format!("set output value: {e}")))?;
        }
    }

    Ok(ls)
}

fn make_line_config(offset: u32, mode: PinMode) -> Result<line::Config, AppError> {
    let settings = make_line_settings(mode)?;
    let mut cfg =
        line::Config::new().map_err(|e| AppError::Hardware(format!("line config: {e}")))?;
    cfg.add_line_settings(&[offset], settings)
        .map_err(|e| AppError::Hardware(format!("line config add settings: {e}")))?;
    Ok(cfg)
}

impl LibgpiodBackend {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            pins: RwLock::new(FxHashMap::default()),
        })
    }
}

impl GpioBackend for LibgpiodBackend {
    fn configure_pin(&self, pin: &PinRef, mode: PinMode) -> Result<(), AppError> {
        let pins = self.pins.upgradable_read();

        match pins.get(pin) {
            Some(handle) => handle.lock().reconfigure(mode),
            None => {
                // the upgradable guard is exclusive among upgraders, so the line
                // can be requested before taking the write lock
                let handle = PinHandle::open(pin, mode)?;
                let mut pins = RwLockUpgradableReadGuard::upgrade(pins);
                pins.insert(pin.clone(), Mutex::new(handle));
                Ok(())
            }
        }
    }

    fn write_pin(&self, pin: &PinRef, value: bool) -> Result<(), AppError> {
        let pins = self.pins.read();
        let mut handle = pins
            .get(pin)
            .ok_or_else(|| AppError::InvalidState("pin not configured, set mode first".into()))?
            .lock();

        if !handle.mode.is_writable() {
            return Err(AppError::InvalidState(
                "pin must be in output mode to set value".into(),
            ));
        }

        let offset = handle.line;
        handle
            .request
            .set_value(offset, to_line_value(value))
            .map_err(|e| AppError::Hardware(format!("set value on {pin}: {e}")))?;
        Ok(())
    }

    fn read_pin(&self, pin: &PinRef) -> Result<bool, AppError> {
        let pins = self.pins.read();
        let handle = pins
            .get(pin)
            .ok_or_else(|| AppError::InvalidState("pin not configured, set mode first".into()))?
            .lock();

        let value = handle
            .request
            .value(handle.line)
            .map_err(|e| AppError::Hardware(format!("get value on {pin}: {e}")))?;
        Ok(matches!(value, line::Value::Active))
    }

    fn release_all(&self) -> Result<(), AppError> {
        let pins = std::mem::take(&mut *self.pins.write());
        let mut first_error = None;

        for (pin, handle) in pins {
            let mut handle = handle.into_inner();
            if handle.mode.is_writable()
                && let Err(e) = handle.reconfigure(PinMode::Input)
            {
                warn!("failed to return {pin} to input: {e}");
                first_error.get_or_insert(e);
            }
            // dropping the request hands the line back to the kernel
            drop(handle);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
