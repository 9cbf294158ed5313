use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use crate::config::PinRef;
use crate::error::AppError;
use crate::gpio::{GpioBackend, PinMode};

/// In-memory GPIO lines with a journal of every call made against them.
#[derive(Default)]
pub struct MockGpioBackend {
    pins: RwLock<HashMap<PinRef, MockPinState>>,
    calls: Mutex<Vec<GpioCall>>,
    failing: Mutex<HashSet<GpioOp>>,
}

#[derive(Debug, Clone, Copy)]
struct MockPinState {
    mode: PinMode,
    value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpioCall {
    Configure(PinRef, PinMode),
    Write(PinRef, bool),
    Read(PinRef),
    ReleaseAll,
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum GpioOp {
    Configure,
    Write,
    Read,
    Release,
}

impl MockGpioBackend {
    /// Makes every later call of `op` fail until [`clear_failures`] runs.
    ///
    /// [`clear_failures`]: MockGpioBackend::clear_failures
    pub fn fail_on(&self, op: GpioOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(op);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    pub fn calls(&self) -> Vec<GpioCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    pub fn mode(&self, pin: &PinRef) -> Option<PinMode> {
        let pins = self.pins.read().ok()?;
        pins.get(pin).map(|p| p.mode)
    }

    pub fn level(&self, pin: &PinRef) -> Option<bool> {
        let pins = self.pins.read().ok()?;
        pins.get(pin).map(|p| p.value)
    }

    fn record(&self, call: GpioCall, op: GpioOp) -> Result<(), AppError> {
        self.calls
            .lock()
            .map_err(|e| AppError::Hardware(format!("lock poisoned: {e}")))?
            .push(call);

        let failing = self
            .failing
            .lock()
            .map_err(|e| AppError::Hardware(format!("lock poisoned: {e}")))?;
        if failing.contains(&op) {
            return Err(AppError::Hardware(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

impl GpioBackend for MockGpioBackend {
    fn configure_pin(&self, pin: &PinRef, mode: PinMode) -> Result<(), AppError> {
        self.record(GpioCall::Configure(pin.clone(), mode), GpioOp::Configure)?;

        let mut pins = self
            .pins
            .write()
            .map_err(|e| AppError::Hardware(format!("lock poisoned: {e}")))?;
        let entry = pins.entry(pin.clone()).or_insert(MockPinState {
            mode: PinMode::Input,
            value: false,
        });

        entry.mode = mode;
        if let PinMode::Output { initial } = mode {
            entry.value = initial;
        }
        Ok(())
    }

    fn write_pin(&self, pin: &PinRef, value: bool) -> Result<(), AppError> {
        self.record(GpioCall::Write(pin.clone(), value), GpioOp::Write)?;

        let mut pins = self
            .pins
            .write()
            .map_err(|e| AppError::Hardware(format!("lock poisoned: {e}")))?;
        let entry = pins
            .get_mut(pin)
            .ok_or_else(|| AppError::InvalidState("pin not configured, set mode first".into()))?;

        if !entry.mode.is_writable() {
            return Err(AppError::InvalidState(
                "pin must be in output mode to set value".into(),
            ));
        }
        entry.value = value;
        Ok(())
    }

    fn read_pin(&self, pin: &PinRef) -> Result<bool, AppError> {
        self.record(GpioCall::Read(pin.clone()), GpioOp::Read)?;

        let pins = self
            .pins
            .read()
            .map_err(|e| AppError::Hardware(format!("lock poisoned: {e}")))?;
        pins.get(pin)
            .map(|p| p.value)
            .ok_or_else(|| AppError::InvalidState("pin not configured, set mode first".into()))
    }

    fn release_all(&self) -> Result<(), AppError> {
        self.record(GpioCall::ReleaseAll, GpioOp::Release)?;

        self.pins
            .write()
            .map_err(|e| AppError::Hardware(format!("lock poisoned: {e}")))?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(line: u32) -> PinRef {
        PinRef {
            chip: "/dev/gpiochip0".into(),
            line,
        }
    }

    #[test]
    fn output_starts_at_initial_level() {
        let backend = MockGpioBackend::default();
        backend
            .configure_pin(&pin(9), PinMode::Output { initial: true })
            .unwrap();
        assert!(backend.read_pin(&pin(9)).unwrap());

        backend.write_pin(&pin(9), false).unwrap();
        assert_eq!(backend.level(&pin(9)), Some(false));
    }

    #[test]
    fn write_requires_output_mode() {
        let backend = MockGpioBackend::default();
        assert!(backend.write_pin(&pin(9), true).is_err());

        backend.configure_pin(&pin(9), PinMode::Input).unwrap();
        let err = backend.write_pin(&pin(9), true).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[test]
    fn injected_failure_is_journaled_and_leaves_pin_alone() {
        let backend = MockGpioBackend::default();
        backend.fail_on(GpioOp::Configure);

        let err = backend.configure_pin(&pin(9), PinMode::Input).unwrap_err();
        assert!(matches!(err, AppError::Hardware(_)));
        assert_eq!(backend.mode(&pin(9)), None);
        assert_eq!(backend.calls(), vec![GpioCall::Configure(pin(9), PinMode::Input)]);

        backend.clear_failures();
        backend.configure_pin(&pin(9), PinMode::Input).unwrap();
        assert_eq!(backend.mode(&pin(9)), Some(PinMode::Input));
    }

    #[test]
    fn release_forgets_every_pin() {
        let backend = MockGpioBackend::default();
        backend.configure_pin(&pin(9), PinMode::Input).unwrap();
        backend
            .configure_pin(&pin(10), PinMode::Output { initial: false })
            .unwrap();

        backend.release_all().unwrap();
        assert_eq!(backend.mode(&pin(9)), None);
        assert_eq!(backend.mode(&pin(10)), None);
        assert_eq!(backend.calls().last(), Some(&GpioCall::ReleaseAll));
    }
}
