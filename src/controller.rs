use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::{DeviceRegistry, DeviceView};
use crate::error::AppError;
use crate::gpio::{GpioBackend, PinMode, drive_value_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Ready,
    Stopped,
}

/// Drives relay devices through the GPIO backend.
///
/// Every device starts with its pin as an input, which leaves the relay
/// released whatever state the line was in before. The first toggle claims the
/// pin as an output and energizes the relay; from then on each toggle only
/// writes the pin. The controller never logs: failures come back as
/// [`AppError`] and the stored device state is left untouched.
pub struct DeviceController<B: GpioBackend + ?Sized> {
    registry: DeviceRegistry,
    backend: Arc<B>,
    phase: RwLock<Phase>,
}

impl<B: GpioBackend + ?Sized> DeviceController<B> {
    pub fn new(registry: DeviceRegistry, backend: Arc<B>) -> Self {
        Self {
            registry,
            backend,
            phase: RwLock::new(Phase::Created),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Puts every pin in input mode. Any failure means the bus cannot be
    /// trusted and startup has to stop.
    pub fn initialize(&self) -> Result<(), AppError> {
        let mut phase = self.phase.write();
        if *phase != Phase::Created {
            return Err(AppError::InvalidState(format!(
                "controller already initialized ({:?})",
                *phase
            )));
        }

        for device in self.registry.iter() {
            self.backend
                .configure_pin(device.pin(), PinMode::Input)
                .map_err(|e| {
                    AppError::HardwareInit(format!(
                        "device {} ({}): {e}",
                        device.id(),
                        device.pin()
                    ))
                })?;
        }

        *phase = Phase::Ready;
        Ok(())
    }

    pub fn list(&self) -> Vec<DeviceView> {
        self.registry.list()
    }

    pub fn get(&self, id: u32) -> Result<DeviceView, AppError> {
        self.registry
            .find_by_id(id)
            .map(|device| device.view())
            .ok_or(AppError::NotFound(id))
    }

    pub fn toggle(&self, id: u32) -> Result<DeviceView, AppError> {
        let phase = self.phase.read();
        ensure_ready(*phase)?;

        let device = self.registry.find_by_id(id).ok_or(AppError::NotFound(id))?;
        let mut state = device.lock_state();

        if state.claimed {
            let next = !state.active;
            self.backend
                .write_pin(device.pin(), drive_value_for(next))
                .map_err(into_hardware)?;
            state.active = next;
        } else {
            let mode = PinMode::Output {
                initial: drive_value_for(true),
            };
            self.backend
                .configure_pin(device.pin(), mode)
                .map_err(into_hardware)?;
            state.claimed = true;
            state.active = true;
        }

        Ok(device.view_with(&state))
    }

    /// Raw line level of a claimed device, `None` while the pin is still an
    /// input.
    pub fn pin_level(&self, id: u32) -> Result<Option<bool>, AppError> {
        let phase = self.phase.read();
        ensure_ready(*phase)?;

        let device = self.registry.find_by_id(id).ok_or(AppError::NotFound(id))?;
        let state = device.lock_state();
        if !state.claimed {
            return Ok(None);
        }

        self.backend
            .read_pin(device.pin())
            .map(Some)
            .map_err(into_hardware)
    }

    /// Stops accepting toggles, waits for the ones in flight, then releases
    /// every line. Calling it again does nothing.
    pub fn shutdown(&self) -> Result<(), AppError> {
        let mut phase = self.phase.write();
        if *phase == Phase::Stopped {
            return Ok(());
        }
        *phase = Phase::Stopped;

        self.backend
            .release_all()
            .map_err(|e| AppError::Shutdown(e.to_string()))
    }
}

fn ensure_ready(phase: Phase) -> Result<(), AppError> {
    match phase {
        Phase::Ready => Ok(()),
        Phase::Created => Err(AppError::Unavailable("devices not initialized yet".into())),
        Phase::Stopped => Err(AppError::Unavailable("shutting down".into())),
    }
}

fn into_hardware(e: AppError) -> AppError {
    match e {
        AppError::Hardware(_) => e,
        other => AppError::Hardware(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GpioCall, GpioOp, MockGpioBackend};
    use crate::config::{DeviceConfig, PinRef};
    use crate::device::DeviceState;

    fn pin(line: u32) -> PinRef {
        PinRef {
            chip: "/dev/gpiochip0".into(),
            line,
        }
    }

    fn controller() -> (DeviceController<MockGpioBackend>, Arc<MockGpioBackend>) {
        let configs = vec![
            DeviceConfig {
                id: 1,
                name: "Luz 1".into(),
                pin: pin(21),
            },
            DeviceConfig {
                id: 2,
                name: "Luz 2".into(),
                pin: pin(19),
            },
        ];
        let backend = Arc::new(MockGpioBackend::default());
        let registry = DeviceRegistry::new(&configs).unwrap();
        (DeviceController::new(registry, backend.clone()), backend)
    }

    fn ready() -> (DeviceController<MockGpioBackend>, Arc<MockGpioBackend>) {
        let (controller, backend) = controller();
        controller.initialize().unwrap();
        backend.clear_calls();
        (controller, backend)
    }

    fn view(id: u32, name: &str, active: bool) -> DeviceView {
        DeviceView {
            id,
            name: name.into(),
            active,
        }
    }

    #[test]
    fn initialize_puts_every_pin_in_input() {
        let (controller, backend) = controller();
        controller.initialize().unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                GpioCall::Configure(pin(21), PinMode::Input),
                GpioCall::Configure(pin(19), PinMode::Input),
            ]
        );
        assert_eq!(controller.phase(), Phase::Ready);
        assert_eq!(
            controller.list(),
            vec![view(1, "Luz 1", false), view(2, "Luz 2", false)]
        );
    }

    #[test]
    fn initialize_failure_is_fatal() {
        let (controller, backend) = controller();
        backend.fail_on(GpioOp::Configure);

        let err = controller.initialize().unwrap_err();
        assert!(matches!(err, AppError::HardwareInit(_)));
        assert_eq!(controller.phase(), Phase::Created);
        assert!(matches!(controller.toggle(1), Err(AppError::Unavailable(_))));
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let (controller, _) = ready();
        assert!(matches!(
            controller.initialize(),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn first_toggle_claims_pin_and_energizes() {
        let (controller, backend) = ready();

        assert_eq!(controller.toggle(1).unwrap(), view(1, "Luz 1", true));
        assert_eq!(
            backend.calls(),
            vec![GpioCall::Configure(
                pin(21),
                PinMode::Output { initial: false }
            )]
        );
        let state = controller.registry().find_by_id(1).unwrap().state();
        assert!(state.claimed && state.active);
        assert_eq!(backend.level(&pin(21)), Some(false));
    }

    #[test]
    fn later_toggles_only_write() {
        let (controller, backend) = ready();
        controller.toggle(1).unwrap();
        backend.clear_calls();

        assert_eq!(controller.toggle(1).unwrap(), view(1, "Luz 1", false));
        assert_eq!(controller.toggle(1).unwrap(), view(1, "Luz 1", true));
        assert_eq!(
            backend.calls(),
            vec![
                GpioCall::Write(pin(21), true),
                GpioCall::Write(pin(21), false),
            ]
        );
    }

    #[test]
    fn unknown_id_touches_nothing() {
        let (controller, backend) = ready();
        let before = controller.list();

        assert!(matches!(controller.toggle(3), Err(AppError::NotFound(3))));
        assert!(backend.calls().is_empty());
        assert_eq!(controller.list(), before);
    }

    #[test]
    fn failed_claim_keeps_state() {
        let (controller, backend) = ready();
        backend.fail_on(GpioOp::Configure);

        assert!(matches!(controller.toggle(1), Err(AppError::Hardware(_))));
        assert_eq!(
            controller.registry().find_by_id(1).unwrap().state(),
            DeviceState::default()
        );

        backend.clear_failures();
        assert_eq!(controller.toggle(1).unwrap(), view(1, "Luz 1", true));
    }

    #[test]
    fn failed_write_keeps_state() {
        let (controller, backend) = ready();
        controller.toggle(2).unwrap();
        let before = controller.registry().find_by_id(2).unwrap().state();
        backend.fail_on(GpioOp::Write);

        assert!(matches!(controller.toggle(2), Err(AppError::Hardware(_))));
        assert_eq!(controller.registry().find_by_id(2).unwrap().state(), before);
        assert_eq!(backend.level(&pin(19)), Some(false));
    }

    #[test]
    fn devices_toggle_independently() {
        let (controller, _) = ready();
        controller.toggle(1).unwrap();
        controller.toggle(2).unwrap();
        controller.toggle(2).unwrap();

        assert_eq!(
            controller.list(),
            vec![view(1, "Luz 1", true), view(2, "Luz 2", false)]
        );
    }

    #[test]
    fn pin_level_follows_relay_polarity() {
        let (controller, _) = ready();
        assert_eq!(controller.pin_level(1).unwrap(), None);

        controller.toggle(1).unwrap();
        assert_eq!(controller.pin_level(1).unwrap(), Some(false));
        controller.toggle(1).unwrap();
        assert_eq!(controller.pin_level(1).unwrap(), Some(true));
    }

    #[test]
    fn shutdown_releases_and_rejects_toggles() {
        let (controller, backend) = ready();
        controller.toggle(1).unwrap();
        backend.clear_calls();

        controller.shutdown().unwrap();
        assert_eq!(backend.calls(), vec![GpioCall::ReleaseAll]);
        assert!(matches!(controller.toggle(1), Err(AppError::Unavailable(_))));

        controller.shutdown().unwrap();
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn shutdown_failure_is_reported_once() {
        let (controller, backend) = ready();
        backend.fail_on(GpioOp::Release);

        assert!(matches!(controller.shutdown(), Err(AppError::Shutdown(_))));
        assert_eq!(controller.phase(), Phase::Stopped);
        assert!(controller.shutdown().is_ok());
    }

    #[test]
    fn concurrent_toggles_on_one_device_serialize() {
        let (controller, backend) = ready();
        let controller = Arc::new(controller);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let controller = controller.clone();
                std::thread::spawn(move || controller.toggle(1).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let calls = backend.calls();
        assert_eq!(calls.len(), 8);
        assert!(matches!(calls[0], GpioCall::Configure(_, _)));
        // claim energizes, then seven flips leave it released
        assert_eq!(controller.get(1).unwrap(), view(1, "Luz 1", false));
    }
}
