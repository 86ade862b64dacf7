use embedded_hal::digital::{Error as _, OutputPin, PinState};

use crate::error::HardwareIoError;

/// Logical relay pin number (GPIO number on the controller board)
pub type PinId = u8;

/// Relay bank seen by the actuator driver.
///
/// `active` means the actuator coil is energized, whatever the electrical
/// polarity. Writes must be idempotent.
pub trait RelayOutput {
    fn set_level(&mut self, pin: PinId, active: bool) -> Result<(), HardwareIoError>;

    /// Deassert every pin this output owns
    fn release_all(&mut self) -> Result<(), HardwareIoError>;
}

/// Keeps one relay energized until released or dropped.
///
/// Dropping the guard without calling [`Energized::release`] (early return,
/// unwinding) still deasserts the pin.
pub struct Energized<'a, R: RelayOutput + ?Sized> {
    relays: &'a mut R,
    pin: PinId,
    released: bool,
}

impl<'a, R: RelayOutput + ?Sized> Energized<'a, R> {
    pub fn acquire(relays: &'a mut R, pin: PinId) -> Result<Self, HardwareIoError> {
        let mut guard = Energized {
            relays,
            pin,
            released: false,
        };
        // A failed assert still runs the guard's release on drop
        guard.relays.set_level(pin, true)?;
        Ok(guard)
    }

    pub fn release(mut self) -> Result<(), HardwareIoError> {
        self.released = true;
        self.relays.set_level(self.pin, false)
    }
}

impl<R: RelayOutput + ?Sized> Drop for Energized<'_, R> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.relays.set_level(self.pin, false) {
            log::error!("Failed to release relay {}: {}", self.pin, e);
        }
    }
}

/// Relays wired to `embedded-hal` output pins.
///
/// Every pin is driven inactive on construction and again on drop.
pub struct RelayBank<P: OutputPin> {
    pins: Vec<(PinId, P)>,
    active_low: bool,
}

impl<P: OutputPin> RelayBank<P> {
    pub fn new(
        pins: impl IntoIterator<Item = (PinId, P)>,
        active_low: bool,
    ) -> Result<Self, HardwareIoError> {
        let mut bank = RelayBank {
            pins: pins.into_iter().collect(),
            active_low,
        };
        log::info!("Initialising {} relay pins", bank.pins.len());
        bank.release_all()?;
        Ok(bank)
    }

    pub fn active_low(&self) -> bool {
        self.active_low
    }

    fn pin_state(&self, active: bool) -> PinState {
        // Active-low relay boards energize on a low level
        PinState::from(active != self.active_low)
    }

    fn write(&mut self, pin: PinId, active: bool) -> Result<(), HardwareIoError> {
        let state = self.pin_state(active);
        let (_, driver) = self
            .pins
            .iter_mut()
            .find(|(id, _)| *id == pin)
            .ok_or_else(|| HardwareIoError {
                pin,
                detail: "pin is not part of the relay bank".to_string(),
            })?;
        driver.set_state(state).map_err(|e| HardwareIoError {
            pin,
            detail: format!("{:?}", e.kind()),
        })
    }
}

impl<P: OutputPin> RelayOutput for RelayBank<P> {
    fn set_level(&mut self, pin: PinId, active: bool) -> Result<(), HardwareIoError> {
        log::debug!(
            "Relay {} {}",
            pin,
            if active { "energized" } else { "released" }
        );
        self.write(pin, active)
    }

    fn release_all(&mut self) -> Result<(), HardwareIoError> {
        let ids: Vec<PinId> = self.pins.iter().map(|(id, _)| *id).collect();
        let mut first_error = None;
        for pin in ids {
            if let Err(e) = self.write(pin, false) {
                log::error!("Failed to release relay {}: {}", pin, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<P: OutputPin> Drop for RelayBank<P> {
    fn drop(&mut self) {
        if let Err(e) = self.release_all() {
            log::warn!("Relay bank dropped with a pin still unreleased: {}", e);
        }
    }
}
