use std::time::Duration;

use embedded_hal::delay::DelayNs;
use log::*;

use crate::error::HardwareIoError;
use crate::panels::{Direction, PanelRegistry};
use crate::relay::{Energized, PinId, RelayOutput};

/// Pause after releasing a relay before the next one is energized
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(250);

/// Pulses actuator relays one panel at a time.
///
/// Panels never move concurrently: the relay supply is shared, so each
/// pulse is released and allowed to settle before the next panel starts.
pub struct ActuatorDriver<R, D> {
    relays: R,
    delay: D,
    settle: Duration,
}

impl<R: RelayOutput, D: DelayNs> ActuatorDriver<R, D> {
    pub fn new(relays: R, delay: D) -> Self {
        ActuatorDriver {
            relays,
            delay,
            settle: DEFAULT_SETTLE,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Moves every panel one step west, in registry order
    pub fn step_west(&mut self, registry: &PanelRegistry) -> Result<(), HardwareIoError> {
        for panel in registry {
            info!("Moving panel {} one step west", panel.id());
            self.pulse(panel.west_pin(), panel.step_duration())?;
        }
        Ok(())
    }

    /// Drives every panel for its full throw so it ends at the limit from any position
    pub fn goto_limit(
        &mut self,
        registry: &PanelRegistry,
        direction: Direction,
    ) -> Result<(), HardwareIoError> {
        for panel in registry {
            info!("Moving panel {} to the {} limit", panel.id(), direction);
            self.pulse(panel.pin(direction), panel.throw_duration())?;
        }
        Ok(())
    }

    fn pulse(&mut self, pin: PinId, on_for: Duration) -> Result<(), HardwareIoError> {
        let energized = Energized::acquire(&mut self.relays, pin)?;
        pause(&mut self.delay, on_for);
        energized.release()?;
        pause(&mut self.delay, self.settle);
        Ok(())
    }

    /// Blocks on the driver's delay without touching any relay
    pub fn wait(&mut self, duration: Duration) {
        pause(&mut self.delay, duration);
    }

    pub fn release_all(&mut self) -> Result<(), HardwareIoError> {
        self.relays.release_all()
    }
}

/// Sleeps for `duration` with millisecond granularity plus the sub-millisecond remainder.
pub fn pause<D: DelayNs + ?Sized>(delay: &mut D, duration: Duration) {
    let mut millis = duration.as_millis();
    while millis > 0 {
        let chunk = u32::try_from(millis).unwrap_or(u32::MAX);
        delay.delay_ms(chunk);
        millis -= u128::from(chunk);
    }
    let micros = duration.subsec_micros() % 1_000;
    if micros > 0 {
        delay.delay_us(micros);
    }
}
