use std::time::Duration;

use thiserror::Error;

use crate::relay::PinId;

/// Invalid panel set or tracking parameters. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("no panels configured")]
    NoPanels,
    #[error("panel {panel} has a non-positive throw duration ({throw_secs}s)")]
    NonPositiveThrow { panel: u32, throw_secs: f64 },
    #[error("reference cadence must be positive, got {0:?}")]
    NonPositiveCadence(Duration),
    #[error("reference cadence {cadence:?} is longer than the shortest throw {shortest:?}")]
    CadenceExceedsThrow { cadence: Duration, shortest: Duration },
    #[error("panel id {0} is configured more than once")]
    DuplicatePanel(u32),
    #[error("relay pin {0} is assigned more than once")]
    DuplicatePin(PinId),
    #[error("sunset linger {0:?} is out of range")]
    LingerOutOfRange(Duration),
    #[error("idle poll interval must be positive")]
    ZeroIdlePoll,
}

/// The day's sun window cannot be scheduled; the day is abandoned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulingError {
    #[error("sunset {sunset} is not after sunrise {sunrise}")]
    DegenerateDay { sunrise: String, sunset: String },
    #[error("the sun does not cross the horizon threshold on {0}")]
    NoSunWindow(String),
}

/// A relay write failed
#[derive(Debug, Clone, PartialEq, Error)]
#[error("relay pin {pin}: {detail}")]
pub struct HardwareIoError {
    pub pin: PinId,
    pub detail: String,
}
