//! Open-loop sun tracking for a bank of linear-actuator panels.
//!
//! Panels are moved west in small timed relay pulses between sunrise and
//! sunset and driven back to their eastern limit after dark. There is no
//! position feedback: progress is dead-reckoned from pulse counts.

pub mod driver;
pub mod error;
pub mod panels;
pub mod relay;
pub mod scheduler;
pub mod states;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use driver::ActuatorDriver;
pub use error::{ConfigurationError, HardwareIoError, SchedulingError};
pub use panels::{Direction, Panel, PanelConfig, PanelRegistry};
pub use relay::{Energized, PinId, RelayBank, RelayOutput};
pub use scheduler::StepScheduler;
pub use states::{TrackingPhase, TrackingState};
pub use tracker::{decide, Action, DayTracker, TickReport, TrackerSettings};
