use std::time::Duration;

use clock::DayWindow;

use crate::error::SchedulingError;
use crate::panels::PanelRegistry;

/// Spreads the day's steps evenly between sunrise and sunset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepScheduler {
    step_count: u32,
}

impl StepScheduler {
    pub fn new(registry: &PanelRegistry) -> StepScheduler {
        StepScheduler {
            step_count: registry.step_count_for_day(),
        }
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    /// Time between ticks so that `step_count` steps exactly fill the daylight
    pub fn tick_interval(&self, window: &DayWindow) -> Result<Duration, SchedulingError> {
        let degenerate = || SchedulingError::DegenerateDay {
            sunrise: window.sunrise.to_rfc3339(),
            sunset: window.sunset.to_rfc3339(),
        };
        if window.sunset <= window.sunrise {
            return Err(degenerate());
        }
        let daylight = window.daylight().to_std().map_err(|_| degenerate())?;
        Ok(daylight / self.step_count.max(1))
    }
}
