use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use clock::{Clock, DayWindow, SunWindowProvider};
use embedded_hal::delay::DelayNs;
use log::*;

use crate::driver::ActuatorDriver;
use crate::error::{ConfigurationError, HardwareIoError, SchedulingError};
use crate::panels::{Direction, PanelRegistry};
use crate::relay::RelayOutput;
use crate::scheduler::StepScheduler;
use crate::states::{TrackingPhase, TrackingState};

// How often a sleeping loop checks for a stop request
const STOP_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Wait after sunset before returning east
    pub sunset_linger: Duration,
    /// Poll interval while the current day is abandoned
    pub idle_poll: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        TrackerSettings {
            sunset_linger: Duration::from_secs(2 * 60 * 60),
            idle_poll: Duration::from_secs(15 * 60),
        }
    }
}

/// What a tick does to the array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Rest,
    /// One step west, after homing east first if the position is unknown
    StepWest { home_first: bool },
    /// Step budget spent before sunset
    MarkWesternLimit,
    ReturnEast,
}

/// Transition rule: the phase `now` falls in and the action it calls for.
pub fn decide(
    now: DateTime<FixedOffset>,
    window: &DayWindow,
    sunset_linger: chrono::Duration,
    state: &TrackingState,
    step_count: u32,
) -> (TrackingPhase, Action) {
    if now < window.sunrise {
        (TrackingPhase::AwaitingSunrise, Action::Rest)
    } else if now < window.sunset {
        if state.at_western_limit {
            (TrackingPhase::HoldingAtWesternLimit, Action::Rest)
        } else if state.steps_done < step_count {
            let home_first = state.steps_done == 0 && !state.at_eastern_limit;
            (TrackingPhase::TrackingWest, Action::StepWest { home_first })
        } else {
            (TrackingPhase::HoldingAtWesternLimit, Action::MarkWesternLimit)
        }
    } else if now < window.sunset + sunset_linger {
        (TrackingPhase::LingeringAfterSunset, Action::Rest)
    } else if !state.at_eastern_limit {
        (TrackingPhase::ReturningEast, Action::ReturnEast)
    } else {
        (TrackingPhase::IdleAtEasternLimit, Action::Rest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// `None` while the day is abandoned
    pub phase: Option<TrackingPhase>,
    pub action: Action,
    /// How long to sleep before the next tick
    pub sleep: Duration,
}

#[derive(Debug, Clone)]
enum DayPlan {
    Scheduled { window: DayWindow, tick: Duration },
    Abandoned(SchedulingError),
}

/// Daily sun tracking loop.
///
/// Each tick reads the clock, re-plans on a new calendar date, decides the
/// phase and drives the relays. Recorded progress only advances after a
/// pulse sequence completes, so a relay failure leaves it matching the
/// last known physical position.
pub struct DayTracker<R, D, P, C> {
    registry: PanelRegistry,
    scheduler: StepScheduler,
    driver: ActuatorDriver<R, D>,
    provider: P,
    clock: C,
    settings: TrackerSettings,
    sunset_linger: chrono::Duration,
    state: TrackingState,
    plan: Option<DayPlan>,
    phase: Option<TrackingPhase>,
}

impl<R, D, P, C> DayTracker<R, D, P, C>
where
    R: RelayOutput,
    D: DelayNs,
    P: SunWindowProvider,
    C: Clock,
{
    pub fn new(
        registry: PanelRegistry,
        driver: ActuatorDriver<R, D>,
        provider: P,
        clock: C,
        settings: TrackerSettings,
    ) -> Result<Self, ConfigurationError> {
        let sunset_linger = chrono::Duration::from_std(settings.sunset_linger)
            .map_err(|_| ConfigurationError::LingerOutOfRange(settings.sunset_linger))?;
        if settings.idle_poll.is_zero() {
            return Err(ConfigurationError::ZeroIdlePoll);
        }

        Ok(DayTracker {
            scheduler: StepScheduler::new(&registry),
            registry,
            driver,
            provider,
            clock,
            settings,
            sunset_linger,
            state: TrackingState::unhomed(),
            plan: None,
            phase: None,
        })
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    pub fn phase(&self) -> Option<TrackingPhase> {
        self.phase
    }

    pub fn registry(&self) -> &PanelRegistry {
        &self.registry
    }

    pub fn day_window(&self) -> Option<&DayWindow> {
        match &self.plan {
            Some(DayPlan::Scheduled { window, .. }) => Some(window),
            _ => None,
        }
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        match &self.plan {
            Some(DayPlan::Scheduled { tick, .. }) => Some(*tick),
            _ => None,
        }
    }

    /// Evaluates the current time once and performs at most one action
    pub fn tick(&mut self) -> Result<TickReport, HardwareIoError> {
        let now = self.clock.now();
        let plan = match &self.plan {
            Some(plan) if self.state.current_day == Some(now.date_naive()) => plan.clone(),
            _ => self.start_day(now),
        };

        let (window, tick) = match plan {
            DayPlan::Scheduled { window, tick } => (window, tick),
            DayPlan::Abandoned(e) => {
                debug!("Day abandoned ({}), sleeping {:?}", e, self.settings.idle_poll);
                self.phase = None;
                return Ok(TickReport {
                    phase: None,
                    action: Action::Rest,
                    sleep: self.settings.idle_poll,
                });
            }
        };

        let (phase, action) = decide(
            now,
            &window,
            self.sunset_linger,
            &self.state,
            self.scheduler.step_count(),
        );
        if self.phase != Some(phase) {
            info!("Tracking phase {:?} -> {:?}", self.phase, phase);
            self.phase = Some(phase);
        }

        self.apply(phase, action, tick)?;

        Ok(TickReport {
            phase: Some(phase),
            action,
            sleep: tick,
        })
    }

    fn start_day(&mut self, now: DateTime<FixedOffset>) -> DayPlan {
        let today = now.date_naive();
        info!("Entering new loop for {}", today);
        self.state.roll_over(today);

        let plan = match self.plan_day(now) {
            Ok((window, tick)) => {
                info!(
                    "Sunrise {}, solar noon {}, sunset {}",
                    window.sunrise.format("%H:%M:%S"),
                    window.solar_noon.format("%H:%M:%S"),
                    window.sunset.format("%H:%M:%S")
                );
                info!(
                    "{} steps today, one every {:.0}s",
                    self.scheduler.step_count(),
                    tick.as_secs_f64()
                );
                DayPlan::Scheduled { window, tick }
            }
            Err(e) => {
                warn!("Abandoning tracking for {}: {}", today, e);
                DayPlan::Abandoned(e)
            }
        };
        self.plan = Some(plan.clone());
        plan
    }

    fn plan_day(
        &mut self,
        now: DateTime<FixedOffset>,
    ) -> Result<(DayWindow, Duration), SchedulingError> {
        let window = self
            .provider
            .today_window(now)
            .ok_or_else(|| SchedulingError::NoSunWindow(now.date_naive().to_string()))?;
        let tick = self.scheduler.tick_interval(&window)?;
        Ok((window, tick))
    }

    fn apply(
        &mut self,
        phase: TrackingPhase,
        action: Action,
        tick: Duration,
    ) -> Result<(), HardwareIoError> {
        match action {
            Action::StepWest { home_first } => {
                if home_first {
                    info!("Array position unknown, driving to the eastern limit first");
                    self.driver.goto_limit(&self.registry, Direction::East)?;
                    self.state.record_eastern_limit();
                }
                self.driver.step_west(&self.registry)?;
                self.state.record_step();

                let step_count = self.scheduler.step_count();
                info!("Steps done today: {}/{}", self.state.steps_done, step_count);
                let progress = self.state.steps_done as f64 / step_count as f64;
                for panel in &self.registry {
                    info!(
                        "Panel {} estimated at {:.1} degrees",
                        panel.id(),
                        panel.estimated_angle(progress)
                    );
                }
            }
            Action::MarkWesternLimit => {
                self.state.record_western_limit();
                info!(
                    "Steps ({}) have reached today's count ({}), staying here until past sunset",
                    self.state.steps_done,
                    self.scheduler.step_count()
                );
            }
            Action::ReturnEast => {
                info!(
                    "Now {:.1} hours past sunset, readying for the next day by driving panels east",
                    self.settings.sunset_linger.as_secs_f64() / 3600.0
                );
                self.driver.goto_limit(&self.registry, Direction::East)?;
                self.state.record_eastern_limit();
            }
            Action::Rest => match phase {
                TrackingPhase::AwaitingSunrise => {
                    info!("It is too early, going back to sleep for {:.0}s", tick.as_secs_f64())
                }
                TrackingPhase::LingeringAfterSunset => info!(
                    "Waiting until {:.1} hours past sunset before driving panels east",
                    self.settings.sunset_linger.as_secs_f64() / 3600.0
                ),
                TrackingPhase::IdleAtEasternLimit => info!(
                    "Past sunset and ready for the morning, sleeping for {:.0}s",
                    tick.as_secs_f64()
                ),
                _ => debug!("Holding position"),
            },
        }
        Ok(())
    }

    /// Ticks until `stop` is set.
    ///
    /// A relay failure is logged, every relay is released, and the loop
    /// carries on with the next tick. A pulse in progress always completes
    /// before `stop` is noticed.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!(
            "Tracking {} panels, {} steps per day",
            self.registry.len(),
            self.scheduler.step_count()
        );
        while !stop.load(Ordering::Relaxed) {
            let sleep = match self.tick() {
                Ok(report) => report.sleep,
                Err(e) => {
                    error!("Relay failure, recorded state left unchanged: {}", e);
                    if let Err(e) = self.driver.release_all() {
                        error!("Failed to release relays after failure: {}", e);
                    }
                    self.tick_interval().unwrap_or(self.settings.idle_poll)
                }
            };
            self.rest(sleep, stop);
        }
        info!("Stop requested, leaving the tracking loop");
    }

    fn rest(&mut self, duration: Duration, stop: &AtomicBool) {
        let mut remaining = duration;
        while !remaining.is_zero() && !stop.load(Ordering::Relaxed) {
            let slice = remaining.min(STOP_POLL);
            self.driver.wait(slice);
            remaining -= slice;
        }
    }

    /// Deasserts every relay
    pub fn shutdown(&mut self) -> Result<(), HardwareIoError> {
        info!("Releasing all relays");
        self.driver.release_all()
    }
}
