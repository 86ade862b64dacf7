use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone};
use clock::{Clock, DayWindow, SunWindowProvider};
use embedded_hal::delay::DelayNs;
use motion::{
    ActuatorDriver, DayTracker, HardwareIoError, PanelConfig, PanelRegistry, PinId, RelayOutput,
    TrackerSettings, TrackingPhase,
};

fn at(d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(10 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 6, d, h, mi, 0)
        .unwrap()
}

/// Wall clock that only moves when someone sleeps on it
#[derive(Clone)]
struct SimTime {
    now: Rc<Cell<DateTime<FixedOffset>>>,
}

impl Clock for SimTime {
    fn now(&self) -> DateTime<FixedOffset> {
        self.now.get()
    }
}

/// Advances the simulated clock and raises `stop` once `until` is reached
struct SimDelay {
    time: SimTime,
    until: DateTime<FixedOffset>,
    stop: Rc<AtomicBool>,
}

impl SimDelay {
    fn advance(&mut self, by: Duration) {
        let now = self.time.now.get() + chrono::Duration::from_std(by).unwrap();
        self.time.now.set(now);
        if now >= self.until {
            self.stop.store(true, Ordering::Relaxed);
        }
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(Duration::from_nanos(ns.into()));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(Duration::from_millis(ms.into()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Write {
    at: DateTime<FixedOffset>,
    pin: PinId,
    active: bool,
}

/// A relay that refuses to energize until a given time
#[derive(Debug, Clone, Copy)]
struct Fault {
    pin: PinId,
    until: DateTime<FixedOffset>,
}

#[derive(Clone)]
struct Recorder {
    time: SimTime,
    writes: Rc<RefCell<Vec<Write>>>,
    releases: Rc<RefCell<Vec<DateTime<FixedOffset>>>>,
    fault: Option<Fault>,
}

impl RelayOutput for Recorder {
    fn set_level(&mut self, pin: PinId, active: bool) -> Result<(), HardwareIoError> {
        let now = self.time.now();
        self.writes.borrow_mut().push(Write { at: now, pin, active });
        match self.fault {
            Some(fault) if active && fault.pin == pin && now < fault.until => Err(HardwareIoError {
                pin,
                detail: "coil open".to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn release_all(&mut self) -> Result<(), HardwareIoError> {
        self.releases.borrow_mut().push(self.time.now());
        Ok(())
    }
}

impl Recorder {
    fn energized(&self, pin: PinId) -> Vec<DateTime<FixedOffset>> {
        self.writes
            .borrow()
            .iter()
            .filter(|w| w.pin == pin && w.active)
            .map(|w| w.at)
            .collect()
    }
}

/// Sun up 06:00 to 18:00 every day
struct FixedSun;

impl SunWindowProvider for FixedSun {
    fn today_window(&mut self, now: DateTime<FixedOffset>) -> Option<DayWindow> {
        let offset = *now.offset();
        let date = now.date_naive();
        let local = |h| offset.from_local_datetime(&date.and_hms_opt(h, 0, 0)?).single();
        Some(DayWindow {
            sunrise: local(6)?,
            solar_noon: local(12)?,
            sunset: local(18)?,
        })
    }
}

fn site_panels() -> Vec<PanelConfig> {
    let panel = |id, east_pin, west_pin, throw_secs| PanelConfig {
        id,
        east_pin,
        west_pin,
        throw_secs,
        east_limit_angle: -60.0,
        west_limit_angle: 60.0,
    };
    vec![
        panel(1, 2, 3, 60.0),
        panel(2, 27, 22, 120.0),
        panel(3, 4, 17, 120.0),
    ]
}

struct Run {
    tracker: DayTracker<Recorder, SimDelay, FixedSun, SimTime>,
    relays: Recorder,
}

fn simulate(start: DateTime<FixedOffset>, until: DateTime<FixedOffset>) -> Run {
    simulate_with_fault(start, until, None)
}

fn simulate_with_fault(
    start: DateTime<FixedOffset>,
    until: DateTime<FixedOffset>,
    fault: Option<Fault>,
) -> Run {
    let _ = env_logger::builder().is_test(true).try_init();

    let time = SimTime {
        now: Rc::new(Cell::new(start)),
    };
    let stop = Rc::new(AtomicBool::new(false));
    let relays = Recorder {
        time: time.clone(),
        writes: Rc::default(),
        releases: Rc::default(),
        fault,
    };
    let delay = SimDelay {
        time: time.clone(),
        until,
        stop: stop.clone(),
    };

    let registry = PanelRegistry::new(&site_panels(), Duration::from_millis(2250)).unwrap();
    let driver = ActuatorDriver::new(relays.clone(), delay);
    let mut tracker = DayTracker::new(
        registry,
        driver,
        FixedSun,
        time,
        TrackerSettings::default(),
    )
    .unwrap();

    tracker.run(&stop);
    Run { tracker, relays }
}

fn assert_one_relay_at_a_time(writes: &[Write]) {
    let mut held: Option<PinId> = None;
    for w in writes {
        match (w.active, held) {
            (true, None) => held = Some(w.pin),
            (false, Some(pin)) if pin == w.pin => held = None,
            _ => panic!("relay write {:?} while holding {:?}", w, held),
        }
    }
    assert_eq!(held, None);
}

#[test]
fn tracks_a_whole_day_and_parks_east() {
    let run = simulate(at(1, 6, 0), at(1, 23, 0));
    let state = run.tracker.state();

    assert_eq!(run.tracker.registry().step_count_for_day(), 26);
    assert_eq!(state.steps_done, 26);
    assert!(state.at_eastern_limit);
    assert!(!state.at_western_limit);
    assert_eq!(run.tracker.phase(), Some(TrackingPhase::IdleAtEasternLimit));

    // Every panel takes the same number of west steps, all in daylight
    for west_pin in [3, 22, 17] {
        let steps = run.relays.energized(west_pin);
        assert_eq!(steps.len(), 26, "west pin {}", west_pin);
        assert!(steps.iter().all(|t| *t >= at(1, 6, 0) && *t < at(1, 18, 0)));
    }

    // Homed once at the start, returned once after the linger
    let east = run.relays.energized(2);
    assert_eq!(east.len(), 2);
    assert_eq!(east[0], at(1, 6, 0));
    assert!(east[1] >= at(1, 20, 0));

    assert_one_relay_at_a_time(&run.relays.writes.borrow());
}

#[test]
fn nothing_moves_before_sunrise() {
    let run = simulate(at(1, 0, 30), at(1, 5, 59));

    assert!(run.relays.writes.borrow().is_empty());
    assert_eq!(run.tracker.phase(), Some(TrackingPhase::AwaitingSunrise));
    assert_eq!(run.tracker.state().steps_done, 0);
}

#[test]
fn second_day_starts_from_the_parked_position() {
    let run = simulate(at(1, 6, 0), at(2, 12, 0));
    let state = run.tracker.state();

    assert_eq!(state.current_day, Some(at(2, 0, 0).date_naive()));
    assert!(state.steps_done > 0 && state.steps_done < 26);

    // No homing pulse on day two: the array was parked east overnight
    let east = run.relays.energized(2);
    assert_eq!(east.len(), 2);
    assert!(east.iter().all(|t| *t < at(2, 0, 0)));

    let day_two_steps = run
        .relays
        .energized(3)
        .into_iter()
        .filter(|t| *t >= at(2, 6, 0))
        .count();
    assert_eq!(day_two_steps as u32, state.steps_done);

    assert_one_relay_at_a_time(&run.relays.writes.borrow());
}

#[test]
fn relay_fault_is_released_and_retried_by_the_loop() {
    let fault = Fault {
        pin: 22,
        until: at(1, 7, 30),
    };
    let run = simulate_with_fault(at(1, 6, 0), at(1, 10, 0), Some(fault));
    let state = run.tracker.state();

    // Each failed tick released the whole bank
    let failed_attempts = run
        .relays
        .energized(22)
        .into_iter()
        .filter(|t| *t < fault.until)
        .count();
    assert!(failed_attempts > 0);
    assert_eq!(run.relays.releases.borrow().len(), failed_attempts);
    assert!(run.relays.releases.borrow().iter().all(|t| *t < fault.until));

    // Only completed sequences count; panel 3 moves once per recorded step
    let completed = run.relays.energized(17);
    assert!(state.steps_done > 0);
    assert_eq!(completed.len() as u32, state.steps_done);
    assert!(completed.iter().all(|t| *t >= fault.until));

    // Homing finished before the first failure, so no second homing pulse
    assert_eq!(run.relays.energized(2), vec![at(1, 6, 0)]);
    assert!(!state.at_eastern_limit);

    assert_one_relay_at_a_time(&run.relays.writes.borrow());
}
