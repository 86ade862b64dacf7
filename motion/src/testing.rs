//! Simulated clock, relay recorder and sun window stub for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use clock::{Clock, DayWindow, SunWindowProvider};
use embedded_hal::delay::DelayNs;

use crate::error::HardwareIoError;
use crate::relay::{PinId, RelayOutput};

pub fn offset() -> FixedOffset {
    FixedOffset::east_opt(10 * 3600).unwrap()
}

pub fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
    offset().with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

/// Logical time; sleeping on it advances it instantly.
#[derive(Clone)]
pub struct SimClock {
    now: Rc<Cell<DateTime<FixedOffset>>>,
}

impl SimClock {
    pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> SimClock {
        SimClock {
            now: Rc::new(Cell::new(local(y, mo, d, h, mi, s))),
        }
    }

    pub fn set(&self, t: DateTime<FixedOffset>) {
        self.now.set(t);
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap();
        self.now.set(self.now.get() + by);
    }
}

impl Clock for SimClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.now.get()
    }
}

impl DelayNs for SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(Duration::from_nanos(ns.into()));
    }

    fn delay_us(&mut self, us: u32) {
        self.advance(Duration::from_micros(us.into()));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(Duration::from_millis(ms.into()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEvent {
    Energize(PinId),
    Release(PinId),
    ReleaseAll,
}

/// Records every relay write with its simulated timestamp.
#[derive(Clone)]
pub struct RecordingRelays {
    clock: SimClock,
    log: Rc<RefCell<Vec<(DateTime<FixedOffset>, RelayEvent)>>>,
    fail_energize: Rc<RefCell<HashSet<PinId>>>,
    fail_release: Rc<RefCell<HashSet<PinId>>>,
}

impl RecordingRelays {
    pub fn new(clock: &SimClock) -> RecordingRelays {
        RecordingRelays {
            clock: clock.clone(),
            log: Rc::default(),
            fail_energize: Rc::default(),
            fail_release: Rc::default(),
        }
    }

    pub fn fail_on(&self, pin: PinId) {
        self.fail_energize.borrow_mut().insert(pin);
    }

    pub fn fail_release_on(&self, pin: PinId) {
        self.fail_release.borrow_mut().insert(pin);
    }

    pub fn heal(&self) {
        self.fail_energize.borrow_mut().clear();
        self.fail_release.borrow_mut().clear();
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.log.borrow().iter().map(|(_, e)| *e).collect()
    }

    /// (pin, time held energized) for every completed pulse
    pub fn pulses(&self) -> Vec<(PinId, Duration)> {
        let mut open: HashMap<PinId, DateTime<FixedOffset>> = HashMap::new();
        let mut pulses = Vec::new();
        for (at, event) in self.log.borrow().iter() {
            match event {
                RelayEvent::Energize(pin) => {
                    open.insert(*pin, *at);
                }
                RelayEvent::Release(pin) => {
                    if let Some(start) = open.remove(pin) {
                        pulses.push((*pin, (*at - start).to_std().unwrap()));
                    }
                }
                RelayEvent::ReleaseAll => {}
            }
        }
        pulses
    }

    fn record(&self, event: RelayEvent) {
        self.log.borrow_mut().push((self.clock.now(), event));
    }
}

impl RelayOutput for RecordingRelays {
    fn set_level(&mut self, pin: PinId, active: bool) -> Result<(), HardwareIoError> {
        let (event, failing) = if active {
            (RelayEvent::Energize(pin), &self.fail_energize)
        } else {
            (RelayEvent::Release(pin), &self.fail_release)
        };
        self.record(event);
        if failing.borrow().contains(&pin) {
            return Err(HardwareIoError {
                pin,
                detail: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn release_all(&mut self) -> Result<(), HardwareIoError> {
        self.record(RelayEvent::ReleaseAll);
        Ok(())
    }
}

/// Every energize is followed by the matching release before anything else is energized.
pub fn assert_paired(events: &[RelayEvent]) {
    let mut held: Option<PinId> = None;
    for event in events {
        match (*event, held) {
            (RelayEvent::Energize(pin), None) => held = Some(pin),
            (RelayEvent::Release(pin), Some(h)) if pin == h => held = None,
            (RelayEvent::ReleaseAll, _) => held = None,
            (e, h) => panic!("unpaired relay event {:?} while holding {:?}", e, h),
        }
    }
    assert_eq!(held, None, "relay left energized");
}

/// Fixed sun windows keyed by date; counts queries.
#[derive(Clone, Default)]
pub struct StubSun {
    windows: Rc<RefCell<HashMap<NaiveDate, DayWindow>>>,
    queries: Rc<Cell<usize>>,
}

impl StubSun {
    pub fn with_day(self, sunrise: DateTime<FixedOffset>, sunset: DateTime<FixedOffset>) -> Self {
        let solar_noon = sunrise + (sunset - sunrise) / 2;
        self.windows.borrow_mut().insert(
            sunrise.date_naive(),
            DayWindow {
                sunrise,
                solar_noon,
                sunset,
            },
        );
        self
    }

    pub fn queries(&self) -> usize {
        self.queries.get()
    }
}

impl SunWindowProvider for StubSun {
    fn today_window(&mut self, now: DateTime<FixedOffset>) -> Option<DayWindow> {
        self.queries.set(self.queries.get() + 1);
        self.windows.borrow().get(&now.date_naive()).copied()
    }
}
