// Tracking phases and the per-day progress record used by the day tracker.

use chrono::NaiveDate;

/// - AwaitingSunrise: before sunrise, nothing moves
/// - TrackingWest: daylight, one step west per tick
/// - HoldingAtWesternLimit: step budget spent before sunset, hold position
/// - LingeringAfterSunset: sun is down but the linger period is running
/// - ReturningEast: linger over, driving the array back east
/// - IdleAtEasternLimit: parked east until tomorrow
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum TrackingPhase {
    AwaitingSunrise,
    TrackingWest,
    HoldingAtWesternLimit,
    LingeringAfterSunset,
    ReturningEast,
    IdleAtEasternLimit,
}

/// What the tracker believes about the array today.
///
/// `at_eastern_limit` and `at_western_limit` are never both set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingState {
    pub steps_done: u32,
    pub at_eastern_limit: bool,
    pub at_western_limit: bool,
    pub current_day: Option<NaiveDate>,
}

impl TrackingState {
    /// State at the start of a normal day: parked east, nothing stepped
    pub fn start_of_day(day: NaiveDate) -> TrackingState {
        TrackingState {
            steps_done: 0,
            at_eastern_limit: true,
            at_western_limit: false,
            current_day: Some(day),
        }
    }

    /// Freshly started process: the array could be anywhere, so the first
    /// step of the day homes east before moving
    pub fn unhomed() -> TrackingState {
        TrackingState {
            steps_done: 0,
            at_eastern_limit: false,
            at_western_limit: false,
            current_day: None,
        }
    }

    /// Resets the day's progress. The eastern-limit flag survives only if
    /// the array was actually parked there.
    pub fn roll_over(&mut self, day: NaiveDate) {
        let parked_east = self.at_eastern_limit;
        *self = TrackingState::start_of_day(day);
        self.at_eastern_limit = parked_east;
    }

    pub fn record_step(&mut self) {
        self.steps_done += 1;
        self.at_eastern_limit = false;
    }

    pub fn record_eastern_limit(&mut self) {
        self.at_eastern_limit = true;
        self.at_western_limit = false;
    }

    pub fn record_western_limit(&mut self) {
        self.at_western_limit = true;
        self.at_eastern_limit = false;
    }
}
