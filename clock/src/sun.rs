use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone};
use solar_positioning::spa;
use solar_positioning::time::DeltaT;
use solar_positioning::types::{Horizon, RefractionCorrection, SunriseResult};

// Mean apparent radius of the solar disc, in degrees
const SUN_SEMIDIAMETER_DEG: f64 = 0.2666;

/// Observer position and the sun elevation treated as "the horizon".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above sea level
    pub altitude: f64,
    /// Apparent elevation the sun's upper limb must clear before it counts as risen, in degrees
    pub horizon_deg: f64,
}

/// Sunrise, solar noon and sunset for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub sunrise: DateTime<FixedOffset>,
    pub solar_noon: DateTime<FixedOffset>,
    pub sunset: DateTime<FixedOffset>,
}

impl DayWindow {
    pub fn daylight(&self) -> chrono::Duration {
        self.sunset - self.sunrise
    }
}

/// Yields the sun window for the calendar day containing `now`.
///
/// Implementations may be expensive; callers query once per day.
/// `None` means the sun never crosses the horizon threshold that day.
pub trait SunWindowProvider {
    fn today_window(&mut self, now: DateTime<FixedOffset>) -> Option<DayWindow>;
}

/// Sun window from the SPA algorithm at a fixed location.
///
/// The threshold is an apparent upper-limb elevation, so the geometric
/// target for the sun's centre is lowered by the semidiameter and by the
/// standard-atmosphere refraction at that elevation.
#[derive(Debug, Clone, Copy)]
pub struct SolarCalculator {
    location: Location,
}

impl SolarCalculator {
    pub fn new(location: Location) -> SolarCalculator {
        SolarCalculator { location }
    }

    /// Computes the window for `date`, expressed in `offset`
    pub fn window_for(&self, date: NaiveDate, offset: FixedOffset) -> Option<DayWindow> {
        // Local noon keeps the UTC date equal to the local one
        let noon = offset
            .from_local_datetime(&date.and_hms_opt(12, 0, 0)?)
            .single()?;
        let delta_t = DeltaT::estimate_from_date(date.year(), date.month()).ok()?;

        let limb_target = self.location.horizon_deg - SUN_SEMIDIAMETER_DEG;
        let first_rise = match self.events(noon, delta_t, limb_target)? {
            SunriseResult::RegularDay { sunrise, .. } => sunrise,
            _ => return None,
        };
        let refraction = self.refraction_at(first_rise, delta_t)?;

        match self.events(noon, delta_t, limb_target - refraction)? {
            SunriseResult::RegularDay {
                sunrise,
                transit,
                sunset,
            } => Some(DayWindow {
                sunrise,
                solar_noon: transit,
                sunset,
            }),
            _ => None,
        }
    }

    fn events(
        &self,
        noon: DateTime<FixedOffset>,
        delta_t: f64,
        target_deg: f64,
    ) -> Option<SunriseResult<DateTime<FixedOffset>>> {
        spa::sunrise_sunset_for_horizon(
            noon,
            self.location.latitude,
            self.location.longitude,
            delta_t,
            Horizon::Custom(target_deg),
        )
        .ok()
    }

    /// Apparent minus geometric elevation of the sun at `at`
    fn refraction_at(&self, at: DateTime<FixedOffset>, delta_t: f64) -> Option<f64> {
        let position = |refraction| {
            spa::solar_position(
                at,
                self.location.latitude,
                self.location.longitude,
                self.location.altitude,
                delta_t,
                refraction,
            )
            .ok()
        };
        let apparent = position(Some(RefractionCorrection::standard()))?;
        let geometric = position(None)?;
        Some(apparent.elevation_angle() - geometric.elevation_angle())
    }
}

impl SunWindowProvider for SolarCalculator {
    fn today_window(&mut self, now: DateTime<FixedOffset>) -> Option<DayWindow> {
        self.window_for(now.date_naive(), *now.offset())
    }
}
