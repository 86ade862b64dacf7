pub mod clock {
    use chrono::{DateTime, Datelike, FixedOffset, Utc};
    use embedded_hal::delay::DelayNs;
    use std::thread;
    use std::time::Duration;

    /// Anything earlier is an unsynchronised clock counting from the epoch
    pub const EARLIEST_VALID_YEAR: i32 = 2024;

    /// Source of the current wall-clock time in the tracker's local offset.
    pub trait Clock {
        fn now(&self) -> DateTime<FixedOffset>;

        /// Whether the time is plausible enough to compute a sun window from
        fn is_set(&self) -> bool {
            self.now().year() >= EARLIEST_VALID_YEAR
        }
    }

    /// System time shifted to a fixed UTC offset
    #[derive(Debug, Clone, Copy)]
    pub struct SystemClock {
        offset: FixedOffset,
    }

    impl SystemClock {
        /// Returns `None` when the offset is outside +/- 24 hours
        pub fn new(timezone_offset_hours: i32) -> Option<SystemClock> {
            FixedOffset::east_opt(timezone_offset_hours * 3600).map(|offset| SystemClock { offset })
        }
    }

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<FixedOffset> {
            Utc::now().with_timezone(&self.offset)
        }
    }

    /// Blocking delay backed by `std::thread::sleep`.
    ///
    /// Works on the host and on ESP-IDF, where std threads map onto FreeRTOS tasks.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SystemDelay;

    impl DelayNs for SystemDelay {
        fn delay_ns(&mut self, ns: u32) {
            thread::sleep(Duration::from_nanos(ns.into()));
        }

        fn delay_us(&mut self, us: u32) {
            thread::sleep(Duration::from_micros(us.into()));
        }

        fn delay_ms(&mut self, ms: u32) {
            thread::sleep(Duration::from_millis(ms.into()));
        }
    }

}

pub mod sun;

pub use clock::{Clock, SystemClock, SystemDelay};
pub use sun::{DayWindow, Location, SolarCalculator, SunWindowProvider};
