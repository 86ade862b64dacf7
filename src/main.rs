use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clock::{Clock, SolarCalculator, SystemClock, SystemDelay};
use log::*;
use motion::{ActuatorDriver, DayTracker, PanelRegistry, RelayBank};

mod board;
mod config;

use config::Config;

const CLOCK_POLL: Duration = Duration::from_secs(1);
// Polls between repeated "clock not set" warnings
const CLOCK_WARN_EVERY: u32 = 30;

fn main() -> anyhow::Result<()> {
    board::init_logging();

    let config = Config::load()?;
    let stop = Arc::new(AtomicBool::new(false));
    board::on_stop(stop.clone()).context("Failed to install stop handler")?;

    let registry = PanelRegistry::new(&config.panels, config.tracking.reference_cadence()?)
        .context("Invalid panel configuration")?;
    info!(
        "{} panels, {} steps per day, shortest throw {:?}",
        registry.len(),
        registry.step_count_for_day(),
        registry.shortest_throw()
    );

    let pins = board::relay_pins(registry.pins()).context("Failed to claim relay pins")?;
    let relays =
        RelayBank::new(pins, config.relays.active_low).context("Failed to initialise relays")?;
    info!(
        "Relays energize on a {} level",
        if relays.active_low() { "low" } else { "high" }
    );

    let offset = config.location.timezone_offset_hours;
    let clock = SystemClock::new(offset)
        .with_context(|| format!("Invalid timezone offset {} hours", offset))?;
    let _time_source =
        board::start_time_sync(config.wifi.as_ref()).context("Failed to start time sync")?;
    if !wait_for_clock(&clock, &stop) {
        info!("Stopped before the clock was set");
        return Ok(());
    }
    info!("Local time {}", clock.now().format("%d/%m/%Y %H:%M:%S"));

    let driver = ActuatorDriver::new(relays, SystemDelay).with_settle(config.tracking.settle()?);
    let sun = SolarCalculator::new(config.site());
    let mut tracker = DayTracker::new(
        registry,
        driver,
        sun,
        clock,
        config.tracking.tracker_settings()?,
    )
    .context("Invalid tracking settings")?;

    tracker.run(&stop);
    tracker.shutdown().context("Failed to release relays on exit")?;
    info!("Tracker stopped");
    Ok(())
}

/// Blocks until the clock reports a plausible date. Returns `false` if `stop` was raised first.
fn wait_for_clock<C: Clock>(clock: &C, stop: &AtomicBool) -> bool {
    let mut polls = 0u32;
    while !clock.is_set() {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        if polls % CLOCK_WARN_EVERY == 0 {
            warn!(
                "Clock reads {}, waiting for time sync before tracking",
                clock.now().format("%d/%m/%Y %H:%M:%S")
            );
        }
        thread::sleep(CLOCK_POLL);
        polls = polls.wrapping_add(1);
    }
    info!("Time Sync Completed");
    true
}
