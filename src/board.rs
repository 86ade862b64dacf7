//! Board bindings: log backend, relay pins, time source and stop signal.

#[cfg(target_os = "espidf")]
pub use esp::*;
#[cfg(not(target_os = "espidf"))]
pub use host::*;

#[cfg(not(target_os = "espidf"))]
mod host {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use embedded_hal::digital::{ErrorType, OutputPin};
    use log::*;
    use motion::PinId;

    use crate::config::WifiConfig;

    /// Output pin that only logs its level, for running away from the board
    pub struct DryRunPin {
        pin: PinId,
        high: Option<bool>,
    }

    impl ErrorType for DryRunPin {
        type Error = Infallible;
    }

    impl OutputPin for DryRunPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.set(true);
            Ok(())
        }
    }

    impl DryRunPin {
        fn set(&mut self, high: bool) {
            if self.high != Some(high) {
                info!("[dry run] GPIO{} {}", self.pin, if high { "high" } else { "low" });
            }
            self.high = Some(high);
        }
    }

    pub type BoardPin = DryRunPin;

    pub fn init_logging() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    pub fn relay_pins(
        pins: impl IntoIterator<Item = PinId>,
    ) -> anyhow::Result<Vec<(PinId, BoardPin)>> {
        Ok(pins
            .into_iter()
            .map(|pin| (pin, DryRunPin { pin, high: None }))
            .collect())
    }

    /// The host clock is disciplined by the operating system
    pub struct TimeSource;

    pub fn start_time_sync(wifi: Option<&WifiConfig>) -> anyhow::Result<TimeSource> {
        if wifi.is_some() {
            info!("Ignoring [wifi] settings, the host keeps its own time");
        }
        Ok(TimeSource)
    }

    /// Ctrl-C and SIGTERM set `stop`
    pub fn on_stop(stop: Arc<AtomicBool>) -> anyhow::Result<()> {
        ctrlc::set_handler(move || {
            info!("Stop signal received");
            stop.store(true, Ordering::Relaxed);
        })?;
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
mod esp {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use anyhow::anyhow;
    use esp_idf_svc::{
        eventloop::EspSystemEventLoop,
        hal::{
            gpio::{AnyOutputPin, Output, PinDriver},
            peripherals::Peripherals,
        },
        log::EspLogger,
        nvs::EspDefaultNvsPartition,
        sntp::EspSntp,
        wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
    };
    use log::*;
    use motion::PinId;

    use crate::config::WifiConfig;

    pub type BoardPin = PinDriver<'static, AnyOutputPin, Output>;

    pub fn init_logging() {
        // Required for ESP-IDF patches
        esp_idf_svc::sys::link_patches();
        EspLogger::initialize_default();
    }

    pub fn relay_pins(
        pins: impl IntoIterator<Item = PinId>,
    ) -> anyhow::Result<Vec<(PinId, BoardPin)>> {
        pins.into_iter()
            .map(|pin| -> anyhow::Result<(PinId, BoardPin)> {
                // SAFETY: every relay pin is claimed exactly once (the panel
                // registry rejects duplicates) and nothing else drives GPIO.
                let gpio = unsafe { AnyOutputPin::new(pin as i32) };
                Ok((pin, PinDriver::output(gpio)?))
            })
            .collect()
    }

    /// Keeps the station link and the SNTP client alive; dropping it stops time sync
    pub struct TimeSource {
        _wifi: Option<BlockingWifi<EspWifi<'static>>>,
        _sntp: EspSntp<'static>,
    }

    pub fn start_time_sync(wifi: Option<&WifiConfig>) -> anyhow::Result<TimeSource> {
        let wifi = match wifi {
            Some(credentials) => Some(connect_wifi(credentials)?),
            None => {
                warn!("No [wifi] settings, time sync depends on an existing network");
                None
            }
        };
        info!("Synchronizing with NTP Server");
        Ok(TimeSource {
            _wifi: wifi,
            _sntp: EspSntp::new_default()?,
        })
    }

    fn connect_wifi(credentials: &WifiConfig) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;

        let esp_wifi = EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs))?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("Wi-Fi SSID is longer than 32 bytes"))?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("Wi-Fi password is longer than 64 bytes"))?,
            auth_method: AuthMethod::WPA2Personal,
            ..Default::default()
        }))?;

        wifi.start()?;
        wifi.connect()?;
        wifi.wait_netif_up()?;
        info!("Connected to Wi-Fi network {}", credentials.ssid);
        Ok(wifi)
    }

    /// The controller runs until power is removed
    pub fn on_stop(_stop: Arc<AtomicBool>) -> anyhow::Result<()> {
        Ok(())
    }
}
