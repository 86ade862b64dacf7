use anyhow::Context;
use clock::Location;
use motion::{PanelConfig, TrackerSettings};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an alternative configuration file
pub const CONFIG_ENV: &str = "TRACKER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub location: LocationConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub relays: RelayConfig,
    pub panels: Vec<PanelConfig>,
    /// Station credentials used for network time on the controller
    pub wifi: Option<WifiConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default = "default_horizon")]
    pub horizon_deg: f64,
    pub timezone_offset_hours: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_cadence")]
    pub reference_cadence_secs: f64,
    #[serde(default = "default_linger")]
    pub sunset_linger_secs: f64,
    #[serde(default = "default_settle")]
    pub settle_secs: f64,
    #[serde(default = "default_idle_poll")]
    pub idle_poll_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_active_low")]
    pub active_low: bool,
}

fn default_horizon() -> f64 {
    10.0
}

fn default_cadence() -> f64 {
    2.25
}

fn default_linger() -> f64 {
    2.0 * 60.0 * 60.0
}

fn default_settle() -> f64 {
    0.25
}

fn default_idle_poll() -> f64 {
    15.0 * 60.0
}

fn default_active_low() -> bool {
    true
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            reference_cadence_secs: default_cadence(),
            sunset_linger_secs: default_linger(),
            settle_secs: default_settle(),
            idle_poll_secs: default_idle_poll(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            active_low: default_active_low(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        // Explicit path first, then the working directory
        if let Some(path) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
            return Self::from_file(&path);
        }
        if Path::new("config.toml").exists() {
            return Self::from_file(Path::new("config.toml"));
        }

        // Fallback to embedded defaults
        let config = Self::parse(include_str!("../config.toml.example"))
            .context("Embedded default configuration is invalid")?;
        log::warn!("Using embedded default configuration");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn site(&self) -> Location {
        Location {
            latitude: self.location.latitude,
            longitude: self.location.longitude,
            altitude: self.location.altitude,
            horizon_deg: self.location.horizon_deg,
        }
    }
}

impl TrackingConfig {
    pub fn reference_cadence(&self) -> anyhow::Result<Duration> {
        seconds("reference_cadence_secs", self.reference_cadence_secs)
    }

    pub fn settle(&self) -> anyhow::Result<Duration> {
        seconds("settle_secs", self.settle_secs)
    }

    pub fn tracker_settings(&self) -> anyhow::Result<TrackerSettings> {
        Ok(TrackerSettings {
            sunset_linger: seconds("sunset_linger_secs", self.sunset_linger_secs)?,
            idle_poll: seconds("idle_poll_secs", self.idle_poll_secs)?,
        })
    }
}

fn seconds(name: &str, value: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("tracking.{} must be a non-negative number of seconds, got {}", name, value))
}
