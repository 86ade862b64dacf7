use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigurationError;
use crate::relay::PinId;

/// Which way an actuator drives its panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    East,
    West,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::East => write!(f, "eastern"),
            Direction::West => write!(f, "western"),
        }
    }
}

/// One actuator pair as written in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PanelConfig {
    pub id: u32,
    pub east_pin: PinId,
    pub west_pin: PinId,
    /// Seconds to travel limit to limit
    pub throw_secs: f64,
    #[serde(default)]
    pub east_limit_angle: f64,
    #[serde(default)]
    pub west_limit_angle: f64,
}

/// A configured panel with its derived step duration.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    config: PanelConfig,
    throw: Duration,
    step: Duration,
}

impl Panel {
    pub fn id(&self) -> u32 {
        self.config.id
    }

    pub fn east_pin(&self) -> PinId {
        self.config.east_pin
    }

    pub fn west_pin(&self) -> PinId {
        self.config.west_pin
    }

    /// Relay that moves the panel towards `direction`
    pub fn pin(&self, direction: Direction) -> PinId {
        match direction {
            Direction::East => self.config.east_pin,
            Direction::West => self.config.west_pin,
        }
    }

    pub fn throw_duration(&self) -> Duration {
        self.throw
    }

    pub fn step_duration(&self) -> Duration {
        self.step
    }

    /// Dead-reckoned angle for a fraction of the day's travel (0.0 = east limit).
    /// Informational only, nothing is enforced against it.
    pub fn estimated_angle(&self, progress: f64) -> f64 {
        let span = self.config.west_limit_angle - self.config.east_limit_angle;
        self.config.east_limit_angle + span * progress.clamp(0.0, 1.0)
    }
}

/// Ordered set of panels sharing one step cadence.
///
/// Every panel takes the same number of steps per day: the fastest panel
/// steps for exactly the reference cadence and the others are scaled by
/// their throw relative to it, so all panels cover the same fraction of
/// their travel per step.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRegistry {
    panels: Vec<Panel>,
    reference_cadence: Duration,
    shortest_throw: Duration,
    step_count: u32,
}

impl PanelRegistry {
    pub fn new(
        configs: &[PanelConfig],
        reference_cadence: Duration,
    ) -> Result<PanelRegistry, ConfigurationError> {
        if configs.is_empty() {
            return Err(ConfigurationError::NoPanels);
        }
        if reference_cadence.is_zero() {
            return Err(ConfigurationError::NonPositiveCadence(reference_cadence));
        }

        let mut ids = HashSet::new();
        let mut pins = HashSet::new();
        let mut throws = Vec::with_capacity(configs.len());
        for config in configs {
            if !ids.insert(config.id) {
                return Err(ConfigurationError::DuplicatePanel(config.id));
            }
            for pin in [config.east_pin, config.west_pin] {
                if !pins.insert(pin) {
                    return Err(ConfigurationError::DuplicatePin(pin));
                }
            }
            throws.push(throw_duration(config)?);
        }

        let shortest_throw = throws.iter().copied().min().unwrap_or_default();
        let step_count = u32::try_from(shortest_throw.as_nanos() / reference_cadence.as_nanos())
            .unwrap_or(u32::MAX);
        if step_count == 0 {
            return Err(ConfigurationError::CadenceExceedsThrow {
                cadence: reference_cadence,
                shortest: shortest_throw,
            });
        }

        let panels = configs
            .iter()
            .zip(throws)
            .map(|(config, throw)| {
                let step = if throw == shortest_throw {
                    reference_cadence
                } else {
                    reference_cadence.mul_f64(throw.as_secs_f64() / shortest_throw.as_secs_f64())
                };
                Panel {
                    config: *config,
                    throw,
                    step,
                }
            })
            .collect();

        Ok(PanelRegistry {
            panels,
            reference_cadence,
            shortest_throw,
            step_count,
        })
    }

    /// Whole steps the fastest panel can take before reaching its limit
    pub fn step_count_for_day(&self) -> u32 {
        self.step_count
    }

    pub fn step_duration(&self, panel: &Panel) -> Duration {
        panel.step_duration()
    }

    pub fn reference_cadence(&self) -> Duration {
        self.reference_cadence
    }

    pub fn shortest_throw(&self) -> Duration {
        self.shortest_throw
    }

    pub fn get(&self, id: u32) -> Option<&Panel> {
        self.panels.iter().find(|p| p.id() == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Panel> {
        self.panels.iter()
    }

    /// Every relay pin, east then west, in registry order
    pub fn pins(&self) -> impl Iterator<Item = PinId> + '_ {
        self.panels
            .iter()
            .flat_map(|p| [p.east_pin(), p.west_pin()])
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}

impl<'a> IntoIterator for &'a PanelRegistry {
    type Item = &'a Panel;
    type IntoIter = std::slice::Iter<'a, Panel>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn throw_duration(config: &PanelConfig) -> Result<Duration, ConfigurationError> {
    let invalid = ConfigurationError::NonPositiveThrow {
        panel: config.id,
        throw_secs: config.throw_secs,
    };
    if !(config.throw_secs > 0.0) {
        return Err(invalid);
    }
    match Duration::try_from_secs_f64(config.throw_secs) {
        Ok(throw) if !throw.is_zero() => Ok(throw),
        _ => Err(invalid),
    }
}
