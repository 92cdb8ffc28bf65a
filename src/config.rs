//! Startup configuration.
//!
//! Read once by the orchestrator from a TOML file. Out-of-range values are
//! clamped to their documented ranges with a warning rather than rejected,
//! so a hand-edited file never prevents the controller from starting.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::controller::PidGains;
use crate::data::TempUnit;
use crate::error::Result;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display and control unit for all temperatures.
    pub units: TempUnit,
    /// Target pit temperature in `units`.
    #[serde(rename = "setPoint")]
    pub set_point: f32,
    /// PID gains.
    #[serde(rename = "PID")]
    pub pid: PidGains,
    /// Blower fan settings.
    pub fan: FanConfig,
    /// Damper servo settings.
    pub servo: ServoConfig,
    /// Lid-open detection settings.
    pub lid: LidConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            units: TempUnit::Fahrenheit,
            set_point: 225.0,
            pid: PidGains::default(),
            fan: FanConfig::default(),
            servo: ServoConfig::default(),
            lid: LidConfig::default(),
        }
    }
}

/// Blower fan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FanConfig {
    /// Lowest speed the fan can sustain continuously; mapped speeds below
    /// this are emulated by long-pulse PWM.
    pub min_speed: f32,
    /// Speed ceiling once the set-point has been reached, 0-100.
    pub max_speed: f32,
    /// Speed ceiling during startup, 0-100.
    pub max_startup_speed: f32,
    /// PID output percentage below which the fan stays off, 0-99.
    pub on_above: f32,
    /// Whether the blower wiring is reversed.
    pub reverse: bool,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            min_speed: 10.0,
            max_speed: 100.0,
            max_startup_speed: 100.0,
            on_above: 0.0,
            reverse: false,
        }
    }
}

/// Damper servo settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServoConfig {
    /// Servo position for a fully closed damper, 0-100.
    pub min_position: f32,
    /// Servo position for a fully open damper, 0-100.
    pub max_position: f32,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            min_position: 0.0,
            max_position: 100.0,
        }
    }
}

/// Lid-open detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LidConfig {
    /// Temperature drop, as a percentage of the set-point, that triggers
    /// lid-open detection. Zero disables detection.
    pub lid_open_offset: f32,
    /// Seconds before control auto-resumes after a lid event, minimum 30.
    pub lid_open_duration: u32,
}

impl Default for LidConfig {
    fn default() -> Self {
        Self {
            lid_open_offset: 6.0,
            lid_open_duration: 240,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults; a present but malformed file is
    /// an error. Out-of-range values are clamped with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config.clamped())
    }

    /// Clamp every field to its documented range, warning on each change.
    pub fn clamped(mut self) -> Self {
        self.fan.min_speed = clamp_pct("fan.minSpeed", self.fan.min_speed, 0.0, 100.0);
        self.fan.max_speed = clamp_pct("fan.maxSpeed", self.fan.max_speed, 0.0, 100.0);
        self.fan.max_startup_speed =
            clamp_pct("fan.maxStartupSpeed", self.fan.max_startup_speed, 0.0, 100.0);
        // 99 rather than 100: the fan remap divides by (100 - onAbove).
        self.fan.on_above = clamp_pct("fan.onAbove", self.fan.on_above, 0.0, 99.0);
        self.servo.min_position =
            clamp_pct("servo.minPosition", self.servo.min_position, 0.0, 100.0);
        self.servo.max_position =
            clamp_pct("servo.maxPosition", self.servo.max_position, 0.0, 100.0);
        self.lid.lid_open_offset =
            clamp_pct("lid.lidOpenOffset", self.lid.lid_open_offset, 0.0, 100.0);
        if self.lid.lid_open_duration < 30 {
            warn!(
                value = self.lid.lid_open_duration,
                "lid.lidOpenDuration below minimum, clamping to 30"
            );
            self.lid.lid_open_duration = 30;
        }
        self
    }
}

fn clamp_pct(name: &str, value: f32, min: f32, max: f32) -> f32 {
    if value < min || value > max {
        warn!(name, value, min, max, "config value out of range, clamping");
        value.clamp(min, max)
    } else {
        value
    }
}
