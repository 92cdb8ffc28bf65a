//! Temperature reading value types.

use std::time::Instant;

use btleplug::api::BDAddr;
use serde::{Deserialize, Serialize};

/// Temperature unit carried by every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TempUnit {
    /// Degrees Fahrenheit.
    #[serde(rename = "F")]
    Fahrenheit,
    /// Degrees Celsius.
    #[serde(rename = "C")]
    Celsius,
}

impl TempUnit {
    /// Convert a Celsius value into this unit.
    ///
    /// Probe hardware always reports Celsius; this is the single point
    /// where readings take on the configured unit.
    pub fn from_celsius(&self, celsius: f32) -> f32 {
        match self {
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
            Self::Celsius => celsius,
        }
    }

    /// Short symbol for display purposes.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Fahrenheit => "°F",
            Self::Celsius => "°C",
        }
    }
}

impl std::fmt::Display for TempUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single decoded sample from one probe.
///
/// Immutable once emitted; the probe manager publishes one of these per
/// probe roughly once a second.
#[derive(Debug, Clone)]
pub struct ProbeReading {
    /// MAC address of the probe that produced the sample.
    pub address: BDAddr,
    /// Probe slot reported by the firmware (1-4).
    pub probe_index: u8,
    /// Tip (food) temperature in `unit`.
    pub tip: f32,
    /// Ambient (pit) temperature in `unit`.
    pub ambient: f32,
    /// Unit both temperatures are expressed in.
    pub unit: TempUnit,
    /// Battery charge, 0-100.
    pub battery_pct: u8,
    /// When the sample was decoded.
    pub timestamp: Instant,
    /// Firmware version string reported by the probe.
    pub firmware: String,
}
