//! Probe connection and polling.
//!
//! A probe is connection-scoped: it is created when the manager decides to
//! connect to an eligible device, runs the connection protocol, polls the
//! temperature and battery characteristics once a second, and is dropped
//! when the device disconnects. All output travels over a [`ProbeEvent`]
//! channel whose single consumer is the controller task.

use std::time::{Duration, Instant};

use btleplug::api::{BDAddr, Peripheral as _};
use btleplug::platform::Peripheral;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ble::characteristics::GattReader;
use crate::ble::uuids::{
    BATTERY_CHARACTERISTIC_UUID, FIRMWARE_REVISION_UUID, TEMPERATURE_CHARACTERISTIC_UUID,
};
use crate::data::{ProbeReading, TempUnit};
use crate::error::{Error, Result};

/// How long a connection attempt may take before it is abandoned.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(12);

/// How often a connected probe is polled.
pub const POLL_PERIOD: Duration = Duration::from_secs(1);

/// Events emitted by probes toward the controller task.
#[derive(Debug, Clone)]
pub enum ProbeEvent {
    /// A probe finished its connection protocol and will start reporting.
    Connected {
        /// MAC address of the probe.
        address: BDAddr,
        /// Probe slot reported by the firmware (1-4).
        probe_index: u8,
        /// Firmware version string.
        firmware: String,
    },
    /// A connection attempt failed or timed out.
    ConnectFailed(BDAddr),
    /// A fresh decoded reading.
    Update(ProbeReading),
    /// The probe dropped off and polling has stopped.
    Disconnected(BDAddr),
}

/// Lifecycle state of a probe connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeState {
    /// Seen in a discovery pass, not yet contacted.
    #[default]
    Discovered,
    /// Connection attempt in flight.
    Connecting,
    /// GATT resolved; firmware and characteristics verified.
    Initialized,
    /// Poll loop running.
    Streaming,
    /// Connection lost; the probe is about to be dropped.
    Disconnected,
}

/// A single connected temperature probe.
pub struct Probe {
    address: BDAddr,
    gatt: GattReader,
    probe_index: u8,
    firmware: String,
    unit: TempUnit,
    state: ProbeState,
    /// Unknown read errors are warned once, then demoted to debug.
    read_error_warned: bool,
}

impl Probe {
    /// Run the connection protocol against a discovered peripheral.
    ///
    /// Waits up to [`CONNECT_TIMEOUT`] for the device to become
    /// addressable, resolves GATT, reads the firmware revision (which
    /// doubles as the probe-index carrier) and verifies both vendor
    /// characteristics are present.
    pub(crate) async fn connect(peripheral: Peripheral, unit: TempUnit) -> Result<Self> {
        let address = peripheral.address();
        debug!(%address, "connecting");

        tokio::time::timeout(CONNECT_TIMEOUT, async {
            peripheral.connect().await?;
            peripheral.discover_services().await
        })
        .await
        .map_err(|_| Error::ConnectionFailed {
            address: address.to_string(),
            reason: format!("timed out after {}s", CONNECT_TIMEOUT.as_secs()),
        })?
        .map_err(Error::Bluetooth)?;

        let gatt = GattReader::new(peripheral);

        let revision = gatt.read_string(&FIRMWARE_REVISION_UUID).await?;
        let (firmware, probe_index) = parse_firmware_revision(&revision)?;

        gatt.require(&TEMPERATURE_CHARACTERISTIC_UUID)?;
        gatt.require(&BATTERY_CHARACTERISTIC_UUID)?;

        info!(%address, firmware, probe_index, "probe connected");

        Ok(Self {
            address,
            gatt,
            probe_index,
            firmware,
            unit,
            state: ProbeState::Initialized,
            read_error_warned: false,
        })
    }

    /// MAC address of the probe.
    pub fn address(&self) -> BDAddr {
        self.address
    }

    /// Probe slot reported by the firmware (1-4).
    pub fn probe_index(&self) -> u8 {
        self.probe_index
    }

    /// Firmware version string.
    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Poll the probe at [`POLL_PERIOD`] until it disconnects.
    ///
    /// Each successful cycle emits one `Update`. A disconnect-class read
    /// error ends the loop; other errors are logged and the next cycle
    /// proceeds.
    pub(crate) async fn poll_loop(&mut self, events: &mpsc::Sender<ProbeEvent>) {
        self.state = ProbeState::Streaming;

        let mut ticker = tokio::time::interval(POLL_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.poll_once().await {
                Ok(reading) => {
                    if events.send(ProbeEvent::Update(reading)).await.is_err() {
                        // Controller gone; nothing left to report to.
                        break;
                    }
                }
                Err(e) if is_disconnect_error(&e) => {
                    info!(address = %self.address, "probe disconnected: {e}");
                    break;
                }
                Err(e) => {
                    if self.read_error_warned {
                        debug!(address = %self.address, "probe read error: {e}");
                    } else {
                        self.read_error_warned = true;
                        warn!(address = %self.address, "probe read error: {e}");
                    }
                }
            }
        }

        self.state = ProbeState::Disconnected;
    }

    /// One poll cycle: read and decode both characteristics.
    async fn poll_once(&self) -> Result<ProbeReading> {
        let temperature = self.gatt.read(&TEMPERATURE_CHARACTERISTIC_UUID).await?;
        let battery = self.gatt.read(&BATTERY_CHARACTERISTIC_UUID).await?;

        decode_reading(
            self.address,
            self.probe_index,
            &self.firmware,
            self.unit,
            &temperature,
            &battery,
        )
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("address", &self.address)
            .field("probe_index", &self.probe_index)
            .field("firmware", &self.firmware)
            .field("state", &self.state)
            .finish()
    }
}

/// Split the Device Information firmware string into version and slot.
///
/// The probe reports `"<firmware>_<index>"` where `<index>` is 1-4.
fn parse_firmware_revision(revision: &str) -> Result<(String, u8)> {
    let (firmware, index) = revision.split_once('_').ok_or_else(|| Error::InvalidData {
        context: format!("firmware revision without probe index: {revision:?}"),
    })?;

    let probe_index: u8 = index.parse().map_err(|_| Error::InvalidData {
        context: format!("non-numeric probe index: {index:?}"),
    })?;

    if !(1..=4).contains(&probe_index) {
        return Err(Error::InvalidData {
            context: format!("probe index {probe_index} out of range 1-4"),
        });
    }

    Ok((firmware.to_string(), probe_index))
}

/// Decode the 6-byte temperature characteristic into raw tip and ambient
/// values.
///
/// The payload is three little-endian u16s: the tip reading plus two
/// ambient correction terms.
fn decode_temperature(data: &[u8]) -> Result<(i32, i32)> {
    if data.len() < 6 {
        return Err(Error::InvalidData {
            context: format!("temperature characteristic is {} bytes, expected 6", data.len()),
        });
    }

    let tip = u16::from_le_bytes([data[0], data[1]]) as i32;
    let ra = u16::from_le_bytes([data[2], data[3]]) as i32;
    let oa = u16::from_le_bytes([data[4], data[5]]) as i32;

    let ambient = tip + ((ra - oa.min(48)) * 16 * 589 / 1487).max(0);

    Ok((tip, ambient))
}

/// Convert a raw sensor value to Celsius.
fn raw_to_celsius(raw: i32) -> f32 {
    (raw as f32 + 8.0) / 16.0
}

/// Decode the 2-byte battery characteristic into a percentage.
fn decode_battery(data: &[u8]) -> Result<u8> {
    if data.len() < 2 {
        return Err(Error::InvalidData {
            context: format!("battery characteristic is {} bytes, expected 2", data.len()),
        });
    }

    // The raw value is tenths; the product can report past 100%.
    let pct = u16::from_le_bytes([data[0], data[1]]) as u32 * 10;
    Ok(pct.min(100) as u8)
}

/// Assemble a [`ProbeReading`] from both characteristic payloads.
fn decode_reading(
    address: BDAddr,
    probe_index: u8,
    firmware: &str,
    unit: TempUnit,
    temperature: &[u8],
    battery: &[u8],
) -> Result<ProbeReading> {
    let (tip_raw, ambient_raw) = decode_temperature(temperature)?;
    let battery_pct = decode_battery(battery)?;

    Ok(ProbeReading {
        address,
        probe_index,
        tip: unit.from_celsius(raw_to_celsius(tip_raw)),
        ambient: unit.from_celsius(raw_to_celsius(ambient_raw)),
        unit,
        battery_pct,
        timestamp: Instant::now(),
        firmware: firmware.to_string(),
    })
}

/// Whether an error means the connection itself is gone.
fn is_disconnect_error(error: &Error) -> bool {
    matches!(
        error,
        Error::Bluetooth(btleplug::Error::NotConnected)
            | Error::Bluetooth(btleplug::Error::DeviceNotFound)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le(value: u16) -> [u8; 2] {
        value.to_le_bytes()
    }

    fn temp_payload(tip: u16, ra: u16, oa: u16) -> Vec<u8> {
        let mut data = Vec::with_capacity(6);
        data.extend_from_slice(&le(tip));
        data.extend_from_slice(&le(ra));
        data.extend_from_slice(&le(oa));
        data
    }

    #[test]
    fn test_parse_firmware_revision() {
        let (firmware, index) = parse_firmware_revision("2.1.3_4").unwrap();
        assert_eq!(firmware, "2.1.3");
        assert_eq!(index, 4);
    }

    #[test]
    fn test_parse_firmware_revision_rejects_bad_input() {
        assert!(parse_firmware_revision("2.1.3").is_err());
        assert!(parse_firmware_revision("2.1.3_x").is_err());
        assert!(parse_firmware_revision("2.1.3_0").is_err());
        assert!(parse_firmware_revision("2.1.3_5").is_err());
    }

    #[test]
    fn test_decode_temperature() {
        // oa below the 48 cap: correction uses oa itself.
        let data = temp_payload(1600, 800, 40);
        let (tip, ambient) = decode_temperature(&data).unwrap();
        assert_eq!(tip, 1600);
        // (800 - 40) * 16 * 589 / 1487 = 4816 (integer division)
        assert_eq!(ambient, 1600 + 4816);
    }

    #[test]
    fn test_decode_temperature_is_deterministic() {
        let data = temp_payload(1600, 800, 40);
        assert_eq!(
            decode_temperature(&data).unwrap(),
            decode_temperature(&data).unwrap()
        );
    }

    #[test]
    fn test_decode_temperature_oa_capped_at_48() {
        let low = decode_temperature(&temp_payload(1600, 800, 48)).unwrap();
        let high = decode_temperature(&temp_payload(1600, 800, 9000)).unwrap();
        assert_eq!(low, high);
    }

    #[test]
    fn test_decode_temperature_negative_correction_clamped() {
        // ra below the capped oa: the correction floors at zero.
        let (tip, ambient) = decode_temperature(&temp_payload(1600, 10, 48)).unwrap();
        assert_eq!(tip, ambient);
    }

    #[test]
    fn test_decode_temperature_rejects_short_payload() {
        assert!(decode_temperature(&[0x01, 0x02, 0x03]).is_err());
    }

    #[test]
    fn test_raw_to_celsius() {
        assert!((raw_to_celsius(1592) - 100.0).abs() < f32::EPSILON);
        assert!((raw_to_celsius(-8) - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_battery() {
        assert_eq!(decode_battery(&le(7)).unwrap(), 70);
        assert_eq!(decode_battery(&le(10)).unwrap(), 100);
        // The product can report past 100%; clamp on output.
        assert_eq!(decode_battery(&le(11)).unwrap(), 100);
        assert!(decode_battery(&[0x01]).is_err());
    }

    #[test]
    fn test_decode_reading_converts_units() {
        let address = BDAddr::from([0xB8, 0x1F, 0x5E, 0, 0, 1]);
        let temperature = temp_payload(1592, 0, 0);
        let battery = le(8);

        let celsius = decode_reading(
            address,
            1,
            "2.1.3",
            TempUnit::Celsius,
            &temperature,
            &battery,
        )
        .unwrap();
        assert!((celsius.tip - 100.0).abs() < 0.001);

        let fahrenheit = decode_reading(
            address,
            1,
            "2.1.3",
            TempUnit::Fahrenheit,
            &temperature,
            &battery,
        )
        .unwrap();
        assert!((fahrenheit.tip - 212.0).abs() < 0.001);
        assert_eq!(fahrenheit.battery_pct, 80);
        assert_eq!(fahrenheit.probe_index, 1);
    }

    #[test]
    fn test_disconnect_error_classification() {
        assert!(is_disconnect_error(&Error::Bluetooth(
            btleplug::Error::NotConnected
        )));
        assert!(is_disconnect_error(&Error::Bluetooth(
            btleplug::Error::DeviceNotFound
        )));
        assert!(!is_disconnect_error(&Error::InvalidData {
            context: "short read".to_string(),
        }));
    }
}
