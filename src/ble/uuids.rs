//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for probe communication, plus the
//! vendor OUI used to recognize eligible probes during discovery.

use btleplug::api::BDAddr;
use uuid::Uuid;

// Device Information Service (Standard BLE)
/// Standard BLE Device Information Service UUID.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);
/// Firmware Revision characteristic UUID.
///
/// The probe reports `"<firmware>_<index>"` here, where `<index>` is the
/// probe slot (1-4).
pub const FIRMWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x0000_2a26_0000_1000_8000_00805f9b34fb);

// Probe Service (vendor custom)
/// Vendor temperature service UUID.
pub const PROBE_SERVICE_UUID: Uuid = Uuid::from_u128(0xa75c_c7fc_c956_488f_ac2a_2dbc08b63a04);
/// Temperature characteristic UUID (6 bytes, three little-endian u16s).
pub const TEMPERATURE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x7edd_a774_045e_4bbf_909b_45d1991a2876);
/// Battery characteristic UUID (2 bytes, little-endian u16).
pub const BATTERY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x2adb_4877_68d8_4884_bd3c_d83853bf27b8);

/// Manufacturer OUI (first three MAC octets) of eligible probes.
pub const PROBE_OUI: [u8; 3] = [0xB8, 0x1F, 0x5E];

/// Check whether a MAC address carries the probe vendor's OUI.
pub fn is_probe_address(address: &BDAddr) -> bool {
    address.into_inner()[..3] == PROBE_OUI
}
