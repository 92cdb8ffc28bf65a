//! BLE communication module.
//!
//! This module provides low-level Bluetooth Low Energy functionality for
//! discovering and communicating with wireless temperature probes.

pub mod central;
pub mod characteristics;
pub mod uuids;

pub use central::BleCentral;
pub use characteristics::GattReader;
pub use uuids::*;
