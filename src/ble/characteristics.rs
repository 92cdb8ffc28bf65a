//! GATT characteristic access.
//!
//! The probes here are poll-driven: once a peripheral is connected and
//! its services are discovered, the characteristic set never changes and
//! is only ever read. [`GattReader`] snapshots that set once and serves
//! reads against it.

use std::collections::HashMap;

use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Read access to the characteristics a connected probe exposes.
pub struct GattReader {
    peripheral: Peripheral,
    by_uuid: HashMap<Uuid, Characteristic>,
}

impl GattReader {
    /// Snapshot the characteristic table of a connected peripheral.
    ///
    /// Call after service discovery; the table is fixed for the life of
    /// the connection.
    pub fn new(peripheral: Peripheral) -> Self {
        let by_uuid: HashMap<_, _> = peripheral
            .services()
            .into_iter()
            .flat_map(|service| service.characteristics)
            .map(|characteristic| (characteristic.uuid, characteristic))
            .collect();

        debug!(count = by_uuid.len(), "characteristic table built");

        Self { peripheral, by_uuid }
    }

    /// Whether the device exposes a characteristic.
    pub fn has(&self, uuid: &Uuid) -> bool {
        self.by_uuid.contains_key(uuid)
    }

    /// Fail early if the device lacks a characteristic the caller is
    /// about to depend on.
    pub fn require(&self, uuid: &Uuid) -> Result<()> {
        self.lookup(uuid).map(|_| ())
    }

    /// Read the current value of a characteristic.
    pub async fn read(&self, uuid: &Uuid) -> Result<Vec<u8>> {
        let characteristic = self.lookup(uuid)?;
        Ok(self.peripheral.read(characteristic).await?)
    }

    /// Read a characteristic holding a UTF-8 string.
    pub async fn read_string(&self, uuid: &Uuid) -> Result<String> {
        let raw = self.read(uuid).await?;
        String::from_utf8(raw).map_err(|e| Error::InvalidData {
            context: format!("characteristic {uuid} is not UTF-8: {e}"),
        })
    }

    fn lookup(&self, uuid: &Uuid) -> Result<&Characteristic> {
        self.by_uuid
            .get(uuid)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }
}
