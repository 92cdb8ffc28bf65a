//! BLE central (adapter) handling.
//!
//! Wraps the platform adapter behind the two operations the probe manager
//! needs: toggling discovery and enumerating currently-visible devices.

use btleplug::api::{Central, Manager as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Handle to the default Bluetooth adapter.
pub struct BleCentral {
    /// The BLE adapter to use for discovery.
    adapter: Adapter,
    /// Whether discovery is currently active.
    is_discovering: RwLock<bool>,
}

impl BleCentral {
    /// Acquire the default Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self {
            adapter,
            is_discovering: RwLock::new(false),
        })
    }

    /// Wrap a specific adapter (used by tests and multi-adapter hosts).
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            is_discovering: RwLock::new(false),
        }
    }

    /// Start device discovery.
    pub async fn start_discovery(&self) -> Result<()> {
        if *self.is_discovering.read() {
            debug!("Already discovering, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE discovery");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        *self.is_discovering.write() = true;

        Ok(())
    }

    /// Stop device discovery.
    pub async fn stop_discovery(&self) -> Result<()> {
        if !*self.is_discovering.read() {
            debug!("Not discovering, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE discovery");

        *self.is_discovering.write() = false;

        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        Ok(())
    }

    /// Check if discovery is active.
    pub fn is_discovering(&self) -> bool {
        *self.is_discovering.read()
    }

    /// Enumerate all peripherals the adapter can currently see.
    pub async fn visible_devices(&self) -> Result<Vec<Peripheral>> {
        self.adapter.peripherals().await.map_err(Error::Bluetooth)
    }
}

impl Drop for BleCentral {
    fn drop(&mut self) {
        *self.is_discovering.write() = false;
    }
}
