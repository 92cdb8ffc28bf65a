//! Probe manager.
//!
//! Maintains live connections to all eligible probes and publishes
//! normalized readings at ~1 Hz. A supervisory tick enumerates visible
//! devices, spawns connection attempts for eligible newcomers, prunes
//! finished probe tasks, and restarts discovery when the BLE stack has
//! failed too many connection attempts in a row.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{BDAddr, Peripheral as _};
use btleplug::platform::Peripheral;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ble::central::BleCentral;
use crate::ble::uuids::is_probe_address;
use crate::data::TempUnit;
use crate::error::Result;
use crate::probe::{Probe, ProbeEvent};

/// Period of the supervisory tick.
pub const SUPERVISE_PERIOD: Duration = Duration::from_secs(1);

/// Connection failures tolerated before discovery is restarted.
pub const MAX_CONNECTION_FAILURES: u32 = 10;

/// Handle to a spawned probe task.
struct ProbeHandle {
    task: tokio::task::JoinHandle<()>,
}

/// Central manager for discovering and supervising probes.
pub struct ProbeManager {
    /// BLE adapter handle.
    central: Arc<BleCentral>,
    /// Tracked probes by MAC address.
    probes: Arc<RwLock<HashMap<BDAddr, ProbeHandle>>>,
    /// MAC addresses excluded from discovery.
    blacklist: Arc<RwLock<HashSet<BDAddr>>>,
    /// Consecutive failed connection attempts.
    connect_failures: Arc<AtomicU32>,
    /// Channel toward the controller task.
    events_tx: mpsc::Sender<ProbeEvent>,
    /// Unit readings are converted into.
    unit: TempUnit,
    /// Running flag.
    is_running: Arc<AtomicBool>,
    /// Supervisory task handle.
    supervisor: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl ProbeManager {
    /// Create a new manager around an acquired adapter.
    pub fn new(central: BleCentral, unit: TempUnit, events_tx: mpsc::Sender<ProbeEvent>) -> Self {
        Self {
            central: Arc::new(central),
            probes: Arc::new(RwLock::new(HashMap::new())),
            blacklist: Arc::new(RwLock::new(HashSet::new())),
            connect_failures: Arc::new(AtomicU32::new(0)),
            events_tx,
            unit,
            is_running: Arc::new(AtomicBool::new(false)),
            supervisor: RwLock::new(None),
        }
    }

    /// Begin discovery and schedule the supervisory tick.
    pub async fn start(&self) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!("Already running");
            return Ok(());
        }

        info!("Starting probe manager");

        self.central.start_discovery().await?;

        let central = self.central.clone();
        let probes = self.probes.clone();
        let blacklist = self.blacklist.clone();
        let failures = self.connect_failures.clone();
        let events_tx = self.events_tx.clone();
        let unit = self.unit;
        let is_running = self.is_running.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SUPERVISE_PERIOD);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut restart_pending = false;

            while is_running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !is_running.load(Ordering::SeqCst) {
                    break;
                }

                if restart_pending {
                    restart_pending = false;
                    if let Err(e) = central.start_discovery().await {
                        warn!("Discovery restart failed: {e}");
                        continue;
                    }
                }

                // Drop handles of probes whose task has ended; their MAC
                // becomes eligible again on this pass.
                probes.write().retain(|_, handle| !handle.task.is_finished());

                let visible = match central.visible_devices().await {
                    Ok(devices) => devices,
                    Err(e) => {
                        warn!("Device enumeration failed: {e}");
                        continue;
                    }
                };

                for peripheral in visible {
                    let address = peripheral.address();
                    if !is_eligible(&address, &blacklist.read()) {
                        continue;
                    }
                    if probes.read().contains_key(&address) {
                        continue;
                    }
                    Self::spawn_probe(peripheral, address, unit, &probes, &failures, &events_tx);
                }

                if failures.load(Ordering::SeqCst) > MAX_CONNECTION_FAILURES {
                    warn!("Too many connection failures, restarting discovery");
                    failures.store(0, Ordering::SeqCst);
                    if let Err(e) = central.stop_discovery().await {
                        warn!("Discovery stop failed: {e}");
                    }
                    restart_pending = true;
                }
            }

            debug!("Supervisory task ended");
        });

        *self.supervisor.write() = Some(handle);

        Ok(())
    }

    /// Halt discovery.
    ///
    /// Probes that are already connected keep streaming until they
    /// naturally disconnect.
    pub async fn stop(&self) -> Result<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Stopping probe manager");

        self.central.stop_discovery().await?;

        if let Some(handle) = self.supervisor.write().take() {
            handle.abort();
        }

        Ok(())
    }

    /// Stop, wait one tick, then start again.
    ///
    /// The in-memory list of already-connected probes is preserved.
    pub async fn restart(&self) -> Result<()> {
        info!("Restarting probe manager");
        self.stop().await?;
        tokio::time::sleep(SUPERVISE_PERIOD).await;
        self.start().await
    }

    /// Exclude a MAC address from discovery.
    pub fn blacklist(&self, address: BDAddr) {
        info!(%address, "blacklisting probe");
        self.blacklist.write().insert(address);
    }

    /// Re-admit a MAC address to discovery.
    pub fn whitelist(&self, address: BDAddr) {
        info!(%address, "whitelisting probe");
        self.blacklist.write().remove(&address);
    }

    /// Check blacklist membership.
    pub fn is_blacklisted(&self, address: &BDAddr) -> bool {
        self.blacklist.read().contains(address)
    }

    /// Number of probes currently tracked.
    pub fn probe_count(&self) -> usize {
        self.probes.read().len()
    }

    /// Release all resources: discovery stopped, probe tasks aborted.
    pub async fn destroy(&self) -> Result<()> {
        self.stop().await?;

        for (address, handle) in self.probes.write().drain() {
            debug!(%address, "aborting probe task");
            handle.task.abort();
        }

        Ok(())
    }

    /// Spawn the connect-then-poll task for one eligible device.
    fn spawn_probe(
        peripheral: Peripheral,
        address: BDAddr,
        unit: TempUnit,
        probes: &Arc<RwLock<HashMap<BDAddr, ProbeHandle>>>,
        failures: &Arc<AtomicU32>,
        events_tx: &mpsc::Sender<ProbeEvent>,
    ) {
        info!(%address, "eligible probe found, connecting");

        let failures = failures.clone();
        let events_tx = events_tx.clone();

        let task = tokio::spawn(async move {
            match Probe::connect(peripheral, unit).await {
                Ok(mut probe) => {
                    let _ = events_tx
                        .send(ProbeEvent::Connected {
                            address,
                            probe_index: probe.probe_index(),
                            firmware: probe.firmware().to_string(),
                        })
                        .await;

                    probe.poll_loop(&events_tx).await;

                    // A natural disconnect does not count against the
                    // failure budget.
                    let _ = events_tx.send(ProbeEvent::Disconnected(address)).await;
                }
                Err(e) => {
                    warn!(%address, "connection failed: {e}");
                    failures.fetch_add(1, Ordering::SeqCst);
                    let _ = events_tx.send(ProbeEvent::ConnectFailed(address)).await;
                }
            }
        });

        probes.write().insert(address, ProbeHandle { task });
    }
}

impl Drop for ProbeManager {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
    }
}

/// A device is eligible iff it carries the vendor OUI and is not
/// blacklisted.
fn is_eligible(address: &BDAddr, blacklist: &HashSet<BDAddr>) -> bool {
    is_probe_address(address) && !blacklist.contains(address)
}
