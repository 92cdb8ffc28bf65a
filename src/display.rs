//! Display sink seam.
//!
//! The framebuffer renderer lives outside this crate; anything that can
//! consume a [`StatusSnapshot`] once a second can stand in for it.

use tracing::info;

use crate::data::StatusSnapshot;

/// Consumer of status snapshots.
pub trait DisplaySink: Send {
    /// Accept one snapshot; called once per heavy tick.
    fn update(&mut self, status: &StatusSnapshot);
}

/// Sink that logs each snapshot.
#[derive(Debug, Default)]
pub struct StatusLogger;

impl DisplaySink for StatusLogger {
    fn update(&mut self, status: &StatusSnapshot) {
        info!(
            mode = %status.mode,
            probes = status.num_probes,
            pit_temp = ?status.pit_temp,
            set_point = status.set_point,
            unit = %status.unit,
            output = status.pid_output,
            fan = status.fan_pct,
            servo = status.servo_pct,
            "status"
        );
    }
}
