//! Motor driver seam.
//!
//! The fan and damper sit behind an I²C PWM hat whose register protocol
//! lives outside this crate. The controller only needs the three calls in
//! [`MotorDriver`]; a real backend wraps the hat, [`NullMotor`] stands in
//! when no hardware is attached.

use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// Readiness checks performed before an output call gives up.
pub const INIT_RETRIES: u32 = 5;

/// Delay between readiness checks.
pub const INIT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Interface to the fan/damper driver.
pub trait MotorDriver: Send {
    /// Whether the driver has finished hardware initialization.
    fn initialized(&self) -> bool;

    /// Set fan duty, 0-100. Zero is a literal stop.
    fn set_fan(&mut self, speed_pct: u8, reversed: bool) -> Result<()>;

    /// Set damper position, 0-100 (0 closed, 100 open).
    fn set_damper(&mut self, position_pct: u8) -> Result<()>;
}

/// Wait for the driver to report ready.
///
/// Checks immediately, then retries [`INIT_RETRIES`] times at
/// [`INIT_RETRY_DELAY`] intervals. Output calls must not proceed against
/// an uninitialized driver.
pub async fn wait_until_ready<M: MotorDriver + ?Sized>(motor: &M) -> Result<()> {
    for attempt in 0..=INIT_RETRIES {
        if motor.initialized() {
            return Ok(());
        }
        if attempt < INIT_RETRIES {
            debug!(attempt = attempt + 1, "motor driver not ready, retrying");
            tokio::time::sleep(INIT_RETRY_DELAY).await;
        }
    }

    Err(Error::MotorInitTimeout {
        attempts: INIT_RETRIES,
    })
}

/// Stand-in driver that logs commands and discards them.
///
/// Replace with the PWM hat backend on real hardware.
#[derive(Debug, Default)]
pub struct NullMotor;

impl MotorDriver for NullMotor {
    fn initialized(&self) -> bool {
        true
    }

    fn set_fan(&mut self, speed_pct: u8, reversed: bool) -> Result<()> {
        debug!(speed_pct, reversed, "fan");
        Ok(())
    }

    fn set_damper(&mut self, position_pct: u8) -> Result<()> {
        debug!(position_pct, "damper");
        Ok(())
    }
}
