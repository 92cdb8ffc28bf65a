//! Orchestration and lifecycle.
//!
//! Owns the probe manager, the pit controller, the motor driver and the
//! display sink, and runs the single control task: one 250 ms ticker plus
//! the probe event channel, multiplexed so that readings arriving during
//! a tick become visible on the next one.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::controller::{ControlActions, PitController, DO_WORK_PERIOD};
use crate::display::DisplaySink;
use crate::error::Result;
use crate::manager::ProbeManager;
use crate::motor::{self, MotorDriver};
use crate::probe::ProbeEvent;

/// Wires probes to the PID loop and the PID loop to the outputs.
pub struct Orchestrator<M, D> {
    controller: PitController,
    manager: ProbeManager,
    events_rx: mpsc::Receiver<ProbeEvent>,
    motor: M,
    display: D,
    fan_reversed: bool,
}

impl<M: MotorDriver, D: DisplaySink> Orchestrator<M, D> {
    pub fn new(
        controller: PitController,
        manager: ProbeManager,
        events_rx: mpsc::Receiver<ProbeEvent>,
        motor: M,
        display: D,
        fan_reversed: bool,
    ) -> Self {
        Self {
            controller,
            manager,
            events_rx,
            motor,
            display,
            fan_reversed,
        }
    }

    /// Run until a termination signal arrives.
    pub async fn run(mut self) -> Result<()> {
        motor::wait_until_ready(&self.motor).await?;
        self.manager.start().await?;

        let mut ticker = tokio::time::interval(DO_WORK_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Termination signal received");
                    break;
                }
                _ = ticker.tick() => {
                    let actions = self.controller.do_work(Instant::now());
                    if let Err(e) = commit_outputs(
                        &mut self.motor,
                        &mut self.display,
                        actions,
                        self.fan_reversed,
                    )
                    .await
                    {
                        error!("Output commit failed: {e}");
                        let _ = self.shutdown().await;
                        return Err(e);
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                }
            }
        }

        self.shutdown().await
    }

    fn handle_event(&mut self, event: ProbeEvent) {
        match event {
            ProbeEvent::Connected {
                address,
                probe_index,
                firmware,
            } => {
                info!(%address, probe_index, firmware, "probe online");
            }
            ProbeEvent::ConnectFailed(address) => {
                debug!(%address, "probe connect attempt failed");
            }
            ProbeEvent::Update(reading) => {
                self.controller.update_probe(&reading);
            }
            ProbeEvent::Disconnected(address) => {
                info!(%address, "probe offline");
                self.controller.remove_probe(&address);
            }
        }
    }

    /// Ordered shutdown: fan off, probes stopped, resources released.
    async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down");
        self.motor.set_fan(0, self.fan_reversed)?;
        self.manager.stop().await?;
        self.manager.destroy().await?;
        Ok(())
    }
}

/// Commit one tick's outputs in order: fan, then servo, then status.
///
/// An uninitialized driver is given the bounded readiness wait before the
/// first write; failure there is fatal to the call.
async fn commit_outputs<M: MotorDriver, D: DisplaySink>(
    motor: &mut M,
    display: &mut D,
    actions: ControlActions,
    fan_reversed: bool,
) -> Result<()> {
    if (actions.fan.is_some() || actions.servo.is_some()) && !motor.initialized() {
        motor::wait_until_ready(motor).await?;
    }

    if let Some(fan) = actions.fan {
        motor.set_fan(fan, fan_reversed)?;
    }
    if let Some(servo) = actions.servo {
        motor.set_damper(servo)?;
    }
    if let Some(status) = actions.status {
        display.update(&status);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Mode, StatusSnapshot, TempUnit};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
    }

    struct RecordingMotor {
        recorder: Recorder,
    }

    impl MotorDriver for RecordingMotor {
        fn initialized(&self) -> bool {
            true
        }

        fn set_fan(&mut self, speed_pct: u8, _reversed: bool) -> Result<()> {
            self.recorder.log.lock().push(format!("fan:{speed_pct}"));
            Ok(())
        }

        fn set_damper(&mut self, position_pct: u8) -> Result<()> {
            self.recorder.log.lock().push(format!("servo:{position_pct}"));
            Ok(())
        }
    }

    struct RecordingDisplay {
        recorder: Recorder,
    }

    impl DisplaySink for RecordingDisplay {
        fn update(&mut self, _status: &StatusSnapshot) {
            self.recorder.log.lock().push("status".to_string());
        }
    }

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            mode: Mode::Startup,
            num_probes: 1,
            pit_temp: Some(150.0),
            set_point: 225.0,
            unit: TempUnit::Fahrenheit,
            pid_output: 100.0,
            fan_pct: 100,
            servo_pct: 100,
        }
    }

    #[tokio::test]
    async fn test_commit_order_fan_servo_status() {
        let recorder = Recorder::default();
        let mut motor = RecordingMotor {
            recorder: recorder.clone(),
        };
        let mut display = RecordingDisplay {
            recorder: recorder.clone(),
        };

        let actions = ControlActions {
            fan: Some(100),
            servo: Some(80),
            status: Some(snapshot()),
        };
        commit_outputs(&mut motor, &mut display, actions, false)
            .await
            .unwrap();

        assert_eq!(
            *recorder.log.lock(),
            vec!["fan:100", "servo:80", "status"]
        );
    }

    #[tokio::test]
    async fn test_commit_skips_absent_outputs() {
        let recorder = Recorder::default();
        let mut motor = RecordingMotor {
            recorder: recorder.clone(),
        };
        let mut display = RecordingDisplay {
            recorder: recorder.clone(),
        };

        let actions = ControlActions {
            fan: Some(50),
            servo: None,
            status: None,
        };
        commit_outputs(&mut motor, &mut display, actions, false)
            .await
            .unwrap();

        assert_eq!(*recorder.log.lock(), vec!["fan:50"]);
    }
}
