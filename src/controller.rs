//! The pit controller.
//!
//! A discrete-time PID loop driven at 250 ms, with the measurement work
//! running once a second. Probe readings arrive between ticks through
//! [`PitController::update_probe`]; each invocation of
//! [`PitController::do_work`] returns the outputs to commit, so all state
//! lives on the caller's task and the loop is testable without a runtime.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use btleplug::api::BDAddr;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::data::{Mode, ProbeReading, StatusSnapshot, TempUnit};
use crate::fusion;
use crate::output::{FanConditioner, ServoConditioner};

/// Period of the heavy (measurement) tick.
pub const TEMP_MEASURE_PERIOD: Duration = Duration::from_millis(1000);

/// Number of output-adjust sub-steps between measurements.
pub const TEMP_OUTADJUST_CNT: u32 = 3;

/// Period of the work procedure; four invocations per measurement period.
pub const DO_WORK_PERIOD: Duration = Duration::from_millis(
    TEMP_MEASURE_PERIOD.as_millis() as u64 / (TEMP_OUTADJUST_CNT as u64 + 1),
);

/// Smoothing factor of the pit temperature EMA (60-sample window).
const TEMP_EMA_ALPHA: f32 = 2.0 / 61.0;

/// Smoothing factor of the output EMA (240-sample window).
const OUTPUT_EMA_ALPHA: f32 = 2.0 / 241.0;

/// Mixing constant for the proportional-on-measurement variant (P < 0).
const LAMBDA: f32 = 0.4;

/// Minimum seconds a lid event must run before auto-resume.
const LID_RESUME_MIN_SEC: u32 = 30;

/// Lid-open detection is suppressed while the output EMA is above this;
/// a working fan at high duty means the drop is fuel, not the lid.
const OUTPUT_EMA_LID_CEIL: f32 = 90.0;

/// PID gains.
///
/// A negative `P` selects the proportional-on-mixed-error-and-measurement
/// variant with mixing constant [`LAMBDA`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gain.
    #[serde(rename = "P")]
    pub p: f32,
    /// Integral gain.
    #[serde(rename = "I")]
    pub i: f32,
    /// Derivative gain.
    #[serde(rename = "D")]
    pub d: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            p: 2.5,
            i: 0.0035,
            d: 6.0,
        }
    }
}

/// Internal PID state, exposed read-only for status and tests.
#[derive(Debug, Clone, Default)]
pub struct PidState {
    /// Proportional term of the last computation.
    pub p_term: f32,
    /// Accumulated integral term.
    pub i_term: f32,
    /// Derivative term of the last computation.
    pub d_term: f32,
    /// Clamped controller output, 0-100.
    pub output: f32,
    /// Long-window EMA of the output.
    pub output_ema: f32,
    /// EMA of the fused pit temperature; cleared on unit changes.
    pub temp_ema: Option<f32>,
    /// Most recent fused pit temperature.
    pub current_temp: Option<f32>,
}

/// Per-probe state the controller keeps for fusion.
#[derive(Debug, Clone)]
struct ConnectedProbeState {
    /// When the probe last reported.
    #[allow(dead_code)]
    last_timestamp: Instant,
    /// Last ambient reading, in the controller's unit.
    ambient: f32,
}

/// Outputs produced by one invocation of [`PitController::do_work`].
///
/// Within one tick the commit order is fan, then servo, then status; the
/// field order here mirrors that.
#[derive(Debug, Clone, Default)]
pub struct ControlActions {
    /// Fan duty to commit, 0-100.
    pub fan: Option<u8>,
    /// Damper position to commit, 0-100.
    pub servo: Option<u8>,
    /// Status snapshot for the display sink; present on every heavy tick.
    pub status: Option<StatusSnapshot>,
}

/// Closed-loop pit temperature controller.
pub struct PitController {
    set_point: f32,
    unit: TempUnit,
    mode: Mode,
    gains: PidGains,
    pid: PidState,
    probes: HashMap<BDAddr, ConnectedProbeState>,
    fan_min_speed: f32,
    fan_max_speed: f32,
    fan_max_startup_speed: f32,
    fan_active_floor: f32,
    servo_min_pos: f32,
    servo_max_pos: f32,
    lid_open_offset: f32,
    lid_open_duration: u32,
    /// Remaining lid-open countdown in seconds; zero when inactive.
    lid_timer_sec: u32,
    last_heavy: Option<Instant>,
    fan: FanConditioner,
    servo: ServoConditioner,
}

impl PitController {
    /// Build a controller from a validated configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            set_point: config.set_point,
            unit: config.units,
            mode: Mode::Startup,
            gains: config.pid,
            pid: PidState::default(),
            probes: HashMap::new(),
            fan_min_speed: config.fan.min_speed,
            fan_max_speed: config.fan.max_speed,
            fan_max_startup_speed: config.fan.max_startup_speed,
            fan_active_floor: config.fan.on_above,
            servo_min_pos: config.servo.min_position,
            servo_max_pos: config.servo.max_position,
            lid_open_offset: config.lid.lid_open_offset,
            lid_open_duration: config.lid.lid_open_duration,
            lid_timer_sec: 0,
            last_heavy: None,
            fan: FanConditioner::new(),
            servo: ServoConditioner::new(),
        }
    }

    // === Public contract ===

    /// Change the target pit temperature.
    ///
    /// Always returns the machine to `Startup` with zero output and no
    /// pending lid event.
    pub fn set_set_point(&mut self, set_point: f32) {
        self.set_point = set_point;
        self.mode = Mode::Startup;
        self.pid.output = 0.0;
        self.lid_timer_sec = 0;
        info!(set_point, "set-point changed, returning to startup");
    }

    /// Set the mode directly. Zeroes the output and clears the lid timer.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.pid.output = 0.0;
        self.lid_timer_sec = 0;
        info!(%mode, "mode set");
    }

    /// Fix the output by hand; enters `Manual`.
    pub fn set_pid_output(&mut self, value: f32) {
        self.mode = Mode::Manual;
        self.pid.output = value.clamp(0.0, 100.0);
    }

    /// Replace the PID gains.
    pub fn set_pid_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    pub fn set_fan_max_speed(&mut self, pct: f32) {
        self.fan_max_speed = clamp_warn("fan max speed", pct, 0.0, 100.0);
    }

    pub fn set_fan_max_startup_speed(&mut self, pct: f32) {
        self.fan_max_startup_speed = clamp_warn("fan max startup speed", pct, 0.0, 100.0);
    }

    /// The fan remap divides by `100 - floor`, so 99 is the ceiling here.
    pub fn set_fan_active_floor(&mut self, pct: f32) {
        self.fan_active_floor = clamp_warn("fan active floor", pct, 0.0, 99.0);
    }

    pub fn set_fan_min_speed(&mut self, pct: f32) {
        self.fan_min_speed = clamp_warn("fan min speed", pct, 0.0, 100.0);
    }

    pub fn set_servo_min_pos(&mut self, pct: f32) {
        self.servo_min_pos = clamp_warn("servo min position", pct, 0.0, 100.0);
    }

    pub fn set_servo_max_pos(&mut self, pct: f32) {
        self.servo_max_pos = clamp_warn("servo max position", pct, 0.0, 100.0);
    }

    pub fn set_lid_open_offset(&mut self, pct: f32) {
        self.lid_open_offset = clamp_warn("lid open offset", pct, 0.0, 100.0);
    }

    pub fn set_lid_open_duration(&mut self, seconds: u32) {
        if seconds < LID_RESUME_MIN_SEC {
            warn!(seconds, "lid open duration below minimum, clamping to 30");
            self.lid_open_duration = LID_RESUME_MIN_SEC;
        } else {
            self.lid_open_duration = seconds;
        }
    }

    /// Record a probe reading and refresh the fused pit temperature.
    pub fn update_probe(&mut self, reading: &ProbeReading) {
        if reading.unit != self.unit {
            // The temperature EMA is not comparable across units.
            debug!(old = %self.unit, new = %reading.unit, "unit changed, clearing temperature EMA");
            self.unit = reading.unit;
            self.pid.temp_ema = None;
        }

        self.probes.insert(
            reading.address,
            ConnectedProbeState {
                last_timestamp: reading.timestamp,
                ambient: reading.ambient,
            },
        );
        self.refresh_fused();
    }

    /// Drop a probe from the fusion.
    pub fn remove_probe(&mut self, address: &BDAddr) {
        if self.probes.remove(address).is_some() {
            self.refresh_fused();
        }
    }

    // === Introspection ===

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_point(&self) -> f32 {
        self.set_point
    }

    pub fn output(&self) -> f32 {
        self.pid.output
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    /// Read-only view of the PID internals.
    pub fn pid(&self) -> &PidState {
        &self.pid
    }

    // === Control loop ===

    /// Run one work-procedure invocation.
    ///
    /// Call every [`DO_WORK_PERIOD`]. Measurement, PID and the status
    /// snapshot run when a full [`TEMP_MEASURE_PERIOD`] has elapsed since
    /// the previous heavy tick; intermediate invocations only drive the
    /// fan boost/long-PWM sub-steps.
    pub fn do_work(&mut self, now: Instant) -> ControlActions {
        let heavy = match self.last_heavy {
            None => true,
            Some(last) => now.duration_since(last) >= TEMP_MEASURE_PERIOD,
        };

        if heavy {
            self.last_heavy = Some(now);
            self.heavy_tick()
        } else {
            ControlActions {
                fan: self.fan.tick(DO_WORK_PERIOD.as_millis() as u32, false),
                servo: None,
                status: None,
            }
        }
    }

    fn heavy_tick(&mut self) -> ControlActions {
        // 1. Pit temperature EMA.
        if let Some(temp) = self.pid.current_temp {
            let ema = match self.pid.temp_ema {
                Some(prev) => prev + TEMP_EMA_ALPHA * (temp - prev),
                None => temp,
            };
            self.pid.temp_ema = Some(ema);
        }

        // 2. PID, automatic modes only.
        if self.mode.is_automatic() {
            self.compute_pid();
        } else if self.mode == Mode::Off {
            self.pid.output = 0.0;
        }

        // 3. Lid and mode transitions.
        if self.mode.is_automatic() {
            self.evaluate_transitions();
        }

        // 4. Output EMA.
        self.pid.output_ema += OUTPUT_EMA_ALPHA * (self.pid.output - self.pid.output_ema);

        // 5. Commit fan, then servo, then status.
        let max = if self.mode == Mode::Startup {
            self.fan_max_startup_speed
        } else {
            self.fan_max_speed
        };
        self.fan
            .set_target(self.pid.output, self.fan_active_floor, self.fan_min_speed, max);
        let fan = self.fan.tick(DO_WORK_PERIOD.as_millis() as u32, true);
        let servo = self
            .servo
            .commit(self.pid.output, self.servo_min_pos, self.servo_max_pos);
        let status = StatusSnapshot {
            mode: self.mode,
            num_probes: self.probes.len(),
            pit_temp: self.pid.current_temp,
            set_point: self.set_point,
            unit: self.unit,
            pid_output: self.pid.output,
            fan_pct: self.fan.last_pct(),
            servo_pct: self.servo.last_pos(),
        };

        ControlActions {
            fan,
            servo,
            status: Some(status),
        }
    }

    fn compute_pid(&mut self) {
        let temp = match self.pid.current_temp {
            Some(t) => t,
            None => {
                self.pid.output = 0.0;
                return;
            }
        };
        if self.lid_open() {
            self.pid.output = 0.0;
            return;
        }

        let error = self.set_point - temp;

        self.pid.p_term = if self.gains.p >= 0.0 {
            self.gains.p * error
        } else {
            self.gains.p * (temp - LAMBDA * self.set_point)
        };

        let i_max = if self.mode == Mode::Startup {
            self.fan_max_startup_speed
        } else {
            100.0
        };
        let i_max_ext = if self.gains.p < 0.0 {
            i_max + (LAMBDA - 1.0) * self.gains.p * self.set_point
        } else {
            i_max
        };

        // Integrate only while the previous output is not pinned against
        // the relevant bound.
        let prev_output = self.pid.output;
        if (error < 0.0 && prev_output > 0.0) || (error > 0.0 && prev_output < i_max) {
            self.pid.i_term += self.gains.i * error;
        }
        self.pid.i_term = self.pid.i_term.clamp(0.0, i_max_ext.max(0.0));

        // Derivative on measurement.
        self.pid.d_term = match self.pid.temp_ema {
            Some(ema) => self.gains.d * (ema - temp),
            None => 0.0,
        };

        self.pid.output = (self.pid.p_term + self.pid.i_term + self.pid.d_term).clamp(0.0, 100.0);
    }

    fn evaluate_transitions(&mut self) {
        let recovered = self
            .pid
            .current_temp
            .map(|t| self.set_point - t <= 0.0)
            .unwrap_or(false);
        let lid_elapsed = self.lid_open_duration.saturating_sub(self.lid_timer_sec);

        if recovered && lid_elapsed >= LID_RESUME_MIN_SEC {
            if self.mode == Mode::Startup {
                self.pid.i_term /= 2.0;
                info!("set-point reached, leaving startup");
            }
            self.mode = Mode::Normal;
            self.lid_timer_sec = 0;
        } else if self.lid_timer_sec > 0 {
            self.lid_timer_sec -= 1;
            if self.lid_timer_sec == 0 {
                info!("lid-open countdown expired, resuming control");
                self.mode = Mode::Normal;
            }
        } else if self.lid_open_should_activate() {
            self.mode = Mode::Recovery;
            self.lid_timer_sec = self.lid_open_duration;
            info!(
                duration = self.lid_open_duration,
                "lid open detected, suspending control"
            );
        }
    }

    fn lid_open_should_activate(&self) -> bool {
        if self.lid_open_offset <= 0.0 || self.mode != Mode::Normal || self.set_point <= 0.0 {
            return false;
        }
        let Some(temp) = self.pid.current_temp else {
            return false;
        };
        let drop_frac = (self.set_point - temp) / self.set_point;
        drop_frac >= self.lid_open_offset / 100.0 && self.pid.output_ema < OUTPUT_EMA_LID_CEIL
    }

    fn lid_open(&self) -> bool {
        self.lid_timer_sec > 0
    }

    fn refresh_fused(&mut self) {
        let ambients: Vec<f32> = self.probes.values().map(|p| p.ambient).collect();
        self.pid.current_temp = fusion::fuse(&ambients);
    }
}

fn clamp_warn(name: &str, value: f32, min: f32, max: f32) -> f32 {
    if value < min || value > max {
        warn!(name, value, min, max, "value out of range, clamping");
        value.clamp(min, max)
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn controller(set_point: f32) -> PitController {
        let mut config = Config::default();
        config.set_point = set_point;
        PitController::new(&config)
    }

    pub(crate) fn reading(last_octet: u8, ambient: f32, unit: TempUnit) -> ProbeReading {
        ProbeReading {
            address: BDAddr::from([0xB8, 0x1F, 0x5E, 0x00, 0x00, last_octet]),
            probe_index: 1,
            tip: ambient + 10.0,
            ambient,
            unit,
            battery_pct: 80,
            timestamp: Instant::now(),
            firmware: "1_1".to_string(),
        }
    }

    /// Run heavy ticks one second apart, returning the last actions.
    fn run_heavy_ticks(ctl: &mut PitController, start: Instant, count: u32) -> ControlActions {
        let mut last = ControlActions::default();
        for n in 0..count {
            last = ctl.do_work(start + Duration::from_secs(n as u64));
        }
        last
    }

    #[test]
    fn test_fresh_start_cold_pit() {
        let mut ctl = controller(230.0);
        ctl.update_probe(&reading(1, 70.0, TempUnit::Fahrenheit));

        let t0 = Instant::now();
        let actions = ctl.do_work(t0);

        let status = actions.status.expect("heavy tick emits status");
        assert!((status.pid_output - 100.0).abs() < f32::EPSILON);
        assert_eq!(status.mode, Mode::Startup);
        // Boost on the off-to-on edge, mapped speed on the next sub-tick.
        assert_eq!(actions.fan, Some(100));
        assert_eq!(actions.servo, Some(100));

        let next = ctl.do_work(t0 + DO_WORK_PERIOD);
        assert_eq!(next.fan, Some(100)); // startup max is 100
        assert!(next.status.is_none());
        assert!(next.servo.is_none());
    }

    #[test]
    fn test_status_every_heavy_tick_without_probes() {
        let mut ctl = controller(225.0);
        let t0 = Instant::now();

        let actions = ctl.do_work(t0);
        let status = actions.status.expect("status is emitted with no probes");
        assert_eq!(status.pit_temp, None);
        assert_eq!(status.num_probes, 0);
        assert!((status.pid_output - 0.0).abs() < f32::EPSILON);
        assert_eq!(actions.fan, Some(0));

        // Sub-ticks emit no status.
        assert!(ctl.do_work(t0 + DO_WORK_PERIOD).status.is_none());
    }

    #[test]
    fn test_integrator_halved_on_reaching_set_point() {
        let mut ctl = controller(100.0);
        ctl.set_pid_gains(PidGains {
            p: 0.0,
            i: 1.0,
            d: 0.0,
        });
        ctl.update_probe(&reading(1, 60.0, TempUnit::Fahrenheit));

        let t0 = Instant::now();
        ctl.do_work(t0);
        assert!((ctl.pid().i_term - 40.0).abs() < 0.001);
        assert_eq!(ctl.mode(), Mode::Startup);

        // Pit reaches the set-point: mode flips to Normal and the
        // integrator is halved in the same tick.
        ctl.update_probe(&reading(1, 100.0, TempUnit::Fahrenheit));
        ctl.do_work(t0 + Duration::from_secs(1));
        assert_eq!(ctl.mode(), Mode::Normal);
        assert!((ctl.pid().i_term - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_lid_open_detection() {
        let mut ctl = controller(250.0);
        ctl.set_lid_open_offset(20.0);

        // Reach the set-point so the mode is Normal.
        ctl.update_probe(&reading(1, 250.0, TempUnit::Fahrenheit));
        let t0 = Instant::now();
        ctl.do_work(t0);
        assert_eq!(ctl.mode(), Mode::Normal);

        // A 20% drop with a quiet fan is a lid event.
        ctl.update_probe(&reading(1, 200.0, TempUnit::Fahrenheit));
        ctl.do_work(t0 + Duration::from_secs(1));
        assert_eq!(ctl.mode(), Mode::Recovery);

        // While the lid is open, output is forced to zero.
        let actions = ctl.do_work(t0 + Duration::from_secs(2));
        let status = actions.status.unwrap();
        assert!((status.pid_output - 0.0).abs() < f32::EPSILON);
        assert_eq!(status.mode, Mode::Recovery);
    }

    #[test]
    fn test_lid_countdown_expiry_resumes() {
        let mut ctl = controller(250.0);
        ctl.set_lid_open_offset(20.0);
        ctl.set_lid_open_duration(30);

        ctl.update_probe(&reading(1, 250.0, TempUnit::Fahrenheit));
        let t0 = Instant::now();
        ctl.do_work(t0);
        ctl.update_probe(&reading(1, 200.0, TempUnit::Fahrenheit));
        ctl.do_work(t0 + Duration::from_secs(1));
        assert_eq!(ctl.mode(), Mode::Recovery);

        // Pit never recovers; the countdown runs out and control resumes.
        let mut t = t0 + Duration::from_secs(1);
        for _ in 0..30 {
            t += Duration::from_secs(1);
            ctl.do_work(t);
        }
        assert_eq!(ctl.mode(), Mode::Normal);
    }

    #[test]
    fn test_lid_early_resume_after_minimum() {
        let mut ctl = controller(250.0);
        ctl.set_lid_open_offset(20.0);
        ctl.set_lid_open_duration(240);

        ctl.update_probe(&reading(1, 250.0, TempUnit::Fahrenheit));
        let t0 = Instant::now();
        ctl.do_work(t0);
        ctl.update_probe(&reading(1, 200.0, TempUnit::Fahrenheit));
        ctl.do_work(t0 + Duration::from_secs(1));
        assert_eq!(ctl.mode(), Mode::Recovery);

        // Recover the temperature immediately: resume is held back until
        // the lid event is at least 30 s old.
        ctl.update_probe(&reading(1, 255.0, TempUnit::Fahrenheit));
        let mut t = t0 + Duration::from_secs(1);
        for _ in 0..30 {
            t += Duration::from_secs(1);
            ctl.do_work(t);
            assert_eq!(ctl.mode(), Mode::Recovery);
        }
        t += Duration::from_secs(1);
        ctl.do_work(t);
        assert_eq!(ctl.mode(), Mode::Normal);
    }

    #[test]
    fn test_unit_change_zeroes_derivative() {
        let mut ctl = controller(110.0);
        ctl.update_probe(&reading(1, 200.0, TempUnit::Fahrenheit));
        let t0 = Instant::now();
        ctl.do_work(t0);

        // Same pit, new unit: the EMA restarts so the D term is zero.
        ctl.update_probe(&reading(1, 93.0, TempUnit::Celsius));
        ctl.do_work(t0 + Duration::from_secs(1));
        assert!((ctl.pid().d_term - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_set_point_change_returns_to_startup() {
        let mut ctl = controller(225.0);
        ctl.update_probe(&reading(1, 225.0, TempUnit::Fahrenheit));
        let t0 = Instant::now();
        ctl.do_work(t0);
        assert_eq!(ctl.mode(), Mode::Normal);

        ctl.set_set_point(275.0);
        assert_eq!(ctl.mode(), Mode::Startup);
        assert!((ctl.output() - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_manual_mode_holds_output() {
        let mut ctl = controller(225.0);
        ctl.set_pid_output(150.0);
        assert_eq!(ctl.mode(), Mode::Manual);
        assert!((ctl.output() - 100.0).abs() < f32::EPSILON);

        // Reaching the set-point must not yank a manual controller back
        // into the automatic modes.
        ctl.update_probe(&reading(1, 300.0, TempUnit::Fahrenheit));
        let actions = run_heavy_ticks(&mut ctl, Instant::now(), 3);
        assert_eq!(ctl.mode(), Mode::Manual);
        assert!((actions.status.unwrap().pid_output - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_off_mode_forces_zero() {
        let mut ctl = controller(225.0);
        ctl.update_probe(&reading(1, 100.0, TempUnit::Fahrenheit));
        ctl.set_mode(Mode::Off);

        let actions = ctl.do_work(Instant::now());
        assert_eq!(actions.fan, Some(0));
        let status = actions.status.unwrap();
        assert_eq!(status.mode, Mode::Off);
        assert!((status.pid_output - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_remove_probe_updates_fusion() {
        let mut ctl = controller(225.0);
        ctl.update_probe(&reading(1, 220.0, TempUnit::Fahrenheit));
        ctl.update_probe(&reading(2, 224.0, TempUnit::Fahrenheit));
        assert_eq!(ctl.probe_count(), 2);

        let addr = BDAddr::from([0xB8, 0x1F, 0x5E, 0x00, 0x00, 1]);
        ctl.remove_probe(&addr);
        assert_eq!(ctl.probe_count(), 1);
        assert_eq!(ctl.pid().current_temp, Some(224.0));

        ctl.remove_probe(&BDAddr::from([0xB8, 0x1F, 0x5E, 0x00, 0x00, 2]));
        assert_eq!(ctl.pid().current_temp, None);
    }

    #[test]
    fn test_setter_clamping() {
        let mut ctl = controller(225.0);
        ctl.set_fan_active_floor(150.0);
        assert!((ctl.fan_active_floor - 99.0).abs() < f32::EPSILON);
        ctl.set_lid_open_duration(10);
        assert_eq!(ctl.lid_open_duration, 30);
        ctl.set_fan_max_speed(-20.0);
        assert!((ctl.fan_max_speed - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_negative_p_extends_integrator_bound() {
        let mut ctl = controller(100.0);
        ctl.set_pid_gains(PidGains {
            p: -2.0,
            i: 10.0,
            d: 0.0,
        });
        ctl.update_probe(&reading(1, 50.0, TempUnit::Fahrenheit));

        // Extended bound: 100 + (0.4 - 1.0) * -2.0 * 100 = 220.
        let t0 = Instant::now();
        run_heavy_ticks(&mut ctl, t0, 10);
        assert!(ctl.pid().i_term <= 220.0 + 0.001);
        assert!(ctl.pid().i_term > 100.0);
    }

    #[test]
    fn test_mixed_proportional_variant() {
        let mut ctl = controller(100.0);
        ctl.set_pid_gains(PidGains {
            p: -2.0,
            i: 0.0,
            d: 0.0,
        });
        ctl.update_probe(&reading(1, 30.0, TempUnit::Fahrenheit));
        ctl.do_work(Instant::now());
        // p = P * (temp - lambda * set_point) = -2 * (30 - 40) = 20.
        assert!((ctl.pid().p_term - 20.0).abs() < 0.001);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::config::Config;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn output_and_commits_always_in_range(
            set_point in 50.0f32..450.0,
            temps in proptest::collection::vec(0.0f32..600.0, 1..40),
            p in -5.0f32..5.0,
            i in 0.0f32..0.1,
            d in 0.0f32..10.0,
        ) {
            let mut config = Config::default();
            config.set_point = set_point;
            let mut ctl = PitController::new(&config);
            ctl.set_pid_gains(PidGains { p, i, d });

            let t0 = Instant::now();
            for (n, temp) in temps.iter().enumerate() {
                ctl.update_probe(&super::tests::reading(1, *temp, TempUnit::Fahrenheit));
                let actions = ctl.do_work(t0 + Duration::from_secs(n as u64));
                let status = actions.status.expect("heavy tick emits status");
                prop_assert!((0.0..=100.0).contains(&status.pid_output));
                prop_assert!(status.fan_pct <= 100);
                prop_assert!(status.servo_pct <= 100);
                if let Some(fan) = actions.fan {
                    prop_assert!(fan <= 100);
                }
                if let Some(servo) = actions.servo {
                    prop_assert!(servo <= 100);
                }
            }
        }
    }
}
