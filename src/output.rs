//! Output conditioning for the blower fan and the damper servo.
//!
//! The raw PID output is not fit to drive the hardware directly: the fan
//! stalls below a minimum speed and wears out if toggled too often, and
//! the servo chatters on sub-degree corrections. The conditioners here
//! sit between the PID and the motor driver.

/// Length of one long-pulse PWM window in milliseconds.
pub const LONG_PWM_WINDOW_MS: u32 = 10_000;

/// Smallest servo move, in percent, emitted without hold-off pressure.
pub const SERVO_MIN_THRESH: u8 = 5;

/// Number of suppressed ticks after which a small servo move is emitted
/// anyway.
pub const SERVO_MAX_HOLDOFF: u32 = 10;

/// PID output percentage at which the damper is fully open.
pub const SERVO_ACTIVE_CEIL: f32 = 100.0;

/// Conditions the PID output into fan duty commands.
///
/// Applies the active floor, re-maps the remaining range onto the current
/// speed ceiling, emulates sub-minimum speeds with long-pulse PWM over a
/// 10 s window, and boosts to 100% for one sub-tick on every off-to-on
/// edge to break static friction.
#[derive(Debug)]
pub struct FanConditioner {
    /// Last duty actually emitted.
    last_pct: u8,
    /// Value to emit on the sub-tick following a boost.
    settle: Option<u8>,
    /// Plain target duty when not pulsing.
    target: u8,
    /// Whether long-pulse PWM is active.
    pulsing: bool,
    /// Duty used during the on-phase of a pulse window.
    pulse_speed: u8,
    /// On-phase length of the current pulse window.
    on_ms: u32,
    /// Elapsed time in the current pulse window.
    window_ms: u32,
}

impl FanConditioner {
    pub fn new() -> Self {
        Self {
            last_pct: 0,
            settle: None,
            target: 0,
            pulsing: false,
            pulse_speed: 0,
            on_ms: 0,
            window_ms: 0,
        }
    }

    /// Last duty emitted, for status reporting.
    pub fn last_pct(&self) -> u8 {
        self.last_pct
    }

    /// Re-target the conditioner from a fresh PID output.
    ///
    /// Called once per heavy tick. `floor` is the active floor (0-99),
    /// `min_speed` the lowest sustainable fan speed, and `max_speed` the
    /// ceiling for the current mode.
    pub fn set_target(&mut self, pid_output: f32, floor: f32, min_speed: f32, max_speed: f32) {
        let mapped = if pid_output < floor {
            0.0
        } else {
            (pid_output - floor) / (100.0 - floor) * max_speed
        };

        if mapped > 0.0 && mapped < min_speed {
            let was_pulsing = self.pulsing;
            self.pulsing = true;
            self.pulse_speed = min_speed.round() as u8;
            self.on_ms = (LONG_PWM_WINDOW_MS as f32 * mapped / min_speed) as u32;
            if !was_pulsing {
                self.window_ms = 0;
            }
        } else {
            self.pulsing = false;
            self.target = mapped.round().clamp(0.0, 100.0) as u8;
        }
    }

    /// Advance one sub-tick and return the duty to emit, if any.
    ///
    /// `step_ms` is the sub-tick period; `emit_always` forces an emission
    /// even when the duty is unchanged (set on heavy ticks so every
    /// status snapshot is preceded by a fan commit). At most one value is
    /// returned per call.
    pub fn tick(&mut self, step_ms: u32, emit_always: bool) -> Option<u8> {
        let desired = if self.pulsing {
            if self.window_ms < self.on_ms {
                self.pulse_speed
            } else {
                0
            }
        } else {
            self.target
        };

        if self.pulsing {
            self.window_ms += step_ms;
            if self.window_ms >= LONG_PWM_WINDOW_MS {
                self.window_ms = 0;
            }
        }

        if let Some(value) = self.settle.take() {
            self.last_pct = value;
            return Some(value);
        }

        if desired == self.last_pct && !emit_always {
            return None;
        }

        if self.last_pct == 0 && desired > 0 {
            // Boost: one full-duty period, the real value follows.
            self.settle = Some(desired);
            self.last_pct = 100;
            return Some(100);
        }

        self.last_pct = desired;
        Some(desired)
    }
}

impl Default for FanConditioner {
    fn default() -> Self {
        Self::new()
    }
}

/// Conditions the PID output into damper servo positions.
///
/// Maps the output linearly into the configured position range and
/// suppresses moves smaller than [`SERVO_MIN_THRESH`] until
/// [`SERVO_MAX_HOLDOFF`] ticks of pressure have accumulated.
#[derive(Debug)]
pub struct ServoConditioner {
    /// Last position actually emitted.
    last_pos: u8,
    /// Consecutive ticks since the last emission.
    holdoff: u32,
}

impl ServoConditioner {
    pub fn new() -> Self {
        Self {
            last_pos: 0,
            // Saturated so the very first commit always emits.
            holdoff: SERVO_MAX_HOLDOFF,
        }
    }

    /// Last position emitted, for status reporting.
    pub fn last_pos(&self) -> u8 {
        self.last_pos
    }

    /// Compute the position for a PID output and decide whether to emit.
    ///
    /// Called once per heavy tick.
    pub fn commit(&mut self, pid_output: f32, min_pos: f32, max_pos: f32) -> Option<u8> {
        let open_frac = (pid_output / SERVO_ACTIVE_CEIL).clamp(0.0, 1.0);
        let pos = (min_pos + open_frac * (max_pos - min_pos))
            .round()
            .clamp(0.0, 100.0) as u8;

        self.holdoff += 1;

        let delta = (pos as i16 - self.last_pos as i16).unsigned_abs();
        if delta > SERVO_MIN_THRESH as u16 || self.holdoff > SERVO_MAX_HOLDOFF {
            self.last_pos = pos;
            self.holdoff = 0;
            Some(pos)
        } else {
            None
        }
    }
}

impl Default for ServoConditioner {
    fn default() -> Self {
        Self::new()
    }
}
