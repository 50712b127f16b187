// PID feedback on position error
//
// The integrator is stored as its contribution in volts so that the
// anti-windup clamp is expressed in output units.

use crate::config::{ConfigError, PidGains};

/// PID controller with a resettable, clamped integrator
#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,

    /// Integral contribution (volts)
    integral: f64,
    /// Error seen on the previous update (for the derivative term)
    prev_error: f64,

    first_update: bool,
}

impl Pid {
    pub fn new(gains: PidGains) -> Result<Self, ConfigError> {
        gains.validate()?;
        Ok(Self {
            gains,
            integral: 0.0,
            prev_error: 0.0,
            first_update: true,
        })
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Current integral contribution (volts)
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Clear integrator and derivative history
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.first_update = true;
    }

    /// Feedback output for `setpoint - measurement` over a step of `dt` seconds.
    ///
    /// The derivative term is skipped on the first update after a reset so a
    /// fresh controller does not kick on the initial error.
    pub fn update(&mut self, setpoint: f64, measurement: f64, dt: f64) -> f64 {
        let error = setpoint - measurement;

        let p = self.gains.kp * error;

        let limit = self.gains.integral_limit;
        self.integral = (self.integral + self.gains.ki * error * dt).clamp(-limit, limit);

        let d = if self.first_update {
            self.first_update = false;
            0.0
        } else {
            self.gains.kd * (error - self.prev_error) / dt
        };
        self.prev_error = error;

        p + self.integral + d
    }
}
