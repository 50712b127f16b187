// Simple plants for running the loop without hardware
//
// The actuator plant inverts the feedforward model: applied effort minus
// friction, gravity and back-EMF accelerates the carriage through kA, and
// travel ends at hard stops. The base plant integrates a commanded translation
// into a field pose.

use crate::config::{FeedforwardModel, TravelLimits};
use crate::control::ActuatorState;
use crate::drive::{Pose2d, Translation2d};
use crate::messages::{ActuatorReading, BaseState};

#[derive(Debug, Clone)]
pub struct ActuatorPlant {
    model: FeedforwardModel,
    stops: TravelLimits,
    /// Constant effort opposing motion from an unmodeled load (volts)
    disturbance: f64,
    state: ActuatorState,
}

impl ActuatorPlant {
    pub fn new(model: FeedforwardModel, stops: TravelLimits, position: f64) -> Self {
        Self {
            model,
            stops,
            disturbance: 0.0,
            state: ActuatorState::new(stops.clamp(position), 0.0),
        }
    }

    /// Add a constant load the controller's model doesn't know about
    pub fn with_disturbance(mut self, volts: f64) -> Self {
        self.disturbance = volts;
        self
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn reading(&self) -> ActuatorReading {
        ActuatorReading {
            position: self.state.position,
            velocity: self.state.velocity,
        }
    }

    /// Advance by `dt` seconds under `effort` volts
    pub fn step(&mut self, effort: f64, dt: f64) -> ActuatorState {
        let v = self.state.velocity;
        let friction = if v == 0.0 {
            0.0
        } else {
            self.model.ks * v.signum()
        };
        let net = effort - friction - self.model.kg - self.disturbance - self.model.kv * v;

        // Semi-implicit Euler; with kA = 0 the carriage follows the effort at once
        let velocity = if self.model.ka > 0.0 {
            v + net / self.model.ka * dt
        } else if self.model.kv > 0.0 {
            (effort - self.model.kg - self.disturbance) / self.model.kv
        } else {
            v
        };
        let mut position = self.state.position + velocity * dt;
        let mut velocity = velocity;

        if position <= self.stops.min {
            position = self.stops.min;
            velocity = velocity.max(0.0);
        } else if position >= self.stops.max {
            position = self.stops.max;
            velocity = velocity.min(0.0);
        }

        self.state = ActuatorState::new(position, velocity);
        self.state
    }
}

/// Chassis that reaches the commanded field velocity immediately
#[derive(Debug, Clone, Default)]
pub struct BasePlant {
    velocity: Translation2d,
    pose: Pose2d,
}

impl BasePlant {
    /// Apply a field velocity and rotation rate (rad/s) for `dt` seconds
    pub fn step(&mut self, velocity: Translation2d, theta_vel: f64, dt: f64) {
        self.velocity = velocity;
        self.pose.x += velocity.x * dt;
        self.pose.y += velocity.y * dt;
        self.pose.heading += theta_vel * dt;
    }

    pub fn state(&self) -> BaseState {
        BaseState {
            x_vel: self.velocity.x,
            y_vel: self.velocity.y,
            x: self.pose.x,
            y: self.pose.y,
            heading: self.pose.heading,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn plant() -> ActuatorPlant {
        ActuatorPlant::new(
            FeedforwardModel::default(),
            TravelLimits { min: 0.0, max: 1.0 },
            0.5,
        )
    }

    #[test]
    fn test_gravity_effort_holds_still() {
        let mut p = plant();
        for _ in 0..50 {
            p.step(FeedforwardModel::default().kg, 0.02);
        }
        assert_abs_diff_eq!(p.state().position, 0.5);
        assert_abs_diff_eq!(p.state().velocity, 0.0);
    }

    #[test]
    fn test_zero_effort_falls_to_stop() {
        let mut p = plant();
        for _ in 0..500 {
            p.step(0.0, 0.02);
        }
        assert_eq!(p.state().position, 0.0);
        assert_eq!(p.state().velocity, 0.0);
    }

    #[test]
    fn test_positive_effort_rises() {
        let mut p = plant();
        p.step(5.0, 0.02);
        assert!(p.state().velocity > 0.0);
        assert!(p.state().position > 0.5);
    }

    #[test]
    fn test_base_plant_integrates() {
        let mut base = BasePlant::default();
        base.step(Translation2d::new(1.0, 0.5), 0.1, 2.0);
        let state = base.state();
        assert_abs_diff_eq!(state.x, 2.0);
        assert_abs_diff_eq!(state.y, 1.0);
        assert_abs_diff_eq!(state.heading, 0.2);
        assert_eq!(state.x_vel, 1.0);
    }
}
