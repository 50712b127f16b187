// Trapezoidal motion profile
//
// Velocity ramps at max acceleration up to a cruise speed, holds, then ramps
// down so the goal is reached with the goal velocity. The profile is
// stateless: every call plans from the given initial state, so replanning
// mid-motion is just calling it with the last setpoint.

use serde::{Deserialize, Serialize};

use crate::config::MotionConstraints;

/// Position and velocity at one instant of a profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileState {
    pub position: f64,
    pub velocity: f64,
}

impl ProfileState {
    pub fn new(position: f64, velocity: f64) -> Self {
        Self { position, velocity }
    }

    pub fn at_rest(position: f64) -> Self {
        Self::new(position, 0.0)
    }

    fn scaled(self, direction: f64) -> Self {
        Self::new(self.position * direction, self.velocity * direction)
    }
}

/// Trapezoidal profile bounded by [`MotionConstraints`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrapezoidProfile {
    constraints: MotionConstraints,
}

impl TrapezoidProfile {
    pub fn new(constraints: MotionConstraints) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> MotionConstraints {
        self.constraints
    }

    /// State `t` seconds after `initial` on the way to `goal`
    pub fn calculate(&self, t: f64, initial: ProfileState, goal: ProfileState) -> ProfileState {
        let max_v = self.constraints.max_velocity;
        let max_a = self.constraints.max_acceleration;

        // Plan in a frame where the goal lies ahead
        let direction = if initial.position > goal.position {
            -1.0
        } else {
            1.0
        };
        let mut current = initial.scaled(direction);
        let goal = goal.scaled(direction);
        current.velocity = current.velocity.min(max_v);

        // Distances the ramps would cover if extended down to zero speed
        let cutoff_begin = current.velocity / max_a;
        let cutoff_dist_begin = cutoff_begin * cutoff_begin * max_a / 2.0;
        let cutoff_end = goal.velocity / max_a;
        let cutoff_dist_end = cutoff_end * cutoff_end * max_a / 2.0;

        let full_trapezoid_dist =
            cutoff_dist_begin + (goal.position - current.position) + cutoff_dist_end;
        let mut acceleration_time = max_v / max_a;
        let mut full_speed_dist = full_trapezoid_dist - acceleration_time * acceleration_time * max_a;

        // Triangle profile: never reaches cruise speed
        if full_speed_dist < 0.0 {
            acceleration_time = (full_trapezoid_dist / max_a).max(0.0).sqrt();
            full_speed_dist = 0.0;
        }

        let end_accel = acceleration_time - cutoff_begin;
        let end_full_speed = end_accel + full_speed_dist / max_v;
        let end_decel = end_full_speed + acceleration_time - cutoff_end;

        let mut result = current;
        if t < end_accel {
            result.velocity += t * max_a;
            result.position += (current.velocity + t * max_a / 2.0) * t;
        } else if t < end_full_speed {
            result.velocity = max_v;
            result.position +=
                (current.velocity + end_accel * max_a / 2.0) * end_accel + max_v * (t - end_accel);
        } else if t <= end_decel {
            let time_left = end_decel - t;
            result.velocity = goal.velocity + time_left * max_a;
            result.position = goal.position - (goal.velocity + time_left * max_a / 2.0) * time_left;
        } else {
            result = goal;
        }

        result.scaled(direction)
    }

    /// True once `state` sits on `goal`
    pub fn is_finished(&self, state: ProfileState, goal: ProfileState) -> bool {
        state == goal
    }
}
