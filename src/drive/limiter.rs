// Tip-over velocity limiter
//
// Scales a requested chassis translation so the acceleration needed to reach
// it within one loop stays under the static tip-over bound. The center of mass
// stays over the support footprint while |a| <= g * (edge distance) / height.

use crate::config::{ConfigError, DriveConfig, VehicleDynamicsModel};

use super::geometry::{Pose2d, Translation2d};

/// Gravitational acceleration (m/s^2)
pub const GRAVITY: f64 = 9.81;

/// Validated [`VehicleDynamicsModel`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleDynamics {
    model: VehicleDynamicsModel,
}

impl VehicleDynamics {
    pub fn new(model: VehicleDynamicsModel) -> Result<Self, ConfigError> {
        model.validate()?;
        Ok(Self { model })
    }

    pub fn model(&self) -> VehicleDynamicsModel {
        self.model
    }

    /// Sideways acceleration at which the chassis starts to tip
    pub fn max_lateral_acceleration(&self) -> f64 {
        GRAVITY * self.model.half_track / self.model.center_of_mass_height
    }

    /// Front-to-back tip-over bound, when the wheelbase is known
    pub fn max_longitudinal_acceleration(&self) -> Option<f64> {
        self.model
            .half_wheelbase
            .map(|half_wheelbase| GRAVITY * half_wheelbase / self.model.center_of_mass_height)
    }

    /// Tip-over bound for an acceleration along `direction` (robot frame).
    ///
    /// Without a wheelbase the footprint is treated as a circle of radius
    /// `half_track`. With one it is a rectangle, and the bound is set by
    /// whichever edge the zero-moment point reaches first.
    pub fn max_acceleration_toward(&self, direction: Translation2d) -> f64 {
        let lateral = self.max_lateral_acceleration();
        let Some(longitudinal) = self.max_longitudinal_acceleration() else {
            return lateral;
        };
        let norm = direction.norm();
        if norm == 0.0 || !norm.is_finite() {
            return lateral.min(longitudinal);
        }

        let ux = (direction.x / norm).abs();
        let uy = (direction.y / norm).abs();
        let along_x = if ux > 0.0 { longitudinal / ux } else { f64::INFINITY };
        let along_y = if uy > 0.0 { lateral / uy } else { f64::INFINITY };
        along_x.min(along_y)
    }
}

/// Limit `requested` (field frame, m/s) so reaching it from `current_velocity`
/// within `loop_time` seconds does not exceed the tip-over bound.
///
/// The result is always `requested` scaled by a non-negative factor, so its
/// direction is preserved. Returns `requested` unchanged when there is nothing
/// to limit against: no current velocity, a zero or invalid loop time, or a
/// zero request. A non-finite request yields zero.
pub fn limit_velocity(
    requested: Translation2d,
    current_velocity: Option<Translation2d>,
    current_pose: &Pose2d,
    dynamics: &VehicleDynamics,
    loop_time: f64,
) -> Translation2d {
    if !requested.is_finite() {
        return Translation2d::zero();
    }
    let Some(current) = current_velocity.filter(Translation2d::is_finite) else {
        return requested;
    };
    if !loop_time.is_finite() || loop_time <= 0.0 {
        return requested;
    }
    if requested.dot(requested) == 0.0 {
        return requested;
    }

    let pose = if current_pose.heading.is_finite() {
        *current_pose
    } else {
        Pose2d::default()
    };
    let delta = requested - current;
    let max_delta = dynamics.max_acceleration_toward(pose.to_robot_frame(delta)) * loop_time;
    if delta.norm() <= max_delta {
        return requested;
    }

    let k = match dynamics.max_longitudinal_acceleration() {
        None => circle_scale(requested, current, max_delta),
        Some(longitudinal) => rectangle_scale(
            pose.to_robot_frame(requested),
            pose.to_robot_frame(current),
            Translation2d::new(longitudinal, dynamics.max_lateral_acceleration()) * loop_time,
        ),
    };

    requested * k
}

/// Non-negative `k` with |k * r - c| <= max_delta
fn circle_scale(r: Translation2d, c: Translation2d, max_delta: f64) -> f64 {
    // |k * r - c| = max_delta is a quadratic in k
    let r_sq = r.dot(r);
    let along = r.dot(c);
    let discriminant = along * along - r_sq * (c.dot(c) - max_delta * max_delta);

    if discriminant >= 0.0 {
        let root = discriminant.sqrt();
        let k_low = (along - root) / r_sq;
        let k_high = (along + root) / r_sq;
        if k_high < 0.0 {
            // Only reversing would be feasible; stop pushing instead
            0.0
        } else if k_high < 1.0 {
            k_high
        } else {
            // Slowing down harder than the bound allows: ease off
            k_low.max(0.0)
        }
    } else {
        // Nothing along this direction is reachable; get as close as possible
        (along / r_sq).max(0.0)
    }
}

/// Non-negative `k` keeping each robot-frame component of `k * r - c` within
/// `limits`. When no such `k` exists, the one with the smallest worst-axis
/// overshoot.
fn rectangle_scale(r: Translation2d, c: Translation2d, limits: Translation2d) -> f64 {
    let mut low = 0.0_f64;
    let mut high = f64::INFINITY;
    let mut feasible = true;
    for (r, c, limit) in [(r.x, c.x, limits.x), (r.y, c.y, limits.y)] {
        if r == 0.0 {
            feasible &= c.abs() <= limit;
        } else {
            let a = (c - limit) / r;
            let b = (c + limit) / r;
            low = low.max(a.min(b));
            high = high.min(a.max(b));
        }
    }
    if feasible && low <= high {
        return if high < 1.0 {
            high
        } else if low > 1.0 {
            low
        } else {
            1.0
        };
    }

    // Worst-axis overshoot is convex and piecewise linear in k, so its minimum
    // over k >= 0 sits at zero, at an axis zero, or where the two axes cross
    let (px, py) = (r.x / limits.x, r.y / limits.y);
    let (qx, qy) = (c.x / limits.x, c.y / limits.y);
    let overshoot = |k: f64| (k * px - qx).abs().max((k * py - qy).abs());
    let candidates = [
        Some(0.0),
        (px != 0.0).then(|| qx / px),
        (py != 0.0).then(|| qy / py),
        (px != py).then(|| (qx - qy) / (px - py)),
        (px != -py).then(|| (qx + qy) / (px + py)),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter(|k| k.is_finite() && *k >= 0.0)
        .fold((0.0, overshoot(0.0)), |best, k| {
            let value = overshoot(k);
            if value < best.1 { (k, value) } else { best }
        })
        .0
}

/// [`limit_velocity`] bound to one vehicle and loop time
#[derive(Debug, Clone, Copy)]
pub struct VelocityLimiter {
    dynamics: VehicleDynamics,
    loop_time: f64,
}

impl VelocityLimiter {
    pub fn new(config: &DriveConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            dynamics: VehicleDynamics::new(config.dynamics)?,
            loop_time: config.loop_time,
        })
    }

    pub fn dynamics(&self) -> &VehicleDynamics {
        &self.dynamics
    }

    pub fn loop_time(&self) -> f64 {
        self.loop_time
    }

    pub fn limit(
        &self,
        requested: Translation2d,
        current_velocity: Option<Translation2d>,
        current_pose: &Pose2d,
    ) -> Translation2d {
        limit_velocity(
            requested,
            current_velocity,
            current_pose,
            &self.dynamics,
            self.loop_time,
        )
    }
}
