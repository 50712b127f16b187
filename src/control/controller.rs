// Profiled closed-loop controller for a single actuator
//
// Each update advances a trapezoidal profile from the last commanded setpoint
// toward the goal, then combines PID feedback on the setpoint error with model
// feedforward.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ActuatorConfig, ConfigError};

use super::feedforward::Feedforward;
use super::pid::Pid;
use super::profile::{ProfileState, TrapezoidProfile};

/// Measured state of the actuator for one cycle (SI units)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub position: f64,
    pub velocity: f64,
}

impl ActuatorState {
    pub fn new(position: f64, velocity: f64) -> Self {
        Self { position, velocity }
    }

    /// True if the measured position is within `tolerance` of `target`
    pub fn is_near(&self, target: f64, tolerance: f64) -> bool {
        (self.position - target).abs() <= tolerance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerMode {
    /// No goal; output is zero.
    Idle,
    /// Following the profile toward the goal.
    Tracking,
    /// Setpoint has settled on the goal; feedback keeps holding.
    AtGoal,
}

/// Why a cycle produced no effort.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorFault {
    NotFinite,
    OutOfTravel { position: f64 },
    InvalidTimestep { dt: f64 },
}

/// Result of one control step, with the intermediate terms for telemetry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlOutput {
    /// Bounded effort (volts) for the actuator driver
    pub effort: f64,
    pub feedback: f64,
    pub feedforward: f64,
    pub setpoint: Option<ProfileState>,
    pub acceleration: f64,
    pub mode: ControllerMode,
    pub fault: Option<SensorFault>,
}

impl ControlOutput {
    fn zero(mode: ControllerMode, setpoint: Option<ProfileState>, fault: Option<SensorFault>) -> Self {
        Self {
            effort: 0.0,
            feedback: 0.0,
            feedforward: 0.0,
            setpoint,
            acceleration: 0.0,
            mode,
            fault,
        }
    }
}

/// Trapezoidal profile, PID and feedforward for one actuator.
///
/// ```no_run
/// # use mech_motion_runtime::config::ActuatorConfig;
/// # use mech_motion_runtime::control::{ActuatorState, ProfiledActuatorController};
/// # fn read_sensor() -> ActuatorState { ActuatorState::new(0.0, 0.0) }
/// # fn apply(_: f64) {}
/// let mut controller = ProfiledActuatorController::new(ActuatorConfig::default())?;
/// loop {
///     let out = controller.compute(read_sensor(), 1.2, 0.02);
///     apply(out.effort);
/// }
/// # Ok::<(), mech_motion_runtime::config::ConfigError>(())
/// ```
pub struct ProfiledActuatorController {
    config: ActuatorConfig,
    profile: TrapezoidProfile,
    pid: Pid,
    feedforward: Feedforward,
    mode: ControllerMode,
    goal: Option<f64>,
    /// Last commanded setpoint; seeded from the measurement on first use
    setpoint: Option<ProfileState>,
    faulted: bool,
}

impl ProfiledActuatorController {
    /// Build a controller, rejecting invalid tuning
    pub fn new(config: ActuatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            profile: TrapezoidProfile::new(config.constraints),
            pid: Pid::new(config.pid)?,
            feedforward: Feedforward::new(config.feedforward),
            config,
            mode: ControllerMode::Idle,
            goal: None,
            setpoint: None,
            faulted: false,
        })
    }

    pub fn config(&self) -> &ActuatorConfig {
        &self.config
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    pub fn goal(&self) -> Option<f64> {
        self.goal
    }

    pub fn setpoint(&self) -> Option<ProfileState> {
        self.setpoint
    }

    /// Integral contribution currently held by the feedback loop (volts)
    pub fn integral(&self) -> f64 {
        self.pid.integral()
    }

    pub fn is_at_goal(&self) -> bool {
        self.mode == ControllerMode::AtGoal
    }

    /// Set the goal position, clamped to the travel range.
    ///
    /// The profile replans from the current setpoint on the next update. A jump
    /// larger than the reset tolerance clears the integrator. Non-finite goals
    /// are ignored.
    pub fn set_goal(&mut self, goal: f64) {
        if !goal.is_finite() {
            warn!("Ignoring non-finite goal {}", goal);
            return;
        }
        let goal = self.config.travel.clamp(goal);

        match self.goal {
            Some(previous) if previous == goal => return,
            Some(previous) if (goal - previous).abs() <= self.config.integral_reset_tolerance => {
                debug!("Goal nudged {} -> {}", previous, goal);
            }
            Some(previous) => {
                debug!("Goal changed {} -> {}, resetting integrator", previous, goal);
                self.pid.reset();
            }
            None => {
                debug!("Goal set to {}", goal);
                self.pid.reset();
            }
        }

        self.goal = Some(goal);
        self.mode = ControllerMode::Tracking;
    }

    /// Drop the goal and go idle with zero output
    pub fn stop(&mut self) {
        if self.mode != ControllerMode::Idle {
            info!("Actuator controller stopped");
        }
        self.mode = ControllerMode::Idle;
        self.goal = None;
        self.setpoint = None;
        self.pid.reset();
    }

    /// Re-seed the profile from a measurement, keeping the goal
    pub fn reset(&mut self, measurement: ActuatorState) {
        if !measurement.position.is_finite() || !measurement.velocity.is_finite() {
            warn!("Ignoring reset to non-finite measurement");
            return;
        }
        self.setpoint = Some(self.seed(measurement));
        self.pid.reset();
    }

    /// Set the goal and run one step
    pub fn compute(&mut self, current: ActuatorState, goal: f64, dt: f64) -> ControlOutput {
        self.set_goal(goal);
        self.update(current, dt)
    }

    /// Run one step toward the current goal
    pub fn update(&mut self, current: ActuatorState, dt: f64) -> ControlOutput {
        let Some(goal) = self.goal else {
            return ControlOutput::zero(ControllerMode::Idle, None, None);
        };

        if let Some(fault) = self.check(current, dt) {
            if !self.faulted {
                warn!("Actuator reading rejected ({:?}), holding setpoint", fault);
            }
            self.faulted = true;
            return ControlOutput::zero(self.mode, self.setpoint, Some(fault));
        }
        if self.faulted {
            info!("Actuator readings valid again, resuming");
            self.faulted = false;
        }

        let previous = match self.setpoint {
            Some(setpoint) => setpoint,
            None => self.seed(current),
        };
        let target = ProfileState::at_rest(goal);
        let next = self.clamp_to_travel(self.profile.calculate(dt, previous, target));
        let acceleration = (next.velocity - previous.velocity) / dt;
        self.setpoint = Some(next);

        let feedback = self.pid.update(next.position, current.position, dt);
        let feedforward = self
            .feedforward
            .calculate(next.position, next.velocity, acceleration);

        let limit = self.config.effort_limit;
        let raw = feedback + feedforward;
        let effort = if raw.is_nan() { 0.0 } else { raw.clamp(-limit, limit) };

        let settled = (next.position - goal).abs() <= self.config.goal_tolerance
            && next.velocity.abs() <= self.config.constraints.max_acceleration * dt;
        let mode = if settled {
            ControllerMode::AtGoal
        } else {
            ControllerMode::Tracking
        };
        if mode == ControllerMode::AtGoal && self.mode != ControllerMode::AtGoal {
            info!("Actuator setpoint reached goal {}", goal);
        }
        self.mode = mode;

        ControlOutput {
            effort,
            feedback,
            feedforward,
            setpoint: Some(next),
            acceleration,
            mode,
            fault: None,
        }
    }

    fn check(&self, current: ActuatorState, dt: f64) -> Option<SensorFault> {
        if !dt.is_finite() || dt <= 0.0 {
            return Some(SensorFault::InvalidTimestep { dt });
        }
        if !current.position.is_finite() || !current.velocity.is_finite() {
            return Some(SensorFault::NotFinite);
        }
        let travel = self.config.travel;
        let margin = self.config.sensor_margin;
        if current.position < travel.min - margin || current.position > travel.max + margin {
            return Some(SensorFault::OutOfTravel {
                position: current.position,
            });
        }
        None
    }

    fn seed(&self, measurement: ActuatorState) -> ProfileState {
        let max_v = self.config.constraints.max_velocity;
        ProfileState::new(
            self.config.travel.clamp(measurement.position),
            measurement.velocity.clamp(-max_v, max_v),
        )
    }

    // The setpoint never leaves the travel range, so feedback near a stop
    // always points back inside and cannot wind up against it.
    fn clamp_to_travel(&self, mut state: ProfileState) -> ProfileState {
        let travel = self.config.travel;
        if state.position >= travel.max {
            state.position = travel.max;
            state.velocity = state.velocity.min(0.0);
        } else if state.position <= travel.min {
            state.position = travel.min;
            state.velocity = state.velocity.max(0.0);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::config::{MotionConstraints, PidGains};

    const DT: f64 = 0.02;

    fn config() -> ActuatorConfig {
        ActuatorConfig {
            constraints: MotionConstraints::new(1.0, 2.0).unwrap(),
            pid: PidGains {
                kp: 20.0,
                ki: 5.0,
                kd: 0.5,
                integral_limit: 2.0,
            },
            ..ActuatorConfig::default()
        }
    }

    fn controller() -> ProfiledActuatorController {
        ProfiledActuatorController::new(config()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut bad = config();
        bad.constraints.max_velocity = 0.0;
        assert!(ProfiledActuatorController::new(bad).is_err());

        let mut bad = config();
        bad.effort_limit = -1.0;
        assert!(ProfiledActuatorController::new(bad).is_err());
    }

    #[test]
    fn test_idle_outputs_zero() {
        let mut c = controller();
        let out = c.update(ActuatorState::new(0.5, 0.0), DT);
        assert_eq!(out.effort, 0.0);
        assert_eq!(out.mode, ControllerMode::Idle);
        assert_eq!(c.mode(), ControllerMode::Idle);
    }

    #[test]
    fn test_goal_starts_tracking() {
        let mut c = controller();
        let out = c.compute(ActuatorState::new(0.0, 0.0), 1.0, DT);
        assert_eq!(out.mode, ControllerMode::Tracking);
        assert!(out.effort > 0.0);
        // First step from rest: v = a * dt
        let setpoint = out.setpoint.unwrap();
        assert_abs_diff_eq!(setpoint.velocity, 2.0 * DT, epsilon = 1e-12);
        assert_abs_diff_eq!(out.acceleration, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stop_goes_idle() {
        let mut c = controller();
        c.compute(ActuatorState::new(0.0, 0.0), 1.0, DT);
        c.stop();
        assert_eq!(c.mode(), ControllerMode::Idle);
        assert_eq!(c.goal(), None);
        assert_eq!(c.update(ActuatorState::new(0.1, 0.0), DT).effort, 0.0);
    }

    #[test]
    fn test_goal_clamped_to_travel() {
        let mut c = controller();
        c.set_goal(5.0);
        assert_eq!(c.goal(), Some(config().travel.max));
        c.set_goal(-3.0);
        assert_eq!(c.goal(), Some(config().travel.min));
    }

    #[test]
    fn test_non_finite_goal_ignored() {
        let mut c = controller();
        c.set_goal(0.4);
        c.set_goal(f64::NAN);
        assert_eq!(c.goal(), Some(0.4));
    }

    #[test]
    fn test_nan_reading_outputs_zero_and_holds_setpoint() {
        let mut c = controller();
        c.compute(ActuatorState::new(0.0, 0.0), 1.0, DT);
        let held = c.setpoint();

        let out = c.update(ActuatorState::new(f64::NAN, 0.0), DT);
        assert_eq!(out.effort, 0.0);
        assert_eq!(out.fault, Some(SensorFault::NotFinite));
        assert_eq!(c.setpoint(), held);
        assert_eq!(c.mode(), ControllerMode::Tracking);

        // Next good reading resumes from the held setpoint
        let out = c.update(ActuatorState::new(0.0, 0.0), DT);
        assert!(out.fault.is_none());
        assert!(out.setpoint.unwrap().position > held.unwrap().position);
    }

    #[test]
    fn test_out_of_travel_reading_rejected() {
        let mut c = controller();
        let max = config().travel.max;
        let out = c.compute(ActuatorState::new(max + 0.5, 0.0), 1.0, DT);
        assert_eq!(out.effort, 0.0);
        assert!(matches!(out.fault, Some(SensorFault::OutOfTravel { .. })));
    }

    #[test]
    fn test_invalid_timestep_rejected() {
        let mut c = controller();
        let out = c.compute(ActuatorState::new(0.0, 0.0), 1.0, 0.0);
        assert_eq!(out.effort, 0.0);
        assert!(matches!(out.fault, Some(SensorFault::InvalidTimestep { .. })));
    }

    #[test]
    fn test_reading_past_soft_limit_pushes_back() {
        let mut c = controller();
        let max = config().travel.max;
        // Inside the sensor margin but past the soft limit, goal at the limit
        let out = c.compute(ActuatorState::new(max + 0.03, 0.0), max, DT);
        assert!(out.fault.is_none());
        let setpoint = out.setpoint.unwrap();
        assert!(setpoint.position <= max);
        assert!(setpoint.velocity <= 0.0);
        // Feedback drives back into range
        assert!(out.feedback < 0.0);
    }

    #[test]
    fn test_small_goal_nudge_keeps_integral() {
        let mut c = controller();
        for _ in 0..10 {
            c.compute(ActuatorState::new(0.0, 0.0), 0.5, DT);
        }
        let integral = c.integral();
        assert!(integral > 0.0);

        c.set_goal(0.5 + config().integral_reset_tolerance / 2.0);
        assert_eq!(c.integral(), integral);

        c.set_goal(1.0);
        assert_eq!(c.integral(), 0.0);
    }

    #[test]
    fn test_settles_to_at_goal_and_back_to_tracking() {
        let mut c = controller();
        let mut mode = ControllerMode::Idle;
        for _ in 0..200 {
            let setpoint = c.setpoint().unwrap_or_default();
            // Perfect plant: follows the setpoint exactly
            mode = c
                .compute(ActuatorState::new(setpoint.position, setpoint.velocity), 0.6, DT)
                .mode;
        }
        assert_eq!(mode, ControllerMode::AtGoal);
        assert!(c.is_at_goal());

        c.set_goal(0.2);
        assert_eq!(c.mode(), ControllerMode::Tracking);
    }

    proptest! {
        #[test]
        fn effort_always_within_limit(
            position in prop_oneof![
                -10.0f64..10.0,
                Just(f64::NAN),
                Just(f64::INFINITY),
                Just(f64::NEG_INFINITY),
            ],
            velocity in prop_oneof![-50.0f64..50.0, Just(f64::NAN)],
            goal in -5.0f64..5.0,
            dt in prop_oneof![1e-4f64..0.5, Just(0.0), Just(-0.02), Just(f64::NAN)],
            steps in 1usize..20,
        ) {
            let mut c = controller();
            let limit = config().effort_limit;
            for _ in 0..steps {
                let out = c.compute(ActuatorState::new(position, velocity), goal, dt);
                prop_assert!(out.effort.abs() <= limit);
                if !position.is_finite() || !velocity.is_finite() {
                    prop_assert_eq!(out.effort, 0.0);
                }
            }
        }
    }
}
