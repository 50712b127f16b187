// Loop rate, watchdogs, topics and tuning configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::feedforward::GravityModel;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Sensor readings older than this are treated as missing
pub const SENSOR_TIMEOUT: Duration = Duration::from_millis(100);

// Base odometry older than this no longer counts as the current velocity
pub const STATE_TIMEOUT: Duration = Duration::from_millis(100);

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "mech/cmd/base"; // operator translation
pub const TOPIC_CMD_ACTUATOR: &str = "mech/cmd/actuator"; // actuator goals
pub const TOPIC_STATE_BASE: &str = "mech/state/base"; // odometry
pub const TOPIC_STATE_ACTUATOR: &str = "mech/state/actuator"; // sensor adapter
pub const TOPIC_RT_BASE: &str = "mech/rt/base"; // limited translation
pub const TOPIC_RT_ACTUATOR: &str = "mech/rt/actuator"; // effort
pub const TOPIC_HEALTH: &str = "mech/state/health"; // health status
pub const TOPIC_TELEMETRY: &str = "mech/telemetry";

/// Configuration errors, raised once at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("{name} must be finite")]
    NotFinite { name: &'static str },

    #[error("Travel range is empty: min {min} >= max {max}")]
    InvalidTravel { min: f64, max: f64 },
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { name });
    }
    if value <= 0.0 {
        return Err(ConfigError::NonPositive { name, value });
    }
    Ok(())
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { name });
    }
    if value < 0.0 {
        return Err(ConfigError::Negative { name, value });
    }
    Ok(())
}

fn finite(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { name })
    }
}

/// Velocity and acceleration limits of a motion profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionConstraints {
    pub max_velocity: f64,
    pub max_acceleration: f64,
}

impl MotionConstraints {
    pub fn new(max_velocity: f64, max_acceleration: f64) -> Result<Self, ConfigError> {
        let constraints = Self {
            max_velocity,
            max_acceleration,
        };
        constraints.validate()?;
        Ok(constraints)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("max_velocity", self.max_velocity)?;
        positive("max_acceleration", self.max_acceleration)
    }
}

impl Default for MotionConstraints {
    fn default() -> Self {
        Self {
            max_velocity: 4.0,     // m/s
            max_acceleration: 8.0, // m/s^2
        }
    }
}

/// Feedback gains
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Bound on the integral contribution (volts), symmetric
    pub integral_limit: f64,
}

impl PidGains {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("kp", self.kp)?;
        non_negative("ki", self.ki)?;
        non_negative("kd", self.kd)?;
        non_negative("integral_limit", self.integral_limit)
    }
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 26.722,
            ki: 0.0,
            kd: 1.6047,
            integral_limit: 1.0,
        }
    }
}

/// Feedforward constants, all in volts per unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedforwardModel {
    pub ks: f64, // V
    pub kg: f64, // V
    pub kv: f64, // V/(m/s)
    pub ka: f64, // V/(m/s^2)
    #[serde(default)]
    pub gravity: GravityModel,
}

impl FeedforwardModel {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("ks", self.ks)?;
        finite("kg", self.kg)?;
        non_negative("kv", self.kv)?;
        non_negative("ka", self.ka)?;
        if let GravityModel::Cosine { offset } = self.gravity {
            finite("gravity.offset", offset)?;
        }
        Ok(())
    }
}

impl Default for FeedforwardModel {
    fn default() -> Self {
        Self {
            ks: 0.01964,
            kg: 0.91274,
            kv: 3.894,
            ka: 0.173,
            gravity: GravityModel::Constant,
        }
    }
}

/// Soft travel limits of the mechanism
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelLimits {
    pub min: f64,
    pub max: f64,
}

impl TravelLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        finite("travel.min", self.min)?;
        finite("travel.max", self.max)?;
        if self.min >= self.max {
            return Err(ConfigError::InvalidTravel {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    pub fn clamp(&self, position: f64) -> f64 {
        position.clamp(self.min, self.max)
    }
}

impl Default for TravelLimits {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.6764,
        }
    }
}

/// Everything a [`crate::control::ProfiledActuatorController`] needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub constraints: MotionConstraints,
    pub pid: PidGains,
    pub feedforward: FeedforwardModel,
    pub travel: TravelLimits,
    /// Readings further than this past a soft limit are physically implausible
    pub sensor_margin: f64,
    /// Output clamp in volts, symmetric
    pub effort_limit: f64,
    /// Setpoint-to-goal distance considered "at goal"
    pub goal_tolerance: f64,
    /// Goal changes larger than this reset the integrator
    pub integral_reset_tolerance: f64,
}

impl ActuatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.constraints.validate()?;
        self.pid.validate()?;
        self.feedforward.validate()?;
        self.travel.validate()?;
        non_negative("sensor_margin", self.sensor_margin)?;
        positive("effort_limit", self.effort_limit)?;
        positive("goal_tolerance", self.goal_tolerance)?;
        non_negative("integral_reset_tolerance", self.integral_reset_tolerance)
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            constraints: MotionConstraints::default(),
            pid: PidGains::default(),
            feedforward: FeedforwardModel::default(),
            travel: TravelLimits::default(),
            sensor_margin: 0.05,
            effort_limit: 7.0, // of a 12 V supply
            goal_tolerance: 0.01,
            integral_reset_tolerance: 0.02,
        }
    }
}

/// Tipping-relevant physical parameters of the chassis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleDynamicsModel {
    pub mass: f64,                  // kg
    pub center_of_mass_height: f64, // m
    /// Lateral distance from the center of mass to the wheel contact line
    pub half_track: f64, // m
    /// Longitudinal counterpart of `half_track`, isotropic bound when absent
    #[serde(default)]
    pub half_wheelbase: Option<f64>,
}

impl VehicleDynamicsModel {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("mass", self.mass)?;
        positive("center_of_mass_height", self.center_of_mass_height)?;
        positive("half_track", self.half_track)?;
        if let Some(half_wheelbase) = self.half_wheelbase {
            positive("half_wheelbase", half_wheelbase)?;
        }
        Ok(())
    }
}

impl Default for VehicleDynamicsModel {
    fn default() -> Self {
        Self {
            mass: 21.32,                   // 47 lb
            center_of_mass_height: 0.0851, // 3.35 in
            half_track: 0.2794,            // 11 in
            half_wheelbase: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub dynamics: VehicleDynamicsModel,
    /// Control period plus motor controller velocity lag (s)
    pub loop_time: f64,
}

impl DriveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dynamics.validate()?;
        non_negative("loop_time", self.loop_time)
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            dynamics: VehicleDynamicsModel::default(),
            loop_time: 0.13, // 20 ms loop + 110 ms velocity lag
        }
    }
}

/// Top-level tuning file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub actuator: ActuatorConfig,
    pub drive: DriveConfig,
}

impl TuningConfig {
    /// Read, parse and validate a JSON tuning file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.actuator.validate()?;
        self.drive.validate()
    }
}
