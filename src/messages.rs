// Define message types exchanged with the runtime's collaborators

use serde::{Deserialize, Serialize};

use crate::control::ActuatorState;
use crate::drive::{Pose2d, Translation2d};

// Command from teleop/scripts -> runtime, already deadbanded and shaped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseCommand {
    pub x_vel: f64,
    pub y_vel: f64,
    pub theta_vel: f64,
}

impl BaseCommand {
    pub fn translation(&self) -> Translation2d {
        Translation2d::new(self.x_vel, self.y_vel)
    }
}

// Odometry -> runtime: field velocity and pose
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseState {
    pub x_vel: f64,
    pub y_vel: f64,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl BaseState {
    pub fn velocity(&self) -> Translation2d {
        Translation2d::new(self.x_vel, self.y_vel)
    }

    pub fn pose(&self) -> Pose2d {
        Pose2d::new(self.x, self.y, self.heading)
    }
}

// Actuation output from runtime -> drive kinematics
// Has default values because we don't always have an actuation to send
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BaseActuation {
    pub x_vel: f64,
    pub y_vel: f64,
    pub theta_vel: f64,
}

impl BaseActuation {
    /// Limited translation with the operator's rotation passed through untouched
    pub fn new(translation: Translation2d, theta_vel: f64) -> Self {
        Self {
            x_vel: translation.x,
            y_vel: translation.y,
            theta_vel,
        }
    }
}

// Goal or stop for the actuator controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActuatorCommand {
    Goal { position: f64 },
    Stop,
}

// Sensor adapter -> runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActuatorReading {
    pub position: f64,
    pub velocity: f64,
}

impl From<&ActuatorReading> for ActuatorState {
    fn from(reading: &ActuatorReading) -> Self {
        ActuatorState::new(reading.position, reading.velocity)
    }
}

// Runtime -> actuator driver
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct ActuatorEffort {
    pub effort: f64,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    SensorStale,
    SensorFault,
    /// Base odometry missing or old; translation is not being limited
    StateStale,
}
