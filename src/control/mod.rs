// Closed-loop actuator control
//
// Provides:
// - Trapezoidal motion profile
// - PID feedback with resettable integrator
// - Static/gravity/velocity/acceleration feedforward
// - Profiled controller combining the three

pub mod controller;
pub mod feedforward;
pub mod pid;
pub mod profile;

pub use controller::{
    ActuatorState, ControlOutput, ControllerMode, ProfiledActuatorController, SensorFault,
};
pub use feedforward::{Feedforward, GravityModel};
pub use pid::Pid;
pub use profile::{ProfileState, TrapezoidProfile};
