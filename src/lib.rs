// Motion control core for a mechanism runtime
//
// - control: profiled PID + feedforward for a single actuator
// - drive: tip-over velocity limiting for the chassis
// - runtime: 50 Hz scheduler wiring both to zenoh topics

pub mod config;
pub mod control;
pub mod drive;
pub mod messages;
pub mod runtime;
pub mod sim;
pub mod telemetry;
