// Telemetry observer
//
// Control steps return their intermediate values; whoever runs the loop hands
// them to a sink afterwards. Nothing in `control` or `drive` reports directly.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::control::{ControlOutput, ControllerMode, SensorFault};
use crate::drive::Translation2d;

/// Everything computed during one cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryFrame {
    pub mode: ControllerMode,
    pub goal: Option<f64>,
    pub setpoint_position: Option<f64>,
    pub setpoint_velocity: Option<f64>,
    pub setpoint_acceleration: f64,
    pub feedback: f64,
    pub feedforward: f64,
    pub effort: f64,
    pub fault: Option<SensorFault>,
    pub requested: Translation2d,
    pub limited: Translation2d,
}

impl TelemetryFrame {
    pub fn new(
        output: &ControlOutput,
        goal: Option<f64>,
        requested: Translation2d,
        limited: Translation2d,
    ) -> Self {
        Self {
            mode: output.mode,
            goal,
            setpoint_position: output.setpoint.map(|s| s.position),
            setpoint_velocity: output.setpoint.map(|s| s.velocity),
            setpoint_acceleration: output.acceleration,
            feedback: output.feedback,
            feedforward: output.feedforward,
            effort: output.effort,
            fault: output.fault,
            requested,
            limited,
        }
    }
}

/// Receives one frame per control cycle
pub trait TelemetrySink {
    fn record(&mut self, frame: &TelemetryFrame);
}

/// Emits frames as debug-level tracing events
#[derive(Debug, Default)]
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn record(&mut self, frame: &TelemetryFrame) {
        debug!(
            mode = ?frame.mode,
            goal = ?frame.goal,
            setpoint = ?frame.setpoint_position,
            feedback = frame.feedback,
            feedforward = frame.feedforward,
            effort = frame.effort,
            "actuator"
        );
        debug!(
            requested_x = frame.requested.x,
            requested_y = frame.requested.y,
            limited_x = frame.limited.x,
            limited_y = frame.limited.y,
            "translation"
        );
    }
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Box<S> {
    fn record(&mut self, frame: &TelemetryFrame) {
        (**self).record(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ProfileState;

    #[derive(Default)]
    struct Collect(Vec<TelemetryFrame>);

    impl TelemetrySink for Collect {
        fn record(&mut self, frame: &TelemetryFrame) {
            self.0.push(frame.clone());
        }
    }

    #[test]
    fn test_frame_copies_output() {
        let output = ControlOutput {
            effort: 3.0,
            feedback: 1.0,
            feedforward: 2.0,
            setpoint: Some(ProfileState::new(0.4, 0.8)),
            acceleration: 8.0,
            mode: ControllerMode::Tracking,
            fault: None,
        };
        let frame = TelemetryFrame::new(
            &output,
            Some(1.0),
            Translation2d::new(2.0, 0.0),
            Translation2d::new(1.0, 0.0),
        );
        assert_eq!(frame.setpoint_position, Some(0.4));
        assert_eq!(frame.setpoint_velocity, Some(0.8));
        assert_eq!(frame.effort, 3.0);

        let mut collect = Collect::default();
        collect.record(&frame);
        assert_eq!(collect.0, vec![frame.clone()]);

        let mut boxed: Box<dyn TelemetrySink> = Box::new(LogTelemetry);
        boxed.record(&frame);
    }
}
