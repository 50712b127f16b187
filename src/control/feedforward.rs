// Open-loop effort from the desired motion
// V = kS*sign(v) + gravity(x) + kV*v + kA*a

use serde::{Deserialize, Serialize};

use crate::config::FeedforwardModel;

/// How the gravity term varies with position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum GravityModel {
    /// Vertical carriage: `kG` everywhere.
    #[default]
    Constant,
    /// Pivoting arm: `kG·cos(angle - offset)`, where `offset` is the
    /// position reading (radians) at which the arm is horizontal.
    Cosine { offset: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feedforward {
    model: FeedforwardModel,
}

impl Feedforward {
    pub fn new(model: FeedforwardModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> FeedforwardModel {
        self.model
    }

    /// Volts needed to hold against gravity at `position`.
    pub fn gravity_term(&self, position: f64) -> f64 {
        match self.model.gravity {
            GravityModel::Constant => self.model.kg,
            GravityModel::Cosine { offset } => self.model.kg * (position - offset).cos(),
        }
    }

    /// Total feedforward volts for a setpoint.
    pub fn calculate(&self, position: f64, velocity: f64, acceleration: f64) -> f64 {
        // sign(0) is 0: no friction compensation at rest
        let friction = if velocity == 0.0 {
            0.0
        } else {
            self.model.ks * velocity.signum()
        };

        friction
            + self.gravity_term(position)
            + self.model.kv * velocity
            + self.model.ka * acceleration
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    use super::*;

    fn model(gravity: GravityModel) -> FeedforwardModel {
        FeedforwardModel {
            ks: 0.1,
            kg: 0.9,
            kv: 4.0,
            ka: 0.2,
            gravity,
        }
    }

    #[test]
    fn test_holding_at_rest_is_gravity_only() {
        let ff = Feedforward::new(model(GravityModel::Constant));
        assert_abs_diff_eq!(ff.calculate(0.5, 0.0, 0.0), 0.9);
    }

    #[test]
    fn test_all_terms() {
        let ff = Feedforward::new(model(GravityModel::Constant));
        // 0.1 + 0.9 + 4.0 * 0.5 + 0.2 * 2.0
        assert_abs_diff_eq!(ff.calculate(0.0, 0.5, 2.0), 3.4, epsilon = 1e-12);
        // -0.1 + 0.9 - 4.0 * 0.5 - 0.2 * 2.0
        assert_abs_diff_eq!(ff.calculate(0.0, -0.5, -2.0), -1.6, epsilon = 1e-12);
    }

    #[test]
    fn test_cosine_gravity() {
        let ff = Feedforward::new(model(GravityModel::Cosine { offset: 0.0 }));
        assert_abs_diff_eq!(ff.gravity_term(0.0), 0.9);
        assert_abs_diff_eq!(ff.gravity_term(FRAC_PI_2), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ff.gravity_term(std::f64::consts::PI), -0.9, epsilon = 1e-12);

        let shifted = Feedforward::new(model(GravityModel::Cosine { offset: FRAC_PI_2 }));
        assert_abs_diff_eq!(shifted.gravity_term(FRAC_PI_2), 0.9, epsilon = 1e-12);
    }
}
