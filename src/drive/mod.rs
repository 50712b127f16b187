// Chassis translation limiting
//
// Provides:
// - Planar vector and pose types
// - Tip-over acceleration bound and the velocity limiter built on it

pub mod geometry;
pub mod limiter;

pub use geometry::{Pose2d, Translation2d};
pub use limiter::{GRAVITY, VehicleDynamics, VelocityLimiter, limit_velocity};
