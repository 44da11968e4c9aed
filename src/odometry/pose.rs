// Differential-drive dead reckoning
// Integrates left/right wheel rotations into the next 2D pose estimate.

use serde::{Deserialize, Serialize};

use super::OdometryError;

/// Robot pose in the odometry frame
///
/// `theta` is never wrapped; it accumulates across updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,     // meters
    pub y: f64,     // meters
    pub theta: f64, // radians
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub fn origin() -> Self {
        Self::default()
    }
}

/// Wheel radius and wheel separation of a differential-drive base
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotGeometry {
    pub wheel_radius: f64, // meters
    pub baseline: f64,     // meters, distance between the wheels
}

impl RobotGeometry {
    /// Create a geometry, rejecting non-positive or non-finite values
    pub fn new(wheel_radius: f64, baseline: f64) -> Result<Self, OdometryError> {
        if !(wheel_radius.is_finite() && wheel_radius > 0.0) {
            return Err(OdometryError::InvalidWheelRadius(wheel_radius));
        }
        if !(baseline.is_finite() && baseline > 0.0) {
            return Err(OdometryError::InvalidBaseline(baseline));
        }
        Ok(Self {
            wheel_radius,
            baseline,
        })
    }

    /// Integrate one step of wheel rotation starting from `prev`
    pub fn estimate_pose(&self, prev: Pose2D, delta_phi_left: f64, delta_phi_right: f64) -> Pose2D {
        let (x, y, theta) = estimate_pose(
            self.wheel_radius,
            self.baseline,
            prev.x,
            prev.y,
            prev.theta,
            delta_phi_left,
            delta_phi_right,
        );
        Pose2D { x, y, theta }
    }
}

/// Dead-reckoning pose update for a differential-drive robot
///
/// # Arguments
/// * `wheel_radius` - Radius of both wheels (m)
/// * `baseline` - Distance between the wheels (m), must be non-zero
/// * `x_prev`, `y_prev`, `theta_prev` - Previous pose estimate
/// * `delta_phi_left`, `delta_phi_right` - Wheel rotations since the previous pose (rad)
///
/// # Returns
/// `(x_curr, y_curr, theta_curr)`
///
/// Displacement is projected along `theta_prev` (first-order Euler step), so
/// turns carry a small error that shrinks with the step size.
pub fn estimate_pose(
    wheel_radius: f64,
    baseline: f64,
    x_prev: f64,
    y_prev: f64,
    theta_prev: f64,
    delta_phi_left: f64,
    delta_phi_right: f64,
) -> (f64, f64, f64) {
    // Linear travel of each wheel
    let d_left = wheel_radius * delta_phi_left;
    let d_right = wheel_radius * delta_phi_right;

    // Travel of the robot centerline
    let distance_traveled = (d_left + d_right) / 2.0;

    let dtheta = wheel_radius / baseline * (delta_phi_right - delta_phi_left);

    let dx = distance_traveled * theta_prev.cos();
    let dy = distance_traveled * theta_prev.sin();

    (x_prev + dx, y_prev + dy, theta_prev + dtheta)
}
