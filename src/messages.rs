// Define message types for the odometry runtime

use serde::{Deserialize, Serialize};

use crate::odometry::Pose2D;

// Encoder sample from the wheel driver -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderTicks {
    pub ticks: i64,
    pub resolution: u32,
}

// Pose estimate from runtime -> navigation stack
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometryEstimate {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub left_delta_ticks: i64,
    pub right_delta_ticks: i64,
}

impl OdometryEstimate {
    pub fn new(pose: Pose2D, left_delta_ticks: i64, right_delta_ticks: i64) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
            left_delta_ticks,
            right_delta_ticks,
        }
    }

    pub fn pose(&self) -> Pose2D {
        Pose2D::new(self.x, self.y, self.theta)
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OdometryHealth {
    Ok,
    EncoderStale,
    Waiting,
}
