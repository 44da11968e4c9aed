// Timeouts, topics, robot geometry defaults
use std::time::Duration;

use clap::Parser;

use crate::odometry::{validate_counter_bits, OdometryError, Pose2D, RobotGeometry};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 30;

// Encoder timeout for watchdog
pub const ENCODER_TIMEOUT: Duration = Duration::from_millis(500);

// Zenoh topics, relative to the topic prefix
pub const TOPIC_PREFIX: &str = "robot";
pub const TOPIC_ENCODER_LEFT: &str = "encoder/left"; // ticks in
pub const TOPIC_ENCODER_RIGHT: &str = "encoder/right"; // ticks in
pub const TOPIC_ODOMETRY: &str = "state/odometry"; // pose out
pub const TOPIC_HEALTH: &str = "state/odometry/health"; // health status

// Default geometry of a small differential-drive base
pub const WHEEL_RADIUS: f64 = 0.0318; // meters
pub const BASELINE: f64 = 0.1; // meters

/// Command-line overrides for the runtime
#[derive(Debug, Clone, Parser)]
#[command(name = "encoder-pose", about = "Wheel-encoder dead-reckoning over Zenoh")]
pub struct RuntimeConfig {
    /// Wheel radius in meters
    #[arg(long, default_value_t = WHEEL_RADIUS)]
    pub wheel_radius: f64,

    /// Distance between the wheels in meters
    #[arg(long, default_value_t = BASELINE)]
    pub baseline: f64,

    /// Loop frequency in Hz
    #[arg(
        long,
        default_value_t = LOOP_HZ,
        value_parser = clap::value_parser!(u64).range(1..=1000)
    )]
    pub loop_hz: u64,

    /// Mark encoders stale after this long without a sample
    #[arg(
        long,
        default_value_t = ENCODER_TIMEOUT.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub encoder_timeout_ms: u64,

    /// Width of the hardware tick counter; enables rollover unwrapping
    #[arg(long)]
    pub counter_bits: Option<u32>,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub initial_x: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub initial_y: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub initial_theta: f64,

    #[arg(long, default_value = TOPIC_PREFIX)]
    pub topic_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            wheel_radius: WHEEL_RADIUS,
            baseline: BASELINE,
            loop_hz: LOOP_HZ,
            encoder_timeout_ms: ENCODER_TIMEOUT.as_millis() as u64,
            counter_bits: None,
            initial_x: 0.0,
            initial_y: 0.0,
            initial_theta: 0.0,
            topic_prefix: TOPIC_PREFIX.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Validated robot geometry
    pub fn geometry(&self) -> Result<RobotGeometry, OdometryError> {
        RobotGeometry::new(self.wheel_radius, self.baseline)
    }

    /// Validated counter width, if unwrapping is enabled
    pub fn counter_bits(&self) -> Result<Option<u32>, OdometryError> {
        self.counter_bits.map(validate_counter_bits).transpose()
    }

    pub fn initial_pose(&self) -> Pose2D {
        Pose2D::new(self.initial_x, self.initial_y, self.initial_theta)
    }

    pub fn encoder_timeout(&self) -> Duration {
        Duration::from_millis(self.encoder_timeout_ms)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(1000 / self.loop_hz)
    }

    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.topic_prefix.trim_end_matches('/'), suffix)
    }
}
