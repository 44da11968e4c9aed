// Wheel odometry for a differential-drive base
//
// Provides:
// - Encoder tick -> wheel rotation conversion
// - Dead-reckoning pose integration from left/right wheel rotation

pub mod encoder;
pub mod pose;

pub use encoder::{delta_phi, unwrap_ticks, validate_counter_bits, EncoderReading};
pub use pose::{estimate_pose, Pose2D, RobotGeometry};

/// Invalid odometry parameters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OdometryError {
    #[error("Wheel radius must be positive and finite, got {0}")]
    InvalidWheelRadius(f64),

    #[error("Baseline must be positive and finite, got {0}")]
    InvalidBaseline(f64),

    #[error("Counter width must be between 1 and 62 bits, got {0}")]
    InvalidCounterBits(u32),

    #[error("Tick count {ticks} is out of range of reference count {reference}")]
    TickOverflow { ticks: i64, reference: i64 },
}
