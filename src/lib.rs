// Differential-drive wheel odometry
//
// `odometry` holds the pure tick -> rotation -> pose math.
// `runtime` is the Zenoh node that owns the pose and feeds it encoder samples.

pub mod config;
pub mod messages;
pub mod odometry;
pub mod runtime;
