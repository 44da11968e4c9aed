// Fixed-rate odometry loop with encoder watchdog
// Drains encoder samples, integrates the pose and publishes it.
// The watchdog holds the pose while either encoder is silent; motion that
// happened meanwhile is integrated once samples resume.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{
    RuntimeConfig, TOPIC_ENCODER_LEFT, TOPIC_ENCODER_RIGHT, TOPIC_HEALTH, TOPIC_ODOMETRY,
};
use crate::messages::{EncoderTicks, OdometryEstimate, OdometryHealth};
use crate::odometry::{delta_phi, unwrap_ticks, OdometryError, Pose2D, RobotGeometry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    Left,
    Right,
}

/// Tick bookkeeping for one wheel
#[derive(Debug, Default)]
struct WheelTracker {
    prev_ticks: Option<i64>, // count at the last integration
    latest: Option<EncoderTicks>,
    received_at: Option<Instant>,
}

impl WheelTracker {
    fn on_ticks(
        &mut self,
        mut sample: EncoderTicks,
        counter_bits: Option<u32>,
        at: Instant,
    ) -> Result<(), OdometryError> {
        if let Some(bits) = counter_bits {
            let reference = self.latest.map(|s| s.ticks).or(self.prev_ticks);
            if let Some(reference) = reference {
                sample.ticks = unwrap_ticks(sample.ticks, reference, bits).ok_or(
                    OdometryError::TickOverflow {
                        ticks: sample.ticks,
                        reference,
                    },
                )?;
            }
        }

        // take_rotation subtracts the last integrated count
        if let Some(prev) = self.prev_ticks {
            if sample.ticks.checked_sub(prev).is_none() {
                return Err(OdometryError::TickOverflow {
                    ticks: sample.ticks,
                    reference: prev,
                });
            }
        }

        self.latest = Some(sample);
        self.received_at = Some(at);
        Ok(())
    }

    fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        match self.received_at {
            Some(at) => now.saturating_duration_since(at) > timeout,
            None => true,
        }
    }

    /// Rotation since the last call; the first sample only sets the reference
    fn take_rotation(&mut self) -> (f64, i64) {
        let Some(latest) = self.latest else {
            return (0.0, 0);
        };
        let rotation = match self.prev_ticks {
            Some(prev) => delta_phi(latest.ticks, prev, latest.resolution),
            None => (0.0, 0),
        };
        self.prev_ticks = Some(latest.ticks);
        rotation
    }
}

pub struct Runtime {
    geometry: RobotGeometry,
    pose: Pose2D,
    left: WheelTracker,
    right: WheelTracker,
    counter_bits: Option<u32>,
    encoder_timeout: Duration,
    health: OdometryHealth,
}

impl Runtime {
    pub fn new(
        geometry: RobotGeometry,
        initial_pose: Pose2D,
        counter_bits: Option<u32>,
        encoder_timeout: Duration,
    ) -> Self {
        Self {
            geometry,
            pose: initial_pose,
            left: WheelTracker::default(),
            right: WheelTracker::default(),
            counter_bits,
            encoder_timeout,
            health: OdometryHealth::Waiting, // Until both encoders report
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Result<Self, OdometryError> {
        Ok(Self::new(
            config.geometry()?,
            config.initial_pose(),
            config.counter_bits()?,
            config.encoder_timeout(),
        ))
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn health(&self) -> OdometryHealth {
        self.health
    }

    /// Process incoming encoder sample
    pub fn on_ticks(&mut self, wheel: Wheel, sample: EncoderTicks, at: Instant) {
        if sample.resolution == 0 {
            warn!("Dropping {:?} encoder sample with zero resolution", wheel);
            return;
        }
        debug!("{:?} encoder: {:?}", wheel, sample);
        let tracker = match wheel {
            Wheel::Left => &mut self.left,
            Wheel::Right => &mut self.right,
        };
        if let Err(e) = tracker.on_ticks(sample, self.counter_bits, at) {
            warn!("Dropping {:?} encoder sample: {}", wheel, e);
        }
    }

    /// Advance the pose from the samples received so far
    pub fn update(&mut self, now: Instant) -> OdometryEstimate {
        let waiting = self.left.latest.is_none() || self.right.latest.is_none();
        let stale = self.left.is_stale(now, self.encoder_timeout)
            || self.right.is_stale(now, self.encoder_timeout);

        if waiting {
            self.health = OdometryHealth::Waiting;
            return OdometryEstimate::new(self.pose, 0, 0);
        }

        if stale {
            // Watchdog triggered - hold the pose
            if self.health != OdometryHealth::EncoderStale {
                warn!(
                    "Encoder stale (> {:?} without a sample), holding pose",
                    self.encoder_timeout
                );
            }
            self.health = OdometryHealth::EncoderStale;
            return OdometryEstimate::new(self.pose, 0, 0);
        }

        if self.health != OdometryHealth::Ok {
            info!("Encoders live, integrating from {:?}", self.pose);
        }
        self.health = OdometryHealth::Ok;

        let (dphi_left, left_ticks) = self.left.take_rotation();
        let (dphi_right, right_ticks) = self.right.take_rotation();
        self.pose = self.geometry.estimate_pose(self.pose, dphi_left, dphi_right);

        OdometryEstimate::new(self.pose, left_ticks, right_ticks)
    }
}

type TickSubscriber =
    zenoh::pubsub::Subscriber<zenoh::handlers::FifoChannelHandler<zenoh::sample::Sample>>;

/// Parse one JSON encoder payload; malformed payloads are logged and dropped
fn on_payload(runtime: &mut Runtime, wheel: Wheel, payload: &[u8], at: Instant) {
    match serde_json::from_slice::<EncoderTicks>(payload) {
        Ok(ticks) => runtime.on_ticks(wheel, ticks, at),
        Err(e) => warn!("Failed to parse {:?} encoder sample: {}", wheel, e),
    }
}

fn drain_ticks(runtime: &mut Runtime, wheel: Wheel, subscriber: &TickSubscriber) {
    while let Ok(Some(sample)) = subscriber.try_recv() {
        let payload = sample.payload().to_bytes();
        on_payload(runtime, wheel, &payload, Instant::now());
    }
}

pub async fn run(config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut runtime = Runtime::from_config(&config)?;

    let topic_left = config.topic(TOPIC_ENCODER_LEFT);
    let topic_right = config.topic(TOPIC_ENCODER_RIGHT);
    let topic_odometry = config.topic(TOPIC_ODOMETRY);
    let topic_health = config.topic(TOPIC_HEALTH);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_left = session.declare_subscriber(topic_left.clone()).await?;
    let sub_right = session.declare_subscriber(topic_right.clone()).await?;
    let pub_odometry = session.declare_publisher(topic_odometry.clone()).await?;
    let pub_health = session.declare_publisher(topic_health.clone()).await?;

    let mut tick = interval(config.loop_period());

    info!(
        "Runtime started: {}Hz loop, {}ms encoder timeout, R={}m, baseline={}m",
        config.loop_hz, config.encoder_timeout_ms, config.wheel_radius, config.baseline
    );
    info!("Subscribed to: {}, {}", topic_left, topic_right);
    info!("Publishing to: {}, {}", topic_odometry, topic_health);

    loop {
        tick.tick().await;

        // 1. Drain all pending encoder samples (non-blocking)
        drain_ticks(&mut runtime, Wheel::Left, &sub_left);
        drain_ticks(&mut runtime, Wheel::Right, &sub_right);

        // 2. Integrate pose (includes watchdog logic)
        let estimate = runtime.update(Instant::now());

        // 3. Publish pose
        let estimate_json = serde_json::to_string(&estimate)?;
        pub_odometry.put(estimate_json).await?;

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health)?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::PI;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn runtime(counter_bits: Option<u32>) -> Runtime {
        let geometry = RobotGeometry::new(0.02, 0.1).unwrap();
        Runtime::new(geometry, Pose2D::origin(), counter_bits, TIMEOUT)
    }

    fn ticks(ticks: i64) -> EncoderTicks {
        EncoderTicks {
            ticks,
            resolution: 100,
        }
    }

    #[test]
    fn test_waiting_until_both_encoders_report() {
        let mut rt = runtime(None);
        let now = Instant::now();
        rt.on_ticks(Wheel::Left, ticks(10), now);

        let estimate = rt.update(now);
        assert_eq!(rt.health(), OdometryHealth::Waiting);
        assert_eq!(estimate.pose(), Pose2D::origin());
    }

    #[test]
    fn test_first_samples_only_set_reference() {
        let mut rt = runtime(None);
        let now = Instant::now();
        rt.on_ticks(Wheel::Left, ticks(500), now);
        rt.on_ticks(Wheel::Right, ticks(800), now);

        let estimate = rt.update(now);
        assert_eq!(rt.health(), OdometryHealth::Ok);
        assert_eq!(estimate.pose(), Pose2D::origin());
        assert_eq!((estimate.left_delta_ticks, estimate.right_delta_ticks), (0, 0));
    }

    #[test]
    fn test_straight_motion_integrates() {
        let mut rt = runtime(None);
        let now = Instant::now();
        rt.on_ticks(Wheel::Left, ticks(0), now);
        rt.on_ticks(Wheel::Right, ticks(0), now);
        rt.update(now);

        // Quarter revolution on both wheels
        rt.on_ticks(Wheel::Left, ticks(25), now);
        rt.on_ticks(Wheel::Right, ticks(25), now);
        let estimate = rt.update(now);

        assert_eq!((estimate.left_delta_ticks, estimate.right_delta_ticks), (25, 25));
        assert_abs_diff_eq!(estimate.x, 0.02 * PI / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(estimate.y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(estimate.theta, 0.0, epsilon = 1e-12);

        // No new samples -> no motion
        let estimate = rt.update(now);
        assert_eq!((estimate.left_delta_ticks, estimate.right_delta_ticks), (0, 0));
        assert_abs_diff_eq!(estimate.x, 0.02 * PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stale_encoder_holds_pose_then_catches_up() {
        let mut rt = runtime(None);
        let start = Instant::now();
        rt.on_ticks(Wheel::Left, ticks(0), start);
        rt.on_ticks(Wheel::Right, ticks(0), start);
        rt.update(start);

        let later = start + TIMEOUT * 2;
        rt.on_ticks(Wheel::Left, ticks(50), later);
        let estimate = rt.update(later);
        assert_eq!(rt.health(), OdometryHealth::EncoderStale);
        assert_eq!(estimate.pose(), Pose2D::origin());

        rt.on_ticks(Wheel::Right, ticks(50), later);
        let estimate = rt.update(later);
        assert_eq!(rt.health(), OdometryHealth::Ok);
        assert_eq!((estimate.left_delta_ticks, estimate.right_delta_ticks), (50, 50));
        assert_relative_eq!(estimate.x, 0.02 * PI, epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_accumulates_unwrapped_heading() {
        let mut rt = runtime(None);
        let now = Instant::now();
        rt.on_ticks(Wheel::Left, ticks(0), now);
        rt.on_ticks(Wheel::Right, ticks(0), now);
        rt.update(now);

        // dtheta = R/baseline * 2 * dphi = 0.4 * dphi per step
        for step in 1..=10 {
            rt.on_ticks(Wheel::Left, ticks(-100 * step), now);
            rt.on_ticks(Wheel::Right, ticks(100 * step), now);
            rt.update(now);
        }

        let pose = rt.pose();
        assert_relative_eq!(pose.theta, 10.0 * 0.4 * 2.0 * PI, epsilon = 1e-9);
        assert_abs_diff_eq!(pose.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pose.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_counter_rollover_unwrapped_when_enabled() {
        let mut rt = runtime(Some(16));
        let now = Instant::now();
        rt.on_ticks(Wheel::Left, ticks(65530), now);
        rt.on_ticks(Wheel::Right, ticks(65530), now);
        rt.update(now);

        rt.on_ticks(Wheel::Left, ticks(4), now);
        rt.on_ticks(Wheel::Right, ticks(4), now);
        let estimate = rt.update(now);

        assert_eq!((estimate.left_delta_ticks, estimate.right_delta_ticks), (10, 10));
        assert!(estimate.x > 0.0);
    }

    #[test]
    fn test_zero_resolution_sample_dropped() {
        let mut rt = runtime(None);
        let now = Instant::now();
        rt.on_ticks(
            Wheel::Left,
            EncoderTicks {
                ticks: 5,
                resolution: 0,
            },
            now,
        );
        rt.on_ticks(Wheel::Right, ticks(5), now);
        rt.update(now);
        assert_eq!(rt.health(), OdometryHealth::Waiting);
    }

    #[test]
    fn test_overflowing_tick_sample_dropped() {
        let mut rt = runtime(None);
        let now = Instant::now();
        rt.on_ticks(Wheel::Left, ticks(10), now);
        rt.on_ticks(Wheel::Right, ticks(10), now);
        rt.update(now);

        // 10 - i64::MIN does not fit in an i64
        rt.on_ticks(Wheel::Left, ticks(i64::MIN), now);
        assert_eq!(rt.left.latest, Some(ticks(10)));

        let estimate = rt.update(now);
        assert_eq!(rt.health(), OdometryHealth::Ok);
        assert_eq!((estimate.left_delta_ticks, estimate.right_delta_ticks), (0, 0));
        assert_eq!(estimate.pose(), Pose2D::origin());
    }

    #[test]
    fn test_extreme_counts_with_counter_unwrapping() {
        let mut rt = runtime(Some(16));
        let now = Instant::now();
        rt.on_ticks(Wheel::Left, ticks(i64::MAX), now);
        rt.on_ticks(Wheel::Right, ticks(0), now);
        rt.update(now);

        // -5 is 4 ticks behind i64::MAX modulo 2^16
        rt.on_ticks(Wheel::Left, ticks(-5), now);
        rt.on_ticks(Wheel::Right, ticks(0), now);
        let estimate = rt.update(now);
        assert_eq!(estimate.left_delta_ticks, -4);

        // Stepping forward past i64::MAX is rejected
        rt.on_ticks(Wheel::Left, ticks(20), now);
        assert_eq!(rt.left.latest, Some(ticks(i64::MAX - 4)));
    }

    #[test]
    fn test_malformed_payloads_dropped() {
        let mut rt = runtime(None);
        let now = Instant::now();
        on_payload(&mut rt, Wheel::Left, br#"{"ticks": 0, "resolution": 100}"#, now);
        on_payload(&mut rt, Wheel::Right, br#"{"ticks": 0, "resolution": 100}"#, now);
        rt.update(now);
        assert_eq!(rt.health(), OdometryHealth::Ok);

        let later = now + Duration::from_millis(100);
        on_payload(&mut rt, Wheel::Left, br#"{"ticks": 40}"#, later);
        on_payload(&mut rt, Wheel::Left, br#"{"ticks": "40", "resolution": 100}"#, later);
        on_payload(&mut rt, Wheel::Left, b"not json", later);

        assert_eq!(rt.left.latest, Some(ticks(0)));
        assert_eq!(rt.left.received_at, Some(now));
        assert_eq!(rt.health(), OdometryHealth::Ok);

        let estimate = rt.update(later);
        assert_eq!(rt.health(), OdometryHealth::Ok);
        assert_eq!(estimate.pose(), Pose2D::origin());
    }
}
