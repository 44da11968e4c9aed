// Synthetic encoder source: drives a constant arc and publishes both wheels' ticks.
// Optionally wraps the counters to a fixed width to exercise `--counter-bits`.
use clap::Parser;
use serde_json::json;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
struct Args {
    /// Ticks per wheel revolution
    #[arg(long, default_value_t = 135)]
    resolution: u32,

    /// Left wheel speed in ticks per second
    #[arg(long, default_value_t = 60, allow_negative_numbers = true)]
    left_rate: i64,

    /// Right wheel speed in ticks per second
    #[arg(long, default_value_t = 90, allow_negative_numbers = true)]
    right_rate: i64,

    /// Wrap published counts to this many bits
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=62))]
    counter_bits: Option<u32>,

    /// Seconds to run (0 = forever)
    #[arg(long, default_value_t = 10)]
    duration: u64,

    #[arg(long, default_value = "robot")]
    topic_prefix: String,
}

const PUBLISH_HZ: u64 = 20;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_left = session
        .declare_publisher(format!("{}/encoder/left", args.topic_prefix))
        .await?;
    let pub_right = session
        .declare_publisher(format!("{}/encoder/right", args.topic_prefix))
        .await?;

    info!(
        "Publishing ticks: left={}/s right={}/s resolution={}",
        args.left_rate, args.right_rate, args.resolution
    );

    let mut tick = tokio::time::interval(Duration::from_millis(1000 / PUBLISH_HZ));
    let total_steps = args.duration * PUBLISH_HZ;
    let mut step: u64 = 0;

    loop {
        tick.tick().await;

        let elapsed_ms = (step * 1000 / PUBLISH_HZ) as i64;
        let left = wrap(args.left_rate * elapsed_ms / 1000, args.counter_bits);
        let right = wrap(args.right_rate * elapsed_ms / 1000, args.counter_bits);

        pub_left
            .put(json!({ "ticks": left, "resolution": args.resolution }).to_string())
            .await?;
        pub_right
            .put(json!({ "ticks": right, "resolution": args.resolution }).to_string())
            .await?;

        step += 1;
        if total_steps != 0 && step >= total_steps {
            break;
        }
    }

    info!("Done after {} samples", step);
    Ok(())
}

fn wrap(ticks: i64, counter_bits: Option<u32>) -> i64 {
    match counter_bits {
        Some(bits) => ticks.rem_euclid(1i64 << bits),
        None => ticks,
    }
}
