use clap::Parser;
use tracing_subscriber::EnvFilter;

use encoder_pose::config::RuntimeConfig;

#[tokio::main]
async fn main() {
    let config = RuntimeConfig::parse();

    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = encoder_pose::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
