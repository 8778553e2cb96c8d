#![cfg(not(tarpaulin_include))]

use argus::app;
use argus::config::Config;

/// Main entry point for the dashboard server
///
/// Reads the configuration from the environment (and an optional `.env`
/// file), then serves until the process is stopped. Log level comes from
/// `RUST_LOG`, defaulting to `info`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    app::run(config).await
}
