//! `sqlguard-server` runs the asynchronous half of the platform — the audit
//! pipeline and its retention job — as a standalone process. The prevention
//! engine (spec §4.1-§4.7) is a library embedded directly in a host process
//! at its query hook points and has no binary entry point of its own.

mod config;
mod error;
mod shutdown;
mod wiring;

use std::env;

use config::SqlGuardConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config_path = env::var("SQLGUARD_CONFIG").unwrap_or_else(|_| "sqlguard.toml".to_string());
    let config = match SqlGuardConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %config_path, error = %err, "no usable config file, falling back to defaults");
            SqlGuardConfig::default()
        }
    };

    let running = wiring::start(&config).await?;
    shutdown::wait_for_signal().await;
    running.shutdown().await;

    Ok(())
}
