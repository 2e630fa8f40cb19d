pub mod config;
pub mod error;

pub use config::{ApiConfig, CacheConfig, Config, UiConfig, ValidationResult, WeatherConfig};
pub use error::StorageError;

use anyhow::Result;

/// Initialize logging for the host process.
///
/// Respects `RUST_LOG`; falls back to `info`. Safe to call more than once.
pub fn init() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    tracing::info!("Nimbus core initialized");
    Ok(())
}
