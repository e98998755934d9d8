//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over `[logging].level`. Logs go to stderr so
//! CLI command output on stdout stays clean.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    }
    .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}
