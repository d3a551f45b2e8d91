//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;
use crate::error::ConfigError;

/// Builds the filter: `RUST_LOG` when set, the configured level otherwise
pub fn env_filter(log: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber; logs go to stderr so stdout stays JSON
pub fn init_tracing(log: &LogConfig) -> Result<(), ConfigError> {
    let registry = tracing_subscriber::registry().with(env_filter(log));
    let result = if log.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| ConfigError::Telemetry(e.to_string()))
}
