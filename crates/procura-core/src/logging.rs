//! Tracing subscriber setup shared by every entry point.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the filter: `RUST_LOG` wins, otherwise the configured directive.
#[must_use]
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are ignored so tests and
/// embedding applications can both call it.
pub fn init_tracing(config: &LoggingConfig) {
    let result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(config.with_target))
        .with(env_filter(config))
        .try_init();

    if result.is_ok() {
        tracing::debug!("Tracing initialized with default filter '{}'", config.level);
    }
}
