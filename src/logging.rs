//! Tracing subscriber installation for hosts embedding the registry.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::RegistryConfig;

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum LoggingError {
    /// Raised when a global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Builds the event filter: `RUST_LOG` when set, otherwise `debug` or `info`
/// depending on `debug`.
#[must_use]
pub fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }))
}

/// Installs a global subscriber writing formatted events to stderr.
///
/// # Errors
///
/// Returns [`LoggingError::Install`] when a global subscriber has already
/// been set.
pub fn init_tracing(config: &RegistryConfig) -> Result<(), LoggingError> {
    tracing_subscriber::registry()
        .with(env_filter(config.debug))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(false),
        )
        .try_init()
        .map_err(|err| LoggingError::Install(err.to_string()))
}
