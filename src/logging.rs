//! tracing subscriber setup for the binary.
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging setup failures.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive does not parse.
    #[error("invalid log filter `{0}`: {1}")]
    Filter(String, String),

    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Install a global fmt subscriber filtered by `filter` (e.g. `info,rebid_tracker=debug`).
///
/// `RUST_LOG`, when set, takes precedence over `filter`.
pub fn init_logging(filter: &str, json: bool) -> Result<(), LoggingError> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(directive) if !directive.is_empty() => EnvFilter::try_new(&directive)
            .map_err(|e| LoggingError::Filter(directive.clone(), e.to_string()))?,
        _ => EnvFilter::try_new(filter)
            .map_err(|e| LoggingError::Filter(filter.to_string(), e.to_string()))?,
    };

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))
    }
}
