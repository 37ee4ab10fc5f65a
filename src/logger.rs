//! Logging initialisation via tracing-subscriber.
//!
//! The kernel itself only emits `tracing` events; embedders that want them
//! on stderr call [`init`] once at startup (the demo does). `RUST_LOG`
//! wins when set; `level` is the fallback.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::LoggerError;

/// Initialise the global tracing subscriber, filtering at `RUST_LOG` when
/// the variable is set and at `level` otherwise.
///
/// `level` accepts standard level strings (`"error"` … `"trace"`) and is
/// validated up front, so a typo fails loudly even when `RUST_LOG` would
/// have masked it.
pub fn init(level: &str) -> Result<(), LoggerError> {
    let fallback = parse_level(level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(fallback.into()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| LoggerError::Subscriber(e.to_string()))
}

/// Parse a log level string into a [`LevelFilter`], erroring on
/// unrecognised values.
pub fn parse_level(level: &str) -> Result<LevelFilter, LoggerError> {
    level.parse().map_err(|_| LoggerError::Level {
        level: level.to_string(),
        reason: "unrecognised log level".into(),
    })
}
