//! Crate-wide error types.
//!
//! Three small taxonomies, one per concern:
//!
//! - [`HandlerError`] — what a handler body reports. A `Failure` is reified
//!   by the dispatcher as an `Error` event on the `error` channel; an
//!   `Interrupt` is never reified and always propagates, stopping the loop.
//! - [`StructuralError`] — misuse of the registration tree (detaching a
//!   component that is not attached here).
//! - [`ConfigError`] — run-loop configuration loading.

use thiserror::Error;

/// Error raised by a handler or tick body.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Ordinary failure. The dispatcher turns this into an `Error` event
    /// (channel `error`) unless logging is disabled, and re-raises it only
    /// when the caller asked for `errors = true`.
    #[error("{kind}: {message}")]
    Failure { kind: String, message: String },

    /// Interrupt/terminate request. Never caught by the dispatcher; the run
    /// loop clears `running` and winds down when it sees one.
    #[error("interrupted")]
    Interrupt,
}

impl HandlerError {
    /// Shorthand for a [`HandlerError::Failure`].
    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure { kind: kind.into(), message: message.into() }
    }

    /// `true` for the interrupt variant.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupt)
    }
}

/// Misuse of the registration tree.
#[derive(Debug, Error)]
pub enum StructuralError {
    /// The component is not registered with this manager.
    #[error("no registration found for component {id}")]
    NotRegistered { id: uuid::Uuid },
}

/// Run-loop configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid override {name}={value}")]
    Override { name: String, value: String },
}

/// Logging initialisation errors.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid log level '{level}': {reason}")]
    Level { level: String, reason: String },

    #[error("failed to set subscriber: {0}")]
    Subscriber(String),
}
