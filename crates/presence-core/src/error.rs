//! Unified application error types for the presence subsystem.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Input validation failed (e.g. a malformed presence event).
    Validation,
    /// A configuration error occurred.
    Configuration,
    /// The persistent presence store failed.
    Store,
    /// The broadcast channel failed to publish or subscribe.
    Broadcast,
    /// An operation did not complete within its bound.
    Timeout,
    /// A serialization/deserialization error occurred.
    Serialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Store => write!(f, "STORE"),
            Self::Broadcast => write!(f, "BROADCAST"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Serialization => write!(f, "SERIALIZATION"),
        }
    }
}

/// The unified application error.
///
/// Background loops (heartbeat, reconciliation, subscriber) never return
/// these to UI-facing callers; they log them and feed the health signal.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a persistent store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store, message)
    }

    /// Create a broadcast channel error.
    pub fn broadcast(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Broadcast, message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Whether the next heartbeat or reconciliation cycle may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Store | ErrorKind::Broadcast | ErrorKind::Timeout
        )
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind() {
        let err = AppError::store("connection refused");
        assert_eq!(err.to_string(), "STORE: connection refused");
    }

    #[test]
    fn test_transient_kinds() {
        assert!(AppError::store("down").is_transient());
        assert!(AppError::timeout("slow").is_transient());
        assert!(!AppError::validation("bad").is_transient());
        assert!(!AppError::configuration("bad").is_transient());
    }

    #[test]
    fn test_clone_drops_source() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = AppError::from(json_err);
        assert_eq!(err.kind, ErrorKind::Serialization);
        assert!(err.source.is_some());
        assert!(err.clone().source.is_none());
    }
}
