//! Core error types for LogSet operations.
//!
//! Errors fall into four groups:
//! - transient I/O against the object store (`Api`, `Conflict`), always propagated
//! - expected absence/presence (`NotFound`, `AlreadyExists`), swallowed only where
//!   the absence itself is the information being asked for
//! - aggregates (`Combined`) from fan-out steps
//! - invariant violations, which fail the pass loudly

use thiserror::Error;

use crate::combined::CombinedError;

/// Core error type for LogSet operations.
#[derive(Debug, Error)]
pub enum Error {
    // Object store errors
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("conflict writing {kind} '{name}': {reason}")]
    Conflict {
        kind: String,
        name: String,
        reason: String,
    },

    #[error("API request '{operation}' failed: {reason}")]
    Api { operation: String, reason: String },

    // Encoding errors
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    // Desired-state errors
    #[error("invalid LogSet spec: {reason}")]
    InvalidSpec { reason: String },

    #[error("invariant violated: {reason}")]
    InvariantViolation { reason: String },

    #[error("configuration error: {reason}")]
    Config { reason: String },

    // Fan-out aggregate
    #[error(transparent)]
    Combined(#[from] CombinedError),
}

impl Error {
    /// Create a not found error.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a write conflict error.
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an API error.
    pub fn api(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create an invalid spec error.
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            reason: reason.into(),
        }
    }

    /// Create an invariant violation error.
    pub fn invariant_violation(reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("StatefulSet", "ls-log");
        assert_eq!(err.to_string(), "StatefulSet 'ls-log' not found");
    }

    #[test]
    fn test_classification() {
        let err = Error::not_found("Service", "ls-log-discovery");
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
        assert!(!Error::api("get", "timeout").is_not_found());
    }

    #[test]
    fn test_conflict() {
        let err = Error::conflict("StatefulSet", "ls-log", "resourceVersion 3 != 4");
        assert!(err.is_conflict());
        assert!(err.to_string().contains("resourceVersion"));
    }
}
