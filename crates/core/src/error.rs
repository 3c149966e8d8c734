//! Core error types for Warden operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Warden domain operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("duplicate resource ({kind}, {name}) in set")]
    DuplicateResource { kind: String, name: String },

    #[error("JSON serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("invalid specification: {reason}")]
    InvalidSpec { reason: String },
}

impl Error {
    /// Create a duplicate resource error.
    pub fn duplicate_resource(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DuplicateResource {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create an invalid specification error.
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::duplicate_resource("config-data", "conf");
        assert!(err.to_string().contains("config-data"));
        assert!(err.to_string().contains("conf"));
    }
}
