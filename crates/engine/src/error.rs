//! Error types for the engine crate.

use std::fmt;

use warden_platform::ApiError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types.
#[derive(Debug, Clone)]
pub enum Error {
    /// A platform API call failed.
    Api(ApiError),
    /// Encoding or decoding persisted state failed.
    Codec { what: String, reason: String },
    /// Spec expansion produced an invalid resource set.
    Expansion { reason: String },
    /// The start quorum is not satisfied.
    QuorumBlocked { reason: String },
    /// The target is gone from the platform.
    TargetGone { target: String },
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(err) => {
                write!(f, "platform error: {err}")
            }
            Self::Codec { what, reason } => {
                write!(f, "failed to encode/decode {what}: {reason}")
            }
            Self::Expansion { reason } => {
                write!(f, "spec expansion failed: {reason}")
            }
            Self::QuorumBlocked { reason } => {
                write!(f, "start quorum not satisfied: {reason}")
            }
            Self::TargetGone { target } => {
                write!(f, "target '{target}' no longer exists")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

impl From<warden_core::Error> for Error {
    fn from(err: warden_core::Error) -> Self {
        Self::Expansion {
            reason: err.to_string(),
        }
    }
}

impl Error {
    /// Create a codec error.
    pub fn codec(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Codec {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Create an expansion error.
    pub fn expansion(reason: impl Into<String>) -> Self {
        Self::Expansion {
            reason: reason.into(),
        }
    }

    /// Create a quorum-blocked error.
    pub fn quorum_blocked(reason: impl Into<String>) -> Self {
        Self::QuorumBlocked {
            reason: reason.into(),
        }
    }

    /// Create a target-gone error.
    pub fn target_gone(target: impl Into<String>) -> Self {
        Self::TargetGone {
            target: target.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// The structural platform error, when this wraps one.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::codec("resource set", "missing field");
        assert!(err.to_string().contains("resource set"));
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_api_error_passthrough() {
        let err: Error = ApiError::not_found("endpoint/ns/svc").into();
        assert!(err.api().is_some_and(ApiError::is_not_found));
        assert!(err.to_string().contains("endpoint/ns/svc"));
    }
}
