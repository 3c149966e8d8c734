//! Error classification for retry/backoff/recovery decisions.

use warden_platform::ApiError;

use crate::error::Error;

/// Category assigned to a classified reconciliation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Expected to clear on its own; requeue with exponential backoff.
    Transient,
    /// Requires operator intervention; stop requeueing.
    Permanent,
    /// A bounded, throttled remediation exists.
    Recoverable,
    /// Nothing matched; requeue after a fixed short delay.
    Unknown,
}

impl ErrorCategory {
    /// Stable string form for conditions and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "Transient",
            Self::Permanent => "Permanent",
            Self::Recoverable => "Recoverable",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known network/API failure text; matched case-insensitively.
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "broken pipe",
    "no route to host",
    "tls handshake",
    "i/o timeout",
    "temporarily unavailable",
    "too many requests",
    "leader changed",
    "the object has been modified",
];

/// Known authorization/validation/immutability failure text.
const PERMANENT_PATTERNS: &[&str] = &[
    "forbidden",
    "unauthorized",
    "admission webhook",
    "is invalid",
    "field is immutable",
    "may not change",
    "unsupported value",
];

/// Known capacity/scheduling/disruption failure text.
const RECOVERABLE_PATTERNS: &[&str] = &[
    "exceeded quota",
    "insufficient cpu",
    "insufficient memory",
    "unschedulable",
    "disruption budget",
    "preemption",
    "volume node affinity",
];

/// Classify one reconciliation failure.
///
/// Structural platform codes are inspected first; everything else falls
/// back to substring matching against the known failure-text tables, in
/// the order transient, permanent, recoverable.
pub fn classify(error: &Error) -> ErrorCategory {
    if let Some(api) = error.api() {
        if api.is_transient() {
            return ErrorCategory::Transient;
        }
        if matches!(api, ApiError::Forbidden { .. } | ApiError::Invalid { .. }) {
            return ErrorCategory::Permanent;
        }
    }

    let message = error.to_string().to_lowercase();
    if matches_any(&message, TRANSIENT_PATTERNS) {
        return ErrorCategory::Transient;
    }
    if matches_any(&message, PERMANENT_PATTERNS) {
        return ErrorCategory::Permanent;
    }
    if matches_any(&message, RECOVERABLE_PATTERNS) {
        return ErrorCategory::Recoverable;
    }
    ErrorCategory::Unknown
}

fn matches_any(message: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| message.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_platform::ApiError;

    #[test]
    fn test_structural_codes_classify_first() {
        assert_eq!(
            classify(&Error::Api(ApiError::not_found("x"))),
            ErrorCategory::Transient
        );
        assert_eq!(
            classify(&Error::Api(ApiError::conflict("x", 1, 2))),
            ErrorCategory::Transient
        );
        assert_eq!(
            classify(&Error::Api(ApiError::Timeout { timeout_ms: 10 })),
            ErrorCategory::Transient
        );
        assert_eq!(
            classify(&Error::Api(ApiError::forbidden("rbac says no"))),
            ErrorCategory::Permanent
        );
        assert_eq!(
            classify(&Error::Api(ApiError::invalid("bad replica count"))),
            ErrorCategory::Permanent
        );
    }

    #[test]
    fn test_network_text_is_transient() {
        let err = Error::Api(ApiError::Internal(
            "dial tcp 10.0.0.2:443: connection refused".to_string(),
        ));
        assert_eq!(classify(&err), ErrorCategory::Transient);
    }

    #[test]
    fn test_immutability_text_is_permanent() {
        let err = Error::Api(ApiError::Internal(
            "StatefulGroup.spec.serviceName: field is immutable".to_string(),
        ));
        assert_eq!(classify(&err), ErrorCategory::Permanent);
    }

    #[test]
    fn test_capacity_text_is_recoverable() {
        let err = Error::Api(ApiError::Internal(
            "cannot evict pod as it would violate the pod's disruption budget".to_string(),
        ));
        assert_eq!(classify(&err), ErrorCategory::Recoverable);

        let err = Error::Api(ApiError::Internal("exceeded quota: pods=10".to_string()));
        assert_eq!(classify(&err), ErrorCategory::Recoverable);
    }

    #[test]
    fn test_unmatched_text_is_unknown() {
        let err = Error::expansion("some novel failure nobody has seen");
        assert_eq!(classify(&err), ErrorCategory::Unknown);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let err = Error::Api(ApiError::Internal("Connection Refused by peer".to_string()));
        assert_eq!(classify(&err), ErrorCategory::Transient);
    }
}
