//! Retry actions, backoff, and throttled best-effort remediations.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::classify::ErrorCategory;

/// Exponential backoff for transient failures.
///
/// Delay formula: min(base * 2^attempt, cap). Attempts are tracked on the
/// target itself (error-count annotation) so the policy needs no state.
/// Requeue delays carry no jitter: scheduled delays must be non-decreasing
/// across consecutive failures.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for the first retry.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    /// Create a policy from base and cap.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay for the given attempt number (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(factor);
        delay.min(self.cap)
    }
}

/// A category-specific best-effort remediation.
///
/// Remediations only add diagnostic/bypass annotations to the target; none
/// of them resolves the underlying platform condition. They are signaling,
/// not guaranteed recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Flag a disruption-budget conflict for the operator.
    FlagDisruptionBudget,
    /// Bypass a stuck finalizer during deletion.
    BypassStuckFinalizer,
    /// Force another reconcile pass.
    ForceRetry,
}

impl Remediation {
    /// Stable string form for annotations and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlagDisruptionBudget => "flag-disruption-budget",
            Self::BypassStuckFinalizer => "bypass-stuck-finalizer",
            Self::ForceRetry => "force-retry",
        }
    }

    /// Pick the remediation for a recoverable failure message.
    pub fn for_message(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("disruption budget") {
            Self::FlagDisruptionBudget
        } else if lowered.contains("finalizer") {
            Self::BypassStuckFinalizer
        } else {
            Self::ForceRetry
        }
    }
}

/// What the caller should do after a classified failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Requeue after the given delay.
    RequeueAfter(Duration),
    /// Attempt a remediation, then requeue after the given delay.
    Recover(Remediation, Duration),
    /// Stop requeueing; operator intervention is required.
    GiveUp,
}

/// Selects retry actions per category; the single place where
/// retry/backoff/recovery decisions are made.
#[derive(Debug, Clone)]
pub struct RetryController {
    /// Backoff policy for transient failures.
    pub backoff: BackoffPolicy,
    /// Fixed delay for unknown failures.
    pub unknown_delay: Duration,
    /// Fixed delay after a recovery attempt.
    pub recovery_delay: Duration,
    /// Minimum gap between recovery attempts per target.
    pub recovery_cooldown: Duration,
}

impl Default for RetryController {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            unknown_delay: Duration::from_secs(30),
            recovery_delay: Duration::from_secs(60),
            recovery_cooldown: Duration::from_secs(600),
        }
    }
}

impl RetryController {
    /// Select the action for a classified failure.
    ///
    /// `attempt` is the consecutive error count recorded on the target
    /// (already incremented for this failure); `message` is the failure text
    /// used to pick a remediation; `last_recovery` is the timestamp of the
    /// previous recovery attempt, if any.
    pub fn action(
        &self,
        category: ErrorCategory,
        attempt: u32,
        message: &str,
        last_recovery: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RetryAction {
        match category {
            ErrorCategory::Transient => {
                RetryAction::RequeueAfter(self.backoff.delay(attempt.saturating_sub(1)))
            }
            ErrorCategory::Permanent => RetryAction::GiveUp,
            ErrorCategory::Recoverable => {
                if self.recovery_allowed(last_recovery, now) {
                    RetryAction::Recover(Remediation::for_message(message), self.recovery_delay)
                } else {
                    RetryAction::RequeueAfter(self.recovery_delay)
                }
            }
            ErrorCategory::Unknown => RetryAction::RequeueAfter(self.unknown_delay),
        }
    }

    fn recovery_allowed(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed.to_std().map_or(true, |e| e >= self.recovery_cooldown)
            }
        }
    }
}
