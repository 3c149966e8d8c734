//! Target specification, status and lifecycle phases.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ids::{TargetId, TargetUid};
use crate::resource::{canonical_json, hex_digest};

/// Lifecycle phase of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetPhase {
    /// Observed but not yet reconciled.
    Pending,
    /// Initial resource creation in progress.
    Creating,
    /// Converged: live state matches the desired specification.
    Running,
    /// A change is being rolled out.
    Upgrading,
    /// Blocked on the start quorum.
    Waiting,
    /// A permanent error requires operator intervention.
    Failed,
}

impl TargetPhase {
    /// Check if this is the converged phase.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Stable string form for log fields and conditions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Creating => "Creating",
            Self::Running => "Running",
            Self::Upgrading => "Upgrading",
            Self::Waiting => "Waiting",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for TargetPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status value of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// Condition holds.
    True,
    /// Condition does not hold.
    False,
    /// Condition cannot be determined.
    Unknown,
}

/// One visible status condition on a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Condition type, unique within a status.
    pub condition_type: String,
    /// Current status of the condition.
    pub status: ConditionStatus,
    /// Machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
    /// When the status last changed.
    pub last_transition: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition stamped with the current time.
    pub fn new(
        condition_type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition: Utc::now(),
        }
    }
}

/// Visible status of a target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetStatus {
    /// Current lifecycle phase.
    pub phase: Option<TargetPhase>,
    /// Generation fingerprint last fully reconciled.
    pub observed_generation: Option<String>,
    /// Ready replicas reported by the workload.
    pub ready_replicas: u32,
    /// Status conditions, at most one per type.
    pub conditions: Vec<Condition>,
}

impl TargetStatus {
    /// Upsert a condition by type.
    ///
    /// The transition time is preserved when the status value is unchanged,
    /// so repeated reconciliations do not churn timestamps.
    pub fn set_condition(&mut self, condition: Condition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            let transition = if existing.status == condition.status {
                existing.last_transition
            } else {
                condition.last_transition
            };
            *existing = Condition {
                last_transition: transition,
                ..condition
            };
            return;
        }
        self.conditions.push(condition);
    }

    /// Look up a condition by type.
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

/// A named dependency that must be ready before the primary workload starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumDependency {
    /// Dependency target.
    pub target: TargetId,
    /// Minimum ready replicas required; any readiness counts when absent.
    pub min_ready: Option<u32>,
}

impl QuorumDependency {
    /// Create a dependency with no minimum ready count.
    pub fn new(target: TargetId) -> Self {
        Self {
            target,
            min_ready: None,
        }
    }

    /// Require a minimum ready-replica count.
    pub fn with_min_ready(mut self, min_ready: u32) -> Self {
        self.min_ready = Some(min_ready);
        self
    }
}

/// Specification of a batch-job workload attached to a target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSpec {
    /// Command the job runs.
    pub command: Vec<String>,
    /// Completions required before the job counts as done.
    pub completions: Option<u32>,
}

/// The user-supplied desired specification for one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Desired replica count; zero when absent.
    pub replicas: Option<u32>,
    /// Configuration entries rendered into the config-data resource.
    pub config: BTreeMap<String, String>,
    /// Keys expected in the secret-data resource.
    pub secret_keys: Vec<String>,
    /// Whether to expose a metrics-scrape endpoint.
    pub metrics_enabled: bool,
    /// Optional batch workload.
    pub batch: Option<BatchSpec>,
    /// Dependencies gating the primary workload's creation.
    pub start_quorum: Vec<QuorumDependency>,
    /// Free-form annotations on the specification. Part of the generation
    /// fingerprint but not rendered into any managed resource.
    pub annotations: BTreeMap<String, String>,
}

impl TargetSpec {
    /// Effective replica count (zero-replica implied default).
    pub fn replica_count(&self) -> u32 {
        self.replicas.unwrap_or(0)
    }

    /// Content-derived generation fingerprint of this specification.
    ///
    /// Hex SHA-256 over the canonical JSON serialization; stable across
    /// map ordering and field additions with default values omitted.
    pub fn fingerprint(&self) -> String {
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        let mut hasher = Sha256::new();
        hasher.update(canonical_json(&value).as_bytes());
        hex_digest(hasher)
    }
}

/// One user-declared deployment specification under management.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Namespaced identity.
    pub id: TargetId,
    /// Instance UID, fresh per creation.
    pub uid: TargetUid,
    /// Optimistic-concurrency version of the target object.
    pub resource_version: u64,
    /// Free-form annotations; also used by the retry controller.
    pub annotations: BTreeMap<String, String>,
    /// Desired specification.
    pub spec: TargetSpec,
    /// Visible status.
    pub status: TargetStatus,
    /// True once the user has deleted the specification.
    #[serde(default)]
    pub deleted: bool,
}

impl Target {
    /// Create a new target with an empty status.
    pub fn new(id: TargetId, spec: TargetSpec) -> Self {
        Self {
            id,
            uid: TargetUid::new(),
            resource_version: 1,
            annotations: BTreeMap::new(),
            spec,
            status: TargetStatus::default(),
            deleted: false,
        }
    }

    /// Current phase, `Pending` when none has been set yet.
    pub fn phase(&self) -> TargetPhase {
        self.status.phase.unwrap_or(TargetPhase::Pending)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_fingerprint_stable() {
        let mut spec = TargetSpec::default();
        spec.config.insert("a".into(), "1".into());
        spec.config.insert("b".into(), "2".into());
        assert_eq!(spec.fingerprint(), spec.clone().fingerprint());
    }

    #[test]
    fn test_fingerprint_tracks_spec_changes() {
        let spec = TargetSpec::default();
        let mut changed = spec.clone();
        changed.replicas = Some(3);
        assert_ne!(spec.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn test_replica_count_defaults_to_zero() {
        assert_eq!(TargetSpec::default().replica_count(), 0);
    }

    #[test]
    fn test_set_condition_preserves_transition_time() {
        let mut status = TargetStatus::default();
        let first = Condition::new("Reconciled", ConditionStatus::True, "Done", "ok");
        let stamp = first.last_transition;
        status.set_condition(first);

        let repeat = Condition::new("Reconciled", ConditionStatus::True, "Done", "still ok");
        status.set_condition(repeat);
        let held = status.condition("Reconciled").unwrap();
        assert_eq!(held.last_transition, stamp);
        assert_eq!(held.message, "still ok");

        let flipped = Condition::new("Reconciled", ConditionStatus::False, "Error", "boom");
        let flip_stamp = flipped.last_transition;
        status.set_condition(flipped);
        let held = status.condition("Reconciled").unwrap();
        assert_eq!(held.last_transition, flip_stamp);
    }

    #[test]
    fn test_phase_defaults_to_pending() {
        let target = Target::new(TargetId::new("ns", "t"), TargetSpec::default());
        assert_eq!(target.phase(), TargetPhase::Pending);
        assert!(!target.phase().is_converged());
    }
}
