//! The reconciler: one pass of the control loop for one target.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use warden_core::{
    Condition, ConditionStatus, OwnerReference, ResourceSet, Target, TargetId, TargetPhase,
    ANNOTATION_ERROR_COUNT, ANNOTATION_LAST_RECOVERY,
};
use warden_platform::{
    DependencyReader, Event, EventRecorder, ObjectKey, ObjectStore, TargetClient,
};

use crate::classify::{classify, ErrorCategory};
use crate::detector::{self, Decision, DetectInput, ANNOTATION_LAST_SEEN_VERSION};
use crate::error::{Error, Result};
use crate::expand;
use crate::lock::LockManager;
use crate::pipeline::Pipeline;
use crate::quorum::StartQuorumGate;
use crate::retry::{BackoffPolicy, Remediation, RetryAction, RetryController};
use crate::store::VersionedStateStore;

/// Condition type recording the outcome of the last reconciliation.
const CONDITION_RECONCILED: &str = "Reconciled";
/// Condition type recording start-quorum satisfaction.
const CONDITION_QUORUM: &str = "QuorumSatisfied";

/// Annotation recording the last remediation applied to a target.
const ANNOTATION_REMEDIATION: &str = "warden.sh/remediation";

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Live state matches the desired specification.
    Converged,
    /// Come back after the given delay.
    Requeue(Duration),
    /// Another reconciliation of this target is in flight; the external
    /// delivery mechanism will redeliver.
    Busy,
    /// The target was deleted and its state cleaned up.
    Removed,
    /// A permanent failure; automatic retries have stopped.
    Halted,
}

impl Outcome {
    /// Check if this is a converged outcome.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }

    /// The requeue delay, when one was scheduled.
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::Requeue(delay) => Some(*delay),
            _ => None,
        }
    }
}

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Base delay for transient-error backoff.
    pub backoff_base: Duration,
    /// Cap on transient-error backoff.
    pub backoff_cap: Duration,
    /// Fixed delay for unclassifiable errors.
    pub unknown_delay: Duration,
    /// Fixed delay after a recovery attempt.
    pub recovery_delay: Duration,
    /// Minimum gap between recovery attempts.
    pub recovery_cooldown: Duration,
    /// Fixed re-check interval while the start quorum is unmet.
    pub quorum_recheck: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(300),
            unknown_delay: Duration::from_secs(30),
            recovery_delay: Duration::from_secs(60),
            recovery_cooldown: Duration::from_secs(600),
            quorum_recheck: Duration::from_secs(10),
        }
    }
}

/// Drives one target through lock, change detection, state rotation, the
/// secondary-resource pipeline, and error classification.
pub struct Reconciler {
    locks: Arc<LockManager>,
    objects: Arc<dyn ObjectStore>,
    targets: Arc<dyn TargetClient>,
    recorder: Arc<dyn EventRecorder>,
    state: VersionedStateStore,
    pipeline: Pipeline,
    retry: RetryController,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler from its collaborators.
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        targets: Arc<dyn TargetClient>,
        deps: Arc<dyn DependencyReader>,
        recorder: Arc<dyn EventRecorder>,
        locks: Arc<LockManager>,
        config: ReconcilerConfig,
    ) -> Self {
        let state = VersionedStateStore::new(Arc::clone(&objects));
        let pipeline = Pipeline::new(
            Arc::clone(&objects),
            Arc::clone(&targets),
            Arc::clone(&recorder),
            StartQuorumGate::new(deps),
        );
        let retry = RetryController {
            backoff: BackoffPolicy::new(config.backoff_base, config.backoff_cap),
            unknown_delay: config.unknown_delay,
            recovery_delay: config.recovery_delay,
            recovery_cooldown: config.recovery_cooldown,
        };
        Self {
            locks,
            objects,
            targets,
            recorder,
            state,
            pipeline,
            retry,
            config,
        }
    }

    /// Reconcile one target.
    ///
    /// Never blocks: a held lock returns [`Outcome::Busy`] immediately, and
    /// every wait is expressed as a requeue delay for the external delivery
    /// mechanism.
    pub async fn reconcile(&self, id: &TargetId) -> Outcome {
        if !self.locks.acquire(id) {
            debug!(target_id = %id, "Target already being reconciled");
            return Outcome::Busy;
        }
        let outcome = self.reconcile_locked(id).await;
        self.locks.release(id);
        outcome
    }

    /// The lock manager, for embedders sharing it across controllers.
    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// The configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    async fn reconcile_locked(&self, id: &TargetId) -> Outcome {
        let target = match self.targets.get(id).await {
            Ok(target) => target,
            Err(err) if err.is_not_found() => {
                return self.cleanup_after_missing(id).await;
            }
            Err(err) => return self.handle_error(id, None, err.into()).await,
        };

        if target.deleted {
            return self.finalize(&target).await;
        }

        match self.converge(&target).await {
            Ok(outcome) => outcome,
            Err(err) => self.handle_error(id, Some(&target), err).await,
        }
    }

    /// Expand, rotate, and drive the pipeline for a live target.
    async fn converge(&self, target: &Target) -> Result<Outcome> {
        let fingerprint = target.spec.fingerprint();
        let stored = self.state.get_latest(&target.id).await?;
        let decision = detector::decide(DetectInput {
            fingerprint: &fingerprint,
            phase: target.phase(),
            stored: stored.as_ref(),
            target_modified_offline: target_modified_offline(target),
        });

        let (set, previous) = match decision {
            Decision::Skip => {
                debug!(target_id = %target.id, "Specification unchanged, reusing stored set");
                let Some(stored) = stored else {
                    // decide() only skips with a stored set on record
                    return Err(Error::invalid_config("skip decision without stored set"));
                };
                let previous = self.state.get_previous(&target.id).await?;
                (stored, previous)
            }
            Decision::Recompute(reason) => {
                debug!(target_id = %target.id, reason = ?reason, "Recomputing resource set");
                self.recompute(target, stored).await?
            }
        };

        let report = self
            .pipeline
            .reconcile_all(target, &set, previous.as_ref())
            .await?;

        if let Some(reason) = report.quorum_blocked {
            return self.enter_waiting(&target.id, reason).await;
        }

        self.mark_converged(&target.id, &fingerprint).await?;
        if report.is_quiet() {
            debug!(target_id = %target.id, "Target converged with no writes");
        } else {
            info!(
                target_id = %target.id,
                created = report.created,
                patched = report.patched,
                deleted = report.deleted,
                "Target converged"
            );
        }
        Ok(Outcome::Converged)
    }

    /// Expand a new resource set and rotate it into the state store.
    ///
    /// The rotation is skipped when the stored latest was produced by the
    /// same specification generation: re-storing an identical set would
    /// clobber the real previous slot.
    async fn recompute(
        &self,
        target: &Target,
        stored: Option<ResourceSet>,
    ) -> Result<(ResourceSet, Option<ResourceSet>)> {
        let next_version = stored.as_ref().map_or(1, |s| s.version + 1);
        let mut set = expand::expand(target, next_version)?;

        if let Some(stored) = stored {
            if stored.generation == set.generation {
                let previous = self.state.get_previous(&target.id).await?;
                return Ok((stored, previous));
            }
            set.carry_deletions_from(&stored);
            let owner = OwnerReference::target(target.uid, &target.id);
            self.state.store(&target.id, set.clone(), &owner).await?;
            Ok((set, Some(stored)))
        } else {
            let owner = OwnerReference::target(target.uid, &target.id);
            self.state.store(&target.id, set.clone(), &owner).await?;
            Ok((set, None))
        }
    }

    /// Record success: phase Running, observed generation, error counters
    /// cleared.
    async fn mark_converged(&self, id: &TargetId, fingerprint: &str) -> Result<()> {
        let fresh = self.targets.get(id).await?;

        if fresh.annotations.contains_key(ANNOTATION_ERROR_COUNT) {
            let mut clear = BTreeMap::new();
            clear.insert(ANNOTATION_ERROR_COUNT.to_string(), String::new());
            self.targets.merge_annotations(id, clear).await?;
        }

        let fresh = self.targets.get(id).await?;
        let mut status = fresh.status.clone();
        status.phase = Some(TargetPhase::Running);
        status.observed_generation = Some(fingerprint.to_string());
        status.set_condition(Condition::new(
            CONDITION_RECONCILED,
            ConditionStatus::True,
            "ConvergenceSucceeded",
            "live state matches the desired specification",
        ));
        status.set_condition(Condition::new(
            CONDITION_QUORUM,
            ConditionStatus::True,
            "QuorumSatisfied",
            "all start-quorum dependencies are ready",
        ));
        // Steady state: an identical status is not rewritten
        if status != fresh.status {
            self.targets
                .update_status(id, status, fresh.resource_version)
                .await?;
        }
        Ok(())
    }

    /// Record a quorum wait: phase Waiting plus a fixed short re-check.
    ///
    /// This is an expected, bounded wait, not a fault: no backoff.
    async fn enter_waiting(&self, id: &TargetId, reason: String) -> Result<Outcome> {
        let fresh = self.targets.get(id).await?;
        let mut status = fresh.status.clone();
        status.phase = Some(TargetPhase::Waiting);
        status.set_condition(Condition::new(
            CONDITION_QUORUM,
            ConditionStatus::False,
            "QuorumBlocked",
            reason.clone(),
        ));
        self.targets
            .update_status(id, status, fresh.resource_version)
            .await?;
        info!(target_id = %id, reason = %reason, "Waiting for start quorum");
        Ok(Outcome::Requeue(self.config.quorum_recheck))
    }

    /// Deletion path for a target the user removed.
    ///
    /// Cascading deletion of managed resources is delegated to the
    /// platform's ownership references; this is the best-effort path
    /// covering edge cases, so every not-found is success.
    async fn finalize(&self, target: &Target) -> Outcome {
        if let Ok(Some(latest)) = self.state.get_latest(&target.id).await {
            for resource in latest.resources() {
                let key = ObjectKey::resource(resource.kind, &target.id, resource.name.clone());
                match self.objects.delete(&key).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => {
                        warn!(target_id = %target.id, key = %key, error = %err, "Best-effort delete failed");
                    }
                }
            }
        }
        match self.state.destroy(&target.id).await {
            Ok(()) => {}
            Err(err) if err.api().is_some_and(warden_platform::ApiError::is_not_found) => {}
            Err(err) => {
                warn!(target_id = %target.id, error = %err, "State blob cleanup failed");
            }
        }
        self.recorder.record(
            &target.id,
            Event::normal("Removed", "target deleted, managed state cleaned up"),
        );
        info!(target_id = %target.id, "Target removed");
        Outcome::Removed
    }

    /// The target object is gone entirely; reclaim any orphaned state blob.
    async fn cleanup_after_missing(&self, id: &TargetId) -> Outcome {
        match self.state.destroy(id).await {
            Ok(()) => {}
            Err(err) if err.api().is_some_and(warden_platform::ApiError::is_not_found) => {}
            Err(err) => {
                warn!(target_id = %id, error = %err, "Orphaned state cleanup failed");
            }
        }
        debug!(target_id = %id, "Target gone before reconciliation");
        Outcome::Removed
    }

    /// Classify a failure and select requeue/backoff/recovery/give-up.
    async fn handle_error(&self, id: &TargetId, target: Option<&Target>, err: Error) -> Outcome {
        let category = classify(&err);
        let message = err.to_string();
        warn!(target_id = %id, category = %category, error = %message, "Reconciliation failed");

        let attempt = self.bump_error_count(id, target).await;
        self.record_failure(id, category, &message).await;

        let last_recovery = target.and_then(last_recovery_stamp);
        let action = self
            .retry
            .action(category, attempt, &message, last_recovery, Utc::now());

        match action {
            RetryAction::RequeueAfter(delay) => Outcome::Requeue(delay),
            RetryAction::Recover(remediation, delay) => {
                self.apply_remediation(id, remediation).await;
                Outcome::Requeue(delay)
            }
            RetryAction::GiveUp => {
                self.mark_failed(id).await;
                Outcome::Halted
            }
        }
    }

    /// Increment the consecutive-error annotation, returning the new count.
    async fn bump_error_count(&self, id: &TargetId, target: Option<&Target>) -> u32 {
        let current = target
            .and_then(|t| t.annotations.get(ANNOTATION_ERROR_COUNT))
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        let next = current.saturating_add(1);

        let mut bump = BTreeMap::new();
        bump.insert(ANNOTATION_ERROR_COUNT.to_string(), next.to_string());
        if let Err(err) = self.targets.merge_annotations(id, bump).await {
            warn!(target_id = %id, error = %err, "Failed to record error count");
        }
        next
    }

    /// Record the failure as a condition and an event, independent of the
    /// action taken.
    async fn record_failure(&self, id: &TargetId, category: ErrorCategory, message: &str) {
        self.recorder.record(
            id,
            Event::warning("ReconcileFailed", format!("{category}: {message}")),
        );
        let Ok(fresh) = self.targets.get(id).await else {
            return;
        };
        let mut status = fresh.status.clone();
        status.set_condition(Condition::new(
            CONDITION_RECONCILED,
            ConditionStatus::False,
            category.as_str(),
            message,
        ));
        if let Err(err) = self
            .targets
            .update_status(id, status, fresh.resource_version)
            .await
        {
            warn!(target_id = %id, error = %err, "Failed to record failure condition");
        }
    }

    /// Apply a best-effort remediation: diagnostic/bypass annotations only.
    async fn apply_remediation(&self, id: &TargetId, remediation: Remediation) {
        let mut notes = BTreeMap::new();
        notes.insert(
            ANNOTATION_LAST_RECOVERY.to_string(),
            Utc::now().to_rfc3339(),
        );
        notes.insert(
            ANNOTATION_REMEDIATION.to_string(),
            remediation.as_str().to_string(),
        );
        if let Err(err) = self.targets.merge_annotations(id, notes).await {
            warn!(target_id = %id, error = %err, "Failed to record remediation");
            return;
        }
        self.recorder.record(
            id,
            Event::normal(
                "RecoveryAttempted",
                format!("applied remediation {}", remediation.as_str()),
            ),
        );
        info!(target_id = %id, remediation = remediation.as_str(), "Recovery attempted");
    }

    /// Permanent failure: surface and stop requeueing.
    async fn mark_failed(&self, id: &TargetId) {
        let Ok(fresh) = self.targets.get(id).await else {
            return;
        };
        let mut status = fresh.status.clone();
        status.phase = Some(TargetPhase::Failed);
        if let Err(err) = self
            .targets
            .update_status(id, status, fresh.resource_version)
            .await
        {
            warn!(target_id = %id, error = %err, "Failed to record Failed phase");
        }
    }

}

/// Version-marker check for the legacy change-detector shim.
///
/// Protocol 1 orchestrators annotated targets with the object version they
/// last reconciled; a mismatch means the target changed while no
/// orchestrator was running.
fn target_modified_offline(target: &Target) -> bool {
    target
        .annotations
        .get(ANNOTATION_LAST_SEEN_VERSION)
        .and_then(|v| v.parse::<u64>().ok())
        .is_some_and(|seen| seen != target.resource_version)
}

fn last_recovery_stamp(target: &Target) -> Option<DateTime<Utc>> {
    target
        .annotations
        .get(ANNOTATION_LAST_RECOVERY)
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Builder for [`Reconciler`].
pub struct ReconcilerBuilder {
    objects: Option<Arc<dyn ObjectStore>>,
    targets: Option<Arc<dyn TargetClient>>,
    deps: Option<Arc<dyn DependencyReader>>,
    recorder: Option<Arc<dyn EventRecorder>>,
    locks: Option<Arc<LockManager>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            objects: None,
            targets: None,
            deps: None,
            recorder: None,
            locks: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the object store.
    pub fn with_objects(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    /// Set the target client.
    pub fn with_targets(mut self, targets: Arc<dyn TargetClient>) -> Self {
        self.targets = Some(targets);
        self
    }

    /// Set the dependency reader.
    pub fn with_deps(mut self, deps: Arc<dyn DependencyReader>) -> Self {
        self.deps = Some(deps);
        self
    }

    /// Set the event recorder.
    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Share a lock manager with other controllers.
    pub fn with_locks(mut self, locks: Arc<LockManager>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the reconciler.
    pub fn build(self) -> Result<Reconciler> {
        let objects = self
            .objects
            .ok_or_else(|| Error::invalid_config("object store is required"))?;
        let targets = self
            .targets
            .ok_or_else(|| Error::invalid_config("target client is required"))?;
        let deps = self
            .deps
            .ok_or_else(|| Error::invalid_config("dependency reader is required"))?;
        let recorder = self
            .recorder
            .ok_or_else(|| Error::invalid_config("event recorder is required"))?;
        let locks = self.locks.unwrap_or_else(LockManager::new_arc);
        Ok(Reconciler::new(
            objects, targets, deps, recorder, locks, self.config,
        ))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use warden_core::TargetSpec;
    use warden_platform::{
        InMemoryDependencyReader, InMemoryEventRecorder, InMemoryObjectStore, InMemoryTargetClient,
    };

    #[test]
    fn test_builder_requires_collaborators() {
        let result = ReconcilerBuilder::new().build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_wires_defaults() {
        let reconciler = ReconcilerBuilder::new()
            .with_objects(InMemoryObjectStore::new_arc())
            .with_targets(InMemoryTargetClient::new_arc())
            .with_deps(InMemoryDependencyReader::new_arc())
            .with_recorder(InMemoryEventRecorder::new_arc())
            .build()
            .unwrap();
        assert_eq!(reconciler.config().quorum_recheck, Duration::from_secs(10));
        assert_eq!(reconciler.locks().held_count(), 0);
    }

    #[test]
    fn test_shared_lock_manager_is_respected() {
        let locks = LockManager::new_arc();
        let reconciler = ReconcilerBuilder::new()
            .with_objects(InMemoryObjectStore::new_arc())
            .with_targets(InMemoryTargetClient::new_arc())
            .with_deps(InMemoryDependencyReader::new_arc())
            .with_recorder(InMemoryEventRecorder::new_arc())
            .with_locks(Arc::clone(&locks))
            .build()
            .unwrap();

        let id = TargetId::new("ns", "t");
        assert!(locks.acquire(&id));
        assert!(reconciler.locks().is_held(&id));
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(Outcome::Converged.is_converged());
        assert!(!Outcome::Busy.is_converged());
        assert_eq!(
            Outcome::Requeue(Duration::from_secs(7)).requeue_after(),
            Some(Duration::from_secs(7))
        );
        assert_eq!(Outcome::Halted.requeue_after(), None);
    }

    #[test]
    fn test_offline_modification_marker() {
        let mut target = Target::new(TargetId::new("ns", "t"), TargetSpec::default());
        assert!(!target_modified_offline(&target));

        target.annotations.insert(
            ANNOTATION_LAST_SEEN_VERSION.to_string(),
            target.resource_version.to_string(),
        );
        assert!(!target_modified_offline(&target));

        target.resource_version += 3;
        assert!(target_modified_offline(&target));
    }
}
