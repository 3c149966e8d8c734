//! Ordered reconciliation of secondary resources.
//!
//! Each resource kind is driven by the same per-resource state machine:
//! absent/desired-absent is a no-op, absent/desired-present creates,
//! present/desired-present maybe-updates, present/desired-deleted deletes.
//! Order matters: configuration artifacts must exist before the workload
//! that mounts them, and endpoints before anything that health-checks them.

use std::sync::Arc;

use serde_json::Value;
use warden_core::{
    ManagedResource, ResourceKind, ResourceSet, Target, TargetPhase, ANNOTATION_RESOURCE_HASH,
};
use warden_platform::{
    Event, EventRecorder, ObjectKey, ObjectStore, StoredObject, TargetClient,
};

use crate::error::Result;
use crate::patch::{self, PatchOutcome};
use crate::quorum::{QuorumVerdict, StartQuorumGate};

/// One kind-specific reconciler: a strategy value, not a subclass.
#[derive(Debug, Clone)]
pub struct KindReconciler {
    /// Resource kind this stage drives.
    pub kind: ResourceKind,
    /// Whether creation is gated on the start quorum.
    pub gated: bool,
    /// Dotted paths blanked on both sides before diffing, absorbing fields
    /// set by older orchestrator versions.
    pub blank_paths: &'static [&'static str],
}

impl KindReconciler {
    /// Create a stage for a kind, gated when the kind is primary.
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            gated: kind.is_primary(),
            blank_paths: &[],
        }
    }

    /// Set the legacy-field blank list for this kind.
    pub fn with_blank_paths(mut self, paths: &'static [&'static str]) -> Self {
        self.blank_paths = paths;
        self
    }
}

/// The declared stage order.
///
/// Stateful groups written by protocol 1 carried a scheduler hint that
/// newer templates no longer set; it is blanked before diffing to avoid
/// churn when upgrading the orchestrator itself.
pub fn default_stages() -> Vec<KindReconciler> {
    vec![
        KindReconciler::new(ResourceKind::ConfigData),
        KindReconciler::new(ResourceKind::SecretData),
        KindReconciler::new(ResourceKind::Endpoint),
        KindReconciler::new(ResourceKind::MetricsEndpoint),
        KindReconciler::new(ResourceKind::StatefulGroup)
            .with_blank_paths(&["spec.schedulerHint"]),
        KindReconciler::new(ResourceKind::BatchJob),
    ]
}

/// Counters and verdicts from one pipeline pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    /// Resources created.
    pub created: usize,
    /// Resources patched.
    pub patched: usize,
    /// Resources deleted.
    pub deleted: usize,
    /// Resources already in the desired state.
    pub unchanged: usize,
    /// Reason creation of primary resources was blocked, when it was.
    pub quorum_blocked: Option<String>,
}

impl PipelineReport {
    /// Whether this pass wrote nothing at all.
    pub fn is_quiet(&self) -> bool {
        self.created == 0 && self.patched == 0 && self.deleted == 0
    }
}

/// Ordered sequence of kind-specific reconcilers sharing one state machine.
pub struct Pipeline {
    objects: Arc<dyn ObjectStore>,
    targets: Arc<dyn TargetClient>,
    recorder: Arc<dyn EventRecorder>,
    gate: StartQuorumGate,
    stages: Vec<KindReconciler>,
}

impl Pipeline {
    /// Create a pipeline with the default stage order.
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        targets: Arc<dyn TargetClient>,
        recorder: Arc<dyn EventRecorder>,
        gate: StartQuorumGate,
    ) -> Self {
        Self {
            objects,
            targets,
            recorder,
            gate,
            stages: default_stages(),
        }
    }

    /// Replace the stage list (tests, embedders with custom kinds).
    pub fn with_stages(mut self, stages: Vec<KindReconciler>) -> Self {
        self.stages = stages;
        self
    }

    /// Run every stage in declared order against the desired set.
    ///
    /// `previous` is the prior desired set, used as the three-way patch
    /// engine's original reference so live-only changes are preserved.
    /// The first platform failure aborts the pass; the next reconciliation
    /// recomputes from observed state.
    pub async fn reconcile_all(
        &self,
        target: &Target,
        set: &ResourceSet,
        previous: Option<&ResourceSet>,
    ) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        // The quorum is consulted at most once per pass, at the first
        // gated create.
        let mut quorum: Option<QuorumVerdict> = None;

        for stage in &self.stages {
            for resource in set.of_kind(stage.kind) {
                self.reconcile_one(target, stage, resource, previous, &mut quorum, &mut report)
                    .await?;
            }
        }

        tracing::debug!(
            target_id = %target.id,
            created = report.created,
            patched = report.patched,
            deleted = report.deleted,
            unchanged = report.unchanged,
            "Pipeline pass complete"
        );
        Ok(report)
    }

    async fn reconcile_one(
        &self,
        target: &Target,
        stage: &KindReconciler,
        resource: &ManagedResource,
        previous: Option<&ResourceSet>,
        quorum: &mut Option<QuorumVerdict>,
        report: &mut PipelineReport,
    ) -> Result<()> {
        let key = ObjectKey::resource(stage.kind, &target.id, resource.name.clone());
        let live = match self.objects.get(&key).await {
            Ok(object) => Some(object),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };

        match (live, resource.deleted) {
            (None, true) => {
                // Already gone; nothing to do
                Ok(())
            }
            (None, false) => {
                if stage.gated {
                    let verdict = match quorum {
                        Some(v) => v.clone(),
                        None => {
                            let v = self.gate.check(&target.spec.start_quorum).await?;
                            *quorum = Some(v.clone());
                            v
                        }
                    };
                    if !verdict.is_satisfied() {
                        let reason = verdict.reason();
                        self.recorder.record(
                            &target.id,
                            Event::warning("QuorumBlocked", reason.clone()),
                        );
                        report.quorum_blocked.get_or_insert(reason);
                        return Ok(());
                    }
                }
                self.create(target, resource, &key).await?;
                report.created += 1;
                Ok(())
            }
            (Some(live), true) => {
                match self.objects.delete(&live.key).await {
                    Ok(()) => {}
                    // Idempotent delete: already gone counts as done
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err.into()),
                }
                self.recorder.record(
                    &target.id,
                    Event::normal("Deleted", format!("deleted {}", live.key)),
                );
                report.deleted += 1;
                Ok(())
            }
            (Some(live), false) => {
                self.maybe_update(target, stage, resource, previous, live, report)
                    .await
            }
        }
    }

    async fn create(
        &self,
        target: &Target,
        resource: &ManagedResource,
        key: &ObjectKey,
    ) -> Result<()> {
        let body = with_hash_annotation(&resource.body, &resource.content_hash());
        let object = StoredObject::new(key.clone(), body)
            .with_owner(warden_core::OwnerReference::target(target.uid, &target.id));
        self.objects.create(object).await?;
        self.recorder.record(
            &target.id,
            Event::normal("Created", format!("created {key}")),
        );
        Ok(())
    }

    async fn maybe_update(
        &self,
        target: &Target,
        stage: &KindReconciler,
        resource: &ManagedResource,
        previous: Option<&ResourceSet>,
        live: StoredObject,
        report: &mut PipelineReport,
    ) -> Result<()> {
        let desired_hash = resource.content_hash();
        if live_hash(&live) == Some(desired_hash.as_str()) {
            // Steady state: nothing changed since we wrote it
            report.unchanged += 1;
            return Ok(());
        }

        let original = previous
            .and_then(|p| p.get(stage.kind, &resource.name))
            .map(|prior| prior.body.clone())
            // No previous version: the live object itself is the baseline
            .unwrap_or_else(|| live.body.clone());
        let original = patch::blank_fields(&original, stage.blank_paths);
        let current_blanked = patch::blank_fields(&live.body, stage.blank_paths);
        let compare = StoredObject {
            body: current_blanked,
            ..live.clone()
        };
        let desired = with_hash_annotation(&resource.body, &desired_hash);

        let targets = Arc::clone(&self.targets);
        let id = target.id.clone();
        let outcome = patch::apply_if_changed(
            &self.objects,
            &compare,
            &original,
            &desired,
            move |_mutation| async move {
                // Flip to Upgrading only when a change is actually about
                // to be written
                let fresh = targets.get(&id).await?;
                if fresh.phase() != TargetPhase::Upgrading {
                    let mut status = fresh.status.clone();
                    status.phase = Some(TargetPhase::Upgrading);
                    targets
                        .update_status(&id, status, fresh.resource_version)
                        .await?;
                }
                Ok(())
            },
        )
        .await?;

        match outcome {
            PatchOutcome::NoOp => {
                report.unchanged += 1;
            }
            PatchOutcome::Applied(updated) => {
                self.recorder.record(
                    &target.id,
                    Event::normal("Patched", format!("patched {}", updated.key)),
                );
                report.patched += 1;
            }
        }
        Ok(())
    }
}

/// Inject the content hash into `metadata.annotations` of a resource body.
fn with_hash_annotation(body: &Value, hash: &str) -> Value {
    let mut result = body.clone();
    let root = match result.as_object_mut() {
        Some(map) => map,
        None => return result,
    };
    let metadata = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if let Some(meta_map) = metadata.as_object_mut() {
        let annotations = meta_map
            .entry("annotations")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Some(ann_map) = annotations.as_object_mut() {
            ann_map.insert(
                ANNOTATION_RESOURCE_HASH.to_string(),
                Value::String(hash.to_string()),
            );
        }
    }
    result
}

/// Read the content-hash annotation recorded on a live object.
fn live_hash(live: &StoredObject) -> Option<&str> {
    live.body
        .get("metadata")?
        .get("annotations")?
        .get(ANNOTATION_RESOURCE_HASH)?
        .as_str()
}
