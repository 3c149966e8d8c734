//! Typed access to target objects.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use warden_core::{Target, TargetId, TargetStatus};

use crate::error::{ApiError, Result};

/// Trait for reading and mutating target objects.
///
/// Status updates are conditional on the resource version the caller
/// observed; annotation merges are applied read-modify-write by the store
/// itself and cannot conflict.
#[async_trait]
pub trait TargetClient: Send + Sync {
    /// Fetch one target.
    async fn get(&self, id: &TargetId) -> Result<Target>;

    /// Replace the target's status conditionally.
    async fn update_status(
        &self,
        id: &TargetId,
        status: TargetStatus,
        expected_version: u64,
    ) -> Result<Target>;

    /// Merge annotations into the target; `None` values are ignored here,
    /// removal is expressed with an empty string by convention.
    async fn merge_annotations(
        &self,
        id: &TargetId,
        annotations: BTreeMap<String, String>,
    ) -> Result<Target>;
}

/// In-memory target client for tests and embedding.
#[derive(Default)]
pub struct InMemoryTargetClient {
    targets: RwLock<HashMap<TargetId, Target>>,
}

impl InMemoryTargetClient {
    /// Create a new in-memory target client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory target client wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed a target (test setup).
    pub async fn put(&self, target: Target) {
        let mut targets = self.targets.write().await;
        targets.insert(target.id.clone(), target);
    }

    /// Remove a target entirely (test teardown / user deletion).
    pub async fn remove(&self, id: &TargetId) {
        let mut targets = self.targets.write().await;
        targets.remove(id);
    }

    /// Mark a target as deleted by the user.
    pub async fn mark_deleted(&self, id: &TargetId) {
        let mut targets = self.targets.write().await;
        if let Some(target) = targets.get_mut(id) {
            target.deleted = true;
            target.resource_version += 1;
        }
    }
}

#[async_trait]
impl TargetClient for InMemoryTargetClient {
    async fn get(&self, id: &TargetId) -> Result<Target> {
        let targets = self.targets.read().await;
        targets
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(id.to_string()))
    }

    async fn update_status(
        &self,
        id: &TargetId,
        status: TargetStatus,
        expected_version: u64,
    ) -> Result<Target> {
        let mut targets = self.targets.write().await;
        let target = targets
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(id.to_string()))?;
        if target.resource_version != expected_version {
            return Err(ApiError::conflict(
                id.to_string(),
                expected_version,
                target.resource_version,
            ));
        }
        target.status = status;
        target.resource_version += 1;
        Ok(target.clone())
    }

    async fn merge_annotations(
        &self,
        id: &TargetId,
        annotations: BTreeMap<String, String>,
    ) -> Result<Target> {
        let mut targets = self.targets.write().await;
        let target = targets
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(id.to_string()))?;
        for (key, value) in annotations {
            if value.is_empty() {
                target.annotations.remove(&key);
            } else {
                target.annotations.insert(key, value);
            }
        }
        target.resource_version += 1;
        Ok(target.clone())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use warden_core::{TargetPhase, TargetSpec};

    fn target(name: &str) -> Target {
        Target::new(TargetId::new("ns", name), TargetSpec::default())
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let client = InMemoryTargetClient::new();
        let err = client.get(&TargetId::new("ns", "ghost")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_status_update_is_conditional() {
        let client = InMemoryTargetClient::new();
        let t = target("a");
        let id = t.id.clone();
        let version = t.resource_version;
        client.put(t).await;

        let mut status = TargetStatus::default();
        status.phase = Some(TargetPhase::Running);
        let updated = client.update_status(&id, status.clone(), version).await.unwrap();
        assert_eq!(updated.status.phase, Some(TargetPhase::Running));

        // Stale version now conflicts
        let err = client.update_status(&id, status, version).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_merge_annotations_adds_and_removes() {
        let client = InMemoryTargetClient::new();
        let t = target("a");
        let id = t.id.clone();
        client.put(t).await;

        let mut ann = BTreeMap::new();
        ann.insert("count".to_string(), "3".to_string());
        let updated = client.merge_annotations(&id, ann).await.unwrap();
        assert_eq!(updated.annotations.get("count").map(String::as_str), Some("3"));

        let mut clear = BTreeMap::new();
        clear.insert("count".to_string(), String::new());
        let updated = client.merge_annotations(&id, clear).await.unwrap();
        assert!(updated.annotations.get("count").is_none());
    }
}
