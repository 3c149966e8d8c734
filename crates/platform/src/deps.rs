//! Dependency status lookups for the start-quorum gate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use warden_core::{TargetId, TargetPhase};

use crate::error::Result;

/// Observed readiness of one dependency target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyStatus {
    /// Ready replicas the dependency currently reports.
    pub ready_replicas: u32,
    /// The dependency's lifecycle phase.
    pub phase: TargetPhase,
}

/// Trait answering "is this dependency ready" for the start-quorum gate.
#[async_trait]
pub trait DependencyReader: Send + Sync {
    /// Status of a named dependency; `None` when it cannot be found.
    async fn status(&self, id: &TargetId) -> Result<Option<DependencyStatus>>;
}

/// In-memory dependency reader for tests and embedding.
#[derive(Default)]
pub struct InMemoryDependencyReader {
    statuses: RwLock<HashMap<TargetId, DependencyStatus>>,
}

impl InMemoryDependencyReader {
    /// Create a new in-memory dependency reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory dependency reader wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Record a dependency's status.
    pub async fn set(&self, id: TargetId, status: DependencyStatus) {
        let mut statuses = self.statuses.write().await;
        statuses.insert(id, status);
    }

    /// Forget a dependency.
    pub async fn clear(&self, id: &TargetId) {
        let mut statuses = self.statuses.write().await;
        statuses.remove(id);
    }
}

#[async_trait]
impl DependencyReader for InMemoryDependencyReader {
    async fn status(&self, id: &TargetId) -> Result<Option<DependencyStatus>> {
        let statuses = self.statuses.read().await;
        Ok(statuses.get(id).copied())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_dependency_is_none() {
        let reader = InMemoryDependencyReader::new();
        let found = reader.status(&TargetId::new("ns", "dep")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_set_and_clear() {
        let reader = InMemoryDependencyReader::new();
        let id = TargetId::new("ns", "dep");
        reader
            .set(
                id.clone(),
                DependencyStatus {
                    ready_replicas: 3,
                    phase: TargetPhase::Running,
                },
            )
            .await;
        let found = reader.status(&id).await.unwrap().unwrap();
        assert_eq!(found.ready_replicas, 3);

        reader.clear(&id).await;
        assert!(reader.status(&id).await.unwrap().is_none());
    }
}
