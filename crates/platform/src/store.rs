//! Object store trait and implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use warden_core::merge_patch;

use crate::error::{ApiError, Result};
use crate::object::{ObjectKey, StoredObject};

/// Trait for the platform object store.
///
/// Every write uses conditional (optimistic-concurrency) semantics: updates
/// and patches carry the resource version the caller last observed and fail
/// with [`ApiError::Conflict`] on a stale read. No method retries.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one object.
    async fn get(&self, key: &ObjectKey) -> Result<StoredObject>;

    /// List objects of a kind within a namespace.
    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<StoredObject>>;

    /// Create an object; fails if it already exists.
    async fn create(&self, object: StoredObject) -> Result<StoredObject>;

    /// Replace an object conditionally on its recorded resource version.
    async fn update(&self, object: StoredObject) -> Result<StoredObject>;

    /// Apply a merge patch conditionally on `expected_version`.
    async fn patch(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
        expected_version: u64,
    ) -> Result<StoredObject>;

    /// Delete an object.
    async fn delete(&self, key: &ObjectKey) -> Result<()>;
}

/// In-memory object store for tests and embedding.
///
/// Tracks a write counter so tests can assert that steady-state
/// reconciliations perform zero writes.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectKey, StoredObject>>,
    writes: AtomicU64,
}

impl InMemoryObjectStore {
    /// Create a new in-memory object store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory object store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of writes (create/update/patch/delete) performed so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of objects currently held.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<StoredObject> {
        let objects = self.objects.read().await;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| ApiError::not_found(key.to_string()))
    }

    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<StoredObject>> {
        let objects = self.objects.read().await;
        let mut found: Vec<StoredObject> = objects
            .values()
            .filter(|o| o.key.kind == kind && o.key.namespace == namespace)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    async fn create(&self, mut object: StoredObject) -> Result<StoredObject> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(&object.key) {
            return Err(ApiError::already_exists(object.key.to_string()));
        }
        object.resource_version = 1;
        objects.insert(object.key.clone(), object.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(object)
    }

    async fn update(&self, mut object: StoredObject) -> Result<StoredObject> {
        let mut objects = self.objects.write().await;
        let live = objects
            .get(&object.key)
            .ok_or_else(|| ApiError::not_found(object.key.to_string()))?;
        if live.resource_version != object.resource_version {
            return Err(ApiError::conflict(
                object.key.to_string(),
                object.resource_version,
                live.resource_version,
            ));
        }
        object.resource_version += 1;
        objects.insert(object.key.clone(), object.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(object)
    }

    async fn patch(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
        expected_version: u64,
    ) -> Result<StoredObject> {
        let mut objects = self.objects.write().await;
        let live = objects
            .get(key)
            .ok_or_else(|| ApiError::not_found(key.to_string()))?;
        if live.resource_version != expected_version {
            return Err(ApiError::conflict(
                key.to_string(),
                expected_version,
                live.resource_version,
            ));
        }
        let mut patched = live.clone();
        patched.body = merge_patch::apply(&live.body, patch);
        patched.resource_version += 1;
        objects.insert(key.clone(), patched.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(patched)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let mut objects = self.objects.write().await;
        if objects.remove(key).is_none() {
            return Err(ApiError::not_found(key.to_string()));
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// A wrapper that adds tracing to an object store.
pub struct TracingObjectStore<S: ObjectStore> {
    inner: S,
}

impl<S: ObjectStore> TracingObjectStore<S> {
    /// Create a new tracing object store.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for TracingObjectStore<S> {
    async fn get(&self, key: &ObjectKey) -> Result<StoredObject> {
        tracing::trace!(key = %key, "Fetching object");
        self.inner.get(key).await
    }

    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<StoredObject>> {
        tracing::trace!(kind, namespace, "Listing objects");
        self.inner.list(kind, namespace).await
    }

    async fn create(&self, object: StoredObject) -> Result<StoredObject> {
        tracing::debug!(key = %object.key, "Creating object");
        self.inner.create(object).await
    }

    async fn update(&self, object: StoredObject) -> Result<StoredObject> {
        tracing::debug!(key = %object.key, version = object.resource_version, "Updating object");
        self.inner.update(object).await
    }

    async fn patch(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
        expected_version: u64,
    ) -> Result<StoredObject> {
        tracing::debug!(key = %key, version = expected_version, "Patching object");
        self.inner.patch(key, patch, expected_version).await
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        tracing::debug!(key = %key, "Deleting object");
        self.inner.delete(key).await
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("endpoint", "ns", name)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryObjectStore::new();
        let created = store
            .create(StoredObject::new(key("svc"), json!({"spec": {"port": 80}})))
            .await
            .unwrap();
        assert_eq!(created.resource_version, 1);

        let fetched = store.get(&key("svc")).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_rejects_existing() {
        let store = InMemoryObjectStore::new();
        store
            .create(StoredObject::new(key("svc"), json!({})))
            .await
            .unwrap();
        let err = store
            .create(StoredObject::new(key("svc"), json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_update_conflicts_on_stale_version() {
        let store = InMemoryObjectStore::new();
        let mut obj = store
            .create(StoredObject::new(key("svc"), json!({})))
            .await
            .unwrap();

        obj.resource_version = 99;
        let err = store.update(obj).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_patch_applies_merge_semantics() {
        let store = InMemoryObjectStore::new();
        let created = store
            .create(StoredObject::new(
                key("svc"),
                json!({"spec": {"port": 80, "protocol": "tcp"}}),
            ))
            .await
            .unwrap();

        let patched = store
            .patch(&key("svc"), &json!({"spec": {"port": 443}}), created.resource_version)
            .await
            .unwrap();
        assert_eq!(patched.body["spec"]["port"], 443);
        assert_eq!(patched.body["spec"]["protocol"], "tcp");
        assert_eq!(patched.resource_version, 2);
    }

    #[tokio::test]
    async fn test_patch_conflicts_on_stale_version() {
        let store = InMemoryObjectStore::new();
        store
            .create(StoredObject::new(key("svc"), json!({})))
            .await
            .unwrap();
        let err = store
            .patch(&key("svc"), &json!({}), 42)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = InMemoryObjectStore::new();
        let err = store.delete(&key("ghost")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_write_counter_ignores_reads() {
        let store = InMemoryObjectStore::new();
        store
            .create(StoredObject::new(key("svc"), json!({})))
            .await
            .unwrap();
        assert_eq!(store.write_count(), 1);

        let _ = store.get(&key("svc")).await;
        let _ = store.list("endpoint", "ns").await;
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_kind_and_namespace() {
        let store = InMemoryObjectStore::new();
        store
            .create(StoredObject::new(ObjectKey::new("endpoint", "ns", "a"), json!({})))
            .await
            .unwrap();
        store
            .create(StoredObject::new(ObjectKey::new("endpoint", "other", "b"), json!({})))
            .await
            .unwrap();
        store
            .create(StoredObject::new(ObjectKey::new("config-data", "ns", "c"), json!({})))
            .await
            .unwrap();

        let listed = store.list("endpoint", "ns").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed.first().map(|o| o.key.name.as_str()), Some("a"));
    }
}
