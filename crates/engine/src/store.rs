//! Versioned state store: the two most recent desired resource sets.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use warden_core::{OwnerReference, ResourceSet, TargetId};
use warden_platform::{ApiError, ObjectKey, ObjectStore, StoredObject};

use crate::error::{Error, Result};

/// Serialized layout of the backing blob: two named slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateBlob {
    /// The set that should currently exist.
    latest: Option<ResourceSet>,
    /// The set that existed one version before.
    previous: Option<ResourceSet>,
}

/// Per-target persistent record of the two most recent fully-materialized
/// desired resource sets.
///
/// `store` is the only mutator: it rotates latest into previous and writes
/// the new set in a single conditional write. Persistence failures surface
/// uninterpreted; this store never retries.
pub struct VersionedStateStore {
    objects: Arc<dyn ObjectStore>,
}

impl VersionedStateStore {
    /// Create a state store over a platform object store.
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// The latest stored resource set, `None` before the first write.
    pub async fn get_latest(&self, target: &TargetId) -> Result<Option<ResourceSet>> {
        Ok(self.read_blob(target).await?.and_then(|b| b.latest))
    }

    /// The previous resource set, `None` until a second write happens.
    pub async fn get_previous(&self, target: &TargetId) -> Result<Option<ResourceSet>> {
        Ok(self.read_blob(target).await?.and_then(|b| b.previous))
    }

    /// Rotate `latest` into `previous` and persist `new_set` as latest.
    ///
    /// On the first write for a target the supplied `owner` is registered as
    /// the controlling owner of the backing blob, so platform garbage
    /// collection reclaims it when the owner is deleted.
    pub async fn store(
        &self,
        target: &TargetId,
        new_set: ResourceSet,
        owner: &OwnerReference,
    ) -> Result<()> {
        let key = ObjectKey::state_blob(target);
        match self.objects.get(&key).await {
            Ok(existing) => {
                let mut blob = decode_blob(&existing)?;
                blob.previous = blob.latest.take();
                blob.latest = Some(new_set);
                let mut updated = existing;
                updated.body = encode_blob(&blob)?;
                self.objects.update(updated).await?;
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                let blob = StateBlob {
                    latest: Some(new_set),
                    previous: None,
                };
                let object =
                    StoredObject::new(key, encode_blob(&blob)?).with_owner(owner.clone());
                self.objects.create(object).await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove the backing blob.
    ///
    /// Surfaces the raw platform error, including not-found; interpreting
    /// idempotent deletion is the caller's decision.
    pub async fn destroy(&self, target: &TargetId) -> Result<()> {
        let key = ObjectKey::state_blob(target);
        self.objects.delete(&key).await.map_err(Error::from)
    }

    async fn read_blob(&self, target: &TargetId) -> Result<Option<StateBlob>> {
        let key = ObjectKey::state_blob(target);
        match self.objects.get(&key).await {
            Ok(object) => Ok(Some(decode_blob(&object)?)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

fn encode_blob(blob: &StateBlob) -> Result<serde_json::Value> {
    serde_json::to_value(blob).map_err(|e| Error::codec("state blob", e.to_string()))
}

fn decode_blob(object: &StoredObject) -> Result<StateBlob> {
    serde_json::from_value(object.body.clone())
        .map_err(|e| Error::codec("state blob", e.to_string()))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_core::{ManagedResource, ResourceKind, TargetUid};
    use warden_platform::InMemoryObjectStore;

    fn owner() -> OwnerReference {
        OwnerReference::target(TargetUid::new(), &TargetId::new("ns", "t"))
    }

    fn set(version: u64, generation: &str) -> ResourceSet {
        let mut set = ResourceSet::new(version, generation);
        set.insert(ManagedResource::new(
            ResourceKind::ConfigData,
            "conf",
            json!({"data": {"v": version}}),
        ))
        .unwrap();
        set
    }

    #[tokio::test]
    async fn test_round_trip() {
        let objects = InMemoryObjectStore::new_arc();
        let store = VersionedStateStore::new(objects);
        let id = TargetId::new("ns", "t");

        let written = set(1, "gen-a");
        store.store(&id, written.clone(), &owner()).await.unwrap();

        let read = store.get_latest(&id).await.unwrap().unwrap();
        assert_eq!(read, written);
        assert!(store.get_previous(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_rotates_single_slot() {
        let objects = InMemoryObjectStore::new_arc();
        let store = VersionedStateStore::new(objects);
        let id = TargetId::new("ns", "t");

        store.store(&id, set(1, "gen-a"), &owner()).await.unwrap();
        store.store(&id, set(2, "gen-b"), &owner()).await.unwrap();
        store.store(&id, set(3, "gen-c"), &owner()).await.unwrap();

        let latest = store.get_latest(&id).await.unwrap().unwrap();
        let previous = store.get_previous(&id).await.unwrap().unwrap();
        assert_eq!(latest.version, 3);
        assert_eq!(previous.version, 2);
        // Version 1 has rotated out entirely
    }

    #[tokio::test]
    async fn test_first_write_registers_owner() {
        let objects = InMemoryObjectStore::new_arc();
        let store = VersionedStateStore::new(Arc::clone(&objects) as Arc<dyn ObjectStore>);
        let id = TargetId::new("ns", "t");
        let first_owner = owner();

        store.store(&id, set(1, "gen-a"), &first_owner).await.unwrap();
        let blob = objects.get(&ObjectKey::state_blob(&id)).await.unwrap();
        assert_eq!(blob.owner, Some(first_owner.clone()));

        // Later writes keep the original owner
        let other = owner();
        store.store(&id, set(2, "gen-b"), &other).await.unwrap();
        let blob = objects.get(&ObjectKey::state_blob(&id)).await.unwrap();
        assert_eq!(blob.owner, Some(first_owner));
    }

    #[tokio::test]
    async fn test_empty_store_reads_none() {
        let objects = InMemoryObjectStore::new_arc();
        let store = VersionedStateStore::new(objects);
        let id = TargetId::new("ns", "missing");
        assert!(store.get_latest(&id).await.unwrap().is_none());
        assert!(store.get_previous(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_destroy_surfaces_not_found() {
        let objects = InMemoryObjectStore::new_arc();
        let store = VersionedStateStore::new(objects);
        let id = TargetId::new("ns", "missing");
        let err = store.destroy(&id).await.unwrap_err();
        assert!(err.api().is_some_and(ApiError::is_not_found));
    }

    #[tokio::test]
    async fn test_destroy_removes_blob() {
        let objects = InMemoryObjectStore::new_arc();
        let store = VersionedStateStore::new(objects);
        let id = TargetId::new("ns", "t");

        store.store(&id, set(1, "gen-a"), &owner()).await.unwrap();
        store.destroy(&id).await.unwrap();
        assert!(store.get_latest(&id).await.unwrap().is_none());
    }
}
