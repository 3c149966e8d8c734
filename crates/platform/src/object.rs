//! Keys and stored representations for platform objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warden_core::{OwnerReference, ResourceKind, TargetId};

/// Key of one object in the platform store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Kind segment, e.g. `endpoint` or `state-blob`.
    pub kind: String,
    /// Namespace the object lives in.
    pub namespace: String,
    /// Object name.
    pub name: String,
}

impl ObjectKey {
    /// Create a key from raw parts.
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a managed resource of a target.
    pub fn resource(kind: ResourceKind, target: &TargetId, name: impl Into<String>) -> Self {
        Self::new(kind.as_str(), target.namespace.clone(), name)
    }

    /// Key for the versioned state blob of a target.
    pub fn state_blob(target: &TargetId) -> Self {
        Self::new("state-blob", target.namespace.clone(), format!("{}-state", target.name))
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// One object as held by the platform store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Object key.
    pub key: ObjectKey,
    /// Optimistic-concurrency version, bumped on every write.
    pub resource_version: u64,
    /// Controlling owner, when set.
    pub owner: Option<OwnerReference>,
    /// Object annotations.
    pub annotations: BTreeMap<String, String>,
    /// Object body.
    pub body: serde_json::Value,
}

impl StoredObject {
    /// Create a fresh object with no version (the store assigns one).
    pub fn new(key: ObjectKey, body: serde_json::Value) -> Self {
        Self {
            key,
            resource_version: 0,
            owner: None,
            annotations: BTreeMap::new(),
            body,
        }
    }

    /// Attach a controlling owner.
    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Attach an annotation.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Annotation lookup.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_key_display() {
        let key = ObjectKey::resource(ResourceKind::Endpoint, &TargetId::new("prod", "cache"), "cache-svc");
        assert_eq!(key.to_string(), "endpoint/prod/cache-svc");
    }

    #[test]
    fn test_state_blob_key_is_suffixed() {
        let key = ObjectKey::state_blob(&TargetId::new("prod", "cache"));
        assert_eq!(key.kind, "state-blob");
        assert_eq!(key.name, "cache-state");
    }

    #[test]
    fn test_builder_helpers() {
        let obj = StoredObject::new(ObjectKey::new("endpoint", "ns", "n"), json!({}))
            .with_annotation("k", "v");
        assert_eq!(obj.annotation("k"), Some("v"));
        assert_eq!(obj.annotation("missing"), None);
    }
}
