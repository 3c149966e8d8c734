//! Identity types for targets and platform ownership.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Namespaced identity of one target under management.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId {
    /// Platform namespace the target lives in.
    pub namespace: String,
    /// Target name, unique within the namespace.
    pub name: String,
}

impl TargetId {
    /// Create a new target identity.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Unique identifier for a target object instance.
///
/// Distinct from [`TargetId`]: a target that is deleted and re-created under
/// the same name gets a fresh UID, which is what ownership references bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetUid(Ulid);

impl TargetUid {
    /// Create a new random UID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Create from a ULID.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Get the inner ULID.
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for TargetUid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TargetUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Controlling-owner reference attached to objects created on behalf of a
/// target, so platform garbage collection reclaims them when the owner goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    /// UID of the owning target instance.
    pub uid: TargetUid,
    /// Kind of the owning object.
    pub kind: String,
    /// Name of the owning object.
    pub name: String,
}

impl OwnerReference {
    /// Create an owner reference for a target.
    pub fn target(uid: TargetUid, id: &TargetId) -> Self {
        Self {
            uid,
            kind: "Target".to_string(),
            name: id.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_target_id_display() {
        let id = TargetId::new("prod", "cache-a");
        assert_eq!(id.to_string(), "prod/cache-a");
    }

    #[test]
    fn test_target_uid_unique() {
        assert_ne!(TargetUid::new(), TargetUid::new());
    }

    #[test]
    fn test_owner_reference_for_target() {
        let id = TargetId::new("prod", "cache-a");
        let uid = TargetUid::new();
        let owner = OwnerReference::target(uid, &id);
        assert_eq!(owner.kind, "Target");
        assert_eq!(owner.name, "cache-a");
        assert_eq!(owner.uid, uid);
    }
}
