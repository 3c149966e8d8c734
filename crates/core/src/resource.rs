//! Managed resources and versioned resource sets.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Protocol version written into every new resource set.
///
/// Version 1 sets were produced by orchestrators with the defective
/// generation hash; the change detector keeps a compatibility shim for them.
pub const CURRENT_PROTOCOL: u32 = 2;

/// Kind tag for one platform object produced from a target's specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Plain configuration data mounted by the workload.
    ConfigData,
    /// Secret data mounted by the workload.
    SecretData,
    /// Load-balancing network endpoint.
    Endpoint,
    /// Metrics-scrape endpoint.
    MetricsEndpoint,
    /// The clustered stateful workload group.
    StatefulGroup,
    /// A run-to-completion batch job.
    BatchJob,
}

impl ResourceKind {
    /// Stable string form used in object keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigData => "config-data",
            Self::SecretData => "secret-data",
            Self::Endpoint => "endpoint",
            Self::MetricsEndpoint => "metrics-endpoint",
            Self::StatefulGroup => "stateful-group",
            Self::BatchJob => "batch-job",
        }
    }

    /// Whether creating this kind is gated on the start quorum.
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::StatefulGroup | Self::BatchJob)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One platform object derived from a target's specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedResource {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Object name.
    pub name: String,
    /// True when the resource is no longer part of the desired set and
    /// should be removed from the platform (distinct from physical absence).
    #[serde(default)]
    pub deleted: bool,
    /// Full desired object body.
    pub body: serde_json::Value,
}

impl ManagedResource {
    /// Create a new (live) managed resource.
    pub fn new(kind: ResourceKind, name: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            kind,
            name: name.into(),
            deleted: false,
            body,
        }
    }

    /// Mark this resource for deletion.
    pub fn into_deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// Content hash over kind, name and body, hex-encoded.
    ///
    /// Recorded as an annotation on the live object so steady-state
    /// reconciliations can skip patch computation entirely.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update(b"/");
        hasher.update(self.name.as_bytes());
        hasher.update(b"\n");
        hasher.update(canonical_json(&self.body).as_bytes());
        hex_digest(hasher)
    }
}

/// One fully-expanded desired state: an ordered collection of managed
/// resources tagged with a version number and the generation fingerprint of
/// the specification that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    /// Monotonically increasing version, starting at 1.
    pub version: u64,
    /// Generation fingerprint of the specification that produced this set.
    pub generation: String,
    /// Protocol version of the writer.
    #[serde(default = "default_protocol")]
    pub protocol: u32,
    /// Managed resources in declared order.
    resources: Vec<ManagedResource>,
}

fn default_protocol() -> u32 {
    1
}

impl ResourceSet {
    /// Create an empty resource set.
    pub fn new(version: u64, generation: impl Into<String>) -> Self {
        Self {
            version,
            generation: generation.into(),
            protocol: CURRENT_PROTOCOL,
            resources: Vec::new(),
        }
    }

    /// Insert a resource, replacing any existing (kind, name) entry.
    pub fn upsert(&mut self, resource: ManagedResource) {
        if let Some(existing) = self
            .resources
            .iter_mut()
            .find(|r| r.kind == resource.kind && r.name == resource.name)
        {
            *existing = resource;
            return;
        }
        self.resources.push(resource);
    }

    /// Insert a resource, failing on a (kind, name) duplicate.
    pub fn insert(&mut self, resource: ManagedResource) -> Result<()> {
        if self.get(resource.kind, &resource.name).is_some() {
            return Err(Error::duplicate_resource(
                resource.kind.as_str(),
                &resource.name,
            ));
        }
        self.resources.push(resource);
        Ok(())
    }

    /// Look up a resource by kind and name.
    pub fn get(&self, kind: ResourceKind, name: &str) -> Option<&ManagedResource> {
        self.resources
            .iter()
            .find(|r| r.kind == kind && r.name == name)
    }

    /// All resources in declared order.
    pub fn resources(&self) -> &[ManagedResource] {
        &self.resources
    }

    /// Resources of one kind, in declared order.
    pub fn of_kind(&self, kind: ResourceKind) -> Vec<&ManagedResource> {
        self.resources.iter().filter(|r| r.kind == kind).collect_vec()
    }

    /// Number of resources in the set, deletion-flagged included.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Whether any resource carries the deletion flag.
    pub fn has_deletions(&self) -> bool {
        self.resources.iter().any(|r| r.deleted)
    }

    /// Append deletion-flagged entries for every (kind, name) present in
    /// `older` but absent here. Used when a spec change drops resources.
    pub fn carry_deletions_from(&mut self, older: &ResourceSet) {
        let missing = older
            .resources
            .iter()
            .filter(|old| !old.deleted && self.get(old.kind, &old.name).is_none())
            .cloned()
            .collect_vec();
        for resource in missing {
            self.resources.push(resource.into_deleted());
        }
    }
}

/// Canonical JSON used for hashing: serde_json with sorted object keys.
pub fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let inner = map
                .iter()
                .sorted_by(|a, b| a.0.cmp(b.0))
                .map(|(k, v)| format!("{}:{}", serde_json::Value::String(k.clone()), canonical_json(v)))
                .join(",");
            format!("{{{inner}}}")
        }
        serde_json::Value::Array(items) => {
            let inner = items.iter().map(canonical_json).join(",");
            format!("[{inner}]")
        }
        other => other.to_string(),
    }
}

/// Hex-encode a finished SHA-256 digest.
pub fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
