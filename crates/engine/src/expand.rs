//! Expansion of a target specification into its desired resource set.
//!
//! Expansion is deterministic: the same spec always yields the same set,
//! in the declared pipeline order, so content hashes are stable.

use serde_json::json;
use warden_core::{
    ManagedResource, ResourceKind, ResourceSet, Target, TargetSpec,
};

use crate::error::Result;

/// Client port exposed by the workload endpoint.
const CLIENT_PORT: u16 = 6446;
/// Peer port used for intra-group replication.
const PEER_PORT: u16 = 6447;
/// Scrape port for the metrics endpoint.
const METRICS_PORT: u16 = 9540;

/// Expand `target`'s specification into a new resource set.
///
/// `version` is the version number the new set is tagged with; the
/// generation fingerprint is derived from the spec itself.
pub fn expand(target: &Target, version: u64) -> Result<ResourceSet> {
    let spec = &target.spec;
    let mut set = ResourceSet::new(version, spec.fingerprint());
    let name = target.id.name.as_str();

    set.insert(config_data(name, spec))?;
    set.insert(secret_data(name, spec))?;
    set.insert(endpoint(name))?;
    if spec.metrics_enabled {
        set.insert(metrics_endpoint(name))?;
    }
    set.insert(stateful_group(name, spec))?;
    if let Some(batch) = &spec.batch {
        let completions = batch.completions.unwrap_or(1);
        set.insert(ManagedResource::new(
            ResourceKind::BatchJob,
            format!("{name}-job"),
            json!({
                "metadata": meta(format!("{name}-job"), name),
                "spec": {
                    "command": batch.command,
                    "completions": completions,
                }
            }),
        ))?;
    }
    Ok(set)
}

fn meta(object_name: impl Into<String>, target_name: &str) -> serde_json::Value {
    json!({
        "name": object_name.into(),
        "labels": {
            "app.kubernetes.io/managed-by": "warden",
            "app.kubernetes.io/instance": target_name,
        }
    })
}

fn config_data(name: &str, spec: &TargetSpec) -> ManagedResource {
    let entries: serde_json::Map<String, serde_json::Value> = spec
        .config
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    ManagedResource::new(
        ResourceKind::ConfigData,
        format!("{name}-config"),
        json!({
            "metadata": meta(format!("{name}-config"), name),
            "data": entries,
        }),
    )
}

fn secret_data(name: &str, spec: &TargetSpec) -> ManagedResource {
    ManagedResource::new(
        ResourceKind::SecretData,
        format!("{name}-secret"),
        json!({
            "metadata": meta(format!("{name}-secret"), name),
            "keys": spec.secret_keys,
        }),
    )
}

fn endpoint(name: &str) -> ManagedResource {
    ManagedResource::new(
        ResourceKind::Endpoint,
        format!("{name}-endpoint"),
        json!({
            "metadata": meta(format!("{name}-endpoint"), name),
            "spec": {
                "selector": {"app.kubernetes.io/instance": name},
                "ports": [
                    {"name": "client", "port": CLIENT_PORT},
                    {"name": "peer", "port": PEER_PORT},
                ]
            }
        }),
    )
}

fn metrics_endpoint(name: &str) -> ManagedResource {
    ManagedResource::new(
        ResourceKind::MetricsEndpoint,
        format!("{name}-metrics"),
        json!({
            "metadata": meta(format!("{name}-metrics"), name),
            "spec": {
                "selector": {"app.kubernetes.io/instance": name},
                "port": METRICS_PORT,
                "path": "/metrics",
            }
        }),
    )
}

fn stateful_group(name: &str, spec: &TargetSpec) -> ManagedResource {
    ManagedResource::new(
        ResourceKind::StatefulGroup,
        format!("{name}-group"),
        json!({
            "metadata": meta(format!("{name}-group"), name),
            "spec": {
                "replicas": spec.replica_count(),
                "serviceName": format!("{name}-endpoint"),
                "configFrom": format!("{name}-config"),
                "secretFrom": format!("{name}-secret"),
            }
        }),
    )
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use warden_core::{BatchSpec, TargetId};

    fn target(spec: TargetSpec) -> Target {
        Target::new(TargetId::new("prod", "cache"), spec)
    }

    #[test]
    fn test_empty_spec_expands_to_minimal_set() {
        let target = target(TargetSpec::default());
        let set = expand(&target, 1).unwrap();

        assert_eq!(set.version, 1);
        assert_eq!(set.generation, target.spec.fingerprint());
        assert_eq!(set.len(), 4);
        assert!(!set.has_deletions());
        assert!(set.get(ResourceKind::ConfigData, "cache-config").is_some());
        assert!(set.get(ResourceKind::SecretData, "cache-secret").is_some());
        assert!(set.get(ResourceKind::Endpoint, "cache-endpoint").is_some());
        let group = set.get(ResourceKind::StatefulGroup, "cache-group").unwrap();
        assert_eq!(group.body["spec"]["replicas"], 0);
    }

    #[test]
    fn test_expansion_is_deterministic() {
        let mut spec = TargetSpec::default();
        spec.replicas = Some(3);
        spec.config.insert("mode".into(), "cluster".into());
        let target = target(spec);

        let a = expand(&target, 2).unwrap();
        let b = expand(&target, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_optional_resources_follow_spec() {
        let mut spec = TargetSpec::default();
        spec.metrics_enabled = true;
        spec.batch = Some(BatchSpec {
            command: vec!["migrate".into()],
            completions: None,
        });
        let target = target(spec);
        let set = expand(&target, 1).unwrap();

        assert_eq!(set.len(), 6);
        assert!(set.get(ResourceKind::MetricsEndpoint, "cache-metrics").is_some());
        let job = set.get(ResourceKind::BatchJob, "cache-job").unwrap();
        assert_eq!(job.body["spec"]["completions"], 1);
    }

    #[test]
    fn test_config_entries_are_rendered() {
        let mut spec = TargetSpec::default();
        spec.config.insert("max_connections".into(), "512".into());
        let target = target(spec);
        let set = expand(&target, 1).unwrap();
        let config = set.get(ResourceKind::ConfigData, "cache-config").unwrap();
        assert_eq!(config.body["data"]["max_connections"], "512");
    }
}
