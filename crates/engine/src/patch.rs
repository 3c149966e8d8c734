//! Three-way merge-patch computation and conditional application.
//!
//! The engine asserts fields that changed between the prior desired state
//! and the new desired state, and leaves fields that only changed live
//! (out-of-band) untouched. Deletions are expressed as merge-patch nulls.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use warden_platform::{ObjectStore, StoredObject};

use crate::error::Result;

/// Top-level and metadata fields excluded from comparison: immutable,
/// ownership-sensitive, or live-computed.
const VOLATILE_METADATA: &[&str] = &[
    "creationTimestamp",
    "resourceVersion",
    "uid",
    "finalizers",
    "managedFields",
    "generation",
];

/// Outcome of a conditional patch application.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    /// The computed mutation was semantically empty; nothing was written.
    NoOp,
    /// The mutation was applied; the new live object is returned.
    Applied(StoredObject),
}

/// Compute a two-way merge patch turning `base` into `target`.
///
/// Keys present in `base` but absent in `target` become nulls; nested
/// objects recurse; arrays and scalars replace wholesale.
pub fn two_way(base: &Value, target: &Value) -> Value {
    match (base, target) {
        (Value::Object(base_map), Value::Object(target_map)) => {
            let mut patch = Map::new();
            for (key, base_value) in base_map {
                match target_map.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(target_value) if target_value != base_value => {
                        patch.insert(key.clone(), two_way(base_value, target_value));
                    }
                    Some(_) => {}
                }
            }
            for (key, target_value) in target_map {
                if !base_map.contains_key(key) {
                    patch.insert(key.clone(), target_value.clone());
                }
            }
            Value::Object(patch)
        }
        _ if base == target => Value::Object(Map::new()),
        _ => target.clone(),
    }
}

/// Compute a three-way merge patch.
///
/// `original` is the resource as desired one version ago (or the live
/// resource itself when no previous version exists), `desired` is the
/// resource as desired now, `current` is the live observation. The patch
/// asserts only what changed `original` -> `desired`, pruned of anything the
/// live object already satisfies, so live-only drift is never reverted.
pub fn three_way(original: &Value, desired: &Value, current: &Value) -> Value {
    let changes = two_way(original, desired);
    prune_satisfied(&changes, desired, current)
}

/// Drop patch entries the live object already satisfies.
fn prune_satisfied(patch: &Value, desired: &Value, current: &Value) -> Value {
    let (Value::Object(patch_map), Value::Object(current_map)) = (patch, current) else {
        return patch.clone();
    };
    let desired_map = match desired {
        Value::Object(map) => Some(map),
        _ => None,
    };
    let mut pruned = Map::new();
    for (key, patch_value) in patch_map {
        let live = current_map.get(key);
        if patch_value.is_null() {
            // Deletion already satisfied when the live object lacks the key
            if live.is_some() {
                pruned.insert(key.clone(), Value::Null);
            }
            continue;
        }
        let wanted = desired_map.and_then(|m| m.get(key));
        match (live, wanted) {
            (Some(live_value), Some(wanted_value)) if live_value == wanted_value => {}
            (Some(live_value), Some(wanted_value)) if patch_value.is_object() => {
                let inner = prune_satisfied(patch_value, wanted_value, live_value);
                if !is_empty_object(&inner) {
                    pruned.insert(key.clone(), inner);
                }
            }
            _ => {
                pruned.insert(key.clone(), patch_value.clone());
            }
        }
    }
    Value::Object(pruned)
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}

/// Remove immutable/ownership-sensitive fields before comparison.
///
/// Strips live-computed `status` and the volatile metadata members the
/// platform owns; everything else is preserved.
pub fn strip_volatile(value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let mut stripped = map.clone();
    stripped.remove("status");
    if let Some(Value::Object(metadata)) = stripped.get_mut("metadata") {
        for field in VOLATILE_METADATA {
            metadata.remove(*field);
        }
    }
    Value::Object(stripped)
}

/// Blank out the given dotted paths, used by kind-specific reconcilers to
/// absorb fields historically set by older orchestrator versions.
pub fn blank_fields(value: &Value, paths: &[&str]) -> Value {
    let mut result = value.clone();
    for path in paths {
        remove_path(&mut result, path);
    }
    result
}

fn remove_path(value: &mut Value, path: &str) {
    let mut cursor = value;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let Value::Object(map) = cursor else {
            return;
        };
        if segments.peek().is_none() {
            map.remove(segment);
            return;
        }
        match map.get_mut(segment) {
            Some(next) => cursor = next,
            None => return,
        }
    }
}

/// Check whether a computed mutation is semantically empty.
///
/// Known-benign empty forms produced by the merge machinery: `null`, `{}`,
/// `{"metadata":{}}` and `{"metadata":{"creationTimestamp":null}}`.
pub fn is_noop_patch(patch: &Value) -> bool {
    if patch.is_null() || is_empty_object(patch) {
        return true;
    }
    let Value::Object(map) = patch else {
        return false;
    };
    if map.len() != 1 {
        return false;
    }
    match map.get("metadata") {
        Some(metadata) if is_empty_object(metadata) => true,
        Some(Value::Object(meta_map)) => {
            meta_map.len() == 1 && meta_map.get("creationTimestamp") == Some(&Value::Null)
        }
        _ => false,
    }
}

/// Compute the three-way patch for a live object and apply it conditionally.
///
/// `pre_apply` runs immediately before a non-empty mutation is written,
/// receiving the patch document; callers use it to surface an "upgrading"
/// status only when a change is actually about to happen. Application is a
/// single conditional write; on conflict the caller re-queues, this engine
/// does not retry.
pub async fn apply_if_changed<F, Fut>(
    store: &Arc<dyn ObjectStore>,
    live: &StoredObject,
    original: &Value,
    desired: &Value,
    pre_apply: F,
) -> Result<PatchOutcome>
where
    F: FnOnce(Value) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let original = strip_volatile(original);
    let desired = strip_volatile(desired);
    let current = strip_volatile(&live.body);

    let patch = three_way(&original, &desired, &current);
    if is_noop_patch(&patch) {
        return Ok(PatchOutcome::NoOp);
    }

    pre_apply(patch.clone()).await?;
    let updated = store.patch(&live.key, &patch, live.resource_version).await?;
    Ok(PatchOutcome::Applied(updated))
}
