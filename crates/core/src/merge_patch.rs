//! JSON merge-patch application (RFC 7386).
//!
//! Shared by the in-memory platform store and the patch-engine tests:
//! nulls delete members, objects recurse, everything else replaces.

use serde_json::{Map, Value};

/// Apply `patch` to `base`, returning the patched document.
pub fn apply(base: &Value, patch: &Value) -> Value {
    match patch {
        Value::Object(patch_map) => {
            let mut result = match base {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            };
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    result.remove(key);
                } else {
                    let merged = match result.get(key) {
                        Some(existing) => apply(existing, patch_value),
                        None => apply(&Value::Null, patch_value),
                    };
                    result.insert(key.clone(), merged);
                }
            }
            Value::Object(result)
        }
        // Arrays and scalars replace wholesale; nulls at the top level
        // yield null (member-level nulls are handled above).
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_replaces() {
        let base = json!({"a": 1});
        let patch = json!({"a": 2});
        assert_eq!(apply(&base, &patch), json!({"a": 2}));
    }

    #[test]
    fn test_null_deletes_member() {
        let base = json!({"a": 1, "b": 2});
        let patch = json!({"b": null});
        assert_eq!(apply(&base, &patch), json!({"a": 1}));
    }

    #[test]
    fn test_nested_objects_recurse() {
        let base = json!({"spec": {"replicas": 1, "image": "v1"}});
        let patch = json!({"spec": {"replicas": 3}});
        assert_eq!(
            apply(&base, &patch),
            json!({"spec": {"replicas": 3, "image": "v1"}})
        );
    }

    #[test]
    fn test_array_replaces_wholesale() {
        let base = json!({"ports": [1, 2, 3]});
        let patch = json!({"ports": [9]});
        assert_eq!(apply(&base, &patch), json!({"ports": [9]}));
    }

    #[test]
    fn test_patch_adds_missing_members() {
        let base = json!({});
        let patch = json!({"spec": {"replicas": 2}});
        assert_eq!(apply(&base, &patch), json!({"spec": {"replicas": 2}}));
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let base = json!({"a": {"b": 1}});
        assert_eq!(apply(&base, &json!({})), base);
    }
}
