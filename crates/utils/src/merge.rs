//! Deep-merge for configuration mappings.

use serde_json::Value;

fn is_keyed_by(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.keys().any(|key| key.starts_with("by-")),
        _ => false,
    }
}

/// Merge `override_value` over `base`, recursing into mappings.
///
/// A `by-*` conditional on either side is treated as a leaf: the override
/// replaces the base wholesale rather than merging into it.
pub fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map))
            if !is_keyed_by(base) && !is_keyed_by(override_value) =>
        {
            let mut merged = base_map.clone();
            for (key, value) in override_map {
                let entry = match base_map.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn override_wins_for_scalars() {
        let merged = deep_merge(&json!({"a": 1, "b": 2}), &json!({"b": 3}));
        assert_eq!(merged, json!({"a": 1, "b": 3}));
    }

    #[test]
    fn mappings_merge_recursively() {
        let base = json!({"worker": {"os": "linux", "cores": 4}});
        let over = json!({"worker": {"cores": 8}});
        assert_eq!(
            deep_merge(&base, &over),
            json!({"worker": {"os": "linux", "cores": 8}})
        );
    }

    #[test]
    fn keyed_by_values_replace_not_merge() {
        let base = json!({"tier": {"by-platform": {"linux": 1, "default": 2}}});
        let over = json!({"tier": {"by-platform": {"mac": 3}}});
        assert_eq!(
            deep_merge(&base, &over),
            json!({"tier": {"by-platform": {"mac": 3}}})
        );
    }

    #[test]
    fn merge_is_idempotent_for_subset_override() {
        let base = json!({"a": {"b": 1, "c": 2}, "d": 3});
        let over = json!({"a": {"b": 1}});
        let merged = deep_merge(&base, &over);
        assert_eq!(merged, base);
    }
}
