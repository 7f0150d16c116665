//! Advertise a digest-based index route so equivalent future work can be
//! replaced by the index-search optimization.

use crate::context::TransformContext;
use crate::sequence::stub_name;
use kindling_core::{Error, Result};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub fn transform(ctx: &TransformContext, stubs: Vec<Value>) -> Result<Vec<Value>> {
    // Labels of cacheable or pre-existing tasks a cached task may depend on.
    let cacheable: Vec<&str> = ctx
        .kind_dependencies_tasks
        .values()
        .filter(|task| task.attributes.contains_key("cached_task"))
        .map(|task| task.label.as_str())
        .collect();

    stubs
        .into_iter()
        .map(|mut stub| {
            let Some(spec) = stub.get("cache").cloned() else {
                return Ok(stub);
            };
            let name = stub_name(&stub);
            let cache_type = spec
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::transform(&ctx.kind, Some(name.clone()), "cache needs a type")
                })?
                .to_string();
            let cache_name = spec
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&name)
                .to_string();

            if let Some(dependencies) = stub.get("dependencies").and_then(Value::as_object) {
                for target in dependencies.values().filter_map(Value::as_str) {
                    let in_kind_cache = ctx
                        .parameters
                        .existing_tasks
                        .contains_key(target);
                    if !cacheable.contains(&target) && !in_kind_cache {
                        return Err(Error::transform(
                            &ctx.kind,
                            Some(name.clone()),
                            format!(
                                "cached task depends on uncached, non-existing task '{target}'"
                            ),
                        ));
                    }
                }
            }

            let mut hasher = Sha256::new();
            if let Some(digest_data) = spec.get("digest-data") {
                hasher.update(canonical_json(digest_data).as_bytes());
            }
            if let Some(definition) = stub.get("task") {
                hasher.update(canonical_json(definition).as_bytes());
            }
            let digest = format!("{:x}", hasher.finalize());

            let prefix = ctx.graph_config.cached_task_prefix();
            let index_path = format!("{prefix}.{cache_type}.{cache_name}.{digest}");

            let map = stub.as_object_mut().expect("stubs are mappings");
            map.remove("cache");
            if let Some(routes) = map
                .entry("routes".to_string())
                .or_insert_with(|| json!([]))
                .as_array_mut()
            {
                routes.push(json!(format!("index.{index_path}")));
            }
            map.insert("optimization".to_string(), json!({"index-search": [index_path]}));
            if let Some(attributes) = map
                .entry("attributes".to_string())
                .or_insert_with(|| json!({}))
                .as_object_mut()
            {
                attributes.insert(
                    "cached_task".to_string(),
                    json!({"type": cache_type, "name": cache_name, "digest": digest}),
                );
            }
            Ok(stub)
        })
        .collect()
}

/// Deterministic serialization for hashing: objects with sorted keys.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| format!("{}:{}", json!(key), canonical_json(&map[key])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::test_support::demo_context;

    #[test]
    fn digest_is_stable_and_advertised() {
        let ctx = demo_context("toolchain", json!({}));
        let stub = json!({
            "name": "clang",
            "task": {"payload": {"command": ["build-clang.sh"]}},
            "cache": {"type": "toolchains.v1", "name": "clang", "digest-data": ["linux64"]},
        });
        let first = transform(&ctx, vec![stub.clone()]).unwrap();
        let second = transform(&ctx, vec![stub]).unwrap();
        assert_eq!(first, second);

        let optimization = &first[0]["optimization"]["index-search"];
        let index_path = optimization[0].as_str().unwrap();
        assert!(index_path.starts_with("demo.cache.toolchains.v1.clang."));
        let route = first[0]["routes"][0].as_str().unwrap();
        assert_eq!(route, format!("index.{index_path}"));
        assert_eq!(first[0]["attributes"]["cached_task"]["name"], "clang");
    }

    #[test]
    fn digest_data_changes_the_digest() {
        let ctx = demo_context("toolchain", json!({}));
        let stub = |digest_data: &str| {
            json!({
                "name": "clang",
                "task": {},
                "cache": {"type": "toolchains.v1", "name": "clang", "digest-data": [digest_data]},
            })
        };
        let first = transform(&ctx, vec![stub("a")]).unwrap();
        let second = transform(&ctx, vec![stub("b")]).unwrap();
        assert_ne!(
            first[0]["optimization"]["index-search"][0],
            second[0]["optimization"]["index-search"][0]
        );
    }

    #[test]
    fn uncached_dependencies_are_rejected() {
        let ctx = demo_context("toolchain", json!({}));
        let stub = json!({
            "name": "clang",
            "task": {},
            "dependencies": {"edge": "fetch-source"},
            "cache": {"type": "toolchains.v1", "name": "clang"},
        });
        let err = transform(&ctx, vec![stub]).unwrap_err();
        assert!(err.to_string().contains("uncached"));
    }
}
