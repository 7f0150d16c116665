//! Interpolate placeholders into designated fields from parameters, an
//! inline object, and a YAML file, in that order of precedence.

use super::interpolate_value;
use crate::context::TransformContext;
use crate::sequence::stub_name;
use kindling_core::{Error, Result};
use kindling_utils::{load_yaml_cached, visit_path};
use serde_json::Value;
use std::collections::BTreeMap;

pub fn transform(ctx: &TransformContext, stubs: Vec<Value>) -> Result<Vec<Value>> {
    stubs
        .into_iter()
        .map(|mut stub| {
            let Some(spec) = stub.get("task-context").cloned() else {
                return Ok(stub);
            };
            let substitutions = build_substitutions(ctx, &stub, &spec)?;
            let fields = substitution_fields(&spec);
            for field in &fields {
                visit_path(&mut stub, field, &mut |value| {
                    interpolate_value(value, &substitutions)
                });
            }
            if let Some(map) = stub.as_object_mut() {
                map.remove("task-context");
            }
            Ok(stub)
        })
        .collect()
}

fn substitution_fields(spec: &Value) -> Vec<String> {
    spec.get("substitution-fields")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn build_substitutions(
    ctx: &TransformContext,
    stub: &Value,
    spec: &Value,
) -> Result<BTreeMap<String, Value>> {
    let mut substitutions = BTreeMap::new();

    // Lowest precedence: a YAML file relative to the kind directory.
    if let Some(file) = spec.get("from-file").and_then(Value::as_str) {
        let loaded = load_yaml_cached(&ctx.path.join(file)).map_err(|err| {
            Error::transform(
                &ctx.kind,
                Some(stub_name(stub)),
                format!("task-context from-file '{file}': {err}"),
            )
        })?;
        if let Some(map) = loaded.as_object() {
            substitutions.extend(map.iter().map(|(key, value)| (key.clone(), value.clone())));
        }
    }

    if let Some(map) = spec.get("from-object").and_then(Value::as_object) {
        substitutions.extend(map.iter().map(|(key, value)| (key.clone(), value.clone())));
    }

    // Highest precedence: named parameters.
    if let Some(keys) = spec.get("from-parameters").and_then(Value::as_object) {
        for (name, parameter) in keys {
            if let Some(path) = parameter.as_str() {
                if let Some(value) = ctx.parameters.get(path) {
                    substitutions.insert(name.clone(), value);
                }
            }
        }
    }

    Ok(substitutions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::test_support::{demo_context, demo_context_at};
    use serde_json::json;

    #[test]
    fn precedence_is_parameters_object_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("context.yml"),
            "who: file\nonly_file: f\n",
        )
        .unwrap();
        let ctx = demo_context_at("hello", json!({}), dir.path());
        let stub = json!({
            "name": "a",
            "description": "{who} {only_file} {project}",
            "task-context": {
                "from-file": "context.yml",
                "from-object": {"who": "object", "project": "object-project"},
                "from-parameters": {"project": "project"},
                "substitution-fields": ["description"],
            },
        });
        let out = transform(&ctx, vec![stub]).unwrap();
        assert_eq!(out[0]["description"], "object f demo");
        assert!(out[0].get("task-context").is_none());
    }

    #[test]
    fn stubs_without_context_pass_through() {
        let ctx = demo_context("hello", json!({}));
        let stub = json!({"name": "a", "description": "{untouched}"});
        let out = transform(&ctx, vec![stub.clone()]).unwrap();
        assert_eq!(out[0], stub);
    }
}
