//! Fan a task out over the Cartesian product of named axes.

use super::interpolate_value;
use crate::context::TransformContext;
use crate::sequence::stub_name;
use kindling_core::{Error, Result};
use kindling_utils::visit_path;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub fn transform(ctx: &TransformContext, stubs: Vec<Value>) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    for stub in stubs {
        let Some(spec) = stub.get("matrix").cloned() else {
            out.push(stub);
            continue;
        };
        out.extend(expand(ctx, stub, &spec)?);
    }
    Ok(out)
}

fn expand(ctx: &TransformContext, stub: Value, spec: &Value) -> Result<Vec<Value>> {
    let name = stub_name(&stub);
    let axes: Vec<(String, Vec<Value>)> = spec
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(key, _)| {
                    !matches!(
                        key.as_str(),
                        "exclude" | "set-attributes" | "substitution-fields"
                    )
                })
                .map(|(key, values)| {
                    (
                        key.clone(),
                        values.as_array().cloned().unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    if axes.is_empty() {
        return Err(Error::transform(
            &ctx.kind,
            Some(name),
            "matrix needs at least one axis",
        ));
    }

    let excludes: Vec<&Value> = spec
        .get("exclude")
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
        .unwrap_or_default();
    let fields = spec
        .get("substitution-fields")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| vec!["name".to_string()]);
    let set_attributes: Vec<String> = spec
        .get("set-attributes")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut tuples: Vec<BTreeMap<String, Value>> = vec![BTreeMap::new()];
    for (axis, values) in &axes {
        let mut extended = Vec::new();
        for tuple in &tuples {
            for value in values {
                let mut next = tuple.clone();
                next.insert(axis.clone(), value.clone());
                extended.push(next);
            }
        }
        tuples = extended;
    }

    let mut expanded = Vec::new();
    for tuple in tuples {
        if excludes.iter().any(|exclude| matches_exclude(exclude, &tuple)) {
            continue;
        }
        let mut clone = stub.clone();
        let substitutions: BTreeMap<String, Value> = tuple
            .iter()
            .map(|(axis, value)| (format!("matrix[{axis}]"), value.clone()))
            .collect();
        for field in &fields {
            visit_path(&mut clone, field, &mut |value| {
                interpolate_value(value, &substitutions)
            });
        }
        if let Some(map) = clone.as_object_mut() {
            map.remove("matrix");
            let attributes = map
                .entry("attributes".to_string())
                .or_insert_with(|| json!({}));
            if let Some(attributes) = attributes.as_object_mut() {
                attributes.insert(
                    "matrix".to_string(),
                    Value::Object(tuple.clone().into_iter().collect()),
                );
                for axis in &set_attributes {
                    if let Some(value) = tuple.get(axis) {
                        attributes.insert(axis.clone(), value.clone());
                    }
                }
            }
        }
        expanded.push(clone);
    }
    Ok(expanded)
}

fn matches_exclude(exclude: &Value, tuple: &BTreeMap<String, Value>) -> bool {
    exclude
        .as_object()
        .map(|conditions| {
            conditions
                .iter()
                .all(|(axis, value)| tuple.get(axis) == Some(value))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::test_support::demo_context;

    #[test]
    fn product_minus_excludes() {
        let ctx = demo_context("test", json!({}));
        let stub = json!({
            "name": "test-{matrix[os]}",
            "matrix": {
                "os": ["linux", "mac", "windows"],
                "exclude": [{"os": "windows"}],
            },
        });
        let out = transform(&ctx, vec![stub]).unwrap();
        let names: Vec<&str> = out
            .iter()
            .map(|stub| stub["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["test-linux", "test-mac"]);
        assert_eq!(out[0]["attributes"]["matrix"], json!({"os": "linux"}));
    }

    #[test]
    fn two_axes_expand_fully_and_record_the_tuple() {
        let ctx = demo_context("test", json!({}));
        let stub = json!({
            "name": "test-{matrix[os]}-{matrix[level]}",
            "matrix": {
                "os": ["linux"],
                "level": ["opt", "debug"],
                "set-attributes": ["os"],
            },
        });
        let out = transform(&ctx, vec![stub]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["name"], "test-linux-opt");
        assert_eq!(out[0]["attributes"]["os"], "linux");
        assert_eq!(
            out[1]["attributes"]["matrix"],
            json!({"os": "linux", "level": "debug"})
        );
    }
}
