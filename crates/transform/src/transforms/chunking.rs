//! Duplicate a task N times, substituting `{this_chunk}` and
//! `{total_chunks}` into designated fields.

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
        let Some(spec) = stub.get("chunk").cloned() else {
            out.push(stub);
            continue;
        };
        let name = stub_name(&stub);
        let total = spec
            .get("total-chunks")
            .and_then(Value::as_u64)
            .filter(|total| *total > 0)
            .ok_or_else(|| {
                Error::transform(
                    &ctx.kind,
                    Some(name.clone()),
                    "chunk.total-chunks must be a positive integer",
                )
            })?;
        let fields: Vec<String> = spec
            .get("substitution-fields")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| vec!["name".to_string()]);

        for this_chunk in 1..=total {
            let mut clone = stub.clone();
            let substitutions = BTreeMap::from([
                ("this_chunk".to_string(), json!(this_chunk)),
                ("total_chunks".to_string(), json!(total)),
            ]);
            for field in &fields {
                visit_path(&mut clone, field, &mut |value| {
                    interpolate_value(value, &substitutions)
                });
            }
            if let Some(map) = clone.as_object_mut() {
                map.remove("chunk");
                let attributes = map
                    .entry("attributes".to_string())
                    .or_insert_with(|| json!({}));
                if let Some(attributes) = attributes.as_object_mut() {
                    attributes.insert("this_chunk".to_string(), json!(this_chunk));
                    attributes.insert("total_chunks".to_string(), json!(total));
                }
            }
            out.push(clone);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::test_support::demo_context;

    #[test]
    fn chunks_substitute_counters() {
        let ctx = demo_context("test", json!({}));
        let stub = json!({
            "name": "test-{this_chunk}",
            "description": "chunk {this_chunk} of {total_chunks}",
            "chunk": {
                "total-chunks": 3,
                "substitution-fields": ["name", "description"],
            },
        });
        let out = transform(&ctx, vec![stub]).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0]["name"], "test-1");
        assert_eq!(out[2]["description"], "chunk 3 of 3");
        assert_eq!(out[1]["attributes"]["this_chunk"], json!(2));
    }

    #[test]
    fn zero_chunks_is_an_error() {
        let ctx = demo_context("test", json!({}));
        let stub = json!({"name": "test", "chunk": {"total-chunks": 0}});
        assert!(transform(&ctx, vec![stub]).is_err());
    }
}
