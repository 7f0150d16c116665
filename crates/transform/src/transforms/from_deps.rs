//! Replicate a task once per group of kind-dependency tasks.

use crate::context::TransformContext;
use crate::registry::lookup_group_by;
use crate::sequence::stub_name;
use kindling_core::{Error, Result, Task, ATTR_PRIMARY_DEPENDENCY};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub fn transform(ctx: &TransformContext, stubs: Vec<Value>) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    for stub in stubs {
        let Some(spec) = stub.get("from-deps").cloned() else {
            out.push(stub);
            continue;
        };
        out.extend(expand(ctx, stub, &spec)?);
    }
    Ok(out)
}

fn expand(ctx: &TransformContext, stub: Value, spec: &Value) -> Result<Vec<Value>> {
    let name = stub_name(&stub);
    let declared_kinds = kind_dependencies(ctx);
    let wanted_kinds: Vec<String> = spec
        .get("kinds")
        .and_then(Value::as_array)
        .map(|kinds| {
            kinds
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or(declared_kinds);

    let candidates: Vec<Task> = ctx
        .kind_dependencies_tasks
        .values()
        .filter(|task| wanted_kinds.iter().any(|kind| *kind == task.kind))
        .cloned()
        .collect();

    let (group_by_name, group_by_arg) = parse_group_by(spec);
    let group_by = lookup_group_by(&group_by_name).ok_or_else(|| {
        Error::transform(
            &ctx.kind,
            Some(name.clone()),
            format!("unknown group-by strategy '{group_by_name}'"),
        )
    })?;
    let groups = group_by(ctx, &group_by_arg, &candidates)?;

    let copy_attributes: Vec<String> = spec
        .get("copy-attributes")
        .and_then(Value::as_array)
        .map(|attrs| {
            attrs
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut expanded = Vec::new();
    for group in groups {
        if group.is_empty() {
            continue;
        }
        // The primary dependency owns the generated task's identity: the
        // first listed kind that is present in the group.
        let primary = wanted_kinds
            .iter()
            .find_map(|kind| group.iter().find(|task| task.kind == *kind))
            .unwrap_or(&group[0]);

        let mut clone = stub.clone();
        let map = clone
            .as_object_mut()
            .expect("stubs are mappings by construction");
        map.remove("from-deps");

        let suffix = primary
            .label
            .strip_prefix(&format!("{}-", primary.kind))
            .unwrap_or(&primary.label);
        let base_name = map
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&name)
            .to_string();
        // A template task named like its kind takes the dependency's name
        // outright; anything else keeps its own name as a prefix.
        let new_name = if base_name == ctx.kind {
            suffix.to_string()
        } else {
            format!("{base_name}-{suffix}")
        };
        map.insert("name".to_string(), json!(new_name));

        let mut edges: BTreeMap<String, String> = map
            .get("dependencies")
            .and_then(Value::as_object)
            .map(|existing| {
                existing
                    .iter()
                    .filter_map(|(edge, label)| {
                        label.as_str().map(|label| (edge.clone(), label.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let mut per_kind_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for task in &group {
            let count = per_kind_counts.entry(task.kind.as_str()).or_insert(0);
            let edge = if *count == 0 {
                task.kind.clone()
            } else {
                format!("{}-{count}", task.kind)
            };
            *count += 1;
            edges.insert(edge, task.label.clone());
        }
        map.insert("dependencies".to_string(), json!(edges));

        let attributes = map
            .entry("attributes".to_string())
            .or_insert_with(|| json!({}));
        if let Some(attributes) = attributes.as_object_mut() {
            attributes.insert(
                ATTR_PRIMARY_DEPENDENCY.to_string(),
                json!(primary.label.clone()),
            );
            for attr in &copy_attributes {
                if let Some(value) = primary.attributes.get(attr) {
                    attributes.entry(attr.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        expanded.push(clone);
    }
    Ok(expanded)
}

fn kind_dependencies(ctx: &TransformContext) -> Vec<String> {
    ctx.config
        .get("kind-dependencies")
        .and_then(Value::as_array)
        .map(|kinds| {
            kinds
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `group-by` is either a bare strategy name or `attribute=<name>` style
/// `{strategy: arg}` mapping.
fn parse_group_by(spec: &Value) -> (String, Value) {
    match spec.get("group-by") {
        Some(Value::String(text)) => match text.split_once('=') {
            Some((strategy, arg)) => (strategy.to_string(), json!(arg)),
            None => (text.clone(), Value::Null),
        },
        Some(Value::Object(map)) if map.len() == 1 => {
            let (strategy, arg) = map.iter().next().expect("len checked");
            (strategy.clone(), arg.clone())
        }
        _ => ("single".to_string(), Value::Null),
    }
}

pub fn group_by_single(
    _ctx: &TransformContext,
    _arg: &Value,
    tasks: &[Task],
) -> Result<Vec<Vec<Task>>> {
    Ok(tasks.iter().map(|task| vec![task.clone()]).collect())
}

pub fn group_by_all(
    _ctx: &TransformContext,
    _arg: &Value,
    tasks: &[Task],
) -> Result<Vec<Vec<Task>>> {
    if tasks.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![tasks.to_vec()])
}

pub fn group_by_attribute(
    ctx: &TransformContext,
    arg: &Value,
    tasks: &[Task],
) -> Result<Vec<Vec<Task>>> {
    let attribute = arg.as_str().ok_or_else(|| {
        Error::transform(&ctx.kind, None, "group-by attribute needs an attribute name")
    })?;
    let mut groups: BTreeMap<String, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        let Some(value) = task.attributes.get(attribute) else {
            continue;
        };
        let key = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        groups.entry(key).or_default().push(task.clone());
    }
    Ok(groups.into_values().collect())
}
