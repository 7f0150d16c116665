//! Resolution of `by-<attr>` conditional values.
//!
//! A keyed-by value has the shape
//!
//! ```yaml
//! by-platform:
//!   linux: 1
//!   win.*: 2
//!   default: 3
//! ```
//!
//! and collapses to the branch selected by the `platform` attribute:
//! exact match first, then each key tried as an anchored regex, then
//! `default`. Branches may nest further `by-*` conditionals, which resolve
//! in turn until a plain value remains.

use kindling_core::{Error, Result};
use kindling_utils::visit_path;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

fn keyed_by_attr(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.keys().next()?.strip_prefix("by-").map(str::to_string)
}

fn attribute_as_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn select_branch(
    branches: &serde_json::Map<String, Value>,
    attr: &str,
    attr_value: &str,
    descriptor: &str,
) -> Result<Value> {
    if let Some(found) = branches.get(attr_value) {
        return Ok(found.clone());
    }
    let mut matched: Vec<(&String, &Value)> = Vec::new();
    for (key, branch) in branches {
        if key == "default" {
            continue;
        }
        let anchored = format!("^(?:{key})$");
        if let Ok(regex) = Regex::new(&anchored) {
            if regex.is_match(attr_value) {
                matched.push((key, branch));
            }
        }
    }
    match matched.len() {
        1 => return Ok(matched[0].1.clone()),
        0 => {}
        _ => {
            return Err(Error::schema(
                descriptor,
                format!(
                    "{attr} value '{attr_value}' matches multiple patterns: {:?}",
                    matched.iter().map(|(key, _)| key).collect::<Vec<_>>()
                ),
            ))
        }
    }
    if let Some(fallback) = branches.get("default") {
        return Ok(fallback.clone());
    }
    Err(Error::schema(
        descriptor,
        format!("no entry for {attr} value '{attr_value}' and no default"),
    ))
}

fn resolve_value(
    value: &mut Value,
    container: &Value,
    descriptor: &str,
    context: &BTreeMap<String, Value>,
) -> Result<()> {
    while let Some(attr) = keyed_by_attr(value) {
        let branches = value
            .as_object()
            .and_then(|map| map.values().next())
            .and_then(Value::as_object)
            .ok_or_else(|| {
                Error::schema(descriptor, format!("'by-{attr}' must contain a mapping"))
            })?
            .clone();

        let attr_value = context
            .get(&attr)
            .or_else(|| container.as_object().and_then(|map| map.get(&attr)))
            .ok_or_else(|| {
                Error::schema(
                    descriptor,
                    format!("no attribute '{attr}' available to resolve 'by-{attr}'"),
                )
            })?;
        let attr_value = attribute_as_string(attr_value);

        *value = select_branch(&branches, &attr, &attr_value, descriptor)?;
    }
    Ok(())
}

/// Collapse the `by-*` conditional at `dotted_path` inside `container`.
///
/// The path supports `[]` fan-out over lists. Attribute lookups consult
/// `context` first, then the container's own top-level fields. Values that
/// are not `by-*` mappings are left untouched.
pub fn resolve_keyed_by(
    container: &mut Value,
    dotted_path: &str,
    descriptor: &str,
    context: &BTreeMap<String, Value>,
) -> Result<()> {
    let snapshot = container.clone();
    let mut outcome = Ok(());
    visit_path(container, dotted_path, &mut |value| {
        if outcome.is_ok() {
            outcome = resolve_value(value, &snapshot, descriptor, context);
        }
    });
    outcome
}
