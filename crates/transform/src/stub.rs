//! Conversion from a fully-transformed stub to a concrete [`Task`].

use kindling_core::{Error, Result, Task, DOCKER_IMAGE_EDGE};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parse the stub emitted by the final `task` transform. Expected keys:
/// `label`, `task`, and optionally `attributes`, `dependencies`,
/// `soft-dependencies`, `if-dependencies`, `optimization`, `description`.
pub fn stub_to_task(kind: &str, stub: &Value) -> Result<Task> {
    let label = stub
        .get("label")
        .and_then(Value::as_str)
        .filter(|label| !label.is_empty())
        .ok_or_else(|| Error::transform(kind, None, "stub is missing a label"))?;
    let definition = stub
        .get("task")
        .cloned()
        .ok_or_else(|| Error::transform(kind, Some(label.to_string()), "stub has no task payload"))?;

    let mut task = Task::new(kind, label, definition);

    if let Some(attributes) = stub.get("attributes").and_then(Value::as_object) {
        task.attributes = attributes
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
    }
    task.attributes
        .insert("kind".to_string(), Value::String(kind.to_string()));

    if let Some(dependencies) = stub.get("dependencies").and_then(Value::as_object) {
        let mut edges = BTreeMap::new();
        for (edge, target) in dependencies {
            if edge == DOCKER_IMAGE_EDGE {
                return Err(Error::transform(
                    kind,
                    Some(label.to_string()),
                    format!("edge name '{DOCKER_IMAGE_EDGE}' is reserved"),
                ));
            }
            let target = target.as_str().ok_or_else(|| {
                Error::transform(
                    kind,
                    Some(label.to_string()),
                    format!("dependency '{edge}' is not a label"),
                )
            })?;
            edges.insert(edge.clone(), target.to_string());
        }
        task.dependencies = edges;
    }

    task.soft_dependencies = string_list(stub.get("soft-dependencies"));
    task.if_dependencies = string_list(stub.get("if-dependencies"));

    if let Some(optimization) = stub.get("optimization") {
        if !optimization.is_null() {
            let map = optimization.as_object().ok_or_else(|| {
                Error::transform(
                    kind,
                    Some(label.to_string()),
                    "optimization must be a single-strategy mapping",
                )
            })?;
            if map.len() != 1 {
                return Err(Error::transform(
                    kind,
                    Some(label.to_string()),
                    "optimization must name exactly one strategy",
                ));
            }
            task.optimization = Some(
                map.iter()
                    .map(|(strategy, arg)| (strategy.clone(), arg.clone()))
                    .collect(),
            );
        }
    }

    task.description = stub
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(task)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let mut seen = Vec::new();
    if let Some(Value::Array(items)) = value {
        for item in items {
            if let Some(text) = item.as_str() {
                if !seen.iter().any(|existing: &String| existing == text) {
                    seen.push(text.to_string());
                }
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_stub_parses() {
        let stub = json!({
            "label": "test-linux",
            "description": "run the tests",
            "attributes": {"platform": "linux"},
            "dependencies": {"build": "build-linux"},
            "soft-dependencies": ["docs-html", "docs-html"],
            "if-dependencies": ["build"],
            "optimization": {"skip-unless-changed": ["src/**"]},
            "task": {"metadata": {"name": "test-linux"}},
        });
        let task = stub_to_task("test", &stub).unwrap();
        assert_eq!(task.label, "test-linux");
        assert_eq!(task.kind, "test");
        assert_eq!(task.attributes["kind"], json!("test"));
        assert_eq!(task.dependencies["build"], "build-linux");
        assert_eq!(task.soft_dependencies, vec!["docs-html"]);
        assert_eq!(task.if_dependencies, vec!["build"]);
        assert!(task.optimization.is_some());
    }

    #[test]
    fn reserved_edge_name_is_rejected() {
        let stub = json!({
            "label": "test-linux",
            "dependencies": {"docker-image": "docker-image-test"},
            "task": {},
        });
        let err = stub_to_task("test", &stub).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn multi_strategy_optimization_is_rejected() {
        let stub = json!({
            "label": "test-linux",
            "optimization": {"a": 1, "b": 2},
            "task": {},
        });
        assert!(stub_to_task("test", &stub).is_err());
    }
}
