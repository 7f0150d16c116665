//! Rendering of phase results: label listings or filtered JSON.

use kindling_core::Result;
use kindling_graph::TaskGraph;
use regex::Regex;
use serde_json::Value;

pub struct OutputOptions {
    pub json: bool,
    pub tasks_regex: Option<String>,
    pub exclude_keys: Vec<String>,
}

pub fn render(graph: &TaskGraph, options: &OutputOptions) -> Result<String> {
    let filter = options
        .tasks_regex
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|err| kindling_core::Error::config(format!("bad --tasks regex: {err}")))?;
    let matches = |label: &str| filter.as_ref().map_or(true, |regex| regex.is_match(label));

    if !options.json {
        let mut lines: Vec<&str> = graph.labels().filter(|label| matches(label)).collect();
        lines.sort_unstable();
        return Ok(lines.join("\n"));
    }

    let mut value = graph.to_json();
    if let Some(map) = value.as_object_mut() {
        map.retain(|label, _| matches(label));
        for record in map.values_mut() {
            for key in &options.exclude_keys {
                exclude_key(record, key);
            }
        }
    }
    Ok(serde_json::to_string_pretty(&value)?)
}

fn exclude_key(record: &mut Value, dotted: &str) {
    let Some((parent_path, leaf)) = dotted.rsplit_once('.') else {
        if let Some(map) = record.as_object_mut() {
            map.remove(dotted);
        }
        return;
    };
    let mut current = record;
    for segment in parent_path.split('.') {
        match current.as_object_mut().and_then(|map| map.get_mut(segment)) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Some(map) = current.as_object_mut() {
        map.remove(leaf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindling_core::Task;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn graph() -> TaskGraph {
        let mut tasks = BTreeMap::new();
        for label in ["build-linux", "build-mac", "test-linux"] {
            tasks.insert(
                label.to_string(),
                Task::new("x", label, json!({"payload": {"env": {"SECRET": "x"}}, "routes": []})),
            );
        }
        TaskGraph::new(tasks).unwrap()
    }

    #[test]
    fn label_listing_honors_the_regex() {
        let rendered = render(
            &graph(),
            &OutputOptions {
                json: false,
                tasks_regex: Some("^build-".to_string()),
                exclude_keys: vec![],
            },
        )
        .unwrap();
        assert_eq!(rendered, "build-linux\nbuild-mac");
    }

    #[test]
    fn exclude_key_strips_nested_paths() {
        let rendered = render(
            &graph(),
            &OutputOptions {
                json: true,
                tasks_regex: None,
                exclude_keys: vec!["task.payload.env".to_string()],
            },
        )
        .unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert!(value["build-linux"]["task"]["payload"].get("env").is_none());
        assert!(value["build-linux"]["task"].get("routes").is_some());
    }
}
