//! Built-in kind loaders.
//!
//! A loader turns a kind's raw configuration into the stream of task stubs
//! that feeds the transform pipeline. The `transform` loader enumerates
//! `tasks` plus any `tasks-from` files, merging each entry over
//! `task-defaults`. The `default` loader does the same and additionally
//! brackets the kind's transforms with the built-in `run` and `task`
//! transforms when they are not already listed.

use crate::context::TransformContext;
use crate::registry::register_loader;
use kindling_core::{Error, Result};
use kindling_utils::{deep_merge, load_yaml_cached};
use serde_json::Value;
use std::collections::BTreeMap;

pub fn register() -> Result<()> {
    register_loader("transform", transform_loader)?;
    register_loader("default", transform_loader)?;
    Ok(())
}

/// Transform references the `default` loader injects around the kind's own.
pub fn implicit_transforms(loader: &str, declared: &[String]) -> Vec<String> {
    if loader != "default" {
        return declared.to_vec();
    }
    let mut refs = Vec::new();
    if !declared.iter().any(|name| name == "run") {
        refs.push("run".to_string());
    }
    refs.extend(declared.iter().cloned());
    if !declared.iter().any(|name| name == "task") {
        refs.push("task".to_string());
    }
    refs
}

fn transform_loader(ctx: &TransformContext) -> Result<Vec<Value>> {
    let defaults = ctx
        .config
        .get("task-defaults")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    // name → stub, name collisions across tasks and tasks-from are errors.
    let mut stubs: BTreeMap<String, Value> = BTreeMap::new();
    collect_tasks(&ctx.kind, ctx.config.get("tasks"), &defaults, None, &mut stubs)?;

    if let Some(files) = ctx.config.get("tasks-from").and_then(Value::as_array) {
        for file in files {
            let relative = file.as_str().ok_or_else(|| {
                Error::loader(&ctx.kind, "tasks-from entries must be relative paths")
            })?;
            let path = ctx.path.join(relative);
            let loaded = load_yaml_cached(&path).map_err(|err| {
                Error::loader(&ctx.kind, format!("broken tasks-from '{relative}': {err}"))
            })?;
            let file_defaults = match loaded.get("task-defaults") {
                Some(extra) => deep_merge(&defaults, extra),
                None => defaults.clone(),
            };
            collect_tasks(
                &ctx.kind,
                loaded.get("tasks"),
                &file_defaults,
                Some(relative),
                &mut stubs,
            )?;
        }
    }

    Ok(stubs.into_values().collect())
}

fn collect_tasks(
    kind: &str,
    tasks: Option<&Value>,
    defaults: &Value,
    origin: Option<&str>,
    stubs: &mut BTreeMap<String, Value>,
) -> Result<()> {
    let Some(tasks) = tasks else {
        return Ok(());
    };
    let tasks = tasks
        .as_object()
        .ok_or_else(|| Error::loader(kind, "'tasks' must be a mapping"))?;
    for (name, stub) in tasks {
        if stubs.contains_key(name) {
            let origin = origin.unwrap_or("kind.yml");
            return Err(Error::loader(
                kind,
                format!("duplicate task name '{name}' (from {origin})"),
            ));
        }
        let mut merged = deep_merge(defaults, stub);
        if let Some(map) = merged.as_object_mut() {
            map.entry("name".to_string())
                .or_insert_with(|| Value::String(name.clone()));
        }
        stubs.insert(name.clone(), merged);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::test_support::demo_context_at;
    use serde_json::json;

    #[test]
    fn tasks_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = demo_context_at(
            "hello",
            json!({
                "task-defaults": {"worker": {"os": "linux"}},
                "tasks": {"a": {"worker": {"cores": 2}}},
            }),
            dir.path(),
        );
        let stubs = transform_loader(&ctx).unwrap();
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0]["name"], "a");
        assert_eq!(stubs[0]["worker"], json!({"os": "linux", "cores": 2}));
    }

    #[test]
    fn tasks_from_files_are_loaded_relative_to_the_kind() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("more.yml"),
            "task-defaults:\n  tier: 2\ntasks:\n  b: {}\n",
        )
        .unwrap();
        let ctx = demo_context_at(
            "hello",
            json!({
                "tasks": {"a": {}},
                "tasks-from": ["more.yml"],
            }),
            dir.path(),
        );
        let stubs = transform_loader(&ctx).unwrap();
        let names: Vec<&str> = stubs
            .iter()
            .map(|stub| stub["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(stubs[1]["tier"], json!(2));
    }

    #[test]
    fn duplicate_names_across_sources_fail() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("more.yml"), "tasks:\n  a: {}\n").unwrap();
        let ctx = demo_context_at(
            "hello",
            json!({"tasks": {"a": {}}, "tasks-from": ["more.yml"]}),
            dir.path(),
        );
        let err = transform_loader(&ctx).unwrap_err();
        assert!(err.to_string().contains("duplicate task name 'a'"));
    }

    #[test]
    fn missing_tasks_from_file_is_a_loader_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = demo_context_at("hello", json!({"tasks-from": ["ghost.yml"]}), dir.path());
        let err = transform_loader(&ctx).unwrap_err();
        assert!(matches!(err, Error::Loader { .. }));
    }

    #[test]
    fn default_loader_brackets_with_run_and_task() {
        assert_eq!(
            implicit_transforms("default", &["matrix".to_string()]),
            vec!["run", "matrix", "task"]
        );
        assert_eq!(
            implicit_transforms("default", &["run".to_string(), "task".to_string()]),
            vec!["run", "task"]
        );
        assert_eq!(
            implicit_transforms("transform", &["matrix".to_string()]),
            vec!["matrix"]
        );
    }
}
