//! Translate a high-level `run:` stanza into concrete worker commands.
//!
//! The `using` value names a registered implementation. `run-task` wraps
//! the command in the repository-checkout bootstrap; `bare` passes it to
//! the worker untouched.

use crate::context::TransformContext;
use crate::registry::lookup_run_using;
use crate::sequence::stub_name;
use kindling_core::{Error, Result};
use serde_json::{json, Value};

pub fn transform(ctx: &TransformContext, stubs: Vec<Value>) -> Result<Vec<Value>> {
    stubs
        .into_iter()
        .map(|mut stub| {
            if stub.get("run").is_none() {
                return Ok(stub);
            }
            let name = stub_name(&stub);
            let using = stub["run"]
                .get("using")
                .and_then(Value::as_str)
                .unwrap_or("run-task")
                .to_string();
            let implementation = lookup_run_using(&using).ok_or_else(|| {
                Error::transform(
                    &ctx.kind,
                    Some(name.clone()),
                    format!("unknown run-using '{using}'"),
                )
            })?;
            implementation(ctx, &mut stub)
                .map_err(|err| Error::transform(&ctx.kind, Some(name), err.to_string()))?;
            if let Some(map) = stub.as_object_mut() {
                map.remove("run");
            }
            Ok(stub)
        })
        .collect()
}

fn run_command(stub: &Value) -> Result<Vec<String>> {
    match stub["run"].get("command") {
        Some(Value::String(line)) => Ok(vec!["bash".to_string(), "-cx".to_string(), line.clone()]),
        Some(Value::Array(words)) => Ok(words
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()),
        _ => Err(Error::config("run stanza needs a command")),
    }
}

fn worker_env(stub: &mut Value) -> &mut serde_json::Map<String, Value> {
    let worker = stub
        .as_object_mut()
        .expect("stubs are mappings")
        .entry("worker".to_string())
        .or_insert_with(|| json!({}));
    worker
        .as_object_mut()
        .expect("worker is a mapping")
        .entry("env".to_string())
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .expect("worker.env is a mapping")
}

/// Wrap the command in the repository bootstrap: the worker clones the
/// repository at the parameterized revision before running it.
pub fn run_task(ctx: &TransformContext, stub: &mut Value) -> Result<()> {
    let command = run_command(stub)?;
    let cwd = stub["run"]
        .get("cwd")
        .and_then(Value::as_str)
        .unwrap_or("checkouts/src")
        .to_string();

    let params = &ctx.parameters;
    let env = worker_env(stub);
    env.insert("REPOSITORY".to_string(), json!(params.head_repository));
    env.insert("REVISION".to_string(), json!(params.head_rev));
    env.insert("VCS_PATH".to_string(), json!(cwd));

    let mut wrapped = vec![
        "run-task".to_string(),
        format!("--repo-checkout={cwd}"),
        "--".to_string(),
    ];
    wrapped.extend(command);

    let worker = stub["worker"].as_object_mut().expect("created above");
    worker.insert("command".to_string(), json!(wrapped));
    Ok(())
}

/// Hand the command to the worker as-is.
pub fn bare(_ctx: &TransformContext, stub: &mut Value) -> Result<()> {
    let command = run_command(stub)?;
    let worker = stub
        .as_object_mut()
        .expect("stubs are mappings")
        .entry("worker".to_string())
        .or_insert_with(|| json!({}));
    worker
        .as_object_mut()
        .expect("worker is a mapping")
        .insert("command".to_string(), json!(command));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::test_support::demo_context;

    #[test]
    fn run_task_wraps_the_command_and_sets_checkout_env() {
        crate::register_builtins();
        let ctx = demo_context("build", json!({}));
        let stub = json!({
            "name": "linux",
            "run": {"using": "run-task", "command": "make build"},
        });
        let out = transform(&ctx, vec![stub]).unwrap();
        let command = out[0]["worker"]["command"].as_array().unwrap();
        assert_eq!(command[0], "run-task");
        assert_eq!(command.last().unwrap(), "make build");
        assert_eq!(out[0]["worker"]["env"]["REVISION"], "abcdef");
        assert!(out[0].get("run").is_none());
    }

    #[test]
    fn bare_passes_the_list_command_through() {
        crate::register_builtins();
        let ctx = demo_context("build", json!({}));
        let stub = json!({
            "name": "linux",
            "run": {"using": "bare", "command": ["./script.sh", "--fast"]},
        });
        let out = transform(&ctx, vec![stub]).unwrap();
        assert_eq!(out[0]["worker"]["command"], json!(["./script.sh", "--fast"]));
    }

    #[test]
    fn unknown_using_is_a_transform_error() {
        crate::register_builtins();
        let ctx = demo_context("build", json!({}));
        let stub = json!({"name": "linux", "run": {"using": "teleport"}});
        let err = transform(&ctx, vec![stub]).unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }
}
