//! The final transform: high-level task descriptions become platform
//! wire-format definitions.

use crate::context::TransformContext;
use crate::sequence::stub_name;
use kindling_config::resolve_keyed_by;
use kindling_core::{Error, Result};
use kindling_utils::{json_time_from_now, current_json_time};
use serde_json::{json, Value};

pub fn transform(ctx: &TransformContext, stubs: Vec<Value>) -> Result<Vec<Value>> {
    stubs
        .into_iter()
        .map(|stub| build_task(ctx, stub))
        .collect()
}

fn build_task(ctx: &TransformContext, mut stub: Value) -> Result<Value> {
    let name = stub_name(&stub);
    let wrap = |err: Error| Error::transform(&ctx.kind, Some(name.clone()), err.to_string());

    let label = stub
        .get("label")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{name}", ctx.kind));

    let keyed_ctx = ctx.keyed_by_context();
    for field in ["worker-type", "priority", "deadline-after", "expires-after"] {
        resolve_keyed_by(&mut stub, field, &format!("{label}.{field}"), &keyed_ctx)
            .map_err(wrap)?;
    }

    let (provisioner_id, worker_type, implementation, os) = resolve_worker(ctx, &label, &stub)?;

    let params = &ctx.parameters;
    let deadline = stub
        .get("deadline-after")
        .and_then(Value::as_str)
        .unwrap_or("1 day");
    let expires = stub
        .get("expires-after")
        .and_then(Value::as_str)
        .unwrap_or(if params.level < 3 { "28 days" } else { "1 year" });

    // A task's own priority wins over the repository default.
    let mut holder = match stub.get("priority") {
        Some(own) => json!({ "priority": own }),
        None => json!({ "priority": ctx.graph_config.task_priority() }),
    };
    resolve_keyed_by(
        &mut holder,
        "priority",
        &format!("{label}.priority"),
        &keyed_ctx,
    )
    .map_err(wrap)?;
    let priority = holder["priority"].clone();

    let mut routes: Vec<Value> = stub
        .get("routes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    routes.push(json!(format!(
        "tc-treeherder.v2.{}.{}",
        params.project, params.head_rev
    )));

    let payload = build_payload(ctx, &label, &implementation, &stub)?;

    let scopes = stub
        .get("scopes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut extra = stub.get("extra").cloned().unwrap_or_else(|| json!({}));
    if let Some(treeherder) = stub.get("treeherder") {
        if let Some(extra) = extra.as_object_mut() {
            extra.insert("treeherder".to_string(), treeherder.clone());
        }
    }

    let definition = json!({
        "provisionerId": provisioner_id,
        "workerType": worker_type,
        "schedulerId": format!("{}-level-{}", ctx.graph_config.trust_domain(), params.level),
        "created": current_json_time(),
        "deadline": json_time_from_now(deadline).map_err(wrap)?,
        "expires": json_time_from_now(expires).map_err(wrap)?,
        "priority": priority,
        "retries": stub.get("retries").and_then(Value::as_u64).unwrap_or(5),
        "routes": routes,
        "scopes": scopes,
        "payload": payload,
        "tags": stub.get("tags").cloned().unwrap_or_else(|| json!({})),
        "extra": extra,
        "metadata": {
            "name": label,
            "description": stub.get("description").cloned().unwrap_or_else(|| json!("")),
            "owner": params.owner,
            "source": format!("{}/file/{}", params.head_repository, params.head_rev),
        },
    });

    let mut attributes = stub.get("attributes").cloned().unwrap_or_else(|| json!({}));
    if let Some(attributes) = attributes.as_object_mut() {
        attributes
            .entry("run_on_projects".to_string())
            .or_insert_with(|| json!(["all"]));
        attributes.insert("worker-implementation".to_string(), json!(implementation));
        attributes.insert("worker-os".to_string(), json!(os));
    }

    let mut result = json!({
        "label": label,
        "attributes": attributes,
        "task": definition,
    });
    let out = result.as_object_mut().expect("literal object");
    for (from, to) in [
        ("dependencies", "dependencies"),
        ("soft-dependencies", "soft-dependencies"),
        ("if-dependencies", "if-dependencies"),
        ("optimization", "optimization"),
        ("description", "description"),
    ] {
        if let Some(value) = stub.get(from) {
            out.insert(to.to_string(), value.clone());
        }
    }
    Ok(result)
}

fn resolve_worker(
    ctx: &TransformContext,
    label: &str,
    stub: &Value,
) -> Result<(String, String, String, String)> {
    let alias = stub
        .get("worker-type")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::transform(&ctx.kind, Some(label.to_string()), "task needs a worker-type")
        })?;
    let mut entry = ctx.graph_config.worker_alias(alias)?.clone();
    let keyed_ctx = ctx.keyed_by_context();
    for field in ["provisioner", "worker-type"] {
        resolve_keyed_by(
            &mut entry,
            field,
            &format!("worker alias '{alias}' {field}"),
            &keyed_ctx,
        )?;
    }
    let field = |key: &str| -> Result<String> {
        entry
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::config(format!("worker alias '{alias}' lacks {key}")))
    };
    Ok((
        field("provisioner")?,
        field("worker-type")?,
        field("implementation")?,
        field("os")?,
    ))
}

fn build_payload(
    ctx: &TransformContext,
    label: &str,
    implementation: &str,
    stub: &Value,
) -> Result<Value> {
    let worker = stub.get("worker").cloned().unwrap_or_else(|| json!({}));
    let command = worker.get("command").cloned().unwrap_or_else(|| json!([]));
    let env = worker.get("env").cloned().unwrap_or_else(|| json!({}));
    let max_run_time = worker
        .get("max-run-time")
        .and_then(Value::as_u64)
        .unwrap_or(3600);

    match implementation {
        "docker-worker" => {
            let image = worker.get("docker-image").cloned().unwrap_or_else(|| {
                json!(format!("{}/ci-base:latest", ctx.graph_config.trust_domain()))
            });
            Ok(json!({
                "image": image,
                "command": command,
                "env": env,
                "maxRunTime": max_run_time,
            }))
        }
        "generic-worker" => Ok(json!({
            "command": command,
            "env": env,
            "maxRunTime": max_run_time,
        })),
        other => Err(Error::transform(
            &ctx.kind,
            Some(label.to_string()),
            format!("no payload builder for worker implementation '{other}'"),
        )),
    }
}
