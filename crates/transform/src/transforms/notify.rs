//! Validate and embed notification recipients and content.

use crate::context::TransformContext;
use crate::sequence::stub_name;
use kindling_core::{Error, Result};
use serde_json::{json, Value};

const STATUS_TYPES: [&str; 4] = ["on-completed", "on-failed", "on-exception", "on-defined"];

pub fn transform(ctx: &TransformContext, stubs: Vec<Value>) -> Result<Vec<Value>> {
    stubs
        .into_iter()
        .map(|mut stub| {
            let Some(spec) = stub.get("notify").cloned() else {
                return Ok(stub);
            };
            let name = stub_name(&stub);
            let recipients = spec
                .get("recipients")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if recipients.is_empty() {
                return Err(Error::transform(
                    &ctx.kind,
                    Some(name),
                    "notify needs at least one recipient",
                ));
            }

            let mut routes = Vec::new();
            for recipient in &recipients {
                routes.push(route_for(ctx, &name, recipient)?);
            }

            let map = stub.as_object_mut().expect("stubs are mappings");
            map.remove("notify");
            let existing = map
                .entry("routes".to_string())
                .or_insert_with(|| json!([]));
            if let Some(existing) = existing.as_array_mut() {
                existing.extend(routes.into_iter().map(Value::String));
            }
            if let Some(content) = spec.get("content") {
                let extra = map.entry("extra".to_string()).or_insert_with(|| json!({}));
                if let Some(extra) = extra.as_object_mut() {
                    extra.insert("notify".to_string(), content.clone());
                }
            }
            Ok(stub)
        })
        .collect()
}

fn route_for(ctx: &TransformContext, name: &str, recipient: &Value) -> Result<String> {
    let bad = |message: String| Error::transform(&ctx.kind, Some(name.to_string()), message);
    let map = recipient
        .as_object()
        .ok_or_else(|| bad("notify recipient must be a mapping".to_string()))?;
    let status = map
        .get("status-type")
        .and_then(Value::as_str)
        .unwrap_or("on-completed");
    if !STATUS_TYPES.contains(&status) {
        return Err(bad(format!("unknown status-type '{status}'")));
    }
    let kind = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| bad("notify recipient needs a type".to_string()))?;
    let address = map
        .get("address")
        .and_then(Value::as_str)
        .ok_or_else(|| bad(format!("notify recipient '{kind}' needs an address")))?;
    match kind {
        "email" => Ok(format!("notify.email.{address}.{status}")),
        "matrix-room" => Ok(format!("notify.matrix-room.{address}.{status}")),
        "slack-channel" => Ok(format!("notify.slack-channel.{address}.{status}")),
        "pulse-route" => Ok(format!("notify.pulse.{address}.{status}")),
        other => Err(bad(format!("unknown recipient type '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::test_support::demo_context;

    #[test]
    fn recipients_become_routes_and_content_lands_in_extra() {
        let ctx = demo_context("build", json!({}));
        let stub = json!({
            "name": "nightly",
            "notify": {
                "recipients": [
                    {"type": "email", "address": "dev@example.com", "status-type": "on-failed"},
                    {"type": "matrix-room", "address": "!room:example.com"},
                ],
                "content": {"email": {"subject": "nightly failed"}},
            },
        });
        let out = transform(&ctx, vec![stub]).unwrap();
        let routes = out[0]["routes"].as_array().unwrap();
        assert_eq!(routes[0], "notify.email.dev@example.com.on-failed");
        assert_eq!(routes[1], "notify.matrix-room.!room:example.com.on-completed");
        assert_eq!(out[0]["extra"]["notify"]["email"]["subject"], "nightly failed");
    }

    #[test]
    fn bad_recipient_type_fails() {
        let ctx = demo_context("build", json!({}));
        let stub = json!({
            "name": "nightly",
            "notify": {"recipients": [{"type": "pigeon", "address": "coop"}]},
        });
        assert!(transform(&ctx, vec![stub]).is_err());
    }
}
