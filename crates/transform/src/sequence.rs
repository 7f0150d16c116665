//! Ordered transform pipelines with validation checkpoints.

use crate::context::TransformContext;
use crate::registry::lookup_transform;
use kindling_config::Schema;
use kindling_core::{Error, Result};
use serde_json::Value;
use tracing::debug;

enum Step {
    Transform { name: String },
    Validate { schema: Schema, descriptor: String },
}

/// An ordered list of transforms applied to a kind's task stubs. A
/// validation checkpoint installed between transforms checks every stub
/// passing that point and fails fast on the first violation.
#[derive(Default)]
pub struct TransformSequence {
    steps: Vec<Step>,
}

impl TransformSequence {
    pub fn new() -> Self {
        TransformSequence { steps: Vec::new() }
    }

    /// Append a registered transform by name.
    pub fn add(&mut self, name: &str) -> Result<()> {
        if lookup_transform(name).is_none() {
            return Err(Error::config(format!("unknown transform '{name}'")));
        }
        self.steps.push(Step::Transform {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Install a validation checkpoint after the most recent transform.
    pub fn add_validate(&mut self, schema: Schema, descriptor: &str) {
        self.steps.push(Step::Validate {
            schema,
            descriptor: descriptor.to_string(),
        });
    }

    /// Run the pipeline over the loader's stubs.
    pub fn run(&self, ctx: &TransformContext, mut stubs: Vec<Value>) -> Result<Vec<Value>> {
        for step in &self.steps {
            match step {
                Step::Transform { name } => {
                    debug!(kind = %ctx.kind, transform = %name, input = stubs.len(), "running transform");
                    let function =
                        lookup_transform(name).expect("existence checked when the step was added");
                    stubs = function(ctx, stubs).map_err(|err| match err {
                        already @ Error::Transform { .. } => already,
                        other => Error::transform(&ctx.kind, None, other.to_string()),
                    })?;
                }
                Step::Validate { schema, descriptor } => {
                    for stub in &stubs {
                        let label = stub_name(stub);
                        schema
                            .validate(stub, &format!("{descriptor} ({label})"))
                            .map_err(|err| {
                                Error::transform(&ctx.kind, Some(label), err.to_string())
                            })?;
                    }
                }
            }
        }
        Ok(stubs)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Best-effort name of a stub for diagnostics.
pub fn stub_name(stub: &Value) -> String {
    for key in ["label", "name"] {
        if let Some(name) = stub.get(key).and_then(Value::as_str) {
            return name.to_string();
        }
    }
    "<unnamed>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::register_transform;
    use crate::transforms::test_support::demo_context;
    use kindling_config::Field;
    use serde_json::json;

    fn double(_ctx: &TransformContext, stubs: Vec<Value>) -> Result<Vec<Value>> {
        Ok(stubs
            .into_iter()
            .flat_map(|stub| [stub.clone(), stub])
            .collect())
    }

    fn drop_all(_ctx: &TransformContext, _stubs: Vec<Value>) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    #[test]
    fn transforms_may_fan_out_and_filter() {
        register_transform("seq-test-double", double).unwrap();
        register_transform("seq-test-drop", drop_all).unwrap();
        let ctx = demo_context("hello", json!({}));

        let mut sequence = TransformSequence::new();
        sequence.add("seq-test-double").unwrap();
        let out = sequence.run(&ctx, vec![json!({"name": "a"})]).unwrap();
        assert_eq!(out.len(), 2);

        let mut sequence = TransformSequence::new();
        sequence.add("seq-test-drop").unwrap();
        let out = sequence.run(&ctx, vec![json!({"name": "a"})]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn unknown_transform_is_rejected_up_front() {
        let mut sequence = TransformSequence::new();
        assert!(sequence.add("no-such-transform").is_err());
    }

    #[test]
    fn checkpoint_fails_fast_with_task_context() {
        let ctx = demo_context("hello", json!({}));
        let mut sequence = TransformSequence::new();
        sequence.add_validate(
            Schema::open_object(vec![Field::required("name", Schema::Str)]),
            "hello task",
        );
        let err = sequence
            .run(&ctx, vec![json!({"label": "hello-x"})])
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("hello-x"));
        assert!(text.contains("name"));
    }
}
