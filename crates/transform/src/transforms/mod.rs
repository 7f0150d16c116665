//! Built-in transforms.

pub mod cached_tasks;
pub mod chunking;
pub mod from_deps;
pub mod matrix;
pub mod notify;
pub mod run;
pub mod task;
pub mod task_context;

use crate::registry::{register_group_by, register_run_using, register_transform};
use kindling_core::Result;
use serde_json::Value;
use std::collections::BTreeMap;

pub fn register() -> Result<()> {
    register_transform("task_context", task_context::transform)?;
    register_transform("matrix", matrix::transform)?;
    register_transform("chunking", chunking::transform)?;
    register_transform("from_deps", from_deps::transform)?;
    register_transform("notify", notify::transform)?;
    register_transform("cached_tasks", cached_tasks::transform)?;
    register_transform("run", run::transform)?;
    register_transform("task", task::transform)?;
    register_group_by("single", from_deps::group_by_single)?;
    register_group_by("all", from_deps::group_by_all)?;
    register_group_by("attribute", from_deps::group_by_attribute)?;
    register_run_using("run-task", run::run_task)?;
    register_run_using("bare", run::bare)?;
    Ok(())
}

/// Replace `{key}` placeholders in `template` from `substitutions`.
/// Unknown placeholders are left untouched.
pub(crate) fn interpolate(template: &str, substitutions: &BTreeMap<String, Value>) -> String {
    let mut result = template.to_string();
    for (key, value) in substitutions {
        let placeholder = format!("{{{key}}}");
        if result.contains(&placeholder) {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            result = result.replace(&placeholder, &rendered);
        }
    }
    result
}

/// Apply [`interpolate`] to every string beneath `value`, in place.
pub(crate) fn interpolate_value(value: &mut Value, substitutions: &BTreeMap<String, Value>) {
    match value {
        Value::String(text) => *text = interpolate(text, substitutions),
        Value::Array(items) => {
            for item in items {
                interpolate_value(item, substitutions);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                interpolate_value(item, substitutions);
            }
        }
        _ => {}
    }
}

/// Fixtures shared by the transform test suites.
pub mod test_support {
    use crate::context::TransformContext;
    use kindling_config::GraphConfig;
    use kindling_params::test_support::demo_parameters_value;
    use kindling_params::Parameters;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Arc;

    pub fn demo_graph_config() -> GraphConfig {
        GraphConfig::from_value(
            json!({
                "trust-domain": "demo",
                "task-priority": "low",
                "workers": {
                    "aliases": {
                        "b-linux": {
                            "provisioner": "demo-provisioner",
                            "implementation": "docker-worker",
                            "os": "linux",
                            "worker-type": "b-linux",
                        },
                        "t-win": {
                            "provisioner": "demo-provisioner",
                            "implementation": "generic-worker",
                            "os": "windows",
                            "worker-type": {"by-level": {"3": "t-win-large", "default": "t-win"}},
                        },
                    },
                },
                "taskgraph": {
                    "repositories": {"demo": {"name": "demo"}},
                },
            }),
            Path::new("/taskcluster"),
        )
        .expect("demo graph config is valid")
    }

    pub fn demo_context_at(kind: &str, config: Value, path: &Path) -> TransformContext {
        TransformContext {
            kind: kind.to_string(),
            config,
            parameters: Arc::new(
                Parameters::from_value(demo_parameters_value())
                    .expect("demo parameters are valid"),
            ),
            graph_config: Arc::new(demo_graph_config()),
            kind_dependencies_tasks: BTreeMap::new(),
            path: path.to_path_buf(),
            write_artifacts: false,
        }
    }

    pub fn demo_context(kind: &str, config: Value) -> TransformContext {
        demo_context_at(kind, config, Path::new("/taskcluster/kinds/demo"))
    }
}
