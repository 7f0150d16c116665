//! The configuration handed to every transform in a kind's pipeline.

use kindling_config::GraphConfig;
use kindling_core::Task;
use kindling_params::Parameters;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Immutable context for one kind's transform run.
#[derive(Debug, Clone)]
pub struct TransformContext {
    /// Name of the kind being generated.
    pub kind: String,
    /// The kind's raw `kind.yml` configuration.
    pub config: Value,
    pub parameters: Arc<Parameters>,
    pub graph_config: Arc<GraphConfig>,
    /// Tasks of the kinds named in `kind-dependencies`, keyed by label.
    pub kind_dependencies_tasks: BTreeMap<String, Task>,
    /// Directory containing the kind's `kind.yml`.
    pub path: PathBuf,
    /// Emit per-transform debug artifacts.
    pub write_artifacts: bool,
}

impl TransformContext {
    /// Keyed-by context shared by most transforms: parameters that commonly
    /// key conditional values.
    pub fn keyed_by_context(&self) -> BTreeMap<String, Value> {
        let params = &self.parameters;
        BTreeMap::from([
            ("kind".to_string(), Value::String(self.kind.clone())),
            ("project".to_string(), Value::String(params.project.clone())),
            (
                "level".to_string(),
                Value::Number(params.level.into()),
            ),
            (
                "tasks-for".to_string(),
                Value::String(params.tasks_for.clone()),
            ),
        ])
    }
}
