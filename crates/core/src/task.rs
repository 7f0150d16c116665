//! The per-task record carried through transforms, graphs, and submission.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A concrete task, frozen once the full graph is assembled.
///
/// Transforms build these from raw stubs; afterwards the only permitted
/// rewrites are the optimizer's dependency re-pointing (on a cloned graph)
/// and morph edits to the wire-format `task` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Name of the kind that produced this task.
    pub kind: String,

    /// Globally unique label, conventionally `<kind>-<name>`.
    pub label: String,

    /// Free-form attributes consulted by filters, optimizers, and transforms.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,

    /// Edge name → label of the depended-on task.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Labels that must exist in the full graph when this task is kept, but
    /// are not pulled into the target graph.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub soft_dependencies: Vec<String>,

    /// Edge names whose survival this task is conditioned on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub if_dependencies: Vec<String>,

    /// Optimization spec: strategy name → argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization: Option<BTreeMap<String, Value>>,

    /// The platform wire-format definition. Opaque to the core except for
    /// `routes`, `dependencies`, `requires`, and `taskGroupId`.
    pub task: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Assigned immediately before submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Task {
    pub fn new(kind: impl Into<String>, label: impl Into<String>, task: Value) -> Self {
        Task {
            kind: kind.into(),
            label: label.into(),
            attributes: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            soft_dependencies: Vec::new(),
            if_dependencies: Vec::new(),
            optimization: None,
            task,
            description: None,
            task_id: None,
        }
    }

    /// Attribute lookup that treats a missing key as `false`.
    pub fn attribute_is_true(&self, name: &str) -> bool {
        matches!(self.attributes.get(name), Some(Value::Bool(true)))
    }

    /// The labels of the tasks named by `if_dependencies` edges.
    pub fn if_dependency_labels(&self) -> Vec<&str> {
        self.if_dependencies
            .iter()
            .filter_map(|edge| self.dependencies.get(edge).map(String::as_str))
            .collect()
    }
}
