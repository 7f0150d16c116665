//! Final expression-language substitution over wire-format definitions.
//!
//! The expression language itself is a collaborator concern; the core hands
//! each definition and a context to a [`JsonEvaluator`] and stores whatever
//! comes back. The default evaluator substitutes nothing.

use kindling_config::GraphConfig;
use kindling_core::{Result, Task};
use kindling_graph::TaskGraph;
use kindling_params::Parameters;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

pub trait JsonEvaluator: Send + Sync {
    fn evaluate(&self, definition: &Value, context: &BTreeMap<String, Value>) -> Result<Value>;
}

/// The default collaborator: definitions pass through unchanged.
pub struct PassThroughEvaluator;

impl JsonEvaluator for PassThroughEvaluator {
    fn evaluate(&self, definition: &Value, _context: &BTreeMap<String, Value>) -> Result<Value> {
        Ok(definition.clone())
    }
}

static EVALUATOR: Lazy<RwLock<Arc<dyn JsonEvaluator>>> =
    Lazy::new(|| RwLock::new(Arc::new(PassThroughEvaluator)));

/// Install a different evaluator (an embedder wiring in a real json-e
/// implementation).
pub fn set_evaluator(evaluator: Arc<dyn JsonEvaluator>) {
    *EVALUATOR.write().expect("evaluator slot poisoned") = evaluator;
}

pub fn morph(
    graph: TaskGraph,
    label_to_taskid: BTreeMap<String, String>,
    params: &Parameters,
    _graph_config: &GraphConfig,
) -> Result<(TaskGraph, BTreeMap<String, String>)> {
    let evaluator = Arc::clone(&EVALUATOR.read().expect("evaluator slot poisoned"));
    let mut tasks: BTreeMap<String, Task> = graph.tasks().clone();
    for task in tasks.values_mut() {
        let context = BTreeMap::from([
            ("task-id".to_string(), Value::String(
                label_to_taskid.get(&task.label).cloned().unwrap_or_default(),
            )),
            ("label".to_string(), Value::String(task.label.clone())),
            ("project".to_string(), Value::String(params.project.clone())),
        ]);
        task.task = evaluator.evaluate(&task.task, &context)?;
    }
    Ok((
        TaskGraph::from_json(serde_json::to_value(tasks)?)?,
        label_to_taskid,
    ))
}
