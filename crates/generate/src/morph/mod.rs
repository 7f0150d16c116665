//! Morphs: late rewrites of wire-format definitions after optimization.
//!
//! Morphs run in registration order (the built-in list first, then any
//! extensions in the order they were registered); several touch overlapping
//! fields, so the order is part of the contract and is never sorted.

mod chain_of_trust;
mod index_task;
mod jsone;

pub use jsone::{set_evaluator, JsonEvaluator, PassThroughEvaluator};

use kindling_config::GraphConfig;
use kindling_core::{Error, Result};
use kindling_graph::TaskGraph;
use kindling_params::Parameters;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::debug;

/// A morph maps the graph and the label→task-id assignment to rewritten
/// versions of both; it may add tasks (with fresh labels and ids).
pub type MorphFn = fn(
    TaskGraph,
    BTreeMap<String, String>,
    &Parameters,
    &GraphConfig,
) -> Result<(TaskGraph, BTreeMap<String, String>)>;

static EXTENSIONS: Lazy<RwLock<Vec<(String, MorphFn)>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Register an additional morph, appended after the built-ins.
pub fn register_morph(name: &str, morph: MorphFn) -> Result<()> {
    let mut extensions = EXTENSIONS.write().expect("morph registry poisoned");
    if extensions.iter().any(|(existing, _)| existing == name) {
        return Err(Error::registry("morph", name));
    }
    extensions.push((name.to_string(), morph));
    Ok(())
}

fn builtin_morphs() -> Vec<(&'static str, MorphFn)> {
    vec![
        ("make-index-task", index_task::morph),
        ("apply-jsone", jsone::morph),
        ("add-chain-of-trust", chain_of_trust::morph),
    ]
}

/// Run every morph over the optimized graph.
pub fn morph_task_graph(
    mut graph: TaskGraph,
    mut label_to_taskid: BTreeMap<String, String>,
    params: &Parameters,
    graph_config: &GraphConfig,
) -> Result<(TaskGraph, BTreeMap<String, String>)> {
    for (name, morph) in builtin_morphs() {
        debug!(morph = name, "applying morph");
        (graph, label_to_taskid) = morph(graph, label_to_taskid, params, graph_config)?;
    }
    let extensions = EXTENSIONS.read().expect("morph registry poisoned");
    for (name, morph) in extensions.iter() {
        debug!(morph = %name, "applying morph");
        (graph, label_to_taskid) = morph(graph, label_to_taskid, params, graph_config)?;
    }
    Ok((graph, label_to_taskid))
}
