//! Verification hooks run after each phase.

use kindling_config::GraphConfig;
use kindling_core::{Error, Result, DOCKER_IMAGE_EDGE};
use kindling_graph::TaskGraph;
use serde_json::Value;
use std::collections::BTreeSet;

/// Full-graph invariants: resolvable soft/if references, the reserved edge
/// name, per-task limits, and acyclicity.
pub fn verify_full_task_graph(graph: &TaskGraph, config: &GraphConfig) -> Result<()> {
    let max_dependencies = config.max_dependencies();
    let max_routes = config.max_routes();
    for task in graph.tasks().values() {
        for soft in &task.soft_dependencies {
            if !graph.contains(soft) {
                return Err(Error::dependency(format!(
                    "task '{}' soft-depends on unknown label '{soft}'",
                    task.label
                )));
            }
        }
        for edge in &task.if_dependencies {
            if !task.dependencies.contains_key(edge) {
                return Err(Error::dependency(format!(
                    "task '{}' names '{edge}' in if-dependencies but has no such edge",
                    task.label
                )));
            }
        }
        if task.dependencies.contains_key(DOCKER_IMAGE_EDGE) {
            return Err(Error::dependency(format!(
                "task '{}' uses the reserved '{DOCKER_IMAGE_EDGE}' edge",
                task.label
            )));
        }
        if task.dependencies.len() > max_dependencies {
            return Err(Error::dependency(format!(
                "task '{}' has {} dependencies (limit {max_dependencies})",
                task.label,
                task.dependencies.len()
            )));
        }
        let route_count = task
            .task
            .get("routes")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        if route_count > max_routes {
            return Err(Error::dependency(format!(
                "task '{}' has {route_count} routes (limit {max_routes})",
                task.label
            )));
        }
    }
    graph.graph().visit_postorder()?;
    Ok(())
}

/// Optimizer soundness: no surviving task may depend on a label that was
/// removed without a replacement.
pub fn verify_optimized_task_graph(optimized: &TaskGraph, full: &TaskGraph) -> Result<()> {
    let surviving: BTreeSet<&str> = optimized.labels().collect();
    for task in optimized.tasks().values() {
        for (edge, target) in &task.dependencies {
            let was_label = full.contains(target);
            if was_label && !surviving.contains(target.as_str()) {
                return Err(Error::dependency(format!(
                    "task '{}' still depends on removed task '{target}' (edge '{edge}')",
                    task.label
                )));
            }
        }
    }
    Ok(())
}
