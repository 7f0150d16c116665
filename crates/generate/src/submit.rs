//! Task-id assignment and the single-batch submission.

use kindling_core::{Result, Task};
use kindling_graph::TaskGraph;
use kindling_platform::PlatformClient;
use kindling_utils::slugid;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

/// Assign a fresh task-id to every label in the graph, dependencies first.
pub fn assign_task_ids(graph: &TaskGraph) -> Result<BTreeMap<String, String>> {
    let mut label_to_taskid = BTreeMap::new();
    for label in graph.graph().visit_postorder()? {
        label_to_taskid.insert(label, slugid());
    }
    Ok(label_to_taskid)
}

/// Materialize the wire-format definition for one task: `taskGroupId`,
/// `dependencies` (ids), and `requires` land in the payload the platform
/// accepts.
fn materialize(
    task: &Task,
    label_to_taskid: &BTreeMap<String, String>,
    decision_task_id: &str,
) -> Value {
    let mut definition = task.task.clone();
    if let Some(map) = definition.as_object_mut() {
        map.insert("taskGroupId".to_string(), json!(decision_task_id));
        map.entry("requires".to_string())
            .or_insert_with(|| json!("all-completed"));
        let mut ids: Vec<String> = task
            .dependencies
            .values()
            .map(|target| {
                // Targets are labels for in-graph dependencies and already
                // task-ids for optimizer replacements.
                label_to_taskid
                    .get(target)
                    .cloned()
                    .unwrap_or_else(|| target.clone())
            })
            .collect();
        ids.sort();
        ids.dedup();
        map.insert("dependencies".to_string(), json!(ids));
    }
    definition
}

/// Submit the morphed graph in one atomic batch rooted at the decision task.
pub async fn submit_task_graph(
    graph: &TaskGraph,
    label_to_taskid: &BTreeMap<String, String>,
    decision_task_id: &str,
    client: &dyn PlatformClient,
) -> Result<()> {
    let mut batch: Vec<(String, Value)> = Vec::new();
    for label in graph.graph().visit_postorder()? {
        let task = &graph.tasks()[&label];
        let task_id = label_to_taskid
            .get(&label)
            .cloned()
            .unwrap_or_else(slugid);
        batch.push((task_id, materialize(task, label_to_taskid, decision_task_id)));
    }
    info!(count = batch.len(), decision_task_id, "submitting task graph");
    client.create_tasks(&batch, decision_task_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn materialize_sets_group_and_dependency_ids() {
        let mut task = Task::new("hello", "hello-b", json!({"routes": []}));
        task.dependencies
            .insert("edge1".to_string(), "hello-a".to_string());
        task.dependencies
            .insert("cached".to_string(), "TASKID-A".to_string());
        let ids = BTreeMap::from([("hello-a".to_string(), "ID-A".to_string())]);

        let definition = materialize(&task, &ids, "DECISION");
        assert_eq!(definition["taskGroupId"], "DECISION");
        assert_eq!(definition["requires"], "all-completed");
        let deps = definition["dependencies"].as_array().unwrap();
        assert!(deps.contains(&json!("ID-A")));
        assert!(deps.contains(&json!("TASKID-A")));
    }

    #[test]
    fn assigned_ids_are_unique_slugs() {
        let tasks: BTreeMap<String, Task> = ["a", "b", "c"]
            .into_iter()
            .map(|name| (name.to_string(), Task::new("k", name, json!({}))))
            .collect();
        let graph = TaskGraph::new(tasks).unwrap();
        let ids = assign_task_ids(&graph).unwrap();
        assert_eq!(ids.len(), 3);
        let unique: std::collections::BTreeSet<&String> = ids.values().collect();
        assert_eq!(unique.len(), 3);
    }
}
