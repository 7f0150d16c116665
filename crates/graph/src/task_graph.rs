//! Pairing of concrete tasks with their dependency graph.

use crate::{Edge, Graph};
use kindling_core::{Error, Result, Task};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A set of tasks and the graph over their labels. Soft dependencies are
/// tracked on the tasks only; the graph carries hard edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    tasks: BTreeMap<String, Task>,
    graph: Graph,
}

impl TaskGraph {
    /// Build from a label-keyed task map, materializing the edge set from
    /// each task's `dependencies`. Fails on dangling references.
    pub fn new(tasks: BTreeMap<String, Task>) -> Result<Self> {
        Self::build(tasks, &BTreeSet::new())
    }

    /// Like [`TaskGraph::new`], but dependency targets listed in `external`
    /// (replacement task-ids of optimized-away work) are legal without
    /// becoming graph nodes.
    pub fn with_external(tasks: BTreeMap<String, Task>, external: &BTreeSet<String>) -> Result<Self> {
        Self::build(tasks, external)
    }

    fn build(tasks: BTreeMap<String, Task>, external: &BTreeSet<String>) -> Result<Self> {
        let nodes: BTreeSet<String> = tasks.keys().cloned().collect();
        let mut edges: BTreeSet<Edge> = BTreeSet::new();
        for task in tasks.values() {
            for (edge_name, dep_label) in &task.dependencies {
                if !nodes.contains(dep_label) {
                    if external.contains(dep_label) {
                        continue;
                    }
                    return Err(Error::dependency(format!(
                        "task '{}' depends on unknown label '{dep_label}' (edge '{edge_name}')",
                        task.label
                    )));
                }
                edges.insert((task.label.clone(), dep_label.clone(), edge_name.clone()));
            }
        }
        let graph = Graph::new(nodes, edges)?;
        Ok(TaskGraph { tasks, graph })
    }

    pub fn tasks(&self) -> &BTreeMap<String, Task> {
        &self.tasks
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn get(&self, label: &str) -> Option<&Task> {
        self.tasks.get(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.tasks.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// The sub-graph induced by `keep`. Tasks keep their full dependency
    /// maps; only the graph edges are restricted.
    pub fn restrict(&self, keep: &BTreeSet<String>) -> TaskGraph {
        let tasks: BTreeMap<String, Task> = self
            .tasks
            .iter()
            .filter(|(label, _)| keep.contains(*label))
            .map(|(label, task)| (label.clone(), task.clone()))
            .collect();
        TaskGraph {
            graph: self.graph.restrict(keep),
            tasks,
        }
    }

    /// Serialize keyed by label, deterministically ordered.
    pub fn to_json(&self) -> serde_json::Value {
        let map: BTreeMap<&String, &Task> = self.tasks.iter().collect();
        serde_json::to_value(map).expect("task graph serialization cannot fail")
    }

    /// Rebuild from the label-keyed form produced by [`TaskGraph::to_json`].
    /// Dependency targets that are not labels in the artifact are taken to
    /// be replacement task-ids (the optimized phase emits those).
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let tasks: BTreeMap<String, Task> = serde_json::from_value(value)?;
        let nodes: BTreeSet<String> = tasks.keys().cloned().collect();
        let external: BTreeSet<String> = tasks
            .values()
            .flat_map(|task| task.dependencies.values())
            .filter(|target| !nodes.contains(*target))
            .cloned()
            .collect();
        Self::build(tasks, &external)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(kind: &str, label: &str, deps: &[(&str, &str)]) -> Task {
        let mut task = Task::new(kind, label, json!({}));
        for (edge, dep) in deps {
            task.dependencies.insert(edge.to_string(), dep.to_string());
        }
        task
    }

    fn simple_graph() -> TaskGraph {
        let mut tasks = BTreeMap::new();
        tasks.insert("hello-a".to_string(), task("hello", "hello-a", &[]));
        tasks.insert(
            "hello-b".to_string(),
            task("hello", "hello-b", &[("edge1", "hello-a")]),
        );
        TaskGraph::new(tasks).unwrap()
    }

    #[test]
    fn edges_are_materialized_from_dependencies() {
        let graph = simple_graph();
        assert_eq!(graph.graph().links_dict()["hello-b"]["edge1"], "hello-a");
    }

    #[test]
    fn dangling_dependency_fails() {
        let mut tasks = BTreeMap::new();
        tasks.insert(
            "hello-b".to_string(),
            task("hello", "hello-b", &[("edge1", "hello-a")]),
        );
        assert!(matches!(
            TaskGraph::new(tasks),
            Err(Error::Dependency { .. })
        ));
    }

    #[test]
    fn json_round_trip_is_structural_identity() {
        let graph = simple_graph();
        let rebuilt = TaskGraph::from_json(graph.to_json()).unwrap();
        assert_eq!(graph, rebuilt);
    }
}
