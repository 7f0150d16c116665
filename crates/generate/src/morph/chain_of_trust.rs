//! Inject chain-of-trust feature flags where a worker requires them.

use kindling_config::GraphConfig;
use kindling_core::{Result, Task};
use kindling_graph::TaskGraph;
use kindling_params::Parameters;
use kindling_utils::set_path;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub fn morph(
    graph: TaskGraph,
    label_to_taskid: BTreeMap<String, String>,
    _params: &Parameters,
    _graph_config: &GraphConfig,
) -> Result<(TaskGraph, BTreeMap<String, String>)> {
    let mut tasks: BTreeMap<String, Task> = graph.tasks().clone();
    for task in tasks.values_mut() {
        let wants_cot = task.attribute_is_true("chain-of-trust");
        let docker_worker = task
            .attributes
            .get("worker-implementation")
            .and_then(Value::as_str)
            == Some("docker-worker");
        if wants_cot && docker_worker {
            set_path(&mut task.task, "payload.features.chainOfTrust", json!(true));
        }
    }
    Ok((
        TaskGraph::from_json(serde_json::to_value(tasks)?)?,
        label_to_taskid,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindling_params::test_support::demo_parameters_value;
    use kindling_params::Parameters;
    use std::path::Path;

    #[test]
    fn flag_is_injected_only_for_opted_in_docker_tasks() {
        let config = GraphConfig::from_value(
            json!({
                "trust-domain": "demo",
                "task-priority": "low",
                "workers": {"aliases": {}},
                "taskgraph": {"repositories": {"demo": {"name": "demo"}}},
            }),
            Path::new("/taskcluster"),
        )
        .unwrap();
        let params = Parameters::from_value(demo_parameters_value()).unwrap();

        let mut signed = Task::new("build", "build-signed", json!({"payload": {}}));
        signed
            .attributes
            .insert("chain-of-trust".to_string(), json!(true));
        signed
            .attributes
            .insert("worker-implementation".to_string(), json!("docker-worker"));
        let plain = Task::new("build", "build-plain", json!({"payload": {}}));
        let graph = TaskGraph::new(
            [signed, plain]
                .into_iter()
                .map(|task| (task.label.clone(), task))
                .collect(),
        )
        .unwrap();

        let (morphed, _) = morph(graph, BTreeMap::new(), &params, &config).unwrap();
        assert_eq!(
            morphed.get("build-signed").unwrap().task["payload"]["features"]["chainOfTrust"],
            json!(true)
        );
        assert!(morphed.get("build-plain").unwrap().task["payload"]
            .get("features")
            .is_none());
    }
}
