//! Collapse index routes beyond the platform limit into a helper task that
//! issues the insertions at run time.

use kindling_config::GraphConfig;
use kindling_core::{Result, Task};
use kindling_graph::TaskGraph;
use kindling_params::Parameters;
use kindling_utils::slugid;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

pub fn morph(
    graph: TaskGraph,
    mut label_to_taskid: BTreeMap<String, String>,
    _params: &Parameters,
    graph_config: &GraphConfig,
) -> Result<(TaskGraph, BTreeMap<String, String>)> {
    let limit = graph_config.max_routes();
    let index_patterns: Vec<Regex> = graph_config
        .index_path_regexes()
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect();

    let mut tasks = graph.tasks().clone();
    let mut added: Vec<Task> = Vec::new();
    for task in tasks.values_mut() {
        let Some(routes) = task.task.get("routes").and_then(Value::as_array).cloned() else {
            continue;
        };
        if routes.len() <= limit {
            continue;
        }
        // Index routes spill into the helper; everything else must fit.
        let (index_routes, kept): (Vec<Value>, Vec<Value>) =
            routes.into_iter().partition(|route| {
                route
                    .as_str()
                    .map(|route| {
                        route.starts_with("index.")
                            || index_patterns.iter().any(|pattern| pattern.is_match(route))
                    })
                    .unwrap_or(false)
            });
        if index_routes.is_empty() {
            continue;
        }
        info!(label = %task.label, spilled = index_routes.len(), "spilling index routes to a helper task");
        task.task["routes"] = Value::Array(kept);

        let helper_label = format!("{}-index", task.label);
        let helper_id = slugid();
        let paths: Vec<String> = index_routes
            .iter()
            .filter_map(Value::as_str)
            .map(|route| route.trim_start_matches("index.").to_string())
            .collect();
        let mut helper = Task::new(
            task.kind.clone(),
            helper_label.clone(),
            json!({
                "created": task.task.get("created"),
                "deadline": task.task.get("deadline"),
                "expires": task.task.get("expires"),
                "priority": task.task.get("priority"),
                "provisionerId": task.task.get("provisionerId"),
                "workerType": task.task.get("workerType"),
                "schedulerId": task.task.get("schedulerId"),
                "routes": [],
                "scopes": paths.iter().map(|path| format!("index:insert-task:{path}")).collect::<Vec<_>>(),
                "payload": {
                    "command": ["insert-indexes.js", paths.join(" ")],
                    "env": {
                        "TARGET_TASKID": label_to_taskid.get(&task.label).cloned().unwrap_or_default(),
                        "INDEX_PATHS": paths.join(" "),
                    },
                    "maxRunTime": 600,
                },
                "metadata": task.task.get("metadata"),
                "tags": {},
                "extra": {},
            }),
        );
        helper
            .dependencies
            .insert("parent".to_string(), task.label.clone());
        label_to_taskid.insert(helper_label, helper_id);
        added.push(helper);
    }
    for task in added {
        tasks.insert(task.label.clone(), task);
    }
    Ok((TaskGraph::from_json(serde_json::to_value(tasks)?)?, label_to_taskid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindling_params::test_support::demo_parameters_value;
    use kindling_params::Parameters;

    fn config_with_limit(limit: usize) -> GraphConfig {
        GraphConfig::from_value(
            json!({
                "trust-domain": "demo",
                "task-priority": "low",
                "workers": {"aliases": {}},
                "taskgraph": {
                    "repositories": {"demo": {"name": "demo"}},
                    "max-routes": limit,
                },
            }),
            std::path::Path::new("/taskcluster"),
        )
        .unwrap()
    }

    #[test]
    fn excess_index_routes_move_to_a_helper() {
        let routes: Vec<String> = (0..5)
            .map(|index| format!("index.demo.cache.thing.{index}"))
            .chain(["tc-treeherder.v2.demo.abc".to_string()])
            .collect();
        let task = Task::new("build", "build-a", json!({"routes": routes}));
        let graph = TaskGraph::new(
            [("build-a".to_string(), task)].into_iter().collect(),
        )
        .unwrap();
        let params = Parameters::from_value(demo_parameters_value()).unwrap();
        let ids = BTreeMap::from([("build-a".to_string(), "BUILD-ID".to_string())]);

        let (morphed, ids) = morph(graph, ids, &params, &config_with_limit(3)).unwrap();
        assert_eq!(morphed.len(), 2);
        let original = morphed.get("build-a").unwrap();
        assert_eq!(
            original.task["routes"],
            json!(["tc-treeherder.v2.demo.abc"])
        );
        let helper = morphed.get("build-a-index").unwrap();
        assert_eq!(helper.dependencies["parent"], "build-a");
        assert_eq!(helper.task["payload"]["env"]["TARGET_TASKID"], "BUILD-ID");
        assert!(ids.contains_key("build-a-index"));
    }

    #[test]
    fn graphs_under_the_limit_are_untouched() {
        let task = Task::new("build", "build-a", json!({"routes": ["index.a"]}));
        let graph = TaskGraph::new(
            [("build-a".to_string(), task)].into_iter().collect(),
        )
        .unwrap();
        let params = Parameters::from_value(demo_parameters_value()).unwrap();
        let (morphed, _) =
            morph(graph.clone(), BTreeMap::new(), &params, &config_with_limit(64)).unwrap();
        assert_eq!(morphed, graph);
    }
}
