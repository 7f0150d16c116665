//! The two-phase removal/replacement engine.
//!
//! Decisions are computed on the target+deps graph and applied to a clone,
//! leaving the input graph intact for debugging. Output is deterministic
//! for a given input graph, strategies, and platform responses; tie-breaks
//! fall out of label-sorted iteration.

use crate::log::{OptimizationLog, OptimizationRecord};
use crate::strategy::{PlatformData, StrategyMap};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use kindling_core::{Result, Task};
use kindling_graph::TaskGraph;
use kindling_params::Parameters;
use kindling_platform::PlatformClient;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// The optimizer's product: the surviving graph with replacement task-ids
/// stitched into downstream dependencies, plus the decision log.
#[derive(Debug, Clone)]
pub struct OptimizedGraph {
    pub graph: TaskGraph,
    /// label → replacement task-id for replaced tasks (including the
    /// pre-seeded `existing_tasks`).
    pub replaced: BTreeMap<String, String>,
    pub removed: BTreeSet<String>,
    pub log: OptimizationLog,
}

/// Gather every platform answer the strategies will need, in batches.
async fn prefetch(client: &dyn PlatformClient, graph: &TaskGraph) -> Result<PlatformData> {
    let mut paths: BTreeSet<String> = BTreeSet::new();
    for task in graph.tasks().values() {
        if let Some(optimization) = &task.optimization {
            if let Some(Value::Array(entries)) = optimization.get("index-search") {
                paths.extend(entries.iter().filter_map(Value::as_str).map(str::to_string));
            }
        }
    }
    let paths: Vec<String> = paths.into_iter().collect();
    let found = try_join_all(paths.iter().map(|path| client.find_task_by_index(path))).await?;
    let index_to_task: BTreeMap<String, String> = paths
        .into_iter()
        .zip(found)
        .filter_map(|(path, task_id)| task_id.map(|task_id| (path, task_id)))
        .collect();
    let task_ids: Vec<String> = index_to_task.values().cloned().collect();
    let statuses = if task_ids.is_empty() {
        BTreeMap::new()
    } else {
        client.get_task_statuses(&task_ids).await?
    };
    Ok(PlatformData {
        index_to_task,
        statuses,
    })
}

fn task_deadline(task: &Task) -> Option<DateTime<Utc>> {
    task.task
        .get("deadline")
        .and_then(Value::as_str)
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

struct Pass<'a> {
    graph: &'a TaskGraph,
    params: &'a Parameters,
    target: &'a BTreeSet<String>,
    strategies: &'a StrategyMap,
    data: PlatformData,
    log: OptimizationLog,
}

impl<'a> Pass<'a> {
    /// The (strategy, arg) pair for a task, if its named strategy exists.
    fn strategy_of(&mut self, task: &Task) -> Option<(String, Value)> {
        let optimization = task.optimization.as_ref()?;
        let (name, arg) = optimization.iter().next()?;
        if !self.strategies.contains_key(name) {
            self.log.record(OptimizationRecord::StrategyError {
                label: task.label.clone(),
                strategy: name.clone(),
                message: "unknown strategy".to_string(),
            });
            return None;
        }
        Some((name.clone(), arg.clone()))
    }

    /// Does `dependent` hard-require `label`: an edge to it whose name is
    /// not declared in the dependent's `if_dependencies`.
    fn requires(&self, dependent: &str, label: &str) -> bool {
        let task = &self.graph.tasks()[dependent];
        task.dependencies
            .iter()
            .any(|(edge, target)| target == label && !task.if_dependencies.contains(edge))
    }

    fn is_pinned(&self, task: &Task) -> bool {
        if self.params.do_not_optimize.contains(&task.label) {
            return true;
        }
        // Target tasks are exempt when target optimization is off, except
        // always-target tasks, which ride along but stay optimizable.
        !self.params.optimize_target_tasks
            && self.target.contains(&task.label)
            && !task.attribute_is_true("always_target")
    }

    /// Removal pass: dependents first, so a task can only go once nothing
    /// surviving requires it.
    fn removal_pass(&mut self, replaced: &BTreeMap<String, String>) -> Result<BTreeSet<String>> {
        let mut removed = BTreeSet::new();
        for label in self.graph.graph().visit_preorder()? {
            let task = &self.graph.tasks()[&label];
            if replaced.contains_key(&label) || self.is_pinned(task) {
                continue;
            }
            let Some((strategy_name, arg)) = self.strategy_of(task) else {
                continue;
            };
            let strategy = &self.strategies[&strategy_name];
            let verdict = match strategy.should_remove_task(task, self.params, &arg) {
                Ok(verdict) => verdict,
                Err(err) => {
                    self.log.record(OptimizationRecord::StrategyError {
                        label: label.clone(),
                        strategy: strategy_name,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            if !verdict {
                continue;
            }
            let needed = self
                .graph
                .graph()
                .dependents_of(&label)
                .into_iter()
                .any(|dependent| {
                    !removed.contains(dependent)
                        && !replaced.contains_key(dependent)
                        && self.requires(dependent, &label)
                });
            if needed {
                self.log
                    .record(OptimizationRecord::KeptForDependents { label });
                continue;
            }
            self.log.record(OptimizationRecord::Removed {
                label: label.clone(),
                strategy: strategy_name,
            });
            removed.insert(label);
        }
        Ok(removed)
    }

    /// Replacement pass: leaves first, so a dependency can be substituted
    /// before its dependents are considered.
    fn replacement_pass(
        &mut self,
        removed: &BTreeSet<String>,
        replaced: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        for label in self.graph.graph().visit_postorder()? {
            if removed.contains(&label) || replaced.contains_key(&label) {
                continue;
            }
            let task = &self.graph.tasks()[&label];
            if self.is_pinned(task) {
                continue;
            }
            let Some((strategy_name, arg)) = self.strategy_of(task) else {
                continue;
            };
            // The replacement must outlive every surviving dependent.
            let deadline = self
                .graph
                .graph()
                .dependents_of(&label)
                .into_iter()
                .filter(|dependent| !removed.contains(*dependent))
                .filter_map(|dependent| task_deadline(&self.graph.tasks()[dependent]))
                .max();
            let strategy = &self.strategies[&strategy_name];
            match strategy.should_replace_task(task, self.params, deadline, &arg, &self.data) {
                Ok(Some(task_id)) => {
                    self.log.record(OptimizationRecord::Replaced {
                        label: label.clone(),
                        strategy: strategy_name,
                        task_id: task_id.clone(),
                    });
                    replaced.insert(label, task_id);
                }
                Ok(None) => {}
                Err(err) => {
                    self.log.record(OptimizationRecord::StrategyError {
                        label: label.clone(),
                        strategy: strategy_name,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// A task conditioned on `if_dependencies` survives only while at least
    /// one of its primary dependencies will actually run. Removals cascade,
    /// so iterate to a fixpoint.
    fn if_dependencies_fixpoint(
        &mut self,
        removed: &mut BTreeSet<String>,
        replaced: &BTreeMap<String, String>,
    ) {
        loop {
            let mut changed = false;
            for (label, task) in self.graph.tasks() {
                if task.if_dependencies.is_empty()
                    || removed.contains(label)
                    || replaced.contains_key(label)
                {
                    continue;
                }
                let any_alive = task.if_dependency_labels().into_iter().any(|primary| {
                    !removed.contains(primary) && !replaced.contains_key(primary)
                });
                let required = self
                    .graph
                    .graph()
                    .dependents_of(label)
                    .into_iter()
                    .any(|dependent| {
                        !removed.contains(dependent)
                            && !replaced.contains_key(dependent)
                            && self.requires(dependent, label)
                    });
                if !any_alive && !required {
                    self.log.record(OptimizationRecord::RemovedByIfDependencies {
                        label: label.clone(),
                    });
                    removed.insert(label.clone());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}

/// Optimize `graph` (the target+deps graph) against `target` (the target
/// task set). Platform queries are batched up front through `client`.
pub async fn optimize_task_graph(
    graph: &TaskGraph,
    target: &BTreeSet<String>,
    params: &Parameters,
    strategies: &StrategyMap,
    client: &dyn PlatformClient,
) -> Result<OptimizedGraph> {
    let data = prefetch(client, graph).await?;
    let mut pass = Pass {
        graph,
        params,
        target,
        strategies,
        data,
        log: OptimizationLog::default(),
    };

    // Seeded replacements from a previous (e.g. re-triggered) generation.
    let mut replaced: BTreeMap<String, String> = params
        .existing_tasks
        .iter()
        .filter(|(label, _)| graph.contains(label))
        .map(|(label, task_id)| (label.clone(), task_id.clone()))
        .collect();

    let mut removed = pass.removal_pass(&replaced)?;
    pass.replacement_pass(&removed, &mut replaced)?;
    pass.if_dependencies_fixpoint(&mut removed, &replaced);

    let mut log = pass.log;
    let surviving: BTreeSet<String> = graph
        .labels()
        .filter(|label| !removed.contains(*label) && !replaced.contains_key(*label))
        .map(str::to_string)
        .collect();

    // Stitch replacements into the survivors on a cloned task set. The
    // replacement ids are external to the graph; removed-and-not-replaced
    // targets must already have no surviving dependents.
    let mut tasks: BTreeMap<String, Task> = BTreeMap::new();
    let mut external: BTreeSet<String> = BTreeSet::new();
    for label in &surviving {
        let mut task = graph.tasks()[label].clone();
        for target_label in task.dependencies.values_mut() {
            if let Some(replacement) = replaced.get(target_label) {
                *target_label = replacement.clone();
                external.insert(replacement.clone());
            }
        }
        for soft in &task.soft_dependencies {
            if !surviving.contains(soft) {
                log.record(OptimizationRecord::SoftDependencyDropped {
                    label: label.clone(),
                    target: soft.clone(),
                });
            }
        }
        task.soft_dependencies.retain(|soft| surviving.contains(soft));
        tasks.insert(label.clone(), task);
    }

    info!(
        kept = surviving.len(),
        removed = removed.len(),
        replaced = replaced.len(),
        "optimization complete"
    );
    debug!(records = log.records.len(), "optimization log entries");

    Ok(OptimizedGraph {
        graph: TaskGraph::with_external(tasks, &external)?,
        replaced,
        removed,
        log,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::default_strategies;
    use async_trait::async_trait;
    use kindling_params::test_support::demo_parameters_value;
    use kindling_platform::{TaskState, TaskStatus};
    use serde_json::json;

    struct StubClient {
        index: BTreeMap<String, String>,
        statuses: BTreeMap<String, TaskStatus>,
    }

    impl StubClient {
        fn empty() -> Self {
            StubClient {
                index: BTreeMap::new(),
                statuses: BTreeMap::new(),
            }
        }

        fn with_indexed(path: &str, task_id: &str, state: TaskState) -> Self {
            let mut client = StubClient::empty();
            client.index.insert(path.to_string(), task_id.to_string());
            client.statuses.insert(
                task_id.to_string(),
                TaskStatus {
                    state,
                    expires: Some(Utc::now() + chrono::Duration::days(365)),
                },
            );
            client
        }
    }

    #[async_trait]
    impl PlatformClient for StubClient {
        async fn find_task_by_index(&self, index_path: &str) -> Result<Option<String>> {
            Ok(self.index.get(index_path).cloned())
        }

        async fn get_task_statuses(
            &self,
            task_ids: &[String],
        ) -> Result<BTreeMap<String, TaskStatus>> {
            Ok(task_ids
                .iter()
                .filter_map(|id| self.statuses.get(id).map(|s| (id.clone(), s.clone())))
                .collect())
        }

        async fn get_artifact(&self, _task_id: &str, _name: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn create_tasks(&self, _tasks: &[(String, Value)], _root: &str) -> Result<()> {
            Ok(())
        }
    }

    fn task(kind: &str, label: &str, deps: &[(&str, &str)]) -> Task {
        let mut task = Task::new(kind, label, json!({"deadline": "2027-01-01T00:00:00Z"}));
        for (edge, dep) in deps {
            task.dependencies.insert(edge.to_string(), dep.to_string());
        }
        task
    }

    fn graph_of(tasks: Vec<Task>) -> TaskGraph {
        TaskGraph::new(
            tasks
                .into_iter()
                .map(|task| (task.label.clone(), task))
                .collect(),
        )
        .unwrap()
    }

    fn params() -> Parameters {
        Parameters::from_value(demo_parameters_value()).unwrap()
    }

    fn all_labels(graph: &TaskGraph) -> BTreeSet<String> {
        graph.labels().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn replacement_rewrites_downstream_dependencies() {
        let mut cached = task("hello", "hello-a", &[]);
        cached.optimization = Some(
            [("index-search".to_string(), json!(["foo.bar.baz"]))]
                .into_iter()
                .collect(),
        );
        let dependent = task("hello", "hello-b", &[("edge1", "hello-a")]);
        let graph = graph_of(vec![cached, dependent]);
        let client = StubClient::with_indexed("foo.bar.baz", "TASKID-A", TaskState::Completed);

        let optimized = optimize_task_graph(
            &graph,
            &all_labels(&graph),
            &params(),
            &default_strategies(),
            &client,
        )
        .await
        .unwrap();

        assert_eq!(optimized.graph.len(), 1);
        let hello_b = optimized.graph.get("hello-b").unwrap();
        assert_eq!(hello_b.dependencies["edge1"], "TASKID-A");
        assert_eq!(optimized.replaced["hello-a"], "TASKID-A");
    }

    #[tokio::test]
    async fn failed_indexed_task_is_not_a_replacement() {
        let mut cached = task("hello", "hello-a", &[]);
        cached.optimization = Some(
            [("index-search".to_string(), json!(["foo.bar.baz"]))]
                .into_iter()
                .collect(),
        );
        let graph = graph_of(vec![cached]);
        let client = StubClient::with_indexed("foo.bar.baz", "TASKID-A", TaskState::Failed);

        let optimized = optimize_task_graph(
            &graph,
            &all_labels(&graph),
            &params(),
            &default_strategies(),
            &client,
        )
        .await
        .unwrap();
        assert!(optimized.graph.contains("hello-a"));
        assert!(optimized.replaced.is_empty());
    }

    #[tokio::test]
    async fn skip_unless_changed_removes_untouched_tasks() {
        let mut raw = demo_parameters_value();
        raw["files_changed"] = json!(["docs/index.md"]);
        let params = Parameters::from_value(raw).unwrap();

        let mut src_task = task("build", "build-src", &[]);
        src_task.optimization = Some(
            [("skip-unless-changed".to_string(), json!(["src/**"]))]
                .into_iter()
                .collect(),
        );
        let mut docs_task = task("build", "build-docs", &[]);
        docs_task.optimization = Some(
            [("skip-unless-changed".to_string(), json!(["docs/**"]))]
                .into_iter()
                .collect(),
        );
        let graph = graph_of(vec![src_task, docs_task]);

        let optimized = optimize_task_graph(
            &graph,
            &all_labels(&graph),
            &params,
            &default_strategies(),
            &StubClient::empty(),
        )
        .await
        .unwrap();
        assert!(!optimized.graph.contains("build-src"));
        assert!(optimized.graph.contains("build-docs"));
    }

    #[tokio::test]
    async fn removal_is_vetoed_while_dependents_survive() {
        let mut dependency = task("build", "build-a", &[]);
        dependency.optimization = Some(
            [("always".to_string(), Value::Null)].into_iter().collect(),
        );
        let dependent = task("test", "test-a", &[("build", "build-a")]);
        let graph = graph_of(vec![dependency, dependent]);

        let optimized = optimize_task_graph(
            &graph,
            &all_labels(&graph),
            &params(),
            &default_strategies(),
            &StubClient::empty(),
        )
        .await
        .unwrap();
        // test-a survives, so build-a must too.
        assert!(optimized.graph.contains("build-a"));
        assert!(optimized
            .log
            .records
            .iter()
            .any(|record| matches!(record, OptimizationRecord::KeptForDependents { label } if label == "build-a")));
    }

    #[tokio::test]
    async fn if_dependency_chain_collapses_to_a_fixpoint() {
        let mut c = task("build", "kind-c", &[]);
        c.optimization = Some([("always".to_string(), Value::Null)].into_iter().collect());
        let mut b = task("test", "kind-b", &[("dep", "kind-c")]);
        b.if_dependencies = vec!["dep".to_string()];
        let mut a = task("report", "kind-a", &[("dep", "kind-b")]);
        a.if_dependencies = vec!["dep".to_string()];
        let graph = graph_of(vec![a, b, c]);

        let optimized = optimize_task_graph(
            &graph,
            &BTreeSet::new(),
            &params(),
            &default_strategies(),
            &StubClient::empty(),
        )
        .await
        .unwrap();
        assert!(optimized.graph.is_empty());
    }

    #[tokio::test]
    async fn do_not_optimize_pins_a_task() {
        let mut pinned = task("build", "build-a", &[]);
        pinned.optimization = Some([("always".to_string(), Value::Null)].into_iter().collect());
        let graph = graph_of(vec![pinned]);
        let mut raw = demo_parameters_value();
        raw["do_not_optimize"] = json!(["build-a"]);
        let params = Parameters::from_value(raw).unwrap();

        let optimized = optimize_task_graph(
            &graph,
            &BTreeSet::new(),
            &params,
            &default_strategies(),
            &StubClient::empty(),
        )
        .await
        .unwrap();
        assert!(optimized.graph.contains("build-a"));
    }

    #[tokio::test]
    async fn existing_tasks_seed_replacements() {
        let seeded = task("build", "build-a", &[]);
        let dependent = task("test", "test-a", &[("build", "build-a")]);
        let graph = graph_of(vec![seeded, dependent]);
        let mut raw = demo_parameters_value();
        raw["existing_tasks"] = json!({"build-a": "SEEDED-ID"});
        let params = Parameters::from_value(raw).unwrap();

        let optimized = optimize_task_graph(
            &graph,
            &all_labels(&graph),
            &params,
            &default_strategies(),
            &StubClient::empty(),
        )
        .await
        .unwrap();
        assert!(!optimized.graph.contains("build-a"));
        assert_eq!(
            optimized.graph.get("test-a").unwrap().dependencies["build"],
            "SEEDED-ID"
        );
    }

    #[tokio::test]
    async fn optimization_is_deterministic() {
        let mut first_input = Vec::new();
        for index in 0..6 {
            let mut candidate = task("build", &format!("build-{index}"), &[]);
            candidate.optimization =
                Some([("always".to_string(), Value::Null)].into_iter().collect());
            first_input.push(candidate);
        }
        let graph = graph_of(first_input);
        let strategies = default_strategies();
        let first = optimize_task_graph(
            &graph,
            &BTreeSet::new(),
            &params(),
            &strategies,
            &StubClient::empty(),
        )
        .await
        .unwrap();
        let second = optimize_task_graph(
            &graph,
            &BTreeSet::new(),
            &params(),
            &strategies,
            &StubClient::empty(),
        )
        .await
        .unwrap();
        assert_eq!(first.graph, second.graph);
        assert_eq!(first.log, second.log);
    }
}
