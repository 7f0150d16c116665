//! The orchestrator of the six generation phases. Each phase accessor
//! forces evaluation of everything before it and memoizes the result.

use crate::artifacts::ArtifactWriter;
use crate::morph::morph_task_graph;
use crate::submit::assign_task_ids;
use crate::target::select_target_tasks;
use crate::verify::{verify_full_task_graph, verify_optimized_task_graph};
use kindling_config::{kind::load_kinds, GraphConfig, Kind};
use kindling_core::{
    Error, Result, Task, ARTIFACT_FULL_TASK_GRAPH, ARTIFACT_LABEL_TO_TASKID,
    ARTIFACT_OPTIMIZATION_LOG, ARTIFACT_TARGET_TASKS, ARTIFACT_TASK_GRAPH,
};
use kindling_graph::TaskGraph;
use kindling_optimize::{default_strategies, optimize_task_graph, OptimizationLog};
use kindling_params::Parameters;
use kindling_platform::PlatformClient;
use kindling_transform::{
    loaders::implicit_transforms, register_builtins, registry::lookup_loader, stub_to_task,
    TransformContext, TransformSequence,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct GeneratorBuilder {
    root_dir: PathBuf,
    parameters: Arc<Parameters>,
    client: Arc<dyn PlatformClient>,
    target_kinds: Option<Vec<String>>,
    artifacts_dir: Option<PathBuf>,
    decision_task_id: Option<String>,
    verify: bool,
}

impl GeneratorBuilder {
    pub fn new(
        root_dir: impl Into<PathBuf>,
        parameters: Parameters,
        client: Arc<dyn PlatformClient>,
    ) -> Self {
        GeneratorBuilder {
            root_dir: root_dir.into(),
            parameters: Arc::new(parameters),
            client,
            target_kinds: None,
            artifacts_dir: None,
            decision_task_id: None,
            verify: true,
        }
    }

    pub fn with_target_kinds(mut self, kinds: Vec<String>) -> Self {
        self.target_kinds = Some(kinds);
        self
    }

    pub fn with_artifacts_dir(mut self, directory: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(directory.into());
        self
    }

    pub fn with_decision_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.decision_task_id = Some(task_id.into());
        self
    }

    pub fn without_verification(mut self) -> Self {
        self.verify = false;
        self
    }

    pub fn build(self) -> Result<Generator> {
        register_builtins();
        let graph_config = Arc::new(GraphConfig::load(&self.root_dir)?);
        crate::registration::run_registered_hooks(&graph_config)?;
        Ok(Generator {
            graph_config,
            parameters: self.parameters,
            client: self.client,
            target_kinds: self.target_kinds,
            artifacts_dir: self.artifacts_dir,
            decision_task_id: self.decision_task_id,
            verify: self.verify,
            full: None,
            target_set: None,
            target_graph: None,
            optimized: None,
            morphed: None,
        })
    }
}

pub struct Generator {
    graph_config: Arc<GraphConfig>,
    parameters: Arc<Parameters>,
    client: Arc<dyn PlatformClient>,
    target_kinds: Option<Vec<String>>,
    artifacts_dir: Option<PathBuf>,
    decision_task_id: Option<String>,
    verify: bool,

    full: Option<TaskGraph>,
    target_set: Option<BTreeSet<String>>,
    target_graph: Option<TaskGraph>,
    optimized: Option<(TaskGraph, BTreeMap<String, String>, OptimizationLog)>,
    morphed: Option<(TaskGraph, BTreeMap<String, String>)>,
}

impl Generator {
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn graph_config(&self) -> &GraphConfig {
        &self.graph_config
    }

    /// The decision task's own id: taken from the environment of a real
    /// decision task, generated otherwise.
    pub fn decision_task_id(&mut self) -> String {
        self.decision_task_id
            .get_or_insert_with(|| {
                std::env::var("TASK_ID").unwrap_or_else(|_| kindling_utils::slugid())
            })
            .clone()
    }

    fn writer(&self) -> Result<Option<ArtifactWriter>> {
        self.artifacts_dir
            .as_deref()
            .map(ArtifactWriter::new)
            .transpose()
    }

    fn run_kind(&self, kind: &Kind, loaded: &BTreeMap<String, Task>) -> Result<Vec<Task>> {
        let kind_dependencies: BTreeSet<String> =
            kind.kind_dependencies().into_iter().collect();
        let ctx = TransformContext {
            kind: kind.name().to_string(),
            config: kind.config().clone(),
            parameters: Arc::clone(&self.parameters),
            graph_config: Arc::clone(&self.graph_config),
            kind_dependencies_tasks: loaded
                .values()
                .filter(|task| kind_dependencies.contains(&task.kind))
                .map(|task| (task.label.clone(), task.clone()))
                .collect(),
            path: kind.path().to_path_buf(),
            write_artifacts: self.artifacts_dir.is_some(),
        };

        let loader = lookup_loader(kind.loader())
            .ok_or_else(|| Error::loader(kind.name(), format!("unknown loader '{}'", kind.loader())))?;
        let stubs = loader(&ctx)?;

        let mut sequence = TransformSequence::new();
        for reference in implicit_transforms(kind.loader(), &kind.transforms()) {
            sequence.add(&reference)?;
        }
        let stubs = sequence.run(&ctx, stubs)?;

        stubs
            .iter()
            .map(|stub| stub_to_task(kind.name(), stub))
            .collect()
    }

    /// Phase 1: every kind's tasks plus the full dependency graph.
    pub fn full_task_graph(&mut self) -> Result<&TaskGraph> {
        if self.full.is_none() {
            let kinds = load_kinds(self.graph_config.root_dir(), self.target_kinds.as_deref())?;
            info!(count = kinds.len(), "loaded kinds");
            let mut tasks: BTreeMap<String, Task> = BTreeMap::new();
            for kind in &kinds {
                for task in self.run_kind(kind, &tasks)? {
                    if tasks.contains_key(&task.label) {
                        return Err(Error::dependency(format!(
                            "duplicate label '{}' in the full task graph",
                            task.label
                        )));
                    }
                    tasks.insert(task.label.clone(), task);
                }
            }
            let graph = TaskGraph::new(tasks)?;
            if self.verify {
                verify_full_task_graph(&graph, &self.graph_config)?;
            } else {
                graph.graph().visit_postorder()?;
            }
            info!(tasks = graph.len(), "full task graph assembled");
            if let Some(writer) = self.writer()? {
                writer.write(ARTIFACT_FULL_TASK_GRAPH, &graph.to_json())?;
            }
            self.full = Some(graph);
        }
        Ok(self.full.as_ref().expect("memoized above"))
    }

    /// Phase 2: the target task set.
    pub fn target_task_set(&mut self) -> Result<&BTreeSet<String>> {
        if self.target_set.is_none() {
            self.full_task_graph()?;
            let full = self.full.as_ref().expect("phase 1 memoized");
            let selected = select_target_tasks(full, &self.parameters)?;
            if let Some(writer) = self.writer()? {
                writer.write(ARTIFACT_TARGET_TASKS, &selected)?;
            }
            self.target_set = Some(selected);
        }
        Ok(self.target_set.as_ref().expect("memoized above"))
    }

    /// Phase 3: the target set closed under hard dependencies.
    pub fn target_task_graph(&mut self) -> Result<&TaskGraph> {
        if self.target_graph.is_none() {
            self.target_task_set()?;
            let full = self.full.as_ref().expect("phase 1 memoized");
            let target = self.target_set.as_ref().expect("phase 2 memoized");
            let closed = full.graph().transitive_closure(target, false);
            let graph = full.restrict(&closed);
            info!(tasks = graph.len(), "target task graph closed over dependencies");
            self.target_graph = Some(graph);
        }
        Ok(self.target_graph.as_ref().expect("memoized above"))
    }

    /// Phase 4: removal/replacement optimization.
    pub async fn optimized_task_graph(&mut self) -> Result<&TaskGraph> {
        if self.optimized.is_none() {
            self.target_task_graph()?;
            let full = self.full.clone().expect("phase 1 memoized");
            let target_graph = self.target_graph.as_ref().expect("phase 3 memoized");
            let target = self.target_set.as_ref().expect("phase 2 memoized");
            let optimized = optimize_task_graph(
                target_graph,
                target,
                &self.parameters,
                &default_strategies(),
                self.client.as_ref(),
            )
            .await?;
            if self.verify {
                verify_optimized_task_graph(&optimized.graph, &full)?;
            }
            let mut label_to_taskid = assign_task_ids(&optimized.graph)?;
            label_to_taskid.extend(optimized.replaced.clone());
            if let Some(writer) = self.writer()? {
                writer.write(ARTIFACT_TASK_GRAPH, &optimized.graph.to_json())?;
                writer.write(ARTIFACT_LABEL_TO_TASKID, &label_to_taskid)?;
                writer.write(ARTIFACT_OPTIMIZATION_LOG, &optimized.log)?;
            }
            self.optimized = Some((optimized.graph, label_to_taskid, optimized.log));
        }
        Ok(&self.optimized.as_ref().expect("memoized above").0)
    }

    /// The label → task-id assignment of the optimized graph (replaced
    /// labels map to their replacement ids).
    pub async fn label_to_taskid(&mut self) -> Result<&BTreeMap<String, String>> {
        self.optimized_task_graph().await?;
        Ok(&self.optimized.as_ref().expect("phase 4 memoized").1)
    }

    pub async fn optimization_log(&mut self) -> Result<&OptimizationLog> {
        self.optimized_task_graph().await?;
        Ok(&self.optimized.as_ref().expect("phase 4 memoized").2)
    }

    /// Phase 5: morphs over the wire-format definitions.
    pub async fn morphed_task_graph(&mut self) -> Result<&TaskGraph> {
        if self.morphed.is_none() {
            self.optimized_task_graph().await?;
            let (graph, label_to_taskid, _) =
                self.optimized.clone().expect("phase 4 memoized");
            let decision_task_id = self.decision_task_id();
            // taskGroupId binds every task to the decision task.
            let mut graph = graph;
            let mut tasks = graph.tasks().clone();
            for task in tasks.values_mut() {
                if let Some(map) = task.task.as_object_mut() {
                    map.insert("taskGroupId".to_string(), decision_task_id.clone().into());
                }
            }
            graph = TaskGraph::from_json(serde_json::to_value(tasks)?)?;
            let (morphed, label_to_taskid) = morph_task_graph(
                graph,
                label_to_taskid,
                &self.parameters,
                &self.graph_config,
            )?;
            if let Some(writer) = self.writer()? {
                let to_run: BTreeSet<&String> = morphed.tasks().keys().collect();
                writer.write(kindling_core::ARTIFACT_TO_RUN, &to_run)?;
            }
            self.morphed = Some((morphed, label_to_taskid));
        }
        Ok(&self.morphed.as_ref().expect("memoized above").0)
    }

    /// The final label → task-id map, including morph-added tasks.
    pub async fn morphed_label_to_taskid(&mut self) -> Result<&BTreeMap<String, String>> {
        self.morphed_task_graph().await?;
        Ok(&self.morphed.as_ref().expect("phase 5 memoized").1)
    }
}
