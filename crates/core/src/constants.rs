//! Workspace-wide constants.

/// Edge name reserved for the docker-image transform; user tasks may not use it.
pub const DOCKER_IMAGE_EDGE: &str = "docker-image";

/// Default per-task route limit imposed by the execution platform.
pub const MAX_ROUTES: usize = 64;

/// Default per-task dependency limit imposed by the execution platform.
pub const MAX_DEPENDENCIES: usize = 9_999;

/// Artifact name under which a decision task publishes its parameters.
pub const PARAMETERS_ARTIFACT: &str = "public/parameters.yml";

/// Artifact names written for each generation phase.
pub const ARTIFACT_FULL_TASK_GRAPH: &str = "full-task-graph.json";
pub const ARTIFACT_TARGET_TASKS: &str = "target-tasks.json";
pub const ARTIFACT_TASK_GRAPH: &str = "task-graph.json";
pub const ARTIFACT_LABEL_TO_TASKID: &str = "label-to-taskid.json";
pub const ARTIFACT_TO_RUN: &str = "to-run.json";
pub const ARTIFACT_OPTIMIZATION_LOG: &str = "optimization-log.json";

/// Well-known task attribute names.
pub const ATTR_ALWAYS_TARGET: &str = "always_target";
pub const ATTR_PRIMARY_DEPENDENCY: &str = "primary-dependency-label";
