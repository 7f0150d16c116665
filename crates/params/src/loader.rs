//! Parameter acquisition: local files, previous decision tasks, or
//! VCS-derived defaults.

use crate::parameters::{EnableAlwaysTarget, Parameters};
use chrono::Utc;
use kindling_core::{Error, Result, PARAMETERS_ARTIFACT};
use kindling_platform::{PlatformClient, Vcs};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// The accepted forms of a `--parameters` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParametersSpec {
    /// A local YAML or JSON file, or a directory containing `parameters.yml`.
    File(PathBuf),
    /// `task-id=<id>`: the parameters artifact of that decision task.
    TaskId(String),
    /// `project=<project>`: the latest decision task of the project.
    Project(String),
    /// `index=<path>`: the decision task behind an index path.
    Index(String),
    /// No source; derive defaults from VCS and the environment.
    Defaults,
}

impl ParametersSpec {
    pub fn parse(input: &str) -> Self {
        if let Some(task_id) = input.strip_prefix("task-id=") {
            ParametersSpec::TaskId(task_id.to_string())
        } else if let Some(project) = input.strip_prefix("project=") {
            ParametersSpec::Project(project.to_string())
        } else if let Some(index) = input.strip_prefix("index=") {
            ParametersSpec::Index(index.to_string())
        } else {
            ParametersSpec::File(PathBuf::from(input))
        }
    }
}

fn parse_parameters_text(text: &str, origin: &str) -> Result<Parameters> {
    let raw: Value = serde_yaml::from_str(text)
        .map_err(|err| Error::parameter(format!("failed to parse {origin}: {err}")))?;
    Parameters::from_value(raw)
}

fn load_file(path: &Path) -> Result<Parameters> {
    let path = if path.is_dir() {
        path.join("parameters.yml")
    } else {
        path.to_path_buf()
    };
    let text = std::fs::read_to_string(&path)
        .map_err(|source| Error::file_system(&path, "read", source))?;
    parse_parameters_text(&text, &path.display().to_string())
}

async fn load_from_task(client: &dyn PlatformClient, task_id: &str) -> Result<Parameters> {
    info!(task_id, "fetching parameters from decision task");
    let bytes = client.get_artifact(task_id, PARAMETERS_ARTIFACT).await?;
    let text = String::from_utf8(bytes)
        .map_err(|err| Error::parameter(format!("parameters artifact is not UTF-8: {err}")))?;
    parse_parameters_text(&text, &format!("task {task_id}"))
}

async fn load_from_index(client: &dyn PlatformClient, index_path: &str) -> Result<Parameters> {
    let task_id = client
        .find_task_by_index(index_path)
        .await?
        .ok_or_else(|| Error::parameter(format!("no task indexed at '{index_path}'")))?;
    load_from_task(client, &task_id).await
}

/// Default parameters derived from the local checkout. Fields with no
/// sensible local answer stay empty and strict validation still applies.
pub fn defaults_from_vcs(vcs: &dyn Vcs) -> Result<Parameters> {
    let head_rev = vcs.head_rev()?;
    let repository = vcs.remote_url().unwrap_or_default();
    let head_ref = vcs.branch()?.unwrap_or_else(|| head_rev.clone());
    let base_ref = vcs.default_branch().unwrap_or_default();
    let base_rev = vcs
        .find_latest_common_revision(&base_ref, &head_rev)
        .unwrap_or_default();
    let files_changed = if base_rev.is_empty() {
        Vec::new()
    } else {
        vcs.get_files_changed(&base_rev, &head_rev)?
    };
    let now = Utc::now().timestamp();
    Ok(Parameters {
        base_repository: repository.clone(),
        head_repository: repository,
        head_rev,
        head_ref,
        base_rev,
        base_ref,
        owner: std::env::var("USER")
            .map(|user| format!("{user}@localhost"))
            .unwrap_or_else(|_| "nobody@localhost".to_string()),
        project: "none".to_string(),
        level: 1,
        pushlog_id: "0".to_string(),
        pushdate: now,
        build_date: now,
        repository_type: "git".to_string(),
        tasks_for: "push".to_string(),
        target_tasks_method: "default".to_string(),
        filters: Vec::new(),
        optimize_target_tasks: true,
        optimize_strategies: None,
        do_not_optimize: Vec::new(),
        existing_tasks: BTreeMap::new(),
        enable_always_target: EnableAlwaysTarget::Bool(true),
        files_changed,
        version: None,
        next_version: None,
        build_number: None,
        extra: BTreeMap::new(),
    })
}

/// Resolve one `--parameters` argument to a validated bundle.
pub async fn load_parameters(
    spec: &ParametersSpec,
    client: &dyn PlatformClient,
    vcs: Option<&dyn Vcs>,
    trust_domain: &str,
) -> Result<Parameters> {
    match spec {
        ParametersSpec::File(path) => load_file(path),
        ParametersSpec::TaskId(task_id) => load_from_task(client, task_id).await,
        ParametersSpec::Index(index_path) => load_from_index(client, index_path).await,
        ParametersSpec::Project(project) => {
            let index_path =
                format!("{trust_domain}.v2.{project}.latest.taskgraph.decision");
            load_from_index(client, &index_path).await
        }
        ParametersSpec::Defaults => {
            let vcs = vcs.ok_or_else(|| {
                Error::parameter("no parameters given and no repository to derive them from")
            })?;
            defaults_from_vcs(vcs)
        }
    }
}
