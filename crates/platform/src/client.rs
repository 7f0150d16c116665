//! The abstract execution-platform client consumed by the core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kindling_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// State of a previously-submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Unscheduled,
    Pending,
    Running,
    Completed,
    Failed,
    Exception,
}

impl TaskState {
    /// States that disqualify a task from being used as a replacement.
    pub fn is_unusable(self) -> bool {
        matches!(self, TaskState::Failed | TaskState::Exception)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    /// When the task's artifacts expire, if known.
    pub expires: Option<DateTime<Utc>>,
}

/// Operations the generation core needs from the execution platform.
///
/// Implementations must accept arbitrary-length inputs on the batched
/// operations and internally respect the platform's page-size limit.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Resolve an index path to the task-id it points at.
    async fn find_task_by_index(&self, index_path: &str) -> Result<Option<String>>;

    /// Fetch the status of many tasks in one batched exchange. Unknown ids
    /// are absent from the result rather than errors.
    async fn get_task_statuses(&self, task_ids: &[String])
        -> Result<BTreeMap<String, TaskStatus>>;

    /// Fetch a named artifact of a task.
    async fn get_artifact(&self, task_id: &str, name: &str) -> Result<Vec<u8>>;

    /// Atomically submit a batch of task definitions rooted at the decision
    /// task. Fails as a whole on any error.
    async fn create_tasks(&self, tasks: &[(String, Value)], root_task_id: &str) -> Result<()>;
}
