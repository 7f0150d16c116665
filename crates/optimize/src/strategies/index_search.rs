//! Replace a task with a previously-computed one found through the index.

use crate::strategy::{OptimizationStrategy, PlatformData};
use chrono::{DateTime, Utc};
use kindling_core::{Error, Result, Task};
use kindling_params::Parameters;
use serde_json::Value;
use tracing::debug;

/// `arg` is an ordered list of index paths; the first whose task exists, is
/// usable, and outlives the dependents' deadline wins.
pub struct IndexSearch;

impl OptimizationStrategy for IndexSearch {
    fn should_replace_task(
        &self,
        task: &Task,
        _params: &Parameters,
        deadline: Option<DateTime<Utc>>,
        arg: &Value,
        data: &PlatformData,
    ) -> Result<Option<String>> {
        let paths = arg.as_array().ok_or_else(|| {
            Error::optimizer(&task.label, "index-search", "argument must be a list of index paths")
        })?;
        for path in paths.iter().filter_map(Value::as_str) {
            let Some(task_id) = data.index_to_task.get(path) else {
                continue;
            };
            let Some(status) = data.statuses.get(task_id) else {
                continue;
            };
            if status.state.is_unusable() {
                debug!(label = %task.label, path, state = ?status.state, "indexed task unusable");
                continue;
            }
            if let (Some(deadline), Some(expires)) = (deadline, status.expires) {
                if expires <= deadline {
                    debug!(label = %task.label, path, "indexed task expires before dependent deadline");
                    continue;
                }
            }
            return Ok(Some(task_id.clone()));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kindling_params::test_support::demo_parameters_value;
    use kindling_platform::{TaskState, TaskStatus};
    use serde_json::json;

    fn data(state: TaskState, expires_in: i64) -> PlatformData {
        let mut data = PlatformData::default();
        data.index_to_task
            .insert("foo.bar.baz".to_string(), "TASKID-A".to_string());
        data.statuses.insert(
            "TASKID-A".to_string(),
            TaskStatus {
                state,
                expires: Some(Utc::now() + Duration::days(expires_in)),
            },
        );
        data
    }

    fn replace(data: &PlatformData, deadline: Option<DateTime<Utc>>) -> Option<String> {
        let params = Parameters::from_value(demo_parameters_value()).unwrap();
        IndexSearch
            .should_replace_task(
                &Task::new("hello", "hello-a", json!({})),
                &params,
                deadline,
                &json!(["foo.bar.baz"]),
                data,
            )
            .unwrap()
    }

    #[test]
    fn healthy_indexed_task_is_used() {
        let found = replace(&data(TaskState::Completed, 30), Some(Utc::now()));
        assert_eq!(found.as_deref(), Some("TASKID-A"));
    }

    #[test]
    fn failed_and_exception_states_are_skipped() {
        assert_eq!(replace(&data(TaskState::Failed, 30), None), None);
        assert_eq!(replace(&data(TaskState::Exception, 30), None), None);
    }

    #[test]
    fn expiring_before_the_deadline_disqualifies() {
        let deadline = Utc::now() + Duration::days(10);
        assert_eq!(replace(&data(TaskState::Completed, 5), Some(deadline)), None);
    }

    #[test]
    fn unindexed_paths_are_not_replacements() {
        assert_eq!(replace(&PlatformData::default(), None), None);
    }
}
