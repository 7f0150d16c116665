//! Remove a task unless the push touched files it cares about.

use crate::strategy::OptimizationStrategy;
use globset::{Glob, GlobSetBuilder};
use kindling_core::{Error, Result, Task};
use kindling_params::Parameters;
use serde_json::Value;
use tracing::debug;

/// `arg` is a list of glob patterns; the task is removed iff none of
/// `files_changed` matches any of them.
pub struct SkipUnlessChanged;

impl OptimizationStrategy for SkipUnlessChanged {
    fn should_remove_task(&self, task: &Task, params: &Parameters, arg: &Value) -> Result<bool> {
        let patterns = arg.as_array().ok_or_else(|| {
            Error::optimizer(
                &task.label,
                "skip-unless-changed",
                "argument must be a list of glob patterns",
            )
        })?;
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns.iter().filter_map(Value::as_str) {
            builder.add(Glob::new(pattern).map_err(|err| {
                Error::optimizer(&task.label, "skip-unless-changed", err.to_string())
            })?);
        }
        let globs = builder
            .build()
            .map_err(|err| Error::optimizer(&task.label, "skip-unless-changed", err.to_string()))?;
        let touched = params
            .files_changed
            .iter()
            .any(|path| globs.is_match(path));
        if !touched {
            debug!(label = %task.label, "no relevant files changed");
        }
        Ok(!touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindling_params::test_support::demo_parameters_value;
    use serde_json::json;

    fn params_with_changes(files: &[&str]) -> Parameters {
        let mut raw = demo_parameters_value();
        raw["files_changed"] = json!(files);
        Parameters::from_value(raw).unwrap()
    }

    #[test]
    fn untouched_patterns_remove_the_task() {
        let task = Task::new("docs", "docs-build", json!({}));
        let params = params_with_changes(&["docs/index.md"]);
        assert!(SkipUnlessChanged
            .should_remove_task(&task, &params, &json!(["src/**"]))
            .unwrap());
        assert!(!SkipUnlessChanged
            .should_remove_task(&task, &params, &json!(["docs/**"]))
            .unwrap());
    }

    #[test]
    fn empty_changeset_removes() {
        let task = Task::new("docs", "docs-build", json!({}));
        let params = params_with_changes(&[]);
        assert!(SkipUnlessChanged
            .should_remove_task(&task, &params, &json!(["src/**"]))
            .unwrap());
    }

    #[test]
    fn bad_pattern_is_an_optimizer_error() {
        let task = Task::new("docs", "docs-build", json!({}));
        let params = params_with_changes(&["src/a.rs"]);
        let err = SkipUnlessChanged
            .should_remove_task(&task, &params, &json!(["src/[**"]))
            .unwrap_err();
        assert!(matches!(err, Error::Optimizer { .. }));
    }
}
