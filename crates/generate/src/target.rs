//! Target task selection: named methods chained through named filters.

use kindling_core::{Error, Result, ATTR_ALWAYS_TARGET};
use kindling_graph::TaskGraph;
use kindling_params::Parameters;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use tracing::info;

/// Selects the initial target set from the full graph.
pub type TargetTasksMethod = fn(&TaskGraph, &Parameters) -> Result<Vec<String>>;

/// Narrows an already-selected target set.
pub type FilterFn = fn(Vec<String>, &TaskGraph, &Parameters) -> Result<Vec<String>>;

macro_rules! registry {
    ($static_name:ident, $fn_type:ty, $register:ident, $lookup:ident, $label:literal) => {
        static $static_name: Lazy<RwLock<BTreeMap<String, $fn_type>>> =
            Lazy::new(|| RwLock::new(BTreeMap::new()));

        pub fn $register(name: &str, function: $fn_type) -> Result<()> {
            let mut registry = $static_name.write().expect("registry poisoned");
            if registry.contains_key(name) {
                return Err(Error::registry($label, name));
            }
            registry.insert(name.to_string(), function);
            Ok(())
        }

        fn $lookup(name: &str) -> Option<$fn_type> {
            $static_name
                .read()
                .expect("registry poisoned")
                .get(name)
                .copied()
        }
    };
}

registry!(
    METHODS,
    TargetTasksMethod,
    register_target_tasks_method,
    lookup_method,
    "target-tasks method"
);
registry!(FILTERS, FilterFn, register_filter, lookup_filter, "filter");

pub(crate) fn register_builtins() {
    use once_cell::sync::OnceCell;
    static DONE: OnceCell<()> = OnceCell::new();
    DONE.get_or_init(|| {
        register_target_tasks_method("all", method_all).expect("builtin method clash");
        register_target_tasks_method("default", method_default).expect("builtin method clash");
        register_target_tasks_method("nothing", method_nothing).expect("builtin method clash");
        register_filter("only-code-review", filter_code_review).expect("builtin filter clash");
    });
}

fn method_all(graph: &TaskGraph, _params: &Parameters) -> Result<Vec<String>> {
    Ok(graph.labels().map(str::to_string).collect())
}

fn method_nothing(_graph: &TaskGraph, _params: &Parameters) -> Result<Vec<String>> {
    Ok(Vec::new())
}

/// The standard selection: tasks whose `run_on_projects` matches the
/// triggering project and whose `run-on-tasks-for` (when present) matches
/// `tasks_for`.
fn method_default(graph: &TaskGraph, params: &Parameters) -> Result<Vec<String>> {
    Ok(graph
        .tasks()
        .values()
        .filter(|task| {
            let projects = task.attributes.get("run_on_projects");
            let project_match = match projects.and_then(Value::as_array) {
                Some(projects) => projects.iter().filter_map(Value::as_str).any(|candidate| {
                    candidate == "all" || candidate == params.project
                }),
                None => true,
            };
            let tasks_for_match = match task
                .attributes
                .get("run-on-tasks-for")
                .and_then(Value::as_array)
            {
                Some(events) => events
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|event| event == params.tasks_for),
                None => true,
            };
            project_match && tasks_for_match
        })
        .map(|task| task.label.clone())
        .collect())
}

/// Keep only tasks opted into code review when that event triggered us.
fn filter_code_review(
    target: Vec<String>,
    graph: &TaskGraph,
    params: &Parameters,
) -> Result<Vec<String>> {
    if params.tasks_for != "code-review" {
        return Ok(target);
    }
    Ok(target
        .into_iter()
        .filter(|label| {
            graph
                .get(label)
                .map(|task| task.attribute_is_true("code-review"))
                .unwrap_or(false)
        })
        .collect())
}

/// Apply the configured method, the configured filters in order, and the
/// always-target ride-along.
pub(crate) fn select_target_tasks(
    graph: &TaskGraph,
    params: &Parameters,
) -> Result<BTreeSet<String>> {
    register_builtins();
    let method = lookup_method(&params.target_tasks_method).ok_or_else(|| {
        Error::config(format!(
            "unknown target_tasks_method '{}'",
            params.target_tasks_method
        ))
    })?;
    let mut target = method(graph, params)?;
    for name in &params.filters {
        let filter = lookup_filter(name)
            .ok_or_else(|| Error::config(format!("unknown filter '{name}'")))?;
        target = filter(target, graph, params)?;
    }
    let mut selected: BTreeSet<String> = target.into_iter().collect();
    for task in graph.tasks().values() {
        if task.attribute_is_true(ATTR_ALWAYS_TARGET)
            && params.enable_always_target.applies_to(&task.kind)
        {
            selected.insert(task.label.clone());
        }
    }
    info!(count = selected.len(), method = %params.target_tasks_method, "target tasks selected");
    Ok(selected)
}
