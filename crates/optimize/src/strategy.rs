//! Optimization strategies and their registry.

use chrono::{DateTime, Utc};
use kindling_core::{Error, Result, Task};
use kindling_params::Parameters;
use kindling_platform::TaskStatus;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Platform answers gathered up front so strategies stay synchronous and
/// N strategies do not fan out to N HTTP requests.
#[derive(Debug, Clone, Default)]
pub struct PlatformData {
    /// index path → task-id, for every index path any task's optimization
    /// spec mentions.
    pub index_to_task: BTreeMap<String, String>,
    /// task-id → status for every task-id in `index_to_task`.
    pub statuses: BTreeMap<String, TaskStatus>,
}

/// A strategy answers one or both of: should this task be removed, should
/// it be replaced with an existing task-id.
pub trait OptimizationStrategy: Send + Sync {
    fn should_remove_task(&self, _task: &Task, _params: &Parameters, _arg: &Value) -> Result<bool> {
        Ok(false)
    }

    /// `deadline` is the latest deadline of the task's surviving dependents;
    /// a replacement must outlive it.
    fn should_replace_task(
        &self,
        _task: &Task,
        _params: &Parameters,
        _deadline: Option<DateTime<Utc>>,
        _arg: &Value,
        _data: &PlatformData,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}

pub type StrategyMap = BTreeMap<String, Arc<dyn OptimizationStrategy>>;

static REGISTRY: Lazy<RwLock<StrategyMap>> = Lazy::new(|| RwLock::new(BTreeMap::new()));

/// Register a user-supplied strategy. Duplicate names are fatal.
pub fn register_strategy(name: &str, strategy: Arc<dyn OptimizationStrategy>) -> Result<()> {
    let mut registry = REGISTRY.write().expect("strategy registry poisoned");
    if registry.contains_key(name) {
        return Err(Error::registry("optimization strategy", name));
    }
    registry.insert(name.to_string(), strategy);
    Ok(())
}

/// Built-in strategies plus everything registered by user code.
pub fn default_strategies() -> StrategyMap {
    let mut strategies: StrategyMap = BTreeMap::new();
    strategies.insert(
        "index-search".to_string(),
        Arc::new(crate::strategies::IndexSearch),
    );
    strategies.insert(
        "skip-unless-changed".to_string(),
        Arc::new(crate::strategies::SkipUnlessChanged),
    );
    strategies.insert("never".to_string(), Arc::new(Never));
    strategies.insert("always".to_string(), Arc::new(Always));
    for (name, strategy) in REGISTRY.read().expect("strategy registry poisoned").iter() {
        strategies.insert(name.clone(), Arc::clone(strategy));
    }
    strategies
}

/// Keep the task unconditionally.
pub struct Never;

impl OptimizationStrategy for Never {}

/// Remove the task unconditionally.
pub struct Always;

impl OptimizationStrategy for Always {
    fn should_remove_task(&self, _task: &Task, _params: &Parameters, _arg: &Value) -> Result<bool> {
        Ok(true)
    }
}

/// `All(s1, s2, …)`: remove iff every sub-strategy agrees; replace iff every
/// sub-strategy names the same task-id.
pub struct All(pub Vec<Arc<dyn OptimizationStrategy>>);

impl OptimizationStrategy for All {
    fn should_remove_task(&self, task: &Task, params: &Parameters, arg: &Value) -> Result<bool> {
        for strategy in &self.0 {
            if !strategy.should_remove_task(task, params, arg)? {
                return Ok(false);
            }
        }
        Ok(!self.0.is_empty())
    }

    fn should_replace_task(
        &self,
        task: &Task,
        params: &Parameters,
        deadline: Option<DateTime<Utc>>,
        arg: &Value,
        data: &PlatformData,
    ) -> Result<Option<String>> {
        let mut agreed: Option<String> = None;
        for strategy in &self.0 {
            match strategy.should_replace_task(task, params, deadline, arg, data)? {
                Some(task_id) if agreed.as_ref().map_or(true, |seen| *seen == task_id) => {
                    agreed = Some(task_id);
                }
                _ => return Ok(None),
            }
        }
        Ok(agreed)
    }
}

/// `Any(s1, s2, …)`: remove if any sub-strategy says so; replace with the
/// first replacement offered.
pub struct Any(pub Vec<Arc<dyn OptimizationStrategy>>);

impl OptimizationStrategy for Any {
    fn should_remove_task(&self, task: &Task, params: &Parameters, arg: &Value) -> Result<bool> {
        for strategy in &self.0 {
            if strategy.should_remove_task(task, params, arg)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn should_replace_task(
        &self,
        task: &Task,
        params: &Parameters,
        deadline: Option<DateTime<Utc>>,
        arg: &Value,
        data: &PlatformData,
    ) -> Result<Option<String>> {
        for strategy in &self.0 {
            if let Some(task_id) =
                strategy.should_replace_task(task, params, deadline, arg, data)?
            {
                return Ok(Some(task_id));
            }
        }
        Ok(None)
    }
}

/// `Not(s)`: inverts the removal answer; never replaces.
pub struct Not(pub Arc<dyn OptimizationStrategy>);

impl OptimizationStrategy for Not {
    fn should_remove_task(&self, task: &Task, params: &Parameters, arg: &Value) -> Result<bool> {
        Ok(!self.0.should_remove_task(task, params, arg)?)
    }
}

/// `Alias(name, s)`: a named re-export of an existing strategy.
pub struct Alias(pub Arc<dyn OptimizationStrategy>);

impl OptimizationStrategy for Alias {
    fn should_remove_task(&self, task: &Task, params: &Parameters, arg: &Value) -> Result<bool> {
        self.0.should_remove_task(task, params, arg)
    }

    fn should_replace_task(
        &self,
        task: &Task,
        params: &Parameters,
        deadline: Option<DateTime<Utc>>,
        arg: &Value,
        data: &PlatformData,
    ) -> Result<Option<String>> {
        self.0.should_replace_task(task, params, deadline, arg, data)
    }
}
