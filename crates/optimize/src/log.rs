//! The structured optimization log artifact. Non-fatal decisions (a
//! strategy refusing to replace, a strategy error, a soft dependency
//! pointing at a removed task) are recorded here instead of failing the
//! generation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "decision")]
pub enum OptimizationRecord {
    Removed { label: String, strategy: String },
    Replaced {
        label: String,
        strategy: String,
        task_id: String,
    },
    /// Removal was vetoed because a dependent still needs the task.
    KeptForDependents { label: String },
    StrategyError {
        label: String,
        strategy: String,
        message: String,
    },
    RemovedByIfDependencies { label: String },
    SoftDependencyDropped { label: String, target: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationLog {
    pub records: Vec<OptimizationRecord>,
}

impl OptimizationLog {
    pub fn record(&mut self, record: OptimizationRecord) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
