//! Process-wide, write-once registries for pluggable strategies.
//!
//! Registries are populated during the registration phase (built-ins plus
//! the hooks named by `taskgraph.register`) and read-only afterwards.
//! Registering a name twice is fatal.

use crate::context::TransformContext;
use kindling_core::{Error, Result, Task};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// A transform: consumes the upstream stubs, emits zero or more stubs.
pub type TransformFn = fn(&TransformContext, Vec<Value>) -> Result<Vec<Value>>;

/// A loader: produces the kind's raw task stubs.
pub type LoaderFn = fn(&TransformContext) -> Result<Vec<Value>>;

/// A `from-deps` grouping strategy over kind-dependency tasks.
pub type GroupByFn = fn(&TransformContext, &Value, &[Task]) -> Result<Vec<Vec<Task>>>;

/// A `run-using` implementation: rewrites the stub's `run:` stanza into a
/// concrete payload.
pub type RunUsingFn = fn(&TransformContext, &mut Value) -> Result<()>;

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

        pub fn $lookup(name: &str) -> Option<$fn_type> {
            $static_name
                .read()
                .expect("registry poisoned")
                .get(name)
                .copied()
        }
    };
}

registry!(TRANSFORMS, TransformFn, register_transform, lookup_transform, "transform");
registry!(LOADERS, LoaderFn, register_loader, lookup_loader, "loader");
registry!(GROUP_BY, GroupByFn, register_group_by, lookup_group_by, "group-by");
registry!(RUN_USING, RunUsingFn, register_run_using, lookup_run_using, "run-using");
