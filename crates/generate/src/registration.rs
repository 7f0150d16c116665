//! Embedder registration hooks.
//!
//! `taskgraph.register` in the repository configuration names hooks that
//! must run once before generation; embedders install them here at startup
//! (registering custom transforms, strategies, morphs, and parameter
//! extensions). Unknown hook names are fatal before any phase runs.

use kindling_config::GraphConfig;
use kindling_core::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::debug;

pub type RegisterHook = fn(&GraphConfig) -> Result<()>;

static HOOKS: Lazy<RwLock<BTreeMap<String, RegisterHook>>> =
    Lazy::new(|| RwLock::new(BTreeMap::new()));

/// Install a named registration hook. Duplicate names are fatal.
pub fn register_hook(name: &str, hook: RegisterHook) -> Result<()> {
    let mut hooks = HOOKS.write().expect("hook registry poisoned");
    if hooks.contains_key(name) {
        return Err(Error::registry("registration hook", name));
    }
    hooks.insert(name.to_string(), hook);
    Ok(())
}

/// Run every hook the configuration names, in the configured order.
pub(crate) fn run_registered_hooks(config: &GraphConfig) -> Result<()> {
    let hooks = HOOKS.read().expect("hook registry poisoned");
    for name in config.register_hooks() {
        let hook = hooks.get(&name).ok_or_else(|| {
            Error::config(format!("taskgraph.register names unknown hook '{name}'"))
        })?;
        debug!(hook = %name, "running registration hook");
        hook(config)?;
    }
    Ok(())
}
