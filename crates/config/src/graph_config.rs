//! Repository-level configuration, loaded once per generation from
//! `config.yml` at the taskgraph root.

use crate::schema::{Field, Schema};
use kindling_core::{Error, Result, MAX_DEPENDENCIES, MAX_ROUTES};
use kindling_utils::{get_path, load_yaml};
use serde_json::Value;
use std::path::{Path, PathBuf};

fn config_schema() -> Schema {
    Schema::open_object(vec![
        Field::required("trust-domain", Schema::Str),
        Field::required(
            "task-priority",
            Schema::keyed_by(
                vec!["project"],
                Schema::Enum(vec![
                    "highest", "very-high", "high", "medium", "low", "very-low", "lowest",
                ]),
            ),
        ),
        Field::required(
            "workers",
            Schema::object(vec![Field::required(
                "aliases",
                Schema::Map(Box::new(Schema::object(vec![
                    Field::required("provisioner", Schema::keyed_by(vec!["level"], Schema::Str)),
                    Field::required("implementation", Schema::Str),
                    Field::required("os", Schema::Str),
                    Field::required("worker-type", Schema::keyed_by(vec!["level"], Schema::Str)),
                ]))),
            )]),
        ),
        Field::required(
            "taskgraph",
            Schema::open_object(vec![
                Field::optional("register", Schema::Seq(Box::new(Schema::Str))),
                Field::required(
                    "repositories",
                    Schema::Map(Box::new(Schema::open_object(vec![Field::required(
                        "name",
                        Schema::Str,
                    )]))),
                ),
                Field::optional("decision-parameters", Schema::Str),
                Field::optional("index-path-regexes", Schema::Seq(Box::new(Schema::Str))),
                Field::optional("cached-task-prefix", Schema::Str),
                Field::optional("max-dependencies", Schema::Int),
                Field::optional("max-routes", Schema::Int),
            ]),
        ),
    ])
}

/// Immutable repository configuration; the single source of truth for
/// trust domain, worker aliases, and taskgraph settings.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    config: Value,
    root_dir: PathBuf,
}

impl GraphConfig {
    /// Load and validate `config.yml` from `root_dir`.
    pub fn load(root_dir: &Path) -> Result<Self> {
        let path = root_dir.join("config.yml");
        if !path.is_file() {
            return Err(Error::config(format!(
                "no config.yml found at '{}'",
                path.display()
            )));
        }
        let config = load_yaml(&path)?;
        Self::from_value(config, root_dir)
    }

    /// Build from an already-parsed value (used by tests and embedders).
    pub fn from_value(config: Value, root_dir: &Path) -> Result<Self> {
        config_schema()
            .validate(&config, "config.yml")
            .map_err(|err| Error::config(err.to_string()))?;
        Ok(GraphConfig {
            config,
            root_dir: root_dir.to_path_buf(),
        })
    }

    /// Dotted-path accessor into the raw configuration.
    pub fn get(&self, dotted: &str) -> Option<&Value> {
        get_path(&self.config, dotted)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn trust_domain(&self) -> &str {
        self.get("trust-domain")
            .and_then(Value::as_str)
            .expect("validated at load")
    }

    pub fn task_priority(&self) -> &Value {
        self.get("task-priority").expect("validated at load")
    }

    /// The raw worker alias table.
    pub fn worker_aliases(&self) -> &Value {
        self.get("workers.aliases").expect("validated at load")
    }

    pub fn worker_alias(&self, alias: &str) -> Result<&Value> {
        self.worker_aliases()
            .as_object()
            .and_then(|aliases| aliases.get(alias))
            .ok_or_else(|| Error::config(format!("unknown worker alias '{alias}'")))
    }

    /// Registration hook names listed under `taskgraph.register`.
    pub fn register_hooks(&self) -> Vec<String> {
        self.get("taskgraph.register")
            .and_then(Value::as_array)
            .map(|hooks| {
                hooks
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn index_path_regexes(&self) -> Vec<String> {
        self.get("taskgraph.index-path-regexes")
            .and_then(Value::as_array)
            .map(|patterns| {
                patterns
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn cached_task_prefix(&self) -> String {
        self.get("taskgraph.cached-task-prefix")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.cache", self.trust_domain()))
    }

    pub fn max_dependencies(&self) -> usize {
        self.get("taskgraph.max-dependencies")
            .and_then(Value::as_u64)
            .map(|limit| limit as usize)
            .unwrap_or(MAX_DEPENDENCIES)
    }

    pub fn max_routes(&self) -> usize {
        self.get("taskgraph.max-routes")
            .and_then(Value::as_u64)
            .map(|limit| limit as usize)
            .unwrap_or(MAX_ROUTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn demo_config() -> Value {
        json!({
            "trust-domain": "demo",
            "task-priority": "low",
            "workers": {
                "aliases": {
                    "b-linux": {
                        "provisioner": "demo-provisioner",
                        "implementation": "docker-worker",
                        "os": "linux",
                        "worker-type": "b-linux",
                    },
                },
            },
            "taskgraph": {
                "repositories": {"demo": {"name": "demo"}},
            },
        })
    }

    #[test]
    fn valid_config_loads() {
        let config = GraphConfig::from_value(demo_config(), Path::new("/repo/taskcluster")).unwrap();
        assert_eq!(config.trust_domain(), "demo");
        assert_eq!(config.max_routes(), 64);
        assert_eq!(config.max_dependencies(), 9_999);
        assert_eq!(config.cached_task_prefix(), "demo.cache");
    }

    #[test]
    fn missing_trust_domain_is_a_config_error() {
        let mut raw = demo_config();
        raw.as_object_mut().unwrap().remove("trust-domain");
        let err = GraphConfig::from_value(raw, Path::new("/repo")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn unknown_worker_alias_is_rejected() {
        let config = GraphConfig::from_value(demo_config(), Path::new("/repo")).unwrap();
        assert!(config.worker_alias("b-linux").is_ok());
        assert!(config.worker_alias("nope").is_err());
    }

    #[test]
    fn dotted_get_reaches_nested_values() {
        let config = GraphConfig::from_value(demo_config(), Path::new("/repo")).unwrap();
        assert_eq!(
            config.get("workers.aliases.b-linux.os"),
            Some(&json!("linux"))
        );
    }
}
