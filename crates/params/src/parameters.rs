//! The parameter bundle and its composed validation schema.

use kindling_config::{Field, Schema};
use kindling_core::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// `enable_always_target` is either a blanket switch or a list of kinds
/// whose always-target tasks ride along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnableAlwaysTarget {
    Bool(bool),
    Kinds(Vec<String>),
}

impl EnableAlwaysTarget {
    pub fn applies_to(&self, kind: &str) -> bool {
        match self {
            EnableAlwaysTarget::Bool(enabled) => *enabled,
            EnableAlwaysTarget::Kinds(kinds) => kinds.iter().any(|name| name == kind),
        }
    }
}

impl Default for EnableAlwaysTarget {
    fn default() -> Self {
        EnableAlwaysTarget::Bool(true)
    }
}

/// Immutable key→value bundle describing the triggering event. Validated at
/// construction against the core schema composed with any registered
/// project extensions; read-only thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub base_repository: String,
    pub head_repository: String,
    pub head_rev: String,
    pub head_ref: String,
    #[serde(default)]
    pub base_rev: String,
    #[serde(default)]
    pub base_ref: String,
    pub owner: String,
    pub project: String,
    pub level: u32,
    #[serde(default)]
    pub pushlog_id: String,
    pub pushdate: i64,
    pub build_date: i64,
    pub repository_type: String,
    pub tasks_for: String,
    pub target_tasks_method: String,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default = "default_true")]
    pub optimize_target_tasks: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize_strategies: Option<String>,
    #[serde(default)]
    pub do_not_optimize: Vec<String>,
    #[serde(default)]
    pub existing_tasks: BTreeMap<String, String>,
    #[serde(default)]
    pub enable_always_target: EnableAlwaysTarget,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<u64>,
    /// Project-defined keys declared through registered extensions.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_true() -> bool {
    true
}

struct Extension {
    schema: Schema,
    defaults: BTreeMap<String, Value>,
}

static EXTENSIONS: Lazy<RwLock<BTreeMap<String, Extension>>> =
    Lazy::new(|| RwLock::new(BTreeMap::new()));

/// Register a project-specific parameter extension: an extra schema composed
/// with the core schema, plus defaults applied before validation.
/// Registering the same name twice is an error.
pub fn register_parameters_extension(
    name: &str,
    schema: Schema,
    defaults: BTreeMap<String, Value>,
) -> Result<()> {
    let mut extensions = EXTENSIONS.write().expect("extension registry poisoned");
    if extensions.contains_key(name) {
        return Err(Error::registry("parameters extension", name));
    }
    extensions.insert(name.to_string(), Extension { schema, defaults });
    Ok(())
}

fn core_schema() -> Schema {
    Schema::open_object(vec![
        Field::required("base_repository", Schema::Str),
        Field::required("head_repository", Schema::Str),
        Field::required("head_rev", Schema::Str),
        Field::required("head_ref", Schema::Str),
        Field::optional("base_rev", Schema::Str),
        Field::optional("base_ref", Schema::Str),
        Field::required("owner", Schema::Str),
        Field::required("project", Schema::Str),
        Field::required("level", Schema::Int),
        Field::optional("pushlog_id", Schema::Str),
        Field::required("pushdate", Schema::Int),
        Field::required("build_date", Schema::Int),
        Field::required("repository_type", Schema::Str),
        Field::required("tasks_for", Schema::Str),
        Field::required("target_tasks_method", Schema::Str),
        Field::optional("filters", Schema::Seq(Box::new(Schema::Str))),
        Field::optional("optimize_target_tasks", Schema::Bool),
        Field::optional("optimize_strategies", Schema::Str),
        Field::optional("do_not_optimize", Schema::Seq(Box::new(Schema::Str))),
        Field::optional("existing_tasks", Schema::Map(Box::new(Schema::Str))),
        Field::optional("enable_always_target", Schema::Any),
        Field::optional("files_changed", Schema::Seq(Box::new(Schema::Str))),
        Field::optional("version", Schema::Str),
        Field::optional("next_version", Schema::Str),
        Field::optional("build_number", Schema::Int),
    ])
}

impl Parameters {
    /// Build from a raw mapping, applying extension defaults and validating
    /// the composed schema. Strict construction: missing required keys fail.
    pub fn from_value(mut raw: Value) -> Result<Self> {
        let Some(map) = raw.as_object_mut() else {
            return Err(Error::parameter("parameters must be a mapping"));
        };
        let extensions = EXTENSIONS.read().expect("extension registry poisoned");
        for extension in extensions.values() {
            for (key, default) in &extension.defaults {
                map.entry(key.clone()).or_insert_with(|| default.clone());
            }
        }
        core_schema()
            .validate(&raw, "parameters")
            .map_err(|err| Error::parameter(err.to_string()))?;
        for (name, extension) in extensions.iter() {
            extension
                .schema
                .validate(&raw, &format!("parameters ({name})"))
                .map_err(|err| Error::parameter(err.to_string()))?;
        }
        serde_json::from_value(raw).map_err(|err| Error::parameter(err.to_string()))
    }

    /// Serialize to the canonical label-sorted JSON mapping.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("parameters serialization cannot fail")
    }

    /// Dotted lookup over the serialized form, for transforms that address
    /// parameters generically.
    pub fn get(&self, key: &str) -> Option<Value> {
        kindling_utils::get_path(&self.to_value(), key).cloned()
    }
}

/// Fixtures shared by test suites across the workspace.
pub mod test_support {
    use serde_json::{json, Value};

    /// A minimal valid parameter mapping for tests.
    pub fn demo_parameters_value() -> Value {
        json!({
            "base_repository": "https://example.com/repo",
            "head_repository": "https://example.com/repo",
            "head_rev": "abcdef",
            "head_ref": "refs/heads/main",
            "base_rev": "012345",
            "base_ref": "refs/heads/main",
            "owner": "dev@example.com",
            "project": "demo",
            "level": 1,
            "pushlog_id": "0",
            "pushdate": 1_700_000_000,
            "build_date": 1_700_000_000,
            "repository_type": "git",
            "tasks_for": "push",
            "target_tasks_method": "all",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::demo_parameters_value;
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_parameters_construct() {
        let params = Parameters::from_value(demo_parameters_value()).unwrap();
        assert_eq!(params.project, "demo");
        assert!(params.optimize_target_tasks);
        assert!(params.filters.is_empty());
        assert!(params.enable_always_target.applies_to("anything"));
    }

    #[test]
    fn missing_required_key_fails() {
        let mut raw = demo_parameters_value();
        raw.as_object_mut().unwrap().remove("head_rev");
        let err = Parameters::from_value(raw).unwrap_err();
        assert!(matches!(err, Error::Parameter { .. }));
        assert!(err.to_string().contains("head_rev"));
    }

    #[test]
    fn ill_typed_key_fails() {
        let mut raw = demo_parameters_value();
        raw["level"] = json!("one");
        assert!(Parameters::from_value(raw).is_err());
    }

    #[test]
    fn enable_always_target_kind_list() {
        let mut raw = demo_parameters_value();
        raw["enable_always_target"] = json!(["docker-image"]);
        let params = Parameters::from_value(raw).unwrap();
        assert!(params.enable_always_target.applies_to("docker-image"));
        assert!(!params.enable_always_target.applies_to("build"));
    }

    #[test]
    fn unknown_keys_survive_as_extra() {
        let mut raw = demo_parameters_value();
        raw["release_type"] = json!("beta");
        let params = Parameters::from_value(raw).unwrap();
        assert_eq!(params.extra["release_type"], json!("beta"));
    }

    #[test]
    fn round_trips_through_json() {
        let params = Parameters::from_value(demo_parameters_value()).unwrap();
        let rebuilt = Parameters::from_value(params.to_value()).unwrap();
        assert_eq!(params, rebuilt);
    }
}
