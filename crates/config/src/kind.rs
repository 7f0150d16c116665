//! Per-kind configuration: `kind.yml` discovery, validation, and the
//! kind-dependency ordering.

use crate::schema::{Field, Schema};
use kindling_core::{Error, Result};
use kindling_graph::Graph;
use kindling_utils::load_yaml;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

fn kind_schema() -> Schema {
    Schema::open_object(vec![
        Field::optional("loader", Schema::Str),
        Field::optional("transforms", Schema::Seq(Box::new(Schema::Str))),
        Field::optional("kind-dependencies", Schema::Seq(Box::new(Schema::Str))),
        Field::optional("task-defaults", Schema::Map(Box::new(Schema::Any))),
        Field::optional("tasks", Schema::Map(Box::new(Schema::Any))),
        Field::optional("tasks-from", Schema::Seq(Box::new(Schema::Str))),
    ])
}

/// A named group of related tasks with its own transform pipeline.
#[derive(Debug, Clone)]
pub struct Kind {
    name: String,
    path: PathBuf,
    config: Value,
}

impl Kind {
    /// Load one kind from `<path>/kind.yml`.
    pub fn load(name: &str, path: &Path) -> Result<Self> {
        let kind_yml = path.join("kind.yml");
        let config = load_yaml(&kind_yml)?;
        kind_schema()
            .validate(&config, &format!("{name}/kind.yml"))
            .map_err(|err| Error::config(err.to_string()))?;
        Ok(Kind {
            name: name.to_string(),
            path: path.to_path_buf(),
            config,
        })
    }

    pub fn from_value(name: &str, path: &Path, config: Value) -> Result<Self> {
        kind_schema()
            .validate(&config, &format!("{name}/kind.yml"))
            .map_err(|err| Error::config(err.to_string()))?;
        Ok(Kind {
            name: name.to_string(),
            path: path.to_path_buf(),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Loader registry name; the default loader when unset.
    pub fn loader(&self) -> &str {
        self.config
            .get("loader")
            .and_then(Value::as_str)
            .unwrap_or("default")
    }

    pub fn transforms(&self) -> Vec<String> {
        self.config
            .get("transforms")
            .and_then(Value::as_array)
            .map(|refs| {
                refs.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn kind_dependencies(&self) -> Vec<String> {
        self.config
            .get("kind-dependencies")
            .and_then(Value::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Discover every kind under `root/kinds/<name>/kind.yml`, restricted to
/// `target_kinds` (plus their kind-dependencies) when given.
pub fn load_kinds(root: &Path, target_kinds: Option<&[String]>) -> Result<Vec<Kind>> {
    let kinds_dir = root.join("kinds");
    let mut kinds = BTreeMap::new();
    let entries = std::fs::read_dir(&kinds_dir)
        .map_err(|source| Error::file_system(&kinds_dir, "read_dir", source))?;
    for entry in entries {
        let entry = entry.map_err(|source| Error::file_system(&kinds_dir, "read_dir", source))?;
        let path = entry.path();
        if path.join("kind.yml").is_file() {
            let name = entry.file_name().to_string_lossy().to_string();
            debug!(kind = %name, "loading kind");
            kinds.insert(name.clone(), Kind::load(&name, &path)?);
        }
    }
    if kinds.is_empty() {
        return Err(Error::config(format!(
            "no kinds found under '{}'",
            kinds_dir.display()
        )));
    }
    let kinds = match target_kinds {
        Some(targets) => restrict_to_targets(kinds, targets)?,
        None => kinds,
    };
    order_kinds(kinds)
}

fn restrict_to_targets(
    kinds: BTreeMap<String, Kind>,
    targets: &[String],
) -> Result<BTreeMap<String, Kind>> {
    let mut wanted: BTreeSet<String> = BTreeSet::new();
    let mut queue: Vec<String> = targets.to_vec();
    while let Some(name) = queue.pop() {
        let kind = kinds
            .get(&name)
            .ok_or_else(|| Error::config(format!("unknown target kind '{name}'")))?;
        if wanted.insert(name.clone()) {
            queue.extend(kind.kind_dependencies());
        }
    }
    Ok(kinds
        .into_iter()
        .filter(|(name, _)| wanted.contains(name))
        .collect())
}

/// Order kinds so that every kind follows its kind-dependencies.
fn order_kinds(kinds: BTreeMap<String, Kind>) -> Result<Vec<Kind>> {
    let nodes: BTreeSet<String> = kinds.keys().cloned().collect();
    let mut edges = BTreeSet::new();
    for kind in kinds.values() {
        for dep in kind.kind_dependencies() {
            if !nodes.contains(&dep) {
                return Err(Error::config(format!(
                    "kind '{}' depends on unknown kind '{dep}'",
                    kind.name()
                )));
            }
            edges.insert((kind.name().to_string(), dep.clone(), "kind-dependency".to_string()));
        }
    }
    let graph = Graph::new(nodes, edges)?;
    let order = graph
        .visit_postorder()
        .map_err(|err| Error::config(format!("kind dependencies: {err}")))?;
    let mut kinds = kinds;
    Ok(order
        .into_iter()
        .map(|name| kinds.remove(&name).expect("ordered names come from the map"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_kind(root: &Path, name: &str, body: &str) {
        let dir = root.join("kinds").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("kind.yml"), body).unwrap();
    }

    #[test]
    fn kinds_load_in_dependency_order() {
        let root = tempfile::tempdir().unwrap();
        write_kind(root.path(), "test", "kind-dependencies: [build]\ntasks: {}\n");
        write_kind(root.path(), "build", "tasks: {}\n");
        let kinds = load_kinds(root.path(), None).unwrap();
        let names: Vec<&str> = kinds.iter().map(Kind::name).collect();
        assert_eq!(names, vec!["build", "test"]);
    }

    #[test]
    fn target_kind_restriction_pulls_dependencies() {
        let root = tempfile::tempdir().unwrap();
        write_kind(root.path(), "test", "kind-dependencies: [build]\ntasks: {}\n");
        write_kind(root.path(), "build", "tasks: {}\n");
        write_kind(root.path(), "docs", "tasks: {}\n");
        let kinds = load_kinds(root.path(), Some(&["test".to_string()])).unwrap();
        let names: Vec<&str> = kinds.iter().map(Kind::name).collect();
        assert_eq!(names, vec!["build", "test"]);
    }

    #[test]
    fn cyclic_kind_dependencies_fail() {
        let root = tempfile::tempdir().unwrap();
        write_kind(root.path(), "a", "kind-dependencies: [b]\ntasks: {}\n");
        write_kind(root.path(), "b", "kind-dependencies: [a]\ntasks: {}\n");
        assert!(load_kinds(root.path(), None).is_err());
    }

    #[test]
    fn defaults_apply_when_keys_absent() {
        let kind = Kind::from_value("hello", Path::new("/k"), json!({"tasks": {}})).unwrap();
        assert_eq!(kind.loader(), "default");
        assert!(kind.transforms().is_empty());
        assert!(kind.kind_dependencies().is_empty());
    }
}
