//! YAML file loading with a path-keyed cache.
//!
//! Kind directories are read many times during a generation (task-defaults,
//! tasks-from files, task-context files). The cache is keyed by absolute
//! path and invalidated on modification time, so re-reads after a directory
//! change observe fresh contents.

use kindling_core::{Error, Result};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

static CACHE: Lazy<Mutex<HashMap<PathBuf, (SystemTime, Value)>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Load a YAML (or JSON; YAML is a superset) file as a JSON value tree.
pub fn load_yaml(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| Error::file_system(path, "read", source))?;
    let value: Value =
        serde_yaml::from_str(&text).map_err(|err| Error::yaml(path, err.to_string()))?;
    Ok(value)
}

/// Load through the process-wide cache.
pub fn load_yaml_cached(path: &Path) -> Result<Value> {
    let canonical = path
        .canonicalize()
        .map_err(|source| Error::file_system(path, "canonicalize", source))?;
    let mtime = std::fs::metadata(&canonical)
        .and_then(|meta| meta.modified())
        .map_err(|source| Error::file_system(&canonical, "stat", source))?;

    let mut cache = CACHE.lock().expect("yaml cache poisoned");
    if let Some((cached_mtime, value)) = cache.get(&canonical) {
        if *cached_mtime == mtime {
            return Ok(value.clone());
        }
    }
    let value = load_yaml(&canonical)?;
    cache.insert(canonical, (mtime, value.clone()));
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_yaml_as_json_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kind.yml");
        std::fs::write(&path, "tasks:\n  a:\n    description: first\n").unwrap();
        let value = load_yaml(&path).unwrap();
        assert_eq!(value["tasks"]["a"]["description"], "first");
    }

    #[test]
    fn cached_load_returns_same_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defaults.yml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "priority: low").unwrap();
        drop(file);
        let first = load_yaml_cached(&path).unwrap();
        let second = load_yaml_cached(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_file_is_a_filesystem_error() {
        let err = load_yaml(Path::new("/nonexistent/kind.yml")).unwrap_err();
        assert!(matches!(err, Error::FileSystem { .. }));
    }
}
