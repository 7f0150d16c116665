//! Deterministic JSON artifacts for each phase.

use kindling_core::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ArtifactWriter {
    directory: PathBuf,
}

impl ArtifactWriter {
    pub fn new(directory: &Path) -> Result<Self> {
        std::fs::create_dir_all(directory)
            .map_err(|source| Error::file_system(directory, "create_dir_all", source))?;
        Ok(ArtifactWriter {
            directory: directory.to_path_buf(),
        })
    }

    /// Write `value` as pretty JSON with sorted keys (serde_json maps are
    /// ordered, so serialization is deterministic).
    pub fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.directory.join(name);
        let rendered = serde_json::to_string_pretty(value)?;
        debug!(artifact = name, bytes = rendered.len(), "writing artifact");
        std::fs::write(&path, rendered + "\n")
            .map_err(|source| Error::file_system(&path, "write", source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn artifacts_are_sorted_and_newline_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let map = BTreeMap::from([("b", 2), ("a", 1)]);
        writer.write("label-to-taskid.json", &map).unwrap();
        let text = std::fs::read_to_string(dir.path().join("label-to-taskid.json")).unwrap();
        assert!(text.ends_with('\n'));
        let a_at = text.find("\"a\"").unwrap();
        let b_at = text.find("\"b\"").unwrap();
        assert!(a_at < b_at);
    }
}
