//! Minimal version-control introspection used to default parameters and to
//! answer `files_changed` queries.

use kindling_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

pub trait Vcs: Send + Sync {
    /// Paths changed between two revisions.
    fn get_files_changed(&self, base_rev: &str, head_rev: &str) -> Result<Vec<String>>;

    fn does_revision_exist_locally(&self, rev: &str) -> Result<bool>;

    /// The merge-base of `base_ref` and `head_rev`.
    fn find_latest_common_revision(&self, base_ref: &str, head_rev: &str) -> Result<String>;

    fn default_branch(&self) -> Result<String>;

    fn remote_name(&self) -> Result<String>;

    /// The currently checked-out revision.
    fn head_rev(&self) -> Result<String>;

    /// The fetch URL of the default remote.
    fn remote_url(&self) -> Result<String>;

    /// The current branch name, if on one.
    fn branch(&self) -> Result<Option<String>>;
}

/// Git implementation shelling out to the `git` binary.
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    pub fn new(root: &Path) -> Self {
        GitRepo {
            root: root.to_path_buf(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|err| Error::vcs(format!("failed to run git {}: {err}", args.join(" "))))?;
        if !output.status.success() {
            return Err(Error::vcs(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Vcs for GitRepo {
    fn get_files_changed(&self, base_rev: &str, head_rev: &str) -> Result<Vec<String>> {
        let range = format!("{base_rev}..{head_rev}");
        let listing = self.run(&["diff", "--name-only", &range])?;
        Ok(listing
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn does_revision_exist_locally(&self, rev: &str) -> Result<bool> {
        let probe = format!("{rev}^{{commit}}");
        Ok(Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &probe])
            .current_dir(&self.root)
            .output()
            .map_err(|err| Error::vcs(err.to_string()))?
            .status
            .success())
    }

    fn find_latest_common_revision(&self, base_ref: &str, head_rev: &str) -> Result<String> {
        self.run(&["merge-base", base_ref, head_rev])
    }

    fn default_branch(&self) -> Result<String> {
        let remote = self.remote_name()?;
        let head_ref = format!("refs/remotes/{remote}/HEAD");
        match self.run(&["symbolic-ref", "--short", &head_ref]) {
            Ok(full) => Ok(full),
            // No remote HEAD set; fall back to a conventional name.
            Err(_) => Ok(format!("{remote}/main")),
        }
    }

    fn remote_name(&self) -> Result<String> {
        let remotes = self.run(&["remote"])?;
        remotes
            .lines()
            .next()
            .map(str::to_string)
            .ok_or_else(|| Error::vcs("repository has no remotes"))
    }

    fn head_rev(&self) -> Result<String> {
        self.run(&["rev-parse", "HEAD"])
    }

    fn remote_url(&self) -> Result<String> {
        let remote = self.remote_name()?;
        self.run(&["remote", "get-url", &remote])
    }

    fn branch(&self) -> Result<Option<String>> {
        let name = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok((name != "HEAD").then_some(name))
    }
}
