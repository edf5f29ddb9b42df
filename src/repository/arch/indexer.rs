// src/repository/arch/indexer.rs

//! Index archive mutation via `repo-add` and `repo-remove`
//!
//! The archive is only ever changed by these tools. Outcomes that the tools
//! report as warnings (an entry already present, nothing removed) are read
//! from their diagnostics rather than from package metadata.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::process::{Tool, ToolOutput};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// repo-add diagnostics for an add that left the index untouched
const DUPLICATE_MARKERS: &[&str] = &["already existed", "is already present"];

/// repo-remove diagnostics for a removal that matched nothing
const NOTHING_REMOVED_MARKERS: &[&str] = &["nothing to do", "not found"];

pub struct DatabaseIndexer<'a> {
    config: &'a Config,
    archive: PathBuf,
}

impl<'a> DatabaseIndexer<'a> {
    pub fn new(config: &'a Config, archive: PathBuf) -> Self {
        Self { config, archive }
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Add or, with `force`, overwrite the entry for a package file.
    ///
    /// Without `force` repo-add runs with `--new`, which skips packages whose
    /// name and version are already indexed and only warns about it.
    /// `--remove` makes repo-add delete the file and signature of a
    /// superseded version once the entry is replaced.
    pub fn add_entry(&self, package: &Path, identity: &str, force: bool) -> Result<()> {
        let program = &self.config.tools.repo_add;
        let mut tool = Tool::new(program);
        if !force {
            tool = tool.arg("--new");
        }
        let output = tool
            .arg("--remove")
            .arg(&self.archive)
            .arg(package)
            .current_dir(self.working_dir())
            .timeout(self.config.tool_timeout)
            .output()?;

        if !force && mentions(&output, DUPLICATE_MARKERS) {
            warn!("{} is already indexed in {}", identity, self.archive.display());
            return Err(Error::DuplicatePackage(identity.to_string()));
        }
        if !output.success() {
            return Err(output.into_error(program));
        }

        info!("Indexed {} in {}", identity, self.archive.display());
        Ok(())
    }

    /// Remove the entry for a package name
    pub fn remove_entry(&self, name: &str) -> Result<()> {
        if !self.archive.is_file() {
            return Err(Error::NotFound {
                what: "package",
                name: name.to_string(),
            });
        }

        let program = &self.config.tools.repo_remove;
        let output = Tool::new(program)
            .arg(&self.archive)
            .arg(name)
            .current_dir(self.working_dir())
            .timeout(self.config.tool_timeout)
            .output()?;

        if mentions(&output, NOTHING_REMOVED_MARKERS) {
            return Err(Error::NotFound {
                what: "package",
                name: name.to_string(),
            });
        }
        if !output.success() {
            return Err(output.into_error(program));
        }

        info!("Removed {} from {}", name, self.archive.display());
        Ok(())
    }

    fn working_dir(&self) -> &Path {
        self.archive.parent().unwrap_or_else(|| Path::new("."))
    }
}

fn mentions(output: &ToolOutput, markers: &[&str]) -> bool {
    let text = output.combined().to_lowercase();
    markers.iter().any(|marker| text.contains(marker))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ToolPaths;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(repo_add: PathBuf, repo_remove: PathBuf) -> Config {
        Config::new("/unused").with_tools(ToolPaths {
            repo_add,
            repo_remove,
            ..ToolPaths::default()
        })
    }

    #[test]
    fn test_add_without_force_passes_new_and_remove_and_detects_duplicate() {
        let temp = tempfile::tempdir().unwrap();
        let log = temp.path().join("args");
        let repo_add = script(
            temp.path(),
            "repo-add",
            &format!(
                "echo \"$@\" > {}\necho \"==> WARNING: An entry for 'foo-1-1' already existed\" >&2",
                log.display()
            ),
        );
        let config = config(repo_add, PathBuf::from("repo-remove"));
        let indexer = DatabaseIndexer::new(&config, temp.path().join("r.db.tar.xz"));

        let err = indexer
            .add_entry(&temp.path().join("foo-1-1-any.pkg.tar.zst"), "foo-1-1", false)
            .unwrap_err();

        assert!(matches!(err, Error::DuplicatePackage(ref id) if id == "foo-1-1"));
        assert!(fs::read_to_string(log).unwrap().starts_with("--new --remove "));
    }

    #[test]
    fn test_add_with_force_ignores_existing_entry_warning() {
        let temp = tempfile::tempdir().unwrap();
        let log = temp.path().join("args");
        let repo_add = script(
            temp.path(),
            "repo-add",
            &format!(
                "echo \"$@\" > {}\necho \"==> WARNING: An entry for 'foo-1-1' already existed\" >&2",
                log.display()
            ),
        );
        let config = config(repo_add, PathBuf::from("repo-remove"));
        let indexer = DatabaseIndexer::new(&config, temp.path().join("r.db.tar.xz"));

        indexer
            .add_entry(&temp.path().join("foo-1-1-any.pkg.tar.zst"), "foo-1-1", true)
            .unwrap();
        let args = fs::read_to_string(log).unwrap();
        assert!(args.starts_with("--remove "));
        assert!(!args.contains("--new"));
    }

    #[test]
    fn test_add_failure_carries_diagnostics() {
        let temp = tempfile::tempdir().unwrap();
        let repo_add = script(temp.path(), "repo-add", "echo '==> ERROR: not a package' >&2\nexit 1");
        let config = config(repo_add, PathBuf::from("repo-remove"));
        let indexer = DatabaseIndexer::new(&config, temp.path().join("r.db.tar.xz"));

        let err = indexer
            .add_entry(&temp.path().join("foo-1-1-any.pkg.tar.zst"), "foo-1-1", false)
            .unwrap_err();
        match err {
            Error::ExternalTool { output, .. } => assert!(output.contains("not a package")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_remove_reports_missing_entry() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("r.db.tar.xz");
        fs::write(&archive, "").unwrap();
        let repo_remove = script(
            temp.path(),
            "repo-remove",
            "echo \"==> WARNING: Package matching '$2' not found.\" >&2\necho '==> No packages modified, nothing to do.' >&2\nexit 1",
        );
        let config = config(PathBuf::from("repo-add"), repo_remove);
        let indexer = DatabaseIndexer::new(&config, archive);

        let err = indexer.remove_entry("foo").unwrap_err();
        assert!(matches!(err, Error::NotFound { what: "package", .. }));
    }

    #[test]
    fn test_remove_without_archive_is_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(PathBuf::from("repo-add"), PathBuf::from("/nonexistent"));
        let indexer = DatabaseIndexer::new(&config, temp.path().join("r.db.tar.xz"));

        assert!(matches!(
            indexer.remove_entry("foo"),
            Err(Error::NotFound { .. })
        ));
    }
}
