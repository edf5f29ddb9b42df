// src/repository/arch/query.rs

//! Read-only queries through pacman
//!
//! pacman only reads sync databases from its own `DBPath`, so every query
//! builds a throwaway environment: a temp directory whose `sync/<db>.db`
//! symlinks to the real index archive, plus a minimal pacman.conf with a
//! single repository section. The host's pacman configuration is never read.
//! The environment is torn down when it is dropped, whatever the outcome.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::locator::Locator;
use crate::process::Tool;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

/// pacman diagnostics for a target that does not exist
const NOT_FOUND_MARKERS: &[&str] = &["was not found", "target not found"];

/// Ephemeral pacman root for one query
#[derive(Debug)]
pub struct QueryEnvironment {
    dir: TempDir,
    config: NamedTempFile,
}

impl QueryEnvironment {
    pub fn create(scratch: &Path, locator: &Locator) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("repod-query-")
            .tempdir_in(scratch)
            .map_err(Error::io_at(scratch))?;

        let sync = dir.path().join("sync");
        fs::create_dir(&sync).map_err(Error::io_at(&sync))?;

        let link = sync.join(format!("{}.db", locator.database_name()));
        link_index(&locator.index_archive(), &link)?;

        let mut config = tempfile::Builder::new()
            .prefix("repod-pacman-")
            .suffix(".conf")
            .tempfile_in(scratch)
            .map_err(Error::io_at(scratch))?;
        config
            .write_all(render_config(dir.path(), locator).as_bytes())
            .map_err(Error::io_at(config.path()))?;

        debug!(
            "Created query environment {} for {}",
            dir.path().display(),
            locator
        );
        Ok(Self { dir, config })
    }

    pub fn db_path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> &Path {
        self.config.path()
    }
}

impl Drop for QueryEnvironment {
    fn drop(&mut self) {
        debug!("Removing query environment {}", self.dir.path().display());
    }
}

fn render_config(db_path: &Path, locator: &Locator) -> String {
    format!(
        "[options]\n\
         DBPath = {db}/\n\
         CacheDir = {db}/cache/\n\
         LogFile = {db}/pacman.log\n\
         GPGDir = {db}/gnupg/\n\
         HookDir = {db}/hooks/\n\
         Architecture = auto\n\
         SigLevel = Never\n\
         \n\
         [{name}]\n\
         Server = file://{server}\n",
        db = db_path.display(),
        name = locator.database_name(),
        server = locator.directory().display(),
    )
}

#[cfg(unix)]
fn link_index(archive: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(archive, link).map_err(Error::io_at(link))
}

#[cfg(not(unix))]
fn link_index(archive: &Path, link: &Path) -> Result<()> {
    fs::copy(archive, link).map(|_| ()).map_err(Error::io_at(link))
}

pub struct QueryEngine<'a> {
    config: &'a Config,
    locator: &'a Locator,
}

impl<'a> QueryEngine<'a> {
    pub fn new(config: &'a Config, locator: &'a Locator) -> Self {
        Self { config, locator }
    }

    /// Names of all indexed packages, in pacman's order
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.locator.index_archive().is_file() {
            debug!("{} has no index archive yet", self.locator);
            return Ok(Vec::new());
        }

        let database = self.locator.database_name();
        let environment = QueryEnvironment::create(&self.config.scratch_dir(), self.locator)?;
        let output = self.pacman(&environment).arg("-Sl").arg(&database).run()?;

        Ok(parse_list(&output.stdout, &database))
    }

    /// The `pacman -Si` record of exactly one package
    pub fn describe(&self, name: &str) -> Result<String> {
        let not_found = || Error::NotFound {
            what: "package",
            name: name.to_string(),
        };
        if !self.locator.index_archive().is_file() {
            return Err(not_found());
        }

        let database = self.locator.database_name();
        let environment = QueryEnvironment::create(&self.config.scratch_dir(), self.locator)?;
        let program = &self.config.tools.pacman;
        let output = self
            .pacman(&environment)
            .arg("-Si")
            .arg(format!("{database}/{name}"))
            .output()?;

        if !output.success() {
            let text = output.combined().to_lowercase();
            if NOT_FOUND_MARKERS.iter().any(|marker| text.contains(marker)) {
                return Err(not_found());
            }
            return Err(output.into_error(program));
        }

        parse_info(&output.stdout, name).ok_or_else(not_found)
    }

    /// `pkgver-pkgrel` of the indexed entry for `name`, if it has one
    pub fn indexed_version(&self, name: &str) -> Result<Option<String>> {
        match self.describe(name) {
            Ok(record) => Ok(field(&record, "Version").map(str::to_string)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn pacman(&self, environment: &QueryEnvironment) -> Tool {
        Tool::new(&self.config.tools.pacman)
            .arg("--config")
            .arg(environment.config_path())
            .arg("--dbpath")
            .arg(environment.db_path())
            .args(["--color", "never"])
            .env("LC_ALL", "C")
            .timeout(self.config.tool_timeout)
    }
}

/// Parse `pacman -Sl` lines: `<database> <name> <version> [installed]`
fn parse_list(stdout: &str, database: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(db), Some(name)) if db == database => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Pick the `pacman -Si` block whose `Name` field is `name`
fn parse_info(stdout: &str, name: &str) -> Option<String> {
    stdout
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .find(|block| field(block, "Name") == Some(name))
        .map(str::to_string)
}

fn field<'b>(block: &'b str, key: &str) -> Option<&'b str> {
    block.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim() == key).then(|| v.trim())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "Repository      : arch-stable-core-x86_64\n\
Name            : foo\n\
Version         : 1.0-1\n\
Description     : Foo\n\
\n\
Repository      : arch-stable-core-x86_64\n\
Name            : foo-utils\n\
Version         : 2.0-1\n";

    #[test]
    fn test_parse_list() {
        let stdout = "db foo 1.0-1\ndb bar 2.0-1 [installed]\nother baz 1-1\n\n";
        assert_eq!(parse_list(stdout, "db"), vec!["foo", "bar"]);
    }

    #[test]
    fn test_parse_info_selects_exact_name() {
        let block = parse_info(INFO, "foo").unwrap();
        assert!(block.contains("Version         : 1.0-1"));
        assert!(!block.contains("foo-utils"));

        assert!(parse_info(INFO, "foo-utils").unwrap().contains("2.0-1"));
        assert!(parse_info(INFO, "missing").is_none());
    }

    #[test]
    fn test_environment_layout_and_teardown() {
        let scratch = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let locator = Locator::new(root.path(), "arch/stable/core/x86_64").unwrap();
        fs::create_dir_all(locator.directory()).unwrap();
        fs::write(locator.index_archive(), "index").unwrap();

        let environment = QueryEnvironment::create(scratch.path(), &locator).unwrap();
        let link = environment.db_path().join("sync/arch-stable-core-x86_64.db");
        assert_eq!(fs::read_to_string(&link).unwrap(), "index");

        let config = fs::read_to_string(environment.config_path()).unwrap();
        assert!(config.contains("[arch-stable-core-x86_64]"));
        assert!(config.contains("SigLevel = Never"));

        let db_path = environment.db_path().to_path_buf();
        let config_path = environment.config_path().to_path_buf();
        drop(environment);

        assert!(!db_path.exists());
        assert!(!config_path.exists());
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
