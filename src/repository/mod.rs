// src/repository/mod.rs

//! Repository engine
//!
//! This module provides:
//! - The [`Repository`] capability set every package-manager family implements
//! - A registry with one backend per [`System`]
//! - [`RepositoryFacade`], the public entry point used by the CLI and the HTTP API
//! - Hierarchy listing for addresses above the package level

pub mod arch;
mod facade;

pub use facade::RepositoryFacade;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::locator::{Locator, System};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

/// Operations a package-manager family provides on one packages directory.
///
/// Implementations do no locking or existence checks; [`RepositoryFacade`]
/// does both before delegating.
pub trait Repository: Send + Sync {
    fn system(&self) -> System;

    fn locator(&self) -> &Locator;

    /// Indexed package names, in the order the query tool reports them
    fn list_packages(&self) -> Result<Vec<String>>;

    /// Write, sign and index a package file
    fn add_package(&self, file_name: &str, content: &mut dyn Read, force: bool)
    -> Result<AddedPackage>;

    /// Unindex a package and delete its file and signature
    fn remove_package(&self, name: &str) -> Result<RemovedPackage>;

    /// The query tool's record for one package
    fn describe_package(&self, name: &str) -> Result<String>;

    /// The single on-disk file of a package
    fn package_file(&self, name: &str) -> Result<PathBuf>;
}

/// Outcome of a successful add
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedPackage {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub signature: PathBuf,
    /// Hex SHA-256 of the stored file; reported only, never indexed
    pub sha256: String,
}

/// Outcome of a successful removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedPackage {
    pub name: String,
    pub files: Vec<PathBuf>,
}

type OpenFn = fn(Locator, Arc<Config>) -> Box<dyn Repository>;

struct Backend {
    system: System,
    open: OpenFn,
}

/// One entry per implemented system; systems without an entry fail with
/// [`Error::NotImplemented`]
static BACKENDS: &[Backend] = &[Backend {
    system: System::ArchLinux,
    open: arch::open,
}];

/// Instantiate the backend registered for `system`
pub fn open_backend(
    system: System,
    locator: Locator,
    config: Arc<Config>,
) -> Result<Box<dyn Repository>> {
    BACKENDS
        .iter()
        .find(|backend| backend.system == system)
        .map(|backend| (backend.open)(locator, config))
        .ok_or(Error::NotImplemented(system))
}

/// Directories directly under the repositories root
pub fn list_repositories(root: &std::path::Path) -> Result<Vec<String>> {
    Locator::new(root, "")?.list_children()
}

/// Names found at an address and what they are
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// `packages`, or the plural of the level below the address
    pub kind: &'static str,
    pub names: Vec<String>,
}

/// List the packages of a repository address, or the children of any other
pub fn list_address(
    config: Arc<Config>,
    locator: Locator,
    system: Option<System>,
) -> Result<Listing> {
    if locator.names_repository() {
        let facade = RepositoryFacade::open(config, locator, system)?;
        return Ok(Listing {
            kind: "packages",
            names: facade.list_packages()?,
        });
    }

    Ok(Listing {
        kind: locator.children_kind(),
        names: locator.list_children()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archlinux_backend_is_registered() {
        let locator = Locator::new("/srv/http", "arch/stable/core/x86_64").unwrap();
        let backend = open_backend(System::ArchLinux, locator, Arc::new(Config::default())).unwrap();
        assert_eq!(backend.system(), System::ArchLinux);
        assert_eq!(backend.locator().path(), "arch/stable/core/x86_64");
    }

    #[test]
    fn test_debian_backend_is_not_implemented() {
        let locator = Locator::new("/srv/http", "debian/stable/main/amd64").unwrap();
        let result = open_backend(System::Debian, locator, Arc::new(Config::default()));
        assert!(matches!(result, Err(Error::NotImplemented(System::Debian))));
    }

    #[test]
    fn test_list_address_lists_children_above_repository_level() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("arch/stable/core/x86_64")).unwrap();
        std::fs::create_dir_all(temp.path().join("arch/stable/extra")).unwrap();
        let config = Arc::new(Config::new(temp.path()));

        let listing =
            list_address(Arc::clone(&config), Locator::new(temp.path(), "arch/stable").unwrap(), None)
                .unwrap();
        assert_eq!(listing.kind, "databases");
        assert_eq!(listing.names, vec!["core", "extra"]);

        let listing = list_address(config, Locator::new(temp.path(), "").unwrap(), None).unwrap();
        assert_eq!(listing.kind, "repositories");
        assert_eq!(listing.names, vec!["arch"]);
    }

    #[test]
    fn test_list_repositories() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir(temp.path().join("ubuntu")).unwrap();
        std::fs::create_dir(temp.path().join("arch")).unwrap();

        assert_eq!(list_repositories(temp.path()).unwrap(), vec!["arch", "ubuntu"]);
        assert!(matches!(
            list_repositories(&temp.path().join("missing")),
            Err(Error::NotFound { .. })
        ));
    }
}
