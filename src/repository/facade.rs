// src/repository/facade.rs

use super::{AddedPackage, RemovedPackage, Repository, open_backend};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::locator::{Locator, System};
use crate::lock::TargetLock;
use crate::packages::{self, ArchPackageFile};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Public entry point of the repository engine.
///
/// A facade addresses exactly one packages directory. Every operation
/// validates the address, takes the per-target lock and then delegates to the
/// backend of the resolved [`System`]. Facades are cheap to clone and are
/// never mutated; [`RepositoryFacade::retarget`] returns a new one.
#[derive(Clone)]
pub struct RepositoryFacade {
    config: Arc<Config>,
    repository: Arc<dyn Repository>,
}

impl std::fmt::Debug for RepositoryFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryFacade")
            .field("system", &self.repository.system())
            .field("locator", self.repository.locator())
            .finish()
    }
}

impl RepositoryFacade {
    /// Resolve the system (explicit or detected from the path) and open its backend
    pub fn open(config: Arc<Config>, locator: Locator, system: Option<System>) -> Result<Self> {
        if locator.is_root() {
            return Err(Error::InvalidAddress {
                address: locator.to_string(),
                reason: "no repository path given".to_string(),
            });
        }

        let system = System::resolve(&locator.path(), system)?;
        debug!("Opening {} repository at {}", system, locator);
        let repository = open_backend(system, locator, Arc::clone(&config))?;

        Ok(Self {
            config,
            repository: Arc::from(repository),
        })
    }

    pub fn locator(&self) -> &Locator {
        self.repository.locator()
    }

    pub fn system(&self) -> System {
        self.repository.system()
    }

    /// A facade for another address, keeping this facade's system
    pub fn retarget(&self, locator: Locator) -> Result<Self> {
        Self::open(Arc::clone(&self.config), locator, Some(self.system()))
    }

    pub fn list_packages(&self) -> Result<Vec<String>> {
        self.validate()?;
        let _lock = TargetLock::shared(&self.locator().directory())?;
        self.repository.list_packages()
    }

    pub fn add_package(
        &self,
        file_name: &str,
        content: &mut dyn Read,
        force: bool,
    ) -> Result<AddedPackage> {
        self.validate()?;
        let _lock = TargetLock::exclusive(&self.locator().directory())?;
        let added = self.repository.add_package(file_name, content, force)?;
        info!("Added {} {} to {}", added.name, added.version, self.locator());
        Ok(added)
    }

    /// Replace the package `name` with an upload of another build of it.
    ///
    /// `name` may also be an exact file name. The upload must carry the same
    /// package name; the replacement is a forced add.
    pub fn edit_package(
        &self,
        name: &str,
        file_name: &str,
        content: &mut dyn Read,
    ) -> Result<AddedPackage> {
        packages::validate_name(name)?;
        let addressed = ArchPackageFile::parse(name)
            .map(|package| package.name)
            .unwrap_or_else(|| name.to_string());
        let upload = ArchPackageFile::parse_upload(file_name)?;
        if upload.name != addressed {
            return Err(Error::InvalidPackageName {
                name: file_name.to_string(),
                reason: format!("upload is a build of '{}', not '{}'", upload.name, addressed),
            });
        }
        self.add_package(file_name, content, true)
    }

    pub fn remove_package(&self, name: &str) -> Result<RemovedPackage> {
        self.validate()?;
        let _lock = TargetLock::exclusive(&self.locator().directory())?;
        self.repository.remove_package(name)
    }

    pub fn describe_package(&self, name: &str) -> Result<String> {
        self.validate()?;
        let _lock = TargetLock::shared(&self.locator().directory())?;
        self.repository.describe_package(name)
    }

    /// Path of the single file backing a package
    pub fn fetch_file(&self, name: &str) -> Result<PathBuf> {
        self.validate()?;
        let _lock = TargetLock::shared(&self.locator().directory())?;
        self.repository.package_file(name)
    }

    /// Add an existing package to another address. The source file and its
    /// index entry stay where they are.
    ///
    /// The source is resolved and opened under its shared lock, which is
    /// released before the destination's exclusive lock is taken.
    pub fn copy_package(&self, name: &str, target: Locator, force: bool) -> Result<AddedPackage> {
        let (source, mut file) = {
            self.validate()?;
            let _lock = TargetLock::shared(&self.locator().directory())?;
            let source = self.repository.package_file(name)?;
            let file = File::open(&source).map_err(Error::io_at(&source))?;
            (source, file)
        };
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPackageName {
                name: source.display().to_string(),
                reason: "path has no file name".to_string(),
            })?;

        let destination = self.retarget(target)?;
        info!(
            "Copying {} from {} to {}",
            file_name,
            self.locator(),
            destination.locator()
        );
        destination.add_package(&file_name, &mut file, force)
    }

    /// Copy a package into the same address under another epoch
    pub fn change_epoch(&self, name: &str, epoch: &str, force: bool) -> Result<AddedPackage> {
        let target = self.locator().with_epoch(epoch)?;
        self.copy_package(name, target, force)
    }

    fn validate(&self) -> Result<()> {
        let locator = self.locator();
        locator.ensure_exists()?;
        if !locator.names_repository() {
            return Err(Error::InvalidAddress {
                address: locator.path(),
                reason: "address does not name a package repository".to_string(),
            });
        }
        Ok(())
    }
}
