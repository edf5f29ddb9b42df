// src/repository/arch/mod.rs

//! pacman repositories
//!
//! Package files live directly in the packages directory next to the
//! `<database>.db.tar.xz` index archive. Additions are written, signed and
//! then indexed; removals are unindexed and then deleted. The index and the
//! files are separate external steps and are never updated atomically, so a
//! failure between steps surfaces as [`Error::PartialMutation`].

mod indexer;
mod query;
mod signer;

pub use indexer::DatabaseIndexer;
pub use query::{QueryEngine, QueryEnvironment};
pub use signer::PackageSigner;

use super::{AddedPackage, RemovedPackage, Repository};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::locator::{Locator, System};
use crate::packages::{self, ArchPackageFile};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Copy buffer for uploads
const COPY_BUFFER_SIZE: usize = 64 * 1024;

pub struct ArchRepository {
    locator: Locator,
    config: Arc<Config>,
}

/// Backend constructor registered for [`System::ArchLinux`]
pub fn open(locator: Locator, config: Arc<Config>) -> Box<dyn Repository> {
    Box::new(ArchRepository { locator, config })
}

impl ArchRepository {
    fn indexer(&self) -> DatabaseIndexer<'_> {
        DatabaseIndexer::new(&self.config, self.locator.index_archive())
    }

    fn query(&self) -> QueryEngine<'_> {
        QueryEngine::new(&self.config, &self.locator)
    }

    /// Stream `content` into `target` through a temp file in the same
    /// directory, returning the hex SHA-256 of what was written
    fn write_package(&self, target: &Path, content: &mut dyn Read) -> Result<String> {
        let directory = self.locator.directory();
        let mut temp = NamedTempFile::new_in(&directory).map_err(Error::io_at(&directory))?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        loop {
            let read = match content.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            };
            hasher.update(&buffer[..read]);
            temp.write_all(&buffer[..read]).map_err(Error::io_at(temp.path()))?;
        }
        temp.flush().map_err(Error::io_at(temp.path()))?;
        publish_permissions(&temp)?;

        temp.persist(target)
            .map_err(|e| Error::io_at(target)(e.error))?;

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Delete files created by an add the index tool rejected
    fn discard(&self, files: &[&Path]) {
        for file in files {
            if let Err(e) = fs::remove_file(file) {
                warn!("Failed to discard {}: {}", file.display(), e);
            }
        }
    }

    /// Delete other files of `name` once the index points at `current`.
    /// repo-add only deletes a superseded file when the version changes.
    fn discard_superseded(&self, name: &str, current: &Path) {
        let found = match packages::find_package_files(&self.locator.directory(), name) {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to look up superseded files of {}: {}", name, e);
                return;
            }
        };
        for stale in found.iter().filter(|path| path.as_path() != current) {
            info!("Removing superseded {}", stale.display());
            self.discard(&[stale.as_path()]);
            let signature = packages::signature_path(stale);
            if signature.exists() {
                self.discard(&[signature.as_path()]);
            }
        }
    }

    /// Refuse to touch the index unless `file` is the version it points at
    fn ensure_indexed(&self, package: &ArchPackageFile, file: &Path) -> Result<()> {
        match self.query().indexed_version(&package.name)? {
            Some(version) if version == package.version() => Ok(()),
            indexed => {
                warn!(
                    "{} is not the indexed version of {} ({})",
                    file.display(),
                    package.name,
                    indexed.as_deref().unwrap_or("not indexed")
                );
                Err(Error::NotFound {
                    what: "indexed package file",
                    name: file
                        .file_name()
                        .map(|f| f.to_string_lossy().into_owned())
                        .unwrap_or_else(|| package.name.clone()),
                })
            }
        }
    }
}

/// Temp files are created owner-only; packages are served to clients
#[cfg(unix)]
fn publish_permissions(temp: &NamedTempFile) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    temp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o644))
        .map_err(Error::io_at(temp.path()))
}

#[cfg(not(unix))]
fn publish_permissions(_temp: &NamedTempFile) -> Result<()> {
    Ok(())
}

impl Repository for ArchRepository {
    fn system(&self) -> System {
        System::ArchLinux
    }

    fn locator(&self) -> &Locator {
        &self.locator
    }

    fn list_packages(&self) -> Result<Vec<String>> {
        self.query().list()
    }

    fn add_package(
        &self,
        file_name: &str,
        content: &mut dyn Read,
        force: bool,
    ) -> Result<AddedPackage> {
        let package = ArchPackageFile::parse_upload(file_name)?;
        let target = self.locator.directory().join(file_name);

        if !force && target.exists() {
            return Err(Error::DuplicatePackage(file_name.to_string()));
        }

        let sha256 = self.write_package(&target, content)?;
        info!("Wrote {} ({})", target.display(), sha256);

        let signature = PackageSigner::new(&self.config)
            .sign(&target)
            .map_err(|e| Error::partial(format!("{} was written", target.display()), e))?;

        match self.indexer().add_entry(&target, &package.identity(), force) {
            Ok(()) => {}
            Err(Error::DuplicatePackage(identity)) => {
                self.discard(&[target.as_path(), signature.as_path()]);
                return Err(Error::DuplicatePackage(identity));
            }
            Err(e) => {
                return Err(Error::partial(
                    format!("{} was written and signed", target.display()),
                    e,
                ));
            }
        }
        self.discard_superseded(&package.name, &target);

        Ok(AddedPackage {
            version: package.version(),
            name: package.name,
            path: target,
            signature,
            sha256,
        })
    }

    fn remove_package(&self, name: &str) -> Result<RemovedPackage> {
        let file = packages::find_single_package_file(&self.locator.directory(), name)?;
        let package = file
            .file_name()
            .and_then(|f| ArchPackageFile::parse(&f.to_string_lossy()));
        let package_name = match &package {
            Some(package) => {
                self.ensure_indexed(package, &file)?;
                package.name.clone()
            }
            None => name.to_string(),
        };

        self.indexer().remove_entry(&package_name)?;

        let completed = format!("index entry for '{}' was removed", package_name);
        fs::remove_file(&file)
            .map_err(|e| Error::partial(completed.clone(), Error::io_at(&file)(e)))?;
        let mut files = vec![file.clone()];

        let signature = packages::signature_path(&file);
        match fs::remove_file(&signature) {
            Ok(()) => files.push(signature),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::partial(completed, Error::io_at(&signature)(e))),
        }

        info!("Removed {} from {}", package_name, self.locator);
        Ok(RemovedPackage {
            name: package_name,
            files,
        })
    }

    fn describe_package(&self, name: &str) -> Result<String> {
        packages::validate_name(name)?;
        let name = ArchPackageFile::parse(name)
            .map(|package| package.name)
            .unwrap_or_else(|| name.to_string());
        self.query().describe(&name)
    }

    fn package_file(&self, name: &str) -> Result<PathBuf> {
        packages::find_single_package_file(&self.locator.directory(), name)
    }
}
