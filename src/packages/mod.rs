// src/packages/mod.rs

//! Package files inside a packages directory
//!
//! Package identity is derived from file names only; package contents are
//! never opened. See [`arch`] for the `name-pkgver-pkgrel-arch.pkg.tar.*`
//! naming scheme and [`find_package_files`] for the matching policy used by
//! destructive operations.

pub mod arch;

pub use arch::{ArchPackageFile, CompressionFormat};

use crate::error::{Error, Result};
use globset::{Glob, GlobMatcher};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix of detached signature sidecars
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Path of the signature sidecar belonging to a package file
pub fn signature_path(package: &Path) -> PathBuf {
    let mut name = package.as_os_str().to_owned();
    name.push(SIGNATURE_SUFFIX);
    PathBuf::from(name)
}

/// Check a package name or file name given by a caller
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.starts_with('.') || name.starts_with('-') {
        Some("name must start with an alphanumeric character")
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '+' | '-' | ':'))
    {
        Some("name contains characters outside [A-Za-z0-9@._+-:]")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidPackageName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Glob pattern used to look up the files of a package name
pub fn package_pattern(name: &str) -> String {
    format!("{name}-*.pkg.tar*")
}

/// Find the on-disk files for a package.
///
/// `name` is either an exact package file name present in `directory`, or a
/// package name. For a package name, candidates are globbed with
/// [`package_pattern`] and then kept only if their parsed package name equals
/// `name` exactly, so `python` does not pick up `python-requests` files.
/// Signature sidecars are never returned.
pub fn find_package_files(directory: &Path, name: &str) -> Result<Vec<PathBuf>> {
    validate_name(name)?;

    if ArchPackageFile::parse(name).is_some() {
        let exact = directory.join(name);
        if exact.is_file() {
            return Ok(vec![exact]);
        }
    }

    let matcher = compile(&package_pattern(name))?;
    let entries = fs::read_dir(directory).map_err(Error::io_at(directory))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(Error::io_at(directory))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !matcher.is_match(&file_name) || file_name.ends_with(SIGNATURE_SUFFIX) {
            continue;
        }
        match ArchPackageFile::parse(&file_name) {
            Some(package) if package.name == name => found.push(entry.path()),
            _ => debug!("Ignoring {} while looking up '{}'", file_name, name),
        }
    }

    found.sort();
    Ok(found)
}

/// Like [`find_package_files`] but requires exactly one match
pub fn find_single_package_file(directory: &Path, name: &str) -> Result<PathBuf> {
    let mut found = find_package_files(directory, name)?;
    if found.len() == 1 {
        return Ok(found.remove(0));
    }

    Err(Error::AmbiguousMatch {
        pattern: package_pattern(name),
        matches: found
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect(),
    })
}

fn compile(pattern: &str) -> Result<GlobMatcher> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| Error::InvalidPackageName {
            name: pattern.to_string(),
            reason: e.to_string(),
        })
}
