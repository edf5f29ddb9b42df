// src/locator.rs

//! Repository addressing
//!
//! A repository lives at `root/<repo>/<epoch>/<database>/<architecture>`, or at
//! any flattened `root/<path>` that already carries an index archive. A
//! [`Locator`] resolves such an address to the packages directory and to the
//! database name that the index archive inside it is named after.
//!
//! Locators are values. Pointing an operation somewhere else produces a new
//! locator ([`Locator::retarget`], [`Locator::with_epoch`]) and never mutates
//! the one a caller is still reading from.

use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Names of the hierarchical address levels, outermost first
pub const LEVELS: [&str; 4] = ["repository", "epoch", "database", "architecture"];

/// Suffix of the index archive inside a packages directory
pub const INDEX_ARCHIVE_SUFFIX: &str = ".db.tar.xz";

/// Package-manager family a repository belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum System {
    ArchLinux,
    Debian,
}

impl System {
    /// Detect the system from the leading segment of a repository path
    pub fn detect(path: &str) -> Option<Self> {
        let path = path.trim_start_matches('/');
        if path.starts_with("arch") {
            Some(System::ArchLinux)
        } else if path.starts_with("debian") || path.starts_with("ubuntu") {
            Some(System::Debian)
        } else {
            None
        }
    }

    /// An explicit system always wins over detection
    pub fn resolve(path: &str, explicit: Option<Self>) -> Result<Self> {
        match explicit {
            Some(system) => Ok(system),
            None => Self::detect(path).ok_or_else(|| Error::UnsupportedSystem(path.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            System::ArchLinux => "archlinux",
            System::Debian => "debian",
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for System {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "arch" | "archlinux" => Ok(System::ArchLinux),
            "debian" | "ubuntu" => Ok(System::Debian),
            _ => Err(Error::UnsupportedSystem(s.to_string())),
        }
    }
}

/// A resolved repository address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    root: PathBuf,
    segments: Vec<String>,
}

impl Locator {
    /// Parse a slash-separated path relative to the repositories root
    pub fn new(root: impl Into<PathBuf>, path: &str) -> Result<Self> {
        let segments = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| validate_segment(path, segment).map(|_| segment.to_string()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            root: root.into(),
            segments,
        })
    }

    /// Build the full four-level address
    pub fn from_parts(
        root: impl Into<PathBuf>,
        repo: &str,
        epoch: &str,
        database: &str,
        architecture: &str,
    ) -> Result<Self> {
        let parts = [repo, epoch, database, architecture];
        let address = parts.join("/");
        for part in parts {
            if part.is_empty() {
                return Err(Error::InvalidAddress {
                    address,
                    reason: "empty segment".to_string(),
                });
            }
            validate_segment(&address, part)?;
        }

        Ok(Self {
            root: root.into(),
            segments: parts.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The address as a slash-separated path
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Directory holding the package files and the index archive
    pub fn directory(&self) -> PathBuf {
        self.segments
            .iter()
            .fold(self.root.clone(), |dir, segment| dir.join(segment))
    }

    /// Separator-free database name derived only from the path.
    ///
    /// Names the pre-existing index archive, so it must stay stable across releases.
    pub fn database_name(&self) -> String {
        self.segments.join("-")
    }

    pub fn index_archive(&self) -> PathBuf {
        self.directory()
            .join(format!("{}{}", self.database_name(), INDEX_ARCHIVE_SUFFIX))
    }

    /// Whether package operations apply at this address, as opposed to listing children
    pub fn names_repository(&self) -> bool {
        self.segments.len() == LEVELS.len()
            || (!self.segments.is_empty() && self.index_archive().is_file())
    }

    /// A new locator under the same root
    pub fn retarget(&self, path: &str) -> Result<Self> {
        Self::new(self.root.clone(), path)
    }

    /// A new locator that differs only in the epoch segment
    pub fn with_epoch(&self, epoch: &str) -> Result<Self> {
        if self.segments.len() < 2 {
            return Err(Error::InvalidAddress {
                address: self.path(),
                reason: "address has no epoch segment".to_string(),
            });
        }
        if epoch.is_empty() || epoch.contains('/') {
            return Err(Error::InvalidAddress {
                address: epoch.to_string(),
                reason: "epoch must be a single path segment".to_string(),
            });
        }
        validate_segment(epoch, epoch)?;

        let mut segments = self.segments.clone();
        segments[1] = epoch.to_string();
        Ok(Self {
            root: self.root.clone(),
            segments,
        })
    }

    /// Check every level of the address top-down and name the first one missing
    pub fn ensure_exists(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(Error::NotFound {
                what: "repositories root",
                name: self.root.display().to_string(),
            });
        }

        let mut dir = self.root.clone();
        for (depth, segment) in self.segments.iter().enumerate() {
            dir.push(segment);
            if !dir.is_dir() {
                return Err(Error::NotFound {
                    what: level_name(depth),
                    name: segment.clone(),
                });
            }
        }

        Ok(())
    }

    /// Sorted names of the directories one level below this address
    pub fn list_children(&self) -> Result<Vec<String>> {
        self.ensure_exists()?;

        let dir = self.directory();
        let entries = fs::read_dir(&dir).map_err(Error::io_at(&dir))?;

        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Error::io_at(&dir))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            match entry.file_type() {
                Ok(kind) if kind.is_dir() => children.push(name),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io_at(entry.path())(e)),
            }
        }

        children.sort();
        Ok(children)
    }

    /// Plural name of what [`Locator::list_children`] returns at this depth
    pub fn children_kind(&self) -> &'static str {
        match self.segments.len() {
            0 => "repositories",
            1 => "epochs",
            2 => "databases",
            3 => "architectures",
            _ => "paths",
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path())
    }
}

/// Human name of the address level at `depth`
pub fn level_name(depth: usize) -> &'static str {
    LEVELS.get(depth).copied().unwrap_or("path")
}

fn validate_segment(address: &str, segment: &str) -> Result<()> {
    let reason = if segment == "." || segment == ".." {
        Some("relative segments are not allowed")
    } else if segment.starts_with('.') {
        Some("hidden segments are not allowed")
    } else if segment
        .chars()
        .any(|c| c == '\\' || c == '[' || c == ']' || c.is_whitespace() || c.is_control())
    {
        Some("segment contains a forbidden character")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_system() {
        assert_eq!(System::detect("arch-stable/x"), Some(System::ArchLinux));
        assert_eq!(System::detect("/archlinux"), Some(System::ArchLinux));
        assert_eq!(System::detect("ubuntu/focal"), Some(System::Debian));
        assert_eq!(System::detect("debian-main"), Some(System::Debian));
        assert_eq!(System::detect("gentoo"), None);
    }

    #[test]
    fn test_resolve_prefers_explicit_system() {
        assert_eq!(
            System::resolve("gentoo", Some(System::ArchLinux)).unwrap(),
            System::ArchLinux
        );
        assert!(matches!(
            System::resolve("gentoo", None),
            Err(Error::UnsupportedSystem(_))
        ));
    }

    #[test]
    fn test_system_from_str() {
        assert_eq!("arch".parse::<System>().unwrap(), System::ArchLinux);
        assert_eq!("Ubuntu".parse::<System>().unwrap(), System::Debian);
        assert!("rpm".parse::<System>().is_err());
    }

    #[test]
    fn test_database_name_is_separator_free_and_stable() {
        let a = Locator::new("/srv/http", "arch/stable/core/x86_64").unwrap();
        let b = Locator::from_parts("/srv/http", "arch", "stable", "core", "x86_64").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.database_name(), "arch-stable-core-x86_64");
        assert!(!a.database_name().contains('/'));
        assert_eq!(
            a.directory(),
            PathBuf::from("/srv/http/arch/stable/core/x86_64")
        );
        assert_eq!(
            a.index_archive(),
            PathBuf::from("/srv/http/arch/stable/core/x86_64/arch-stable-core-x86_64.db.tar.xz")
        );
    }

    #[test]
    fn test_path_normalizes_slashes() {
        let locator = Locator::new("/srv", "/arch//stable/").unwrap();
        assert_eq!(locator.segments(), ["arch", "stable"]);
        assert_eq!(locator.path(), "arch/stable");
        assert_eq!(locator.to_string(), "/arch/stable");
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(Locator::new("/srv", "arch/../etc").is_err());
        assert!(Locator::new("/srv", "arch/.hidden").is_err());
        assert!(Locator::new("/srv", "arch/with space").is_err());
        assert!(Locator::from_parts("/srv", "arch", "", "core", "x86_64").is_err());
    }

    #[test]
    fn test_with_epoch_returns_new_value() {
        let source = Locator::new("/srv", "arch/testing/core/x86_64").unwrap();
        let target = source.with_epoch("stable").unwrap();

        assert_eq!(source.path(), "arch/testing/core/x86_64");
        assert_eq!(target.path(), "arch/stable/core/x86_64");
        assert!(Locator::new("/srv", "arch").unwrap().with_epoch("stable").is_err());
        assert!(source.with_epoch("a/b").is_err());
    }

    #[test]
    fn test_ensure_exists_names_missing_level() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("arch/stable")).unwrap();

        Locator::new(temp.path(), "arch/stable").unwrap().ensure_exists().unwrap();

        let err = Locator::new(temp.path(), "arch/stable/core/x86_64")
            .unwrap()
            .ensure_exists()
            .unwrap_err();
        match err {
            Error::NotFound { what, name } => {
                assert_eq!(what, "database");
                assert_eq!(name, "core");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_list_children_sorted_dirs_only() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("arch/testing")).unwrap();
        fs::create_dir_all(temp.path().join("arch/stable")).unwrap();
        fs::create_dir_all(temp.path().join("arch/.cache")).unwrap();
        fs::write(temp.path().join("arch/README"), "x").unwrap();

        let locator = Locator::new(temp.path(), "arch").unwrap();
        assert_eq!(locator.list_children().unwrap(), vec!["stable", "testing"]);
        assert_eq!(locator.children_kind(), "epochs");
    }

    #[test]
    fn test_names_repository() {
        let temp = TempDir::new().unwrap();
        let flat = Locator::new(temp.path(), "arch-flat").unwrap();
        fs::create_dir_all(flat.directory()).unwrap();
        assert!(!flat.names_repository());

        fs::write(flat.index_archive(), "").unwrap();
        assert!(flat.names_repository());

        assert!(Locator::new(temp.path(), "a/b/c/d").unwrap().names_repository());
        assert!(!Locator::new(temp.path(), "").unwrap().names_repository());
    }
}
