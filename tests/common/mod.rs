// tests/common/mod.rs

//! Shared fixtures: a repositories root plus shell-script stand-ins for gpg,
//! repo-add, repo-remove and pacman.
//!
//! The fake index archive is a plain text file with one `name version` line
//! per entry. The fake tools print the same diagnostics as the real ones for
//! the cases the engine inspects.

#![allow(dead_code)]

use repod::config::{Config, ToolPaths};
use repod::locator::Locator;
use repod::repository::{AddedPackage, RepositoryFacade};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const REPO: &str = "arch/stable/core/x86_64";

const GPG: &str = r#"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then out="$2"; fi
  shift
done
[ -n "$out" ] || { echo "gpg: no output file" >&2; exit 2; }
echo "signature" > "$out"
"#;

const REPO_ADD: &str = r#"
new=0
remove=0
while [ $# -gt 2 ]; do
  case "$1" in
    --new) new=1 ;;
    --remove) remove=1 ;;
  esac
  shift
done
archive="$1"
package="$2"
base=$(basename "$package")
stem=${base%%.pkg.tar*}
rest=${stem%-*}
rel=${rest##*-}
rest=${rest%-*}
ver=${rest##*-}
name=${rest%-*}
touch "$archive"
if grep -q "^$name " "$archive"; then
  if [ "$new" = 1 ] && grep -qx "$name $ver-$rel" "$archive"; then
    echo "==> WARNING: An entry for '$name-$ver-$rel' already existed"
    exit 0
  fi
  old=$(grep "^$name " "$archive" | cut -d' ' -f2)
  grep -v "^$name " "$archive" > "$archive.tmp"
  mv "$archive.tmp" "$archive"
  if [ "$remove" = 1 ] && [ "$old" != "$ver-$rel" ]; then
    echo "  -> Removing old package file '$name-$old'"
    rm -f "$(dirname "$archive")/$name-$old-"*.pkg.tar*
  fi
fi
echo "$name $ver-$rel" >> "$archive"
echo "==> Adding package '$package'"
"#;

const REPO_REMOVE: &str = r#"
archive="$1"
name="$2"
if ! grep -q "^$name " "$archive" 2>/dev/null; then
  echo "==> WARNING: Package matching '$name' not found."
  echo "==> No packages modified, nothing to do."
  exit 1
fi
grep -v "^$name " "$archive" > "$archive.tmp"
mv "$archive.tmp" "$archive"
echo "==> Removing existing entry '$name'..."
"#;

const PACMAN: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --config) config="$2"; shift 2 ;;
    --dbpath) dbpath="$2"; shift 2 ;;
    --color) shift 2 ;;
    -Sl) mode=list; db="$2"; shift 2 ;;
    -Si) mode=info; target="$2"; shift 2 ;;
    *) shift ;;
  esac
done
if [ "$mode" = info ]; then
  db=${target%%/*}
  name=${target#*/}
fi
grep -q "^\[$db\]" "$config" || { echo "error: database '$db' is not configured" >&2; exit 1; }
sync="$dbpath/sync/$db.db"
[ -f "$sync" ] || { echo "error: database '$db' not found" >&2; exit 1; }
if [ "$mode" = list ]; then
  while read -r pkg version; do
    [ -n "$pkg" ] && echo "$db $pkg $version"
  done < "$sync"
  exit 0
fi
line=$(grep "^$name " "$sync") || { echo "error: package '$name' was not found" >&2; exit 1; }
printf 'Repository      : %s\nName            : %s\nVersion         : %s\n\n' "$db" "$name" "${line#* }"
"#;

/// Write an executable `/bin/sh` script
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub struct TestRoot {
    pub temp: TempDir,
    pub root: PathBuf,
    pub bin: PathBuf,
    pub scratch: PathBuf,
    pub config: Arc<Config>,
}

impl TestRoot {
    /// A root holding the given package directories, with working fake tools
    pub fn new(directories: &[&str]) -> Self {
        Self::with_tools(directories, |_| {})
    }

    /// Like [`TestRoot::new`], letting the caller swap tool paths first
    pub fn with_tools(directories: &[&str], customize: impl FnOnce(&mut ToolPaths)) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("srv");
        let bin = temp.path().join("bin");
        let scratch = temp.path().join("scratch");
        for dir in [&root, &bin, &scratch] {
            fs::create_dir_all(dir).unwrap();
        }
        for directory in directories {
            fs::create_dir_all(root.join(directory)).unwrap();
        }

        let mut tools = ToolPaths {
            gpg: script(&bin, "gpg", GPG),
            repo_add: script(&bin, "repo-add", REPO_ADD),
            repo_remove: script(&bin, "repo-remove", REPO_REMOVE),
            pacman: script(&bin, "pacman", PACMAN),
        };
        customize(&mut tools);

        let config = Config::new(&root)
            .with_tools(tools)
            .with_tool_timeout(Some(Duration::from_secs(30)))
            .with_scratch_dir(&scratch);

        Self {
            temp,
            root,
            bin,
            scratch,
            config: Arc::new(config),
        }
    }

    pub fn locator(&self, path: &str) -> Locator {
        Locator::new(self.root.clone(), path).unwrap()
    }

    pub fn facade(&self, path: &str) -> RepositoryFacade {
        RepositoryFacade::open(Arc::clone(&self.config), self.locator(path), None).unwrap()
    }

    pub fn directory(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// `name version` lines of the fake index archive at `path`
    pub fn index_entries(&self, path: &str) -> Vec<String> {
        let archive = self.locator(path).index_archive();
        fs::read_to_string(archive)
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Visible (non-hidden) files in the packages directory at `path`
    pub fn files(&self, path: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.directory(path))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names
    }

    pub fn scratch_entries(&self) -> usize {
        fs::read_dir(&self.scratch).unwrap().count()
    }
}

/// Add a package with generated content through the facade
pub fn add(facade: &RepositoryFacade, file_name: &str, force: bool) -> repod::Result<AddedPackage> {
    let content = package_content(file_name);
    facade.add_package(file_name, &mut content.as_slice(), force)
}

pub fn package_content(file_name: &str) -> Vec<u8> {
    format!("package payload for {}\n", file_name).into_bytes()
}
