// src/lock.rs

//! Per-target serialization
//!
//! Every packages directory gets an advisory lock file. Mutations hold it
//! exclusively and reads hold it shared. Locks are `flock`-style, so they
//! serialize threads of one process as well as separate processes, and are
//! released when the guard is dropped.

use crate::error::{Error, Result};
use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lock file name inside each packages directory
pub const LOCK_FILE: &str = ".repod.lock";

#[derive(Debug)]
pub struct TargetLock {
    file: File,
    path: PathBuf,
}

impl TargetLock {
    /// Block until no other reader or writer holds the target
    pub fn exclusive(directory: &Path) -> Result<Self> {
        let (file, path) = open(directory)?;
        debug!("Waiting for exclusive lock on {}", path.display());
        file.lock_exclusive().map_err(Error::io_at(&path))?;
        Ok(Self { file, path })
    }

    /// Block until no writer holds the target
    pub fn shared(directory: &Path) -> Result<Self> {
        let (file, path) = open(directory)?;
        debug!("Waiting for shared lock on {}", path.display());
        file.lock_shared().map_err(Error::io_at(&path))?;
        Ok(Self { file, path })
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

fn open(directory: &Path) -> Result<(File, PathBuf)> {
    let path = directory.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(Error::io_at(&path))?;
    Ok((file, path))
}
