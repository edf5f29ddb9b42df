// src/error.rs

use crate::locator::System;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Core error types for repod
#[derive(Error, Debug)]
pub enum Error {
    /// No system was given and none could be detected from the address
    #[error("can't detect repository system for '{0}'")]
    UnsupportedSystem(String),

    /// The address itself is malformed
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The system is known but has no backend
    #[error("repository manager for {0} is not implemented")]
    NotImplemented(System),

    /// A package name or upload file name is not usable
    #[error("invalid package name '{name}': {reason}")]
    InvalidPackageName { name: String, reason: String },

    /// A repository level or a package does not exist
    #[error("{what} '{name}' not found")]
    NotFound { what: &'static str, name: String },

    /// Non-force add of a package identity that is already indexed
    #[error("package '{0}' already exists in the repository")]
    DuplicatePackage(String),

    /// A lookup that must resolve to exactly one file did not
    #[error("pattern '{pattern}' matched {} files, expected exactly one{}", .matches.len(), format_matches(.matches))]
    AmbiguousMatch { pattern: String, matches: Vec<String> },

    /// An external tool exited unsuccessfully
    #[error("{program} exited with {status}: {output}")]
    ExternalTool {
        program: String,
        status: String,
        output: String,
    },

    /// An external tool ran past its deadline and was killed
    #[error("{program} did not finish within {timeout:?}")]
    ToolTimeout { program: String, timeout: Duration },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O errors tied to a specific path
    #[error("I/O error at {}: {source}", .path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A multi-step mutation failed after earlier steps already changed disk state.
    /// Index and package files are not updated atomically; nothing is rolled back.
    #[error("{completed}, but the next step failed: {source}")]
    PartialMutation {
        completed: String,
        #[source]
        source: Box<Error>,
    },
}

/// Taxonomy used by transports to pick exit codes and HTTP statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AddressResolution,
    NotImplemented,
    NotFound,
    DuplicatePackage,
    AmbiguousMatch,
    ExternalTool,
    Timeout,
    Io,
}

impl Error {
    pub(crate) fn io_at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::IoAt { path, source }
    }

    pub(crate) fn partial(completed: impl Into<String>, source: Error) -> Error {
        Error::PartialMutation {
            completed: completed.into(),
            source: Box::new(source),
        }
    }

    /// The most specific taxonomy member, looking through partial-mutation wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedSystem(_)
            | Error::InvalidAddress { .. }
            | Error::InvalidPackageName { .. } => ErrorKind::AddressResolution,
            Error::NotImplemented(_) => ErrorKind::NotImplemented,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::DuplicatePackage(_) => ErrorKind::DuplicatePackage,
            Error::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Error::ExternalTool { .. } => ErrorKind::ExternalTool,
            Error::ToolTimeout { .. } => ErrorKind::Timeout,
            Error::Io(_) | Error::IoAt { .. } => ErrorKind::Io,
            Error::PartialMutation { source, .. } => source.kind(),
        }
    }

    /// True when the repository may have been left with index and files out of sync
    pub fn is_partial(&self) -> bool {
        matches!(self, Error::PartialMutation { .. })
    }
}

impl ErrorKind {
    /// Process exit code used by the CLI
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Io => 1,
            ErrorKind::AddressResolution => 2,
            ErrorKind::NotImplemented => 3,
            ErrorKind::NotFound => 4,
            ErrorKind::DuplicatePackage => 5,
            ErrorKind::AmbiguousMatch => 6,
            ErrorKind::Timeout => 7,
            ErrorKind::ExternalTool => 8,
        }
    }
}

fn format_matches(matches: &[String]) -> String {
    if matches.is_empty() {
        String::new()
    } else {
        format!(": {}", matches.join(", "))
    }
}

/// Result type alias using repod's Error type
pub type Result<T> = std::result::Result<T, Error>;
