// src/config.rs

//! Runtime configuration shared by the CLI and the HTTP server

use std::path::PathBuf;
use std::time::Duration;

/// Default repositories root
pub const DEFAULT_ROOT: &str = "/srv/http";

/// Default deadline for a single external tool invocation
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// Default upper bound for an uploaded package
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Paths of the external executables the engine delegates to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub gpg: PathBuf,
    pub repo_add: PathBuf,
    pub repo_remove: PathBuf,
    pub pacman: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            gpg: PathBuf::from("gpg"),
            repo_add: PathBuf::from("repo-add"),
            repo_remove: PathBuf::from("repo-remove"),
            pacman: PathBuf::from("pacman"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding all repositories
    pub root: PathBuf,
    pub tools: ToolPaths,
    /// Key id passed to gpg as `--local-user`; gpg's default key otherwise
    pub signing_key: Option<String>,
    /// `None` lets external tools run unbounded
    pub tool_timeout: Option<Duration>,
    /// Where query environments are created; the system temp dir otherwise
    pub scratch_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.signing_key = Some(key.into());
        self
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            tools: ToolPaths::default(),
            signing_key: None,
            tool_timeout: Some(DEFAULT_TOOL_TIMEOUT),
            scratch_dir: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}
