// src/repository/arch/signer.rs

//! Detached package signatures via gpg

use crate::config::Config;
use crate::error::{Error, Result};
use crate::packages::signature_path;
use crate::process::Tool;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct PackageSigner<'a> {
    config: &'a Config,
}

impl<'a> PackageSigner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Write `<package>.sig` next to the package
    pub fn sign(&self, package: &Path) -> Result<PathBuf> {
        let signature = signature_path(package);
        let gpg = &self.config.tools.gpg;

        let mut tool = Tool::new(gpg).args(["--batch", "--yes", "--no-tty"]);
        if let Some(key) = &self.config.signing_key {
            tool = tool.arg("--local-user").arg(key);
        }
        tool.arg("--detach-sign")
            .arg("--output")
            .arg(&signature)
            .arg(package)
            .timeout(self.config.tool_timeout)
            .run()?;

        if !signature.is_file() {
            return Err(Error::ExternalTool {
                program: gpg.display().to_string(),
                status: "exit status: 0".to_string(),
                output: format!("no signature written to {}", signature.display()),
            });
        }

        info!("Signed {}", package.display());
        Ok(signature)
    }
}
