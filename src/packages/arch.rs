// src/packages/arch.rs

//! Arch Linux package file names
//!
//! makepkg names packages `<pkgname>-<pkgver>-<pkgrel>-<arch>.pkg.tar[.<ext>]`.
//! Neither `pkgver`, `pkgrel` nor `arch` may contain a dash, so the name is
//! whatever remains after splitting the last three dash-separated fields.

use crate::error::{Error, Result};

/// Marker separating the package stem from the compression extension
const PKG_TAR: &str = ".pkg.tar";

/// Package compression format, from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Zstd,
    Xz,
    Gzip,
    Bzip2,
    Lz4,
    Lzo,
    Compress,
    Uncompressed,
}

impl CompressionFormat {
    fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "" => Some(CompressionFormat::Uncompressed),
            ".zst" => Some(CompressionFormat::Zstd),
            ".xz" => Some(CompressionFormat::Xz),
            ".gz" => Some(CompressionFormat::Gzip),
            ".bz2" => Some(CompressionFormat::Bzip2),
            ".lz4" => Some(CompressionFormat::Lz4),
            ".lzo" => Some(CompressionFormat::Lzo),
            ".Z" => Some(CompressionFormat::Compress),
            _ => None,
        }
    }
}

/// Fields parsed out of a package file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchPackageFile {
    pub name: String,
    pub pkgver: String,
    pub pkgrel: String,
    pub architecture: String,
    pub compression: CompressionFormat,
}

impl ArchPackageFile {
    /// Parse a file name; `None` if it is not a package file
    pub fn parse(file_name: &str) -> Option<Self> {
        let position = file_name.rfind(PKG_TAR)?;
        let (stem, rest) = file_name.split_at(position);
        let compression = CompressionFormat::from_extension(&rest[PKG_TAR.len()..])?;

        let mut fields = stem.rsplitn(4, '-');
        let architecture = fields.next()?;
        let pkgrel = fields.next()?;
        let pkgver = fields.next()?;
        let name = fields.next()?;

        if [name, pkgver, pkgrel, architecture].iter().any(|f| f.is_empty()) {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            pkgver: pkgver.to_string(),
            pkgrel: pkgrel.to_string(),
            architecture: architecture.to_string(),
            compression,
        })
    }

    /// Parse a file name given for upload, with a reason on failure
    pub fn parse_upload(file_name: &str) -> Result<Self> {
        super::validate_name(file_name)?;
        Self::parse(file_name).ok_or_else(|| Error::InvalidPackageName {
            name: file_name.to_string(),
            reason: "expected <name>-<pkgver>-<pkgrel>-<arch>.pkg.tar[.<ext>]".to_string(),
        })
    }

    /// `pkgver-pkgrel`, the form the index tools print
    pub fn version(&self) -> String {
        format!("{}-{}", self.pkgver, self.pkgrel)
    }

    /// `name-pkgver-pkgrel`, the identity used for duplicate detection
    pub fn identity(&self) -> String {
        format!("{}-{}", self.name, self.version())
    }
}
