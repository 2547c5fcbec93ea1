//! Package - one workspace member with its manifest and location.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use semver::Version;

use crate::core::manifest::{PackageManifest, MANIFEST_NAME};

/// A workspace package descriptor.
///
/// Created by discovery and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Package {
    /// Unique package name
    name: String,

    /// Absolute path of the package directory
    location: PathBuf,

    /// The parsed manifest
    manifest: PackageManifest,
}

impl Package {
    /// Create a new package from a manifest and its directory.
    pub fn new(manifest: PackageManifest, location: PathBuf) -> Result<Self> {
        let name = manifest
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "package at {} has no `name` in its {}",
                    location.display(),
                    MANIFEST_NAME
                )
            })?;

        Ok(Package {
            name,
            location,
            manifest,
        })
    }

    /// Load a package from its directory.
    pub fn load(location: &Path) -> Result<Self> {
        let manifest = PackageManifest::load(&location.join(MANIFEST_NAME))?;
        Self::new(manifest, location.to_path_buf())
    }

    /// Get the package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the package directory.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Get the manifest.
    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    /// Check if the package is marked private.
    pub fn is_private(&self) -> bool {
        self.manifest.private
    }

    /// Get the package version, if it is valid semver.
    pub fn version(&self) -> Option<Version> {
        self.manifest
            .version
            .as_deref()
            .and_then(|v| Version::parse(v).ok())
    }
}
