//! `package.json` and `lerna.json` views.
//!
//! Only the fields the build pipeline reads are modelled; everything else in
//! the JSON document is ignored.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Package manifest file name.
pub const MANIFEST_NAME: &str = "package.json";

/// Lerna configuration file name.
pub const LERNA_CONFIG_NAME: &str = "lerna.json";

/// Package locations used when neither lerna nor npm workspaces declare any.
pub const DEFAULT_PACKAGE_GLOBS: &[&str] = &["packages/*"];

/// A structured view of a `package.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    /// Package name (required for workspace members)
    #[serde(default)]
    pub name: Option<String>,

    /// Package version
    #[serde(default)]
    pub version: Option<String>,

    /// Private packages are never built
    #[serde(default)]
    pub private: bool,

    /// npm scripts
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,

    /// npm/yarn workspace globs (root manifest only)
    #[serde(default)]
    pub workspaces: Option<WorkspacesField>,
}

/// The `workspaces` field accepts both the npm array form and the yarn
/// object form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WorkspacesField {
    Globs(Vec<String>),
    Config {
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl WorkspacesField {
    /// Get the package globs.
    pub fn globs(&self) -> &[String] {
        match self {
            WorkspacesField::Globs(globs) => globs,
            WorkspacesField::Config { packages } => packages,
        }
    }
}

impl PackageManifest {
    /// Load a manifest from a `package.json` file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("failed to parse manifest: {}", path.display()))
    }

    /// Parse a manifest from a JSON string.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// The custom build command, if one is declared and non-empty.
    pub fn build_script(&self) -> Option<&str> {
        self.scripts
            .get("build")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Iterate over every declared dependency as `(name, range)`.
    ///
    /// Covers runtime, dev, peer, and optional dependencies.
    pub fn all_dependencies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dependencies
            .iter()
            .chain(&self.dev_dependencies)
            .chain(&self.peer_dependencies)
            .chain(&self.optional_dependencies)
            .map(|(name, range)| (name.as_str(), range.as_str()))
    }
}

/// A structured view of a `lerna.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LernaConfig {
    /// Package location globs
    #[serde(default)]
    pub packages: Option<Vec<String>>,
}

impl LernaConfig {
    /// Load lerna configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read lerna config: {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse lerna config: {}", path.display()))
    }
}
