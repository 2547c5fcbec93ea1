//! Workspace - the monorepo root and its member packages.
//!
//! The root is the nearest ancestor holding a `lerna.json`, or a
//! `package.json` that declares `workspaces`. Member packages are the
//! directories matched by the workspace globs that contain a `package.json`.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use glob::{glob, Pattern};

use crate::core::errors::WorkspaceError;
use crate::core::manifest::{
    LernaConfig, PackageManifest, DEFAULT_PACKAGE_GLOBS, LERNA_CONFIG_NAME, MANIFEST_NAME,
};
use crate::core::package::Package;
use crate::util::fs::{escaped_pattern, normalize_path, relative_path, to_slash};

/// A discovered workspace.
#[derive(Debug)]
pub struct Workspace {
    /// Workspace root directory
    root: PathBuf,

    /// All member packages, sorted by name
    packages: Vec<Package>,
}

impl Workspace {
    /// Discover the workspace containing `start` and list its packages.
    pub fn discover(start: &Path) -> Result<Self, WorkspaceError> {
        let root = find_workspace_root(start)?;
        Self::load(&root)
    }

    /// Load a workspace whose root is already known.
    pub fn load(root: &Path) -> Result<Self, WorkspaceError> {
        let root = normalize_path(root);
        let package_globs = package_globs(&root)?;
        let packages = list_packages(&root, &package_globs)?;

        tracing::debug!(
            "Found {} package(s) in {} using {:?}",
            packages.len(),
            root.display(),
            package_globs
        );

        Ok(Workspace { root, packages })
    }

    /// Get the workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get all member packages, private ones included.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Find a member package by name.
    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name() == name)
    }
}

/// Walk up from `start` to the workspace root.
pub fn find_workspace_root(start: &Path) -> Result<PathBuf, WorkspaceError> {
    let start = normalize_path(start);

    for dir in start.ancestors() {
        if dir.join(LERNA_CONFIG_NAME).is_file() {
            return Ok(dir.to_path_buf());
        }

        let manifest_path = dir.join(MANIFEST_NAME);
        if manifest_path.is_file() {
            let manifest = PackageManifest::load(&manifest_path)
                .map_err(|e| WorkspaceError::discovery(dir, format!("{:#}", e)))?;
            if manifest.workspaces.is_some() {
                return Ok(dir.to_path_buf());
            }
        }
    }

    Err(WorkspaceError::discovery(
        start,
        format!(
            "no `{}` or `{}` with `workspaces` found in this directory or any parent",
            LERNA_CONFIG_NAME, MANIFEST_NAME
        ),
    ))
}

/// Read the package location globs declared by the workspace root.
///
/// `lerna.json` wins over `package.json` `workspaces`; with neither, the
/// conventional `packages/*` layout is assumed.
fn package_globs(root: &Path) -> Result<Vec<String>, WorkspaceError> {
    let lerna_path = root.join(LERNA_CONFIG_NAME);
    if lerna_path.is_file() {
        let lerna = LernaConfig::load(&lerna_path)
            .map_err(|e| WorkspaceError::discovery(root, format!("{:#}", e)))?;
        if let Some(packages) = lerna.packages {
            return Ok(packages);
        }
    }

    let manifest_path = root.join(MANIFEST_NAME);
    if manifest_path.is_file() {
        let manifest = PackageManifest::load(&manifest_path)
            .map_err(|e| WorkspaceError::discovery(root, format!("{:#}", e)))?;
        if let Some(workspaces) = manifest.workspaces {
            return Ok(workspaces.globs().to_vec());
        }
    }

    Ok(DEFAULT_PACKAGE_GLOBS.iter().map(|s| s.to_string()).collect())
}

/// Expand the workspace globs into packages, sorted by name.
///
/// Globs prefixed with `!` exclude matching directories.
fn list_packages(root: &Path, globs: &[String]) -> Result<Vec<Package>, WorkspaceError> {
    let mut excludes = Vec::new();
    for negated in globs.iter().filter_map(|g| g.strip_prefix('!')) {
        let pattern = Pattern::new(negated.trim_end_matches('/')).map_err(|e| {
            WorkspaceError::discovery(root, format!("invalid workspace glob `!{}`: {}", negated, e))
        })?;
        excludes.push(pattern);
    }

    let mut seen = HashSet::new();
    let mut by_name: BTreeMap<String, Package> = BTreeMap::new();

    for pattern in globs.iter().filter(|g| !g.starts_with('!')) {
        let full_pattern = escaped_pattern(root, pattern.trim_end_matches('/'));
        let entries = glob(&full_pattern).map_err(|e| {
            WorkspaceError::discovery(root, format!("invalid workspace glob `{}`: {}", pattern, e))
        })?;

        for entry in entries {
            let dir = match entry {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("glob error: {}", e);
                    continue;
                }
            };

            if !dir.join(MANIFEST_NAME).is_file() || is_in_node_modules(&dir) {
                continue;
            }

            let relative = to_slash(&relative_path(root, &dir));
            if excludes.iter().any(|p| p.matches(&relative)) {
                continue;
            }

            if !seen.insert(normalize_path(&dir)) {
                continue;
            }

            let package = Package::load(&dir)
                .map_err(|e| WorkspaceError::discovery(root, format!("{:#}", e)))?;

            if let Some(existing) = by_name.get(package.name()) {
                return Err(WorkspaceError::discovery(
                    root,
                    format!(
                        "package name `{}` is used by both {} and {}",
                        package.name(),
                        existing.location().display(),
                        package.location().display()
                    ),
                ));
            }

            by_name.insert(package.name().to_string(), package);
        }
    }

    Ok(by_name.into_values().collect())
}

fn is_in_node_modules(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == "node_modules")
}
