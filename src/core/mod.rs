//! Core data structures for monobuild.
//!
//! This module contains the workspace model the build pipeline runs on:
//! - Package manifests and descriptors
//! - Workspace discovery
//! - Package filtering and dependency ordering
//! - Fatal workspace errors

pub mod errors;
pub mod filter;
pub mod graph;
pub mod manifest;
pub mod package;
pub mod workspace;

pub use errors::WorkspaceError;
pub use filter::PackageFilter;
pub use graph::PackageGraph;
pub use manifest::{PackageManifest, MANIFEST_NAME};
pub use package::Package;
pub use workspace::{find_workspace_root, Workspace};
