//! monobuild - a build orchestrator for TypeScript monorepos
//!
//! This crate discovers the packages of a workspace, orders them by their
//! local dependencies, and builds each one into CommonJS and ES module
//! bundles plus type declarations.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Workspace fixtures and fake build tools for unit tests.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{Package, PackageFilter, Workspace, WorkspaceError};
pub use builder::{BuildReport, Reporter};
pub use util::config::Config;
