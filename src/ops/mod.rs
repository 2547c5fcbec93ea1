//! High-level operations.
//!
//! This module contains the implementation of a monobuild run.

pub mod monobuild;

pub use monobuild::{build, build_with, sorted_packages, BuildOptions};
