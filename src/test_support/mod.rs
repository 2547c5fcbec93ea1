//! Test utilities for monobuild unit tests.
//!
//! [`WorkspaceFixture`] lays out a throwaway workspace on disk, and
//! [`FakeBundler`] / [`FakeEmitter`] stand in for esbuild and tsc by writing
//! the files the real tools would produce.
//!
//! # Example
//!
//! ```rust,ignore
//! let fixture = WorkspaceFixture::new()
//!     .package("core", &[])
//!     .package("app", &["core"]);
//!
//! let ws = Workspace::load(fixture.root()).unwrap();
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;

use crate::builder::declarations::parse_diagnostics;
use crate::builder::{
    BuildError, BundleFormat, BundleRequest, Bundler, DeclarationEmitter, DeclarationRequest,
    EmitResult,
};

/// Contents of the workspace-root README.md.
pub const ROOT_README: &str = "# Monorepo\n\nShared readme.\n";

/// Contents of the workspace-root LICENSE.
pub const ROOT_LICENSE: &str = "MIT License\n\nCopyright (c) Monorepo authors\n";

/// A workspace in a temporary directory.
///
/// The root declares `workspaces: ["packages/*"]` and carries a README.md
/// and LICENSE.
pub struct WorkspaceFixture {
    dir: TempDir,
}

impl WorkspaceFixture {
    /// Create an empty workspace.
    pub fn new() -> Self {
        let fixture = WorkspaceFixture {
            dir: TempDir::new().expect("failed to create temp dir"),
        };
        fixture.write(
            "package.json",
            r#"{ "name": "root", "private": true, "workspaces": ["packages/*"] }"#,
        );
        fixture.write("README.md", ROOT_README);
        fixture.write("LICENSE", ROOT_LICENSE);
        fixture
    }

    /// Add a package at `packages/<last name segment>` with version 1.0.0,
    /// depending on `deps` with `^1.0.0`, and a single `src/index.ts`.
    pub fn package(self, name: &str, deps: &[&str]) -> Self {
        let dir = name.rsplit('/').next().unwrap_or(name);
        let dependencies: serde_json::Map<String, serde_json::Value> = deps
            .iter()
            .map(|d| (d.to_string(), serde_json::Value::from("^1.0.0")))
            .collect();
        let manifest = serde_json::json!({
            "name": name,
            "version": "1.0.0",
            "dependencies": dependencies,
        });

        self.write(&format!("packages/{}/package.json", dir), &manifest.to_string());
        self.write(
            &format!("packages/{}/src/index.ts", dir),
            &format!("export const name = {:?};\n", name),
        );
        self
    }

    /// Write a file relative to the root, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        fs::write(&path, contents).expect("failed to write fixture file");
    }

    /// Get the workspace root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for WorkspaceFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn write_outputs(outputs: &[PathBuf], banner: &str) -> std::io::Result<()> {
    for output in outputs {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        let name = output.file_name().unwrap_or_default().to_string_lossy();
        fs::write(output, format!("// {} {}\n", banner, name))?;
    }
    Ok(())
}

/// Bundler that writes placeholder bundles.
#[derive(Default)]
pub struct FakeBundler {
    failing: HashSet<String>,
    calls: Mutex<Vec<(String, BundleFormat)>>,
}

impl FakeBundler {
    /// Create a bundler that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every bundle of `package` fail.
    pub fn failing(mut self, package: &str) -> Self {
        self.failing.insert(package.to_string());
        self
    }

    /// Packages and formats bundled so far.
    pub fn calls(&self) -> Vec<(String, BundleFormat)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Bundler for FakeBundler {
    fn bundle(&self, request: &BundleRequest) -> Result<Vec<PathBuf>, BuildError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.package.clone(), request.format));

        if self.failing.contains(&request.package) {
            return Err(BuildError::Bundle {
                package: request.package.clone(),
                format: request.format,
                message: "X [ERROR] Expected \";\" but found \"}\"".to_string(),
            });
        }

        let outputs = request.expected_outputs();
        write_outputs(&outputs, request.format.as_str()).map_err(|e| BuildError::Bundle {
            package: request.package.clone(),
            format: request.format,
            message: e.to_string(),
        })?;
        Ok(outputs)
    }
}

/// Declaration emitter that writes placeholder `.d.ts` files.
#[derive(Default)]
pub struct FakeEmitter {
    failing: HashSet<String>,
    diagnostics: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeEmitter {
    /// Create an emitter that always succeeds without diagnostics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make emission for `package` fail.
    pub fn failing(mut self, package: &str) -> Self {
        self.failing.insert(package.to_string());
        self
    }

    /// Report a raw `tsc` output line with every emission.
    pub fn with_diagnostic(mut self, line: &str) -> Self {
        self.diagnostics.push(line.to_string());
        self
    }

    /// Packages emitted so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl DeclarationEmitter for FakeEmitter {
    fn emit(&self, request: &DeclarationRequest) -> Result<EmitResult, BuildError> {
        self.calls.lock().unwrap().push(request.package.clone());

        if self.failing.contains(&request.package) {
            return Err(BuildError::Emitter {
                package: request.package.clone(),
                message: "tsc exited with signal 9".to_string(),
            });
        }

        let files = request.expected_outputs();
        write_outputs(&files, "dts").map_err(|e| BuildError::Emitter {
            package: request.package.clone(),
            message: e.to_string(),
        })?;

        Ok(EmitResult {
            files,
            diagnostics: parse_diagnostics(&self.diagnostics.join("\n")),
        })
    }
}
