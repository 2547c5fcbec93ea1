//! Bundle emission in CommonJS and ES module formats.
//!
//! Both formats write into the same output directory, so they must use
//! disjoint file extensions: `.js` for CommonJS and `.mjs` for ES modules.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::builder::BuildError;
use crate::util::config::BundlerConfig;
use crate::util::fs::relative_path;
use crate::util::process::{find_node_tool, path_flag, ProcessBuilder};

/// JavaScript module format of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleFormat {
    Cjs,
    Esm,
}

impl BundleFormat {
    /// esbuild format name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleFormat::Cjs => "cjs",
            BundleFormat::Esm => "esm",
        }
    }

    /// Extension of emitted module files.
    pub fn extension(&self) -> &'static str {
        match self {
            BundleFormat::Cjs => "js",
            BundleFormat::Esm => "mjs",
        }
    }
}

impl fmt::Display for BundleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs for one bundle invocation.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// Package being bundled
    pub package: String,

    /// Absolute entry point paths
    pub entry_points: Vec<PathBuf>,

    /// Source root; the output tree mirrors the tree below it
    pub src_dir: PathBuf,

    /// Output directory
    pub out_dir: PathBuf,

    /// Module format
    pub format: BundleFormat,
}

impl BundleRequest {
    /// The module and sourcemap files this request produces.
    pub fn expected_outputs(&self) -> Vec<PathBuf> {
        let ext = self.format.extension();
        self.entry_points
            .iter()
            .flat_map(|entry| {
                let module = self
                    .out_dir
                    .join(relative_path(&self.src_dir, entry))
                    .with_extension(ext);
                let map = module.with_extension(format!("{}.map", ext));
                [module, map]
            })
            .collect()
    }
}

/// A bundler turns entry points into bundles of one module format.
pub trait Bundler: Send + Sync {
    /// Bundle the request's entry points, returning the emitted files.
    ///
    /// An empty entry point list succeeds without producing anything.
    fn bundle(&self, request: &BundleRequest) -> Result<Vec<PathBuf>, BuildError>;
}

/// Bundler backed by the `esbuild` command-line tool.
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    program: PathBuf,
    platform: String,
}

impl EsbuildBundler {
    /// Create a bundler that runs the given esbuild executable.
    pub fn new(program: impl Into<PathBuf>, platform: impl Into<String>) -> Self {
        EsbuildBundler {
            program: program.into(),
            platform: platform.into(),
        }
    }

    /// Locate esbuild for a workspace.
    ///
    /// Falls back to the bare program name when nothing is found, so the
    /// failure surfaces on the first package that actually needs bundling.
    pub fn locate(config: &BundlerConfig, workspace_root: &Path) -> Self {
        let program = find_node_tool("esbuild", config.program.as_deref(), workspace_root)
            .unwrap_or_else(|| PathBuf::from("esbuild"));
        tracing::debug!("Using esbuild at {}", program.display());
        Self::new(program, config.platform.clone())
    }

    /// Build the esbuild command line for a request.
    pub fn command(&self, request: &BundleRequest) -> ProcessBuilder {
        let mut cmd = ProcessBuilder::new(&self.program)
            .args(&request.entry_points)
            .arg(path_flag("--outdir=", &request.out_dir))
            .arg(path_flag("--outbase=", &request.src_dir))
            .arg(format!("--format={}", request.format))
            .arg("--sourcemap=external")
            .arg(format!("--platform={}", self.platform))
            .arg("--log-level=warning");

        if request.format == BundleFormat::Esm {
            cmd = cmd.arg("--out-extension:.js=.mjs");
        }

        cmd
    }
}

impl Bundler for EsbuildBundler {
    fn bundle(&self, request: &BundleRequest) -> Result<Vec<PathBuf>, BuildError> {
        if request.entry_points.is_empty() {
            return Ok(Vec::new());
        }

        let cmd = self.command(request);
        let output = cmd.exec().map_err(|e| BuildError::ToolSpawn {
            package: request.package.clone(),
            program: cmd.get_program().display().to_string(),
            message: format!("{:#}", e),
        })?;

        if !output.status.success() {
            return Err(BuildError::Bundle {
                package: request.package.clone(),
                format: request.format,
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let warnings = String::from_utf8_lossy(&output.stderr);
        if !warnings.trim().is_empty() {
            tracing::warn!("esbuild ({} {}):\n{}", request.package, request.format, warnings.trim_end());
        }

        Ok(request.expected_outputs())
    }
}
