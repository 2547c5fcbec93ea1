//! Configuration file support.
//!
//! Two locations are read:
//! - Global: `<config dir>/monobuild/config.toml` - user-wide defaults
//! - Project: `monobuild.toml` in the workspace root - project overrides
//!
//! Project config takes precedence over global config; command-line flags
//! take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Project configuration file name.
pub const PROJECT_CONFIG_NAME: &str = "monobuild.toml";

/// Monobuild configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pipeline settings
    pub build: BuildConfig,

    /// Bundler settings
    pub bundler: BundlerConfig,

    /// Declaration emitter settings
    pub declarations: DeclarationsConfig,
}

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Source directory inside each package
    pub src_dir: String,

    /// Output directory inside each package
    pub out_dir: String,

    /// Entry point file extensions
    pub extensions: Vec<String>,

    /// Files copied from the workspace root into packages that lack them
    pub shared_files: Vec<String>,

    /// Maximum number of concurrently running build actions (None = auto-detect)
    pub jobs: Option<usize>,

    /// Warn when a package has no entry points
    pub warn_empty: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            src_dir: "src".to_string(),
            out_dir: "build".to_string(),
            extensions: vec!["ts".to_string()],
            shared_files: vec!["README.md".to_string(), "LICENSE".to_string()],
            jobs: None,
            warn_empty: false,
        }
    }
}

/// Bundler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerConfig {
    /// Explicit path to the esbuild executable
    pub program: Option<PathBuf>,

    /// Target platform passed to esbuild
    pub platform: String,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        BundlerConfig {
            program: None,
            platform: "node".to_string(),
        }
    }
}

/// Declaration emitter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclarationsConfig {
    /// Explicit path to the tsc executable
    pub program: Option<PathBuf>,

    /// Module format for the emitted declarations
    pub module: String,

    /// Language level
    pub target: String,
}

impl Default for DeclarationsConfig {
    fn default() -> Self {
        DeclarationsConfig {
            program: None,
            module: "commonjs".to_string(),
            target: "es2019".to_string(),
        }
    }
}

/// A partially specified config file. Only keys present in the file override
/// lower-precedence values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    build: BuildLayer,
    bundler: BundlerLayer,
    declarations: DeclarationsLayer,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct BuildLayer {
    src_dir: Option<String>,
    out_dir: Option<String>,
    extensions: Option<Vec<String>>,
    shared_files: Option<Vec<String>>,
    jobs: Option<usize>,
    warn_empty: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct BundlerLayer {
    program: Option<PathBuf>,
    platform: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct DeclarationsLayer {
    program: Option<PathBuf>,
    module: Option<String>,
    target: Option<String>,
}

impl ConfigLayer {
    fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }
}

impl Config {
    /// Load configuration from a single file.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.apply(ConfigLayer::load(path)?);
        Ok(config)
    }

    fn apply(&mut self, layer: ConfigLayer) {
        let build = layer.build;
        if let Some(v) = build.src_dir {
            self.build.src_dir = v;
        }
        if let Some(v) = build.out_dir {
            self.build.out_dir = v;
        }
        if let Some(v) = build.extensions {
            self.build.extensions = v;
        }
        if let Some(v) = build.shared_files {
            self.build.shared_files = v;
        }
        if build.jobs.is_some() {
            self.build.jobs = build.jobs;
        }
        if let Some(v) = build.warn_empty {
            self.build.warn_empty = v;
        }

        if layer.bundler.program.is_some() {
            self.bundler.program = layer.bundler.program;
        }
        if let Some(v) = layer.bundler.platform {
            self.bundler.platform = v;
        }

        let declarations = layer.declarations;
        if declarations.program.is_some() {
            self.declarations.program = declarations.program;
        }
        if let Some(v) = declarations.module {
            self.declarations.module = v;
        }
        if let Some(v) = declarations.target {
            self.declarations.target = v;
        }
    }

    /// Glob patterns (relative to a package) that select entry points.
    pub fn entry_globs(&self) -> Vec<String> {
        self.build
            .extensions
            .iter()
            .map(|ext| format!("{}/**/*.{}", self.build.src_dir, ext.trim_start_matches('.')))
            .collect()
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (`monobuild.toml`)
/// 2. Global config
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.apply(ConfigLayer::load_or_default(global_path));
    }

    config.apply(ConfigLayer::load_or_default(project_path));

    config
}

/// Get the global config path.
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "monobuild").map(|d| d.config_dir().join("config.toml"))
}

/// Get the project config path.
pub fn project_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(PROJECT_CONFIG_NAME)
}
