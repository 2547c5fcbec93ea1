//! Type declaration (`.d.ts`) emission.
//!
//! Diagnostics never abort emission: the compiler is always asked to emit,
//! and whatever it reports is handed back for display.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::builder::BuildError;
use crate::util::config::DeclarationsConfig;
use crate::util::fs::relative_path;
use crate::util::process::{find_node_tool, ProcessBuilder};

/// `src/a.ts(3,7): error TS2322: Type 'string' is not assignable ...`
static LOCATED_DIAGNOSTIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<file>.+?)\((?P<line>\d+),(?P<col>\d+)\): (?P<cat>error|warning|message) (?P<code>TS\d+): (?P<msg>.*)$",
    )
    .expect("valid regex")
});

/// `error TS5023: Unknown compiler option '--foo'.`
static GLOBAL_DIAGNOSTIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<cat>error|warning|message) (?P<code>TS\d+): (?P<msg>.*)$")
        .expect("valid regex")
});

/// Compiler settings for declaration-only emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Module format (`commonjs`, `esnext`, ...)
    pub module: String,

    /// Language level (`es2019`, ...)
    pub target: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            module: "commonjs".to_string(),
            target: "es2019".to_string(),
        }
    }
}

impl From<&DeclarationsConfig> for CompilerOptions {
    fn from(config: &DeclarationsConfig) -> Self {
        CompilerOptions {
            module: config.module.clone(),
            target: config.target.clone(),
        }
    }
}

impl CompilerOptions {
    /// Command-line flags for `tsc`.
    pub fn to_args(&self, src_dir: &Path, out_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--declaration",
            "--emitDeclarationOnly",
            "--skipLibCheck",
            "--module",
            self.module.as_str(),
            "--target",
            self.target.as_str(),
            "--downlevelIteration",
            "--esModuleInterop",
            "--experimentalDecorators",
            "--pretty",
            "false",
            "--rootDir",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(src_dir.into());
        args.push("--outDir".into());
        args.push(out_dir.into());
        args
    }
}

/// Inputs for one declaration emission.
#[derive(Debug, Clone)]
pub struct DeclarationRequest {
    /// Package being compiled
    pub package: String,

    /// Absolute entry point paths
    pub entry_points: Vec<PathBuf>,

    /// Source root; the output tree mirrors the tree below it
    pub src_dir: PathBuf,

    /// Output directory
    pub out_dir: PathBuf,
}

impl DeclarationRequest {
    /// The declaration files this request produces.
    pub fn expected_outputs(&self) -> Vec<PathBuf> {
        self.entry_points
            .iter()
            .map(|entry| {
                self.out_dir
                    .join(relative_path(&self.src_dir, entry))
                    .with_extension("d.ts")
            })
            .collect()
    }
}

/// A syntax or type error reported by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclarationDiagnostic {
    /// Source file (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Line number (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Column number (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// `error`, `warning`, or `message`
    pub category: String,
    /// Compiler code such as `TS2322`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Message text
    pub message: String,
}

impl fmt::Display for DeclarationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}", file.display())?;
            if let (Some(line), Some(column)) = (self.line, self.column) {
                write!(f, ":{}:{}", line, column)?;
            }
            write!(f, " - ")?;
        }
        write!(f, "{}", self.category)?;
        if let Some(ref code) = self.code {
            write!(f, " {}", code)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Result of a declaration emission.
#[derive(Debug, Clone, Default)]
pub struct EmitResult {
    /// Declaration files written
    pub files: Vec<PathBuf>,

    /// Diagnostics encountered while emitting
    pub diagnostics: Vec<DeclarationDiagnostic>,
}

/// Emits declaration files for a package's entry points.
pub trait DeclarationEmitter: Send + Sync {
    /// Emit declarations. Diagnostics are returned, not raised.
    fn emit(&self, request: &DeclarationRequest) -> Result<EmitResult, BuildError>;
}

/// Declaration emitter backed by the TypeScript compiler CLI.
#[derive(Debug, Clone)]
pub struct TscEmitter {
    program: PathBuf,
    options: CompilerOptions,
}

impl TscEmitter {
    /// Create an emitter that runs the given tsc executable.
    pub fn new(program: impl Into<PathBuf>, options: CompilerOptions) -> Self {
        TscEmitter {
            program: program.into(),
            options,
        }
    }

    /// Locate tsc for a workspace.
    pub fn locate(config: &DeclarationsConfig, workspace_root: &Path) -> Self {
        let program = find_node_tool("tsc", config.program.as_deref(), workspace_root)
            .unwrap_or_else(|| PathBuf::from("tsc"));
        tracing::debug!("Using tsc at {}", program.display());
        Self::new(program, CompilerOptions::from(config))
    }

    /// Build the tsc command line for a request.
    pub fn command(&self, request: &DeclarationRequest) -> ProcessBuilder {
        ProcessBuilder::new(&self.program)
            .args(self.options.to_args(&request.src_dir, &request.out_dir))
            .args(&request.entry_points)
    }
}

impl DeclarationEmitter for TscEmitter {
    fn emit(&self, request: &DeclarationRequest) -> Result<EmitResult, BuildError> {
        if request.entry_points.is_empty() {
            return Ok(EmitResult::default());
        }

        let cmd = self.command(request);
        let output = cmd.exec().map_err(|e| BuildError::ToolSpawn {
            package: request.package.clone(),
            program: cmd.get_program().display().to_string(),
            message: format!("{:#}", e),
        })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let diagnostics = parse_diagnostics(&text);

        // tsc exits non-zero whenever it reports errors, even though the
        // declarations were still written. Only an exit without any
        // diagnostics means the compiler itself failed.
        if !output.status.success() && diagnostics.is_empty() {
            return Err(BuildError::Emitter {
                package: request.package.clone(),
                message: format!("`{}` exited with {}", cmd.display_command(), output.status),
            });
        }

        let files = request
            .expected_outputs()
            .into_iter()
            .filter(|p| p.exists())
            .collect();

        Ok(EmitResult { files, diagnostics })
    }
}

/// Parse `tsc --pretty false` output into diagnostics.
///
/// Indented lines continue the previous diagnostic's message.
pub fn parse_diagnostics(output: &str) -> Vec<DeclarationDiagnostic> {
    let mut diagnostics: Vec<DeclarationDiagnostic> = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if line.starts_with(char::is_whitespace) {
            if let Some(last) = diagnostics.last_mut() {
                last.message.push('\n');
                last.message.push_str(line.trim());
                continue;
            }
        }

        if let Some(caps) = LOCATED_DIAGNOSTIC.captures(line) {
            diagnostics.push(DeclarationDiagnostic {
                file: Some(PathBuf::from(&caps["file"])),
                line: caps["line"].parse().ok(),
                column: caps["col"].parse().ok(),
                category: caps["cat"].to_string(),
                code: Some(caps["code"].to_string()),
                message: caps["msg"].to_string(),
            });
        } else if let Some(caps) = GLOBAL_DIAGNOSTIC.captures(line) {
            diagnostics.push(DeclarationDiagnostic {
                file: None,
                line: None,
                column: None,
                category: caps["cat"].to_string(),
                code: Some(caps["code"].to_string()),
                message: caps["msg"].to_string(),
            });
        } else {
            diagnostics.push(DeclarationDiagnostic {
                file: None,
                line: None,
                column: None,
                category: "message".to_string(),
                code: None,
                message: line.trim().to_string(),
            });
        }
    }

    diagnostics
}
