//! Per-package build pipeline.
//!
//! Planning happens one package at a time; the bundle and declaration
//! actions it issues run concurrently and are joined before the run ends.

pub mod bundler;
pub mod declarations;
pub mod events;
pub mod executor;
pub mod plan;
pub mod watch;

use std::fmt;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

pub use bundler::{BundleFormat, BundleRequest, Bundler, EsbuildBundler};
pub use declarations::{
    CompilerOptions, DeclarationDiagnostic, DeclarationEmitter, DeclarationRequest, EmitResult,
    TscEmitter,
};
pub use events::{BuildEvent, MessageFormat, Reporter};
pub use executor::{BuildExecutor, BuildReport, PackageReport, PackageState};
pub use plan::{PackagePlan, PlanOutcome, Planner};

/// One of the three actions issued for every planned package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildAction {
    Bundle(BundleFormat),
    Declarations,
}

impl BuildAction {
    /// All actions, in the order they are issued.
    pub const ALL: [BuildAction; 3] = [
        BuildAction::Bundle(BundleFormat::Cjs),
        BuildAction::Bundle(BundleFormat::Esm),
        BuildAction::Declarations,
    ];

    /// Short name used in logs and JSON events.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildAction::Bundle(format) => format.as_str(),
            BuildAction::Declarations => "dts",
        }
    }
}

impl fmt::Display for BuildAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed build action. Fails only the package it belongs to.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum BuildError {
    #[error("{format} bundle failed for `{package}`")]
    #[diagnostic(code(monobuild::build::bundle))]
    Bundle {
        package: String,
        format: BundleFormat,
        message: String,
    },

    #[error("declaration emit failed for `{package}`")]
    #[diagnostic(code(monobuild::build::declarations))]
    Emitter { package: String, message: String },

    #[error("could not run `{program}`")]
    #[diagnostic(code(monobuild::build::tool), help("Install esbuild and typescript in the workspace root"))]
    ToolSpawn {
        package: String,
        program: String,
        message: String,
    },
}

impl BuildError {
    /// The package the failed action belonged to.
    pub fn package(&self) -> &str {
        match self {
            BuildError::Bundle { package, .. }
            | BuildError::Emitter { package, .. }
            | BuildError::ToolSpawn { package, .. } => package,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            BuildError::Bundle { message, .. } | BuildError::Emitter { message, .. } => {
                let mut diag = Diagnostic::error(self.to_string());
                for line in message.lines().filter(|l| !l.trim().is_empty()) {
                    diag = diag.with_context(line.to_string());
                }
                diag.with_suggestion(suggestions::BUILD_FAILED)
            }

            BuildError::ToolSpawn {
                package,
                program,
                message,
            } => Diagnostic::error(format!("could not run `{}` for `{}`", program, package))
                .with_context(message.clone())
                .with_suggestion(suggestions::TOOL_NOT_FOUND)
                .with_suggestion("Set `program` under [bundler] or [declarations] in monobuild.toml"),
        }
    }
}
