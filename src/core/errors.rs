//! Fatal workspace errors.
//!
//! Any of these aborts the whole run before (or instead of) further build
//! actions. Per-package build failures live in [`crate::builder::BuildError`].

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::Diagnostic;

/// Error while discovering, filtering, ordering, or preparing workspace packages.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum WorkspaceError {
    #[error("failed to read workspace at {}: {message}", root.display())]
    #[diagnostic(code(monobuild::workspace::discovery))]
    Discovery { root: PathBuf, message: String },

    #[error("cycle detected in package dependency graph")]
    #[diagnostic(
        code(monobuild::workspace::cycle),
        help("Break the cycle by removing or restructuring dependencies")
    )]
    Cycle { packages: Vec<String> },

    #[error("invalid package filter `{pattern}`")]
    #[diagnostic(code(monobuild::workspace::filter))]
    Filter {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("shared file `{file}` is missing from the workspace root")]
    #[diagnostic(code(monobuild::workspace::missing_shared_file))]
    MissingSharedFile {
        file: String,
        root: PathBuf,
        package: String,
    },
}

impl WorkspaceError {
    /// Create a discovery error.
    pub fn discovery(root: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        WorkspaceError::Discovery {
            root: root.into(),
            message: message.into(),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            WorkspaceError::Discovery { root, message } => {
                Diagnostic::error(format!("could not read workspace: {}", message))
                    .with_location(root.clone())
                    .with_suggestion(
                        "Run from inside a workspace with a `lerna.json` or a `package.json` declaring `workspaces`",
                    )
                    .with_suggestion("Pass `--cwd <dir>` to point at the workspace")
            }

            WorkspaceError::Cycle { packages } => {
                Diagnostic::error("cycle detected in package dependency graph")
                    .with_context(format!("cycle: {}", packages.join(" -> ")))
                    .with_suggestion(
                        "Break the cycle by removing or restructuring dependencies",
                    )
            }

            WorkspaceError::Filter { pattern, source } => {
                Diagnostic::error(format!("invalid package filter `{}`", pattern))
                    .with_context(source.to_string())
                    .with_suggestion("Quote glob patterns so the shell does not expand them")
            }

            WorkspaceError::MissingSharedFile {
                file,
                root,
                package,
            } => Diagnostic::error(format!(
                "cannot copy `{}` into `{}`: not found in the workspace root",
                file, package
            ))
            .with_location(root.join(file))
            .with_suggestion(format!("Add `{}` to the workspace root", file))
            .with_suggestion(format!("Add `{}` to `{}` directly", file, package)),
        }
    }
}
