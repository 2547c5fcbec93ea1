//! Build events and their reporting.
//!
//! The planner and executor never print. They produce [`BuildEvent`] values
//! and hand them to a [`Reporter`], which renders them either as log lines
//! (human format) or as one JSON object per line on stdout
//! (`--message-format json`).
//!
//! # Event Types
//!
//! - `build-started`: packages were selected and ordered
//! - `package-skipped`: a package declares its own build script
//! - `shared-files-copied`: README/LICENSE were copied into a package
//! - `package-planned`: a package's entry points and output dir are known
//! - `no-entry-points`: a planned package has nothing to build
//! - `artifact`: a build action finished and wrote files
//! - `declaration-diagnostic`: the declaration emitter reported a problem
//! - `action-failed`: a build action failed
//! - `package-finished`: a package reached a terminal state
//! - `build-finished`: every issued action has completed
//! - `rebuild`: a watch-mode rebuild finished

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::builder::declarations::DeclarationDiagnostic;
use crate::builder::executor::PackageState;
use crate::builder::{BuildAction, BuildError};
use crate::util::diagnostic::{self, Diagnostic};

/// A build event.
///
/// Each event is serialized as a single JSON object per line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum BuildEvent {
    /// Packages were selected and ordered.
    BuildStarted {
        /// Package names in build order
        packages: Vec<String>,
    },

    /// A package declares its own build script and is left alone.
    PackageSkipped {
        package: String,
        build_script: String,
    },

    /// Shared files were copied from the workspace root into a package.
    SharedFilesCopied { package: String, files: Vec<String> },

    /// A package was planned.
    PackagePlanned {
        package: String,
        /// Package root relative to the workspace root
        base_path: String,
        /// Entry points relative to the package root
        entry_points: Vec<String>,
        out_dir: PathBuf,
    },

    /// A planned package has no entry points.
    NoEntryPoints { package: String, src_dir: PathBuf },

    /// A build action finished.
    Artifact {
        package: String,
        action: String,
        filenames: Vec<PathBuf>,
    },

    /// The declaration emitter reported a diagnostic. Never fatal.
    DeclarationDiagnostic {
        package: String,
        #[serde(flatten)]
        diagnostic: DeclarationDiagnostic,
    },

    /// A build action failed.
    ActionFailed {
        package: String,
        action: String,
        message: String,
        #[serde(skip)]
        rendered: Option<Diagnostic>,
    },

    /// A package reached a terminal state.
    PackageFinished { package: String, state: PackageState },

    /// Every issued action has completed.
    BuildFinished {
        success: bool,
        duration_ms: u64,
        built: usize,
        skipped: usize,
        failed: usize,
    },

    /// A watch-mode rebuild finished.
    ///
    /// `declarations` is false when they were skipped or failed.
    Rebuild {
        package: String,
        success: bool,
        declarations: bool,
    },
}

impl BuildEvent {
    /// Create an artifact event.
    pub fn artifact(package: impl Into<String>, action: BuildAction, filenames: Vec<PathBuf>) -> Self {
        BuildEvent::Artifact {
            package: package.into(),
            action: action.to_string(),
            filenames,
        }
    }

    /// Create an action failure event.
    pub fn action_failed(action: BuildAction, error: &BuildError) -> Self {
        BuildEvent::ActionFailed {
            package: error.package().to_string(),
            action: action.to_string(),
            message: error.to_string(),
            rendered: Some(error.to_diagnostic()),
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Output format for build messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MessageFormat {
    /// Log lines on stderr, declaration diagnostics on stdout
    #[default]
    Human,
    /// One JSON event per line on stdout
    Json,
}

/// Renders build events. Shared by every action of a run.
pub struct Reporter {
    format: MessageFormat,
    progress_enabled: bool,
    color: bool,
    progress: Mutex<Option<ProgressBar>>,
}

impl Reporter {
    /// Create a reporter. A progress bar is shown in human format unless
    /// `verbose` is set.
    pub fn new(format: MessageFormat, verbose: bool) -> Self {
        Reporter {
            format,
            progress_enabled: format == MessageFormat::Human && !verbose,
            color: std::io::stderr().is_terminal(),
            progress: Mutex::new(None),
        }
    }

    /// Report one event.
    pub fn report(&self, event: &BuildEvent) {
        match self.format {
            MessageFormat::Json => println!("{}", event.to_json()),
            MessageFormat::Human => self.report_human(event),
        }
        self.track_progress(event);
    }

    fn track_progress(&self, event: &BuildEvent) {
        if !self.progress_enabled {
            return;
        }
        let Ok(mut progress) = self.progress.lock() else {
            return;
        };

        match event {
            BuildEvent::BuildStarted { packages } if packages.len() > 1 => {
                let pb = ProgressBar::new(packages.len() as u64);
                if let Ok(style) =
                    ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                {
                    pb.set_style(style.progress_chars("#>-"));
                }
                *progress = Some(pb);
            }
            BuildEvent::PackageFinished { package, .. } => {
                if let Some(pb) = progress.as_ref() {
                    pb.set_message(package.clone());
                    pb.inc(1);
                }
            }
            BuildEvent::BuildFinished { .. } => {
                if let Some(pb) = progress.take() {
                    pb.finish_and_clear();
                }
            }
            _ => {}
        }
    }

    /// Run `f` with the progress bar hidden.
    fn suspend<F: FnOnce()>(&self, f: F) {
        let pb = self.progress.lock().ok().and_then(|p| p.clone());
        match pb {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }

    fn report_human(&self, event: &BuildEvent) {
        match event {
            BuildEvent::BuildStarted { packages } => {
                tracing::info!("Building {} package(s)", packages.len());
                tracing::debug!("Build order: {}", packages.join(", "));
            }
            BuildEvent::PackageSkipped {
                package,
                build_script,
            } => self.suspend(|| {
                tracing::info!("Skipping {} (custom build script: `{}`)", package, build_script)
            }),
            BuildEvent::SharedFilesCopied { package, files } => self.suspend(|| {
                tracing::info!("Copied {} into {}", files.join(", "), package)
            }),
            BuildEvent::PackagePlanned {
                package,
                base_path,
                entry_points,
                ..
            } => {
                tracing::debug!(
                    "Planned {} ({}) with {} entry point(s)",
                    package,
                    base_path,
                    entry_points.len()
                );
            }
            BuildEvent::NoEntryPoints { package, src_dir } => self.suspend(|| {
                tracing::warn!("{} has no entry points under {}", package, src_dir.display())
            }),
            BuildEvent::Artifact {
                package,
                action,
                filenames,
            } => {
                tracing::debug!("{} {}: {} file(s)", package, action, filenames.len());
            }
            BuildEvent::DeclarationDiagnostic { diagnostic, .. } => {
                self.suspend(|| println!("{}", diagnostic))
            }
            BuildEvent::ActionFailed {
                package,
                action,
                message,
                rendered,
            } => self.suspend(|| match rendered {
                Some(diag) => diagnostic::emit(diag, self.color),
                None => tracing::error!("{} {} failed: {}", package, action, message),
            }),
            BuildEvent::PackageFinished { package, state } => match state {
                PackageState::Done => self.suspend(|| tracing::info!("Built {}", package)),
                PackageState::Failed => self.suspend(|| tracing::error!("{} failed", package)),
                _ => {}
            },
            BuildEvent::BuildFinished {
                success,
                duration_ms,
                built,
                skipped,
                failed,
            } => {
                let secs = *duration_ms as f64 / 1000.0;
                if *success {
                    tracing::info!(
                        "Finished {} package(s) in {:.2}s ({} skipped)",
                        built,
                        secs,
                        skipped
                    );
                } else {
                    tracing::error!(
                        "{} package(s) failed, {} built, {} skipped in {:.2}s",
                        failed,
                        built,
                        skipped,
                        secs
                    );
                }
            }
            BuildEvent::Rebuild {
                package,
                success,
                declarations,
            } => match (success, declarations) {
                (true, _) => tracing::info!("Rebuilt {}", package),
                (false, true) => tracing::warn!("Rebuild of {} failed", package),
                (false, false) => {
                    tracing::warn!("Rebuild of {} failed; declarations not re-emitted", package)
                }
            },
        }
    }
}
