//! Build executor.
//!
//! Packages are planned one at a time, in order. Each planned package issues
//! its three actions into a rayon scope without waiting for them, and the
//! scope joins every issued action before [`BuildExecutor::run`] returns. A
//! failed action fails its own package; siblings keep running.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::builder::bundler::Bundler;
use crate::builder::declarations::DeclarationEmitter;
use crate::builder::events::{BuildEvent, Reporter};
use crate::builder::plan::{PackagePlan, PlanOutcome, Planner};
use crate::builder::{BuildAction, BuildError};
use crate::core::Package;

/// Lifecycle of a package within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageState {
    Pending,
    Skipped,
    Planned,
    Building,
    Done,
    Failed,
}

/// Outcome of one package.
#[derive(Debug, Clone)]
pub struct PackageReport {
    pub name: String,
    pub state: PackageState,
    /// Files written by successful actions
    pub artifacts: Vec<PathBuf>,
    /// Messages of failed actions
    pub errors: Vec<String>,
}

impl PackageReport {
    fn new(name: &str) -> Self {
        PackageReport {
            name: name.to_string(),
            state: PackageState::Pending,
            artifacts: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Per-package outcomes, in build order
    pub packages: Vec<PackageReport>,

    /// Plans of every package that was built, in build order
    pub plans: Vec<PackagePlan>,

    /// Wall-clock time of the run
    pub duration: Duration,
}

impl BuildReport {
    /// Whether no package failed.
    pub fn success(&self) -> bool {
        self.packages.iter().all(|p| p.state != PackageState::Failed)
    }

    /// Packages that failed.
    pub fn failed(&self) -> Vec<&PackageReport> {
        self.packages
            .iter()
            .filter(|p| p.state == PackageState::Failed)
            .collect()
    }

    /// Number of packages built successfully.
    pub fn built(&self) -> usize {
        self.count(PackageState::Done)
    }

    /// Number of packages skipped because of a custom build script.
    pub fn skipped(&self) -> usize {
        self.count(PackageState::Skipped)
    }

    /// Look up a package's outcome.
    pub fn package(&self, name: &str) -> Option<&PackageReport> {
        self.packages.iter().find(|p| p.name == name)
    }

    fn count(&self, state: PackageState) -> usize {
        self.packages.iter().filter(|p| p.state == state).count()
    }
}

/// Completion of one action, sent from a worker to the executor.
struct ActionOutcome {
    index: usize,
    result: Result<Vec<PathBuf>, BuildError>,
}

/// Counts outstanding actions of one package so the last one to finish can
/// report the package's terminal state.
struct PackageProgress {
    remaining: AtomicUsize,
    failed: AtomicBool,
}

/// Runs build plans with a bounded worker pool.
pub struct BuildExecutor<'a> {
    bundler: &'a dyn Bundler,
    emitter: &'a dyn DeclarationEmitter,
    reporter: &'a Reporter,
    jobs: Option<usize>,
    warn_empty: bool,
}

impl<'a> BuildExecutor<'a> {
    /// Create a new build executor.
    pub fn new(
        bundler: &'a dyn Bundler,
        emitter: &'a dyn DeclarationEmitter,
        reporter: &'a Reporter,
    ) -> Self {
        BuildExecutor {
            bundler,
            emitter,
            reporter,
            jobs: None,
            warn_empty: false,
        }
    }

    /// Limit the number of concurrently running actions.
    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Warn about planned packages without entry points.
    pub fn with_warn_empty(mut self, warn_empty: bool) -> Self {
        self.warn_empty = warn_empty;
        self
    }

    /// Plan and build packages in the given order.
    ///
    /// Returns an error only for fatal planning failures, after every action
    /// that was already issued has finished. Failed actions are recorded in
    /// the report instead.
    pub fn run(&self, packages: &[&Package], planner: &Planner<'_>) -> Result<BuildReport> {
        let start = Instant::now();
        let pool = thread_pool(self.jobs)?;

        self.reporter.report(&BuildEvent::BuildStarted {
            packages: packages.iter().map(|p| p.name().to_string()).collect(),
        });

        let mut reports: Vec<PackageReport> =
            packages.iter().map(|p| PackageReport::new(p.name())).collect();
        let mut plans = Vec::new();
        let mut fatal = None;
        let (tx, rx) = mpsc::channel::<ActionOutcome>();

        pool.scope(|scope| {
            for (index, package) in packages.iter().enumerate() {
                let outcome = match planner.plan(package) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        reports[index].state = PackageState::Failed;
                        fatal = Some(e.context(format!("failed to plan `{}`", package.name())));
                        break;
                    }
                };

                let plan = match outcome {
                    PlanOutcome::Skipped {
                        package,
                        build_script,
                    } => {
                        reports[index].state = PackageState::Skipped;
                        self.reporter.report(&BuildEvent::PackageSkipped {
                            package: package.clone(),
                            build_script,
                        });
                        self.reporter.report(&BuildEvent::PackageFinished {
                            package,
                            state: PackageState::Skipped,
                        });
                        continue;
                    }
                    PlanOutcome::Planned(plan) => plan,
                };

                reports[index].state = PackageState::Planned;
                self.report_planned(&plan);

                let shared = Arc::new(plan.clone());
                let progress = Arc::new(PackageProgress {
                    remaining: AtomicUsize::new(BuildAction::ALL.len()),
                    failed: AtomicBool::new(false),
                });

                for action in BuildAction::ALL {
                    let plan = Arc::clone(&shared);
                    let progress = Arc::clone(&progress);
                    let tx = tx.clone();
                    let (bundler, emitter, reporter) = (self.bundler, self.emitter, self.reporter);

                    scope.spawn(move |_| {
                        let result = run_action(action, &plan, bundler, emitter, reporter);
                        if result.is_err() {
                            progress.failed.store(true, Ordering::SeqCst);
                        }
                        if progress.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                            let state = if progress.failed.load(Ordering::SeqCst) {
                                PackageState::Failed
                            } else {
                                PackageState::Done
                            };
                            reporter.report(&BuildEvent::PackageFinished {
                                package: plan.name.clone(),
                                state,
                            });
                        }
                        // The receiver outlives the scope.
                        let _ = tx.send(ActionOutcome { index, result });
                    });
                }

                reports[index].state = PackageState::Building;
                plans.push(plan);
            }
        });
        drop(tx);

        for outcome in rx {
            let report = &mut reports[outcome.index];
            match outcome.result {
                Ok(files) => report.artifacts.extend(files),
                Err(e) => {
                    report.errors.push(e.to_string());
                    report.state = PackageState::Failed;
                }
            }
        }
        for report in &mut reports {
            if report.state == PackageState::Building {
                report.state = PackageState::Done;
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        let report = BuildReport {
            packages: reports,
            plans,
            duration: start.elapsed(),
        };
        self.reporter.report(&BuildEvent::BuildFinished {
            success: report.success(),
            duration_ms: report.duration.as_millis() as u64,
            built: report.built(),
            skipped: report.skipped(),
            failed: report.failed().len(),
        });

        Ok(report)
    }

    fn report_planned(&self, plan: &PackagePlan) {
        if !plan.copied_shared_files.is_empty() {
            self.reporter.report(&BuildEvent::SharedFilesCopied {
                package: plan.name.clone(),
                files: plan.copied_shared_files.clone(),
            });
        }

        self.reporter.report(&BuildEvent::PackagePlanned {
            package: plan.name.clone(),
            base_path: plan.base_path.clone(),
            entry_points: plan.relative_entry_points(),
            out_dir: plan.out_dir.clone(),
        });

        if self.warn_empty && plan.entry_points.is_empty() {
            self.reporter.report(&BuildEvent::NoEntryPoints {
                package: plan.name.clone(),
                src_dir: plan.src_dir.clone(),
            });
        }
    }
}

/// Run one action of a plan and report its outcome.
pub(crate) fn run_action(
    action: BuildAction,
    plan: &PackagePlan,
    bundler: &dyn Bundler,
    emitter: &dyn DeclarationEmitter,
    reporter: &Reporter,
) -> Result<Vec<PathBuf>, BuildError> {
    let result = match action {
        BuildAction::Bundle(format) => bundler.bundle(&plan.bundle_request(format)),
        BuildAction::Declarations => emitter.emit(&plan.declaration_request()).map(|emitted| {
            for diagnostic in emitted.diagnostics {
                reporter.report(&BuildEvent::DeclarationDiagnostic {
                    package: plan.name.clone(),
                    diagnostic,
                });
            }
            emitted.files
        }),
    };

    match &result {
        Ok(files) => reporter.report(&BuildEvent::artifact(&plan.name, action, files.clone())),
        Err(e) => reporter.report(&BuildEvent::action_failed(action, e)),
    }

    result
}

fn thread_pool(jobs: Option<usize>) -> Result<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = jobs {
        builder = builder.num_threads(jobs.max(1));
    }
    builder.build().context("failed to create build thread pool")
}
