//! Watch mode.
//!
//! After the initial run, every built package's source directory is watched.
//! A change rebuilds both bundles of the affected package; declarations are
//! re-emitted only when the ES module rebuild succeeded. The loop runs until
//! the process is terminated.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use notify_debouncer_mini::notify::RecursiveMode;

use crate::builder::bundler::{BundleFormat, Bundler};
use crate::builder::declarations::DeclarationEmitter;
use crate::builder::events::{BuildEvent, Reporter};
use crate::builder::executor::run_action;
use crate::builder::plan::{PackagePlan, Planner};
use crate::builder::BuildAction;

const DEBOUNCE: Duration = Duration::from_millis(200);

/// Watch planned packages and rebuild them on change.
pub fn watch(
    mut plans: Vec<PackagePlan>,
    planner: &Planner<'_>,
    bundler: &dyn Bundler,
    emitter: &dyn DeclarationEmitter,
    reporter: &Reporter,
) -> Result<()> {
    if plans.is_empty() {
        tracing::warn!("Nothing to watch");
        return Ok(());
    }

    let (tx, rx) = mpsc::channel::<DebounceEventResult>();
    let mut debouncer = new_debouncer(DEBOUNCE, tx).context("failed to start file watcher")?;

    for plan in &plans {
        if !plan.src_dir.is_dir() {
            tracing::debug!("Not watching {}: no source directory", plan.name);
            continue;
        }
        debouncer
            .watcher()
            .watch(&plan.src_dir, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", plan.src_dir.display()))?;
    }

    tracing::info!("Watching {} package(s) for changes", plans.len());

    for result in rx {
        match result {
            Ok(events) => {
                let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                for index in affected_plans(&plans, &paths) {
                    rebuild(&mut plans[index], planner, bundler, emitter, reporter);
                }
            }
            Err(e) => tracing::warn!("file watcher error: {:?}", e),
        }
    }

    Ok(())
}

/// Indices of plans whose source directory contains any of `paths`.
pub fn affected_plans(plans: &[PackagePlan], paths: &[PathBuf]) -> Vec<usize> {
    plans
        .iter()
        .enumerate()
        .filter(|(_, plan)| paths.iter().any(|p| p.starts_with(&plan.src_dir)))
        .map(|(index, _)| index)
        .collect()
}

/// Rebuild one package after a source change.
///
/// Returns whether both bundles and the declarations succeeded.
pub fn rebuild(
    plan: &mut PackagePlan,
    planner: &Planner<'_>,
    bundler: &dyn Bundler,
    emitter: &dyn DeclarationEmitter,
    reporter: &Reporter,
) -> bool {
    match planner.entry_points(&plan.location) {
        Ok(entry_points) => plan.entry_points = entry_points,
        Err(e) => tracing::warn!("Keeping previous entry points of {}: {:#}", plan.name, e),
    }

    let plan = &*plan;
    let (cjs, esm) = rayon::join(
        || run_action(BuildAction::Bundle(BundleFormat::Cjs), plan, bundler, emitter, reporter),
        || run_action(BuildAction::Bundle(BundleFormat::Esm), plan, bundler, emitter, reporter),
    );

    let declarations = esm.is_ok()
        && run_action(BuildAction::Declarations, plan, bundler, emitter, reporter).is_ok();

    let success = cjs.is_ok() && declarations;
    reporter.report(&BuildEvent::Rebuild {
        package: plan.name.clone(),
        success,
        declarations,
    });
    success
}
