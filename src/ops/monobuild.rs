//! Implementation of a `monobuild` run.

use anyhow::Result;

use crate::builder::{
    watch, BuildExecutor, BuildReport, Bundler, DeclarationEmitter, EsbuildBundler, Planner,
    Reporter, TscEmitter,
};
use crate::core::{Package, PackageFilter, PackageGraph, Workspace, WorkspaceError};
use crate::util::config::Config;

/// Options for a build run.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Only build packages matching any of these globs (empty = all)
    pub scope: Vec<String>,

    /// Never build packages matching any of these globs
    pub ignore: Vec<String>,

    /// Keep rebuilding on source changes after the initial run
    pub watch: bool,

    /// Number of parallel jobs
    pub jobs: Option<usize>,

    /// Warn about packages without entry points
    pub warn_empty: bool,
}

/// Select and order the packages of a workspace.
///
/// Every package comes after all selected packages it depends on. Fails
/// before anything is built if the selection contains a dependency cycle.
pub fn sorted_packages<'a>(
    ws: &'a Workspace,
    filter: &PackageFilter,
) -> Result<Vec<&'a Package>, WorkspaceError> {
    let selected = filter.apply(ws.packages());
    tracing::debug!(
        "Selected {} of {} package(s)",
        selected.len(),
        ws.packages().len()
    );

    let graph = PackageGraph::new(&selected);
    let order = graph.topological_order()?;
    for package in &order {
        let deps: Vec<&str> = graph
            .dependencies(package.name())
            .iter()
            .map(|p| p.name())
            .collect();
        if !deps.is_empty() {
            tracing::debug!("{} after {}", package.name(), deps.join(", "));
        }
    }
    Ok(order)
}

/// Build a workspace with esbuild and tsc.
pub fn build(
    ws: &Workspace,
    config: &Config,
    opts: &BuildOptions,
    reporter: &Reporter,
) -> Result<BuildReport> {
    let bundler = EsbuildBundler::locate(&config.bundler, ws.root());
    let emitter = TscEmitter::locate(&config.declarations, ws.root());

    build_with(ws, config, opts, &bundler, &emitter, reporter)
}

/// Build a workspace with the given bundler and declaration emitter.
///
/// In watch mode this only returns if watching fails to start.
pub fn build_with(
    ws: &Workspace,
    config: &Config,
    opts: &BuildOptions,
    bundler: &dyn Bundler,
    emitter: &dyn DeclarationEmitter,
    reporter: &Reporter,
) -> Result<BuildReport> {
    let filter = PackageFilter::new(&opts.scope, &opts.ignore)?;
    let packages = sorted_packages(ws, &filter)?;

    let planner = Planner::new(ws.root(), config);
    let report = BuildExecutor::new(bundler, emitter, reporter)
        .with_jobs(opts.jobs.or(config.build.jobs))
        .with_warn_empty(opts.warn_empty || config.build.warn_empty)
        .run(&packages, &planner)?;

    if opts.watch {
        for failed in report.failed() {
            tracing::warn!("{} failed in the initial build; watching anyway", failed.name);
        }
        watch::watch(report.plans.clone(), &planner, bundler, emitter, reporter)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MessageFormat, PackageState};
    use crate::test_support::{FakeBundler, FakeEmitter, WorkspaceFixture};

    fn names(packages: &[&Package]) -> Vec<String> {
        packages.iter().map(|p| p.name().to_string()).collect()
    }

    fn build_fixture(fixture: &WorkspaceFixture, opts: &BuildOptions) -> Result<BuildReport> {
        let ws = Workspace::load(fixture.root()).unwrap();
        let reporter = Reporter::new(MessageFormat::Human, true);
        build_with(
            &ws,
            &Config::default(),
            opts,
            &FakeBundler::new(),
            &FakeEmitter::new(),
            &reporter,
        )
    }

    #[test]
    fn test_dependencies_come_first() {
        let fixture = WorkspaceFixture::new()
            .package("app", &["ui", "core"])
            .package("ui", &["core"])
            .package("core", &[])
            .package("cli", &["core"]);
        let ws = Workspace::load(fixture.root()).unwrap();

        let order = names(&sorted_packages(&ws, &PackageFilter::default()).unwrap());
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("core") < pos("ui"));
        assert!(pos("ui") < pos("app"));
        assert!(pos("core") < pos("cli"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_scope_and_ignore() {
        let fixture = WorkspaceFixture::new()
            .package("pkg-a", &[])
            .package("pkg-b", &[])
            .package("pkg-c", &[]);
        let ws = Workspace::load(fixture.root()).unwrap();

        let filter = PackageFilter::new(&["pkg-*".to_string()], &["pkg-b".to_string()]).unwrap();
        assert_eq!(names(&sorted_packages(&ws, &filter).unwrap()), vec!["pkg-a", "pkg-c"]);

        let filter = PackageFilter::new(&["pkg-a".to_string()], &["pkg-b".to_string()]).unwrap();
        assert_eq!(names(&sorted_packages(&ws, &filter).unwrap()), vec!["pkg-a"]);
    }

    #[test]
    fn test_cycle_aborts_before_building() {
        let fixture = WorkspaceFixture::new()
            .package("a", &["b"])
            .package("b", &["c"])
            .package("c", &["a"]);

        let err = build_fixture(&fixture, &BuildOptions::default()).unwrap_err();
        match err.downcast_ref::<WorkspaceError>() {
            Some(WorkspaceError::Cycle { packages }) => assert_eq!(packages.len(), 4),
            other => panic!("expected a cycle error, got {:?}", other),
        }
        for name in ["a", "b", "c"] {
            assert!(!fixture.root().join("packages").join(name).join("build").exists());
        }
    }

    #[test]
    fn test_invalid_filter_is_fatal() {
        let fixture = WorkspaceFixture::new().package("a", &[]);
        let opts = BuildOptions {
            scope: vec!["[".to_string()],
            ..Default::default()
        };

        let err = build_fixture(&fixture, &opts).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WorkspaceError>(),
            Some(WorkspaceError::Filter { .. })
        ));
    }

    #[test]
    fn test_private_packages_are_not_built() {
        let fixture = WorkspaceFixture::new().package("a", &[]).package("docs", &[]);
        fixture.write(
            "packages/docs/package.json",
            r#"{ "name": "docs", "private": true }"#,
        );

        let report = build_fixture(&fixture, &BuildOptions::default()).unwrap();
        assert!(report.package("docs").is_none());
        assert_eq!(report.package("a").unwrap().state, PackageState::Done);
    }
}
