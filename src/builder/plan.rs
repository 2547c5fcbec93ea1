//! Per-package build planning.
//!
//! The planner turns a package into a [`PlanOutcome`]. It never logs; the
//! orchestrator decides what to report based on the outcome.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::builder::bundler::{BundleFormat, BundleRequest};
use crate::builder::declarations::DeclarationRequest;
use crate::core::{Package, WorkspaceError};
use crate::util::config::Config;
use crate::util::fs::{copy_if_missing, glob_files, relative_path, to_slash};

/// Result of planning one package.
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    /// The package declares its own build script and is left alone.
    Skipped { package: String, build_script: String },

    /// The package will be bundled and have declarations emitted.
    Planned(PackagePlan),
}

impl PlanOutcome {
    /// Name of the planned package.
    pub fn package(&self) -> &str {
        match self {
            PlanOutcome::Skipped { package, .. } => package,
            PlanOutcome::Planned(plan) => &plan.name,
        }
    }
}

/// Everything needed to build one package.
#[derive(Debug, Clone)]
pub struct PackagePlan {
    /// Package name
    pub name: String,

    /// Package root relative to the workspace root, `/`-separated
    pub base_path: String,

    /// Absolute package root
    pub location: PathBuf,

    /// Absolute source directory
    pub src_dir: PathBuf,

    /// Absolute entry point paths, sorted
    pub entry_points: Vec<PathBuf>,

    /// Absolute output directory
    pub out_dir: PathBuf,

    /// Shared files copied from the workspace root during planning
    pub copied_shared_files: Vec<String>,
}

impl PackagePlan {
    /// Entry points relative to the package root, `/`-separated.
    pub fn relative_entry_points(&self) -> Vec<String> {
        self.entry_points
            .iter()
            .map(|p| to_slash(&relative_path(&self.location, p)))
            .collect()
    }

    /// Bundle request for one module format.
    pub fn bundle_request(&self, format: BundleFormat) -> BundleRequest {
        BundleRequest {
            package: self.name.clone(),
            entry_points: self.entry_points.clone(),
            src_dir: self.src_dir.clone(),
            out_dir: self.out_dir.clone(),
            format,
        }
    }

    /// Declaration emission request.
    pub fn declaration_request(&self) -> DeclarationRequest {
        DeclarationRequest {
            package: self.name.clone(),
            entry_points: self.entry_points.clone(),
            src_dir: self.src_dir.clone(),
            out_dir: self.out_dir.clone(),
        }
    }
}

/// Plans packages of one workspace.
#[derive(Debug, Clone)]
pub struct Planner<'a> {
    root: &'a Path,
    config: &'a Config,
}

impl<'a> Planner<'a> {
    /// Create a planner for a workspace root.
    pub fn new(root: &'a Path, config: &'a Config) -> Self {
        Planner { root, config }
    }

    /// Plan a single package.
    ///
    /// Shared files are copied before entry points are collected. A missing
    /// workspace-root source fails with
    /// [`WorkspaceError::MissingSharedFile`].
    pub fn plan(&self, package: &Package) -> Result<PlanOutcome> {
        if let Some(script) = package.manifest().build_script() {
            return Ok(PlanOutcome::Skipped {
                package: package.name().to_string(),
                build_script: script.to_string(),
            });
        }

        let location = package.location();
        let copied_shared_files = self.copy_shared_files(package)?;

        Ok(PlanOutcome::Planned(PackagePlan {
            name: package.name().to_string(),
            base_path: to_slash(&relative_path(self.root, location)),
            location: location.to_path_buf(),
            src_dir: location.join(&self.config.build.src_dir),
            entry_points: self.entry_points(location)?,
            out_dir: location.join(&self.config.build.out_dir),
            copied_shared_files,
        }))
    }

    /// Collect the entry points below a package root.
    pub fn entry_points(&self, location: &Path) -> Result<Vec<PathBuf>> {
        let files = glob_files(location, &self.config.entry_globs())?;
        Ok(files
            .into_iter()
            .filter(|p| {
                !p.file_name()
                    .map(|n| n.to_string_lossy().ends_with(".d.ts"))
                    .unwrap_or(false)
            })
            .collect())
    }

    fn copy_shared_files(&self, package: &Package) -> Result<Vec<String>> {
        let mut copied = Vec::new();

        for file in &self.config.build.shared_files {
            let dst = package.location().join(file);
            if dst.exists() {
                continue;
            }

            let src = self.root.join(file);
            if !src.is_file() {
                return Err(WorkspaceError::MissingSharedFile {
                    file: file.clone(),
                    root: self.root.to_path_buf(),
                    package: package.name().to_string(),
                }
                .into());
            }

            if copy_if_missing(&src, &dst)? {
                copied.push(file.clone());
            }
        }

        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Workspace;
    use crate::test_support::WorkspaceFixture;

    fn plan_named(fixture: &WorkspaceFixture, name: &str) -> Result<PlanOutcome> {
        let ws = Workspace::load(fixture.root()).unwrap();
        let config = Config::default();
        let planner = Planner::new(ws.root(), &config);
        planner.plan(ws.package(name).unwrap())
    }

    #[test]
    fn test_custom_build_script_is_skipped() {
        let fixture = WorkspaceFixture::new().package("a", &[]);
        fixture.write(
            "packages/a/package.json",
            r#"{ "name": "a", "version": "1.0.0", "scripts": { "build": "webpack" } }"#,
        );

        match plan_named(&fixture, "a").unwrap() {
            PlanOutcome::Skipped { build_script, .. } => assert_eq!(build_script, "webpack"),
            other => panic!("expected skip, got {:?}", other),
        }
        assert!(!fixture.root().join("packages/a/README.md").exists());
    }

    #[test]
    fn test_blank_build_script_is_not_a_skip() {
        let fixture = WorkspaceFixture::new().package("a", &[]);
        fixture.write(
            "packages/a/package.json",
            r#"{ "name": "a", "scripts": { "build": "  " } }"#,
        );

        assert!(matches!(plan_named(&fixture, "a").unwrap(), PlanOutcome::Planned(_)));
    }

    #[test]
    fn test_shared_files_are_copied_byte_identical() {
        let fixture = WorkspaceFixture::new().package("a", &[]);

        let PlanOutcome::Planned(plan) = plan_named(&fixture, "a").unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.copied_shared_files, vec!["README.md", "LICENSE"]);

        for file in ["README.md", "LICENSE"] {
            let original = std::fs::read(fixture.root().join(file)).unwrap();
            let copy = std::fs::read(fixture.root().join("packages/a").join(file)).unwrap();
            assert_eq!(original, copy);
        }

        let PlanOutcome::Planned(again) = plan_named(&fixture, "a").unwrap() else {
            panic!("expected a plan");
        };
        assert!(again.copied_shared_files.is_empty());
    }

    #[test]
    fn test_existing_shared_file_is_kept() {
        let fixture = WorkspaceFixture::new().package("a", &[]);
        fixture.write("packages/a/README.md", "# a\n");

        let PlanOutcome::Planned(plan) = plan_named(&fixture, "a").unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.copied_shared_files, vec!["LICENSE"]);
        let readme = std::fs::read_to_string(fixture.root().join("packages/a/README.md")).unwrap();
        assert_eq!(readme, "# a\n");
    }

    #[test]
    fn test_missing_root_shared_file_is_fatal() {
        let fixture = WorkspaceFixture::new().package("a", &[]);
        std::fs::remove_file(fixture.root().join("LICENSE")).unwrap();

        let err = plan_named(&fixture, "a").unwrap_err();
        let err = err.downcast_ref::<WorkspaceError>().unwrap();
        assert!(matches!(err, WorkspaceError::MissingSharedFile { file, .. } if file == "LICENSE"));
    }

    #[test]
    fn test_entry_points_and_paths() {
        let fixture = WorkspaceFixture::new().package("@acme/a", &[]);
        fixture.write("packages/a/src/nested/b.ts", "export const b = 2;\n");
        fixture.write("packages/a/src/types.d.ts", "declare const x: number;\n");
        fixture.write("packages/a/src/notes.md", "not code\n");

        let PlanOutcome::Planned(plan) = plan_named(&fixture, "@acme/a").unwrap() else {
            panic!("expected a plan");
        };
        assert_eq!(plan.base_path, "packages/a");
        assert_eq!(plan.relative_entry_points(), vec!["src/index.ts", "src/nested/b.ts"]);
        assert!(plan.out_dir.ends_with("packages/a/build"));
        assert_eq!(plan.bundle_request(BundleFormat::Esm).entry_points.len(), 2);
    }

    #[test]
    fn test_empty_source_dir_is_not_an_error() {
        let fixture = WorkspaceFixture::new().package("a", &[]);
        std::fs::remove_dir_all(fixture.root().join("packages/a/src")).unwrap();

        let PlanOutcome::Planned(plan) = plan_named(&fixture, "a").unwrap() else {
            panic!("expected a plan");
        };
        assert!(plan.entry_points.is_empty());
    }
}
