//! Package selection by `--scope` / `--ignore` globs.

use glob::Pattern;

use crate::core::errors::WorkspaceError;
use crate::core::package::Package;

/// Compiled include/exclude filters over package names.
///
/// A package is selected iff it is not private, matches at least one scope
/// pattern (or no scope is given), and matches no ignore pattern.
#[derive(Debug, Clone, Default)]
pub struct PackageFilter {
    scope: Vec<Pattern>,
    ignore: Vec<Pattern>,
}

impl PackageFilter {
    /// Compile the scope and ignore patterns.
    pub fn new(scope: &[String], ignore: &[String]) -> Result<Self, WorkspaceError> {
        Ok(PackageFilter {
            scope: compile(scope)?,
            ignore: compile(ignore)?,
        })
    }

    /// Check whether a package name passes the filters.
    pub fn matches_name(&self, name: &str) -> bool {
        let in_scope = self.scope.is_empty() || self.scope.iter().any(|p| p.matches(name));
        in_scope && !self.ignore.iter().any(|p| p.matches(name))
    }

    /// Check whether a package is selected.
    pub fn matches(&self, package: &Package) -> bool {
        !package.is_private() && self.matches_name(package.name())
    }

    /// Select the matching packages, preserving their order.
    pub fn apply<'a>(&self, packages: &'a [Package]) -> Vec<&'a Package> {
        packages.iter().filter(|p| self.matches(p)).collect()
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, WorkspaceError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|source| WorkspaceError::Filter {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::PackageManifest;
    use std::path::PathBuf;

    fn package(name: &str, private: bool) -> Package {
        let manifest = PackageManifest {
            name: Some(name.to_string()),
            private,
            ..Default::default()
        };
        Package::new(manifest, PathBuf::from("/repo/packages").join(name)).unwrap()
    }

    #[test]
    fn test_no_filters_selects_all_public() {
        let filter = PackageFilter::new(&[], &[]).unwrap();
        assert!(filter.matches(&package("a", false)));
        assert!(!filter.matches(&package("b", true)));
    }

    #[test]
    fn test_scope_and_ignore() {
        let filter = PackageFilter::new(&["pkg-a".into()], &["pkg-b".into()]).unwrap();
        let packages = vec![
            package("pkg-a", false),
            package("pkg-b", false),
            package("pkg-c", false),
        ];

        let names: Vec<_> = filter.apply(&packages).iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["pkg-a"]);
    }

    #[test]
    fn test_glob_scope_with_ignore_override() {
        let filter = PackageFilter::new(&["@acme/*".into()], &["@acme/*-legacy".into()]).unwrap();

        assert!(filter.matches_name("@acme/core"));
        assert!(!filter.matches_name("@acme/core-legacy"));
        assert!(!filter.matches_name("@other/core"));
    }

    #[test]
    fn test_multiple_scopes_are_a_union() {
        let filter = PackageFilter::new(&["a".into(), "b*".into()], &[]).unwrap();
        assert!(filter.matches_name("a"));
        assert!(filter.matches_name("beta"));
        assert!(!filter.matches_name("c"));
    }

    #[test]
    fn test_malformed_pattern_is_a_filter_error() {
        let err = PackageFilter::new(&["[abc".into()], &[]).unwrap_err();
        match err {
            WorkspaceError::Filter { pattern, .. } => assert_eq!(pattern, "[abc"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
