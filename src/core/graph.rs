//! Package dependency graph and build ordering.
//!
//! An edge `a -> b` means `a` depends on `b`, so `b` must be built first.
//! Only dependencies on packages inside the graph create edges; everything
//! else is an external dependency installed from the registry.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use semver::{Version, VersionReq};

use crate::core::errors::WorkspaceError;
use crate::core::package::Package;

/// Range prefixes that always point at the local workspace copy.
const LOCAL_PROTOCOLS: &[&str] = &["workspace:", "file:", "link:", "portal:"];

/// Range prefixes that never point at the local workspace copy.
const REMOTE_PROTOCOLS: &[&str] = &["npm:", "git+", "git:", "github:", "http:", "https:"];

/// Dependency graph over a set of workspace packages.
#[derive(Debug)]
pub struct PackageGraph<'a> {
    /// Package graph
    graph: DiGraph<&'a Package, ()>,

    /// Map from package name to node index
    nodes: HashMap<&'a str, NodeIndex>,
}

impl<'a> PackageGraph<'a> {
    /// Build the graph for the given packages.
    pub fn new(packages: &[&'a Package]) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();

        for &package in packages {
            let node = graph.add_node(package);
            nodes.insert(package.name(), node);
        }

        for &package in packages {
            let from = nodes[package.name()];
            for (dep_name, range) in package.manifest().all_dependencies() {
                if dep_name == package.name() {
                    continue;
                }
                let Some(&to) = nodes.get(dep_name) else {
                    continue;
                };
                if !satisfies_local(range, graph[to].version().as_ref()) {
                    tracing::debug!(
                        "`{}` depends on `{}@{}`, which the workspace copy does not satisfy",
                        package.name(),
                        dep_name,
                        range
                    );
                    continue;
                }
                if !graph.contains_edge(from, to) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        PackageGraph { graph, nodes }
    }

    /// Get the local dependencies of a package, sorted by name.
    pub fn dependencies(&self, name: &str) -> Vec<&'a Package> {
        let Some(&node) = self.nodes.get(name) else {
            return Vec::new();
        };
        let mut packages: Vec<_> = self
            .graph
            .neighbors(node)
            .map(|n| self.graph[n])
            .collect();
        packages.sort_by(|a, b| a.name().cmp(b.name()));
        packages
    }

    /// Partition packages into dependency-ordered batches.
    ///
    /// Every package in batch `k` depends only on packages in batches before
    /// `k`. Packages within a batch are sorted by name.
    pub fn batches(&self) -> Result<Vec<Vec<&'a Package>>, WorkspaceError> {
        let mut remaining: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors(n).count()))
            .collect();
        let mut batches = Vec::new();

        while !remaining.is_empty() {
            let mut ready: Vec<NodeIndex> = remaining
                .iter()
                .filter(|&(_, &count)| count == 0)
                .map(|(&n, _)| n)
                .collect();

            if ready.is_empty() {
                let stuck: HashSet<NodeIndex> = remaining.keys().copied().collect();
                return Err(WorkspaceError::Cycle {
                    packages: self.find_cycle(&stuck),
                });
            }

            ready.sort_by(|&a, &b| self.graph[a].name().cmp(self.graph[b].name()));

            for &node in &ready {
                remaining.remove(&node);
                for dependent in self.graph.neighbors_directed(node, Direction::Incoming) {
                    if let Some(count) = remaining.get_mut(&dependent) {
                        *count -= 1;
                    }
                }
            }

            batches.push(ready.into_iter().map(|n| self.graph[n]).collect());
        }

        Ok(batches)
    }

    /// Get packages with dependencies before dependents.
    pub fn topological_order(&self) -> Result<Vec<&'a Package>, WorkspaceError> {
        Ok(self.batches()?.into_iter().flatten().collect())
    }

    /// Find one concrete cycle among the given nodes, as package names with
    /// the first name repeated at the end.
    fn find_cycle(&self, candidates: &HashSet<NodeIndex>) -> Vec<String> {
        let mut components: Vec<Vec<NodeIndex>> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.iter().all(|n| candidates.contains(n)))
            .filter(|scc| scc.len() > 1)
            .collect();

        for scc in &mut components {
            scc.sort_by(|&a, &b| self.graph[a].name().cmp(self.graph[b].name()));
        }
        components.sort_by(|a, b| self.graph[a[0]].name().cmp(self.graph[b[0]].name()));

        let Some(scc) = components.first() else {
            let mut names: Vec<String> = candidates
                .iter()
                .map(|&n| self.graph[n].name().to_string())
                .collect();
            names.sort();
            return names;
        };

        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let start = scc[0];

        // Breadth-first search inside the component for the shortest way back
        // to the start node.
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut closing = None;

        while let Some(node) = queue.pop_front() {
            let mut next: Vec<NodeIndex> = self
                .graph
                .neighbors(node)
                .filter(|n| members.contains(n))
                .collect();
            next.sort_by(|&a, &b| self.graph[a].name().cmp(self.graph[b].name()));

            if next.contains(&start) {
                closing = Some(node);
                break;
            }
            for n in next {
                if n != start && !parent.contains_key(&n) {
                    parent.insert(n, node);
                    queue.push_back(n);
                }
            }
        }

        let mut path = vec![start];
        let mut current = closing.unwrap_or(start);
        let mut tail = Vec::new();
        while current != start {
            tail.push(current);
            current = parent[&current];
        }
        tail.reverse();
        path.extend(tail);
        path.push(start);

        path.into_iter()
            .map(|n| self.graph[n].name().to_string())
            .collect()
    }
}

/// Check whether a dependency range resolves to the local workspace copy.
fn satisfies_local(range: &str, version: Option<&Version>) -> bool {
    let range = range.trim();
    if LOCAL_PROTOCOLS.iter().any(|p| range.starts_with(p)) {
        return true;
    }
    if REMOTE_PROTOCOLS.iter().any(|p| range.starts_with(p)) {
        return false;
    }

    let Some(version) = version else {
        return true;
    };

    let mut alternatives = Vec::new();
    for alternative in range.split("||") {
        match VersionReq::parse(&npm_to_semver(alternative)) {
            Ok(req) => alternatives.push(req),
            // dist-tags and other non-range specifiers resolve locally
            Err(_) => return true,
        }
    }
    alternatives.iter().any(|req| req.matches(version))
}

/// Rewrite one npm range alternative into `semver` comparator syntax.
///
/// npm separates comparators with spaces, supports `a - b` hyphen ranges,
/// and reads a bare version as an exact pin.
fn npm_to_semver(range: &str) -> String {
    let tokens: Vec<&str> = range.split_whitespace().collect();
    if tokens.is_empty() {
        return "*".to_string();
    }
    if let [low, "-", high] = tokens[..] {
        return format!(">={}, <={}", low.trim_start_matches('v'), high.trim_start_matches('v'));
    }

    let mut comparators = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in tokens {
        if token.chars().all(|c| "<>=~^".contains(c)) {
            pending_op = Some(token);
            continue;
        }
        let split = token.find(|c: char| !"<>=~^".contains(c)).unwrap_or(token.len());
        let (op, version) = token.split_at(split);
        let op = match (pending_op.take(), op) {
            (Some(pending), "") => pending,
            (_, op) => op,
        };
        let version = version.trim_start_matches('v');
        let is_wildcard = version.contains(['x', 'X', '*']);
        let op = if op.is_empty() && !is_wildcard { "=" } else { op };
        comparators.push(format!("{}{}", op, version));
    }
    comparators.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::PackageManifest;
    use std::path::PathBuf;

    fn package(name: &str, deps: &[(&str, &str)]) -> Package {
        versioned(name, "1.0.0", deps)
    }

    fn versioned(name: &str, version: &str, deps: &[(&str, &str)]) -> Package {
        let manifest = PackageManifest {
            name: Some(name.to_string()),
            version: Some(version.to_string()),
            dependencies: deps
                .iter()
                .map(|(n, r)| (n.to_string(), r.to_string()))
                .collect(),
            ..Default::default()
        };
        Package::new(manifest, PathBuf::from("/repo/packages").join(name)).unwrap()
    }

    fn names(packages: &[&Package]) -> Vec<String> {
        packages.iter().map(|p| p.name().to_string()).collect()
    }

    #[test]
    fn test_topological_order() {
        let a = package("a", &[("b", "^1.0.0")]);
        let b = package("b", &[("c", "^1.0.0")]);
        let c = package("c", &[]);

        let graph = PackageGraph::new(&[&a, &b, &c]);
        let order = graph.topological_order().unwrap();

        assert_eq!(names(&order), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_batches_group_independent_packages() {
        let app = package("app", &[("ui", "*"), ("util", "*")]);
        let ui = package("ui", &[("util", "*")]);
        let util = package("util", &[]);
        let docs = package("docs", &[]);

        let graph = PackageGraph::new(&[&app, &ui, &util, &docs]);
        let batches = graph.batches().unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(names(&batches[0]), vec!["docs", "util"]);
        assert_eq!(names(&batches[1]), vec!["ui"]);
        assert_eq!(names(&batches[2]), vec!["app"]);
    }

    #[test]
    fn test_every_dependency_precedes_its_dependent() {
        let pkgs = vec![
            package("e", &[("d", "*"), ("a", "*")]),
            package("d", &[("c", "*"), ("b", "*")]),
            package("c", &[("a", "*")]),
            package("b", &[("a", "*")]),
            package("a", &[]),
        ];
        let refs: Vec<&Package> = pkgs.iter().collect();
        let graph = PackageGraph::new(&refs);
        let order = graph.topological_order().unwrap();
        let position = |name: &str| order.iter().position(|p| p.name() == name).unwrap();

        for pkg in &pkgs {
            for dep in graph.dependencies(pkg.name()) {
                assert!(position(dep.name()) < position(pkg.name()));
            }
        }
    }

    #[test]
    fn test_cycle_detected() {
        let a = package("a", &[("b", "*")]);
        let b = package("b", &[("c", "*")]);
        let c = package("c", &[("a", "*")]);
        let d = package("d", &[]);

        let graph = PackageGraph::new(&[&a, &b, &c, &d]);
        let err = graph.batches().unwrap_err();

        match err {
            WorkspaceError::Cycle { packages } => {
                assert_eq!(packages, vec!["a", "b", "c", "a"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_ignored() {
        let a = package("a", &[("a", "*")]);
        let graph = PackageGraph::new(&[&a]);
        assert_eq!(names(&graph.topological_order().unwrap()), vec!["a"]);
    }

    #[test]
    fn test_dependencies_outside_graph_are_external() {
        let a = package("a", &[("react", "^18.0.0"), ("b", "*")]);
        let graph = PackageGraph::new(&[&a]);

        assert!(graph.dependencies("a").is_empty());
        assert_eq!(graph.topological_order().unwrap().len(), 1);
    }

    #[test]
    fn test_unsatisfied_range_is_not_a_local_edge() {
        let a = package("a", &[("b", "^2.0.0")]);
        let b = package("b", &[("a", "^1.0.0")]);

        // b@1.0.0 does not satisfy ^2.0.0, so there is no cycle
        let graph = PackageGraph::new(&[&a, &b]);
        assert!(graph.dependencies("a").is_empty());
        assert_eq!(names(&graph.topological_order().unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_satisfies_local() {
        let v = Version::new(1, 4, 0);
        assert!(satisfies_local("^1.0.0", Some(&v)));
        assert!(!satisfies_local("^2.0.0", Some(&v)));
        assert!(satisfies_local("workspace:*", Some(&v)));
        assert!(satisfies_local("file:../a", Some(&v)));
        assert!(satisfies_local(">=1.0.0 <2.0.0", Some(&v)));
        assert!(!satisfies_local(">=2.0.0 <3.0.0", Some(&v)));
        assert!(satisfies_local(">= 1.0.0 < 2.0.0", Some(&v)));
        assert!(satisfies_local("1.4.0", Some(&v)));
        assert!(!satisfies_local("1.0.0", Some(&v)));
        assert!(satisfies_local("1.x", Some(&v)));
        assert!(satisfies_local("^0.1.0 || ^1.2.0", Some(&v)));
        assert!(!satisfies_local("^0.1.0 || ^2.0.0", Some(&v)));
        assert!(satisfies_local("1.0.0 - 1.5.0", Some(&v)));
        assert!(satisfies_local("latest", Some(&v)));
        assert!(!satisfies_local("npm:other@^1.0.0", Some(&v)));
        assert!(satisfies_local("^9.0.0", None));
    }

    #[test]
    fn test_exact_pin_to_other_version_is_not_a_local_edge() {
        let a = versioned("a", "1.0.0", &[("b", "1.0.0")]);
        let b = versioned("b", "1.2.0", &[("a", "^1.0.0")]);

        let graph = PackageGraph::new(&[&a, &b]);
        assert!(graph.dependencies("a").is_empty());
        assert_eq!(names(&graph.topological_order().unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_space_separated_range_is_not_a_local_edge() {
        let c = versioned("c", "1.0.0", &[("d", ">=2.0.0 <3.0.0")]);
        let d = versioned("d", "1.0.0", &[("c", "^1.0.0")]);

        let graph = PackageGraph::new(&[&c, &d]);
        assert!(graph.dependencies("c").is_empty());
        assert_eq!(names(&graph.topological_order().unwrap()), vec!["c", "d"]);
    }
}
