//! The framework compatibility graph.
//!
//! An edge `A -> B` means "an artifact built for B can serve a consumer
//! running on A". Graphs are built per query over the frameworks involved
//! plus the .NET Standard ladder named by the rules, so unusual or future
//! versions need no hardcoded list.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::dijkstra;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::{Framework, FrameworkFamily};
use crate::resolver::rules::CompatibilityRules;

/// Directed compatibility relation over a set of frameworks.
#[derive(Debug, Clone)]
pub struct CompatibilityGraph {
    graph: DiGraph<Framework, ()>,
    nodes: HashMap<Framework, NodeIndex>,
}

impl CompatibilityGraph {
    /// Build the graph over `frameworks` and the rules' .NET Standard versions.
    pub fn build(rules: &CompatibilityRules, frameworks: impl IntoIterator<Item = Framework>) -> Self {
        let mut all: BTreeSet<Framework> = frameworks.into_iter().collect();
        for version in rules.standard_versions() {
            all.insert(Framework::net_standard(version.major, version.minor));
        }

        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for framework in &all {
            let node = graph.add_node(framework.clone());
            nodes.insert(framework.clone(), node);
        }

        for consumer in &all {
            for artifact in &all {
                if consumer != artifact && direct_edge(rules, consumer, artifact) {
                    graph.add_edge(nodes[consumer], nodes[artifact], ());
                }
            }
        }

        CompatibilityGraph { graph, nodes }
    }

    /// Shortest edge count from `consumer` to every framework it can use,
    /// including itself at distance zero.
    pub fn distances_from(&self, consumer: &Framework) -> BTreeMap<Framework, usize> {
        let Some(&start) = self.nodes.get(consumer) else {
            return BTreeMap::new();
        };

        let costs = dijkstra(&self.graph, start, None, |_| 1usize);
        self.nodes
            .iter()
            .filter_map(|(framework, node)| costs.get(node).map(|d| (framework.clone(), *d)))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Whether an artifact built for `artifact` directly serves `consumer`.
fn direct_edge(rules: &CompatibilityRules, consumer: &Framework, artifact: &Framework) -> bool {
    if !consumer.is_known() || !artifact.is_known() {
        return false;
    }

    if consumer.family() == artifact.family() {
        let Some(platform) = platform_order(consumer.platform(), artifact.platform()) else {
            return false;
        };
        return artifact.version() < consumer.version()
            || (artifact.version() == consumer.version() && platform == Ordering::Less);
    }

    artifact.family() == FrameworkFamily::NetStandard
        && artifact.platform().is_none()
        && rules.max_standard(consumer).as_ref() == Some(artifact.version())
}

/// How an artifact's OS platform relates to a consumer's, or `None` when
/// the artifact cannot serve it.
///
/// Platform-specific artifacts only serve the same platform name at an
/// equal or higher platform version (`windows10.0.19041` serves
/// `windows10.0.22000`, and plain `windows` serves both).
fn platform_order(consumer: Option<&str>, artifact: Option<&str>) -> Option<Ordering> {
    match (consumer, artifact) {
        (None, None) => Some(Ordering::Equal),
        (Some(_), None) => Some(Ordering::Less),
        (None, Some(_)) => None,
        (Some(consumer), Some(artifact)) => {
            let (consumer_name, consumer_version) = split_platform(consumer);
            let (artifact_name, artifact_version) = split_platform(artifact);
            if consumer_name != artifact_name {
                return None;
            }
            match (parse_platform_version(consumer_version), parse_platform_version(artifact_version)) {
                (Some(c), Some(a)) if a <= c => Some(a.cmp(&c)),
                (Some(_), Some(_)) => None,
                _ => (consumer == artifact).then_some(Ordering::Equal),
            }
        }
    }
}

/// `windows10.0.19041` splits into `windows` and `10.0.19041`.
fn split_platform(platform: &str) -> (&str, &str) {
    let at = platform
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(platform.len());
    platform.split_at(at)
}

/// Platform versions may carry up to four parts; a missing one is zero.
fn parse_platform_version(version: &str) -> Option<Vec<u64>> {
    if version.is_empty() {
        return Some(vec![0; 4]);
    }
    let mut parts = version
        .split('.')
        .map(|p| p.parse().ok())
        .collect::<Option<Vec<u64>>>()?;
    if parts.len() > 4 {
        return None;
    }
    parts.resize(4, 0);
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fw(s: &str) -> Framework {
        Framework::parse(s).unwrap()
    }

    fn graph(frameworks: &[&str]) -> CompatibilityGraph {
        CompatibilityGraph::build(
            &CompatibilityRules::default(),
            frameworks.iter().map(|s| fw(s)),
        )
    }

    #[test]
    fn test_same_family_lower_versions_are_one_step() {
        let g = graph(&["net8.0", "net6.0", "netcoreapp3.1"]);
        let d = g.distances_from(&fw("net8.0"));
        assert_eq!(d[&fw("net8.0")], 0);
        assert_eq!(d[&fw("net6.0")], 1);
        assert_eq!(d[&fw("netcoreapp3.1")], 1);
    }

    #[test]
    fn test_higher_versions_unreachable() {
        let g = graph(&["net6.0", "net8.0"]);
        let d = g.distances_from(&fw("net6.0"));
        assert!(!d.contains_key(&fw("net8.0")));
    }

    #[test]
    fn test_standard_ladder() {
        let g = graph(&["net8.0", "netstandard2.0", "netstandard1.3"]);
        let d = g.distances_from(&fw("net8.0"));
        assert_eq!(d[&fw("netstandard2.1")], 1);
        assert_eq!(d[&fw("netstandard2.0")], 2);
        assert_eq!(d[&fw("netstandard1.3")], 2);
    }

    #[test]
    fn test_net_framework_does_not_reach_standard_2_1() {
        let g = graph(&["net48"]);
        let d = g.distances_from(&fw("net48"));
        assert_eq!(d[&fw("netstandard2.0")], 1);
        assert!(!d.contains_key(&fw("netstandard2.1")));
    }

    #[test]
    fn test_platform_specific_edges() {
        let g = graph(&["net8.0-windows", "net8.0", "net8.0-android"]);
        let d = g.distances_from(&fw("net8.0-windows"));
        assert_eq!(d[&fw("net8.0")], 1);
        assert!(!d.contains_key(&fw("net8.0-android")));

        let d = g.distances_from(&fw("net8.0"));
        assert!(!d.contains_key(&fw("net8.0-windows")));
    }

    #[test]
    fn test_versioned_platforms_match_by_name() {
        let g = graph(&[
            "net8.0-windows10.0.19041",
            "net8.0-windows",
            "net8.0-windows10.0.22000",
            "net8.0",
        ]);
        let d = g.distances_from(&fw("net8.0-windows10.0.19041"));
        assert_eq!(d[&fw("net8.0-windows")], 1);
        assert_eq!(d[&fw("net8.0")], 1);
        assert!(!d.contains_key(&fw("net8.0-windows10.0.22000")));

        let d = g.distances_from(&fw("net8.0-windows10.0.22000"));
        assert_eq!(d[&fw("net8.0-windows10.0.19041")], 1);

        let d = g.distances_from(&fw("net8.0-windows"));
        assert!(!d.contains_key(&fw("net8.0-windows10.0.19041")));
    }

    #[test]
    fn test_unknown_frameworks_are_isolated() {
        let g = graph(&["uap10.0", "net8.0"]);
        let d = g.distances_from(&fw("uap10.0"));
        assert_eq!(d.len(), 1);
        assert!(g.distances_from(&fw("net9.0")).is_empty());
    }
}
