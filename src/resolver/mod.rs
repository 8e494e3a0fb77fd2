//! Framework compatibility resolution.
//!
//! Given the framework a consumer runs on and the frameworks a package ships
//! artifacts for, pick the nearest compatible one. The resolver is pure and
//! deterministic - identical inputs always produce identical answers.

pub mod graph;
pub mod rules;

pub use graph::CompatibilityGraph;
pub use rules::CompatibilityRules;

use std::cmp::Reverse;
use std::collections::BTreeSet;

use crate::core::Framework;

/// Picks the nearest compatible framework from a candidate set.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityResolver {
    rules: CompatibilityRules,
}

impl CompatibilityResolver {
    /// Create a resolver with a specific rules table.
    pub fn new(rules: CompatibilityRules) -> Self {
        CompatibilityResolver { rules }
    }

    pub fn rules(&self) -> &CompatibilityRules {
        &self.rules
    }

    /// Select the framework in `available` that best serves `target`.
    ///
    /// An exact match always wins. Otherwise the candidate with the shortest
    /// path in the compatibility graph is chosen; ties prefer the target's own
    /// family, then the highest version. Returns `None` when nothing in
    /// `available` is compatible.
    pub fn select_nearest(&self, target: &Framework, available: &[Framework]) -> Option<Framework> {
        let candidates: BTreeSet<Framework> = available.iter().cloned().collect();
        if candidates.contains(target) {
            return Some(target.clone());
        }

        let graph = CompatibilityGraph::build(
            &self.rules,
            candidates.iter().cloned().chain(std::iter::once(target.clone())),
        );
        let distances = graph.distances_from(target);

        let best = candidates
            .iter()
            .filter_map(|candidate| distances.get(candidate).map(|d| (candidate, *d)))
            .min_by_key(|(candidate, distance)| {
                (
                    *distance,
                    candidate.family() != target.family(),
                    Reverse(candidate.version().clone()),
                    candidate.to_string(),
                )
            })
            .map(|(candidate, _)| candidate.clone());

        match &best {
            Some(found) => tracing::debug!("nearest framework for {}: {}", target, found),
            None => tracing::debug!(
                "no framework compatible with {} among [{}]",
                target,
                candidates
                    .iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }

        best
    }

    /// Whether an artifact built for `artifact` can serve `target` at all.
    pub fn is_compatible(&self, target: &Framework, artifact: &Framework) -> bool {
        self.select_nearest(target, std::slice::from_ref(artifact)).is_some()
    }
}

/// Select the nearest compatible framework using the default rules.
pub fn select_nearest(target: &Framework, available: &[Framework]) -> Option<Framework> {
    CompatibilityResolver::default().select_nearest(target, available)
}
