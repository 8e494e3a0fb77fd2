//! Asset group selection.

use crate::core::{AssetGroup, AssetKind, Framework};
use crate::resolver::CompatibilityResolver;
use crate::util::config::DEFAULT_TARGET_FRAMEWORK;

/// Chooses which asset group of a package to inspect.
///
/// Surface groups (`ref/`) are always preferred over implementation groups
/// (`lib/`): they carry exactly the public contract and nothing else.
#[derive(Debug, Clone)]
pub struct ArtifactSelector {
    target: Framework,
    resolver: CompatibilityResolver,
}

impl Default for ArtifactSelector {
    fn default() -> Self {
        ArtifactSelector {
            target: default_target(),
            resolver: CompatibilityResolver::default(),
        }
    }
}

impl ArtifactSelector {
    /// `target` is the ambient framework used when the caller names none.
    pub fn new(target: Framework, resolver: CompatibilityResolver) -> Self {
        ArtifactSelector { target, resolver }
    }

    pub fn target(&self) -> &Framework {
        &self.target
    }

    /// Pick a group.
    ///
    /// With an explicit framework only an exact match is accepted. Otherwise
    /// the nearest compatible framework to the ambient target is chosen,
    /// looking at surface groups first.
    pub fn select_group<'g>(
        &self,
        groups: &'g [AssetGroup],
        explicit: Option<&Framework>,
    ) -> Option<&'g AssetGroup> {
        let selected = match explicit {
            Some(framework) => [AssetKind::Surface, AssetKind::Implementation]
                .into_iter()
                .find_map(|kind| {
                    groups
                        .iter()
                        .find(|g| g.kind == kind && &g.framework == framework)
                }),
            None => [AssetKind::Surface, AssetKind::Implementation]
                .into_iter()
                .find_map(|kind| self.nearest_of_kind(groups, kind)),
        };

        match selected {
            Some(group) => tracing::debug!("selected asset group {}", group.name),
            None => tracing::debug!(
                "no asset group compatible with {}",
                explicit.unwrap_or(&self.target)
            ),
        }
        selected
    }

    fn nearest_of_kind<'g>(&self, groups: &'g [AssetGroup], kind: AssetKind) -> Option<&'g AssetGroup> {
        let available: Vec<Framework> = groups
            .iter()
            .filter(|g| g.kind == kind)
            .map(|g| g.framework.clone())
            .collect();
        if available.is_empty() {
            return None;
        }

        let nearest = self.resolver.select_nearest(&self.target, &available)?;
        groups
            .iter()
            .find(|g| g.kind == kind && g.framework == nearest)
    }
}

/// Select a group with the default ambient target and rules.
pub fn select_group<'g>(groups: &'g [AssetGroup], explicit: Option<&Framework>) -> Option<&'g AssetGroup> {
    ArtifactSelector::default().select_group(groups, explicit)
}

fn default_target() -> Framework {
    Framework::parse(DEFAULT_TARGET_FRAMEWORK).unwrap_or_else(|_| Framework::net_core_app(8, 0))
}
