//! PackageSource trait - where package archives come from.

use std::path::PathBuf;

use anyhow::Result;

use crate::core::{AssetGroup, PackageId, PackageVersion};

/// A package archive available on the local filesystem.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub package: PackageId,
    /// Path of the `.nupkg` archive
    pub archive: PathBuf,
    /// Asset groups declared by the archive, sorted by kind then name
    pub groups: Vec<AssetGroup>,
}

/// A source of packages.
///
/// Sources are shared between the two sides of a diff, so implementations
/// must be usable from several threads at once.
pub trait PackageSource: Send + Sync {
    /// Source name for display.
    fn name(&self) -> &str;

    /// Versions of `id` this source can provide, ascending.
    fn versions(&self, id: &str) -> Result<Vec<PackageVersion>>;

    /// Locate a package. `None` picks the latest stable version (or the
    /// latest pre-release when no stable version exists).
    fn resolve(&self, id: &str, version: Option<&PackageVersion>) -> Result<ResolvedPackage>;
}

/// The version `resolve(id, None)` should pick from an ascending list.
pub fn latest_version(versions: &[PackageVersion]) -> Option<&PackageVersion> {
    versions
        .iter()
        .rev()
        .find(|v| !v.is_prerelease())
        .or_else(|| versions.last())
}
