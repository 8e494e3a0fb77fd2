//! Local feed - a directory of `.nupkg` archives.
//!
//! Both layouts NuGet produces are understood:
//! - flat: `<root>/<id>.<version>.nupkg`
//! - hierarchical: `<root>/<id>/<version>/<id>.<version>.nupkg`
//!
//! Asset groups come from archive entries under `ref/<tfm>/` (surface) and
//! `lib/<tfm>/` (implementation). A `_._` placeholder declares a group with
//! nothing in it.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use zip::ZipArchive;

use crate::core::{ArtifactRef, ArtifactRole, AssetGroup, AssetKind, Framework, PackageId, PackageVersion};
use crate::sources::source::{latest_version, PackageSource, ResolvedPackage};
use crate::util::config::Config;
use crate::util::fs::find_files_with_extension;

const PLACEHOLDER: &str = "_._";

/// A package source backed by local directories.
#[derive(Debug, Clone)]
pub struct LocalFeed {
    roots: Vec<PathBuf>,
}

impl LocalFeed {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFeed {
            roots: vec![root.into()],
        }
    }

    /// Feeds are searched in order; the first root providing a version wins.
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        LocalFeed { roots }
    }

    /// All `[feeds] paths` from configuration, with `~` expanded.
    pub fn from_config(config: &Config) -> Self {
        LocalFeed::with_roots(config.feeds.paths.iter().map(|p| expand_home(p)).collect())
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Archives for `id`, keyed by version.
    fn candidates(&self, id: &str) -> BTreeMap<PackageVersion, (String, PathBuf)> {
        let prefix = format!("{}.", id.to_ascii_lowercase());
        let mut found = BTreeMap::new();

        for root in &self.roots {
            if !root.is_dir() {
                tracing::debug!("feed root {} does not exist", root.display());
                continue;
            }

            for path in find_files_with_extension(root, "nupkg") {
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if !stem.to_ascii_lowercase().starts_with(&prefix) {
                    continue;
                }
                let Ok(version) = PackageVersion::parse(&stem[prefix.len()..]) else {
                    continue;
                };
                let spelled_id = stem[..prefix.len() - 1].to_string();
                found.entry(version).or_insert((spelled_id, path));
            }
        }

        found
    }
}

impl PackageSource for LocalFeed {
    fn name(&self) -> &str {
        "local"
    }

    fn versions(&self, id: &str) -> Result<Vec<PackageVersion>> {
        Ok(self.candidates(id).into_keys().collect())
    }

    fn resolve(&self, id: &str, version: Option<&PackageVersion>) -> Result<ResolvedPackage> {
        let candidates = self.candidates(id);
        if candidates.is_empty() {
            bail!(
                "package `{}` not found in feeds: {}",
                id,
                self.roots
                    .iter()
                    .map(|r| r.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let version = match version {
            Some(v) => v.clone(),
            None => {
                let versions: Vec<PackageVersion> = candidates.keys().cloned().collect();
                match latest_version(&versions) {
                    Some(v) => v.clone(),
                    None => bail!("package `{}` has no versions", id),
                }
            }
        };

        let Some((spelled_id, archive)) = candidates.get(&version) else {
            bail!(
                "package `{}` version {} not found (available: {})",
                id,
                version,
                candidates
                    .keys()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        };

        tracing::debug!("resolved {} {} to {}", id, version, archive.display());
        let groups = read_asset_groups(archive)?;

        Ok(ResolvedPackage {
            package: PackageId::new(spelled_id.clone(), version),
            archive: archive.clone(),
            groups,
        })
    }
}

/// Derive asset groups from the entries of a package archive.
pub fn read_asset_groups(archive_path: &Path) -> Result<Vec<AssetGroup>> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open package {}", archive_path.display()))?;
    let archive = ZipArchive::new(file)
        .with_context(|| format!("failed to read package archive {}", archive_path.display()))?;

    let mut groups: BTreeMap<(AssetKind, String), AssetGroup> = BTreeMap::new();
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort_unstable();

    for entry in names {
        let Some((kind, framework, role)) = classify_entry(entry) else {
            continue;
        };
        let group = groups
            .entry((kind, framework.to_string()))
            .or_insert_with(|| AssetGroup::new(kind, framework));
        if let Some(role) = role {
            group
                .items
                .push(ArtifactRef::archived(role, archive_path, entry));
        }
    }

    Ok(groups.into_values().collect())
}

/// `(kind, framework, role)` for an archive entry inside an asset folder.
/// Placeholders report no role.
fn classify_entry(entry: &str) -> Option<(AssetKind, Framework, Option<ArtifactRole>)> {
    let normalized = entry.replace('\\', "/");
    let mut parts = normalized.splitn(3, '/');
    let kind = AssetKind::from_folder(parts.next()?)?;
    let tfm = parts.next()?;
    let file = parts.next()?;
    if file.contains('/') || file.is_empty() {
        return None;
    }

    let framework = match Framework::parse(tfm) {
        Ok(framework) => framework,
        Err(e) => {
            tracing::debug!("ignoring entry {}: {}", entry, e);
            return None;
        }
    };

    if file == PLACEHOLDER {
        return Some((kind, framework, None));
    }
    ArtifactRole::from_path(file).map(|role| (kind, framework, Some(role)))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
