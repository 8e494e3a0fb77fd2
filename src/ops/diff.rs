//! Surface comparison between two package versions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Framework, MemberIdentity, MethodSurfaceEntry, PackageVersion};
use crate::ops::inspect::{InspectError, InspectOutcome, PackageInspector, PackageSurface};
use crate::sources::ResolvedPackage;

/// Member-level differences between two surfaces.
///
/// Every list is sorted by owning type then overload key, with no
/// duplicates. `breaking` is exactly `removed` plus `changed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceDiff {
    pub added: Vec<MemberIdentity>,
    pub removed: Vec<MemberIdentity>,
    /// Same identity, different signature or return type
    pub changed: Vec<MemberIdentity>,
    pub breaking: Vec<MemberIdentity>,
}

impl SurfaceDiff {
    pub fn compatible(&self) -> bool {
        self.breaking.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.breaking.is_empty()
    }
}

/// Compare two rendered surfaces.
///
/// When a side lists the same identity more than once, the entry with the
/// smallest (signature, return type) represents it.
pub fn compare(from: &[MethodSurfaceEntry], to: &[MethodSurfaceEntry]) -> SurfaceDiff {
    let before = index(from);
    let after = index(to);

    let added: Vec<MemberIdentity> = after
        .keys()
        .filter(|id| !before.contains_key(*id))
        .cloned()
        .collect();
    let removed: Vec<MemberIdentity> = before
        .keys()
        .filter(|id| !after.contains_key(*id))
        .cloned()
        .collect();
    let changed: Vec<MemberIdentity> = before
        .iter()
        .filter_map(|(id, old)| {
            let new = after.get(id)?;
            (old != new).then(|| id.clone())
        })
        .collect();

    let breaking: BTreeSet<MemberIdentity> = removed.iter().chain(&changed).cloned().collect();

    SurfaceDiff {
        added,
        removed,
        changed,
        breaking: breaking.into_iter().collect(),
    }
}

/// Identity -> (signature, return type).
fn index(entries: &[MethodSurfaceEntry]) -> BTreeMap<MemberIdentity, (&str, &str)> {
    let mut map: BTreeMap<MemberIdentity, (&str, &str)> = BTreeMap::new();
    for entry in entries {
        let shape = (entry.signature.as_str(), entry.return_type.as_str());
        map.entry(entry.identity())
            .and_modify(|existing| {
                if shape < *existing {
                    *existing = shape;
                }
            })
            .or_insert(shape);
    }
    map
}

/// Which version of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    From,
    To,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::From => write!(f, "from"),
            Side::To => write!(f, "to"),
        }
    }
}

/// One side of a diff could not be inspected.
#[derive(Debug, Error, Diagnostic)]
#[error("failed to inspect {side} version {version} of {package}: {error}")]
#[diagnostic(code(apiscope::diff::side_failed))]
pub struct DiffFailure {
    pub side: Side,
    pub package: String,
    pub version: PackageVersion,
    #[source]
    pub error: InspectError,
}

/// Differences between two versions of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub package: String,
    pub from: PackageVersion,
    pub to: PackageVersion,
    /// Framework of the `to` side, used for both sides when possible
    pub framework: Framework,
    /// Set when the `from` side had to use a different framework
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_framework: Option<Framework>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub breaking: Vec<String>,
    pub compatible: bool,
}

impl DiffResult {
    /// Wrap a surface diff with its package header.
    pub fn new(from: &PackageSurface, to: &PackageSurface, diff: SurfaceDiff) -> Self {
        let strings = |ids: Vec<MemberIdentity>| ids.iter().map(|id| id.to_string()).collect();
        let compatible = diff.compatible();
        DiffResult {
            package: to.package.id.clone(),
            from: from.package.version.clone(),
            to: to.package.version.clone(),
            framework: to.framework.clone(),
            from_framework: (from.framework != to.framework).then(|| from.framework.clone()),
            added: strings(diff.added),
            removed: strings(diff.removed),
            changed: strings(diff.changed),
            breaking: strings(diff.breaking),
            compatible,
        }
    }
}

/// Inspect two versions of a package side by side and compare them.
///
/// Both sides are extracted and inspected concurrently, each in its own
/// workspace. The framework chosen for `to` is used for `from` too when the
/// older version ships it; otherwise `from` keeps its own best match.
pub fn diff_package(
    inspector: &PackageInspector<'_>,
    id: &str,
    from: &PackageVersion,
    to: &PackageVersion,
) -> Result<DiffResult, DiffFailure> {
    let explicit = inspector.options().framework.as_ref();
    let side = |version: &PackageVersion| -> Result<(ResolvedPackage, InspectOutcome), InspectError> {
        let resolved = inspector.resolve(id, Some(version))?;
        let outcome = inspector.inspect_resolved(&resolved, explicit)?;
        Ok((resolved, outcome))
    };
    let fail = |side: Side, version: &PackageVersion| {
        let package = id.to_string();
        let version = version.clone();
        move |error: InspectError| DiffFailure {
            side,
            package,
            version,
            error,
        }
    };

    let (before, after) = rayon::join(|| side(from), || side(to));
    let (from_resolved, from_outcome) = before.map_err(fail(Side::From, from))?;
    let (_, to_outcome) = after.map_err(fail(Side::To, to))?;

    let to_surface = to_outcome.into_surface().map_err(fail(Side::To, to))?;
    let from_surface = match from_outcome {
        InspectOutcome::Surface(surface) if surface.framework == to_surface.framework => surface,
        other => {
            let aligned = inspector
                .inspect_resolved(&from_resolved, Some(&to_surface.framework))
                .map_err(fail(Side::From, from))?;
            match (aligned, other) {
                (InspectOutcome::Surface(surface), _) => surface,
                (InspectOutcome::NotCompatible { .. }, fallback) => {
                    let surface = fallback.into_surface().map_err(fail(Side::From, from))?;
                    tracing::warn!(
                        "{} {} does not ship {}; comparing against {} instead",
                        id,
                        from,
                        to_surface.framework,
                        surface.framework
                    );
                    surface
                }
            }
        }
    };

    let diff = compare(&from_surface.methods, &to_surface.methods);
    tracing::info!(
        "{} {} -> {}: {} added, {} breaking",
        id,
        from,
        to,
        diff.added.len(),
        diff.breaking.len()
    );
    Ok(DiffResult::new(&from_surface, &to_surface, diff))
}
