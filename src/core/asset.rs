//! Asset groups - the per-framework artifact bundles a package declares.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::framework::Framework;

/// The kind of asset group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Reference assemblies (`ref/<tfm>/`): metadata only, preferred for inspection
    #[serde(alias = "ref", alias = "reference")]
    Surface,

    /// Runtime assemblies (`lib/<tfm>/`)
    #[serde(alias = "lib")]
    Implementation,
}

impl AssetKind {
    /// Package folder holding this kind of asset.
    pub fn folder(&self) -> &'static str {
        match self {
            AssetKind::Surface => "ref",
            AssetKind::Implementation => "lib",
        }
    }

    /// Map a package folder name to an asset kind.
    pub fn from_folder(folder: &str) -> Option<Self> {
        match folder.to_ascii_lowercase().as_str() {
            "ref" => Some(AssetKind::Surface),
            "lib" => Some(AssetKind::Implementation),
            _ => None,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Surface => write!(f, "surface"),
            AssetKind::Implementation => write!(f, "implementation"),
        }
    }
}

/// What an artifact is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactRole {
    /// A managed binary (`.dll`, `.exe`, `.winmd`)
    Binary,
    /// Companion documentation (`.xml`)
    Documentation,
}

impl ArtifactRole {
    /// Classify a file by extension. Unrelated files return `None`.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())?;

        match ext.as_str() {
            "dll" | "exe" | "winmd" => Some(ArtifactRole::Binary),
            "xml" => Some(ArtifactRole::Documentation),
            _ => None,
        }
    }
}

/// Where an artifact's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactLocation {
    /// A plain file on disk
    File { path: PathBuf },

    /// An entry inside a package archive
    Archived { archive: PathBuf, entry: String },
}

/// A reference to one artifact inside an asset group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub role: ArtifactRole,
    pub location: ArtifactLocation,
}

impl ArtifactRef {
    /// A file on disk.
    pub fn file(role: ArtifactRole, path: impl Into<PathBuf>) -> Self {
        ArtifactRef {
            role,
            location: ArtifactLocation::File { path: path.into() },
        }
    }

    /// An entry inside an archive.
    pub fn archived(role: ArtifactRole, archive: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        ArtifactRef {
            role,
            location: ArtifactLocation::Archived {
                archive: archive.into(),
                entry: entry.into(),
            },
        }
    }

    /// File name of the artifact (last path component).
    pub fn file_name(&self) -> Option<&str> {
        match &self.location {
            ArtifactLocation::File { path } => path.file_name().and_then(|n| n.to_str()),
            ArtifactLocation::Archived { entry, .. } => entry.rsplit('/').next(),
        }
    }

    pub fn is_binary(&self) -> bool {
        self.role == ArtifactRole::Binary
    }
}

/// A named collection of artifacts targeting exactly one framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetGroup {
    /// Group name, conventionally `<folder>/<tfm>`
    pub name: String,
    pub kind: AssetKind,
    pub framework: Framework,
    #[serde(default)]
    pub items: Vec<ArtifactRef>,
}

impl AssetGroup {
    /// Create an empty group; the name is derived from kind and framework.
    pub fn new(kind: AssetKind, framework: Framework) -> Self {
        AssetGroup {
            name: format!("{}/{}", kind.folder(), framework),
            kind,
            framework,
            items: Vec::new(),
        }
    }

    /// Add an artifact reference.
    pub fn with_item(mut self, item: ArtifactRef) -> Self {
        self.items.push(item);
        self
    }

    pub fn binaries(&self) -> impl Iterator<Item = &ArtifactRef> {
        self.items.iter().filter(|i| i.role == ArtifactRole::Binary)
    }

    pub fn documentation(&self) -> impl Iterator<Item = &ArtifactRef> {
        self.items
            .iter()
            .filter(|i| i.role == ArtifactRole::Documentation)
    }

    /// A group with no binaries has nothing to inspect.
    pub fn is_empty(&self) -> bool {
        self.binaries().next().is_none()
    }
}
