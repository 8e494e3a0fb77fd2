//! Artifact extraction into a private temporary workspace.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use zip::ZipArchive;

use crate::core::{ArtifactLocation, ArtifactRef, AssetGroup, Framework};
use crate::util::cancel::{CancellationToken, Cancelled};
use crate::util::fs::{copy_file, write_from_reader};

const WORKSPACE_PREFIX: &str = "apiscope-";

/// Extraction failed; any partly created workspace is already gone.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to create workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to copy {artifact}: {source}")]
    Io {
        artifact: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {artifact} from {archive}: {source}")]
    Archive {
        archive: PathBuf,
        artifact: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("extraction cancelled")]
    Cancelled,
}

impl From<Cancelled> for ExtractError {
    fn from(_: Cancelled) -> Self {
        ExtractError::Cancelled
    }
}

/// Why an extraction produced nothing to inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionIssue {
    /// No asset group was selected
    NoGroup,
    /// The group exists but holds no binaries (e.g. a `_._` placeholder)
    EmptyGroup { group: String },
}

impl fmt::Display for ExtractionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionIssue::NoGroup => write!(f, "no asset group selected"),
            ExtractionIssue::EmptyGroup { group } => {
                write!(f, "asset group {} contains no binaries", group)
            }
        }
    }
}

/// A uniquely named temporary directory, removed exactly once.
///
/// Call [`Workspace::release`] to remove it eagerly; otherwise it is removed
/// on drop. Removal failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl Workspace {
    /// Create a workspace under `root`, or under the system temp dir.
    pub fn create(root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        tracing::debug!("created workspace {}", dir.path().display());
        Ok(Workspace {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the workspace now.
    pub fn release(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => tracing::debug!("removed workspace {}", self.path.display()),
                Err(e) => tracing::warn!("failed to remove workspace {}: {}", self.path.display(), e),
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Local copies of a group's artifacts.
#[derive(Debug)]
pub struct ExtractionResult {
    pub framework: Option<Framework>,
    /// Binary artifacts, in group order
    pub artifacts: Vec<PathBuf>,
    pub documentation: Vec<PathBuf>,
    pub workspace: Option<Workspace>,
    pub issue: Option<ExtractionIssue>,
}

impl ExtractionResult {
    fn empty(framework: Option<Framework>, issue: ExtractionIssue) -> Self {
        ExtractionResult {
            framework,
            artifacts: Vec::new(),
            documentation: Vec::new(),
            workspace: None,
            issue: Some(issue),
        }
    }

    /// Remove the workspace, if any.
    pub fn release(self) {
        if let Some(workspace) = self.workspace {
            workspace.release();
        }
    }
}

/// Copies artifacts out of packages.
#[derive(Debug, Clone, Default)]
pub struct SurfaceExtractor {
    temp_root: Option<PathBuf>,
    cancel: CancellationToken,
}

impl SurfaceExtractor {
    pub fn new(temp_root: Option<PathBuf>) -> Self {
        SurfaceExtractor {
            temp_root,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Materialize every binary and documentation artifact of `group`.
    ///
    /// A missing or empty group is not an error: the result carries an
    /// [`ExtractionIssue`] and no workspace. On error the workspace has
    /// already been removed.
    pub fn extract(&self, group: Option<&AssetGroup>) -> Result<ExtractionResult, ExtractError> {
        let Some(group) = group else {
            return Ok(ExtractionResult::empty(None, ExtractionIssue::NoGroup));
        };
        if group.is_empty() {
            tracing::debug!("asset group {} has no binaries", group.name);
            return Ok(ExtractionResult::empty(
                Some(group.framework.clone()),
                ExtractionIssue::EmptyGroup {
                    group: group.name.clone(),
                },
            ));
        }

        self.cancel.check()?;
        let workspace = Workspace::create(self.temp_root.as_deref()).map_err(ExtractError::Workspace)?;

        match self.copy_all(group, workspace.path()) {
            Ok((artifacts, documentation)) => Ok(ExtractionResult {
                framework: Some(group.framework.clone()),
                artifacts,
                documentation,
                workspace: Some(workspace),
                issue: None,
            }),
            Err(e) => {
                workspace.release();
                Err(e)
            }
        }
    }

    fn copy_all(&self, group: &AssetGroup, dest: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>), ExtractError> {
        let mut archives: HashMap<PathBuf, ZipArchive<File>> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();
        let mut artifacts = Vec::new();
        let mut documentation = Vec::new();

        for item in group.binaries().chain(group.documentation()) {
            self.cancel.check()?;
            let path = copy_artifact(item, dest, &mut taken, &mut archives)?;
            if item.is_binary() {
                artifacts.push(path);
            } else {
                documentation.push(path);
            }
        }

        tracing::debug!(
            "extracted {} artifact(s) of {} into {}",
            artifacts.len(),
            group.name,
            dest.display()
        );
        Ok((artifacts, documentation))
    }
}

/// Extract with default settings (system temp dir, no cancellation).
pub fn extract(group: Option<&AssetGroup>) -> Result<ExtractionResult, ExtractError> {
    SurfaceExtractor::default().extract(group)
}

/// Where `file_name` lands in `dest`: at the top level the first time,
/// then under numbered subdirectories so same-named artifacts never clobber
/// each other. Names compare case-insensitively.
fn target_path(dest: &Path, file_name: &str, taken: &mut HashSet<String>) -> PathBuf {
    let lowered = file_name.to_ascii_lowercase();
    if taken.insert(lowered.clone()) {
        return dest.join(file_name);
    }
    let mut n = 1usize;
    loop {
        if taken.insert(format!("{}/{}", n, lowered)) {
            return dest.join(n.to_string()).join(file_name);
        }
        n += 1;
    }
}

fn copy_artifact(
    item: &ArtifactRef,
    dest: &Path,
    taken: &mut HashSet<String>,
    archives: &mut HashMap<PathBuf, ZipArchive<File>>,
) -> Result<PathBuf, ExtractError> {
    let describe = || match &item.location {
        ArtifactLocation::File { path } => path.display().to_string(),
        ArtifactLocation::Archived { entry, .. } => entry.clone(),
    };
    let file_name = item.file_name().ok_or_else(|| ExtractError::Io {
        artifact: describe(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "artifact has no file name"),
    })?;
    let target = target_path(dest, file_name, taken);
    if target.parent() != Some(dest) {
        tracing::debug!("{} collides with an earlier artifact, extracting to {}", describe(), target.display());
    }

    match &item.location {
        ArtifactLocation::File { path } => {
            copy_file(path, &target).map_err(|source| ExtractError::Io {
                artifact: describe(),
                source,
            })?;
        }
        ArtifactLocation::Archived { archive, entry } => {
            let zip = match archives.entry(archive.clone()) {
                std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
                std::collections::hash_map::Entry::Vacant(slot) => {
                    let file = File::open(archive).map_err(|source| ExtractError::Io {
                        artifact: archive.display().to_string(),
                        source,
                    })?;
                    let zip = ZipArchive::new(file).map_err(|source| ExtractError::Archive {
                        archive: archive.clone(),
                        artifact: entry.clone(),
                        source,
                    })?;
                    slot.insert(zip)
                }
            };
            let mut reader = zip.by_name(entry).map_err(|source| ExtractError::Archive {
                archive: archive.clone(),
                artifact: entry.clone(),
                source,
            })?;
            write_from_reader(&mut reader, &target).map_err(|source| ExtractError::Io {
                artifact: describe(),
                source,
            })?;
        }
    }

    Ok(target)
}
