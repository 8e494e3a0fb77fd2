//! What an inspection may resolve against.
//!
//! Types are only surfaced when everything they structurally depend on (base
//! type, interfaces, enclosing type) is resolvable: defined in the artifact
//! itself, shipped alongside it in the workspace, or provided by the
//! framework.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use glob::{MatchOptions, Pattern};

use crate::metadata::errors::{AssemblyVersion, LoadFailure};
use crate::metadata::image::MetadataImage;
use crate::metadata::tables::TableId;
use crate::metadata::MetadataError;
use crate::util::config::DEFAULT_FRAMEWORK_ASSEMBLIES;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Name and version from an image's Assembly row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyIdentity {
    pub name: String,
    pub version: AssemblyVersion,
}

impl AssemblyIdentity {
    /// Read the identity of an image. Netmodules have none.
    pub fn read(image: &MetadataImage) -> Result<Option<Self>, MetadataError> {
        if image.tables.row_count(TableId::Assembly) == 0 {
            return Ok(None);
        }
        let row = image.tables.row(TableId::Assembly, 1)?;
        Ok(Some(AssemblyIdentity {
            name: image.strings.get(row[7])?.to_string(),
            version: version_from_row(&row[1..5]),
        }))
    }
}

pub(crate) fn version_from_row(parts: &[u32]) -> AssemblyVersion {
    let mut version = [0u16; 4];
    for (slot, part) in version.iter_mut().zip(parts) {
        *slot = *part as u16;
    }
    AssemblyVersion(version)
}

/// The set of assemblies and module files an inspection may resolve.
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    /// Workspace assemblies by lowercase simple name
    assemblies: HashMap<String, AssemblyVersion>,
    /// Workspace file names, lowercase
    modules: HashSet<String>,
    framework: Vec<Pattern>,
}

impl LoadContext {
    /// A context resolving only the given framework assembly patterns.
    ///
    /// Invalid patterns are logged and ignored.
    pub fn new(framework_assemblies: &[String]) -> Self {
        let framework = framework_assemblies
            .iter()
            .filter_map(|raw| match Pattern::new(raw) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!("ignoring invalid framework assembly pattern `{}`: {}", raw, e);
                    None
                }
            })
            .collect();

        LoadContext {
            framework,
            ..LoadContext::default()
        }
    }

    /// A context with the built-in framework assembly list.
    pub fn with_default_framework() -> Self {
        let patterns: Vec<String> = DEFAULT_FRAMEWORK_ASSEMBLIES
            .iter()
            .map(|s| s.to_string())
            .collect();
        LoadContext::new(&patterns)
    }

    /// Register every artifact of a workspace.
    ///
    /// Artifacts that cannot be read are still registered as module files;
    /// the error surfaces when that artifact itself is inspected.
    pub fn add_artifacts<P: AsRef<Path>>(&mut self, paths: &[P]) {
        for path in paths {
            let path = path.as_ref();
            if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
                self.add_module(file_name);
            }

            let identity = std::fs::read(path)
                .map_err(MetadataError::from)
                .and_then(|bytes| MetadataImage::parse(&bytes))
                .and_then(|image| AssemblyIdentity::read(&image));
            match identity {
                Ok(Some(identity)) => self.add_assembly(&identity.name, identity.version),
                Ok(None) => {}
                Err(e) => tracing::debug!("cannot read identity of {}: {}", path.display(), e),
            }
        }
    }

    pub fn add_assembly(&mut self, name: &str, version: AssemblyVersion) {
        let slot = self
            .assemblies
            .entry(name.to_ascii_lowercase())
            .or_default();
        *slot = (*slot).max(version);
    }

    pub fn add_module(&mut self, file_name: &str) {
        self.modules.insert(file_name.to_ascii_lowercase());
    }

    pub fn is_framework_assembly(&self, name: &str) -> bool {
        self.framework
            .iter()
            .any(|pattern| pattern.matches_with(name, MATCH_OPTIONS))
    }

    /// Whether a referenced assembly can be resolved at `required` or later.
    pub fn check_assembly(&self, name: &str, required: AssemblyVersion) -> Result<(), LoadFailure> {
        if let Some(found) = self.assemblies.get(&name.to_ascii_lowercase()) {
            if *found < required {
                return Err(LoadFailure::VersionMismatch {
                    name: name.to_string(),
                    required,
                    found: *found,
                });
            }
            return Ok(());
        }

        if self.is_framework_assembly(name) {
            return Ok(());
        }

        Err(LoadFailure::MissingDependency(name.to_string()))
    }

    /// Whether a referenced module file ships in the workspace.
    pub fn check_module(&self, file_name: &str) -> Result<(), LoadFailure> {
        if self.modules.contains(&file_name.to_ascii_lowercase()) {
            Ok(())
        } else {
            Err(LoadFailure::MissingModule(file_name.to_string()))
        }
    }
}
