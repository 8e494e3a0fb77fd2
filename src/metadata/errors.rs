//! Metadata error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An artifact could not be read at all. No partial results exist.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a managed assembly: {0}")]
    NotManaged(String),

    #[error("corrupt metadata: {0}")]
    Corrupt(String),

    #[error("inspection cancelled")]
    Cancelled,
}

impl MetadataError {
    pub fn corrupt(message: impl Into<String>) -> Self {
        MetadataError::Corrupt(message.into())
    }
}

impl From<crate::util::cancel::Cancelled> for MetadataError {
    fn from(_: crate::util::cancel::Cancelled) -> Self {
        MetadataError::Cancelled
    }
}

/// Four-part assembly version (`major.minor.build.revision`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssemblyVersion(pub [u16; 4]);

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

/// Why a single type could not be surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadFailure {
    /// Depends on an assembly that is neither in the workspace nor a
    /// framework assembly. Reported grouped per assembly.
    #[error("depends on missing assembly `{0}`")]
    MissingDependency(String),

    #[error("references module `{0}` which is not in the package")]
    MissingModule(String),

    #[error("requires `{name}` {required} but the package ships {found}")]
    VersionMismatch {
        name: String,
        required: AssemblyVersion,
        found: AssemblyVersion,
    },

    #[error("unreadable metadata: {0}")]
    BadMetadata(String),
}

impl From<MetadataError> for LoadFailure {
    fn from(err: MetadataError) -> Self {
        LoadFailure::BadMetadata(err.to_string())
    }
}
