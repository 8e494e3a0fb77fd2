//! Core data structures for apiscope.
//!
//! This module contains the foundational types used throughout the crate:
//! - Framework identifiers (TFMs) and their families
//! - Asset groups and artifact references declared by packages
//! - Package ids and versions
//! - Surface records (types, methods, member identities)

pub mod asset;
pub mod framework;
pub mod package_id;
pub mod surface;

pub use asset::{ArtifactLocation, ArtifactRef, ArtifactRole, AssetGroup, AssetKind};
pub use framework::{Framework, FrameworkFamily, FrameworkParseError};
pub use package_id::{PackageId, PackageVersion, VersionParseError};
pub use surface::{MemberIdentity, MethodSurfaceEntry, ParameterEntry, TypeKind, TypeSurfaceEntry};
