//! apiscope - public API surface extraction and diffing for .NET packages
//!
//! This crate reads the managed assemblies inside NuGet packages without
//! executing them, extracts their public types and methods, and compares
//! two versions of a package into a classified change set.

pub mod core;
pub mod metadata;
pub mod ops;
pub mod render;
pub mod resolver;
pub mod sources;
pub mod util;

/// Fixture writers for unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// writes managed assemblies and `.nupkg` archives in memory.
#[cfg(test)]
pub mod test_support;

pub use core::{AssetGroup, Framework, MethodSurfaceEntry, PackageId, PackageVersion, TypeSurfaceEntry};
pub use metadata::{extract_public_surface, MetadataInspector};
pub use ops::{compare, diff_package, extract, inspect_package, select_group, DiffResult, InspectOutcome};
pub use resolver::select_nearest;
pub use sources::{LocalFeed, PackageSource};
pub use util::config::Config;
