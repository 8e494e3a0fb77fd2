//! High-level operations.
//!
//! Each stage of the pipeline is usable on its own:
//! select an asset group, extract it, inspect it, and compare surfaces.
//! [`inspect_package`] and [`diff_package`] run the whole chain.

pub mod diff;
pub mod extract;
pub mod inspect;
pub mod select;

pub use diff::{compare, diff_package, DiffFailure, DiffResult, Side, SurfaceDiff};
pub use extract::{extract, ExtractError, ExtractionIssue, ExtractionResult, SurfaceExtractor, Workspace};
pub use inspect::{
    inspect_package, InspectError, InspectOptions, InspectOutcome, PackageInspector, PackageSurface,
};
pub use select::{select_group, ArtifactSelector};
