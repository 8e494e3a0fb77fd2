//! Fixture writers for unit tests.
//!
//! Tests never depend on checked-in binaries: [`AssemblyBuilder`] writes a
//! minimal managed DLL and [`PackageBuilder`] wraps files into a `.nupkg`.
//!
//! ```rust,ignore
//! let dll = AssemblyBuilder::new("Contoso")
//!     .class("Contoso", "Widget", |t| t.method("Run", &[Param::int32("count")]))
//!     .build();
//! let nupkg = PackageBuilder::new("Contoso", "1.0.0")
//!     .file("lib/netstandard2.0/Contoso.dll", dll)
//!     .write_to(dir.path());
//! ```

pub mod assembly;
pub mod package;

pub use assembly::{AssemblyBuilder, Param, SigType, TypeBuilder, TypeRefSpec};
pub use package::PackageBuilder;

/// Number of entries directly under `dir` (0 if it does not exist).
pub fn entry_count(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
