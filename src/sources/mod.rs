//! Package sources.
//!
//! Sources turn a package id and version into a local archive plus the asset
//! groups it declares. Downloading from remote feeds is left to the host;
//! [`LocalFeed`] reads directories the host has already populated.

pub mod feed;
pub mod source;

pub use feed::LocalFeed;
pub use source::{PackageSource, ResolvedPackage};
