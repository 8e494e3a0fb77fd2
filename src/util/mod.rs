//! Shared utilities

pub mod cancel;
pub mod config;
pub mod diagnostic;
pub mod fs;
pub mod logging;

pub use cancel::{CancellationToken, Cancelled};
pub use config::Config;
pub use diagnostic::Diagnostic;
