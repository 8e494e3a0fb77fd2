//! Configuration file support for apiscope.
//!
//! Two configuration file locations are supported:
//! - Global: `~/.apiscope/config.toml` - User-wide defaults
//! - Project: `.apiscope/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::Framework;
use crate::resolver::CompatibilityRules;

/// Framework assemblies every inspection may resolve against without
/// shipping them in the workspace.
pub const DEFAULT_FRAMEWORK_ASSEMBLIES: &[&str] = &[
    "mscorlib",
    "netstandard",
    "System",
    "System.*",
    "Microsoft.*",
    "WindowsBase",
];

/// Ambient target used when neither caller nor config names one.
pub const DEFAULT_TARGET_FRAMEWORK: &str = "net8.0";

/// apiscope configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Inspection settings
    pub inspect: InspectConfig,

    /// Local package feeds
    pub feeds: FeedConfig,

    /// Overrides of the .NET Standard compatibility table
    pub compat: CompatConfig,
}

/// Inspection-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectConfig {
    /// Ambient target framework for artifact selection (e.g. `net8.0`)
    pub target_framework: Option<String>,

    /// Assembly name patterns treated as always resolvable
    pub framework_assemblies: Vec<String>,

    /// Parent directory for temporary workspaces (None = system temp dir)
    pub temp_root: Option<PathBuf>,
}

/// Feed-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Directories scanned by `LocalFeed`
    pub paths: Vec<PathBuf>,
}

/// `[runtime, netstandard]` version pairs, ascending by runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatConfig {
    pub netcoreapp: Vec<[String; 2]>,
    pub netframework: Vec<[String; 2]>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.inspect.target_framework.is_some() {
            self.inspect.target_framework = other.inspect.target_framework;
        }
        if !other.inspect.framework_assemblies.is_empty() {
            self.inspect.framework_assemblies = other.inspect.framework_assemblies;
        }
        if other.inspect.temp_root.is_some() {
            self.inspect.temp_root = other.inspect.temp_root;
        }

        // Feeds accumulate; project feeds are searched first
        if !other.feeds.paths.is_empty() {
            let mut paths = other.feeds.paths;
            for path in self.feeds.paths.drain(..) {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
            self.feeds.paths = paths;
        }

        if !other.compat.netcoreapp.is_empty() {
            self.compat.netcoreapp = other.compat.netcoreapp;
        }
        if !other.compat.netframework.is_empty() {
            self.compat.netframework = other.compat.netframework;
        }
    }

    /// Parse the ambient target framework, falling back to the default.
    pub fn target_framework(&self) -> Result<Framework> {
        let raw = self
            .inspect
            .target_framework
            .as_deref()
            .unwrap_or(DEFAULT_TARGET_FRAMEWORK);
        Framework::parse(raw)
            .with_context(|| format!("invalid inspect.target_framework `{}`", raw))
    }

    /// Framework assembly patterns, or the built-in list when none are set.
    pub fn framework_assemblies(&self) -> Vec<String> {
        if self.inspect.framework_assemblies.is_empty() {
            DEFAULT_FRAMEWORK_ASSEMBLIES
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.inspect.framework_assemblies.clone()
        }
    }

    /// Build the compatibility rules table, applying any overrides.
    pub fn compat_rules(&self) -> Result<CompatibilityRules> {
        CompatibilityRules::from_pairs(&self.compat.netcoreapp, &self.compat.netframework)
            .context("invalid [compat] table")
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.apiscope/config.toml)
/// 2. Global config (~/.apiscope/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the global apiscope config directory (~/.apiscope).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".apiscope"))
}

/// Get the global config path (~/.apiscope/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.apiscope/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".apiscope").join("config.toml")
}
