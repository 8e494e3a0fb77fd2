//! Cross-family compatibility rules.
//!
//! Each runtime family implements some version of the portable .NET Standard
//! surface. The table is data, not code: it is built once (from defaults or
//! configuration) and handed to the resolver.

use anyhow::{anyhow, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::{Framework, FrameworkFamily};

/// `(first runtime version, highest .NET Standard it implements)`
pub type StandardMapping = (Version, Version);

/// Which .NET Standard version each runtime version implements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityRules {
    /// Ascending by runtime version
    netcoreapp: Vec<StandardMapping>,
    /// Ascending by runtime version
    netframework: Vec<StandardMapping>,
}

impl Default for CompatibilityRules {
    fn default() -> Self {
        CompatibilityRules {
            netcoreapp: vec![
                (Version::new(1, 0, 0), Version::new(1, 6, 0)),
                (Version::new(2, 0, 0), Version::new(2, 0, 0)),
                (Version::new(3, 0, 0), Version::new(2, 1, 0)),
            ],
            netframework: vec![
                (Version::new(4, 5, 0), Version::new(1, 1, 0)),
                (Version::new(4, 5, 1), Version::new(1, 2, 0)),
                (Version::new(4, 6, 0), Version::new(1, 3, 0)),
                (Version::new(4, 6, 1), Version::new(2, 0, 0)),
            ],
        }
    }
}

impl CompatibilityRules {
    /// Build rules from `[runtime, standard]` string pairs, as found in config.
    ///
    /// An empty list keeps the default table for that family.
    pub fn from_pairs(netcoreapp: &[[String; 2]], netframework: &[[String; 2]]) -> Result<Self> {
        let defaults = CompatibilityRules::default();
        Ok(CompatibilityRules {
            netcoreapp: parse_table(netcoreapp, "netcoreapp")?.unwrap_or(defaults.netcoreapp),
            netframework: parse_table(netframework, "netframework")?
                .unwrap_or(defaults.netframework),
        })
    }

    /// Highest .NET Standard version a runtime framework implements.
    pub fn max_standard(&self, framework: &Framework) -> Option<Version> {
        let table = match framework.family() {
            FrameworkFamily::NetCoreApp => &self.netcoreapp,
            FrameworkFamily::NetFramework => &self.netframework,
            FrameworkFamily::NetStandard | FrameworkFamily::Unknown => return None,
        };

        table
            .iter()
            .rev()
            .find(|(runtime, _)| runtime <= framework.version())
            .map(|(_, standard)| standard.clone())
    }

    /// Every .NET Standard version named by the table.
    pub fn standard_versions(&self) -> Vec<Version> {
        let mut versions: Vec<Version> = self
            .netcoreapp
            .iter()
            .chain(self.netframework.iter())
            .map(|(_, standard)| standard.clone())
            .collect();
        versions.sort();
        versions.dedup();
        versions
    }
}

fn parse_table(pairs: &[[String; 2]], family: &str) -> Result<Option<Vec<StandardMapping>>> {
    if pairs.is_empty() {
        return Ok(None);
    }

    let mut table = pairs
        .iter()
        .map(|[runtime, standard]| -> Result<StandardMapping> {
            let runtime = parse_loose_version(runtime)
                .ok_or_else(|| anyhow!("invalid {} version `{}` in compat table", family, runtime))?;
            let standard = parse_loose_version(standard)
                .ok_or_else(|| anyhow!("invalid netstandard version `{}` in compat table", standard))?;
            Ok((runtime, standard))
        })
        .collect::<Result<Vec<_>>>()?;

    table.sort();
    Ok(Some(table))
}

/// Parse `2`, `2.1` or `4.6.1` into a semver version.
pub fn parse_loose_version(s: &str) -> Option<Version> {
    let mut parts = [0u64; 3];
    let mut count = 0;
    for piece in s.trim().split('.') {
        if count == 3 {
            return None;
        }
        parts[count] = piece.parse().ok()?;
        count += 1;
    }
    Some(Version::new(parts[0], parts[1], parts[2]))
}
