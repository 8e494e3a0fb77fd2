//! Package identification - WHICH package (id + version).
//!
//! Package ids compare case-insensitively. Versions follow the NuGet shape:
//! one to four numeric parts and an optional pre-release label.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use semver::Prerelease;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error parsing a package version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid package version `{0}`")]
pub struct VersionParseError(pub String);

/// A package version such as `1.2.3`, `2.0` or `4.0.0-preview.1`.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    raw: String,
    parts: [u64; 4],
    pre: Prerelease,
}

impl PackageVersion {
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        let raw = s.trim();
        let err = || VersionParseError(s.to_string());

        // Build metadata never affects ordering.
        let without_build = raw.split('+').next().unwrap_or(raw);
        let (numbers, pre) = match without_build.split_once('-') {
            Some((numbers, pre)) => (numbers, Prerelease::new(pre).map_err(|_| err())?),
            None => (without_build, Prerelease::EMPTY),
        };

        let mut parts = [0u64; 4];
        let mut count = 0;
        for piece in numbers.split('.') {
            if count == 4 {
                return Err(err());
            }
            parts[count] = piece.parse().map_err(|_| err())?;
            count += 1;
        }
        if count == 0 {
            return Err(err());
        }

        Ok(PackageVersion {
            raw: raw.to_string(),
            parts,
            pre,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
        self.pre.as_str().to_ascii_lowercase().hash(state);
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts
            .cmp(&other.parts)
            .then_with(|| self.pre.cmp(&other.pre))
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for PackageVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageVersion::parse(s)
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PackageVersion::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A specific version of a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageId {
    pub id: String,
    pub version: PackageVersion,
}

impl PackageId {
    pub fn new(id: impl Into<String>, version: PackageVersion) -> Self {
        PackageId {
            id: id.into(),
            version,
        }
    }

    /// Whether `other` names the same package, ignoring case.
    pub fn same_package(&self, other: &str) -> bool {
        self.id.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.same_package(&other.id) && self.version == other.version
    }
}

impl Eq for PackageId {}

impl Hash for PackageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.to_ascii_lowercase().hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}
