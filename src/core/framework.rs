//! Target framework identifiers.
//!
//! A framework identifier (TFM) names the runtime surface an artifact was
//! compiled against: `net48`, `netcoreapp3.1`, `net8.0-windows` or
//! `netstandard2.0`. Identifiers we do not understand are kept verbatim and
//! only ever match themselves.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

static NET_FRAMEWORK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^net(\d)(\d)(\d)?$").unwrap());

static NET_DOTTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^net(\d+)\.(\d+)(?:-([a-z0-9.]+))?$").unwrap());

static NET_CORE_APP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^netcoreapp(\d+)\.(\d+)$").unwrap());

static NET_STANDARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^netstandard(\d+)\.(\d+)$").unwrap());

/// Long form used by nuspec files: `.NETStandard,Version=v2.0`.
static LONG_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.(netframework|netcoreapp|netstandard),version=v(\d+)\.(\d+)(?:\.(\d+))?$")
        .unwrap()
});

/// Framework family. Versions are only ordered within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameworkFamily {
    /// .NET Framework (`net48`)
    NetFramework,
    /// .NET Core and .NET 5+ (`netcoreapp3.1`, `net8.0`)
    NetCoreApp,
    /// .NET Standard, the portable surface (`netstandard2.0`)
    NetStandard,
    /// Unrecognised identifier
    Unknown,
}

impl fmt::Display for FrameworkFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameworkFamily::NetFramework => write!(f, ".NETFramework"),
            FrameworkFamily::NetCoreApp => write!(f, ".NETCoreApp"),
            FrameworkFamily::NetStandard => write!(f, ".NETStandard"),
            FrameworkFamily::Unknown => write!(f, "unknown"),
        }
    }
}

/// Error parsing a framework identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameworkParseError {
    #[error("framework identifier is empty")]
    Empty,

    #[error("invalid framework identifier `{0}`")]
    Invalid(String),
}

/// A parsed target framework identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Framework {
    family: FrameworkFamily,
    version: Version,
    /// OS-specific suffix (`windows` in `net8.0-windows`)
    platform: Option<String>,
    /// Verbatim (lowercased) token for unknown identifiers
    raw: Option<String>,
}

impl Framework {
    fn known(family: FrameworkFamily, version: Version, platform: Option<String>) -> Self {
        Framework {
            family,
            version,
            platform,
            raw: None,
        }
    }

    /// .NET Framework `major.minor.patch` (`net472`).
    pub fn net_framework(major: u64, minor: u64, patch: u64) -> Self {
        Framework::known(
            FrameworkFamily::NetFramework,
            Version::new(major, minor, patch),
            None,
        )
    }

    /// .NET Core / .NET 5+ (`netcoreapp3.1`, `net8.0`).
    pub fn net_core_app(major: u64, minor: u64) -> Self {
        Framework::known(FrameworkFamily::NetCoreApp, Version::new(major, minor, 0), None)
    }

    /// .NET Standard (`netstandard2.0`).
    pub fn net_standard(major: u64, minor: u64) -> Self {
        Framework::known(FrameworkFamily::NetStandard, Version::new(major, minor, 0), None)
    }

    /// Attach an OS platform suffix (`net8.0-windows`).
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into().to_ascii_lowercase());
        self
    }

    /// Parse a short or long framework identifier.
    pub fn parse(s: &str) -> Result<Self, FrameworkParseError> {
        let token = s.trim().to_ascii_lowercase();
        if token.is_empty() {
            return Err(FrameworkParseError::Empty);
        }
        if token.contains(['/', '\\']) || token.chars().any(char::is_whitespace) {
            return Err(FrameworkParseError::Invalid(s.to_string()));
        }

        if let Some(caps) = NET_FRAMEWORK.captures(&token) {
            let major = digit(&caps, 1);
            let minor = digit(&caps, 2);
            // `net50` is the compact spelling of `net5.0`
            match (major >= 5, caps.get(3)) {
                (false, patch) => {
                    let patch = patch.map(|_| digit(&caps, 3)).unwrap_or(0);
                    return Ok(Framework::net_framework(major, minor, patch));
                }
                (true, None) => return Ok(Framework::net_core_app(major, minor)),
                (true, Some(_)) => {}
            }
        }

        if let Some(caps) = NET_DOTTED.captures(&token) {
            let major = number(&caps, 1, s)?;
            let minor = number(&caps, 2, s)?;
            let platform = caps.get(3).map(|m| m.as_str().to_string());
            if major >= 5 {
                let mut fw = Framework::net_core_app(major, minor);
                fw.platform = platform;
                return Ok(fw);
            }
            if platform.is_some() {
                return Err(FrameworkParseError::Invalid(s.to_string()));
            }
            return Ok(Framework::net_framework(major, minor, 0));
        }

        if let Some(caps) = NET_CORE_APP.captures(&token) {
            return Ok(Framework::net_core_app(
                number(&caps, 1, s)?,
                number(&caps, 2, s)?,
            ));
        }

        if let Some(caps) = NET_STANDARD.captures(&token) {
            return Ok(Framework::net_standard(
                number(&caps, 1, s)?,
                number(&caps, 2, s)?,
            ));
        }

        if let Some(caps) = LONG_FORM.captures(&token) {
            let major = number(&caps, 2, s)?;
            let minor = number(&caps, 3, s)?;
            let patch = match caps.get(4) {
                Some(_) => number(&caps, 4, s)?,
                None => 0,
            };
            return Ok(match &caps[1] {
                "netframework" => Framework::net_framework(major, minor, patch),
                "netcoreapp" => Framework::net_core_app(major, minor),
                _ => Framework::net_standard(major, minor),
            });
        }

        Ok(Framework {
            family: FrameworkFamily::Unknown,
            version: Version::new(0, 0, 0),
            platform: None,
            raw: Some(token),
        })
    }

    pub fn family(&self) -> FrameworkFamily {
        self.family
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    /// Whether this identifier was recognised.
    pub fn is_known(&self) -> bool {
        self.family != FrameworkFamily::Unknown
    }

    /// The same framework without its OS platform suffix.
    pub fn without_platform(&self) -> Framework {
        Framework {
            platform: None,
            ..self.clone()
        }
    }
}

fn digit(caps: &regex::Captures<'_>, group: usize) -> u64 {
    caps.get(group)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn number(caps: &regex::Captures<'_>, group: usize, input: &str) -> Result<u64, FrameworkParseError> {
    caps.get(group)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| FrameworkParseError::Invalid(input.to_string()))
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = &self.version;
        match self.family {
            FrameworkFamily::NetFramework => {
                write!(f, "net{}{}", v.major, v.minor)?;
                if v.patch > 0 {
                    write!(f, "{}", v.patch)?;
                }
                Ok(())
            }
            FrameworkFamily::NetCoreApp if v.major >= 5 => {
                write!(f, "net{}.{}", v.major, v.minor)?;
                if let Some(platform) = &self.platform {
                    write!(f, "-{}", platform)?;
                }
                Ok(())
            }
            FrameworkFamily::NetCoreApp => write!(f, "netcoreapp{}.{}", v.major, v.minor),
            FrameworkFamily::NetStandard => write!(f, "netstandard{}.{}", v.major, v.minor),
            FrameworkFamily::Unknown => write!(f, "{}", self.raw.as_deref().unwrap_or_default()),
        }
    }
}

impl FromStr for Framework {
    type Err = FrameworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Framework::parse(s)
    }
}

impl Serialize for Framework {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Framework {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Framework::parse(&s).map_err(serde::de::Error::custom)
    }
}
