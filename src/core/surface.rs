//! Surface records - what a package exposes publicly.
//!
//! The metadata inspector produces [`TypeSurfaceEntry`] values, the renderer
//! produces [`MethodSurfaceEntry`] values, and the diff engine compares
//! members by their [`MemberIdentity`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a public type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Interface,
    Struct,
    Enum,
}

impl TypeKind {
    /// Only classes and interfaces have their members surfaced.
    pub fn has_member_surface(&self) -> bool {
        matches!(self, TypeKind::Class | TypeKind::Interface)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Class => write!(f, "class"),
            TypeKind::Interface => write!(f, "interface"),
            TypeKind::Struct => write!(f, "struct"),
            TypeKind::Enum => write!(f, "enum"),
        }
    }
}

/// A type found in an artifact's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeSurfaceEntry {
    /// Namespace, empty for the global namespace. Nested types report the
    /// namespace of their outermost enclosing type.
    pub namespace: String,
    /// Simple name (`Inner` for `Ns.Outer+Inner`)
    pub name: String,
    /// Reflection-style full name (`Ns.Outer+Inner`)
    pub full_name: String,
    pub kind: TypeKind,
    pub visible: bool,
    /// Metadata token (`0x02xxxxxx`) inside the artifact
    #[serde(skip)]
    pub token: u32,
}

impl PartialOrd for TypeSurfaceEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeSurfaceEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace
            .cmp(&other.namespace)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.full_name.cmp(&other.full_name))
            .then_with(|| self.token.cmp(&other.token))
    }
}

/// One method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub name: String,
    pub type_name: String,
}

/// A rendered, documented public method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSurfaceEntry {
    /// Full name of the owning type
    pub owner: String,
    pub name: String,
    /// Name plus parameter types (`Add(int, int)`); tells overloads apart
    pub overload: String,
    /// Full rendered declaration
    pub signature: String,
    pub return_type: String,
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameter_docs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
}

impl MethodSurfaceEntry {
    /// Identity used for diffing.
    pub fn identity(&self) -> MemberIdentity {
        MemberIdentity {
            owner: self.owner.clone(),
            overload: self.overload.clone(),
            name: self.name.clone(),
        }
    }
}

/// Diff identity of a member: owning type, method name and overload key.
///
/// Orders by owning type, then overload key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberIdentity {
    pub owner: String,
    pub overload: String,
    pub name: String,
}

impl fmt::Display for MemberIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.overload)
    }
}
