//! Documentation lookup.
//!
//! Members are looked up by their documentation-comment id
//! (`M:Contoso.Widget.Add(System.Int32,System.Int32)`), the same id the
//! compiler writes into XML doc files.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::metadata::{RawMethod, TypeName};
use crate::render::csharp::split_generic_segments;

/// Documentation of one member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberDoc {
    pub summary: Option<String>,
    /// Parameter name -> description
    pub params: BTreeMap<String, String>,
    pub returns: Option<String>,
}

/// Looks up documentation for a member id. Missing docs are not an error.
pub trait DocProvider: Send + Sync {
    fn lookup_doc(&self, member_id: &str) -> Option<MemberDoc>;
}

/// A provider with no documentation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDocs;

impl DocProvider for NoDocs {
    fn lookup_doc(&self, _member_id: &str) -> Option<MemberDoc> {
        None
    }
}

/// In-memory documentation keyed by member id.
///
/// On disk this is a JSON object mapping ids to [`MemberDoc`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocIndex {
    members: BTreeMap<String, MemberDoc>,
}

impl DocIndex {
    pub fn new() -> Self {
        DocIndex::default()
    }

    /// Load an index from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read doc index: {}", path.display()))?;
        DocIndex::from_json(&content)
            .with_context(|| format!("failed to parse doc index: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn insert(&mut self, member_id: impl Into<String>, doc: MemberDoc) {
        self.members.insert(member_id.into(), doc);
    }

    /// Add every entry of `other`; its entries win on conflict.
    pub fn merge(&mut self, other: DocIndex) {
        self.members.extend(other.members);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl DocProvider for DocIndex {
    fn lookup_doc(&self, member_id: &str) -> Option<MemberDoc> {
        self.members.get(member_id).cloned()
    }
}

/// Documentation-comment id of a method, relative to its declaring type.
pub fn method_doc_id(method: &RawMethod) -> String {
    let mut id = format!(
        "M:{}.{}",
        method.declaring_type.replace('+', "."),
        method.name.replace('.', "#")
    );
    if !method.generic_params.is_empty() {
        id.push_str(&format!("``{}", method.generic_params.len()));
    }
    if !method.parameters.is_empty() {
        let params: Vec<String> = method.parameters.iter().map(|p| doc_type(&p.ty)).collect();
        id.push('(');
        id.push_str(&params.join(","));
        id.push(')');
    }
    id
}

fn doc_type(ty: &TypeName) -> String {
    match ty {
        TypeName::Primitive(p) => p.clr_name().to_string(),
        TypeName::Named { full_name, args } if args.is_empty() => full_name.replace('+', "."),
        TypeName::Named { full_name, args } => split_generic_segments(full_name, args)
            .into_iter()
            .map(|(segment, args)| {
                if args.is_empty() {
                    segment.to_string()
                } else {
                    let args: Vec<String> = args.iter().map(doc_type).collect();
                    format!("{}{{{}}}", segment, args.join(","))
                }
            })
            .collect::<Vec<_>>()
            .join("."),
        TypeName::GenericParam { index, method: true, .. } => format!("``{}", index),
        TypeName::GenericParam { index, .. } => format!("`{}", index),
        TypeName::SzArray(inner) => format!("{}[]", doc_type(inner)),
        TypeName::Array { element, rank } => {
            let dims = vec!["0:"; *rank as usize].join(",");
            format!("{}[{}]", doc_type(element), dims)
        }
        TypeName::Pointer(inner) => format!("{}*", doc_type(inner)),
        TypeName::ByRef(inner) => format!("{}@", doc_type(inner)),
        TypeName::FnPtr => "=FUNC".to_string(),
    }
}
