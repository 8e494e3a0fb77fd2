//! Surface rendering - raw metadata methods to documented surface entries.

pub mod csharp;
pub mod docs;

pub use csharp::{CSharpRenderer, SignatureRenderer};
pub use docs::{method_doc_id, DocIndex, DocProvider, MemberDoc, NoDocs};

use crate::core::{MethodSurfaceEntry, ParameterEntry};
use crate::metadata::RawMethod;

/// Combines a signature renderer with a documentation provider.
#[derive(Clone, Copy)]
pub struct SurfaceRenderer<'a> {
    signatures: &'a dyn SignatureRenderer,
    docs: &'a dyn DocProvider,
}

impl<'a> SurfaceRenderer<'a> {
    pub fn new(signatures: &'a dyn SignatureRenderer, docs: &'a dyn DocProvider) -> Self {
        SurfaceRenderer { signatures, docs }
    }

    /// Render one method. Documentation is looked up exactly once.
    pub fn render(&self, method: &RawMethod) -> MethodSurfaceEntry {
        let doc = self.docs.lookup_doc(&method_doc_id(method)).unwrap_or_default();

        let parameters = method
            .parameters
            .iter()
            .map(|p| ParameterEntry {
                name: p.name.clone(),
                type_name: self.signatures.parameter_type(p),
            })
            .collect();

        let parameter_docs = doc
            .params
            .into_iter()
            .filter(|(name, _)| method.parameters.iter().any(|p| &p.name == name))
            .collect();

        MethodSurfaceEntry {
            owner: method.owner.clone(),
            name: method.name.clone(),
            overload: self.signatures.overload_key(method),
            signature: self.signatures.declaration(method),
            return_type: self.signatures.type_name(&method.return_type),
            parameters,
            summary: doc.summary,
            parameter_docs,
            returns: doc.returns,
        }
    }

    pub fn render_all(&self, methods: &[RawMethod]) -> Vec<MethodSurfaceEntry> {
        methods.iter().map(|m| self.render(m)).collect()
    }
}
