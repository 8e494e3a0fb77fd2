//! Managed assembly metadata inspection.
//!
//! Reads ECMA-335 metadata straight out of the PE file. Nothing is loaded or
//! executed; the artifact is only ever treated as bytes.
//!
//! Failures come in three tiers:
//! - the artifact cannot be read at all ([`MetadataError`], fatal),
//! - a type depends on an assembly nobody provides (skipped, logged once per
//!   missing assembly),
//! - a type has unreadable rows or a version/module problem (skipped, logged
//!   per type).
//!
//! Methods whose signatures cannot be decoded are skipped individually.

pub mod errors;
pub mod heaps;
pub mod image;
pub mod loader;
pub mod signature;
pub mod tables;

pub use errors::{AssemblyVersion, LoadFailure, MetadataError};
pub use image::MetadataImage;
pub use loader::{AssemblyIdentity, LoadContext};
pub use signature::{Primitive, TypeName};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::core::{TypeKind, TypeSurfaceEntry};
use crate::metadata::signature::{parse_type_spec, MethodSig, TypeSig};
use crate::metadata::tables::{CodedIndex, RowRef, TableId};
use crate::util::cancel::CancellationToken;

const TYPE_VISIBILITY_MASK: u32 = 0x07;
const TYPE_PUBLIC: u32 = 0x01;
const TYPE_NESTED_PUBLIC: u32 = 0x02;
const TYPE_INTERFACE: u32 = 0x20;

const METHOD_ACCESS_MASK: u32 = 0x07;
const METHOD_PUBLIC: u32 = 0x06;
const METHOD_STATIC: u32 = 0x10;
const METHOD_FINAL: u32 = 0x20;
const METHOD_VIRTUAL: u32 = 0x40;
const METHOD_NEW_SLOT: u32 = 0x100;
const METHOD_ABSTRACT: u32 = 0x400;
const METHOD_RT_SPECIAL_NAME: u32 = 0x1000;

const PARAM_IN: u32 = 0x01;
const PARAM_OUT: u32 = 0x02;

/// Nesting deeper than this is treated as corrupt (cycles).
pub(crate) const MAX_NESTING: usize = 64;

/// Longest chain of same-artifact base types, interfaces and enclosing
/// types followed when checking that a type loads.
const MAX_TYPE_DEPTH: usize = 256;

/// Method modifiers relevant to a rendered declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MethodModifiers {
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_virtual: bool,
    /// Virtual and reusing an inherited slot
    pub is_override: bool,
    pub is_sealed: bool,
}

/// A method parameter as found in metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawParameter {
    pub name: String,
    pub ty: TypeName,
    pub is_out: bool,
    pub is_in: bool,
}

/// A public method as found in metadata, before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMethod {
    /// Full name of the type the method is surfaced on
    pub owner: String,
    /// Full name of the type that declares it (a base class when inherited)
    pub declaring_type: String,
    pub name: String,
    pub generic_params: Vec<String>,
    pub modifiers: MethodModifiers,
    pub return_type: TypeName,
    pub parameters: Vec<RawParameter>,
    pub token: u32,
}

impl RawMethod {
    fn slot_key(&self) -> (String, usize, Vec<TypeName>) {
        (
            self.name.clone(),
            self.generic_params.len(),
            self.parameters.iter().map(|p| p.ty.clone()).collect(),
        )
    }
}

/// Result of enumerating an artifact's types.
#[derive(Debug, Clone, Default)]
pub struct TypeScan {
    /// Visible, loadable types, sorted
    pub types: Vec<TypeSurfaceEntry>,
    /// Visible types that were skipped, by full name
    pub skipped: Vec<(String, LoadFailure)>,
}

/// Opens artifacts against a shared [`LoadContext`].
#[derive(Debug, Clone)]
pub struct MetadataInspector<'ctx> {
    context: &'ctx LoadContext,
    cancel: CancellationToken,
}

impl<'ctx> MetadataInspector<'ctx> {
    pub fn new(context: &'ctx LoadContext) -> Self {
        MetadataInspector {
            context,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Read and decode an artifact.
    pub fn open(&self, path: &Path) -> Result<InspectedAssembly<'ctx>, MetadataError> {
        self.cancel.check()?;
        let bytes = std::fs::read(path)?;
        let image = MetadataImage::parse(&bytes)?;
        InspectedAssembly::new(path.to_path_buf(), image, self.context, self.cancel.clone())
    }
}

/// Public types of an artifact, using `context` to resolve dependencies.
pub fn extract_public_surface(
    path: &Path,
    context: &LoadContext,
) -> Result<Vec<TypeSurfaceEntry>, MetadataError> {
    MetadataInspector::new(context).open(path)?.extract_public_surface()
}

/// One decoded artifact.
#[derive(Debug)]
pub struct InspectedAssembly<'ctx> {
    path: PathBuf,
    image: MetadataImage,
    identity: Option<AssemblyIdentity>,
    context: &'ctx LoadContext,
    cancel: CancellationToken,
    /// Nested TypeDef rid -> enclosing TypeDef rid
    enclosing: HashMap<u32, u32>,
    /// Generic parameter names by owner, in declaration order
    generic_params: HashMap<RowRef, Vec<String>>,
}

impl<'ctx> InspectedAssembly<'ctx> {
    fn new(
        path: PathBuf,
        image: MetadataImage,
        context: &'ctx LoadContext,
        cancel: CancellationToken,
    ) -> Result<Self, MetadataError> {
        let identity = AssemblyIdentity::read(&image)?;

        let mut enclosing = HashMap::new();
        for (_, row) in image.tables.rows(TableId::NestedClass) {
            enclosing.insert(row[0], row[1]);
        }

        let mut by_owner: HashMap<RowRef, BTreeMap<u32, String>> = HashMap::new();
        for (_, row) in image.tables.rows(TableId::GenericParam) {
            let owner = CodedIndex::TypeOrMethodDef.decode(row[2])?;
            let name = image.strings.get(row[3])?.to_string();
            by_owner.entry(owner).or_default().insert(row[0], name);
        }
        let generic_params = by_owner
            .into_iter()
            .map(|(owner, names)| (owner, names.into_values().collect()))
            .collect();

        Ok(InspectedAssembly {
            path,
            image,
            identity,
            context,
            cancel,
            enclosing,
            generic_params,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> Option<&AssemblyIdentity> {
        self.identity.as_ref()
    }

    /// Visible types that resolve, sorted by namespace then name.
    pub fn extract_public_surface(&self) -> Result<Vec<TypeSurfaceEntry>, MetadataError> {
        Ok(self.scan_types()?.types)
    }

    /// Enumerate visible types, separating the ones that fail to load.
    pub fn scan_types(&self) -> Result<TypeScan, MetadataError> {
        let mut scan = TypeScan::default();
        let mut missing: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for rid in 1..=self.image.tables.row_count(TableId::TypeDef) {
            self.cancel.check()?;

            let entry = match self.type_entry(rid) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(
                        "{}: skipping TypeDef row {}: {}",
                        self.path.display(),
                        rid,
                        e
                    );
                    scan.skipped.push((format!("TypeDef#{}", rid), e.into()));
                    continue;
                }
            };

            match self.check_type(rid, &mut HashSet::new(), 0) {
                Ok(()) => scan.types.push(entry),
                Err(LoadFailure::MissingDependency(assembly)) => {
                    missing
                        .entry(assembly.clone())
                        .or_default()
                        .push(entry.full_name.clone());
                    scan.skipped
                        .push((entry.full_name, LoadFailure::MissingDependency(assembly)));
                }
                Err(failure) => {
                    tracing::debug!(
                        "{}: skipping type {}: {}",
                        self.path.display(),
                        entry.full_name,
                        failure
                    );
                    scan.skipped.push((entry.full_name, failure));
                }
            }
        }

        for (assembly, types) in &missing {
            tracing::debug!(
                "{}: skipped {} type(s) depending on missing assembly `{}`: {}",
                self.path.display(),
                types.len(),
                assembly,
                types.join(", ")
            );
        }

        scan.types.sort();
        Ok(scan)
    }

    /// Public methods of a surfaced type.
    ///
    /// Classes include public instance methods inherited from base classes
    /// defined in this artifact; the most derived declaration wins.
    /// Interfaces report declared members only. Other kinds have none.
    pub fn extract_public_members(&self, ty: &TypeSurfaceEntry) -> Result<Vec<RawMethod>, MetadataError> {
        if !ty.kind.has_member_surface() {
            return Ok(Vec::new());
        }
        let rid = type_def_rid(ty.token)?;

        let mut methods = self.declared_methods(rid, &ty.full_name, false)?;
        if ty.kind == TypeKind::Interface {
            return Ok(methods);
        }

        let mut seen: HashSet<_> = methods.iter().map(RawMethod::slot_key).collect();
        let mut visited = HashSet::from([rid]);
        let mut current = rid;
        while let Some(base) = self.base_type_def(current)? {
            if !visited.insert(base) {
                break;
            }
            self.cancel.check()?;
            for method in self.declared_methods(base, &ty.full_name, true)? {
                if seen.insert(method.slot_key()) {
                    methods.push(method);
                }
            }
            current = base;
        }

        Ok(methods)
    }

    /// Build the surface entry for a visible TypeDef; `None` if not visible.
    fn type_entry(&self, rid: u32) -> Result<Option<TypeSurfaceEntry>, MetadataError> {
        let row = self.image.tables.row(TableId::TypeDef, rid)?;
        let name = self.image.strings.get(row[1])?;
        if name == "<Module>" || !self.is_visible(rid, 0)? {
            return Ok(None);
        }

        let full_name = self.type_def_full_name(rid, 0)?;
        let namespace = self.outermost_namespace(rid, 0)?;
        let kind = self.type_kind(row[0], row[3])?;

        Ok(Some(TypeSurfaceEntry {
            namespace,
            name: name.to_string(),
            full_name,
            kind,
            visible: true,
            token: RowRef { table: TableId::TypeDef, rid }.token(),
        }))
    }

    fn is_visible(&self, rid: u32, depth: usize) -> Result<bool, MetadataError> {
        if depth > MAX_NESTING {
            return Err(MetadataError::corrupt("nested type cycle"));
        }
        let flags = self.image.tables.row(TableId::TypeDef, rid)?[0];
        match (flags & TYPE_VISIBILITY_MASK, self.enclosing.get(&rid)) {
            (TYPE_PUBLIC, None) => Ok(true),
            (TYPE_NESTED_PUBLIC, Some(&outer)) => self.is_visible(outer, depth + 1),
            _ => Ok(false),
        }
    }

    fn type_kind(&self, flags: u32, extends: u32) -> Result<TypeKind, MetadataError> {
        if flags & TYPE_INTERFACE != 0 {
            return Ok(TypeKind::Interface);
        }
        let base = CodedIndex::TypeDefOrRef.decode(extends)?;
        if base.is_null() {
            return Ok(TypeKind::Class);
        }
        Ok(match self.row_full_name(base)?.as_str() {
            "System.Enum" => TypeKind::Enum,
            "System.ValueType" => TypeKind::Struct,
            _ => TypeKind::Class,
        })
    }

    fn type_def_full_name(&self, rid: u32, depth: usize) -> Result<String, MetadataError> {
        if depth > MAX_NESTING {
            return Err(MetadataError::corrupt("nested type cycle"));
        }
        let row = self.image.tables.row(TableId::TypeDef, rid)?;
        let name = self.image.strings.get(row[1])?;
        if let Some(&outer) = self.enclosing.get(&rid) {
            return Ok(format!("{}+{}", self.type_def_full_name(outer, depth + 1)?, name));
        }
        Ok(qualify(self.image.strings.get(row[2])?, name))
    }

    fn outermost_namespace(&self, rid: u32, depth: usize) -> Result<String, MetadataError> {
        if depth > MAX_NESTING {
            return Err(MetadataError::corrupt("nested type cycle"));
        }
        match self.enclosing.get(&rid) {
            Some(&outer) => self.outermost_namespace(outer, depth + 1),
            None => {
                let row = self.image.tables.row(TableId::TypeDef, rid)?;
                Ok(self.image.strings.get(row[2])?.to_string())
            }
        }
    }

    fn type_ref_full_name(&self, rid: u32, depth: usize) -> Result<String, MetadataError> {
        if depth > MAX_NESTING {
            return Err(MetadataError::corrupt("nested type reference cycle"));
        }
        let row = self.image.tables.row(TableId::TypeRef, rid)?;
        let name = self.image.strings.get(row[1])?;
        let scope = CodedIndex::ResolutionScope.decode(row[0])?;
        if scope.table == TableId::TypeRef && !scope.is_null() {
            return Ok(format!("{}+{}", self.type_ref_full_name(scope.rid, depth + 1)?, name));
        }
        Ok(qualify(self.image.strings.get(row[2])?, name))
    }

    /// Full name of a TypeDef or TypeRef row; TypeSpecs use their definition.
    fn row_full_name(&self, row: RowRef) -> Result<String, MetadataError> {
        match row.table {
            TableId::TypeDef => self.type_def_full_name(row.rid, 0),
            TableId::TypeRef => self.type_ref_full_name(row.rid, 0),
            TableId::TypeSpec => match self.type_spec(row.rid)? {
                TypeSig::GenericInst { definition, .. } => match *definition {
                    TypeSig::Named(inner) if inner.table != TableId::TypeSpec => self.row_full_name(inner),
                    _ => Err(MetadataError::corrupt("nested TypeSpec definition")),
                },
                _ => Ok(String::new()),
            },
            other => Err(MetadataError::corrupt(format!("{} is not a type", other))),
        }
    }

    fn type_spec(&self, rid: u32) -> Result<TypeSig, MetadataError> {
        let row = self.image.tables.row(TableId::TypeSpec, rid)?;
        parse_type_spec(self.image.blobs.get(row[0])?)
    }

    /// The base class when it is defined in this artifact.
    fn base_type_def(&self, rid: u32) -> Result<Option<u32>, MetadataError> {
        let row = self.image.tables.row(TableId::TypeDef, rid)?;
        let mut base = CodedIndex::TypeDefOrRef.decode(row[3])?;
        if base.table == TableId::TypeSpec && !base.is_null() {
            base = match self.type_spec(base.rid)? {
                TypeSig::GenericInst { definition, .. } => match *definition {
                    TypeSig::Named(inner) => inner,
                    _ => return Ok(None),
                },
                _ => return Ok(None),
            };
        }
        Ok((base.table == TableId::TypeDef && !base.is_null()).then_some(base.rid))
    }

    /// Check that everything a TypeDef structurally depends on resolves.
    fn check_type(&self, rid: u32, visited: &mut HashSet<RowRef>, depth: usize) -> Result<(), LoadFailure> {
        if depth > MAX_TYPE_DEPTH {
            return Err(LoadFailure::BadMetadata("type hierarchy nests too deeply".to_string()));
        }
        let me = RowRef { table: TableId::TypeDef, rid };
        if !visited.insert(me) {
            return Ok(());
        }

        let row = self.image.tables.row(TableId::TypeDef, rid)?;
        self.check_row(CodedIndex::TypeDefOrRef.decode(row[3])?, visited, depth)?;

        for (_, imp) in self.image.tables.rows(TableId::InterfaceImpl) {
            if imp[0] == rid {
                self.check_row(CodedIndex::TypeDefOrRef.decode(imp[1])?, visited, depth)?;
            }
        }

        if let Some(&outer) = self.enclosing.get(&rid) {
            self.check_type(outer, visited, depth + 1)?;
        }
        Ok(())
    }

    fn check_row(&self, row: RowRef, visited: &mut HashSet<RowRef>, depth: usize) -> Result<(), LoadFailure> {
        if row.is_null() {
            return Ok(());
        }
        match row.table {
            TableId::TypeDef => self.check_type(row.rid, visited, depth + 1),
            TableId::TypeRef => self.check_type_ref(row.rid, 0),
            TableId::TypeSpec => {
                if !visited.insert(row) {
                    return Ok(());
                }
                for inner in self.type_spec(row.rid)?.referenced_rows() {
                    self.check_row(inner, visited, depth + 1)?;
                }
                Ok(())
            }
            other => Err(LoadFailure::BadMetadata(format!("{} used as a type", other))),
        }
    }

    fn check_type_ref(&self, rid: u32, depth: usize) -> Result<(), LoadFailure> {
        if depth > MAX_NESTING {
            return Err(LoadFailure::BadMetadata("nested type reference cycle".to_string()));
        }
        let row = self.image.tables.row(TableId::TypeRef, rid)?;
        let scope = CodedIndex::ResolutionScope.decode(row[0])?;
        if scope.is_null() {
            // Resolved through the ExportedType table of this assembly
            return Ok(());
        }

        match scope.table {
            TableId::Module => Ok(()),
            TableId::TypeRef => self.check_type_ref(scope.rid, depth + 1),
            TableId::ModuleRef => {
                let module = self.image.tables.row(TableId::ModuleRef, scope.rid)?;
                self.context.check_module(self.image.strings.get(module[0])?)
            }
            TableId::AssemblyRef => {
                let assembly = self.image.tables.row(TableId::AssemblyRef, scope.rid)?;
                let name = self.image.strings.get(assembly[6])?;
                let is_self = self
                    .identity
                    .as_ref()
                    .is_some_and(|me| me.name.eq_ignore_ascii_case(name));
                if is_self {
                    return Ok(());
                }
                self.context
                    .check_assembly(name, loader::version_from_row(&assembly[0..4]))
            }
            other => Err(LoadFailure::BadMetadata(format!("{} used as resolution scope", other))),
        }
    }

    /// Public, non-constructor methods declared directly on a TypeDef.
    fn declared_methods(
        &self,
        type_rid: u32,
        owner: &str,
        inherited: bool,
    ) -> Result<Vec<RawMethod>, MetadataError> {
        let declaring_type = self.type_def_full_name(type_rid, 0)?;
        let type_ref = RowRef { table: TableId::TypeDef, rid: type_rid };
        let mut methods = Vec::new();

        for method_rid in self.image.tables.methods_of(type_rid)? {
            let row = self.image.tables.row(TableId::MethodDef, method_rid)?;
            let flags = row[2];
            if flags & METHOD_ACCESS_MASK != METHOD_PUBLIC || flags & METHOD_RT_SPECIAL_NAME != 0 {
                continue;
            }
            if inherited && flags & METHOD_STATIC != 0 {
                continue;
            }

            let name = self.image.strings.get(row[3])?;
            match self.raw_method(method_rid, row, type_ref, owner, &declaring_type) {
                Ok(method) => methods.push(method),
                Err(e) => tracing::debug!(
                    "{}: skipping method {}.{}: {}",
                    self.path.display(),
                    declaring_type,
                    name,
                    e
                ),
            }
        }

        Ok(methods)
    }

    fn raw_method(
        &self,
        method_rid: u32,
        row: &[u32],
        type_ref: RowRef,
        owner: &str,
        declaring_type: &str,
    ) -> Result<RawMethod, MetadataError> {
        let flags = row[2];
        let name = self.image.strings.get(row[3])?.to_string();
        let sig = MethodSig::parse(self.image.blobs.get(row[4])?)?;
        let method_ref = RowRef { table: TableId::MethodDef, rid: method_rid };

        let type_params = self.generic_params.get(&type_ref).map(Vec::as_slice).unwrap_or(&[]);
        let method_params = self.generic_params.get(&method_ref).map(Vec::as_slice).unwrap_or(&[]);
        let generics = GenericScope {
            type_params,
            method_params,
        };

        let mut names: HashMap<u32, (String, u32)> = HashMap::new();
        for param_rid in self.image.tables.params_of(method_rid)? {
            let param = self.image.tables.row(TableId::Param, param_rid)?;
            names.insert(param[1], (self.image.strings.get(param[2])?.to_string(), param[0]));
        }

        let parameters = sig
            .params
            .iter()
            .enumerate()
            .map(|(i, ty)| -> Result<RawParameter, MetadataError> {
                let sequence = i as u32 + 1;
                let (name, param_flags) = names
                    .get(&sequence)
                    .cloned()
                    .filter(|(name, _)| !name.is_empty())
                    .unwrap_or_else(|| (format!("arg{}", sequence), 0));
                Ok(RawParameter {
                    name,
                    ty: self.resolve(ty, &generics)?,
                    is_out: param_flags & PARAM_OUT != 0 && param_flags & PARAM_IN == 0,
                    is_in: param_flags & PARAM_IN != 0 && param_flags & PARAM_OUT == 0,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let generic_params = (0..sig.generic_count)
            .map(|i| generics.method_name(i))
            .collect();

        let is_virtual = flags & METHOD_VIRTUAL != 0;
        let is_override = is_virtual && flags & METHOD_NEW_SLOT == 0;

        Ok(RawMethod {
            owner: owner.to_string(),
            declaring_type: declaring_type.to_string(),
            name,
            generic_params,
            modifiers: MethodModifiers {
                is_static: flags & METHOD_STATIC != 0,
                is_abstract: flags & METHOD_ABSTRACT != 0,
                is_virtual,
                is_override,
                is_sealed: is_override && flags & METHOD_FINAL != 0,
            },
            return_type: self.resolve(&sig.return_type, &generics)?,
            parameters,
            token: method_ref.token(),
        })
    }

    /// Turn a row-relative signature into a self-contained type name.
    fn resolve(&self, sig: &TypeSig, generics: &GenericScope<'_>) -> Result<TypeName, MetadataError> {
        self.resolve_at(sig, generics, 0)
    }

    fn resolve_at(&self, sig: &TypeSig, generics: &GenericScope<'_>, depth: usize) -> Result<TypeName, MetadataError> {
        if depth > MAX_NESTING {
            return Err(MetadataError::corrupt("type signature nests too deeply"));
        }
        let next = |inner: &TypeSig| self.resolve_at(inner, generics, depth + 1).map(Box::new);

        Ok(match sig {
            TypeSig::Primitive(p) => TypeName::Primitive(*p),
            TypeSig::Named(row) if row.table == TableId::TypeSpec => {
                let spec = self.type_spec(row.rid)?;
                return self.resolve_at(&spec, generics, depth + 1);
            }
            TypeSig::Named(row) => TypeName::named(self.row_full_name(*row)?),
            TypeSig::Var(i) => TypeName::GenericParam {
                name: generics.type_name(*i),
                index: *i,
                method: false,
            },
            TypeSig::MethodVar(i) => TypeName::GenericParam {
                name: generics.method_name(*i),
                index: *i,
                method: true,
            },
            TypeSig::SzArray(inner) => TypeName::SzArray(next(inner)?),
            TypeSig::Array { element, rank } => TypeName::Array {
                element: next(element)?,
                rank: *rank,
            },
            TypeSig::Pointer(inner) => TypeName::Pointer(next(inner)?),
            TypeSig::ByRef(inner) => TypeName::ByRef(next(inner)?),
            TypeSig::GenericInst { definition, args } => {
                let full_name = match self.resolve_at(definition, generics, depth + 1)? {
                    TypeName::Named { full_name, .. } => full_name,
                    other => return Err(MetadataError::corrupt(format!("cannot instantiate {}", other))),
                };
                let args = args
                    .iter()
                    .map(|arg| self.resolve_at(arg, generics, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                TypeName::Named { full_name, args }
            }
            TypeSig::FnPtr => TypeName::FnPtr,
        })
    }
}

/// Generic parameter names visible while resolving one method.
struct GenericScope<'a> {
    type_params: &'a [String],
    method_params: &'a [String],
}

impl GenericScope<'_> {
    fn type_name(&self, index: u32) -> String {
        self.type_params
            .get(index as usize)
            .cloned()
            .unwrap_or_else(|| format!("T{}", index))
    }

    fn method_name(&self, index: u32) -> String {
        self.method_params
            .get(index as usize)
            .cloned()
            .unwrap_or_else(|| format!("TMethod{}", index))
    }
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

fn type_def_rid(token: u32) -> Result<u32, MetadataError> {
    if token >> 24 != TableId::TypeDef as u32 || token & 0x00FF_FFFF == 0 {
        return Err(MetadataError::corrupt(format!("{:#010x} is not a TypeDef token", token)));
    }
    Ok(token & 0x00FF_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{AssemblyBuilder, Param, TypeRefSpec};
    use tempfile::TempDir;

    fn write(dir: &TempDir, file: &str, bytes: Vec<u8>) -> PathBuf {
        let path = dir.path().join(file);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn names(types: &[TypeSurfaceEntry]) -> Vec<&str> {
        types.iter().map(|t| t.full_name.as_str()).collect()
    }

    #[test]
    fn test_surface_is_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        let bytes = AssemblyBuilder::new("Contoso")
            .class("Contoso.Zeta", "Widget", |t| t)
            .class("Contoso.Alpha", "Gadget", |t| t)
            .class("", "Global", |t| t)
            .internal_class("Contoso.Alpha", "Hidden")
            .interface("Contoso.Alpha", "IThing", |t| t)
            .value_type("Contoso.Alpha", "Point")
            .enumeration("Contoso.Alpha", "Color")
            .build();
        let path = write(&tmp, "Contoso.dll", bytes);

        let ctx = LoadContext::with_default_framework();
        let types = extract_public_surface(&path, &ctx).unwrap();
        assert_eq!(
            names(&types),
            ["Global", "Contoso.Alpha.Color", "Contoso.Alpha.Gadget", "Contoso.Alpha.IThing", "Contoso.Alpha.Point", "Contoso.Zeta.Widget"]
        );

        let kinds: BTreeMap<&str, TypeKind> =
            types.iter().map(|t| (t.name.as_str(), t.kind)).collect();
        assert_eq!(kinds["IThing"], TypeKind::Interface);
        assert_eq!(kinds["Point"], TypeKind::Struct);
        assert_eq!(kinds["Color"], TypeKind::Enum);
        assert_eq!(kinds["Widget"], TypeKind::Class);
        assert!(types.iter().all(|t| t.visible));
    }

    #[test]
    fn test_nested_visibility() {
        let tmp = TempDir::new().unwrap();
        let bytes = AssemblyBuilder::new("Contoso")
            .class("Contoso", "Outer", |t| t)
            .nested_class("Outer", "Inner", true)
            .nested_class("Outer", "Private", false)
            .internal_class("Contoso", "Internal")
            .nested_class("Internal", "Exposed", true)
            .build();
        let path = write(&tmp, "Contoso.dll", bytes);

        let types = extract_public_surface(&path, &LoadContext::with_default_framework()).unwrap();
        assert_eq!(names(&types), ["Contoso.Outer+Inner", "Contoso.Outer"]);
        assert!(types.iter().all(|t| t.namespace == "Contoso"));
    }

    #[test]
    fn test_partial_load_containment() {
        let tmp = TempDir::new().unwrap();
        let bytes = AssemblyBuilder::new("Contoso")
            .class("Contoso", "A", |t| t)
            .class("Contoso", "B", |t| t)
            .class("Contoso", "C", |t| t.extends(TypeRefSpec::external("Missing.Lib", "Missing", "Base")))
            .class("Contoso", "D", |t| t.implements(TypeRefSpec::external("Other.Lib", "Other", "IFoo")))
            .class("Contoso", "E", |t| t.extends(TypeRefSpec::external("Missing.Lib", "Missing", "Base2")))
            .build();
        let path = write(&tmp, "Contoso.dll", bytes);

        let ctx = LoadContext::with_default_framework();
        let inspector = MetadataInspector::new(&ctx);
        let scan = inspector.open(&path).unwrap().scan_types().unwrap();

        assert_eq!(names(&scan.types), ["Contoso.A", "Contoso.B"]);
        assert_eq!(scan.skipped.len(), 3);
        assert!(scan
            .skipped
            .iter()
            .all(|(_, f)| matches!(f, LoadFailure::MissingDependency(_))));
    }

    #[test]
    fn test_long_base_chain_is_bounded() {
        let tmp = TempDir::new().unwrap();
        let mut builder = AssemblyBuilder::new("Contoso").class("Contoso", "L0", |t| t);
        for i in 1..300 {
            let base = format!("L{}", i - 1);
            builder = builder.class("Contoso", &format!("L{}", i), |t| {
                t.extends(TypeRefSpec::local("Contoso", &base))
            });
        }
        let path = write(&tmp, "Contoso.dll", builder.build());

        let ctx = LoadContext::with_default_framework();
        let scan = MetadataInspector::new(&ctx).open(&path).unwrap().scan_types().unwrap();

        assert_eq!(scan.types.len(), MAX_TYPE_DEPTH + 1);
        assert_eq!(scan.skipped.len(), 300 - (MAX_TYPE_DEPTH + 1));
        assert!(scan
            .skipped
            .iter()
            .all(|(_, f)| matches!(f, LoadFailure::BadMetadata(_))));
        assert!(scan.skipped.iter().any(|(name, _)| name == "Contoso.L299"));
    }

    #[test]
    fn test_dependency_in_workspace_resolves() {
        let tmp = TempDir::new().unwrap();
        let core = write(
            &tmp,
            "Contoso.Core.dll",
            AssemblyBuilder::new("Contoso.Core").version(2, 0, 0, 0).build(),
        );
        let app = write(
            &tmp,
            "Contoso.App.dll",
            AssemblyBuilder::new("Contoso.App")
                .class("Contoso", "Fine", |t| {
                    t.extends(TypeRefSpec::external("Contoso.Core", "Contoso", "Base").at_version(2, 0))
                })
                .class("Contoso", "TooNew", |t| {
                    t.extends(TypeRefSpec::external("Contoso.Core", "Contoso", "Base2").at_version(3, 0))
                })
                .class("Contoso", "Module", |t| t.extends(TypeRefSpec::module("Extra.netmodule", "Contoso", "Base3")))
                .build(),
        );

        let mut ctx = LoadContext::with_default_framework();
        ctx.add_artifacts(&[core, app.clone()]);
        let scan = MetadataInspector::new(&ctx).open(&app).unwrap().scan_types().unwrap();

        assert_eq!(names(&scan.types), ["Contoso.Fine"]);
        let failures: BTreeMap<&str, &LoadFailure> =
            scan.skipped.iter().map(|(n, f)| (n.as_str(), f)).collect();
        assert!(matches!(failures["Contoso.TooNew"], LoadFailure::VersionMismatch { .. }));
        assert!(matches!(failures["Contoso.Module"], LoadFailure::MissingModule(_)));
    }

    #[test]
    fn test_members_declared_and_inherited() {
        let tmp = TempDir::new().unwrap();
        let bytes = AssemblyBuilder::new("Contoso")
            .class("Contoso", "Base", |t| {
                t.method("Shared", &[])
                    .virtual_method("Describe", &[])
                    .static_method("Create", &[])
            })
            .class("Contoso", "Derived", |t| {
                t.extends(TypeRefSpec::local("Contoso", "Base"))
                    .method("Add", &[Param::int32("a"), Param::int32("b")])
                    .override_method("Describe", &[])
                    .private_method("Secret")
                    .constructor()
            })
            .interface("Contoso", "IRunner", |t| t.abstract_method("Run", &[Param::string("name")]))
            .build();
        let path = write(&tmp, "Contoso.dll", bytes);

        let ctx = LoadContext::with_default_framework();
        let assembly = MetadataInspector::new(&ctx).open(&path).unwrap();
        let types = assembly.extract_public_surface().unwrap();
        let derived = types.iter().find(|t| t.name == "Derived").unwrap();

        let members = assembly.extract_public_members(derived).unwrap();
        let summary: Vec<(&str, &str)> = members
            .iter()
            .map(|m| (m.name.as_str(), m.declaring_type.as_str()))
            .collect();
        assert_eq!(
            summary,
            [
                ("Add", "Contoso.Derived"),
                ("Describe", "Contoso.Derived"),
                ("Shared", "Contoso.Base"),
            ]
        );
        assert!(members.iter().all(|m| m.owner == "Contoso.Derived"));

        let add = &members[0];
        assert_eq!(add.parameters.len(), 2);
        assert_eq!(add.parameters[1].name, "b");
        assert_eq!(add.parameters[1].ty, TypeName::Primitive(Primitive::Int32));
        assert!(add.return_type.is_void());
        assert!(members[1].modifiers.is_override);

        let runner = types.iter().find(|t| t.name == "IRunner").unwrap();
        let members = assembly.extract_public_members(runner).unwrap();
        assert_eq!(members.len(), 1);
        assert!(members[0].modifiers.is_abstract);
        assert_eq!(members[0].parameters[0].ty, TypeName::Primitive(Primitive::String));
    }

    #[test]
    fn test_value_types_have_no_members() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "Contoso.dll",
            AssemblyBuilder::new("Contoso").value_type("Contoso", "Point").build(),
        );
        let ctx = LoadContext::with_default_framework();
        let assembly = MetadataInspector::new(&ctx).open(&path).unwrap();
        let types = assembly.extract_public_surface().unwrap();
        assert!(assembly.extract_public_members(&types[0]).unwrap().is_empty());
    }

    #[test]
    fn test_undecodable_method_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let bytes = AssemblyBuilder::new("Contoso")
            .class("Contoso", "Widget", |t| t.method("Good", &[]).raw_method("Bad", &[0x20, 0x01, 0x01, 0x99]))
            .build();
        let path = write(&tmp, "Contoso.dll", bytes);

        let ctx = LoadContext::with_default_framework();
        let assembly = MetadataInspector::new(&ctx).open(&path).unwrap();
        let types = assembly.extract_public_surface().unwrap();
        let members = assembly.extract_public_members(&types[0]).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "Good");
    }

    #[test]
    fn test_fatal_errors() {
        let tmp = TempDir::new().unwrap();
        let ctx = LoadContext::with_default_framework();

        let corrupt = write(&tmp, "Bad.dll", AssemblyBuilder::new("Bad").build_with_corrupt_metadata());
        assert!(matches!(
            extract_public_surface(&corrupt, &ctx),
            Err(MetadataError::Corrupt(_))
        ));

        let missing = tmp.path().join("Missing.dll");
        assert!(matches!(extract_public_surface(&missing, &ctx), Err(MetadataError::Io(_))));
    }

    #[test]
    fn test_cancelled_before_enumeration() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "Contoso.dll",
            AssemblyBuilder::new("Contoso").class("Contoso", "A", |t| t).build(),
        );
        let ctx = LoadContext::with_default_framework();
        let cancel = CancellationToken::new();
        let assembly = MetadataInspector::new(&ctx)
            .with_cancellation(cancel.clone())
            .open(&path)
            .unwrap();
        cancel.cancel();
        assert!(matches!(assembly.scan_types(), Err(MetadataError::Cancelled)));
    }

    #[test]
    fn test_type_def_rid() {
        assert_eq!(type_def_rid(0x0200_0003).unwrap(), 3);
        assert!(type_def_rid(0x0100_0003).is_err());
        assert!(type_def_rid(0x0200_0000).is_err());
    }
}
