//! Minimal managed assembly writer.
//!
//! Produces a PE32 DLL with one `.text` section holding a CLI header and an
//! ECMA-335 metadata root. Only the tables the inspector reads are emitted,
//! all with 2-byte indexes.

use std::collections::HashMap;

use byteorder::{LittleEndian, WriteBytesExt};

const FILE_ALIGNMENT: u32 = 0x200;
const SECTION_ALIGNMENT: u32 = 0x2000;
const TEXT_RVA: u32 = 0x2000;
const PE_OFFSET: u32 = 0x80;
const CLI_HEADER_SIZE: u32 = 72;
const METADATA_VERSION: &str = "v4.0.30319";
const FRAMEWORK_ASSEMBLY: &str = "System.Runtime";

/// Element types a fixture signature may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigType {
    Void,
    Boolean,
    Int32,
    Int64,
    String,
    Object,
    Array(Box<SigType>),
}

impl SigType {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            SigType::Void => out.push(0x01),
            SigType::Boolean => out.push(0x02),
            SigType::Int32 => out.push(0x08),
            SigType::Int64 => out.push(0x0a),
            SigType::String => out.push(0x0e),
            SigType::Object => out.push(0x1c),
            SigType::Array(inner) => {
                out.push(0x1d);
                inner.encode(out);
            }
        }
    }
}

/// A method parameter in a fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: SigType,
    pub out: bool,
}

impl Param {
    pub fn new(name: &str, ty: SigType) -> Self {
        Param {
            name: name.to_string(),
            ty,
            out: false,
        }
    }

    pub fn int32(name: &str) -> Self {
        Param::new(name, SigType::Int32)
    }

    pub fn string(name: &str) -> Self {
        Param::new(name, SigType::String)
    }

    pub fn as_out(mut self) -> Self {
        self.out = true;
        self
    }
}

/// A type referenced from a base-type or interface slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRefSpec {
    /// A type defined in the same assembly (matched by namespace and name)
    Local { namespace: String, name: String },
    /// A type in another assembly
    External {
        assembly: String,
        version: [u16; 4],
        namespace: String,
        name: String,
    },
    /// A type in another module file of the same assembly
    Module {
        module: String,
        namespace: String,
        name: String,
    },
}

impl TypeRefSpec {
    pub fn local(namespace: &str, name: &str) -> Self {
        TypeRefSpec::Local {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn external(assembly: &str, namespace: &str, name: &str) -> Self {
        TypeRefSpec::External {
            assembly: assembly.to_string(),
            version: [1, 0, 0, 0],
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn module(module: &str, namespace: &str, name: &str) -> Self {
        TypeRefSpec::Module {
            module: module.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Require a specific version of an external assembly.
    pub fn at_version(self, major: u16, minor: u16) -> Self {
        match self {
            TypeRefSpec::External {
                assembly,
                namespace,
                name,
                ..
            } => TypeRefSpec::External {
                assembly,
                version: [major, minor, 0, 0],
                namespace,
                name,
            },
            other => other,
        }
    }

    fn framework(namespace: &str, name: &str) -> Self {
        TypeRefSpec::External {
            assembly: FRAMEWORK_ASSEMBLY.to_string(),
            version: [8, 0, 0, 0],
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct MethodSpec {
    name: String,
    flags: u16,
    signature: Vec<u8>,
    params: Vec<Param>,
}

/// Methods and relations of one fixture type.
#[derive(Debug, Clone)]
pub struct TypeBuilder {
    extends: Option<TypeRefSpec>,
    interfaces: Vec<TypeRefSpec>,
    methods: Vec<MethodSpec>,
}

impl TypeBuilder {
    fn new(extends: Option<TypeRefSpec>) -> Self {
        TypeBuilder {
            extends,
            interfaces: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn extends(mut self, base: TypeRefSpec) -> Self {
        self.extends = Some(base);
        self
    }

    pub fn implements(mut self, interface: TypeRefSpec) -> Self {
        self.interfaces.push(interface);
        self
    }

    fn push(mut self, name: &str, flags: u16, is_static: bool, ret: SigType, params: &[Param]) -> Self {
        let mut signature = vec![if is_static { 0x00 } else { 0x20 }, params.len() as u8];
        ret.encode(&mut signature);
        for param in params {
            param.ty.encode(&mut signature);
        }
        self.methods.push(MethodSpec {
            name: name.to_string(),
            flags,
            signature,
            params: params.to_vec(),
        });
        self
    }

    /// `public void Name(params)`
    pub fn method(self, name: &str, params: &[Param]) -> Self {
        self.push(name, 0x0086, false, SigType::Void, params)
    }

    /// `public Ret Name(params)`
    pub fn method_returning(self, name: &str, ret: SigType, params: &[Param]) -> Self {
        self.push(name, 0x0086, false, ret, params)
    }

    pub fn virtual_method(self, name: &str, params: &[Param]) -> Self {
        self.push(name, 0x01C6, false, SigType::Void, params)
    }

    pub fn override_method(self, name: &str, params: &[Param]) -> Self {
        self.push(name, 0x00C6, false, SigType::Void, params)
    }

    pub fn static_method(self, name: &str, params: &[Param]) -> Self {
        self.push(name, 0x0096, true, SigType::Void, params)
    }

    pub fn abstract_method(self, name: &str, params: &[Param]) -> Self {
        self.push(name, 0x05C6, false, SigType::Void, params)
    }

    pub fn private_method(self, name: &str) -> Self {
        self.push(name, 0x0081, false, SigType::Void, &[])
    }

    pub fn constructor(self) -> Self {
        self.push(".ctor", 0x1886, false, SigType::Void, &[])
    }

    /// A public method with a hand-written signature blob.
    pub fn raw_method(mut self, name: &str, signature: &[u8]) -> Self {
        self.methods.push(MethodSpec {
            name: name.to_string(),
            flags: 0x0086,
            signature: signature.to_vec(),
            params: Vec::new(),
        });
        self
    }
}

#[derive(Debug, Clone)]
struct TypeSpecEntry {
    namespace: String,
    name: String,
    flags: u32,
    enclosing: Option<String>,
    body: TypeBuilder,
}

/// Builds a managed DLL in memory.
#[derive(Debug, Clone)]
pub struct AssemblyBuilder {
    name: String,
    version: [u16; 4],
    types: Vec<TypeSpecEntry>,
}

impl AssemblyBuilder {
    pub fn new(name: &str) -> Self {
        AssemblyBuilder {
            name: name.to_string(),
            version: [1, 0, 0, 0],
            types: Vec::new(),
        }
    }

    pub fn version(mut self, major: u16, minor: u16, build: u16, revision: u16) -> Self {
        self.version = [major, minor, build, revision];
        self
    }

    fn add(mut self, namespace: &str, name: &str, flags: u32, enclosing: Option<&str>, body: TypeBuilder) -> Self {
        self.types.push(TypeSpecEntry {
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags,
            enclosing: enclosing.map(str::to_string),
            body,
        });
        self
    }

    /// A public class deriving from `System.Object` unless `build` says otherwise.
    pub fn class(self, namespace: &str, name: &str, build: impl FnOnce(TypeBuilder) -> TypeBuilder) -> Self {
        let body = build(TypeBuilder::new(Some(TypeRefSpec::framework("System", "Object"))));
        self.add(namespace, name, 0x0000_0001, None, body)
    }

    pub fn internal_class(self, namespace: &str, name: &str) -> Self {
        let body = TypeBuilder::new(Some(TypeRefSpec::framework("System", "Object")));
        self.add(namespace, name, 0x0000_0000, None, body)
    }

    pub fn interface(self, namespace: &str, name: &str, build: impl FnOnce(TypeBuilder) -> TypeBuilder) -> Self {
        let body = build(TypeBuilder::new(None));
        self.add(namespace, name, 0x0000_00A1, None, body)
    }

    pub fn value_type(self, namespace: &str, name: &str) -> Self {
        let body = TypeBuilder::new(Some(TypeRefSpec::framework("System", "ValueType")));
        self.add(namespace, name, 0x0000_0101, None, body)
    }

    pub fn enumeration(self, namespace: &str, name: &str) -> Self {
        let body = TypeBuilder::new(Some(TypeRefSpec::framework("System", "Enum")));
        self.add(namespace, name, 0x0000_0101, None, body)
    }

    /// A class nested in the earlier type named `outer`.
    pub fn nested_class(self, outer: &str, name: &str, public: bool) -> Self {
        let body = TypeBuilder::new(Some(TypeRefSpec::framework("System", "Object")));
        let flags = if public { 0x0000_0002 } else { 0x0000_0003 };
        self.add("", name, flags, Some(outer), body)
    }

    pub fn build(&self) -> Vec<u8> {
        write_pe(Some(&self.metadata()))
    }

    /// A valid PE whose metadata root signature is wrong.
    pub fn build_with_corrupt_metadata(&self) -> Vec<u8> {
        let mut metadata = self.metadata();
        metadata[..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        write_pe(Some(&metadata))
    }

    /// A valid PE with no CLI header.
    pub fn native_image() -> Vec<u8> {
        write_pe(None)
    }

    fn metadata(&self) -> Vec<u8> {
        let mut heaps = Heaps::new();
        let mut refs = RefTables::default();

        let type_rid: HashMap<(String, String), u32> = self
            .types
            .iter()
            .enumerate()
            .map(|(i, t)| ((t.namespace.clone(), t.name.clone()), i as u32 + 2))
            .collect();
        let rid_by_name: HashMap<&str, u32> = self
            .types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.as_str(), i as u32 + 2))
            .collect();

        let mut encode = |spec: &TypeRefSpec, heaps: &mut Heaps| -> u16 {
            match spec {
                TypeRefSpec::Local { namespace, name } => {
                    let rid = type_rid
                        .get(&(namespace.clone(), name.clone()))
                        .copied()
                        .unwrap_or_else(|| panic!("unknown local type {}.{}", namespace, name));
                    (rid << 2) as u16
                }
                other => (refs.type_ref(other, heaps) << 2 | 1) as u16,
            }
        };

        // TypeDef rows; row 1 is <Module>
        let mut type_defs = Vec::new();
        let mut methods: Vec<(u16, u16, u16, u16)> = Vec::new();
        let mut params: Vec<(u16, u16, u16)> = Vec::new();
        let mut interface_impls = Vec::new();
        let mut nested = Vec::new();

        type_defs.push((0u32, heaps.string("<Module>"), 0u16, 0u16, 1u16));
        for (i, t) in self.types.iter().enumerate() {
            let rid = i as u32 + 2;
            let extends = t.body.extends.as_ref().map(|e| encode(e, &mut heaps)).unwrap_or(0);
            let method_list = methods.len() as u16 + 1;
            for method in &t.body.methods {
                let param_list = params.len() as u16 + 1;
                for (seq, param) in method.params.iter().enumerate() {
                    let flags = if param.out { 0x0002 } else { 0 };
                    params.push((flags, seq as u16 + 1, heaps.string(&param.name)));
                }
                methods.push((
                    method.flags,
                    heaps.string(&method.name),
                    heaps.blob(&method.signature),
                    param_list,
                ));
            }
            for interface in &t.body.interfaces {
                let encoded = encode(interface, &mut heaps);
                interface_impls.push((rid as u16, encoded));
            }
            if let Some(outer) = &t.enclosing {
                let outer_rid = rid_by_name
                    .get(outer.as_str())
                    .copied()
                    .unwrap_or_else(|| panic!("unknown enclosing type {}", outer));
                nested.push((rid as u16, outer_rid as u16));
            }
            type_defs.push((t.flags, heaps.string(&t.name), heaps.string(&t.namespace), extends, method_list));
        }
        let module_name = heaps.string(&format!("{}.dll", self.name));
        let assembly_name = heaps.string(&self.name);

        let mut tables = Vec::new();
        let mut rows: Vec<(u8, u32)> = Vec::new();

        // Module
        rows.push((0x00, 1));
        w16(&mut tables, 0);
        w16(&mut tables, module_name);
        w16(&mut tables, 1);
        w16(&mut tables, 0);
        w16(&mut tables, 0);

        // TypeRef
        if !refs.type_refs.is_empty() {
            rows.push((0x01, refs.type_refs.len() as u32));
            for (scope, name, namespace) in &refs.type_refs {
                w16(&mut tables, *scope);
                w16(&mut tables, *name);
                w16(&mut tables, *namespace);
            }
        }

        // TypeDef
        rows.push((0x02, type_defs.len() as u32));
        for (flags, name, namespace, extends, method_list) in &type_defs {
            w32(&mut tables, *flags);
            w16(&mut tables, *name);
            w16(&mut tables, *namespace);
            w16(&mut tables, *extends);
            w16(&mut tables, 1);
            w16(&mut tables, *method_list);
        }

        // MethodDef
        if !methods.is_empty() {
            rows.push((0x06, methods.len() as u32));
            for (flags, name, signature, param_list) in &methods {
                w32(&mut tables, 0);
                w16(&mut tables, 0);
                w16(&mut tables, *flags);
                w16(&mut tables, *name);
                w16(&mut tables, *signature);
                w16(&mut tables, *param_list);
            }
        }

        // Param
        if !params.is_empty() {
            rows.push((0x08, params.len() as u32));
            for (flags, sequence, name) in &params {
                w16(&mut tables, *flags);
                w16(&mut tables, *sequence);
                w16(&mut tables, *name);
            }
        }

        // InterfaceImpl
        if !interface_impls.is_empty() {
            rows.push((0x09, interface_impls.len() as u32));
            for (class, interface) in &interface_impls {
                w16(&mut tables, *class);
                w16(&mut tables, *interface);
            }
        }

        // ModuleRef
        if !refs.module_refs.is_empty() {
            rows.push((0x1A, refs.module_refs.len() as u32));
            for name in &refs.module_refs {
                w16(&mut tables, *name);
            }
        }

        // Assembly
        rows.push((0x20, 1));
        w32(&mut tables, 0x8004);
        for part in self.version {
            w16(&mut tables, part);
        }
        w32(&mut tables, 0);
        w16(&mut tables, 0);
        w16(&mut tables, assembly_name);
        w16(&mut tables, 0);

        // AssemblyRef
        if !refs.assembly_refs.is_empty() {
            rows.push((0x23, refs.assembly_refs.len() as u32));
            for (name, version) in &refs.assembly_refs {
                for part in version {
                    w16(&mut tables, *part);
                }
                w32(&mut tables, 0);
                w16(&mut tables, 0);
                w16(&mut tables, *name);
                w16(&mut tables, 0);
                w16(&mut tables, 0);
            }
        }

        // NestedClass
        if !nested.is_empty() {
            rows.push((0x29, nested.len() as u32));
            for (inner, outer) in &nested {
                w16(&mut tables, *inner);
                w16(&mut tables, *outer);
            }
        }

        let mut table_stream = Vec::new();
        w32(&mut table_stream, 0);
        table_stream.push(2);
        table_stream.push(0);
        table_stream.push(0);
        table_stream.push(1);
        let valid = rows.iter().fold(0u64, |acc, (id, _)| acc | (1u64 << id));
        table_stream.write_u64::<LittleEndian>(valid).unwrap();
        table_stream.write_u64::<LittleEndian>(0).unwrap();
        for (_, count) in &rows {
            w32(&mut table_stream, *count);
        }
        table_stream.extend_from_slice(&tables);

        let mut guid = vec![0u8; 16];
        guid[0] = 1;

        metadata_root(&[
            ("#~", table_stream),
            ("#Strings", heaps.strings),
            ("#GUID", guid),
            ("#Blob", heaps.blobs),
        ])
    }
}

#[derive(Debug, Default)]
struct RefTables {
    /// (resolution scope, name, namespace)
    type_refs: Vec<(u16, u16, u16)>,
    /// (name, version)
    assembly_refs: Vec<(u16, [u16; 4])>,
    module_refs: Vec<u16>,
}

impl RefTables {
    /// TypeRef rid for a non-local reference, adding rows as needed.
    fn type_ref(&mut self, spec: &TypeRefSpec, heaps: &mut Heaps) -> u32 {
        let (scope, namespace, name) = match spec {
            TypeRefSpec::External {
                assembly,
                version,
                namespace,
                name,
            } => {
                let assembly = heaps.string(assembly);
                let rid = match self
                    .assembly_refs
                    .iter()
                    .position(|(n, v)| *n == assembly && v == version)
                {
                    Some(i) => i + 1,
                    None => {
                        self.assembly_refs.push((assembly, *version));
                        self.assembly_refs.len()
                    }
                };
                (((rid as u16) << 2) | 2, namespace, name)
            }
            TypeRefSpec::Module {
                module,
                namespace,
                name,
            } => {
                let module = heaps.string(module);
                let rid = match self.module_refs.iter().position(|n| *n == module) {
                    Some(i) => i + 1,
                    None => {
                        self.module_refs.push(module);
                        self.module_refs.len()
                    }
                };
                (((rid as u16) << 2) | 1, namespace, name)
            }
            TypeRefSpec::Local { .. } => unreachable!("local types are TypeDefs"),
        };

        let row = (scope, heaps.string(name), heaps.string(namespace));
        match self.type_refs.iter().position(|r| *r == row) {
            Some(i) => i as u32 + 1,
            None => {
                self.type_refs.push(row);
                self.type_refs.len() as u32
            }
        }
    }
}

struct Heaps {
    strings: Vec<u8>,
    string_index: HashMap<String, u16>,
    blobs: Vec<u8>,
}

impl Heaps {
    fn new() -> Self {
        Heaps {
            strings: vec![0],
            string_index: HashMap::new(),
            blobs: vec![0],
        }
    }

    fn string(&mut self, value: &str) -> u16 {
        if value.is_empty() {
            return 0;
        }
        if let Some(&index) = self.string_index.get(value) {
            return index;
        }
        let index = self.strings.len() as u16;
        self.strings.extend_from_slice(value.as_bytes());
        self.strings.push(0);
        self.string_index.insert(value.to_string(), index);
        index
    }

    fn blob(&mut self, value: &[u8]) -> u16 {
        let index = self.blobs.len() as u16;
        let len = value.len() as u32;
        if len < 0x80 {
            self.blobs.push(len as u8);
        } else {
            self.blobs.push(0x80 | (len >> 8) as u8);
            self.blobs.push(len as u8);
        }
        self.blobs.extend_from_slice(value);
        index
    }
}

fn w16(out: &mut Vec<u8>, value: u16) {
    out.write_u16::<LittleEndian>(value).unwrap();
}

fn w32(out: &mut Vec<u8>, value: u32) {
    out.write_u32::<LittleEndian>(value).unwrap();
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn metadata_root(streams: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut version = METADATA_VERSION.as_bytes().to_vec();
    version.push(0);
    pad4(&mut version);

    let mut header = Vec::new();
    w32(&mut header, 0x424A_5342);
    w16(&mut header, 1);
    w16(&mut header, 1);
    w32(&mut header, 0);
    w32(&mut header, version.len() as u32);
    header.extend_from_slice(&version);
    w16(&mut header, 0);
    w16(&mut header, streams.len() as u16);

    let headers_len: usize = streams
        .iter()
        .map(|(name, _)| 8 + ((name.len() + 4) & !3))
        .sum();
    let mut offset = header.len() + headers_len;

    let mut body = Vec::new();
    for (name, data) in streams {
        let mut data = data.clone();
        pad4(&mut data);
        w32(&mut header, offset as u32);
        w32(&mut header, data.len() as u32);
        header.extend_from_slice(name.as_bytes());
        header.push(0);
        pad4(&mut header);
        offset += data.len();
        body.extend_from_slice(&data);
    }

    header.extend_from_slice(&body);
    header
}

fn align(value: u32, to: u32) -> u32 {
    value.div_ceil(to) * to
}

/// Lay out a PE32 DLL whose `.text` section holds the CLI header and metadata.
fn write_pe(metadata: Option<&[u8]>) -> Vec<u8> {
    let mut text = Vec::new();
    let mut clr_dir = (0u32, 0u32);

    if let Some(metadata) = metadata {
        let metadata_rva = TEXT_RVA + CLI_HEADER_SIZE;
        w32(&mut text, CLI_HEADER_SIZE);
        w16(&mut text, 2);
        w16(&mut text, 5);
        w32(&mut text, metadata_rva);
        w32(&mut text, metadata.len() as u32);
        w32(&mut text, 0x0000_0001);
        w32(&mut text, 0);
        text.resize(CLI_HEADER_SIZE as usize, 0);
        text.extend_from_slice(metadata);
        clr_dir = (TEXT_RVA, CLI_HEADER_SIZE);
    } else {
        // ret
        text.push(0xC3);
    }

    let virtual_size = text.len() as u32;
    let raw_size = align(virtual_size, FILE_ALIGNMENT);
    text.resize(raw_size as usize, 0);

    let mut pe = vec![0u8; PE_OFFSET as usize];
    pe[0] = b'M';
    pe[1] = b'Z';
    pe[0x3C..0x40].copy_from_slice(&PE_OFFSET.to_le_bytes());

    pe.extend_from_slice(b"PE\0\0");

    // COFF header
    w16(&mut pe, 0x014C);
    w16(&mut pe, 1);
    w32(&mut pe, 0);
    w32(&mut pe, 0);
    w32(&mut pe, 0);
    w16(&mut pe, 224);
    w16(&mut pe, 0x2102);

    // Optional header, standard fields
    w16(&mut pe, 0x010B);
    pe.push(8);
    pe.push(0);
    w32(&mut pe, raw_size);
    w32(&mut pe, 0);
    w32(&mut pe, 0);
    w32(&mut pe, 0);
    w32(&mut pe, TEXT_RVA);
    w32(&mut pe, 0);

    // Windows fields
    w32(&mut pe, 0x1000_0000);
    w32(&mut pe, SECTION_ALIGNMENT);
    w32(&mut pe, FILE_ALIGNMENT);
    w16(&mut pe, 4);
    w16(&mut pe, 0);
    w16(&mut pe, 0);
    w16(&mut pe, 0);
    w16(&mut pe, 4);
    w16(&mut pe, 0);
    w32(&mut pe, 0);
    w32(&mut pe, TEXT_RVA + align(virtual_size, SECTION_ALIGNMENT));
    w32(&mut pe, FILE_ALIGNMENT);
    w32(&mut pe, 0);
    w16(&mut pe, 3);
    w16(&mut pe, 0x8540);
    w32(&mut pe, 0x0010_0000);
    w32(&mut pe, 0x1000);
    w32(&mut pe, 0x0010_0000);
    w32(&mut pe, 0x1000);
    w32(&mut pe, 0);
    w32(&mut pe, 16);

    // Data directories; index 14 is the CLI header
    for index in 0..16 {
        if index == 14 {
            w32(&mut pe, clr_dir.0);
            w32(&mut pe, clr_dir.1);
        } else {
            w32(&mut pe, 0);
            w32(&mut pe, 0);
        }
    }

    // Section table
    pe.extend_from_slice(b".text\0\0\0");
    w32(&mut pe, virtual_size);
    w32(&mut pe, TEXT_RVA);
    w32(&mut pe, raw_size);
    w32(&mut pe, FILE_ALIGNMENT);
    w32(&mut pe, 0);
    w32(&mut pe, 0);
    w16(&mut pe, 0);
    w16(&mut pe, 0);
    w32(&mut pe, 0x6000_0020);

    pe.resize(FILE_ALIGNMENT as usize, 0);
    pe.extend_from_slice(&text);
    pe
}
