//! Signature blob decoding (ECMA-335 II.23.2).
//!
//! Blobs decode into [`TypeSig`], which still points at table rows. The
//! inspector resolves those into [`TypeName`], which is self-contained and is
//! what renderers see.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::heaps::Reader;
use crate::metadata::tables::{CodedIndex, RowRef};
use crate::metadata::{MetadataError, MAX_NESTING};

const ELEMENT_VOID: u8 = 0x01;
const ELEMENT_PTR: u8 = 0x0f;
const ELEMENT_BYREF: u8 = 0x10;
const ELEMENT_VALUETYPE: u8 = 0x11;
const ELEMENT_CLASS: u8 = 0x12;
const ELEMENT_VAR: u8 = 0x13;
const ELEMENT_ARRAY: u8 = 0x14;
const ELEMENT_GENERICINST: u8 = 0x15;
const ELEMENT_TYPEDBYREF: u8 = 0x16;
const ELEMENT_FNPTR: u8 = 0x1b;
const ELEMENT_SZARRAY: u8 = 0x1d;
const ELEMENT_MVAR: u8 = 0x1e;
const ELEMENT_CMOD_REQD: u8 = 0x1f;
const ELEMENT_CMOD_OPT: u8 = 0x20;
const ELEMENT_SENTINEL: u8 = 0x41;
const ELEMENT_PINNED: u8 = 0x45;

const CALLCONV_GENERIC: u8 = 0x10;
const CALLCONV_HASTHIS: u8 = 0x20;

/// Highest array rank the runtime accepts.
pub const MAX_ARRAY_RANK: u32 = 32;

/// Built-in element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Void,
    Boolean,
    Char,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    String,
    Object,
    IntPtr,
    UIntPtr,
    TypedReference,
}

impl Primitive {
    fn from_element(element: u8) -> Option<Primitive> {
        Some(match element {
            0x01 => Primitive::Void,
            0x02 => Primitive::Boolean,
            0x03 => Primitive::Char,
            0x04 => Primitive::SByte,
            0x05 => Primitive::Byte,
            0x06 => Primitive::Int16,
            0x07 => Primitive::UInt16,
            0x08 => Primitive::Int32,
            0x09 => Primitive::UInt32,
            0x0a => Primitive::Int64,
            0x0b => Primitive::UInt64,
            0x0c => Primitive::Single,
            0x0d => Primitive::Double,
            0x0e => Primitive::String,
            0x16 => Primitive::TypedReference,
            0x18 => Primitive::IntPtr,
            0x19 => Primitive::UIntPtr,
            0x1c => Primitive::Object,
            _ => return None,
        })
    }

    /// CLR type name, as used in documentation ids.
    pub fn clr_name(self) -> &'static str {
        match self {
            Primitive::Void => "System.Void",
            Primitive::Boolean => "System.Boolean",
            Primitive::Char => "System.Char",
            Primitive::SByte => "System.SByte",
            Primitive::Byte => "System.Byte",
            Primitive::Int16 => "System.Int16",
            Primitive::UInt16 => "System.UInt16",
            Primitive::Int32 => "System.Int32",
            Primitive::UInt32 => "System.UInt32",
            Primitive::Int64 => "System.Int64",
            Primitive::UInt64 => "System.UInt64",
            Primitive::Single => "System.Single",
            Primitive::Double => "System.Double",
            Primitive::String => "System.String",
            Primitive::Object => "System.Object",
            Primitive::IntPtr => "System.IntPtr",
            Primitive::UIntPtr => "System.UIntPtr",
            Primitive::TypedReference => "System.TypedReference",
        }
    }
}

/// A decoded type signature that may still reference table rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSig {
    Primitive(Primitive),
    /// Class or value type defined by a TypeDef, TypeRef or TypeSpec row
    Named(RowRef),
    /// `!n`, a type-level generic parameter
    Var(u32),
    /// `!!n`, a method-level generic parameter
    MethodVar(u32),
    SzArray(Box<TypeSig>),
    Array { element: Box<TypeSig>, rank: u32 },
    Pointer(Box<TypeSig>),
    ByRef(Box<TypeSig>),
    GenericInst { definition: Box<TypeSig>, args: Vec<TypeSig> },
    FnPtr,
}

impl TypeSig {
    /// Every row this signature references, outermost first.
    pub fn referenced_rows(&self) -> Vec<RowRef> {
        let mut rows = Vec::new();
        self.collect_rows(&mut rows);
        rows
    }

    fn collect_rows(&self, rows: &mut Vec<RowRef>) {
        match self {
            TypeSig::Named(row) => rows.push(*row),
            TypeSig::SzArray(inner)
            | TypeSig::Array { element: inner, .. }
            | TypeSig::Pointer(inner)
            | TypeSig::ByRef(inner) => inner.collect_rows(rows),
            TypeSig::GenericInst { definition, args } => {
                definition.collect_rows(rows);
                for arg in args {
                    arg.collect_rows(rows);
                }
            }
            TypeSig::Primitive(_) | TypeSig::Var(_) | TypeSig::MethodVar(_) | TypeSig::FnPtr => {}
        }
    }
}

/// A decoded method signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    pub has_this: bool,
    pub generic_count: u32,
    pub return_type: TypeSig,
    pub params: Vec<TypeSig>,
}

impl MethodSig {
    pub fn parse(blob: &[u8]) -> Result<Self, MetadataError> {
        let mut reader = Reader::new(blob);
        read_method_sig(&mut reader, 0)
    }
}

/// Decode a standalone type signature (a TypeSpec blob).
pub fn parse_type_spec(blob: &[u8]) -> Result<TypeSig, MetadataError> {
    let mut reader = Reader::new(blob);
    read_type(&mut reader, 0)
}

fn read_method_sig(reader: &mut Reader<'_>, depth: usize) -> Result<MethodSig, MetadataError> {
    enter(depth)?;
    let conv = reader.u8()?;
    let generic_count = if conv & CALLCONV_GENERIC != 0 {
        reader.compressed_u32()?
    } else {
        0
    };
    let count = reader.compressed_u32()?;
    if count as usize > reader.remaining() {
        return Err(MetadataError::corrupt("method signature parameter count exceeds blob"));
    }

    let return_type = read_param_or_ret(reader, depth + 1)?;
    let mut params = Vec::with_capacity(count as usize);
    while params.len() < count as usize {
        if peek(reader)? == ELEMENT_SENTINEL {
            reader.u8()?;
            continue;
        }
        params.push(read_param_or_ret(reader, depth + 1)?);
    }

    Ok(MethodSig {
        has_this: conv & CALLCONV_HASTHIS != 0,
        generic_count,
        return_type,
        params,
    })
}

fn enter(depth: usize) -> Result<(), MetadataError> {
    if depth > MAX_NESTING {
        return Err(MetadataError::corrupt("signature nests too deeply"));
    }
    Ok(())
}

fn peek(reader: &Reader<'_>) -> Result<u8, MetadataError> {
    reader.clone().u8()
}

fn skip_custom_mods(reader: &mut Reader<'_>) -> Result<(), MetadataError> {
    while matches!(peek(reader)?, ELEMENT_CMOD_REQD | ELEMENT_CMOD_OPT) {
        reader.u8()?;
        reader.compressed_u32()?;
    }
    Ok(())
}

fn read_param_or_ret(reader: &mut Reader<'_>, depth: usize) -> Result<TypeSig, MetadataError> {
    enter(depth)?;
    skip_custom_mods(reader)?;
    match peek(reader)? {
        ELEMENT_BYREF => {
            reader.u8()?;
            skip_custom_mods(reader)?;
            Ok(TypeSig::ByRef(Box::new(read_type(reader, depth + 1)?)))
        }
        ELEMENT_VOID => {
            reader.u8()?;
            Ok(TypeSig::Primitive(Primitive::Void))
        }
        ELEMENT_TYPEDBYREF => {
            reader.u8()?;
            Ok(TypeSig::Primitive(Primitive::TypedReference))
        }
        _ => read_type(reader, depth),
    }
}

fn read_type_def_or_ref(reader: &mut Reader<'_>) -> Result<RowRef, MetadataError> {
    let encoded = reader.compressed_u32()?;
    CodedIndex::TypeDefOrRef.decode(encoded)
}

fn read_type(reader: &mut Reader<'_>, depth: usize) -> Result<TypeSig, MetadataError> {
    enter(depth)?;
    let element = reader.u8()?;
    if let Some(primitive) = Primitive::from_element(element) {
        return Ok(TypeSig::Primitive(primitive));
    }

    match element {
        ELEMENT_CLASS | ELEMENT_VALUETYPE => Ok(TypeSig::Named(read_type_def_or_ref(reader)?)),
        ELEMENT_VAR => Ok(TypeSig::Var(reader.compressed_u32()?)),
        ELEMENT_MVAR => Ok(TypeSig::MethodVar(reader.compressed_u32()?)),
        ELEMENT_SZARRAY => {
            skip_custom_mods(reader)?;
            Ok(TypeSig::SzArray(Box::new(read_type(reader, depth + 1)?)))
        }
        ELEMENT_PTR => {
            skip_custom_mods(reader)?;
            if peek(reader)? == ELEMENT_VOID {
                reader.u8()?;
                return Ok(TypeSig::Pointer(Box::new(TypeSig::Primitive(Primitive::Void))));
            }
            Ok(TypeSig::Pointer(Box::new(read_type(reader, depth + 1)?)))
        }
        ELEMENT_BYREF => Ok(TypeSig::ByRef(Box::new(read_type(reader, depth + 1)?))),
        ELEMENT_ARRAY => {
            let element = read_type(reader, depth + 1)?;
            let rank = reader.compressed_u32()?;
            if rank == 0 || rank > MAX_ARRAY_RANK {
                return Err(MetadataError::corrupt(format!("array rank {} out of range", rank)));
            }
            let sizes = reader.compressed_u32()?;
            for _ in 0..sizes {
                reader.compressed_u32()?;
            }
            let bounds = reader.compressed_u32()?;
            for _ in 0..bounds {
                reader.compressed_u32()?;
            }
            Ok(TypeSig::Array {
                element: Box::new(element),
                rank,
            })
        }
        ELEMENT_GENERICINST => {
            let kind = reader.u8()?;
            if kind != ELEMENT_CLASS && kind != ELEMENT_VALUETYPE {
                return Err(MetadataError::corrupt(format!(
                    "generic instantiation of element type {:#04x}",
                    kind
                )));
            }
            let definition = TypeSig::Named(read_type_def_or_ref(reader)?);
            let count = reader.compressed_u32()?;
            if count as usize > reader.remaining() {
                return Err(MetadataError::corrupt("generic argument count exceeds blob"));
            }
            let args = (0..count)
                .map(|_| read_type(reader, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TypeSig::GenericInst {
                definition: Box::new(definition),
                args,
            })
        }
        ELEMENT_FNPTR => {
            read_method_sig(reader, depth + 1)?;
            Ok(TypeSig::FnPtr)
        }
        ELEMENT_CMOD_REQD | ELEMENT_CMOD_OPT => {
            reader.compressed_u32()?;
            read_type(reader, depth + 1)
        }
        ELEMENT_PINNED => read_type(reader, depth + 1),
        other => Err(MetadataError::corrupt(format!(
            "unsupported element type {:#04x} in signature",
            other
        ))),
    }
}

/// A fully resolved type reference, independent of any metadata image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeName {
    Primitive(Primitive),
    /// A named type: `Ns.Outer+Inner` or ``System.Collections.Generic.List`1``
    Named { full_name: String, args: Vec<TypeName> },
    /// Generic parameter by position and declared name
    GenericParam { name: String, index: u32, method: bool },
    SzArray(Box<TypeName>),
    Array { element: Box<TypeName>, rank: u32 },
    Pointer(Box<TypeName>),
    ByRef(Box<TypeName>),
    FnPtr,
}

impl TypeName {
    pub fn named(full_name: impl Into<String>) -> Self {
        TypeName::Named {
            full_name: full_name.into(),
            args: Vec::new(),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeName::Primitive(Primitive::Void))
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::Primitive(p) => write!(f, "{}", p.clr_name()),
            TypeName::Named { full_name, args } => {
                write!(f, "{}", full_name)?;
                if !args.is_empty() {
                    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "[{}]", args.join(","))?;
                }
                Ok(())
            }
            TypeName::GenericParam { name, .. } => write!(f, "{}", name),
            TypeName::SzArray(inner) => write!(f, "{}[]", inner),
            TypeName::Array { element, rank } => {
                write!(f, "{}[{}]", element, ",".repeat(rank.saturating_sub(1) as usize))
            }
            TypeName::Pointer(inner) => write!(f, "{}*", inner),
            TypeName::ByRef(inner) => write!(f, "{}&", inner),
            TypeName::FnPtr => write!(f, "method*"),
        }
    }
}
