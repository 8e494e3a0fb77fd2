//! The `#~` / `#-` table stream (ECMA-335 II.24.2.6).
//!
//! Every table is decoded up front into a flat column store so row access
//! afterwards is plain indexing. Column widths depend on heap sizes and row
//! counts, which is why the whole schema is needed even for tables we never
//! look at.

use std::fmt;

use crate::metadata::heaps::Reader;
use crate::metadata::MetadataError;

/// Metadata table identifiers, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

impl TableId {
    pub const ALL: [TableId; 45] = [
        TableId::Module,
        TableId::TypeRef,
        TableId::TypeDef,
        TableId::FieldPtr,
        TableId::Field,
        TableId::MethodPtr,
        TableId::MethodDef,
        TableId::ParamPtr,
        TableId::Param,
        TableId::InterfaceImpl,
        TableId::MemberRef,
        TableId::Constant,
        TableId::CustomAttribute,
        TableId::FieldMarshal,
        TableId::DeclSecurity,
        TableId::ClassLayout,
        TableId::FieldLayout,
        TableId::StandAloneSig,
        TableId::EventMap,
        TableId::EventPtr,
        TableId::Event,
        TableId::PropertyMap,
        TableId::PropertyPtr,
        TableId::Property,
        TableId::MethodSemantics,
        TableId::MethodImpl,
        TableId::ModuleRef,
        TableId::TypeSpec,
        TableId::ImplMap,
        TableId::FieldRva,
        TableId::EncLog,
        TableId::EncMap,
        TableId::Assembly,
        TableId::AssemblyProcessor,
        TableId::AssemblyOs,
        TableId::AssemblyRef,
        TableId::AssemblyRefProcessor,
        TableId::AssemblyRefOs,
        TableId::File,
        TableId::ExportedType,
        TableId::ManifestResource,
        TableId::NestedClass,
        TableId::GenericParam,
        TableId::MethodSpec,
        TableId::GenericParamConstraint,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    fn columns(self) -> &'static [Col] {
        use CodedIndex as C;
        use Col::*;
        use TableId as T;

        match self {
            T::Module => &[U16, Str, Guid, Guid, Guid],
            T::TypeRef => &[Coded(C::ResolutionScope), Str, Str],
            T::TypeDef => &[U32, Str, Str, Coded(C::TypeDefOrRef), Index(T::Field), Index(T::MethodDef)],
            T::FieldPtr => &[Index(T::Field)],
            T::Field => &[U16, Str, Blob],
            T::MethodPtr => &[Index(T::MethodDef)],
            T::MethodDef => &[U32, U16, U16, Str, Blob, Index(T::Param)],
            T::ParamPtr => &[Index(T::Param)],
            T::Param => &[U16, U16, Str],
            T::InterfaceImpl => &[Index(T::TypeDef), Coded(C::TypeDefOrRef)],
            T::MemberRef => &[Coded(C::MemberRefParent), Str, Blob],
            T::Constant => &[U16, Coded(C::HasConstant), Blob],
            T::CustomAttribute => &[Coded(C::HasCustomAttribute), Coded(C::CustomAttributeType), Blob],
            T::FieldMarshal => &[Coded(C::HasFieldMarshal), Blob],
            T::DeclSecurity => &[U16, Coded(C::HasDeclSecurity), Blob],
            T::ClassLayout => &[U16, U32, Index(T::TypeDef)],
            T::FieldLayout => &[U32, Index(T::Field)],
            T::StandAloneSig => &[Blob],
            T::EventMap => &[Index(T::TypeDef), Index(T::Event)],
            T::EventPtr => &[Index(T::Event)],
            T::Event => &[U16, Str, Coded(C::TypeDefOrRef)],
            T::PropertyMap => &[Index(T::TypeDef), Index(T::Property)],
            T::PropertyPtr => &[Index(T::Property)],
            T::Property => &[U16, Str, Blob],
            T::MethodSemantics => &[U16, Index(T::MethodDef), Coded(C::HasSemantics)],
            T::MethodImpl => &[Index(T::TypeDef), Coded(C::MethodDefOrRef), Coded(C::MethodDefOrRef)],
            T::ModuleRef => &[Str],
            T::TypeSpec => &[Blob],
            T::ImplMap => &[U16, Coded(C::MemberForwarded), Str, Index(T::ModuleRef)],
            T::FieldRva => &[U32, Index(T::Field)],
            T::EncLog => &[U32, U32],
            T::EncMap => &[U32],
            T::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
            T::AssemblyProcessor => &[U32],
            T::AssemblyOs => &[U32, U32, U32],
            T::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
            T::AssemblyRefProcessor => &[U32, Index(T::AssemblyRef)],
            T::AssemblyRefOs => &[U32, U32, U32, Index(T::AssemblyRef)],
            T::File => &[U32, Str, Blob],
            T::ExportedType => &[U32, U32, Str, Str, Coded(C::Implementation)],
            T::ManifestResource => &[U32, U32, Str, Coded(C::Implementation)],
            T::NestedClass => &[Index(T::TypeDef), Index(T::TypeDef)],
            T::GenericParam => &[U16, U16, Coded(C::TypeOrMethodDef), Str],
            T::MethodSpec => &[Coded(C::MethodDefOrRef), Blob],
            T::GenericParamConstraint => &[Index(T::GenericParam), Coded(C::TypeDefOrRef)],
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy)]
enum Col {
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Index(TableId),
    Coded(CodedIndex),
}

/// Coded index kinds (ECMA-335 II.24.2.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedIndex {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl CodedIndex {
    /// Candidate tables by tag. `None` marks tags the format reserves.
    fn tables(self) -> &'static [Option<TableId>] {
        use TableId as T;

        match self {
            CodedIndex::TypeDefOrRef => &[Some(T::TypeDef), Some(T::TypeRef), Some(T::TypeSpec)],
            CodedIndex::HasConstant => &[Some(T::Field), Some(T::Param), Some(T::Property)],
            CodedIndex::HasCustomAttribute => &[
                Some(T::MethodDef),
                Some(T::Field),
                Some(T::TypeRef),
                Some(T::TypeDef),
                Some(T::Param),
                Some(T::InterfaceImpl),
                Some(T::MemberRef),
                Some(T::Module),
                Some(T::DeclSecurity),
                Some(T::Property),
                Some(T::Event),
                Some(T::StandAloneSig),
                Some(T::ModuleRef),
                Some(T::TypeSpec),
                Some(T::Assembly),
                Some(T::AssemblyRef),
                Some(T::File),
                Some(T::ExportedType),
                Some(T::ManifestResource),
                Some(T::GenericParam),
                Some(T::GenericParamConstraint),
                Some(T::MethodSpec),
            ],
            CodedIndex::HasFieldMarshal => &[Some(T::Field), Some(T::Param)],
            CodedIndex::HasDeclSecurity => &[Some(T::TypeDef), Some(T::MethodDef), Some(T::Assembly)],
            CodedIndex::MemberRefParent => &[
                Some(T::TypeDef),
                Some(T::TypeRef),
                Some(T::ModuleRef),
                Some(T::MethodDef),
                Some(T::TypeSpec),
            ],
            CodedIndex::HasSemantics => &[Some(T::Event), Some(T::Property)],
            CodedIndex::MethodDefOrRef => &[Some(T::MethodDef), Some(T::MemberRef)],
            CodedIndex::MemberForwarded => &[Some(T::Field), Some(T::MethodDef)],
            CodedIndex::Implementation => &[Some(T::File), Some(T::AssemblyRef), Some(T::ExportedType)],
            CodedIndex::CustomAttributeType => &[None, None, Some(T::MethodDef), Some(T::MemberRef), None],
            CodedIndex::ResolutionScope => {
                &[Some(T::Module), Some(T::ModuleRef), Some(T::AssemblyRef), Some(T::TypeRef)]
            }
            CodedIndex::TypeOrMethodDef => &[Some(T::TypeDef), Some(T::MethodDef)],
        }
    }

    fn tag_bits(self) -> u32 {
        let count = self.tables().len() as u32;
        u32::BITS - (count - 1).leading_zeros()
    }

    /// Split a coded value into the referenced table and 1-based row.
    pub fn decode(self, value: u32) -> Result<RowRef, MetadataError> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let table = self
            .tables()
            .get(tag)
            .copied()
            .flatten()
            .ok_or_else(|| MetadataError::corrupt(format!("invalid {:?} tag {}", self, tag)))?;
        Ok(RowRef {
            table,
            rid: value >> bits,
        })
    }
}

/// A reference to a table row. `rid == 0` is the null reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowRef {
    pub table: TableId,
    pub rid: u32,
}

impl RowRef {
    pub fn is_null(&self) -> bool {
        self.rid == 0
    }

    /// Metadata token (`0x02000001` for TypeDef row 1).
    pub fn token(&self) -> u32 {
        ((self.table as u32) << 24) | self.rid
    }
}

#[derive(Debug, Clone, Default)]
struct Table {
    rows: u32,
    width: usize,
    values: Vec<u32>,
}

/// Heap index widths from the stream header.
#[derive(Debug, Clone, Copy)]
struct HeapSizes {
    wide_strings: bool,
    wide_guids: bool,
    wide_blobs: bool,
}

/// All decoded metadata tables.
#[derive(Debug, Clone)]
pub struct Tables {
    tables: Vec<Table>,
}

impl Tables {
    pub fn parse(stream: &[u8]) -> Result<Self, MetadataError> {
        let mut reader = Reader::new(stream);
        let _reserved = reader.u32()?;
        let _major = reader.u8()?;
        let _minor = reader.u8()?;
        let heap_flags = reader.u8()?;
        let _reserved = reader.u8()?;
        let valid = reader.u64()?;
        let _sorted = reader.u64()?;

        let heaps = HeapSizes {
            wide_strings: heap_flags & 0x01 != 0,
            wide_guids: heap_flags & 0x02 != 0,
            wide_blobs: heap_flags & 0x04 != 0,
        };

        let mut counts = [0u32; 64];
        for (bit, count) in counts.iter_mut().enumerate() {
            if valid & (1u64 << bit) != 0 {
                *count = reader.u32()?;
            }
        }
        if heap_flags & 0x40 != 0 {
            let _extra = reader.u32()?;
        }

        // Tables past the last known id sit after every table we read, so
        // they can be ignored without knowing their layout.
        let mut tables = Vec::with_capacity(TableId::ALL.len());
        for id in TableId::ALL {
            let rows = counts[id.index()];
            let columns = id.columns();
            let widths: Vec<bool> = columns
                .iter()
                .map(|col| column_is_wide(*col, &counts, heaps))
                .collect();

            let row_bytes: usize = columns
                .iter()
                .zip(&widths)
                .map(|(col, wide)| match col {
                    Col::U16 => 2,
                    Col::U32 => 4,
                    _ if *wide => 4,
                    _ => 2,
                })
                .sum();
            if (rows as u64) * (row_bytes as u64) > reader.remaining() as u64 {
                return Err(MetadataError::corrupt(format!(
                    "{} claims {} rows but the table stream is too short",
                    id, rows
                )));
            }

            let mut values = Vec::with_capacity(rows as usize * columns.len());
            for _ in 0..rows {
                for (col, wide) in columns.iter().zip(&widths) {
                    let value = match col {
                        Col::U16 => u32::from(reader.u16()?),
                        Col::U32 => reader.u32()?,
                        _ => reader.index(*wide)?,
                    };
                    values.push(value);
                }
            }

            tables.push(Table {
                rows,
                width: columns.len(),
                values,
            });
        }

        Ok(Tables { tables })
    }

    pub fn row_count(&self, table: TableId) -> u32 {
        self.tables[table.index()].rows
    }

    /// Column values of a 1-based row.
    pub fn row(&self, table: TableId, rid: u32) -> Result<&[u32], MetadataError> {
        let t = &self.tables[table.index()];
        if rid == 0 || rid > t.rows {
            return Err(MetadataError::corrupt(format!(
                "{} row {} out of range ({} rows)",
                table, rid, t.rows
            )));
        }
        let start = (rid as usize - 1) * t.width;
        Ok(&t.values[start..start + t.width])
    }

    /// Iterate `(rid, columns)` over a table.
    pub fn rows(&self, table: TableId) -> impl Iterator<Item = (u32, &[u32])> + '_ {
        let t = &self.tables[table.index()];
        t.values
            .chunks(t.width.max(1))
            .take(t.rows as usize)
            .enumerate()
            .map(|(i, row)| (i as u32 + 1, row))
    }

    /// Resolve a position in a member list through its `*Ptr` table, if any.
    fn through_ptr(&self, ptr: TableId, index: u32) -> Result<u32, MetadataError> {
        if self.row_count(ptr) == 0 {
            Ok(index)
        } else {
            Ok(self.row(ptr, index)?[0])
        }
    }

    /// The MethodDef rows owned by a TypeDef.
    pub fn methods_of(&self, type_rid: u32) -> Result<Vec<u32>, MetadataError> {
        let (start, end) = self.list_range(TableId::TypeDef, type_rid, 5, TableId::MethodDef, TableId::MethodPtr)?;
        (start..end).map(|i| self.through_ptr(TableId::MethodPtr, i)).collect()
    }

    /// The Param rows owned by a MethodDef.
    pub fn params_of(&self, method_rid: u32) -> Result<Vec<u32>, MetadataError> {
        let (start, end) = self.list_range(TableId::MethodDef, method_rid, 5, TableId::Param, TableId::ParamPtr)?;
        (start..end).map(|i| self.through_ptr(TableId::ParamPtr, i)).collect()
    }

    /// `[start, end)` of the list column `column` of `owner` row `rid`.
    fn list_range(
        &self,
        owner: TableId,
        rid: u32,
        column: usize,
        target: TableId,
        ptr: TableId,
    ) -> Result<(u32, u32), MetadataError> {
        let target_rows = if self.row_count(ptr) > 0 {
            self.row_count(ptr)
        } else {
            self.row_count(target)
        };

        let start = self.row(owner, rid)?[column];
        let end = if rid < self.row_count(owner) {
            self.row(owner, rid + 1)?[column]
        } else {
            target_rows + 1
        };

        if start == 0 && target_rows == 0 {
            return Ok((1, 1));
        }
        if start == 0 || start > end || end > target_rows + 1 {
            return Err(MetadataError::corrupt(format!(
                "{} row {} has invalid {} list [{}, {})",
                owner, rid, target, start, end
            )));
        }
        Ok((start, end))
    }
}

fn column_is_wide(col: Col, counts: &[u32; 64], heaps: HeapSizes) -> bool {
    match col {
        Col::U16 | Col::U32 => false,
        Col::Str => heaps.wide_strings,
        Col::Guid => heaps.wide_guids,
        Col::Blob => heaps.wide_blobs,
        Col::Index(table) => counts[table.index()] > 0xFFFF,
        Col::Coded(coded) => {
            let max = coded
                .tables()
                .iter()
                .flatten()
                .map(|t| counts[t.index()])
                .max()
                .unwrap_or(0);
            max >= (1u32 << (16 - coded.tag_bits()))
        }
    }
}
