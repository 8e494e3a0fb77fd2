//! PE image and metadata root location.

use goblin::pe::PE;

use crate::metadata::heaps::{BlobHeap, Reader, StringHeap};
use crate::metadata::tables::Tables;
use crate::metadata::MetadataError;

/// "BSJB"
const METADATA_SIGNATURE: u32 = 0x424A_5342;

/// CLI header size (ECMA-335 II.25.3.3).
const CLI_HEADER_SIZE: usize = 72;

/// The decoded metadata of one managed image.
#[derive(Debug, Clone)]
pub struct MetadataImage {
    pub version: String,
    pub strings: StringHeap,
    pub blobs: BlobHeap,
    pub tables: Tables,
}

impl MetadataImage {
    /// Locate and decode the metadata of a PE file.
    pub fn parse(bytes: &[u8]) -> Result<Self, MetadataError> {
        if bytes.len() < 2 || &bytes[..2] != b"MZ" {
            return Err(MetadataError::NotManaged("missing MZ signature".to_string()));
        }

        let pe = PE::parse(bytes).map_err(|e| MetadataError::corrupt(format!("invalid PE image: {}", e)))?;
        let optional = pe
            .header
            .optional_header
            .as_ref()
            .ok_or_else(|| MetadataError::NotManaged("PE image has no optional header".to_string()))?;

        let (cli_rva, cli_size) = optional
            .data_directories
            .get_clr_runtime_header()
            .as_ref()
            .map(|dir| (dir.virtual_address, dir.size))
            .filter(|(rva, _)| *rva != 0)
            .ok_or_else(|| MetadataError::NotManaged("PE image has no CLI header".to_string()))?;
        if (cli_size as usize) < CLI_HEADER_SIZE {
            return Err(MetadataError::corrupt("CLI header too small"));
        }

        let cli_offset = rva_to_offset(&pe, cli_rva)?;
        let mut cli = Reader::at(bytes, cli_offset)?;
        let _cb = cli.u32()?;
        let _runtime_major = cli.u16()?;
        let _runtime_minor = cli.u16()?;
        let metadata_rva = cli.u32()?;
        let metadata_size = cli.u32()?;

        let metadata_offset = rva_to_offset(&pe, metadata_rva)?;
        let metadata = bytes
            .get(metadata_offset..metadata_offset.saturating_add(metadata_size as usize))
            .ok_or_else(|| MetadataError::corrupt("metadata extends past end of file"))?;

        parse_metadata_root(metadata)
    }
}

fn rva_to_offset(pe: &PE<'_>, rva: u32) -> Result<usize, MetadataError> {
    let section = pe
        .sections
        .iter()
        .find(|section| {
            let size = section.virtual_size.max(section.size_of_raw_data);
            rva >= section.virtual_address && rva < section.virtual_address.saturating_add(size)
        })
        .ok_or_else(|| MetadataError::corrupt(format!("RVA {:#x} is not inside any section", rva)))?;

    // File offsets are 32-bit; anything wider points outside the image.
    let offset = u64::from(rva - section.virtual_address) + u64::from(section.pointer_to_raw_data);
    u32::try_from(offset)
        .ok()
        .and_then(|offset| usize::try_from(offset).ok())
        .ok_or_else(|| MetadataError::corrupt("section offset out of range"))
}

/// Decode the metadata root (ECMA-335 II.24.2.1) and its streams.
fn parse_metadata_root(metadata: &[u8]) -> Result<MetadataImage, MetadataError> {
    let mut root = Reader::new(metadata);
    if root.u32()? != METADATA_SIGNATURE {
        return Err(MetadataError::corrupt("bad metadata signature"));
    }
    let _major = root.u16()?;
    let _minor = root.u16()?;
    let _reserved = root.u32()?;
    let version_len = root.u32()? as usize;
    let version = root.bytes(version_len)?;
    let version = String::from_utf8_lossy(version)
        .trim_end_matches('\0')
        .to_string();
    let _flags = root.u16()?;
    let stream_count = root.u16()?;

    let mut strings = None;
    let mut blobs = None;
    let mut table_stream = None;

    for _ in 0..stream_count {
        let offset = root.u32()? as usize;
        let size = root.u32()? as usize;
        let name = root.padded_name()?;
        let data = metadata
            .get(offset..offset.saturating_add(size))
            .ok_or_else(|| MetadataError::corrupt(format!("stream {} out of bounds", name)))?;

        match name.as_str() {
            "#Strings" => strings = Some(StringHeap::new(data.to_vec())),
            "#Blob" => blobs = Some(BlobHeap::new(data.to_vec())),
            "#~" | "#-" => table_stream = Some(data),
            _ => {}
        }
    }

    let table_stream = table_stream.ok_or_else(|| MetadataError::corrupt("missing #~ stream"))?;

    Ok(MetadataImage {
        version,
        strings: strings.unwrap_or_default(),
        blobs: blobs.unwrap_or_default(),
        tables: Tables::parse(table_stream)?,
    })
}
