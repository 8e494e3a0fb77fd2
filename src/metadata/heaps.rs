//! Metadata heaps and the little-endian reader they share.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::metadata::MetadataError;

/// Bounds-checked little-endian reader over a metadata slice.
///
/// Running off the end is always reported as corrupt metadata, never as I/O.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader {
            cursor: Cursor::new(bytes),
        }
    }

    pub fn at(bytes: &'a [u8], position: usize) -> Result<Self, MetadataError> {
        if position > bytes.len() {
            return Err(MetadataError::corrupt("offset past end of data"));
        }
        let mut reader = Reader::new(bytes);
        reader.cursor.set_position(position as u64);
        Ok(reader)
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    pub fn u8(&mut self) -> Result<u8, MetadataError> {
        self.cursor.read_u8().map_err(truncated)
    }

    pub fn u16(&mut self) -> Result<u16, MetadataError> {
        self.cursor.read_u16::<LittleEndian>().map_err(truncated)
    }

    pub fn u32(&mut self) -> Result<u32, MetadataError> {
        self.cursor.read_u32::<LittleEndian>().map_err(truncated)
    }

    pub fn u64(&mut self) -> Result<u64, MetadataError> {
        self.cursor.read_u64::<LittleEndian>().map_err(truncated)
    }

    /// A 2- or 4-byte table or heap index.
    pub fn index(&mut self, wide: bool) -> Result<u32, MetadataError> {
        if wide {
            self.u32()
        } else {
            self.u16().map(u32::from)
        }
    }

    /// ECMA-335 II.23.2 compressed unsigned integer.
    pub fn compressed_u32(&mut self) -> Result<u32, MetadataError> {
        let first = self.u8()?;
        if first & 0x80 == 0 {
            return Ok(u32::from(first));
        }
        if first & 0xC0 == 0x80 {
            let second = self.u8()?;
            return Ok((u32::from(first & 0x3F) << 8) | u32::from(second));
        }
        if first & 0xE0 == 0xC0 {
            let mut value = u32::from(first & 0x1F);
            for _ in 0..3 {
                value = (value << 8) | u32::from(self.u8()?);
            }
            return Ok(value);
        }
        Err(MetadataError::corrupt("invalid compressed integer"))
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], MetadataError> {
        let start = self.position();
        let end = start
            .checked_add(len)
            .ok_or_else(|| MetadataError::corrupt("length overflow"))?;
        let data: &'a [u8] = *self.cursor.get_ref();
        let slice = data.get(start..end).ok_or_else(|| MetadataError::corrupt("truncated data"))?;
        self.cursor.set_position(end as u64);
        Ok(slice)
    }

    /// Null-terminated string padded to a 4-byte boundary (stream names).
    pub fn padded_name(&mut self) -> Result<String, MetadataError> {
        let data: &'a [u8] = *self.cursor.get_ref();
        let start = self.position();
        let len = data
            .get(start..)
            .and_then(|rest| rest.iter().position(|&b| b == 0))
            .ok_or_else(|| MetadataError::corrupt("unterminated stream name"))?;
        let name = String::from_utf8_lossy(&data[start..start + len]).into_owned();
        let padded = (len + 4) & !3;
        self.bytes(padded)?;
        Ok(name)
    }
}

fn truncated(_: std::io::Error) -> MetadataError {
    MetadataError::corrupt("unexpected end of metadata")
}

/// The `#Strings` heap: null-terminated UTF-8 identifiers.
#[derive(Debug, Clone, Default)]
pub struct StringHeap {
    data: Vec<u8>,
}

impl StringHeap {
    pub fn new(data: Vec<u8>) -> Self {
        StringHeap { data }
    }

    pub fn get(&self, index: u32) -> Result<&str, MetadataError> {
        let start = index as usize;
        if start == 0 && self.data.is_empty() {
            return Ok("");
        }
        let rest = self
            .data
            .get(start..)
            .ok_or_else(|| MetadataError::corrupt(format!("string index {:#x} out of range", index)))?;
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| MetadataError::corrupt("unterminated string"))?;
        std::str::from_utf8(&rest[..len])
            .map_err(|_| MetadataError::corrupt(format!("string {:#x} is not UTF-8", index)))
    }
}

/// The `#Blob` heap: length-prefixed byte runs.
#[derive(Debug, Clone, Default)]
pub struct BlobHeap {
    data: Vec<u8>,
}

impl BlobHeap {
    pub fn new(data: Vec<u8>) -> Self {
        BlobHeap { data }
    }

    pub fn get(&self, index: u32) -> Result<&[u8], MetadataError> {
        if index == 0 && self.data.is_empty() {
            return Ok(&[]);
        }
        let mut reader = Reader::at(&self.data, index as usize)?;
        let len = reader.compressed_u32()? as usize;
        reader.bytes(len)
    }
}
