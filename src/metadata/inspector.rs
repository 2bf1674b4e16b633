//! Read-only inspection of PE images for managed-code metadata.
//!
//! Walks DOS header -> PE headers -> CLR data directory -> metadata root ->
//! tables stream, answering three questions about a candidate file: does it
//! carry managed metadata, does that metadata declare an assembly, and what
//! culture does the assembly identity record name. Anything that fails to
//! parse is reported as not inspectable rather than as an error; a build can
//! legitimately place native binaries and junk next to managed modules.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use super::tables::{TableContext, ASSEMBLY};

const DOS_MAGIC: u16 = 0x5A4D; // "MZ"
const PE_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
const PE32_MAGIC: u16 = 0x010B;
const PE32_PLUS_MAGIC: u16 = 0x020B;
const METADATA_SIGNATURE: u32 = 0x424A_5342; // "BSJB"
const CLR_RUNTIME_HEADER_INDEX: usize = 14;

/// What inspection learned about one candidate file. Derived on demand,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Whether the image carries managed-code metadata at all.
    pub has_metadata: bool,
    /// Whether the metadata declares a top-level assembly, as opposed to a
    /// secondary module of a multi-module assembly.
    pub is_assembly: bool,
    /// Culture string from the assembly identity record; present only when
    /// `is_assembly` is true, verbatim as stored (possibly empty).
    pub culture: Option<String>,
}

impl ModuleMetadata {
    /// The result for anything that cannot be parsed as a managed image.
    pub fn not_inspectable() -> Self {
        Self {
            has_metadata: false,
            is_assembly: false,
            culture: None,
        }
    }

    fn native_image() -> Self {
        Self::not_inspectable()
    }

    fn secondary_module() -> Self {
        Self {
            has_metadata: true,
            is_assembly: false,
            culture: None,
        }
    }

    /// Empty and the literal "neutral" both mean the assembly is not a
    /// satellite/localized resource assembly.
    pub fn is_neutral_culture(&self) -> bool {
        self.culture
            .as_deref()
            .is_none_or(|culture| culture.is_empty() || culture.eq_ignore_ascii_case("neutral"))
    }
}

/// Internal parse failures. Collapsed to "not inspectable" at the public
/// boundary; carried this far only so the debug log can say why.
#[derive(Debug, Error)]
enum InspectError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("truncated image: {wanted} bytes at offset {offset}")]
    Truncated { offset: usize, wanted: usize },
    #[error("not a PE image")]
    NotPe,
    #[error("malformed image: {0}")]
    Malformed(&'static str),
}

/// Inspects one candidate file. The file is read and released entirely
/// within this call; no handle survives the return. Infallible by contract:
/// unreadable or malformed images come back as
/// [`ModuleMetadata::not_inspectable`].
pub fn inspect(path: &Path) -> ModuleMetadata {
    match inspect_file(path) {
        Ok(metadata) => metadata,
        Err(err) => {
            debug!(path = %path.display(), reason = %err, "module not inspectable");
            ModuleMetadata::not_inspectable()
        }
    }
}

fn inspect_file(path: &Path) -> Result<ModuleMetadata, InspectError> {
    let image = fs::read(path)?;
    parse_image(&image)
}

fn parse_image(image: &[u8]) -> Result<ModuleMetadata, InspectError> {
    if read_u16(image, 0)? != DOS_MAGIC {
        return Err(InspectError::NotPe);
    }
    let pe_offset = read_u32(image, 0x3C)? as usize;
    if read_u32(image, pe_offset)? != PE_SIGNATURE {
        return Err(InspectError::NotPe);
    }

    let coff_offset = pe_offset + 4;
    let section_count = read_u16(image, coff_offset + 2)? as usize;
    let optional_size = read_u16(image, coff_offset + 16)? as usize;
    let optional_offset = coff_offset + 20;

    let (directories_offset, directory_count_offset) = match read_u16(image, optional_offset)? {
        PE32_MAGIC => (96, 92),
        PE32_PLUS_MAGIC => (112, 108),
        _ => return Err(InspectError::Malformed("unknown optional header magic")),
    };

    let directory_count = read_u32(image, optional_offset + directory_count_offset)? as usize;
    if directory_count <= CLR_RUNTIME_HEADER_INDEX {
        return Ok(ModuleMetadata::native_image());
    }
    let clr_entry = optional_offset + directories_offset + CLR_RUNTIME_HEADER_INDEX * 8;
    let clr_rva = read_u32(image, clr_entry)?;
    if clr_rva == 0 {
        return Ok(ModuleMetadata::native_image());
    }

    let sections = parse_sections(image, optional_offset + optional_size, section_count)?;
    let clr_offset = rva_to_file_offset(&sections, clr_rva)?;
    let metadata_rva = read_u32(image, clr_offset + 8)?;
    if metadata_rva == 0 {
        return Ok(ModuleMetadata::native_image());
    }
    let metadata_offset = rva_to_file_offset(&sections, metadata_rva)?;

    parse_metadata_root(image, metadata_offset)
}

struct Section {
    virtual_address: u32,
    raw_size: u32,
    raw_offset: u32,
}

fn parse_sections(
    image: &[u8],
    table_offset: usize,
    count: usize,
) -> Result<Vec<Section>, InspectError> {
    let mut sections = Vec::with_capacity(count);
    for index in 0..count {
        let entry = table_offset + index * 40;
        sections.push(Section {
            virtual_address: read_u32(image, entry + 12)?,
            raw_size: read_u32(image, entry + 16)?,
            raw_offset: read_u32(image, entry + 20)?,
        });
    }
    Ok(sections)
}

fn rva_to_file_offset(sections: &[Section], rva: u32) -> Result<usize, InspectError> {
    let section = sections
        .iter()
        .find(|section| {
            rva >= section.virtual_address && rva - section.virtual_address < section.raw_size
        })
        .ok_or(InspectError::Malformed("RVA outside any section"))?;
    // Widen before adding: a hostile PointerToRawData near u32::MAX must
    // surface as a parse failure, not an arithmetic overflow.
    let offset = u64::from(section.raw_offset) + u64::from(rva - section.virtual_address);
    usize::try_from(offset).map_err(|_| InspectError::Malformed("section data offset overflow"))
}

fn parse_metadata_root(image: &[u8], root: usize) -> Result<ModuleMetadata, InspectError> {
    if read_u32(image, root)? != METADATA_SIGNATURE {
        return Err(InspectError::Malformed("bad metadata signature"));
    }
    // Version string length at +12 is already 4-byte padded, but round up
    // anyway; some writers store the unpadded length.
    let version_length = (read_u32(image, root + 12)? as usize + 3) & !3;
    let stream_count = read_u16(image, root + 16 + version_length + 2)? as usize;
    let mut cursor = root + 16 + version_length + 4;

    let mut tables_stream = None;
    let mut strings_stream = None;
    for _ in 0..stream_count {
        let stream_offset = read_u32(image, cursor)? as usize;
        let stream_size = read_u32(image, cursor + 4)? as usize;
        let name_start = cursor + 8;
        let name = read_stream_name(image, name_start)?;
        match name {
            b"#~" | b"#-" => tables_stream = Some(root + stream_offset),
            b"#Strings" => strings_stream = Some((root + stream_offset, stream_size)),
            _ => {}
        }
        // Stream names are null-terminated and padded to a 4-byte boundary.
        cursor = name_start + (name.len() + 4) / 4 * 4;
    }

    let Some(tables_offset) = tables_stream else {
        // Metadata root without a tables stream; treat as metadata-bearing
        // but not an assembly.
        return Ok(ModuleMetadata::secondary_module());
    };
    parse_tables_stream(image, tables_offset, strings_stream)
}

fn read_stream_name(image: &[u8], start: usize) -> Result<&[u8], InspectError> {
    let tail = image
        .get(start..)
        .ok_or(InspectError::Truncated { offset: start, wanted: 1 })?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(InspectError::Malformed("unterminated stream name"))?;
    Ok(&tail[..end])
}

fn parse_tables_stream(
    image: &[u8],
    stream: usize,
    strings_stream: Option<(usize, usize)>,
) -> Result<ModuleMetadata, InspectError> {
    let heap_sizes = read_u8(image, stream + 6)?;
    let valid = read_u64(image, stream + 8)?;

    let mut context = TableContext {
        rows: [0; 64],
        wide_string: heap_sizes & 0x01 != 0,
        wide_guid: heap_sizes & 0x02 != 0,
        wide_blob: heap_sizes & 0x04 != 0,
    };

    let mut cursor = stream + 24;
    for table in 0..64 {
        if valid & (1 << table) != 0 {
            context.rows[table] = read_u32(image, cursor)?;
            cursor += 4;
        }
    }
    // Uncompressed streams may carry an extra-data word after the row
    // counts (heap-sizes flag 0x40).
    if heap_sizes & 0x40 != 0 {
        cursor += 4;
    }

    if valid & (1 << ASSEMBLY) == 0 || context.rows[ASSEMBLY] == 0 {
        return Ok(ModuleMetadata::secondary_module());
    }

    let assembly_row = cursor + context.assembly_table_offset();
    let culture_column = assembly_row + context.assembly_culture_column_offset();
    let culture_index = if context.wide_string {
        read_u32(image, culture_column)? as usize
    } else {
        read_u16(image, culture_column)? as usize
    };

    let strings = strings_stream.ok_or(InspectError::Malformed("missing #Strings heap"))?;
    let culture = read_heap_string(image, strings, culture_index)?;

    Ok(ModuleMetadata {
        has_metadata: true,
        is_assembly: true,
        culture: Some(culture),
    })
}

/// Reads a null-terminated string from the #Strings heap. The lookup is
/// bounded by the stream's declared size so a malformed index cannot read
/// adjacent stream bytes as a culture string.
fn read_heap_string(
    image: &[u8],
    heap: (usize, usize),
    index: usize,
) -> Result<String, InspectError> {
    let (start, size) = heap;
    if index >= size {
        return Err(InspectError::Malformed("string index outside #Strings heap"));
    }
    let heap_bytes = image
        .get(start..)
        .and_then(|tail| tail.get(..size))
        .ok_or(InspectError::Truncated {
            offset: start,
            wanted: size,
        })?;
    let tail = &heap_bytes[index..];
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(InspectError::Malformed("unterminated heap string"))?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

fn read_u8(image: &[u8], offset: usize) -> Result<u8, InspectError> {
    image
        .get(offset)
        .copied()
        .ok_or(InspectError::Truncated { offset, wanted: 1 })
}

fn read_u16(image: &[u8], offset: usize) -> Result<u16, InspectError> {
    let bytes = image
        .get(offset..offset + 2)
        .ok_or(InspectError::Truncated { offset, wanted: 2 })?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(image: &[u8], offset: usize) -> Result<u32, InspectError> {
    let bytes = image
        .get(offset..offset + 4)
        .ok_or(InspectError::Truncated { offset, wanted: 4 })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(image: &[u8], offset: usize) -> Result<u64, InspectError> {
    let bytes = image
        .get(offset..offset + 8)
        .ok_or(InspectError::Truncated { offset, wanted: 8 })?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(raw))
}
