//! Shared fixtures: synthesizes minimal PE images so classification tests
//! can run against real on-disk files instead of mocks.
//!
//! The generated images are the smallest layout the metadata walk accepts:
//! one section at RVA 0x2000 holding the CLR header, the metadata root, a
//! compressed tables stream, and a #Strings heap.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SECTION_RVA: u32 = 0x2000;
const SECTION_RAW_OFFSET: u32 = 0x200;
const CLR_HEADER_SIZE: u32 = 72;

/// Builds managed PE images byte by byte.
pub struct ManagedImageBuilder {
    assembly_name: String,
    /// `None` produces a secondary module (Module table only, no assembly
    /// identity); `Some` produces an assembly with that culture string.
    culture: Option<String>,
    /// Overrides the Assembly row's Culture string index, for images whose
    /// index points outside the #Strings heap.
    culture_index_override: Option<u16>,
}

impl ManagedImageBuilder {
    /// A culture-neutral assembly (empty culture string).
    pub fn assembly(name: &str) -> Self {
        Self {
            assembly_name: name.to_string(),
            culture: Some(String::new()),
            culture_index_override: None,
        }
    }

    /// An assembly declaring the given culture verbatim.
    pub fn with_culture(mut self, culture: &str) -> Self {
        self.culture = Some(culture.to_string());
        self
    }

    /// An assembly whose Culture column holds a raw string index instead of
    /// one derived from the heap contents.
    pub fn with_raw_culture_index(mut self, index: u16) -> Self {
        self.culture_index_override = Some(index);
        self
    }

    /// A secondary module of a multi-module assembly: carries metadata but
    /// no Assembly table.
    pub fn secondary_module(name: &str) -> Self {
        Self {
            assembly_name: name.to_string(),
            culture: None,
            culture_index_override: None,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let metadata = self.build_metadata();
        let mut section = Vec::new();

        // CLR header (II.25.3.3) at RVA 0x2000.
        push_u32(&mut section, CLR_HEADER_SIZE);
        push_u16(&mut section, 2); // runtime major
        push_u16(&mut section, 5); // runtime minor
        push_u32(&mut section, SECTION_RVA + CLR_HEADER_SIZE); // metadata RVA
        push_u32(&mut section, metadata.len() as u32);
        push_u32(&mut section, 1); // COMIMAGE_FLAGS_ILONLY
        section.resize(CLR_HEADER_SIZE as usize, 0);
        section.extend_from_slice(&metadata);

        build_pe(&section, Some(SECTION_RVA))
    }

    fn build_metadata(&self) -> Vec<u8> {
        // #Strings heap: leading NUL, assembly name, then the culture when
        // it is non-empty. An empty culture uses index 0 (the leading NUL).
        let mut strings = vec![0u8];
        let name_index = strings.len() as u16;
        strings.extend_from_slice(self.assembly_name.as_bytes());
        strings.push(0);
        let culture_index = match self.culture.as_deref() {
            Some(culture) if !culture.is_empty() => {
                let index = strings.len() as u16;
                strings.extend_from_slice(culture.as_bytes());
                strings.push(0);
                index
            }
            _ => 0,
        };
        let culture_index = self.culture_index_override.unwrap_or(culture_index);

        let tables = self.build_tables_stream(name_index, culture_index);
        let tables_padded = (tables.len() + 3) & !3;

        let mut root = Vec::new();
        push_u32(&mut root, 0x424A_5342); // BSJB
        push_u16(&mut root, 1);
        push_u16(&mut root, 1);
        push_u32(&mut root, 0); // reserved
        push_u32(&mut root, 12); // version string length, 4-byte padded
        root.extend_from_slice(b"v4.0.30319\0\0");
        push_u16(&mut root, 0); // flags
        push_u16(&mut root, 2); // stream count

        // Stream headers: 12 bytes for "#~", 20 for "#Strings"; data starts
        // at offset 64 from the metadata root.
        let tables_offset = 64u32;
        push_u32(&mut root, tables_offset);
        push_u32(&mut root, tables.len() as u32);
        root.extend_from_slice(b"#~\0\0");
        push_u32(&mut root, tables_offset + tables_padded as u32);
        push_u32(&mut root, strings.len() as u32);
        root.extend_from_slice(b"#Strings\0\0\0\0");
        assert_eq!(root.len(), 64);

        root.extend_from_slice(&tables);
        root.resize(64 + tables_padded, 0);
        root.extend_from_slice(&strings);
        root
    }

    fn build_tables_stream(&self, name_index: u16, culture_index: u16) -> Vec<u8> {
        let has_assembly = self.culture.is_some();
        let valid: u64 = if has_assembly { 1 | (1 << 0x20) } else { 1 };

        let mut stream = Vec::new();
        push_u32(&mut stream, 0); // reserved
        stream.push(2); // major
        stream.push(0); // minor
        stream.push(0); // heap sizes: all narrow
        stream.push(1); // reserved
        push_u64(&mut stream, valid);
        push_u64(&mut stream, 0); // sorted
        push_u32(&mut stream, 1); // Module rows
        if has_assembly {
            push_u32(&mut stream, 1); // Assembly rows
        }

        // Module row: Generation, Name, Mvid, EncId, EncBaseId.
        push_u16(&mut stream, 0);
        push_u16(&mut stream, name_index);
        push_u16(&mut stream, 1);
        push_u16(&mut stream, 0);
        push_u16(&mut stream, 0);

        if has_assembly {
            // Assembly row: HashAlgId, version quad, Flags, PublicKey,
            // Name, Culture.
            push_u32(&mut stream, 0x8004); // SHA1
            push_u16(&mut stream, 1);
            push_u16(&mut stream, 0);
            push_u16(&mut stream, 0);
            push_u16(&mut stream, 0);
            push_u32(&mut stream, 0);
            push_u16(&mut stream, 0);
            push_u16(&mut stream, name_index);
            push_u16(&mut stream, culture_index);
        }
        stream
    }
}

/// A PE image with no CLR data directory, i.e. a native binary.
pub fn native_image() -> Vec<u8> {
    build_pe(&[0u8; 16], None)
}

/// File offset of the single section header in images from [`build_pe`]:
/// DOS stub (0x80), PE signature (4), COFF header (20), PE32 optional
/// header (224).
const SECTION_HEADER_OFFSET: usize = 0x80 + 4 + 20 + 224;

/// Rewrites the section header's address fields in place, for images with
/// hostile or inconsistent section tables.
pub fn patch_section_header(image: &mut [u8], virtual_address: u32, raw_size: u32, raw_offset: u32) {
    let header = SECTION_HEADER_OFFSET;
    image[header + 12..header + 16].copy_from_slice(&virtual_address.to_le_bytes());
    image[header + 16..header + 20].copy_from_slice(&raw_size.to_le_bytes());
    image[header + 20..header + 24].copy_from_slice(&raw_offset.to_le_bytes());
}

/// PE scaffolding: DOS header, COFF header, PE32 optional header, and one
/// `.text` section holding `section_data`. `clr_rva` fills data directory
/// entry 14 when the image is managed.
fn build_pe(section_data: &[u8], clr_rva: Option<u32>) -> Vec<u8> {
    let mut image = vec![0u8; 0x80];
    image[0] = b'M';
    image[1] = b'Z';
    image[0x3C..0x40].copy_from_slice(&0x80u32.to_le_bytes());

    // PE signature + COFF header.
    image.extend_from_slice(b"PE\0\0");
    push_u16(&mut image, 0x014C); // machine: i386
    push_u16(&mut image, 1); // one section
    push_u32(&mut image, 0); // timestamp
    push_u32(&mut image, 0); // symbol table
    push_u32(&mut image, 0); // symbol count
    push_u16(&mut image, 224); // optional header size
    push_u16(&mut image, 0x2102); // dll | executable | 32-bit

    // PE32 optional header: only the fields the inspector reads are
    // populated.
    let optional_start = image.len();
    push_u16(&mut image, 0x010B);
    image.resize(optional_start + 92, 0);
    push_u32(&mut image, 16); // NumberOfRvaAndSizes
    let directories_start = image.len();
    image.resize(directories_start + 16 * 8, 0);
    if let Some(rva) = clr_rva {
        let entry = directories_start + 14 * 8;
        image[entry..entry + 4].copy_from_slice(&rva.to_le_bytes());
        image[entry + 4..entry + 8].copy_from_slice(&CLR_HEADER_SIZE.to_le_bytes());
    }
    assert_eq!(image.len(), optional_start + 224);

    // Section header for .text.
    image.extend_from_slice(b".text\0\0\0");
    push_u32(&mut image, section_data.len() as u32); // virtual size
    push_u32(&mut image, SECTION_RVA);
    push_u32(&mut image, section_data.len() as u32); // raw size
    push_u32(&mut image, SECTION_RAW_OFFSET);
    image.extend_from_slice(&[0u8; 12]);
    push_u32(&mut image, 0x6000_0020); // code | read | execute

    image.resize(SECTION_RAW_OFFSET as usize, 0);
    image.extend_from_slice(section_data);
    image
}

fn push_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn push_u64(buffer: &mut Vec<u8>, value: u64) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

/// Temp-directory environment for on-disk fixtures.
pub struct TestEnvironment {
    temp: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Writes raw bytes under the temp root, creating parent directories as
    /// needed, and returns the full path.
    pub fn write_image(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.temp.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create fixture dirs");
        }
        std::fs::write(&path, bytes).expect("failed to write fixture");
        path
    }

    /// A neutral-culture assembly on disk.
    pub fn write_assembly(&self, relative: &str) -> PathBuf {
        let name = file_stem(relative);
        self.write_image(relative, &ManagedImageBuilder::assembly(&name).build())
    }

    /// A satellite assembly with the given culture on disk.
    pub fn write_satellite(&self, relative: &str, culture: &str) -> PathBuf {
        let name = file_stem(relative);
        self.write_image(
            relative,
            &ManagedImageBuilder::assembly(&name)
                .with_culture(culture)
                .build(),
        )
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

fn file_stem(relative: &str) -> String {
    Path::new(relative)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Fixture".to_string())
}
