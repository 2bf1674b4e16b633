//! Row-size arithmetic for the ECMA-335 metadata tables stream.
//!
//! The inspector only ever materializes one row (the Assembly table's first
//! row), but finding it requires the exact byte size of every row in every
//! table stored ahead of it. Row sizes depend on which heaps are wide and on
//! the row counts of the tables each coded index can point into, so the
//! layouts are kept as a declarative column table and sized against the
//! stream header at runtime.

pub const MODULE: usize = 0x00;
pub const TYPE_REF: usize = 0x01;
pub const TYPE_DEF: usize = 0x02;
pub const FIELD: usize = 0x04;
pub const METHOD_DEF: usize = 0x06;
pub const PARAM: usize = 0x08;
pub const INTERFACE_IMPL: usize = 0x09;
pub const MEMBER_REF: usize = 0x0A;
pub const DECL_SECURITY: usize = 0x0E;
pub const STAND_ALONE_SIG: usize = 0x11;
pub const EVENT: usize = 0x14;
pub const PROPERTY: usize = 0x17;
pub const MODULE_REF: usize = 0x1A;
pub const TYPE_SPEC: usize = 0x1B;
pub const ASSEMBLY: usize = 0x20;
pub const ASSEMBLY_REF: usize = 0x23;
pub const FILE: usize = 0x26;
pub const EXPORTED_TYPE: usize = 0x27;
pub const MANIFEST_RESOURCE: usize = 0x28;
pub const GENERIC_PARAM: usize = 0x2A;
pub const METHOD_SPEC: usize = 0x2B;
pub const GENERIC_PARAM_CONSTRAINT: usize = 0x2C;

/// One column of a metadata table row (ECMA-335 II.22).
enum Column {
    /// Fixed-width scalar field, in bytes.
    Fixed(usize),
    /// Index into the #Strings heap.
    Str,
    /// Index into the #GUID heap.
    Guid,
    /// Index into the #Blob heap.
    Blob,
    /// Simple index into one table.
    Table(usize),
    /// Coded index: low `tag_bits` select among `tables` (II.24.2.6).
    Coded {
        tag_bits: u32,
        tables: &'static [usize],
    },
}

const TYPE_DEF_OR_REF: Column = Column::Coded {
    tag_bits: 2,
    tables: &[TYPE_DEF, TYPE_REF, TYPE_SPEC],
};

const HAS_CONSTANT: Column = Column::Coded {
    tag_bits: 2,
    tables: &[FIELD, PARAM, PROPERTY],
};

const HAS_CUSTOM_ATTRIBUTE: Column = Column::Coded {
    tag_bits: 5,
    tables: &[
        METHOD_DEF,
        FIELD,
        TYPE_REF,
        TYPE_DEF,
        PARAM,
        INTERFACE_IMPL,
        MEMBER_REF,
        MODULE,
        DECL_SECURITY,
        PROPERTY,
        EVENT,
        STAND_ALONE_SIG,
        MODULE_REF,
        TYPE_SPEC,
        ASSEMBLY,
        ASSEMBLY_REF,
        FILE,
        EXPORTED_TYPE,
        MANIFEST_RESOURCE,
        GENERIC_PARAM,
        GENERIC_PARAM_CONSTRAINT,
        METHOD_SPEC,
    ],
};

const HAS_FIELD_MARSHAL: Column = Column::Coded {
    tag_bits: 1,
    tables: &[FIELD, PARAM],
};

const HAS_DECL_SECURITY: Column = Column::Coded {
    tag_bits: 2,
    tables: &[TYPE_DEF, METHOD_DEF, ASSEMBLY],
};

const MEMBER_REF_PARENT: Column = Column::Coded {
    tag_bits: 3,
    tables: &[TYPE_DEF, TYPE_REF, MODULE_REF, METHOD_DEF, TYPE_SPEC],
};

const HAS_SEMANTICS: Column = Column::Coded {
    tag_bits: 1,
    tables: &[EVENT, PROPERTY],
};

const METHOD_DEF_OR_REF: Column = Column::Coded {
    tag_bits: 1,
    tables: &[METHOD_DEF, MEMBER_REF],
};

const MEMBER_FORWARDED: Column = Column::Coded {
    tag_bits: 1,
    tables: &[FIELD, METHOD_DEF],
};

const CUSTOM_ATTRIBUTE_TYPE: Column = Column::Coded {
    tag_bits: 3,
    tables: &[METHOD_DEF, MEMBER_REF],
};

const RESOLUTION_SCOPE: Column = Column::Coded {
    tag_bits: 2,
    tables: &[MODULE, MODULE_REF, ASSEMBLY_REF, TYPE_REF],
};

/// Column layouts for tables 0x00..=0x20, the range that can precede the
/// Assembly table in the tables stream. Pointer tables (0x03, 0x05, 0x07,
/// 0x13, 0x16) and edit-and-continue tables (0x1E, 0x1F) only occur in
/// uncompressed (`#-`) streams but are included so those images still size
/// correctly.
const LAYOUTS: [&[Column]; 0x21] = [
    // 0x00 Module
    &[
        Column::Fixed(2),
        Column::Str,
        Column::Guid,
        Column::Guid,
        Column::Guid,
    ],
    // 0x01 TypeRef
    &[RESOLUTION_SCOPE, Column::Str, Column::Str],
    // 0x02 TypeDef
    &[
        Column::Fixed(4),
        Column::Str,
        Column::Str,
        TYPE_DEF_OR_REF,
        Column::Table(FIELD),
        Column::Table(METHOD_DEF),
    ],
    // 0x03 FieldPtr
    &[Column::Table(FIELD)],
    // 0x04 Field
    &[Column::Fixed(2), Column::Str, Column::Blob],
    // 0x05 MethodPtr
    &[Column::Table(METHOD_DEF)],
    // 0x06 MethodDef
    &[
        Column::Fixed(4),
        Column::Fixed(2),
        Column::Fixed(2),
        Column::Str,
        Column::Blob,
        Column::Table(PARAM),
    ],
    // 0x07 ParamPtr
    &[Column::Table(PARAM)],
    // 0x08 Param
    &[Column::Fixed(2), Column::Fixed(2), Column::Str],
    // 0x09 InterfaceImpl
    &[Column::Table(TYPE_DEF), TYPE_DEF_OR_REF],
    // 0x0A MemberRef
    &[MEMBER_REF_PARENT, Column::Str, Column::Blob],
    // 0x0B Constant
    &[Column::Fixed(2), HAS_CONSTANT, Column::Blob],
    // 0x0C CustomAttribute
    &[HAS_CUSTOM_ATTRIBUTE, CUSTOM_ATTRIBUTE_TYPE, Column::Blob],
    // 0x0D FieldMarshal
    &[HAS_FIELD_MARSHAL, Column::Blob],
    // 0x0E DeclSecurity
    &[Column::Fixed(2), HAS_DECL_SECURITY, Column::Blob],
    // 0x0F ClassLayout
    &[Column::Fixed(2), Column::Fixed(4), Column::Table(TYPE_DEF)],
    // 0x10 FieldLayout
    &[Column::Fixed(4), Column::Table(FIELD)],
    // 0x11 StandAloneSig
    &[Column::Blob],
    // 0x12 EventMap
    &[Column::Table(TYPE_DEF), Column::Table(EVENT)],
    // 0x13 EventPtr
    &[Column::Table(EVENT)],
    // 0x14 Event
    &[Column::Fixed(2), Column::Str, TYPE_DEF_OR_REF],
    // 0x15 PropertyMap
    &[Column::Table(TYPE_DEF), Column::Table(PROPERTY)],
    // 0x16 PropertyPtr
    &[Column::Table(PROPERTY)],
    // 0x17 Property
    &[Column::Fixed(2), Column::Str, Column::Blob],
    // 0x18 MethodSemantics
    &[Column::Fixed(2), Column::Table(METHOD_DEF), HAS_SEMANTICS],
    // 0x19 MethodImpl
    &[Column::Table(TYPE_DEF), METHOD_DEF_OR_REF, METHOD_DEF_OR_REF],
    // 0x1A ModuleRef
    &[Column::Str],
    // 0x1B TypeSpec
    &[Column::Blob],
    // 0x1C ImplMap
    &[
        Column::Fixed(2),
        MEMBER_FORWARDED,
        Column::Str,
        Column::Table(MODULE_REF),
    ],
    // 0x1D FieldRVA
    &[Column::Fixed(4), Column::Table(FIELD)],
    // 0x1E ENCLog
    &[Column::Fixed(4), Column::Fixed(4)],
    // 0x1F ENCMap
    &[Column::Fixed(4)],
    // 0x20 Assembly
    &[
        Column::Fixed(4),
        Column::Fixed(2),
        Column::Fixed(2),
        Column::Fixed(2),
        Column::Fixed(2),
        Column::Fixed(4),
        Column::Blob,
        Column::Str,
        Column::Str,
    ],
];

/// Sizing context for one tables stream: row counts plus heap-width flags
/// from the stream header.
pub struct TableContext {
    pub rows: [u32; 64],
    pub wide_string: bool,
    pub wide_guid: bool,
    pub wide_blob: bool,
}

impl TableContext {
    pub fn string_index_size(&self) -> usize {
        if self.wide_string {
            4
        } else {
            2
        }
    }

    pub fn blob_index_size(&self) -> usize {
        if self.wide_blob {
            4
        } else {
            2
        }
    }

    fn guid_index_size(&self) -> usize {
        if self.wide_guid {
            4
        } else {
            2
        }
    }

    fn table_index_size(&self, table: usize) -> usize {
        if self.rows[table] < 0x1_0000 {
            2
        } else {
            4
        }
    }

    fn coded_index_size(&self, tag_bits: u32, tables: &[usize]) -> usize {
        let max_rows = tables.iter().map(|&t| self.rows[t]).max().unwrap_or(0);
        if u64::from(max_rows) < (1u64 << (16 - tag_bits)) {
            2
        } else {
            4
        }
    }

    fn column_size(&self, column: &Column) -> usize {
        match column {
            Column::Fixed(bytes) => *bytes,
            Column::Str => self.string_index_size(),
            Column::Guid => self.guid_index_size(),
            Column::Blob => self.blob_index_size(),
            Column::Table(table) => self.table_index_size(*table),
            Column::Coded { tag_bits, tables } => self.coded_index_size(*tag_bits, tables),
        }
    }

    pub fn row_size(&self, table: usize) -> usize {
        LAYOUTS[table]
            .iter()
            .map(|column| self.column_size(column))
            .sum()
    }

    /// Byte offset of the Assembly table relative to the start of the row
    /// data, i.e. the total size of every present table below 0x20.
    pub fn assembly_table_offset(&self) -> usize {
        (0..ASSEMBLY)
            .filter(|&table| self.rows[table] > 0)
            .map(|table| self.rows[table] as usize * self.row_size(table))
            .sum()
    }

    /// Offset of the Culture column within an Assembly row: HashAlgId (4),
    /// four version parts (8), Flags (4), PublicKey blob index, Name string
    /// index.
    pub fn assembly_culture_column_offset(&self) -> usize {
        16 + self.blob_index_size() + self.string_index_size()
    }
}
