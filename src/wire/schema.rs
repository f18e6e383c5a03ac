//! Versioned record layouts.
//!
//! A record is a header message followed by its fields in exactly the order
//! listed here, all on the schema's tag. Bump `version` whenever a layout
//! changes; a peer speaking another version is rejected at the header.

use crate::error::WireError;
use crate::wire::field::{FieldKind, RecordHeader, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

#[derive(Debug, PartialEq, Eq)]
pub struct RecordSchema {
    pub name: &'static str,
    pub id: u8,
    pub version: u8,
    pub tag: Tag,
    pub fields: &'static [FieldSpec],
}

/// Job unit: id, dim, grid, found count, report length, report text
pub static JOB: RecordSchema = RecordSchema {
    name: "job",
    id: 1,
    version: 1,
    tag: Tag::Job,
    fields: &[
        field("id", FieldKind::Int),
        field("dim", FieldKind::Int),
        field("grid", FieldKind::Ints),
        field("found", FieldKind::Int),
        field("report_len", FieldKind::Int),
        field("report", FieldKind::Text),
    ],
};

/// Pattern unit: id, dim, grid
pub static PATTERN: RecordSchema = RecordSchema {
    name: "pattern",
    id: 2,
    version: 1,
    tag: Tag::Pattern,
    fields: &[
        field("id", FieldKind::Int),
        field("dim", FieldKind::Int),
        field("grid", FieldKind::Ints),
    ],
};

/// Run configuration: tolerance, job count, pattern count
pub static CONFIG: RecordSchema = RecordSchema {
    name: "config",
    id: 3,
    version: 1,
    tag: Tag::Config,
    fields: &[
        field("tolerance", FieldKind::Float),
        field("job_count", FieldKind::Int),
        field("pattern_count", FieldKind::Int),
    ],
};

impl RecordSchema {
    pub fn header(&self) -> RecordHeader {
        RecordHeader {
            schema: self.id,
            version: self.version,
            fields: self.fields.len() as u8,
        }
    }

    /// Reject a header announcing any other schema, version or field count
    pub fn check_header(&self, header: &RecordHeader) -> Result<(), WireError> {
        if *header == self.header() {
            return Ok(());
        }
        let expected = self.header();
        Err(WireError::SchemaMismatch {
            record: self.name,
            expected_id: expected.schema,
            expected_version: expected.version,
            expected_fields: expected.fields,
            id: header.schema,
            version: header.version,
            fields: header.fields,
        })
    }
}
