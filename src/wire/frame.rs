//! Byte framing for field messages on a stream.
//!
//! Each field message is framed as:
//! - 1 byte: tag
//! - 1 byte: field kind
//! - 4 bytes (little-endian u32): payload length
//! - N bytes: payload
//!
//! Payloads: `Int` is an i32 LE, `Float` an f64 LE, `Ints` a run of i32 LE,
//! `Text` raw bytes, `Header` three bytes (schema, version, field count).

use crate::error::TransportError;
use crate::utils::encoding::{
    decode_f64_le, decode_i32_le, decode_i32s_le, read_u32_le, read_u8, write_i32s_le,
    write_u32_le,
};
use crate::wire::field::{Field, FieldKind, FieldRef, RecordHeader, Tag};
use std::io::{self, Read, Write};

/// Largest payload a frame may declare
pub const MAX_PAYLOAD: usize = 256 * 1024 * 1024;

/// Write one field message; the caller decides when to flush
pub fn write_frame<W: Write>(writer: &mut W, tag: Tag, field: FieldRef<'_>) -> io::Result<()> {
    writer.write_all(&[tag as u8, field.kind() as u8])?;
    match field {
        FieldRef::Header(h) => {
            write_u32_le(writer, 3)?;
            writer.write_all(&[h.schema, h.version, h.fields])
        }
        FieldRef::Int(v) => {
            write_u32_le(writer, 4)?;
            writer.write_all(&v.to_le_bytes())
        }
        FieldRef::Float(v) => {
            write_u32_le(writer, 8)?;
            writer.write_all(&v.to_le_bytes())
        }
        FieldRef::Ints(values) => {
            write_u32_le(writer, payload_len(values.len() * 4)?)?;
            write_i32s_le(writer, values)
        }
        FieldRef::Text(bytes) => {
            write_u32_le(writer, payload_len(bytes.len())?)?;
            writer.write_all(bytes)
        }
    }
}

fn payload_len(len: usize) -> io::Result<u32> {
    if len > MAX_PAYLOAD {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Message too large",
        ));
    }
    Ok(len as u32)
}

/// Read one field message.
///
/// Returns `Ok(None)` on a clean end of stream between frames.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<(Tag, Field)>, TransportError> {
    let tag_byte = match read_u8(reader) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let tag = Tag::from_u8(tag_byte)
        .ok_or_else(|| TransportError::BadFrame(format!("unknown tag byte {}", tag_byte)))?;

    let kind_byte = read_u8(reader)?;
    let kind = FieldKind::from_u8(kind_byte)
        .ok_or_else(|| TransportError::BadFrame(format!("unknown field kind {}", kind_byte)))?;

    let len = read_u32_le(reader)? as usize;
    if len > MAX_PAYLOAD {
        return Err(TransportError::BadFrame(format!(
            "payload of {} bytes exceeds limit",
            len
        )));
    }

    // Grow with the data actually received rather than the declared length
    let mut buf = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }

    let bad_len = || TransportError::BadFrame(format!("{:?} payload of {} bytes", kind, len));
    let field = match kind {
        FieldKind::Header => match buf[..] {
            [schema, version, fields] => Field::Header(RecordHeader {
                schema,
                version,
                fields,
            }),
            _ => return Err(bad_len()),
        },
        FieldKind::Int => Field::Int(decode_i32_le(&buf).ok_or_else(bad_len)?),
        FieldKind::Float => Field::Float(decode_f64_le(&buf).ok_or_else(bad_len)?),
        FieldKind::Ints => Field::Ints(decode_i32s_le(&buf).ok_or_else(bad_len)?),
        FieldKind::Text => Field::Text(buf),
    };

    Ok(Some((tag, field)))
}
