//! Field messages: the unit the transport moves between ranks.

use crate::model::Rank;

/// Logical channel tag; distinguishes message families independent of payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Job dispatch (coordinator -> worker) and job return (worker -> coordinator)
    Job = 0,
    /// Pattern broadcast
    Pattern = 1,
    /// No more work; the receiving worker exits its loop
    Terminate = 2,
    /// Run configuration broadcast
    Config = 3,
    /// A participant hit a fatal error; the whole run stops
    Abort = 4,
}

impl Tag {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Tag::Job),
            1 => Some(Tag::Pattern),
            2 => Some(Tag::Terminate),
            3 => Some(Tag::Config),
            4 => Some(Tag::Abort),
            _ => None,
        }
    }
}

/// Shape of one field message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldKind {
    Header = 0,
    Int = 1,
    Ints = 2,
    Text = 3,
    Float = 4,
}

impl FieldKind {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(FieldKind::Header),
            1 => Some(FieldKind::Int),
            2 => Some(FieldKind::Ints),
            3 => Some(FieldKind::Text),
            4 => Some(FieldKind::Float),
            _ => None,
        }
    }
}

/// First message of every record: which schema follows and how many fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub schema: u8,
    pub version: u8,
    pub fields: u8,
}

/// Borrowed field, used on the send side
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    Header(RecordHeader),
    Int(i32),
    Ints(&'a [i32]),
    Text(&'a [u8]),
    Float(f64),
}

impl FieldRef<'_> {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldRef::Header(_) => FieldKind::Header,
            FieldRef::Int(_) => FieldKind::Int,
            FieldRef::Ints(_) => FieldKind::Ints,
            FieldRef::Text(_) => FieldKind::Text,
            FieldRef::Float(_) => FieldKind::Float,
        }
    }

    pub fn to_owned(&self) -> Field {
        match *self {
            FieldRef::Header(h) => Field::Header(h),
            FieldRef::Int(v) => Field::Int(v),
            FieldRef::Ints(v) => Field::Ints(v.to_vec()),
            FieldRef::Text(v) => Field::Text(v.to_vec()),
            FieldRef::Float(v) => Field::Float(v),
        }
    }
}

/// Owned field, produced on the receive side
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Header(RecordHeader),
    Int(i32),
    Ints(Vec<i32>),
    Text(Vec<u8>),
    Float(f64),
}

impl Field {
    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Header(_) => FieldKind::Header,
            Field::Int(_) => FieldKind::Int,
            Field::Ints(_) => FieldKind::Ints,
            Field::Text(_) => FieldKind::Text,
            Field::Float(_) => FieldKind::Float,
        }
    }
}

/// A received field together with who sent it and on which tag
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub source: Rank,
    pub tag: Tag,
    pub field: Field,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_bytes_are_distinct() {
        let tags = [Tag::Job, Tag::Pattern, Tag::Terminate, Tag::Config, Tag::Abort];
        for tag in tags {
            assert_eq!(Tag::from_u8(tag as u8), Some(tag));
        }
        assert_eq!(Tag::from_u8(5), None);
    }

    #[test]
    fn test_field_ref_to_owned_keeps_kind() {
        let cells = [1, 2, 3, 4];
        let borrowed = FieldRef::Ints(&cells);
        let owned = borrowed.to_owned();
        assert_eq!(owned.kind(), FieldKind::Ints);
        assert_eq!(owned, Field::Ints(vec![1, 2, 3, 4]));
    }
}
