//! Wire protocol for jobs, patterns and the run configuration.
//!
//! Records travel as a sequence of field messages on one tag: a header
//! naming the schema, then each field in schema order. Variable-size fields
//! are preceded by the field that sizes them, so the receiver knows how much
//! to expect before the payload arrives.
//!
//! - [`field`]: tags and field message types
//! - [`schema`]: versioned record layouts
//! - [`codec`]: record encode/decode over any transport
//! - [`frame`]: byte framing used by stream transports

pub mod codec;
pub mod field;
pub mod frame;
pub mod schema;

pub use codec::{
    RecordReader, RecordWriter, decode_job, recv_config, recv_job, recv_pattern, send_config,
    send_job, send_pattern, send_terminate,
};
pub use field::{Envelope, Field, FieldKind, FieldRef, RecordHeader, Tag};
