//! Record encoding and decoding over a [`Transport`].
//!
//! Encoding borrows the record and streams its fields; decoding pins itself
//! to the rank that sent the header so interleaved records from other ranks
//! cannot leak into the one being read.

use crate::error::WireError;
use crate::model::{Grid, Job, Pattern, Rank, RunConfig};
use crate::transport::{Source, Transport};
use crate::wire::field::{Envelope, Field, FieldKind, FieldRef, Tag};
use crate::wire::schema::{self, RecordSchema};

/// Streams one record's fields to `dest`, checking them against the schema
pub struct RecordWriter<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
    dest: Rank,
    schema: &'static RecordSchema,
    next: usize,
}

impl<'t, T: Transport + ?Sized> RecordWriter<'t, T> {
    /// Send the header and return a writer for the fields
    pub fn begin(
        transport: &'t mut T,
        dest: Rank,
        schema: &'static RecordSchema,
    ) -> Result<Self, WireError> {
        transport.send(dest, schema.tag, FieldRef::Header(schema.header()))?;
        Ok(Self {
            transport,
            dest,
            schema,
            next: 0,
        })
    }

    pub fn put(&mut self, field: FieldRef<'_>) -> Result<(), WireError> {
        let spec = self.schema.fields.get(self.next).ok_or_else(|| {
            WireError::malformed(self.schema.name, "more fields than the schema declares")
        })?;
        if spec.kind != field.kind() {
            return Err(WireError::UnexpectedField {
                record: self.schema.name,
                field: spec.name,
                expected: spec.kind,
                found: field.kind(),
            });
        }
        self.transport.send(self.dest, self.schema.tag, field)?;
        self.next += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<(), WireError> {
        if self.next != self.schema.fields.len() {
            return Err(WireError::malformed(
                self.schema.name,
                format!(
                    "sent {} of {} fields",
                    self.next,
                    self.schema.fields.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Reads one record's fields from a single rank, validating as it goes
pub struct RecordReader<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
    from: Rank,
    schema: &'static RecordSchema,
    next: usize,
}

impl<'t, T: Transport + ?Sized> RecordReader<'t, T> {
    /// Receive the header from `from` and return a reader for the fields
    pub fn open(
        transport: &'t mut T,
        from: Source,
        schema: &'static RecordSchema,
    ) -> Result<Self, WireError> {
        let first = transport.recv(from)?;
        Self::resume(transport, first, schema)
    }

    /// Continue a record whose header message was already received
    pub fn resume(
        transport: &'t mut T,
        first: Envelope,
        schema: &'static RecordSchema,
    ) -> Result<Self, WireError> {
        if first.tag != schema.tag {
            return Err(WireError::UnexpectedTag {
                from_rank: first.source,
                expected: schema.tag,
                found: first.tag,
            });
        }
        match first.field {
            Field::Header(header) => schema.check_header(&header)?,
            other => {
                return Err(WireError::UnexpectedField {
                    record: schema.name,
                    field: "header",
                    expected: FieldKind::Header,
                    found: other.kind(),
                });
            }
        }
        Ok(Self {
            transport,
            from: first.source,
            schema,
            next: 0,
        })
    }

    /// Rank this record is being read from
    pub fn source(&self) -> Rank {
        self.from
    }

    fn take(&mut self) -> Result<(&'static str, Field), WireError> {
        let spec = self.schema.fields.get(self.next).ok_or_else(|| {
            WireError::malformed(self.schema.name, "read past the last declared field")
        })?;
        let envelope = self.transport.recv(Source::Rank(self.from))?;
        if envelope.tag != self.schema.tag {
            return Err(WireError::UnexpectedTag {
                from_rank: envelope.source,
                expected: self.schema.tag,
                found: envelope.tag,
            });
        }
        if envelope.field.kind() != spec.kind {
            return Err(WireError::UnexpectedField {
                record: self.schema.name,
                field: spec.name,
                expected: spec.kind,
                found: envelope.field.kind(),
            });
        }
        self.next += 1;
        Ok((spec.name, envelope.field))
    }

    fn kind_mismatch(&self, name: &'static str, field: &Field) -> WireError {
        WireError::malformed(
            self.schema.name,
            format!("{} arrived as {:?}", name, field.kind()),
        )
    }

    pub fn int(&mut self) -> Result<i32, WireError> {
        match self.take()? {
            (_, Field::Int(v)) => Ok(v),
            (name, other) => Err(self.kind_mismatch(name, &other)),
        }
    }

    /// An int that sizes a later field; zero or negative is malformed
    pub fn length(&mut self) -> Result<usize, WireError> {
        let name = self.schema.fields.get(self.next).map(|f| f.name);
        let value = self.int()?;
        if value <= 0 {
            return Err(WireError::malformed(
                self.schema.name,
                format!("{} must be positive, got {}", name.unwrap_or("length"), value),
            ));
        }
        Ok(value as usize)
    }

    pub fn float(&mut self) -> Result<f64, WireError> {
        match self.take()? {
            (_, Field::Float(v)) => Ok(v),
            (name, other) => Err(self.kind_mismatch(name, &other)),
        }
    }

    /// Exactly `expected` ints
    pub fn ints(&mut self, expected: usize) -> Result<Vec<i32>, WireError> {
        match self.take()? {
            (_, Field::Ints(v)) if v.len() == expected => Ok(v),
            (name, Field::Ints(v)) => Err(WireError::malformed(
                self.schema.name,
                format!("{} holds {} values, expected {}", name, v.len(), expected),
            )),
            (name, other) => Err(self.kind_mismatch(name, &other)),
        }
    }

    /// Exactly `expected` bytes of text
    pub fn text(&mut self, expected: usize) -> Result<Vec<u8>, WireError> {
        match self.take()? {
            (_, Field::Text(v)) if v.len() == expected => Ok(v),
            (name, Field::Text(v)) => Err(WireError::malformed(
                self.schema.name,
                format!("{} holds {} bytes, expected {}", name, v.len(), expected),
            )),
            (name, other) => Err(self.kind_mismatch(name, &other)),
        }
    }

    pub fn finish(self) -> Result<(), WireError> {
        if self.next != self.schema.fields.len() {
            return Err(WireError::malformed(
                self.schema.name,
                format!(
                    "read {} of {} fields",
                    self.next,
                    self.schema.fields.len()
                ),
            ));
        }
        Ok(())
    }
}

fn to_wire_int(record: &'static str, name: &str, value: usize) -> Result<i32, WireError> {
    i32::try_from(value)
        .map_err(|_| WireError::malformed(record, format!("{} {} does not fit in i32", name, value)))
}

fn read_grid<T: Transport + ?Sized>(reader: &mut RecordReader<'_, T>) -> Result<Grid, WireError> {
    let record = reader.schema.name;
    let dim = reader.length()?;
    let count = dim
        .checked_mul(dim)
        .ok_or_else(|| WireError::malformed(record, format!("dim {} overflows", dim)))?;
    let cells = reader.ints(count)?;
    Grid::new(dim, cells).ok_or_else(|| WireError::malformed(record, "grid shape"))
}

/// Send a job to `dest`
pub fn send_job<T: Transport + ?Sized>(
    transport: &mut T,
    dest: Rank,
    job: &Job,
) -> Result<(), WireError> {
    let name = schema::JOB.name;
    let mut w = RecordWriter::begin(transport, dest, &schema::JOB)?;
    w.put(FieldRef::Int(job.id))?;
    w.put(FieldRef::Int(to_wire_int(name, "dim", job.dim())?))?;
    w.put(FieldRef::Ints(job.grid.cells()))?;
    w.put(FieldRef::Int(to_wire_int(name, "found", job.found as usize)?))?;
    w.put(FieldRef::Int(to_wire_int(name, "report_len", job.report.len())?))?;
    w.put(FieldRef::Text(job.report.as_bytes()))?;
    w.finish()
}

/// Receive a whole job; returns the sender's rank with it
pub fn recv_job<T: Transport + ?Sized>(
    transport: &mut T,
    from: Source,
) -> Result<(Rank, Job), WireError> {
    let first = transport.recv(from)?;
    decode_job(transport, first)
}

/// Decode a job whose header message has already been received
pub fn decode_job<T: Transport + ?Sized>(
    transport: &mut T,
    first: Envelope,
) -> Result<(Rank, Job), WireError> {
    let name = schema::JOB.name;
    let mut r = RecordReader::resume(transport, first, &schema::JOB)?;
    let id = r.int()?;
    let grid = read_grid(&mut r)?;
    let found = r.int()?;
    if found < 0 {
        return Err(WireError::malformed(
            name,
            format!("found count {} is negative", found),
        ));
    }
    let report_len = r.length()?;
    let report = String::from_utf8(r.text(report_len)?)
        .map_err(|_| WireError::malformed(name, "report is not valid UTF-8"))?;
    let source = r.source();
    r.finish()?;

    Ok((
        source,
        Job {
            id,
            grid,
            found: found as u32,
            report,
        },
    ))
}

/// Send a pattern to `dest`
pub fn send_pattern<T: Transport + ?Sized>(
    transport: &mut T,
    dest: Rank,
    pattern: &Pattern,
) -> Result<(), WireError> {
    let mut w = RecordWriter::begin(transport, dest, &schema::PATTERN)?;
    w.put(FieldRef::Int(pattern.id))?;
    w.put(FieldRef::Int(to_wire_int(
        schema::PATTERN.name,
        "dim",
        pattern.dim(),
    )?))?;
    w.put(FieldRef::Ints(pattern.grid.cells()))?;
    w.finish()
}

pub fn recv_pattern<T: Transport + ?Sized>(
    transport: &mut T,
    from: Source,
) -> Result<Pattern, WireError> {
    let mut r = RecordReader::open(transport, from, &schema::PATTERN)?;
    let id = r.int()?;
    let grid = read_grid(&mut r)?;
    r.finish()?;
    Ok(Pattern::new(id, grid))
}

/// Send the run configuration to `dest`
pub fn send_config<T: Transport + ?Sized>(
    transport: &mut T,
    dest: Rank,
    config: &RunConfig,
) -> Result<(), WireError> {
    let name = schema::CONFIG.name;
    let mut w = RecordWriter::begin(transport, dest, &schema::CONFIG)?;
    w.put(FieldRef::Float(config.tolerance))?;
    w.put(FieldRef::Int(to_wire_int(name, "job_count", config.job_count)?))?;
    w.put(FieldRef::Int(to_wire_int(
        name,
        "pattern_count",
        config.pattern_count,
    )?))?;
    w.finish()
}

pub fn recv_config<T: Transport + ?Sized>(
    transport: &mut T,
    from: Source,
) -> Result<RunConfig, WireError> {
    let name = schema::CONFIG.name;
    let mut r = RecordReader::open(transport, from, &schema::CONFIG)?;
    let tolerance = r.float()?;
    let job_count = r.int()?;
    let pattern_count = r.int()?;
    r.finish()?;

    if !tolerance.is_finite() {
        return Err(WireError::malformed(name, "tolerance is not finite"));
    }
    let count = |field: &str, v: i32| {
        usize::try_from(v)
            .map_err(|_| WireError::malformed(name, format!("{} {} is negative", field, v)))
    };
    Ok(RunConfig {
        tolerance,
        job_count: count("job_count", job_count)?,
        pattern_count: count("pattern_count", pattern_count)?,
    })
}

/// Tell `dest` there is no more work; carries the coordinator's finished count
pub fn send_terminate<T: Transport + ?Sized>(
    transport: &mut T,
    dest: Rank,
    finished: usize,
) -> Result<(), WireError> {
    let finished = to_wire_int("terminate", "finished", finished)?;
    transport.send(dest, Tag::Terminate, FieldRef::Int(finished))?;
    Ok(())
}
