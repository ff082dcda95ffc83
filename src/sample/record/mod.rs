//! Decoding of the records found in a drained ring buffer.

use crate::ffi::{abi as b, Header};
use crate::{Error, Result};

mod lost;
mod sample;

pub use lost::Lost;
pub use sample::Sample;

/// What the kernel writes into each record, as configured on the event selections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    pub sample_type: u64,
    /// Non-sample records carry a trailing `sample_id`.
    pub sample_id_all: bool,
}

impl Schema {
    fn sample_id_len(&self) -> usize {
        [
            b::PERF_SAMPLE_TID,
            b::PERF_SAMPLE_TIME,
            b::PERF_SAMPLE_ID,
            b::PERF_SAMPLE_STREAM_ID,
            b::PERF_SAMPLE_CPU,
            b::PERF_SAMPLE_IDENTIFIER,
        ]
        .iter()
        .filter(|&&flag| self.sample_type & flag > 0)
        .count()
            * size_of::<u64>()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Task {
    pub pid: u32,
    pub tid: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordId {
    pub id: Option<u64>,
    pub stream_id: Option<u64>,
    pub cpu: Option<u32>,
    pub task: Option<Task>,
    pub time: Option<u64>,
}

impl RecordId {
    fn parse(cursor: &mut Cursor<'_>, sample_type: u64) -> Result<Self> {
        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L859
        // struct sample_id {
        //     { u32 pid, tid;  } && PERF_SAMPLE_TID
        //     { u64 time;      } && PERF_SAMPLE_TIME
        //     { u64 id;        } && PERF_SAMPLE_ID
        //     { u64 stream_id; } && PERF_SAMPLE_STREAM_ID
        //     { u32 cpu, res;  } && PERF_SAMPLE_CPU
        //     { u64 id;        } && PERF_SAMPLE_IDENTIFIER
        // } && perf_event_attr::sample_id_all
        macro_rules! when {
            ($flag:ident, $then:expr) => {
                if sample_type & b::$flag > 0 {
                    Some($then)
                } else {
                    None
                }
            };
        }

        let task = when!(PERF_SAMPLE_TID, cursor.task()?);
        let time = when!(PERF_SAMPLE_TIME, cursor.u64()?);
        let id = when!(PERF_SAMPLE_ID, cursor.u64()?);
        let stream_id = when!(PERF_SAMPLE_STREAM_ID, cursor.u64()?);
        let cpu = when!(PERF_SAMPLE_CPU, cursor.cpu()?);
        let identifier = when!(PERF_SAMPLE_IDENTIFIER, cursor.u64()?);

        Ok(Self {
            id: id.or(identifier),
            stream_id,
            cpu,
            task,
            time,
        })
    }
}

/// Event ids of the handles opened for a cpu that came back online,
/// so that later samples can be attributed to their selection.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId {
    pub cpu: i32,
    /// `(selection id, kernel event id)` pairs.
    pub ids: Vec<(u32, u64)>,
}

/// A record type this crate does not decode further.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Other {
    pub ty: u32,
    pub misc: u16,
    pub record_id: Option<RecordId>,
    /// Body between the header and the `sample_id` trailer.
    pub body: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Record {
    Sample(Box<Sample>),
    Lost(Lost),
    EventId(EventId),
    Other(Other),
}

impl Record {
    /// Kernel timestamp, when the record carries one.
    pub fn time(&self) -> Option<u64> {
        match self {
            Record::Sample(it) => it.record_id.time,
            Record::Lost(it) => it.record_id.as_ref().and_then(|it| it.time),
            Record::EventId(_) => None,
            Record::Other(it) => it.record_id.as_ref().and_then(|it| it.time),
        }
    }

    fn parse(header: Header, body: &[u8], offset: usize, schema: Schema) -> Result<Self> {
        let mut cursor = Cursor::new(body, offset);
        let record = match header.type_ {
            b::PERF_RECORD_SAMPLE => {
                Record::Sample(Box::new(Sample::parse(&mut cursor, schema.sample_type)?))
            }
            b::PERF_RECORD_LOST => Record::Lost(Lost::parse(&mut cursor, schema)?),
            ty => {
                let (body, record_id) = split_sample_id(body, offset, schema)?;
                Record::Other(Other {
                    ty,
                    misc: header.misc,
                    record_id,
                    body: body.to_vec(),
                })
            }
        };
        Ok(record)
    }
}

// The trailer sits at the very end of the record whatever the body layout is.
fn split_sample_id(body: &[u8], offset: usize, schema: Schema) -> Result<(&[u8], Option<RecordId>)> {
    if !schema.sample_id_all {
        return Ok((body, None));
    }
    let len = schema.sample_id_len();
    let Some(split) = body.len().checked_sub(len) else {
        return Err(Error::Decode {
            offset,
            reason: "record too short for its sample_id",
        });
    };
    let mut cursor = Cursor::new(&body[split..], offset + split);
    let record_id = RecordId::parse(&mut cursor, schema.sample_type)?;
    Ok((&body[..split], Some(record_id)))
}

/// Iterates over the records packed in a drained buffer.
///
/// A malformed record ends the iteration after its error is yielded,
/// since the following record boundaries are unknown.
pub struct Records<'a> {
    buf: &'a [u8],
    pos: usize,
    schema: Schema,
}

impl<'a> Records<'a> {
    pub fn new(buf: &'a [u8], schema: Schema) -> Self {
        Self {
            buf,
            pos: 0,
            schema,
        }
    }

    fn fail(&mut self, reason: &'static str) -> Option<Result<Record>> {
        let offset = self.pos;
        self.pos = self.buf.len();
        Some(Err(Error::Decode { offset, reason }))
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let buf = self.buf;
        let rest = &buf[self.pos..];
        if rest.is_empty() {
            return None;
        }

        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L824
        // struct perf_event_header {
        //     u32 type; # 4 bytes
        //     u16 misc; # 2 bytes
        //     u16 size; # 2 bytes
        // };
        let mut cursor = Cursor::new(rest, self.pos);
        let header = match (cursor.u32(), cursor.u16(), cursor.u16()) {
            (Ok(type_), Ok(misc), Ok(size)) => Header { type_, misc, size },
            _ => return self.fail("truncated record header"),
        };
        let size = header.size as usize;
        if size < size_of::<Header>() {
            return self.fail("record size smaller than its header");
        }
        if size > rest.len() {
            return self.fail("record size past the end of buffer");
        }

        let offset = self.pos + size_of::<Header>();
        let body = &rest[size_of::<Header>()..size];
        self.pos += size;
        Some(Record::parse(header, body, offset, self.schema))
    }
}

/// Reads native-endian fields off a record body.
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    // Offset of `buf` in the drained bytes, for error reports.
    base: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let field = self
            .pos
            .checked_add(len)
            .and_then(|end| self.buf.get(self.pos..end));
        match field {
            Some(it) => {
                self.pos += len;
                Ok(it)
            }
            None => Err(Error::Decode {
                offset: self.base + self.pos,
                reason: "field past the end of record",
            }),
        }
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn u16(&mut self) -> Result<u16> {
        let mut bytes = [0; 2];
        bytes.copy_from_slice(self.bytes(2)?);
        Ok(u16::from_ne_bytes(bytes))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(self.bytes(4)?);
        Ok(u32::from_ne_bytes(bytes))
    }

    pub fn u64(&mut self) -> Result<u64> {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_ne_bytes(bytes))
    }

    fn task(&mut self) -> Result<Task> {
        let pid = self.u32()?;
        let tid = self.u32()?;
        Ok(Task { pid, tid })
    }

    // `u32 cpu, res;`
    fn cpu(&mut self) -> Result<u32> {
        let cpu = self.u32()?;
        self.u32()?;
        Ok(cpu)
    }
}
