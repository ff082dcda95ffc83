use super::{Cursor, RecordId};
use crate::count::PerfCounter;
use crate::ffi::abi as b;
use crate::Result;

/// A sample, decoded up to its raw payload.
///
/// Fields after `raw` (branch stack, registers, user stack) are left in [`rest`][Self::rest].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Record IDs.
    pub record_id: RecordId,

    /// Code address (instruction pointer).
    pub code_addr: Option<u64>,
    /// Data address.
    pub data_addr: Option<u64>,
    /// Sampling period.
    pub period: Option<u64>,
    /// Counter reading at sample time.
    pub read: Option<PerfCounter>,
    /// Call chain (stack backtrace).
    pub call_chain: Option<Vec<u64>>,
    /// Raw tracepoint data.
    pub raw: Option<Vec<u8>>,
    pub rest: Vec<u8>,
}

impl Sample {
    // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L957
    // struct {
    //     struct perf_event_header header;
    //     { u64 id;        } && PERF_SAMPLE_IDENTIFIER
    //     { u64 ip;        } && PERF_SAMPLE_IP
    //     { u32 pid, tid;  } && PERF_SAMPLE_TID
    //     { u64 time;      } && PERF_SAMPLE_TIME
    //     { u64 addr;      } && PERF_SAMPLE_ADDR
    //     { u64 id;        } && PERF_SAMPLE_ID
    //     { u64 stream_id; } && PERF_SAMPLE_STREAM_ID
    //     { u32 cpu, res;  } && PERF_SAMPLE_CPU
    //     { u64 period;    } && PERF_SAMPLE_PERIOD
    //     { struct read_format values; } && PERF_SAMPLE_READ
    //     {
    //         u64 nr,
    //         u64 ips[nr];
    //     } && PERF_SAMPLE_CALLCHAIN
    //     {
    //         u32 size;
    //         char data[size];
    //     } && PERF_SAMPLE_RAW
    //     ...
    // };
    pub(super) fn parse(cursor: &mut Cursor<'_>, sample_type: u64) -> Result<Self> {
        macro_rules! when {
            ($flag:ident, $then:expr) => {
                if sample_type & b::$flag > 0 {
                    Some($then)
                } else {
                    None
                }
            };
        }

        let identifier = when!(PERF_SAMPLE_IDENTIFIER, cursor.u64()?);
        let code_addr = when!(PERF_SAMPLE_IP, cursor.u64()?);
        let task = when!(PERF_SAMPLE_TID, cursor.task()?);
        let time = when!(PERF_SAMPLE_TIME, cursor.u64()?);
        let data_addr = when!(PERF_SAMPLE_ADDR, cursor.u64()?);
        let id = when!(PERF_SAMPLE_ID, cursor.u64()?);
        let stream_id = when!(PERF_SAMPLE_STREAM_ID, cursor.u64()?);
        let cpu = when!(PERF_SAMPLE_CPU, cursor.cpu()?);
        let period = when!(PERF_SAMPLE_PERIOD, cursor.u64()?);
        // Every selection reads without `PERF_FORMAT_GROUP`.
        let read = when!(PERF_SAMPLE_READ, {
            let mut buf = [0; PerfCounter::READ_SIZE];
            buf.copy_from_slice(cursor.bytes(PerfCounter::READ_SIZE)?);
            PerfCounter::from_bytes(&buf)
        });
        let call_chain = when!(PERF_SAMPLE_CALLCHAIN, {
            let nr = cursor.u64()?;
            let ips = cursor.bytes((nr as usize).saturating_mul(size_of::<u64>()))?;
            ips.chunks_exact(size_of::<u64>())
                .map(|it| {
                    let mut bytes = [0; 8];
                    bytes.copy_from_slice(it);
                    u64::from_ne_bytes(bytes)
                })
                .collect()
        });
        let raw = when!(PERF_SAMPLE_RAW, {
            let size = cursor.u32()?;
            cursor.bytes(size as _)?.to_vec()
        });

        Ok(Self {
            record_id: RecordId {
                id: id.or(identifier),
                stream_id,
                cpu,
                task,
                time,
            },
            code_addr,
            data_addr,
            period,
            read,
            call_chain,
            raw,
            rest: cursor.rest().to_vec(),
        })
    }
}
