use super::{Cursor, RecordId, Schema};
use crate::Result;

// PERF_RECORD_LOST counts all lost records:
// Count lost when no space:
// https://github.com/torvalds/linux/blob/v6.13/kernel/events/ring_buffer.c#L203
// Generate PERF_RECORD_LOST:
// https://github.com/torvalds/linux/blob/v6.13/kernel/events/ring_buffer.c#L189
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Lost {
    pub record_id: Option<RecordId>,

    /// Id of the event whose records were dropped.
    pub id: u64,
    pub lost_records: u64,
}

impl Lost {
    pub(super) fn parse(cursor: &mut Cursor<'_>, schema: Schema) -> Result<Self> {
        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L891
        // struct {
        //     struct perf_event_header header;
        //     u64 id;
        //     u64 lost;
        //     struct sample_id sample_id;
        // };

        let id = cursor.u64()?;
        let lost_records = cursor.u64()?;
        let record_id = if schema.sample_id_all {
            Some(RecordId::parse(cursor, schema.sample_type)?)
        } else {
            None
        };

        Ok(Self {
            record_id,
            id,
            lost_records,
        })
    }
}
