use std::time::Duration;

pub(crate) mod attr;
mod target;

pub use target::*;

/// Frequency used by sampling events unless told otherwise, in samples per second.
pub const DEFAULT_SAMPLE_FREQ: u64 = 4000;

/// Tracepoints are sampled on every hit by default.
pub const DEFAULT_TRACEPOINT_SAMPLE_PERIOD: u64 = 1;

/// How often the online cpu list is polled for hotplug events.
pub const DEFAULT_HOTPLUG_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// The kernel caps `sample_stack_user` to what fits in a record with its header.
pub const MAX_DUMP_STACK_SIZE: u32 = 65528;

/// What the event files of a set are used for, fixed when the set is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Counting only, nothing is mapped.
    Stat,
    /// Counting plus sample records streamed through mapped ring buffers.
    Sample,
}
