use std::io;

use thiserror::Error;

/// Errors reported by event resolution, configuration and the
/// open/mmap/read lifecycle of an event selection set.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown event type `{0}`")]
    UnresolvedEvent(String),
    #[error("unsupported modifier `{modifier}` for event type `{event}`")]
    UnsupportedModifier { event: String, modifier: String },
    #[error("an event group needs at least one event type")]
    EmptyGroup,
    #[error("event type `{0}` appears more than once")]
    DuplicateEvent(String),
    #[error("no event selection with id {0}")]
    UnknownSelection(u32),
    #[error("invalid branch sample type {0:#x}")]
    InvalidBranchSampling(u64),
    #[error("invalid dump stack size {0}, expected a non-zero multiple of 8 up to 65528")]
    InvalidStackSize(u32),
    #[error("{0} is not supported on this device")]
    Unsupported(&'static str),
    #[error("event files are already opened")]
    AlreadyOpened,
    #[error("event files are not opened")]
    NotOpened,
    #[error("no thread or process to monitor with cpu-agnostic event files")]
    NoTarget,
    #[error("cpu {0} is not online")]
    CpuOffline(i32),
    #[error("invalid mmap size range [{min}, {max}] pages")]
    InvalidMmapSize { min: usize, max: usize },
    #[error("event files are already mapped")]
    AlreadyMapped,
    #[error("event files are not mapped")]
    NotMapped,
    #[error("no record consumer is registered")]
    NoConsumer,
    #[error("failed to open event file for `{event}` (tid {tid}, cpu {cpu})")]
    Open {
        event: String,
        tid: i32,
        cpu: i32,
        source: io::Error,
    },
    #[error("failed to read counter of `{event}` (tid {tid}, cpu {cpu})")]
    Read {
        event: String,
        tid: i32,
        cpu: i32,
        source: io::Error,
    },
    #[error("failed to {op} event file of `{event}` (tid {tid}, cpu {cpu})")]
    Control {
        op: &'static str,
        event: String,
        tid: i32,
        cpu: i32,
        source: io::Error,
    },
    #[error("failed to map {pages} pages of event file (tid {tid}, cpu {cpu})")]
    Mmap {
        pages: usize,
        tid: i32,
        cpu: i32,
        source: io::Error,
    },
    #[error("malformed record at byte {offset}: {reason}")]
    Decode { offset: usize, reason: &'static str },
    #[error("record consumer asked to stop")]
    ConsumerAborted,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
