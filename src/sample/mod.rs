//! Ring buffers and the records streamed through them.

mod arena;
mod rb;
pub mod record;

pub use rb::MmapBuffer;
pub use record::Record;

/// Source of raw record bytes behind one mapped event file.
pub trait RecordBuffer {
    /// Moves every byte written since the last call to the end of `out`,
    /// hands the space back to the writer and returns how many bytes were moved.
    fn drain(&mut self, out: &mut Vec<u8>) -> usize;
}

/// Receives decoded records, in buffer order.
pub trait RecordConsumer {
    /// Returns `false` to stop reading; the current drain then fails with
    /// [`Error::ConsumerAborted`][crate::Error::ConsumerAborted].
    fn consume(&mut self, record: Record) -> bool;
}

impl<F> RecordConsumer for F
where
    F: FnMut(Record) -> bool,
{
    fn consume(&mut self, record: Record) -> bool {
        self(record)
    }
}
