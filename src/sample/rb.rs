use std::fs::File;
use std::io::{Error, ErrorKind, Result};
use std::ptr::addr_of_mut;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

use super::arena::Arena;
use super::RecordBuffer;
use crate::ffi::{Metadata, PAGE_SIZE};

/// Ring buffer mapped from an event file: one metadata page followed by
/// a power of two of data pages.
pub struct MmapBuffer {
    arena: Arena,
    data_len: usize,
}

impl MmapBuffer {
    pub(crate) fn new(file: &File, pages: usize) -> Result<Self> {
        if !pages.is_power_of_two() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("{} data pages is not a power of two", pages),
            ));
        }
        let data_len = pages * *PAGE_SIZE;
        let arena = Arena::new(file, data_len + *PAGE_SIZE, 0)?;
        Ok(Self { arena, data_len })
    }

    /// Number of data pages.
    pub fn pages(&self) -> usize {
        self.data_len / *PAGE_SIZE
    }

    fn positions(&self) -> (&AtomicU64, &AtomicU64) {
        let metadata = self.arena.as_ptr() as *mut Metadata;
        // Both fields are 8-byte aligned in a page-aligned mapping that lives as long as `self`.
        unsafe {
            let head = AtomicU64::from_ptr(addr_of_mut!((*metadata).data_head));
            let tail = AtomicU64::from_ptr(addr_of_mut!((*metadata).data_tail));
            (head, tail)
        }
    }
}

impl RecordBuffer for MmapBuffer {
    fn drain(&mut self, out: &mut Vec<u8>) -> usize {
        let (head, tail) = self.positions();
        // About acquire:
        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L720
        let head_pos = head.load(Ordering::Acquire);
        let tail_pos = tail.load(Ordering::Relaxed);

        let len = (head_pos.wrapping_sub(tail_pos) as usize).min(self.data_len);
        if len == 0 {
            return 0;
        }

        let start = (tail_pos % self.data_len as u64) as usize;
        let first = len.min(self.data_len - start);
        out.reserve(len);
        unsafe {
            let data = self.arena.as_ptr().add(*PAGE_SIZE);
            out.extend_from_slice(slice::from_raw_parts(data.add(start), first));
            out.extend_from_slice(slice::from_raw_parts(data, len - first));
        }

        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L723
        tail.store(head_pos, Ordering::Release);
        len
    }
}
