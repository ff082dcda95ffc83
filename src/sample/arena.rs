use std::fs::File;
use std::io::Result;
use std::ptr::{null_mut, NonNull};

use crate::ffi::syscall::{mmap, munmap};

/// A shared mapping of an event file, unmapped on drop.
pub struct Arena {
    ptr: NonNull<u8>,
    len: usize,
}

impl Arena {
    pub fn new(file: &File, len: usize, offset: usize) -> Result<Self> {
        let prot = libc::PROT_READ | libc::PROT_WRITE;
        // https://github.com/torvalds/linux/blob/v6.13/kernel/events/core.c#L6582
        let flags = libc::MAP_SHARED;
        let ptr = unsafe { mmap::<u8>(null_mut(), len, prot, flags, file, offset as _) }?;
        // `mmap` never hands out the null page on success.
        let ptr = NonNull::new(ptr).ok_or(std::io::ErrorKind::AddrNotAvailable)?;
        Ok(Self { ptr, len })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Err(e) = unsafe { munmap(self.ptr.as_ptr(), self.len) } {
            log::warn!("failed to unmap {} bytes of event file: {}", self.len, e);
        }
    }
}
