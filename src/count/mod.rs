//! Counter handles and the kernel interface that opens them.
//!
//! The event selection machinery only talks to the kernel through [`Kernel`] and
//! [`CounterHandle`], so it can run against [`Linux`] or any other implementation.

use std::fs::File;
use std::io::{self, Result};
use std::os::fd::{AsRawFd, RawFd};

use crate::config::online_cpus;
use crate::ffi::syscall::{ioctl, ioctl_arg, ioctl_argp, perf_event_open, read};
use crate::ffi::{abi as b, Attr};
use crate::sample::{MmapBuffer, RecordBuffer};

mod stat;

pub use stat::*;

/// An open event file.
///
/// Dropping the handle closes it.
pub trait CounterHandle {
    type Buffer: RecordBuffer;

    /// Descriptor to watch for readability once the handle owns a buffer.
    fn raw_fd(&self) -> RawFd;

    /// Kernel id of the event, as found in sample records.
    fn id(&self) -> Result<u64>;

    fn read_counter(&self) -> Result<PerfCounter>;

    fn enable(&self) -> Result<()>;

    fn disable(&self) -> Result<()>;

    /// Maps a ring buffer of `pages` data pages behind a metadata page.
    fn mmap(&self, pages: usize) -> Result<Self::Buffer>;

    /// Sends this handle's records into the buffer mapped by `to`.
    fn redirect_output(&self, to: &Self) -> Result<()>;
}

/// Where event files come from.
pub trait Kernel {
    type Counter: CounterHandle;

    /// Opens an event file for `tid` on `cpu`, inside `group` when given.
    fn open(
        &mut self,
        attr: &Attr,
        tid: i32,
        cpu: i32,
        group: Option<&Self::Counter>,
    ) -> Result<Self::Counter>;

    fn online_cpus(&self) -> Result<Vec<i32>>;

    /// Whether an event file with `attr` can be opened at all.
    fn supports(&mut self, attr: &Attr) -> bool;
}

/// The running kernel, through `perf_event_open`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Linux;

impl Kernel for Linux {
    type Counter = Counter;

    fn open(&mut self, attr: &Attr, tid: i32, cpu: i32, group: Option<&Counter>) -> Result<Counter> {
        let group_fd = group.map_or(-1, |it| it.perf.as_raw_fd());
        let perf = perf_event_open(attr, tid, cpu, group_fd, b::PERF_FLAG_FD_CLOEXEC)?;
        Ok(Counter { tid, cpu, perf })
    }

    fn online_cpus(&self) -> Result<Vec<i32>> {
        online_cpus()
    }

    fn supports(&mut self, attr: &Attr) -> bool {
        match perf_event_open(attr, 0, -1, -1, b::PERF_FLAG_FD_CLOEXEC) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("trial open of attr type {} config {} failed: {}", attr.type_, attr.config, e);
                false
            }
        }
    }
}

/// An event file opened by [`Linux`].
#[derive(Debug)]
pub struct Counter {
    tid: i32,
    cpu: i32,
    perf: File,
}

impl Counter {
    pub fn tid(&self) -> i32 {
        self.tid
    }

    pub fn cpu(&self) -> i32 {
        self.cpu
    }

    pub fn file(&self) -> &File {
        &self.perf
    }
}

impl CounterHandle for Counter {
    type Buffer = MmapBuffer;

    fn raw_fd(&self) -> RawFd {
        self.perf.as_raw_fd()
    }

    fn id(&self) -> Result<u64> {
        let mut id = 0;
        ioctl_argp(&self.perf, b::PERF_EVENT_IOC_ID, &mut id)?;
        Ok(id)
    }

    fn read_counter(&self) -> Result<PerfCounter> {
        let mut buf = [0; PerfCounter::READ_SIZE];
        let len = read(self.perf.as_raw_fd(), &mut buf)?;
        if len != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short counter read of {} bytes", len),
            ));
        }
        Ok(PerfCounter::from_bytes(&buf))
    }

    fn enable(&self) -> Result<()> {
        ioctl(&self.perf, b::PERF_EVENT_IOC_ENABLE)?;
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        ioctl(&self.perf, b::PERF_EVENT_IOC_DISABLE)?;
        Ok(())
    }

    fn mmap(&self, pages: usize) -> Result<MmapBuffer> {
        MmapBuffer::new(&self.perf, pages)
    }

    fn redirect_output(&self, to: &Self) -> Result<()> {
        ioctl_arg(&self.perf, b::PERF_EVENT_IOC_SET_OUTPUT, to.perf.as_raw_fd() as _)?;
        Ok(())
    }
}
