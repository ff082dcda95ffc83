//! Event selection sets on top of the `perf_event_open` system call.
//!
//! An [`EventSelectionSet`] resolves event names such as `cpu-cycles:u` or
//! `sched:sched_switch`, schedules them in groups, and opens one event file per
//! event, monitored thread and cpu. It reads counters in stat mode, or streams
//! sample records out of mapped ring buffers in sample mode, and follows cpus
//! going offline and online while it runs.
//!
//! ## Example
//!
//! Sample a child process on every cpu until it exits. The loop returns once
//! every ring buffer hung up, then the records left behind are drained.
//!
//! ```rust,no_run
//! use std::process::Command;
//!
//! use perf_evsel::config::{Mode, DEFAULT_HOTPLUG_CHECK_INTERVAL};
//! use perf_evsel::io_loop::{Epoll, IoEventLoop};
//! use perf_evsel::sample::Record;
//! use perf_evsel::EventSelectionSet;
//!
//! let mut child = Command::new("ls").spawn().unwrap();
//!
//! let mut set = EventSelectionSet::new(Mode::Sample);
//! set.add_event_group(["cpu-cycles", "instructions"]).unwrap();
//! set.add_monitored_processes([child.id() as i32]);
//! set.enable_fp_call_chain_sampling().unwrap();
//!
//! set.open_event_files(&[]).unwrap();
//! set.mmap_event_files(1, 256).unwrap(); // Up to 256 data pages per cpu.
//!
//! let mut lp = Epoll::new().unwrap();
//! set.prepare_to_read_mmap_event_data(&mut lp, |record: Record| {
//!     println!("{:?}", record);
//!     true // Keep reading.
//! })
//! .unwrap();
//! set.handle_cpu_hotplug_events(&mut lp, &[], DEFAULT_HOTPLUG_CHECK_INTERVAL)
//!     .unwrap();
//!
//! lp.run(&mut set).unwrap();
//! set.finish_read_mmap_event_data().unwrap();
//! child.wait().unwrap();
//! ```
//!
//! ## Kernel compatibility
//!
//! Any Linux kernel since 4.0 is supported. Features that depend on the
//! hardware or a newer kernel, such as branch stack sampling, are checked
//! before they are configured.

#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!("perf_event_open is only available on Linux and Android");

pub mod config;
pub mod count;
mod error;
pub mod event;
pub mod evsel;
mod ffi;
pub mod io_loop;
pub mod sample;

pub use error::{Error, Result};
pub use evsel::{EventSelection, EventSelectionGroup, EventSelectionSet, SelectionId};
pub use ffi::abi;
pub use ffi::Attr;
