use std::fs;
use std::io::{Error, Result};
use std::path::Path;

use crate::ffi::abi as b;

const TRACEFS_EVENTS: [&str; 2] = [
    "/sys/kernel/tracing/events",
    "/sys/kernel/debug/tracing/events",
];

/// Tracepoint event provided by the kernel tracepoint infrastructure.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tracepoint {
    /// Tracepoint ID from under tracefs `events/*/*/id` if ftrace is enabled in the kernel.
    pub id: u64,
}

impl Tracepoint {
    /// Looks up `system:event` in the mounted tracefs.
    pub fn lookup(system: &str, event: &str) -> Option<Self> {
        TRACEFS_EVENTS
            .iter()
            .find_map(|root| Self::lookup_in(root, system, event).ok())
    }

    pub(crate) fn lookup_in<P>(root: P, system: &str, event: &str) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        if [system, event]
            .iter()
            .any(|it| it.is_empty() || it.contains(['/', ':']))
        {
            return Err(Error::from(std::io::ErrorKind::NotFound));
        }
        let path = root.as_ref().join(system).join(event).join("id");
        let id = fs::read_to_string(path)?;
        let id = id.trim().parse::<u64>().map_err(Error::other)?;
        Ok(Self { id })
    }
}

super::event_type!(Tracepoint, value, { (b::PERF_TYPE_TRACEPOINT, value.id) });
