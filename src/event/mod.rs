//! Event name resolution.
//!
//! An event is named the way `perf list` prints it (`cpu-cycles`, `L1-dcache-load-misses`,
//! `r1b`, `sched:sched_switch`), optionally followed by `:` and a modifier string such as `u`,
//! `k` or `pp`.

mod hw;
mod raw;
mod sw;
mod tp;

pub use hw::*;
pub use raw::Raw;
pub use sw::Software;
pub use tp::Tracepoint;

use crate::{Error, Result};

/// Kernel identity of an event: the `type` and `config` fields of its attr.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventType {
    /// Name without modifier.
    pub name: String,
    pub ty: u32,
    pub config: u64,
}

/// An [`EventType`] together with the privilege and precision modifiers parsed from its name.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventTypeAndModifier {
    /// Name as given by the user, modifier included.
    pub name: String,
    pub event_type: EventType,
    /// Modifier string without the leading `:`, empty if there was none.
    pub modifier: String,
    pub exclude_user: bool,
    pub exclude_kernel: bool,
    pub exclude_hv: bool,
    pub exclude_host: bool,
    pub exclude_guest: bool,
    /// Skid constraint level, 0 to 3.
    pub precise_ip: u8,
}

impl EventTypeAndModifier {
    /// Clock events are counted by the kernel itself and can't be split by privilege level.
    pub(crate) fn is_clock(&self) -> bool {
        use crate::ffi::abi as b;
        self.event_type.ty == b::PERF_TYPE_SOFTWARE
            && matches!(
                self.event_type.config,
                b::PERF_COUNT_SW_CPU_CLOCK | b::PERF_COUNT_SW_TASK_CLOCK
            )
    }
}

macro_rules! event_type {
    ($ty:ty, $value:ident, $impl: expr) => {
        impl $ty {
            /// Returns the attr `type` and `config` that count this event.
            pub fn type_and_config(&self) -> (u32, u64) {
                let $value = self;
                $impl
            }
        }
    };
}
use event_type;

fn lookup(name: &str) -> Option<EventType> {
    let (ty, config) = if let Some(hw) = Hardware::from_name(name) {
        hw.type_and_config()
    } else if let Some(sw) = Software::from_name(name) {
        sw.type_and_config()
    } else if let Some(raw) = Raw::from_name(name) {
        raw.type_and_config()
    } else if let Some((system, event)) = name.split_once(':') {
        Tracepoint::lookup(system, event)?.type_and_config()
    } else {
        return None;
    };

    Some(EventType {
        name: name.to_string(),
        ty,
        config,
    })
}

/// Resolves `name`, with an optional `:modifier` suffix, into an event type.
pub fn resolve(name: &str) -> Result<EventTypeAndModifier> {
    if let Some(event_type) = lookup(name) {
        return Ok(EventTypeAndModifier {
            name: name.to_string(),
            event_type,
            modifier: String::new(),
            exclude_user: false,
            exclude_kernel: false,
            exclude_hv: false,
            exclude_host: false,
            exclude_guest: false,
            precise_ip: 0,
        });
    }

    let (base, modifier) = name
        .rsplit_once(':')
        .ok_or_else(|| Error::UnresolvedEvent(name.to_string()))?;
    let event_type = lookup(base).ok_or_else(|| Error::UnresolvedEvent(name.to_string()))?;
    let unsupported = || Error::UnsupportedModifier {
        event: base.to_string(),
        modifier: modifier.to_string(),
    };

    if modifier.is_empty() {
        return Err(unsupported());
    }

    // Naming any privilege level excludes the ones not named.
    let levels = modifier.contains(['u', 'k', 'h']);
    let mut event = EventTypeAndModifier {
        name: name.to_string(),
        event_type,
        modifier: modifier.to_string(),
        exclude_user: levels,
        exclude_kernel: levels,
        exclude_hv: levels,
        exclude_host: false,
        exclude_guest: false,
        precise_ip: 0,
    };
    for c in modifier.chars() {
        match c {
            'u' => event.exclude_user = false,
            'k' => event.exclude_kernel = false,
            'h' => event.exclude_hv = false,
            'G' => event.exclude_host = true,
            'H' => event.exclude_guest = true,
            'p' if event.precise_ip < 3 => event.precise_ip += 1,
            _ => return Err(unsupported()),
        }
    }

    Ok(event)
}
