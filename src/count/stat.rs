use crate::ffi::abi as b;

/// One reading of a counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerfCounter {
    /// Raw event count.
    pub value: u64,
    /// Nanoseconds the counter was enabled.
    pub time_enabled: u64,
    /// Nanoseconds the counter was actually on the PMU.
    pub time_running: u64,
    /// Kernel event id.
    pub id: u64,
}

impl PerfCounter {
    pub(crate) const READ_FORMAT: u64 =
        b::PERF_FORMAT_TOTAL_TIME_ENABLED | b::PERF_FORMAT_TOTAL_TIME_RUNNING | b::PERF_FORMAT_ID;

    pub(crate) const READ_SIZE: usize = 4 * size_of::<u64>();

    // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L344
    // struct read_format {
    //     u64 value;
    //     { u64 time_enabled; } && PERF_FORMAT_TOTAL_TIME_ENABLED
    //     { u64 time_running; } && PERF_FORMAT_TOTAL_TIME_RUNNING
    //     { u64 id;           } && PERF_FORMAT_ID
    // };
    pub(crate) fn from_bytes(buf: &[u8; Self::READ_SIZE]) -> Self {
        let word = |i: usize| {
            let mut bytes = [0; 8];
            bytes.copy_from_slice(&buf[i * 8..(i + 1) * 8]);
            u64::from_ne_bytes(bytes)
        };
        Self {
            value: word(0),
            time_enabled: word(1),
            time_running: word(2),
            id: word(3),
        }
    }

    /// The counter shared the PMU with others and only ran part of the time it was enabled.
    pub fn is_multiplexed(&self) -> bool {
        self.time_running < self.time_enabled
    }

    /// Value extrapolated over the whole enabled time.
    ///
    /// A counter that never ran scales to 0.
    pub fn scaled_value(&self) -> u64 {
        if self.time_running == 0 {
            0
        } else if self.is_multiplexed() {
            (self.value as u128 * self.time_enabled as u128 / self.time_running as u128) as u64
        } else {
            self.value
        }
    }

    fn accumulate(&mut self, other: &Self) {
        self.value = self.value.saturating_add(other.value);
        self.time_enabled = self.time_enabled.saturating_add(other.time_enabled);
        self.time_running = self.time_running.saturating_add(other.time_running);
    }
}

/// A counter reading tagged with the thread and cpu it was opened for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CounterInfo {
    pub tid: i32,
    pub cpu: i32,
    pub counter: PerfCounter,
}

/// All readings of one event selection, including those preserved from cpus
/// that went offline.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CountersInfo {
    pub group_id: u32,
    pub selection_id: u32,
    /// Full event name, modifier included.
    pub event_name: String,
    pub counters: Vec<CounterInfo>,
}

impl CountersInfo {
    /// Sums values and times over every reading, saturating at `u64::MAX`.
    /// The id is left 0.
    pub fn total(&self) -> PerfCounter {
        self.counters
            .iter()
            .fold(PerfCounter::default(), |mut acc, it| {
                acc.accumulate(&it.counter);
                acc
            })
    }
}
