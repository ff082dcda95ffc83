use std::collections::BTreeSet;
use std::fs;
use std::io::{Error, ErrorKind, Result};

/// Cpu argument of `perf_event_open` meaning "whichever cpu the target runs on".
pub const ANY_CPU: i32 = -1;

/// Pid argument of `perf_event_open` meaning "every thread", only valid with a concrete cpu.
pub const ALL_THREADS: i32 = -1;

const ONLINE_CPUS: &str = "/sys/devices/system/cpu/online";

/// Parses a kernel cpu list such as `0-3,5` into sorted, deduplicated cpu numbers.
pub fn parse_cpu_list(list: &str) -> Result<Vec<i32>> {
    let invalid = || Error::new(ErrorKind::InvalidData, format!("invalid cpu list `{list}`"));
    let mut cpus = BTreeSet::new();
    for part in list.trim().split(',').filter(|it| !it.is_empty()) {
        let part = part.trim();
        match part.split_once('-') {
            Some((start, end)) => {
                let start = start.parse::<i32>().map_err(|_| invalid())?;
                let end = end.parse::<i32>().map_err(|_| invalid())?;
                if start < 0 || start > end {
                    return Err(invalid());
                }
                cpus.extend(start..=end);
            }
            None => {
                let cpu = part.parse::<i32>().map_err(|_| invalid())?;
                if cpu < 0 {
                    return Err(invalid());
                }
                cpus.insert(cpu);
            }
        }
    }
    Ok(cpus.into_iter().collect())
}

/// Reads the cpus currently online.
pub fn online_cpus() -> Result<Vec<i32>> {
    let list = fs::read_to_string(ONLINE_CPUS)?;
    parse_cpu_list(&list)
}
