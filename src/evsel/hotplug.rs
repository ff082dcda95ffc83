use std::time::Duration;

use log::{debug, info, warn};

use super::{BufferKey, CpuScope, EventSelectionSet};
use crate::config::Mode;
use crate::count::{CounterHandle, CounterInfo, Kernel};
use crate::ffi::abi as b;
use crate::io_loop::IoEventLoop;
use crate::sample::record::EventId;
use crate::sample::Record;
use crate::{Error, Result};

impl<K: Kernel> EventSelectionSet<K> {
    /// Polls the online cpus every `interval` while `lp` runs with the set as
    /// its handler, closing the event files of cpus going offline and reopening
    /// them when the cpus come back.
    ///
    /// Only cpus in `monitored_cpus` are followed. When it is empty, every cpu is
    /// followed, or only the listed ones if the files were opened on a cpu list.
    /// Cpu-agnostic event files need no hotplug handling at all.
    pub fn handle_cpu_hotplug_events<L: IoEventLoop>(
        &mut self,
        lp: &mut L,
        monitored_cpus: &[i32],
        interval: Duration,
    ) -> Result<()> {
        let scope = self.check_opened()?;
        if scope == CpuScope::Any {
            debug!("event files are not bound to cpus, no hotplug to handle");
            return Ok(());
        }

        if !monitored_cpus.is_empty() {
            self.monitored_cpus = monitored_cpus.iter().copied().collect();
        }
        if self.hotplug_timer.is_none() {
            self.hotplug_timer = Some(lp.add_periodic_event(interval)?);
        }
        Ok(())
    }

    fn is_tracked(&self, cpu: i32) -> bool {
        self.monitored_cpus.is_empty() || self.monitored_cpus.contains(&cpu)
    }

    pub(super) fn detect_cpu_hotplug_events<L: IoEventLoop>(&mut self, lp: &mut L) -> Result<()> {
        let online = self.kernel.online_cpus()?;

        let gone: Vec<i32> = self
            .online_cpus
            .iter()
            .copied()
            .filter(|cpu| !online.contains(cpu))
            .collect();
        for cpu in gone {
            if self.is_tracked(cpu) {
                self.handle_cpu_offline_event(lp, cpu)?;
            } else {
                debug!("untracked cpu {} is offline, keeping its event files", cpu);
                self.online_cpus.retain(|&it| it != cpu);
            }
        }

        for cpu in online {
            if self.online_cpus.contains(&cpu) {
                continue;
            }
            if self.is_tracked(cpu) {
                self.handle_cpu_online_event(lp, cpu)?;
            } else if self.has_event_files_on(cpu) {
                debug!("untracked cpu {} is back online", cpu);
                self.online_cpus.push(cpu);
                self.online_cpus.sort_unstable();
            }
        }
        Ok(())
    }

    fn has_event_files_on(&self, cpu: i32) -> bool {
        self.selections
            .iter()
            .any(|it| it.counters.keys().any(|&(_, on)| on == cpu))
    }

    fn handle_cpu_offline_event<L: IoEventLoop>(&mut self, lp: &mut L, cpu: i32) -> Result<()> {
        info!("cpu {} is offline, closing its event files", cpu);

        // Records already written by the dying cpu still belong to the stream.
        if self.consumer.is_some() {
            self.finish_read_mmap_event_data()?;
        }
        if let Some(mapped) = self.buffers.remove(&BufferKey::Cpu(cpu)) {
            if let Some(token) = mapped.token {
                lp.del_event(token)?;
            }
        }

        // Every handle of the cpu is closed, even after a failed read.
        let mut read_error = None;
        for selection in &mut self.selections {
            let keys: Vec<_> = selection
                .counters
                .keys()
                .filter(|(_, it)| *it == cpu)
                .copied()
                .collect();
            for (tid, cpu) in keys {
                let Some(handle) = selection.counters.remove(&(tid, cpu)) else {
                    continue;
                };
                match handle.read_counter() {
                    Ok(counter) => selection
                        .hotplugged_counters
                        .push(CounterInfo { tid, cpu, counter }),
                    Err(source) => {
                        warn!(
                            "failed to read `{}` for tid {} on offline cpu {}: {}",
                            selection.event_type.name, tid, cpu, source
                        );
                        read_error.get_or_insert(Error::Read {
                            event: selection.event_type.name.clone(),
                            tid,
                            cpu,
                            source,
                        });
                    }
                }
            }
        }

        self.online_cpus.retain(|&it| it != cpu);
        // A lost reading fails a stat session, a sample session keeps streaming.
        match read_error {
            Some(e) if self.mode == Mode::Stat => Err(e),
            _ => Ok(()),
        }
    }

    fn handle_cpu_online_event<L: IoEventLoop>(&mut self, lp: &mut L, cpu: i32) -> Result<()> {
        info!("cpu {} is online, reopening its event files", cpu);

        // The monitored process is already running, new event files must count at once.
        for selection in &mut self.selections {
            selection.attr.set_flag(b::PERF_ATTR_FLAG_ENABLE_ON_EXEC, false);
            selection.attr.set_flag(b::PERF_ATTR_FLAG_DISABLED, false);
        }

        let mut opened = 0;
        let mut failed = false;
        for group in 0..self.groups.len() {
            for tid in self.targets() {
                match self.open_cell(group, tid, cpu) {
                    Ok(ids) => opened += ids.len(),
                    Err((id, e)) if self.is_expected_absence(&e, cpu) => debug!(
                        "skip `{}` for tid {} on cpu {}: {}",
                        self.selections[id as usize].event_type.name, tid, cpu, e
                    ),
                    Err((id, e)) => {
                        warn!(
                            "failed to reopen `{}` for tid {} on cpu {}: {}",
                            self.selections[id as usize].event_type.name, tid, cpu, e
                        );
                        failed = true;
                    }
                }
            }
        }

        // A cpu is either fully monitored or retried on the next tick.
        if failed || opened == 0 {
            return self.close_cpu_event_files(lp, cpu);
        }
        if self.mmap_pages > 0 {
            if let Err(e) = self.create_mapped_buffer_for_cpu(lp, cpu) {
                warn!("failed to map buffer of cpu {}: {}", cpu, e);
                return self.close_cpu_event_files(lp, cpu);
            }
        }

        self.online_cpus.push(cpu);
        self.online_cpus.sort_unstable();
        self.report_event_ids(cpu)
    }

    // Drops what a failed reopen left behind, without keeping any reading.
    fn close_cpu_event_files<L: IoEventLoop>(&mut self, lp: &mut L, cpu: i32) -> Result<()> {
        if let Some(token) = self.buffers.remove(&BufferKey::Cpu(cpu)).and_then(|it| it.token) {
            lp.del_event(token)?;
        }
        for selection in &mut self.selections {
            selection.counters.retain(|&(_, it), _| it != cpu);
        }
        Ok(())
    }

    fn create_mapped_buffer_for_cpu<L: IoEventLoop>(&mut self, lp: &mut L, cpu: i32) -> Result<()> {
        self.map_buffers(self.mmap_pages, Some(cpu))?;
        if self.consumer.is_none() {
            return Ok(());
        }
        if let Some(mapped) = self.buffers.get_mut(&BufferKey::Cpu(cpu)) {
            mapped.token = Some(lp.add_read_event(mapped.fd)?);
        }
        Ok(())
    }

    // Samples of the new event files carry ids the consumer has never seen.
    fn report_event_ids(&mut self, cpu: i32) -> Result<()> {
        let Some(consumer) = self.consumer.as_mut() else {
            return Ok(());
        };
        let mut ids = vec![];
        for selection in &self.selections {
            for (&(tid, _), handle) in selection.counters.iter().filter(|((_, it), _)| *it == cpu) {
                match handle.id() {
                    Ok(id) => ids.push((selection.selection_id, id)),
                    Err(e) => warn!(
                        "failed to get id of `{}` for tid {} on cpu {}: {}",
                        selection.event_type.name, tid, cpu, e
                    ),
                }
            }
        }
        if !consumer.consume(Record::EventId(EventId { cpu, ids })) {
            return Err(Error::ConsumerAborted);
        }
        Ok(())
    }
}
