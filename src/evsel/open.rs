use std::collections::BTreeSet;
use std::io;

use log::debug;

use super::{CpuScope, EventSelectionSet, SelectionId};
use crate::config::{ALL_THREADS, ANY_CPU};
use crate::count::{CounterHandle, CounterInfo, CountersInfo, Kernel};
use crate::{Error, Result};

impl<K: Kernel> EventSelectionSet<K> {
    /// Opens an event file for every selection, monitored thread and cpu.
    ///
    /// `on_cpus` empty means every online cpu, `[ANY_CPU]` means files follow their
    /// thread across cpus. A cpu that turns out to be offline, or a thread that has
    /// exited, is skipped as long as every group still opens somewhere for every
    /// thread. Any other failure closes what this call opened.
    pub fn open_event_files(&mut self, on_cpus: &[i32]) -> Result<()> {
        self.check_not_opened()?;

        let online = self.kernel.online_cpus()?;
        let (scope, cpus) = match on_cpus {
            [] => (CpuScope::Online, online.clone()),
            [ANY_CPU] => (CpuScope::Any, vec![ANY_CPU]),
            cpus => {
                let cpus: Vec<i32> = cpus.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
                if let Some(&cpu) = cpus.iter().find(|it| !online.contains(it)) {
                    return Err(Error::CpuOffline(cpu));
                }
                (CpuScope::Listed, cpus)
            }
        };
        if scope == CpuScope::Any && !self.has_monitored_target() {
            return Err(Error::NoTarget);
        }

        self.union_sample_type();

        let targets = self.targets();
        let mut opened = vec![];
        if let Err(e) = self.open_matrix(&targets, &cpus, &mut opened) {
            for (id, key) in opened {
                self.selections[id as usize].counters.remove(&key);
            }
            return Err(e);
        }

        debug!(
            "opened {} event files for {} threads on cpus {:?}",
            opened.len(),
            targets.len(),
            cpus
        );
        if scope == CpuScope::Listed {
            self.monitored_cpus = cpus.iter().copied().collect();
        }
        // A cpu unplugged while opening comes back through hotplug handling.
        self.online_cpus = match scope {
            CpuScope::Any => online,
            _ => cpus
                .into_iter()
                .filter(|cpu| {
                    self.selections
                        .iter()
                        .any(|it| it.counters.keys().any(|&(_, on)| on == *cpu))
                })
                .collect(),
        };
        self.opened = Some(scope);
        Ok(())
    }

    /// Starts every open event file, e.g. after opening them disabled with
    /// [`set_enable_on_exec`][Self::set_enable_on_exec] when no exec is coming.
    pub fn enable_event_files(&self) -> Result<()> {
        self.control("enable", |it| it.enable())
    }

    /// Stops every open event file. Counts and samples are kept.
    pub fn disable_event_files(&self) -> Result<()> {
        self.control("disable", |it| it.disable())
    }

    fn control<F>(&self, op: &'static str, f: F) -> Result<()>
    where
        F: Fn(&K::Counter) -> io::Result<()>,
    {
        self.check_opened()?;
        for selection in &self.selections {
            for (&(tid, cpu), handle) in &selection.counters {
                f(handle).map_err(|source| Error::Control {
                    op,
                    event: selection.event_type.name.clone(),
                    tid,
                    cpu,
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Reads every open event file, after the readings preserved from offlined cpus.
    pub fn read_counters(&self) -> Result<Vec<CountersInfo>> {
        self.selections
            .iter()
            .map(|selection| {
                let mut counters = selection.hotplugged_counters.clone();
                for (&(tid, cpu), handle) in &selection.counters {
                    let counter = handle.read_counter().map_err(|source| Error::Read {
                        event: selection.event_type.name.clone(),
                        tid,
                        cpu,
                        source,
                    })?;
                    counters.push(CounterInfo { tid, cpu, counter });
                }
                Ok(CountersInfo {
                    group_id: selection.group_id,
                    selection_id: selection.selection_id,
                    event_name: selection.event_type.name.clone(),
                    counters,
                })
            })
            .collect()
    }

    // Records sharing a buffer must share a layout.
    fn union_sample_type(&mut self) {
        let sample_type = self
            .selections
            .iter()
            .fold(0, |acc, it| acc | it.attr.sample_type);
        for selection in &mut self.selections {
            selection.attr.sample_type = sample_type;
        }
    }

    pub(super) fn targets(&self) -> Vec<i32> {
        if self.has_monitored_target() {
            let targets: BTreeSet<_> = self.processes.union(&self.threads).copied().collect();
            targets.into_iter().collect()
        } else {
            vec![ALL_THREADS]
        }
    }

    fn open_matrix(
        &mut self,
        targets: &[i32],
        cpus: &[i32],
        opened: &mut Vec<(SelectionId, (i32, i32))>,
    ) -> Result<()> {
        for group in 0..self.groups.len() {
            for &tid in targets {
                let mut opened_any = false;
                let mut absent = None;
                for &cpu in cpus {
                    match self.open_cell(group, tid, cpu) {
                        Ok(ids) => {
                            opened_any = true;
                            opened.extend(ids.into_iter().map(|id| (id, (tid, cpu))));
                        }
                        Err((id, source)) if self.is_expected_absence(&source, cpu) => {
                            debug!(
                                "skip `{}` for tid {} on cpu {}: {}",
                                self.selections[id as usize].event_type.name, tid, cpu, source
                            );
                            absent = Some((id, cpu, source));
                        }
                        Err((id, source)) => return Err(self.open_error(id, tid, cpu, source)),
                    }
                }
                if let (false, Some((id, cpu, source))) = (opened_any, absent) {
                    return Err(self.open_error(id, tid, cpu, source));
                }
            }
        }
        Ok(())
    }

    /// Opens every member of `group` for `tid` on `cpu`, or none of them.
    pub(super) fn open_cell(
        &mut self,
        group: usize,
        tid: i32,
        cpu: i32,
    ) -> Result<Vec<SelectionId>, (SelectionId, io::Error)> {
        let members = self.groups[group].members.clone();
        let mut handles = Vec::with_capacity(members.len());
        for &id in &members {
            let attr = &self.selections[id as usize].attr;
            match self.kernel.open(attr, tid, cpu, handles.first()) {
                Ok(handle) => handles.push(handle),
                Err(e) => return Err((id, e)),
            }
        }
        for (&id, handle) in members.iter().zip(handles) {
            self.selections[id as usize].counters.insert((tid, cpu), handle);
        }
        Ok(members)
    }

    pub(super) fn is_expected_absence(&self, e: &io::Error, cpu: i32) -> bool {
        match e.raw_os_error() {
            Some(libc::ESRCH) => true,
            Some(libc::ENODEV | libc::ENOENT | libc::ENXIO) if cpu != ANY_CPU => {
                matches!(self.kernel.online_cpus(), Ok(online) if !online.contains(&cpu))
            }
            _ => false,
        }
    }

    fn open_error(&self, id: SelectionId, tid: i32, cpu: i32, source: io::Error) -> Error {
        Error::Open {
            event: self.selections[id as usize].event_type.name.clone(),
            tid,
            cpu,
            source,
        }
    }
}
