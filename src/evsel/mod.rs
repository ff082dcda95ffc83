//! Event selection sets.
//!
//! An [`EventSelectionSet`] owns every configured event, groups them the way the
//! kernel schedules them together, and opens one event file per
//! `(event, monitored thread, cpu)` cell. In sample mode it maps ring buffers for
//! those files and streams decoded records to a [`RecordConsumer`] from an
//! [`IoEventLoop`]; it can also keep the cpu dimension in sync with hotplug.
//!
//! # Examples
//!
//! ```rust,no_run
//! use perf_evsel::config::Mode;
//! use perf_evsel::evsel::EventSelectionSet;
//!
//! let mut set = EventSelectionSet::new(Mode::Stat);
//! set.add_event_group(["cpu-cycles", "instructions:u"]).unwrap();
//! set.add_monitored_threads([std::process::id() as i32]);
//! set.open_event_files(&[]).unwrap();
//!
//! for info in set.read_counters().unwrap() {
//!     let total = info.total();
//!     println!("{}: {} (scaled {})", info.event_name, total.value, total.scaled_value());
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::os::fd::RawFd;

use crate::config::{attr, Mode, MAX_DUMP_STACK_SIZE};
use crate::count::{CounterHandle, CounterInfo, Kernel, Linux};
use crate::event::{self, EventTypeAndModifier};
use crate::ffi::{abi as b, Attr};
use crate::io_loop::Token;
use crate::sample::RecordConsumer;
use crate::{Error, Result};

mod hotplug;
mod mmap;
mod open;
#[cfg(test)]
mod fake;

/// Index of a selection in its set, assigned in creation order.
pub type SelectionId = u32;

/// One configured event plus every event file opened for it.
pub struct EventSelection<C> {
    group_id: u32,
    selection_id: SelectionId,
    event_type: EventTypeAndModifier,
    attr: Attr,
    counters: BTreeMap<(i32, i32), C>,
    hotplugged_counters: Vec<CounterInfo>,
}

impl<C> EventSelection<C> {
    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    pub fn selection_id(&self) -> SelectionId {
        self.selection_id
    }

    pub fn event_type(&self) -> &EventTypeAndModifier {
        &self.event_type
    }

    pub fn attr(&self) -> &Attr {
        &self.attr
    }

    /// Open event files keyed by `(tid, cpu)`.
    pub fn counters(&self) -> &BTreeMap<(i32, i32), C> {
        &self.counters
    }

    /// Last readings of event files closed because their cpu went offline.
    pub fn hotplugged_counters(&self) -> &[CounterInfo] {
        &self.hotplugged_counters
    }
}

/// Selections scheduled onto the PMU together, the first one leading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSelectionGroup {
    group_id: u32,
    members: Vec<SelectionId>,
}

impl EventSelectionGroup {
    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    pub fn members(&self) -> &[SelectionId] {
        &self.members
    }

    pub fn leader(&self) -> SelectionId {
        self.members[0]
    }
}

// Event files on a cpu share that cpu's buffer, cpu-agnostic ones share one per thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum BufferKey {
    Cpu(i32),
    Thread(i32),
}

impl BufferKey {
    fn new(tid: i32, cpu: i32) -> Self {
        if cpu == crate::config::ANY_CPU {
            BufferKey::Thread(tid)
        } else {
            BufferKey::Cpu(cpu)
        }
    }
}

struct MappedBuffer<B> {
    // Selection and `(tid, cpu)` of the event file the buffer was mapped from.
    owner: (SelectionId, (i32, i32)),
    fd: RawFd,
    buffer: B,
    token: Option<Token>,
}

// How the cpu dimension was chosen at open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CpuScope {
    Online,
    Listed,
    Any,
}

type Buffer<K> = <<K as Kernel>::Counter as CounterHandle>::Buffer;

/// The set of monitored events and all their event files.
///
/// Configure it with `add_*` and the modifier methods, then call
/// [`open_event_files`][Self::open_event_files]. Modifiers fail once files are opened.
/// Dropping the set unmaps every buffer and closes every event file.
pub struct EventSelectionSet<K: Kernel = Linux> {
    kernel: K,
    mode: Mode,
    selections: Vec<EventSelection<K::Counter>>,
    groups: Vec<EventSelectionGroup>,
    processes: BTreeSet<i32>,
    threads: BTreeSet<i32>,
    opened: Option<CpuScope>,
    online_cpus: Vec<i32>,
    monitored_cpus: BTreeSet<i32>,
    mmap_pages: usize,
    buffers: BTreeMap<BufferKey, MappedBuffer<Buffer<K>>>,
    consumer: Option<Box<dyn RecordConsumer>>,
    hotplug_timer: Option<Token>,
    drain_buf: Vec<u8>,
}

impl EventSelectionSet<Linux> {
    pub fn new(mode: Mode) -> Self {
        Self::with_kernel(Linux, mode)
    }
}

impl<K: Kernel> EventSelectionSet<K> {
    pub fn with_kernel(kernel: K, mode: Mode) -> Self {
        Self {
            kernel,
            mode,
            selections: vec![],
            groups: vec![],
            processes: BTreeSet::new(),
            threads: BTreeSet::new(),
            opened: None,
            online_cpus: vec![],
            monitored_cpus: BTreeSet::new(),
            mmap_pages: 0,
            buffers: BTreeMap::new(),
            consumer: None,
            hotplug_timer: None,
            drain_buf: vec![],
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn is_opened(&self) -> bool {
        self.opened.is_some()
    }

    pub fn groups(&self) -> &[EventSelectionGroup] {
        &self.groups
    }

    pub fn selections(&self) -> &[EventSelection<K::Counter>] {
        &self.selections
    }

    pub fn selection(&self, id: SelectionId) -> Option<&EventSelection<K::Counter>> {
        self.selections.get(id as usize)
    }

    /// Cpus that currently have event files, kept up to date by hotplug handling.
    pub fn online_cpus(&self) -> &[i32] {
        &self.online_cpus
    }

    /// Data pages per buffer chosen by [`mmap_event_files`][Self::mmap_event_files], 0 if unmapped.
    pub fn mmap_pages(&self) -> usize {
        self.mmap_pages
    }

    /// Adds a single-event group and returns its group id.
    pub fn add_event_type(&mut self, name: &str) -> Result<u32> {
        self.add_event_group([name])
    }

    /// Adds events that are scheduled together, the first one leading, and returns
    /// the group id. Nothing is added if any name fails to resolve.
    pub fn add_event_group<I, S>(&mut self, names: I) -> Result<u32>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.check_not_opened()?;

        let group_id = self.groups.len() as u32;
        let mut members: Vec<EventSelection<K::Counter>> = vec![];
        for name in names {
            let event_type = self.build_event_type(name.as_ref())?;
            let duplicated = self
                .selections
                .iter()
                .chain(&members)
                .any(|it| it.event_type.name == event_type.name);
            if duplicated {
                return Err(Error::DuplicateEvent(event_type.name));
            }
            members.push(EventSelection {
                group_id,
                selection_id: (self.selections.len() + members.len()) as _,
                attr: attr::from(&event_type, self.mode),
                event_type,
                counters: BTreeMap::new(),
                hotplugged_counters: vec![],
            });
        }
        if members.is_empty() {
            return Err(Error::EmptyGroup);
        }

        self.groups.push(EventSelectionGroup {
            group_id,
            members: members.iter().map(|it| it.selection_id).collect(),
        });
        self.selections.extend(members);
        Ok(group_id)
    }

    fn build_event_type(&self, name: &str) -> Result<EventTypeAndModifier> {
        let event_type = event::resolve(name)?;
        // The kernel ignores privilege filters on clock events.
        if self.mode == Mode::Stat
            && event_type.is_clock()
            && (event_type.exclude_user || event_type.exclude_kernel)
        {
            return Err(Error::UnsupportedModifier {
                event: event_type.event_type.name,
                modifier: event_type.modifier,
            });
        }
        Ok(event_type)
    }

    pub fn add_monitored_processes<I>(&mut self, pids: I)
    where
        I: IntoIterator<Item = i32>,
    {
        self.processes.extend(pids);
    }

    pub fn add_monitored_threads<I>(&mut self, tids: I)
    where
        I: IntoIterator<Item = i32>,
    {
        self.threads.extend(tids);
    }

    pub fn monitored_processes(&self) -> &BTreeSet<i32> {
        &self.processes
    }

    pub fn monitored_threads(&self) -> &BTreeSet<i32> {
        &self.threads
    }

    /// Without targets, event files count every thread of the cpu they are opened on.
    pub fn has_monitored_target(&self) -> bool {
        !self.processes.is_empty() || !self.threads.is_empty()
    }

    // modifiers:

    fn check_not_opened(&self) -> Result<()> {
        match self.opened {
            Some(_) => Err(Error::AlreadyOpened),
            None => Ok(()),
        }
    }

    fn check_opened(&self) -> Result<CpuScope> {
        self.opened.ok_or(Error::NotOpened)
    }

    fn for_each_attr<F>(&mut self, f: F) -> Result<()>
    where
        F: FnMut(&mut Attr),
    {
        self.check_not_opened()?;
        self.selections.iter_mut().map(|it| &mut it.attr).for_each(f);
        Ok(())
    }

    fn attr_of(&mut self, id: SelectionId) -> Result<&mut Attr> {
        self.check_not_opened()?;
        self.selections
            .get_mut(id as usize)
            .map(|it| &mut it.attr)
            .ok_or(Error::UnknownSelection(id))
    }

    /// Starts event files disabled and lets the kernel enable them when the
    /// monitored process calls `execve`.
    pub fn set_enable_on_exec(&mut self, enable: bool) -> Result<()> {
        self.for_each_attr(|attr| {
            attr.set_flag(b::PERF_ATTR_FLAG_ENABLE_ON_EXEC, enable);
            attr.set_flag(b::PERF_ATTR_FLAG_DISABLED, enable);
        })
    }

    pub fn enable_on_exec(&self) -> bool {
        !self.selections.is_empty()
            && self
                .selections
                .iter()
                .all(|it| it.attr.flag(b::PERF_ATTR_FLAG_ENABLE_ON_EXEC))
    }

    /// Appends the `sample_id` trailer to non-sample records.
    pub fn sample_id_all(&mut self) -> Result<()> {
        self.for_each_attr(|attr| attr.set_flag(b::PERF_ATTR_FLAG_SAMPLE_ID_ALL, true))
    }

    pub fn set_sample_freq(&mut self, id: SelectionId, freq: u64) -> Result<()> {
        let attr = self.attr_of(id)?;
        attr.set_flag(b::PERF_ATTR_FLAG_FREQ, true);
        attr.sample_period_or_freq = freq;
        Ok(())
    }

    pub fn set_sample_period(&mut self, id: SelectionId, period: u64) -> Result<()> {
        let attr = self.attr_of(id)?;
        attr.set_flag(b::PERF_ATTR_FLAG_FREQ, false);
        attr.sample_period_or_freq = period;
        Ok(())
    }

    /// Records taken branches with every sample. A zero mask leaves the set unchanged.
    pub fn set_branch_sampling(&mut self, branch_sample_type: u64) -> Result<()> {
        self.check_not_opened()?;
        if branch_sample_type == 0 {
            return Ok(());
        }
        let kinds = b::PERF_SAMPLE_BRANCH_ANY
            | b::PERF_SAMPLE_BRANCH_ANY_CALL
            | b::PERF_SAMPLE_BRANCH_ANY_RETURN
            | b::PERF_SAMPLE_BRANCH_IND_CALL;
        if branch_sample_type & kinds == 0 {
            return Err(Error::InvalidBranchSampling(branch_sample_type));
        }
        if !self.kernel.supports(&attr::branch_trial()) {
            return Err(Error::Unsupported("branch stack sampling"));
        }
        self.for_each_attr(|attr| {
            attr.sample_type |= b::PERF_SAMPLE_BRANCH_STACK;
            attr.branch_sample_type = branch_sample_type;
        })
    }

    /// Call chains walked by the kernel through frame pointers.
    pub fn enable_fp_call_chain_sampling(&mut self) -> Result<()> {
        self.for_each_attr(|attr| attr.sample_type |= b::PERF_SAMPLE_CALLCHAIN)
    }

    /// Kernel call chains plus `dump_stack_size` bytes of user stack and the user
    /// registers, for unwinding user frames offline.
    pub fn enable_dwarf_call_chain_sampling(&mut self, dump_stack_size: u32) -> Result<()> {
        self.check_not_opened()?;
        if dump_stack_size == 0 || dump_stack_size % 8 != 0 || dump_stack_size > MAX_DUMP_STACK_SIZE
        {
            return Err(Error::InvalidStackSize(dump_stack_size));
        }
        if !self.kernel.supports(&attr::dwarf_trial()) {
            return Err(Error::Unsupported("dwarf call chain sampling"));
        }
        let regs = attr::dwarf_regs_mask();
        self.for_each_attr(|attr| {
            attr.sample_type |=
                b::PERF_SAMPLE_CALLCHAIN | b::PERF_SAMPLE_REGS_USER | b::PERF_SAMPLE_STACK_USER;
            attr.set_flag(b::PERF_ATTR_FLAG_EXCLUDE_CALLCHAIN_USER, true);
            attr.sample_regs_user = regs;
            attr.sample_stack_user = dump_stack_size;
        })
    }

    /// Lets threads created after open inherit the event files.
    pub fn set_inherit(&mut self, inherit: bool) -> Result<()> {
        self.for_each_attr(|attr| attr.set_flag(b::PERF_ATTR_FLAG_INHERIT, inherit))
    }

    /// Wakes the reader on every record instead of when the buffer fills up.
    pub fn set_low_watermark(&mut self) -> Result<()> {
        self.for_each_attr(|attr| {
            attr.set_flag(b::PERF_ATTR_FLAG_WATERMARK, false);
            attr.wakeup_events_or_watermark = 1;
        })
    }
}
