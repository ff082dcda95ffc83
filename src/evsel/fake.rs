use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{Error, ErrorKind, Result};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use super::EventSelectionSet;
use crate::count::{CounterHandle, Kernel, PerfCounter};
use crate::ffi::Attr;
use crate::io_loop::{Flow, IoEventLoop, LoopHandler, Ready, Token};
use crate::sample::RecordBuffer;

const FD_BASE: RawFd = 1000;

/// What the fake kernel knows, shared with the test that drives it.
#[derive(Default)]
pub struct State {
    pub online: Vec<i32>,
    /// Nanoseconds since boot, counters advance 10 per tick while open.
    pub clock: u64,
    next_id: u64,
    /// Event files currently open.
    pub live: usize,
    /// `(id, tid, cpu)` of every successful open.
    pub opens: Vec<(u64, i32, i32)>,
    /// `(tid, cpu)` of every closed event file.
    pub closed: Vec<(i32, i32)>,
    /// `(tid, cpu)` of every counter read.
    pub reads: Vec<(i32, i32)>,
    /// Cpus whose counters fail to read with `EIO`.
    pub read_errors: Vec<i32>,
    /// Threads that exited, opening them fails with `ESRCH`.
    pub exited: Vec<i32>,
    /// Cpu unplugged right before the next open.
    pub unplug_on_open: Option<i32>,
    /// Errno returned by every open on a cpu.
    pub open_errors: HashMap<i32, i32>,
    /// The n-th open attempt, counted from 1, fails with `EINVAL`.
    pub fail_nth_open: Option<usize>,
    open_attempts: usize,
    /// Larger buffers fail with `ENOMEM`, 0 for no limit.
    pub max_mmap_pages: usize,
    pub mmap_attempts: Vec<usize>,
    /// `(id, enabled)` of every enable or disable.
    pub toggles: Vec<(u64, bool)>,
    /// `(from id, to id)`.
    pub redirects: Vec<(u64, u64)>,
    /// Bytes waiting in the buffer of a cpu.
    pub pending: HashMap<i32, Vec<u8>>,
    pub supported: bool,
    /// Counters only run half of their enabled time.
    pub multiplex: bool,
    pub attrs: Vec<Attr>,
    pub group_fds: Vec<Option<RawFd>>,
}

#[derive(Clone, Default)]
pub struct FakeKernel(pub Rc<RefCell<State>>);

impl FakeKernel {
    pub fn with_cpus(cpus: &[i32]) -> Self {
        let kernel = Self::default();
        kernel.0.borrow_mut().online = cpus.to_vec();
        kernel.0.borrow_mut().supported = true;
        kernel
    }

    pub fn state(&self) -> std::cell::RefMut<'_, State> {
        self.0.borrow_mut()
    }

    pub fn set(&self, mode: crate::config::Mode) -> EventSelectionSet<FakeKernel> {
        EventSelectionSet::with_kernel(self.clone(), mode)
    }
}

impl Kernel for FakeKernel {
    type Counter = FakeCounter;

    fn open(&mut self, attr: &Attr, tid: i32, cpu: i32, group: Option<&FakeCounter>) -> Result<FakeCounter> {
        let mut state = self.0.borrow_mut();
        state.open_attempts += 1;
        if state.fail_nth_open == Some(state.open_attempts) {
            return Err(Error::from_raw_os_error(libc::EINVAL));
        }
        if let Some(cpu) = state.unplug_on_open.take() {
            state.online.retain(|&it| it != cpu);
        }
        if state.exited.contains(&tid) {
            return Err(Error::from_raw_os_error(libc::ESRCH));
        }
        if let Some(&errno) = state.open_errors.get(&cpu) {
            return Err(Error::from_raw_os_error(errno));
        }
        if cpu != -1 && !state.online.contains(&cpu) {
            return Err(Error::from_raw_os_error(libc::ENODEV));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.live += 1;
        state.opens.push((id, tid, cpu));
        state.attrs.push(*attr);
        state.group_fds.push(group.map(|it| it.raw_fd()));
        Ok(FakeCounter {
            state: self.0.clone(),
            id,
            tid,
            cpu,
            opened_at: state.clock,
        })
    }

    fn online_cpus(&self) -> Result<Vec<i32>> {
        Ok(self.0.borrow().online.clone())
    }

    fn supports(&mut self, _: &Attr) -> bool {
        self.0.borrow().supported
    }
}

pub struct FakeCounter {
    state: Rc<RefCell<State>>,
    id: u64,
    tid: i32,
    cpu: i32,
    opened_at: u64,
}

impl CounterHandle for FakeCounter {
    type Buffer = FakeBuffer;

    fn raw_fd(&self) -> RawFd {
        FD_BASE + self.id as RawFd
    }

    fn id(&self) -> Result<u64> {
        Ok(self.id)
    }

    fn read_counter(&self) -> Result<PerfCounter> {
        let mut state = self.state.borrow_mut();
        state.reads.push((self.tid, self.cpu));
        if state.read_errors.contains(&self.cpu) {
            return Err(Error::from_raw_os_error(libc::EIO));
        }
        let time_enabled = state.clock - self.opened_at;
        let time_running = if state.multiplex {
            time_enabled / 2
        } else {
            time_enabled
        };
        Ok(PerfCounter {
            value: time_running * 10,
            time_enabled,
            time_running,
            id: self.id,
        })
    }

    fn enable(&self) -> Result<()> {
        self.state.borrow_mut().toggles.push((self.id, true));
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        self.state.borrow_mut().toggles.push((self.id, false));
        Ok(())
    }

    fn mmap(&self, pages: usize) -> Result<FakeBuffer> {
        let mut state = self.state.borrow_mut();
        state.mmap_attempts.push(pages);
        if state.max_mmap_pages > 0 && pages > state.max_mmap_pages {
            return Err(Error::from_raw_os_error(libc::ENOMEM));
        }
        Ok(FakeBuffer {
            state: self.state.clone(),
            cpu: self.cpu,
        })
    }

    fn redirect_output(&self, to: &Self) -> Result<()> {
        self.state.borrow_mut().redirects.push((self.id, to.id));
        Ok(())
    }
}

impl Drop for FakeCounter {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.live -= 1;
        state.closed.push((self.tid, self.cpu));
    }
}

pub struct FakeBuffer {
    state: Rc<RefCell<State>>,
    cpu: i32,
}

impl RecordBuffer for FakeBuffer {
    fn drain(&mut self, out: &mut Vec<u8>) -> usize {
        let bytes = self
            .state
            .borrow_mut()
            .pending
            .remove(&self.cpu)
            .unwrap_or_default();
        out.extend_from_slice(&bytes);
        bytes.len()
    }
}

/// Ends [`ManualLoop::run`] once the script is exhausted.
pub const STOP: Token = Token(u64::MAX);

pub enum Step {
    /// Every registration is ready.
    All,
    Ready(Vec<Token>),
    /// The writing side of these registrations is gone.
    HangUp(Vec<Token>),
    /// Runs between two waits, e.g. to unplug a cpu.
    Do(Box<dyn FnOnce()>),
}

/// A loop whose readiness is scripted by the test.
#[derive(Default)]
pub struct ManualLoop {
    next_token: u64,
    pub reads: BTreeMap<Token, RawFd>,
    pub timers: BTreeMap<Token, Duration>,
    pub deleted: Vec<Token>,
    pub script: VecDeque<Step>,
}

impl ManualLoop {
    pub fn then(&mut self, step: Step) -> &mut Self {
        self.script.push_back(step);
        self
    }

    fn token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }
}

impl IoEventLoop for ManualLoop {
    fn add_read_event(&mut self, fd: RawFd) -> Result<Token> {
        let token = self.token();
        self.reads.insert(token, fd);
        Ok(token)
    }

    fn add_periodic_event(&mut self, interval: Duration) -> Result<Token> {
        if interval.is_zero() {
            return Err(Error::new(ErrorKind::InvalidInput, "zero timer interval"));
        }
        let token = self.token();
        self.timers.insert(token, interval);
        Ok(token)
    }

    fn del_event(&mut self, token: Token) -> Result<()> {
        if self.reads.remove(&token).is_none() && self.timers.remove(&token).is_none() {
            return Err(Error::new(ErrorKind::NotFound, format!("unknown {:?}", token)));
        }
        self.deleted.push(token);
        Ok(())
    }

    fn wait(&mut self, ready: &mut Vec<Ready>) -> Result<()> {
        loop {
            match self.script.pop_front() {
                Some(Step::All) => {
                    ready.extend(self.reads.keys().chain(self.timers.keys()).map(|&it| Ready::from(it)));
                    return Ok(());
                }
                Some(Step::Ready(tokens)) => {
                    ready.extend(tokens.into_iter().map(Ready::from));
                    return Ok(());
                }
                Some(Step::HangUp(tokens)) => {
                    ready.extend(tokens.into_iter().map(|token| Ready { token, hangup: true }));
                    return Ok(());
                }
                Some(Step::Do(f)) => f(),
                None => {
                    ready.push(Ready::from(STOP));
                    return Ok(());
                }
            }
        }
    }
}

/// Forwards everything but [`STOP`] to the set.
pub struct Session<'a>(pub &'a mut EventSelectionSet<FakeKernel>);

impl LoopHandler<ManualLoop> for Session<'_> {
    fn on_ready(&mut self, lp: &mut ManualLoop, ready: Ready) -> crate::Result<Flow> {
        if ready.token == STOP {
            return Ok(Flow::Exit);
        }
        self.0.on_ready(lp, ready)
    }
}
