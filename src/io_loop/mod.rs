//! The readiness loop that drives record reading and hotplug polling.
//!
//! The event selection set only registers descriptors and timers here and reacts
//! to the tokens handed back, so callers can multiplex their own descriptors
//! (a signal fd, the child's exit pipe) on the same loop.

use std::io::Result;
use std::os::fd::RawFd;
use std::time::Duration;

mod epoll;

pub use epoll::Epoll;

/// Identifies one registration on a loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u64);

/// A registration that became ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ready {
    pub token: Token,
    /// The descriptor hung up or failed. It stays ready until deleted.
    pub hangup: bool,
}

impl From<Token> for Ready {
    fn from(token: Token) -> Self {
        Self {
            token,
            hangup: false,
        }
    }
}

/// What the loop does after a handler ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Reacts to ready registrations.
pub trait LoopHandler<L: ?Sized> {
    fn on_ready(&mut self, lp: &mut L, ready: Ready) -> crate::Result<Flow>;
}

pub trait IoEventLoop {
    /// Watches `fd` for readability.
    fn add_read_event(&mut self, fd: RawFd) -> Result<Token>;

    /// Fires every `interval` until deleted.
    fn add_periodic_event(&mut self, interval: Duration) -> Result<Token>;

    fn del_event(&mut self, token: Token) -> Result<()>;

    /// Blocks until at least one registration is ready and appends what became ready.
    ///
    /// Returning without anything is allowed, e.g. when interrupted by a signal.
    fn wait(&mut self, ready: &mut Vec<Ready>) -> Result<()>;

    /// Dispatches ready registrations to `handler` until it asks to exit or fails.
    ///
    /// A handler may delete registrations while a batch is dispatched, so it must
    /// tolerate tokens it no longer knows.
    fn run<H>(&mut self, handler: &mut H) -> crate::Result<()>
    where
        Self: Sized,
        H: LoopHandler<Self>,
    {
        let mut ready = vec![];
        loop {
            ready.clear();
            self.wait(&mut ready)?;
            for &it in &ready {
                if handler.on_ready(self, it)? == Flow::Exit {
                    return Ok(());
                }
            }
        }
    }
}
