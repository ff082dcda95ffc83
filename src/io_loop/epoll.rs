use std::collections::HashMap;
use std::fs::File;
use std::io::{Error, ErrorKind, Result};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use super::{IoEventLoop, Ready, Token};
use crate::ffi::syscall::{
    epoll_create1, epoll_ctl, epoll_wait, read, timerfd_create, timerfd_set_interval,
};

const MAX_EVENTS: usize = 64;

enum Source {
    Read(RawFd),
    Timer(File),
}

impl Source {
    fn fd(&self) -> RawFd {
        match self {
            Source::Read(fd) => *fd,
            Source::Timer(timer) => timer.as_raw_fd(),
        }
    }
}

/// [`IoEventLoop`] on a level-triggered epoll instance, with timerfds for periodic events.
///
/// Registered read descriptors are borrowed: they must stay open until deleted.
/// A perf event file reports a hangup once every task it monitored exited.
pub struct Epoll {
    epoll: File,
    next_token: u64,
    sources: HashMap<Token, Source>,
    events: Vec<libc::epoll_event>,
}

impl Epoll {
    pub fn new() -> Result<Self> {
        let epoll = epoll_create1(libc::EPOLL_CLOEXEC)?;
        Ok(Self {
            epoll,
            next_token: 0,
            sources: HashMap::new(),
            events: vec![libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS],
        })
    }

    fn add(&mut self, source: Source) -> Result<Token> {
        let token = Token(self.next_token);
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as _,
            u64: token.0,
        };
        epoll_ctl(&self.epoll, libc::EPOLL_CTL_ADD, source.fd(), &mut event)?;
        self.next_token += 1;
        self.sources.insert(token, source);
        Ok(token)
    }
}

impl IoEventLoop for Epoll {
    fn add_read_event(&mut self, fd: RawFd) -> Result<Token> {
        self.add(Source::Read(fd))
    }

    fn add_periodic_event(&mut self, interval: Duration) -> Result<Token> {
        if interval.is_zero() {
            return Err(Error::new(ErrorKind::InvalidInput, "zero timer interval"));
        }
        let timer = timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_CLOEXEC | libc::TFD_NONBLOCK)?;
        timerfd_set_interval(&timer, interval)?;
        self.add(Source::Timer(timer))
    }

    fn del_event(&mut self, token: Token) -> Result<()> {
        let source = self
            .sources
            .remove(&token)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("unknown {:?}", token)))?;
        // Pre-2.6.9 kernels insist on a non-null event even for deletion.
        let mut event = libc::epoll_event { events: 0, u64: 0 };
        epoll_ctl(&self.epoll, libc::EPOLL_CTL_DEL, source.fd(), &mut event)
    }

    fn wait(&mut self, ready: &mut Vec<Ready>) -> Result<()> {
        let events = match epoll_wait(&self.epoll, &mut self.events, -1) {
            Ok(events) => events,
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        };
        for event in events {
            let token = Token(event.u64);
            let flags = event.events;
            if let Some(Source::Timer(timer)) = self.sources.get(&token) {
                // Expirations accumulate in one counter, a single read clears them.
                let mut buf = [0; 8];
                match read(timer.as_raw_fd(), &mut buf) {
                    Err(e) if e.kind() != ErrorKind::WouldBlock => return Err(e),
                    _ => (),
                }
            }
            ready.push(Ready {
                token,
                hangup: flags & (libc::EPOLLHUP | libc::EPOLLERR) as u32 != 0,
            });
        }
        Ok(())
    }
}
