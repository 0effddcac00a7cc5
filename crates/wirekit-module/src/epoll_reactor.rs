//! `EpollReactor` — default `Reactor` on Linux.
//!
//! Every registration is `EPOLLONESHOT | EPOLLRDHUP`, plus `EPOLLET` when
//! edge-triggered mode is on. A descriptor that fired stays disarmed until
//! the owner calls `modify`, which is how a connection is kept out of the
//! worker pool while a task for it is still running.

use std::os::unix::io::{BorrowedFd, RawFd};
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags};
use parking_lot::Mutex;
use tracing::debug;

use wirekit_core::config::ServerConfig;
use wirekit_core::error::{Error, Result};
use wirekit_core::reactor::{Interest, Reactor, ReactorFactory, Readiness};

pub struct EpollReactor {
    epoll: Epoll,
    /// Reused across waits; one waiter per reactor in practice
    events: Mutex<Vec<EpollEvent>>,
    timeout_ms: u16,
    edge_triggered: bool,
}

fn ctl_err(op: &'static str) -> impl Fn(Errno) -> Error {
    move |e| Error::Io {
        op,
        source: std::io::Error::from(e),
    }
}

impl EpollReactor {
    pub fn new(max_events: usize, timeout_ms: u16, edge_triggered: bool) -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|e| Error::ReactorInit(std::io::Error::from(e)))?;
        Ok(Self {
            epoll,
            events: Mutex::new(vec![EpollEvent::empty(); max_events.max(1)]),
            timeout_ms,
            edge_triggered,
        })
    }

    fn flags(&self, interest: Interest) -> EpollFlags {
        let mut flags = EpollFlags::EPOLLONESHOT | EpollFlags::EPOLLRDHUP;
        if self.edge_triggered {
            flags |= EpollFlags::EPOLLET;
        }
        if interest.recv {
            flags |= EpollFlags::EPOLLIN;
        }
        if interest.send {
            flags |= EpollFlags::EPOLLOUT;
        }
        flags
    }
}

impl Reactor for EpollReactor {
    fn add(&self, fd: RawFd, token: u64, interest: Interest) -> Result<()> {
        let fd = unsafe { BorrowedFd::borrow_raw(fd) };
        self.epoll
            .add(fd, EpollEvent::new(self.flags(interest), token))
            .map_err(ctl_err("epoll_ctl(ADD)"))
    }

    fn modify(&self, fd: RawFd, token: u64, interest: Interest) -> Result<()> {
        let fd = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut event = EpollEvent::new(self.flags(interest), token);
        self.epoll
            .modify(fd, &mut event)
            .map_err(ctl_err("epoll_ctl(MOD)"))
    }

    fn delete(&self, fd: RawFd) -> Result<()> {
        let fd = unsafe { BorrowedFd::borrow_raw(fd) };
        self.epoll.delete(fd).map_err(ctl_err("epoll_ctl(DEL)"))
    }

    fn wait(&self, ready: &mut Vec<Readiness>) -> Result<usize> {
        let mut events = self.events.lock();
        let n = match self.epoll.wait(events.as_mut_slice(), self.timeout_ms) {
            Ok(n) => n,
            Err(Errno::EINTR) => return Ok(0),
            Err(e) => return Err(Error::ReactorWait(std::io::Error::from(e))),
        };
        for ev in &events[..n] {
            let flags = ev.events();
            ready.push(Readiness {
                token: ev.data(),
                readable: flags.contains(EpollFlags::EPOLLIN),
                writable: flags.contains(EpollFlags::EPOLLOUT),
                hangup: flags.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLRDHUP),
                error: flags.contains(EpollFlags::EPOLLERR),
            });
        }
        Ok(n)
    }
}

/// Builds one `EpollReactor` per I/O thread.
#[derive(Debug, Clone)]
pub struct EpollReactorFactory {
    max_events: usize,
    timeout_ms: u16,
    edge_triggered: bool,
}

impl EpollReactorFactory {
    pub fn new(max_events: usize, timeout_ms: u16, edge_triggered: bool) -> Self {
        Self {
            max_events,
            timeout_ms,
            edge_triggered,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.epoll_max_events,
            config.epoll_timeout_ms,
            config.edge_triggered,
        )
    }
}

impl ReactorFactory for EpollReactorFactory {
    fn build(&self) -> Result<Arc<dyn Reactor>> {
        let reactor = EpollReactor::new(self.max_events, self.timeout_ms, self.edge_triggered)?;
        debug!(
            max_events = self.max_events,
            timeout_ms = self.timeout_ms,
            edge_triggered = self.edge_triggered,
            "epoll reactor created"
        );
        Ok(Arc::new(reactor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::io::Write;

    #[test]
    fn test_timeout_returns_zero() {
        let reactor = EpollReactor::new(8, 1, true).unwrap();
        let mut ready = Vec::new();
        assert_eq!(reactor.wait(&mut ready).unwrap(), 0);
        assert!(ready.is_empty());
    }

    #[test]
    fn test_readable_reported_once_until_rearmed() {
        let reactor = EpollReactor::new(8, 10, false).unwrap();
        let (mut a, b) = UnixStream::pair().unwrap();
        reactor.add(b.as_raw_fd(), 42, Interest::RECV).unwrap();

        a.write_all(b"x").unwrap();
        let mut ready = Vec::new();
        assert_eq!(reactor.wait(&mut ready).unwrap(), 1);
        assert_eq!(ready[0].token, 42);
        assert!(ready[0].readable);
        assert!(!ready[0].writable);

        // one-shot: still readable, but disarmed
        ready.clear();
        assert_eq!(reactor.wait(&mut ready).unwrap(), 0);

        reactor.modify(b.as_raw_fd(), 43, Interest::RECV).unwrap();
        assert_eq!(reactor.wait(&mut ready).unwrap(), 1);
        assert_eq!(ready[0].token, 43);
    }

    #[test]
    fn test_send_interest_and_delete() {
        let reactor = EpollReactor::new(8, 10, true).unwrap();
        let (_a, b) = UnixStream::pair().unwrap();
        reactor.add(b.as_raw_fd(), 7, Interest::SEND).unwrap();

        let mut ready = Vec::new();
        assert_eq!(reactor.wait(&mut ready).unwrap(), 1);
        assert!(ready[0].writable);

        reactor.delete(b.as_raw_fd()).unwrap();
        assert!(reactor.modify(b.as_raw_fd(), 7, Interest::SEND).is_err());
    }

    #[test]
    fn test_hangup_reported() {
        let reactor = EpollReactor::new(8, 10, true).unwrap();
        let (a, b) = UnixStream::pair().unwrap();
        reactor.add(b.as_raw_fd(), 1, Interest::RECV).unwrap();
        drop(a);

        let mut ready = Vec::new();
        assert_eq!(reactor.wait(&mut ready).unwrap(), 1);
        assert!(ready[0].hangup);
    }

    #[test]
    fn test_factory_from_config() {
        let config = ServerConfig::new().epoll_max_events(4).epoll_timeout_ms(1);
        let reactor = EpollReactorFactory::from_config(&config).build().unwrap();
        let mut ready = Vec::new();
        assert_eq!(reactor.wait(&mut ready).unwrap(), 0);
    }
}
