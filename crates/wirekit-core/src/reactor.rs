//! Readiness multiplexer abstraction.
//!
//! A `Reactor` watches many file descriptors on behalf of one I/O thread.
//! Each registration carries an opaque `u64` token that comes back in
//! [`Readiness`] when the descriptor becomes ready; callers map tokens back
//! to their own connection objects.
//!
//! **Contract:**
//! - Registrations are one-shot: after a descriptor is reported, it stays
//!   silent until re-armed with [`modify`](Reactor::modify). This is what
//!   keeps a connection from being handed to two workers at once.
//! - With `edge_triggered` set, a readiness edge is reported once; the
//!   owner must drain until `Retry` or re-arm.
//! - `wait` returning `Ok(0)` is a timeout, not an error.
//! - `Err(ReactorWait)` / `Err(ReactorInit)` are fatal for the owning loop.
//!
//! # Implementors
//!
//! - `EpollReactor` (default, Linux): epoll with `EPOLLONESHOT`.

use std::os::unix::io::RawFd;
use std::sync::Arc;

use crate::error::Result;

/// What a registration waits for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interest {
    pub recv: bool,
    pub send: bool,
}

impl Interest {
    pub const NONE: Self = Self { recv: false, send: false };
    pub const RECV: Self = Self { recv: true, send: false };
    pub const SEND: Self = Self { recv: false, send: true };

    #[inline]
    pub fn is_none(&self) -> bool {
        !self.recv && !self.send
    }
}

/// One ready registration, as reported by [`Reactor::wait`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub token: u64,
    pub readable: bool,
    pub writable: bool,
    /// Peer hung up or half-closed (RDHUP/HUP)
    pub hangup: bool,
    pub error: bool,
}

pub trait Reactor: Send + Sync {
    /// Register `fd` with the given interest.
    fn add(&self, fd: RawFd, token: u64, interest: Interest) -> Result<()>;

    /// Change the interest of a registered `fd`, re-arming it.
    fn modify(&self, fd: RawFd, token: u64, interest: Interest) -> Result<()>;

    /// Deregister `fd`.
    fn delete(&self, fd: RawFd) -> Result<()>;

    /// Block up to the configured timeout; append ready entries to `ready`.
    ///
    /// Returns the number appended.
    fn wait(&self, ready: &mut Vec<Readiness>) -> Result<usize>;
}

pub trait ReactorFactory: Send + Sync {
    fn build(&self) -> Result<Arc<dyn Reactor>>;
}
