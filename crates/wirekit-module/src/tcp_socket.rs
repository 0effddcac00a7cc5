//! `TcpSocket` — IPv4 TCP endpoint over raw libc sockets.
//!
//! The socket is `disconnected` until `connect`, `listen` or `accept`
//! produces a live descriptor, and goes back to `disconnected` on
//! [`close`](TcpSocket::close). Each `read`/`write` is exactly one OS call,
//! classified as: bytes moved, `Retry` (EAGAIN/EWOULDBLOCK/EINTR),
//! `PeerClosed` (zero-byte read, EPIPE, ECONNRESET), or a hard `Io` error.

use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::RawFd;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tracing::{debug, error};

use wirekit_core::endpoint::Endpoint;
use wirekit_core::error::{Error, Result};

/// Listen backlog used by [`TcpSocket::listen`].
pub const LISTEN_BACKLOG: i32 = 1024;

pub struct TcpSocket {
    fd: RawFd,
    peer: Option<SocketAddrV4>,
}

#[inline]
fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[inline]
fn would_block(err: i32) -> bool {
    err == libc::EAGAIN || err == libc::EWOULDBLOCK || err == libc::EINTR
}

fn nix_err(op: &'static str) -> impl Fn(nix::Error) -> Error {
    move |e| Error::Io {
        op,
        source: std::io::Error::from(e),
    }
}

fn parse_ipv4(ip: &str) -> Result<Ipv4Addr> {
    ip.parse::<Ipv4Addr>()
        .map_err(|_| Error::InvalidAddress(ip.to_string()))
}

fn sockaddr(addr: Ipv4Addr, port: u16) -> libc::sockaddr_in {
    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    sa.sin_family = libc::AF_INET as libc::sa_family_t;
    sa.sin_port = port.to_be();
    sa.sin_addr.s_addr = u32::from(addr).to_be();
    sa
}

fn from_sockaddr(sa: &libc::sockaddr_in) -> SocketAddrV4 {
    SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(sa.sin_addr.s_addr)),
        u16::from_be(sa.sin_port),
    )
}

fn setsockopt<T>(fd: RawFd, level: i32, name: i32, value: &T, op: &'static str) -> Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value as *const T as *const libc::c_void,
            mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(Error::last_os(op));
    }
    Ok(())
}

fn new_stream_fd() -> Result<RawFd> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(Error::last_os("socket"));
    }
    Ok(fd)
}

impl TcpSocket {
    /// A disconnected socket.
    pub fn new() -> Self {
        Self { fd: -1, peer: None }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.fd >= 0
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Remote address, when connected through `connect` or `accept`.
    pub fn peer(&self) -> Option<SocketAddrV4> {
        self.peer
    }

    /// Blocking connect to `ip:port`.
    pub fn connect(&mut self, ip: &str, port: u16) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }
        let addr = parse_ipv4(ip)?;
        let fd = new_stream_fd()?;
        let sa = sockaddr(addr, port);
        let ret = unsafe {
            libc::connect(
                fd,
                &sa as *const _ as *const libc::sockaddr,
                mem::size_of_val(&sa) as libc::socklen_t,
            )
        };
        if ret != 0 {
            let err = Error::last_os("connect");
            unsafe { libc::close(fd) };
            return Err(err);
        }
        let one: i32 = 1;
        let _ = setsockopt(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, &one, "setsockopt(TCP_NODELAY)");

        self.fd = fd;
        self.peer = Some(SocketAddrV4::new(addr, port));
        Ok(())
    }

    /// Bind `ip:port` with SO_REUSEADDR and start listening.
    ///
    /// Port 0 binds an ephemeral port; see [`local_port`](Self::local_port).
    pub fn listen(&mut self, ip: &str, port: u16) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }
        let addr = parse_ipv4(ip)?;
        let fd = new_stream_fd()?;
        let bound = (|| {
            let one: i32 = 1;
            setsockopt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, &one, "setsockopt(SO_REUSEADDR)")?;
            let sa = sockaddr(addr, port);
            let ret = unsafe {
                libc::bind(
                    fd,
                    &sa as *const _ as *const libc::sockaddr,
                    mem::size_of_val(&sa) as libc::socklen_t,
                )
            };
            if ret != 0 {
                return Err(Error::last_os("bind"));
            }
            if unsafe { libc::listen(fd, LISTEN_BACKLOG) } != 0 {
                return Err(Error::last_os("listen"));
            }
            Ok(())
        })();
        if let Err(e) = bound {
            unsafe { libc::close(fd) };
            return Err(e);
        }
        self.fd = fd;
        self.peer = None;
        Ok(())
    }

    /// Accept one pending connection.
    ///
    /// `Retry` when nothing is pending (non-blocking listener) or the call
    /// was interrupted; no state changes in that case.
    pub fn accept(&self) -> Result<TcpSocket> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let fd = unsafe {
            libc::accept4(
                self.fd,
                &mut sa as *mut _ as *mut libc::sockaddr,
                &mut len,
                libc::SOCK_CLOEXEC,
            )
        };
        if fd < 0 {
            let err = errno();
            if would_block(err) {
                return Err(Error::Retry);
            }
            return Err(Error::Io {
                op: "accept",
                source: std::io::Error::from_raw_os_error(err),
            });
        }
        let one: i32 = 1;
        let _ = setsockopt(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, &one, "setsockopt(TCP_NODELAY)");
        Ok(TcpSocket {
            fd,
            peer: Some(from_sockaddr(&sa)),
        })
    }

    /// Close the descriptor. `Disconnected` if already closed.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let fd = mem::replace(&mut self.fd, -1);
        self.peer = None;
        if unsafe { libc::close(fd) } != 0 {
            return Err(Error::last_os("close"));
        }
        Ok(())
    }

    pub fn set_non_block(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let bits = fcntl(self.fd, FcntlArg::F_GETFL).map_err(nix_err("fcntl(F_GETFL)"))?;
        let mut flags = OFlag::from_bits_truncate(bits);
        flags.insert(OFlag::O_NONBLOCK);
        fcntl(self.fd, FcntlArg::F_SETFL(flags)).map_err(nix_err("fcntl(F_SETFL)"))?;
        Ok(())
    }

    /// SO_RCVTIMEO and SO_SNDTIMEO, plus SO_LINGER for `secs`.
    pub fn set_timeout(&self, secs: u32, usecs: u32) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let tv = libc::timeval {
            tv_sec: secs as libc::time_t,
            tv_usec: usecs as libc::suseconds_t,
        };
        setsockopt(self.fd, libc::SOL_SOCKET, libc::SO_RCVTIMEO, &tv, "setsockopt(SO_RCVTIMEO)")?;
        setsockopt(self.fd, libc::SOL_SOCKET, libc::SO_SNDTIMEO, &tv, "setsockopt(SO_SNDTIMEO)")?;
        self.set_linger(true, secs)
    }

    pub fn set_linger(&self, on: bool, secs: u32) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let linger = libc::linger {
            l_onoff: on as libc::c_int,
            l_linger: secs as libc::c_int,
        };
        setsockopt(self.fd, libc::SOL_SOCKET, libc::SO_LINGER, &linger, "setsockopt(SO_LINGER)")
    }

    /// Locally bound port (useful after listening on port 0).
    pub fn local_port(&self) -> Result<u16> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockname(self.fd, &mut sa as *mut _ as *mut libc::sockaddr, &mut len)
        };
        if ret != 0 {
            return Err(Error::last_os("getsockname"));
        }
        Ok(u16::from_be(sa.sin_port))
    }

    fn classify(&self, ret: isize, op: &'static str) -> Result<usize> {
        if ret > 0 {
            return Ok(ret as usize);
        }
        if ret == 0 {
            debug!(fd = self.fd, peer = ?self.peer, "{op}: peer closed");
            return Err(Error::PeerClosed);
        }
        let err = errno();
        if would_block(err) {
            return Err(Error::Retry);
        }
        if err == libc::EPIPE || err == libc::ECONNRESET {
            debug!(fd = self.fd, peer = ?self.peer, errno = err, "{op}: connection reset");
            return Err(Error::PeerClosed);
        }
        let source = std::io::Error::from_raw_os_error(err);
        error!(fd = self.fd, peer = ?self.peer, error = %source, "{op} failed");
        Err(Error::Io { op, source })
    }
}

impl Default for TcpSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TcpSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSocket")
            .field("fd", &self.fd)
            .field("peer", &self.peer)
            .finish()
    }
}

impl Endpoint for TcpSocket {
    fn write(&mut self, src: &[u8]) -> Result<usize> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        if src.is_empty() {
            return Ok(0);
        }
        let ret = unsafe {
            libc::send(
                self.fd,
                src.as_ptr() as *const libc::c_void,
                src.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        self.classify(ret, "send")
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        if dst.is_empty() {
            return Ok(0);
        }
        let ret = unsafe { libc::recv(self.fd, dst.as_mut_ptr() as *mut libc::c_void, dst.len(), 0) };
        self.classify(ret, "recv")
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        if self.is_connected() {
            unsafe { libc::close(self.fd) };
        }
    }
}
