//! Server and client configuration.
//!
//! Compile-time defaults live in [`defaults`]; `from_env()` applies any
//! `WIREKIT_*` overrides on top, and the builder setters win over both.
//!
//! ```rust,ignore
//! use wirekit_core::config::ServerConfig;
//!
//! let config = ServerConfig::from_env()
//!     .port(9000)
//!     .io_thread_num(2)
//!     .max_connection(512);
//! config.validate()?;
//! ```

pub mod defaults;

use std::time::Duration;

use crate::env::{env_get, env_get_bool, env_get_str};
use crate::error::{Error, Result};

/// Server-side settings consumed by the connection server at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (IPv4 dotted quad)
    pub ip: String,
    /// Listen port. 0 asks the kernel for an ephemeral port.
    pub port: u16,
    /// SO_RCVTIMEO / SO_SNDTIMEO / SO_LINGER for accepted sockets
    pub sock_timeout_sec: u32,
    /// Upper bound on readiness events returned by one wait
    pub epoll_max_events: usize,
    /// Wait timeout, so I/O loops observe shutdown promptly
    pub epoll_timeout_ms: u16,
    /// Register connections edge-triggered
    pub edge_triggered: bool,
    /// Reactor (I/O) threads
    pub io_thread_num: usize,
    /// Worker pool threads
    pub worker_thread_num: usize,
    /// Worker pool queue capacity
    pub worker_queue_size: usize,
    /// Cap on allocated connection events
    pub max_connection: usize,
    /// Largest inbound frame body accepted, in bytes
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Library defaults, no environment lookup.
    pub fn new() -> Self {
        Self {
            ip: defaults::IP.to_string(),
            port: defaults::PORT,
            sock_timeout_sec: defaults::SOCK_TIMEOUT_SEC,
            epoll_max_events: defaults::EPOLL_MAX_EVENTS,
            epoll_timeout_ms: defaults::EPOLL_TIMEOUT_MS,
            edge_triggered: defaults::EDGE_TRIGGERED,
            io_thread_num: defaults::IO_THREAD_NUM,
            worker_thread_num: defaults::WORKER_THREAD_NUM,
            worker_queue_size: defaults::WORKER_QUEUE_SIZE,
            max_connection: defaults::MAX_CONNECTION,
            max_frame_len: defaults::MAX_FRAME_LEN,
        }
    }

    /// Defaults with environment overrides.
    ///
    /// - `WIREKIT_IP`, `WIREKIT_PORT`
    /// - `WIREKIT_SOCK_TIMEOUT_SEC`
    /// - `WIREKIT_EPOLL_MAX_EVENTS`, `WIREKIT_EPOLL_TIMEOUT_MS`
    /// - `WIREKIT_EDGE_TRIGGERED` (0/1)
    /// - `WIREKIT_IO_THREAD_NUM`, `WIREKIT_WORKER_THREAD_NUM`
    /// - `WIREKIT_WORKER_QUEUE_SIZE`, `WIREKIT_MAX_CONNECTION`
    /// - `WIREKIT_MAX_FRAME_LEN`
    pub fn from_env() -> Self {
        Self {
            ip: env_get_str("WIREKIT_IP", defaults::IP),
            port: env_get("WIREKIT_PORT", defaults::PORT),
            sock_timeout_sec: env_get("WIREKIT_SOCK_TIMEOUT_SEC", defaults::SOCK_TIMEOUT_SEC),
            epoll_max_events: env_get("WIREKIT_EPOLL_MAX_EVENTS", defaults::EPOLL_MAX_EVENTS),
            epoll_timeout_ms: env_get("WIREKIT_EPOLL_TIMEOUT_MS", defaults::EPOLL_TIMEOUT_MS),
            edge_triggered: env_get_bool("WIREKIT_EDGE_TRIGGERED", defaults::EDGE_TRIGGERED),
            io_thread_num: env_get("WIREKIT_IO_THREAD_NUM", defaults::IO_THREAD_NUM),
            worker_thread_num: env_get("WIREKIT_WORKER_THREAD_NUM", defaults::WORKER_THREAD_NUM),
            worker_queue_size: env_get("WIREKIT_WORKER_QUEUE_SIZE", defaults::WORKER_QUEUE_SIZE),
            max_connection: env_get("WIREKIT_MAX_CONNECTION", defaults::MAX_CONNECTION),
            max_frame_len: env_get("WIREKIT_MAX_FRAME_LEN", defaults::MAX_FRAME_LEN),
        }
    }

    // Builder methods

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn sock_timeout_sec(mut self, secs: u32) -> Self {
        self.sock_timeout_sec = secs;
        self
    }

    pub fn epoll_max_events(mut self, n: usize) -> Self {
        self.epoll_max_events = n;
        self
    }

    pub fn epoll_timeout_ms(mut self, ms: u16) -> Self {
        self.epoll_timeout_ms = ms;
        self
    }

    pub fn edge_triggered(mut self, enable: bool) -> Self {
        self.edge_triggered = enable;
        self
    }

    pub fn io_thread_num(mut self, n: usize) -> Self {
        self.io_thread_num = n;
        self
    }

    pub fn worker_thread_num(mut self, n: usize) -> Self {
        self.worker_thread_num = n;
        self
    }

    pub fn worker_queue_size(mut self, n: usize) -> Self {
        self.worker_queue_size = n;
        self
    }

    pub fn max_connection(mut self, n: usize) -> Self {
        self.max_connection = n;
        self
    }

    pub fn max_frame_len(mut self, bytes: usize) -> Self {
        self.max_frame_len = bytes;
        self
    }

    pub fn sock_timeout(&self) -> Duration {
        Duration::from_secs(self.sock_timeout_sec as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ip.parse::<std::net::Ipv4Addr>().is_err() {
            return Err(Error::Config("ip must be an IPv4 address"));
        }
        if self.io_thread_num == 0 {
            return Err(Error::Config("io_thread_num must be > 0"));
        }
        if self.worker_thread_num == 0 {
            return Err(Error::Config("worker_thread_num must be > 0"));
        }
        if self.worker_queue_size == 0 {
            return Err(Error::Config("worker_queue_size must be > 0"));
        }
        if self.max_connection == 0 {
            return Err(Error::Config("max_connection must be > 0"));
        }
        if self.epoll_max_events == 0 {
            return Err(Error::Config("epoll_max_events must be > 0"));
        }
        if self.max_frame_len == 0 || self.max_frame_len > u32::MAX as usize {
            return Err(Error::Config("max_frame_len must be in 1..=u32::MAX"));
        }
        Ok(())
    }
}

/// One upstream server a client may route to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub ip: String,
    pub port: u16,
}

impl Host {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }
}

/// Client-side settings for `TcpChannel`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub hosts: Vec<Host>,
    pub sock_timeout_sec: u32,
    pub sock_timeout_usec: u32,
    /// Attempts per write/read before a `Retry` is surfaced
    pub retry_count: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            hosts: Vec::new(),
            sock_timeout_sec: defaults::SOCK_TIMEOUT_SEC,
            sock_timeout_usec: defaults::SOCK_TIMEOUT_USEC,
            retry_count: defaults::CLIENT_RETRY_COUNT,
        }
    }

    /// Defaults with `WIREKIT_CLIENT_SOCK_TIMEOUT_SEC`,
    /// `WIREKIT_CLIENT_SOCK_TIMEOUT_USEC`, `WIREKIT_CLIENT_RETRY_COUNT`.
    pub fn from_env() -> Self {
        Self {
            hosts: Vec::new(),
            sock_timeout_sec: env_get("WIREKIT_CLIENT_SOCK_TIMEOUT_SEC", defaults::SOCK_TIMEOUT_SEC),
            sock_timeout_usec: env_get(
                "WIREKIT_CLIENT_SOCK_TIMEOUT_USEC",
                defaults::SOCK_TIMEOUT_USEC,
            ),
            retry_count: env_get("WIREKIT_CLIENT_RETRY_COUNT", defaults::CLIENT_RETRY_COUNT),
        }
    }

    pub fn host(mut self, ip: impl Into<String>, port: u16) -> Self {
        self.hosts.push(Host::new(ip, port));
        self
    }

    pub fn sock_timeout(mut self, secs: u32, usecs: u32) -> Self {
        self.sock_timeout_sec = secs;
        self.sock_timeout_usec = usecs;
        self
    }

    pub fn retry_count(mut self, n: usize) -> Self {
        self.retry_count = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::Config("client needs at least one host"));
        }
        if self.retry_count == 0 {
            return Err(Error::Config("retry_count must be > 0"));
        }
        Ok(())
    }
}
