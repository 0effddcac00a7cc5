//! Wirekit error types.
//!
//! Every fallible operation in the workspace returns [`Result`]. The
//! variants are grouped into the coarse [`ErrorKind`] taxonomy that the
//! connection state machine uses to decide between retrying, logging
//! quietly, and tearing a connection down.

use std::fmt;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Would block or message incomplete. Re-invoke later.
    Transient,
    /// The remote end closed the stream.
    PeerClosed,
    /// Malformed header, bad version, undecodable message.
    Protocol,
    /// A bounded resource is exhausted (queue full, connection cap).
    ResourceExhausted,
    /// OS-level socket failure.
    Io,
    /// The multiplexer itself failed. The owning loop must exit.
    Fatal,
    /// The worker pool was stopped.
    Stopped,
    /// Application dispatch, routing, or configuration failure.
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation would block (EAGAIN/EWOULDBLOCK) or needs more data.
    #[error("operation would block, retry later")]
    Retry,

    /// Zero-byte transfer: the peer closed its half of the connection.
    #[error("peer closed the connection")]
    PeerClosed,

    /// Socket is not connected.
    #[error("socket disconnected")]
    Disconnected,

    /// `connect`/`listen` on a socket that is still open.
    #[error("socket already connected")]
    AlreadyConnected,

    /// Address could not be parsed as an IPv4 dotted quad.
    #[error("invalid address {0}")]
    InvalidAddress(String),

    /// OS call failed.
    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Frame header carried an unexpected protocol version.
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// Message bytes could not be decoded.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Bounded queue has no free slot.
    #[error("queue is full")]
    QueueFull,

    /// Server connection cap reached.
    #[error("max connections reached ({0})")]
    MaxConnections(usize),

    /// Worker pool is stopped; no further submissions are accepted.
    #[error("worker pool stopped")]
    PoolStopped,

    /// Multiplexer creation failed.
    #[error("reactor init failed: {0}")]
    ReactorInit(#[source] std::io::Error),

    /// Multiplexer wait failed for a reason other than EINTR.
    #[error("reactor wait failed: {0}")]
    ReactorWait(#[source] std::io::Error),

    /// Application-level dispatch failure.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Client-side route resolution failed.
    #[error("route failed: {0}")]
    Route(String),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Config(&'static str),
}

impl Error {
    /// Build an `Io` error from the calling thread's errno.
    pub fn last_os(op: &'static str) -> Self {
        Error::Io {
            op,
            source: std::io::Error::last_os_error(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Retry => ErrorKind::Transient,
            Error::PeerClosed => ErrorKind::PeerClosed,
            Error::VersionMismatch { .. } | Error::Malformed(_) => ErrorKind::Protocol,
            Error::QueueFull | Error::MaxConnections(_) => ErrorKind::ResourceExhausted,
            Error::Disconnected
            | Error::AlreadyConnected
            | Error::InvalidAddress(_)
            | Error::Io { .. } => ErrorKind::Io,
            Error::ReactorInit(_) | Error::ReactorWait(_) => ErrorKind::Fatal,
            Error::PoolStopped => ErrorKind::Stopped,
            Error::Dispatch(_) | Error::Route(_) | Error::Config(_) => ErrorKind::Other,
        }
    }

    #[inline]
    pub fn is_retry(&self) -> bool {
        matches!(self, Error::Retry)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returned by [`BoundedQueue::push`](crate::queue::BoundedQueue::push) when
/// every slot is taken. Hands the rejected value back to the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct QueueFull<T>(pub T);

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueFull(..)")
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T> std::error::Error for QueueFull<T> {}

impl<T> From<QueueFull<T>> for Error {
    fn from(_: QueueFull<T>) -> Self {
        Error::QueueFull
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::VersionMismatch { expected: 1, actual: 7 };
        assert_eq!(
            format!("{}", e),
            "protocol version mismatch: expected 1, got 7"
        );
        assert_eq!(format!("{}", Error::PoolStopped), "worker pool stopped");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::Retry.kind(), ErrorKind::Transient);
        assert!(Error::Retry.is_retry());
        assert!(!Error::PeerClosed.is_retry());
        assert_eq!(Error::PeerClosed.kind(), ErrorKind::PeerClosed);
        assert_eq!(Error::Malformed("x".into()).kind(), ErrorKind::Protocol);
        assert_eq!(Error::MaxConnections(1).kind(), ErrorKind::ResourceExhausted);
        assert_eq!(Error::last_os("read").kind(), ErrorKind::Io);
        let fatal = Error::ReactorWait(std::io::Error::from_raw_os_error(9));
        assert_eq!(fatal.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_queue_full_conversion() {
        let full = QueueFull(5u32);
        assert_eq!(full.0, 5);
        let e: Error = full.into();
        assert!(matches!(e, Error::QueueFull));
    }
}
