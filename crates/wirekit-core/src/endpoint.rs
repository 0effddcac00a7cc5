//! Byte endpoint abstraction.
//!
//! An `Endpoint` is anything bytes can be written to and read from one
//! call at a time: a TCP socket, a packet buffer, a test fake.
//!
//! **Contract (both directions):**
//! - A single call attempts one transfer and never loops to block.
//! - `Ok(n)` with `n > 0` is a full or partial transfer.
//! - `Ok(0)` only when the caller passed an empty slice, or when a
//!   buffer-like endpoint has nothing to give.
//! - `Err(Error::Retry)` means "would block": nothing moved, try later.
//! - `Err(Error::PeerClosed)` is end-of-stream, distinct from an I/O error.
//!
//! Callers loop until their requested length is satisfied or a terminal
//! status comes back.

use crate::error::Result;

pub trait Endpoint {
    /// Write up to `src.len()` bytes.
    fn write(&mut self, src: &[u8]) -> Result<usize>;

    /// Read up to `dst.len()` bytes.
    fn read(&mut self, dst: &mut [u8]) -> Result<usize>;
}
