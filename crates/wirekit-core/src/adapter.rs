//! Wire framing abstraction.
//!
//! A `ProtocolAdapter` moves exactly one logical message between a
//! [`Packet`] and a raw [`Endpoint`], adding or stripping a wire header.
//!
//! **Contract:**
//! - Both directions are *resumable*: on `Err(Retry)` the adapter keeps
//!   its progress, and the next call continues where the last stopped.
//!   Already-sent bytes are never re-sent; already-read bytes never re-read.
//! - `Ok(())` means the whole message moved. The adapter then resets
//!   itself, ready for the next message.
//! - Any other error is terminal for the message.
//!
//! # Implementors
//!
//! - `SimpleAdapter` (default): `{version: u32, length: u32}` big-endian header.

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::packet::Packet;

pub trait ProtocolAdapter: Send {
    /// Frame the packet's unread bytes and stream them to `dst`.
    ///
    /// The frame length is captured on the first call of a message.
    fn adapt_to(&mut self, packet: &mut dyn Packet, dst: &mut dyn Endpoint) -> Result<()>;

    /// Read one frame from `src` and append its body to `packet`.
    fn adapt_from(&mut self, src: &mut dyn Endpoint, packet: &mut dyn Packet) -> Result<()>;

    /// Abandon any partially transferred message.
    fn reset(&mut self);

    /// True while a message is part-way through either direction.
    fn in_progress(&self) -> bool;
}

pub trait AdapterFactory: Send + Sync {
    fn build(&self) -> Box<dyn ProtocolAdapter>;
}
