//! Packet abstraction.
//!
//! A `Packet` stages one full request or response in memory before or
//! after the wire transfer. It is itself an [`Endpoint`]: writes append
//! (growing as needed), reads consume from the front.
//!
//! # Implementors
//!
//! - `BytePacket` (default): growable ring buffer with read/write cursors.

use crate::endpoint::Endpoint;
use crate::error::Result;

pub trait Packet: Endpoint + Send {
    /// Pull up to `n` bytes from `src` straight into the packet's storage.
    ///
    /// Grows first so `n` bytes fit. Stops early on a short read. Returns
    /// the byte count moved; `Err(Retry)` only when nothing moved. A hard
    /// error aborts, but bytes already moved stay in the packet.
    fn write_from(&mut self, src: &mut dyn Endpoint, n: usize) -> Result<usize>;

    /// Push up to `n` unread bytes into `dst`. Same partial/retry rules as
    /// [`write_from`](Packet::write_from); consumed bytes are not restored.
    fn read_into(&mut self, dst: &mut dyn Endpoint, n: usize) -> Result<usize>;

    /// Copy unread bytes into `dst` without consuming them.
    fn peek(&self, dst: &mut [u8]) -> usize;

    /// Ensure at least `extra` more bytes can be written without reallocating.
    fn expand(&mut self, extra: usize);

    /// Drop all unread data. Storage is kept for reuse.
    fn clear(&mut self);

    fn remaining_data(&self) -> usize;

    fn remaining_space(&self) -> usize;

    fn capacity(&self) -> usize;
}

/// Builds fresh packets for new connections and outbound calls.
pub trait PacketFactory: Send + Sync {
    fn build(&self) -> Box<dyn Packet>;
}
