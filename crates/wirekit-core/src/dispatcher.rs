//! Request dispatch boundary.
//!
//! The core hands a fully received packet to a `Dispatcher`, which decodes
//! the request, runs application logic, and writes the response back into
//! the same packet.
//!
//! **Contract:**
//! - `Err(Retry)` means the packet does not yet hold a whole message. The
//!   packet must be left unconsumed; the connection stays open for more.
//! - `Ok(())` means the packet now holds exactly the encoded response.
//! - Any other error tears the connection down.

use std::sync::Arc;

use crate::error::Result;
use crate::packet::Packet;

pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, packet: &mut dyn Packet) -> Result<()>;
}

pub trait DispatcherFactory: Send + Sync {
    fn build(&self) -> Arc<dyn Dispatcher>;
}
