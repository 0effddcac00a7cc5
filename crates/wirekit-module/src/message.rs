//! Dispatcher wire message.
//!
//! ```text
//! [method_id: u32][message_length: u32][trace_id: 32 bytes, NUL-padded][payload]
//! ```
//!
//! All integers big-endian. The message sits inside one adapter frame, so
//! a packet handed to the dispatcher normally holds exactly one message.

use uuid::Uuid;

use wirekit_core::error::{Error, Result};
use wirekit_core::packet::Packet;

/// Width of the trace id field.
pub const TRACE_ID_LEN: usize = 32;

/// Fixed bytes ahead of the payload.
pub const META_LEN: usize = 4 + 4 + TRACE_ID_LEN;

/// Fresh trace id: a v4 UUID as 32 lowercase hex digits.
pub fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub method_id: u32,
    /// At most 32 bytes; shorter ids are NUL-padded on the wire
    pub trace_id: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(method_id: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            method_id,
            trace_id: String::new(),
            payload: payload.into(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Append the encoded message to `packet`.
    pub fn encode_into(&self, packet: &mut dyn Packet) -> Result<()> {
        let trace = self.trace_id.as_bytes();
        if trace.len() > TRACE_ID_LEN {
            return Err(Error::Malformed(format!(
                "trace id is {} bytes, limit {TRACE_ID_LEN}",
                trace.len()
            )));
        }
        let len = u32::try_from(self.payload.len())
            .map_err(|_| Error::Malformed(format!("payload of {} bytes too large", self.payload.len())))?;

        let mut meta = [0u8; META_LEN];
        meta[..4].copy_from_slice(&self.method_id.to_be_bytes());
        meta[4..8].copy_from_slice(&len.to_be_bytes());
        meta[8..8 + trace.len()].copy_from_slice(trace);

        packet.expand(META_LEN + self.payload.len());
        packet.write(&meta)?;
        packet.write(&self.payload)?;
        Ok(())
    }

    /// Decode one message from the front of `packet`.
    ///
    /// `Retry` if the packet does not yet hold the whole message; nothing
    /// is consumed in that case.
    pub fn decode_from(packet: &mut dyn Packet) -> Result<Message> {
        if packet.remaining_data() < META_LEN {
            return Err(Error::Retry);
        }
        let mut meta = [0u8; META_LEN];
        packet.peek(&mut meta);

        let mut word = [0u8; 4];
        word.copy_from_slice(&meta[..4]);
        let method_id = u32::from_be_bytes(word);
        word.copy_from_slice(&meta[4..8]);
        let len = u32::from_be_bytes(word) as usize;

        if packet.remaining_data() < META_LEN + len {
            return Err(Error::Retry);
        }

        let trace = &meta[8..];
        let end = trace.iter().position(|&b| b == 0).unwrap_or(TRACE_ID_LEN);
        let trace_id = std::str::from_utf8(&trace[..end])
            .map_err(|_| Error::Malformed("trace id is not utf-8".into()))?
            .to_string();

        let mut skip = [0u8; META_LEN];
        packet.read(&mut skip)?;
        let mut payload = vec![0u8; len];
        let n = packet.read(&mut payload)?;
        if n != len {
            return Err(Error::Malformed(format!("payload short: {n} of {len} bytes")));
        }

        Ok(Message {
            method_id,
            trace_id,
            payload,
        })
    }
}
