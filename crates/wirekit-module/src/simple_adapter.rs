//! `SimpleAdapter` — default `ProtocolAdapter`.
//!
//! Frames each message with an 8-byte header, both fields big-endian:
//!
//! ```text
//! [version: u32][length: u32][length bytes of body]
//! ```
//!
//! Send and receive progress are tracked separately, so one adapter can
//! serve a connection that alternates between the two. A `Retry` from the
//! endpoint leaves progress intact; the next call resumes mid-header or
//! mid-body.
//!
//! Inbound headers announcing more than `max_frame_len` body bytes are
//! rejected as `Malformed` before anything is allocated for them.

use wirekit_core::adapter::{AdapterFactory, ProtocolAdapter};
use wirekit_core::config::{defaults, ServerConfig};
use wirekit_core::endpoint::Endpoint;
use wirekit_core::error::{Error, Result};
use wirekit_core::packet::Packet;

/// Protocol version carried in every frame header.
pub const VERSION: u32 = 1;

/// Encoded header size in bytes.
pub const HEADER_LEN: usize = 8;

fn encode_header(length: u32) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&VERSION.to_be_bytes());
    header[4..].copy_from_slice(&length.to_be_bytes());
    header
}

/// Progress of one outbound frame.
#[derive(Debug, Default)]
struct SendState {
    header: [u8; HEADER_LEN],
    header_sent: usize,
    /// Body length, fixed on the first call for a message
    body_len: Option<usize>,
    body_sent: usize,
}

/// Progress of one inbound frame.
#[derive(Debug, Default)]
struct RecvState {
    header: [u8; HEADER_LEN],
    header_read: usize,
    body_len: Option<usize>,
    body_read: usize,
}

impl SendState {
    fn idle(&self) -> bool {
        self.body_len.is_none()
    }
}

impl RecvState {
    fn idle(&self) -> bool {
        self.header_read == 0
    }
}

#[derive(Debug)]
pub struct SimpleAdapter {
    send: SendState,
    recv: RecvState,
    max_frame_len: usize,
}

impl Default for SimpleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleAdapter {
    pub fn new() -> Self {
        Self::with_max_frame_len(defaults::MAX_FRAME_LEN)
    }

    /// Adapter that refuses inbound bodies longer than `max_frame_len`.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            send: SendState::default(),
            recv: RecvState::default(),
            max_frame_len,
        }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl ProtocolAdapter for SimpleAdapter {
    fn adapt_to(&mut self, packet: &mut dyn Packet, dst: &mut dyn Endpoint) -> Result<()> {
        let st = &mut self.send;

        let body_len = match st.body_len {
            Some(len) => len,
            None => {
                let len = packet.remaining_data();
                let wire_len = u32::try_from(len)
                    .map_err(|_| Error::Malformed(format!("body of {len} bytes exceeds frame limit")))?;
                st.header = encode_header(wire_len);
                st.header_sent = 0;
                st.body_sent = 0;
                st.body_len = Some(len);
                len
            }
        };

        while st.header_sent < HEADER_LEN {
            match dst.write(&st.header[st.header_sent..])? {
                0 => return Err(Error::Retry),
                n => st.header_sent += n,
            }
        }

        while st.body_sent < body_len {
            match packet.read_into(dst, body_len - st.body_sent)? {
                0 => return Err(Error::Retry),
                n => st.body_sent += n,
            }
        }

        *st = SendState::default();
        Ok(())
    }

    fn adapt_from(&mut self, src: &mut dyn Endpoint, packet: &mut dyn Packet) -> Result<()> {
        let max_frame_len = self.max_frame_len;
        let st = &mut self.recv;

        while st.header_read < HEADER_LEN {
            match src.read(&mut st.header[st.header_read..])? {
                0 => return Err(Error::Retry),
                n => st.header_read += n,
            }
        }

        let body_len = match st.body_len {
            Some(len) => len,
            None => {
                let mut word = [0u8; 4];
                word.copy_from_slice(&st.header[..4]);
                let version = u32::from_be_bytes(word);
                if version != VERSION {
                    *st = RecvState::default();
                    return Err(Error::VersionMismatch {
                        expected: VERSION,
                        actual: version,
                    });
                }
                word.copy_from_slice(&st.header[4..]);
                let len = u32::from_be_bytes(word) as usize;
                if len > max_frame_len {
                    *st = RecvState::default();
                    return Err(Error::Malformed(format!(
                        "frame of {len} bytes exceeds limit of {max_frame_len}"
                    )));
                }
                packet.expand(len);
                st.body_len = Some(len);
                st.body_read = 0;
                len
            }
        };

        while st.body_read < body_len {
            match packet.write_from(src, body_len - st.body_read)? {
                0 => return Err(Error::Retry),
                n => st.body_read += n,
            }
        }

        *st = RecvState::default();
        Ok(())
    }

    fn reset(&mut self) {
        self.send = SendState::default();
        self.recv = RecvState::default();
    }

    fn in_progress(&self) -> bool {
        !self.send.idle() || !self.recv.idle()
    }
}

#[derive(Debug, Clone)]
pub struct SimpleAdapterFactory {
    max_frame_len: usize,
}

impl SimpleAdapterFactory {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.max_frame_len)
    }
}

impl Default for SimpleAdapterFactory {
    fn default() -> Self {
        Self::new(defaults::MAX_FRAME_LEN)
    }
}

impl AdapterFactory for SimpleAdapterFactory {
    fn build(&self) -> Box<dyn ProtocolAdapter> {
        Box::new(SimpleAdapter::with_max_frame_len(self.max_frame_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_packet::BytePacket;
    use std::collections::VecDeque;

    /// Moves exactly one byte per call. With `stutter`, every other call
    /// reports `Retry` instead.
    struct OneByte {
        input: VecDeque<u8>,
        output: Vec<u8>,
        stutter: bool,
        tick: bool,
        reads: usize,
    }

    impl OneByte {
        fn new(input: &[u8], stutter: bool) -> Self {
            Self {
                input: input.iter().copied().collect(),
                output: Vec::new(),
                stutter,
                tick: false,
                reads: 0,
            }
        }

        fn blocked(&mut self) -> bool {
            if !self.stutter {
                return false;
            }
            self.tick = !self.tick;
            self.tick
        }
    }

    impl Endpoint for OneByte {
        fn write(&mut self, src: &[u8]) -> Result<usize> {
            if self.blocked() {
                return Err(Error::Retry);
            }
            self.output.push(src[0]);
            Ok(1)
        }

        fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
            if self.blocked() {
                return Err(Error::Retry);
            }
            match self.input.pop_front() {
                Some(b) => {
                    self.reads += 1;
                    dst[0] = b;
                    Ok(1)
                }
                None => Err(Error::Retry),
            }
        }
    }

    fn frame(version: u32, body: &[u8]) -> Vec<u8> {
        let mut out = version.to_be_bytes().to_vec();
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn packet_with(body: &[u8]) -> BytePacket {
        let mut p = BytePacket::with_capacity(4);
        p.write(body).unwrap();
        p
    }

    fn contents(p: &mut BytePacket) -> Vec<u8> {
        let mut out = vec![0u8; p.remaining_data()];
        p.read(&mut out).unwrap();
        out
    }

    #[test]
    fn test_adapt_to_one_byte_sink() {
        let mut adapter = SimpleAdapter::new();
        let mut packet = packet_with(b"hello");
        let mut dst = OneByte::new(b"", false);

        adapter.adapt_to(&mut packet, &mut dst).unwrap();
        assert_eq!(dst.output, frame(VERSION, b"hello"));
        assert!(!adapter.in_progress());
        assert_eq!(packet.remaining_data(), 0);
    }

    #[test]
    fn test_adapt_to_resumes_after_retry() {
        let mut adapter = SimpleAdapter::new();
        let mut packet = packet_with(b"resumable payload");
        let mut dst = OneByte::new(b"", true);

        let mut retries = 0;
        loop {
            match adapter.adapt_to(&mut packet, &mut dst) {
                Ok(()) => break,
                Err(Error::Retry) => {
                    retries += 1;
                    assert!(adapter.in_progress());
                }
                Err(e) => panic!("unexpected {e}"),
            }
        }
        assert!(retries > 0);
        assert_eq!(dst.output, frame(VERSION, b"resumable payload"));
    }

    #[test]
    fn test_adapt_from_one_byte_source() {
        let wire = frame(VERSION, b"world");
        let mut adapter = SimpleAdapter::new();
        let mut src = OneByte::new(&wire, true);
        let mut packet = BytePacket::with_capacity(2);

        let mut retries = 0;
        loop {
            match adapter.adapt_from(&mut src, &mut packet) {
                Ok(()) => break,
                Err(Error::Retry) => retries += 1,
                Err(e) => panic!("unexpected {e}"),
            }
        }
        assert!(retries > 0);
        assert!(!adapter.in_progress());
        assert_eq!(contents(&mut packet), b"world");
        assert_eq!(src.reads, wire.len());
    }

    #[test]
    fn test_version_mismatch_skips_body() {
        let wire = frame(7, b"body bytes");
        let mut adapter = SimpleAdapter::new();
        let mut src = OneByte::new(&wire, false);
        let mut packet = BytePacket::new();

        match adapter.adapt_from(&mut src, &mut packet) {
            Err(Error::VersionMismatch { expected, actual }) => {
                assert_eq!(expected, VERSION);
                assert_eq!(actual, 7);
            }
            other => panic!("expected version mismatch, got {other:?}"),
        }
        assert_eq!(src.reads, HEADER_LEN);
        assert_eq!(src.input.len(), b"body bytes".len());
        assert_eq!(packet.remaining_data(), 0);
        assert!(!adapter.in_progress());
    }

    #[test]
    fn test_empty_body() {
        let mut adapter = SimpleAdapter::new();
        let mut packet = BytePacket::new();
        let mut dst = OneByte::new(b"", false);
        adapter.adapt_to(&mut packet, &mut dst).unwrap();
        assert_eq!(dst.output, frame(VERSION, b""));

        let mut src = OneByte::new(&dst.output, false);
        adapter.adapt_from(&mut src, &mut packet).unwrap();
        assert_eq!(packet.remaining_data(), 0);
    }

    #[test]
    fn test_back_to_back_messages() {
        let mut wire = frame(VERSION, b"first");
        wire.extend(frame(VERSION, b"second"));
        let mut adapter = SimpleAdapter::new();
        let mut src = OneByte::new(&wire, false);

        let mut packet = BytePacket::new();
        adapter.adapt_from(&mut src, &mut packet).unwrap();
        assert_eq!(contents(&mut packet), b"first");
        adapter.adapt_from(&mut src, &mut packet).unwrap();
        assert_eq!(contents(&mut packet), b"second");
    }

    #[test]
    fn test_reset_abandons_partial_frame() {
        let wire = frame(VERSION, b"abc");
        let mut adapter = SimpleAdapter::new();
        let mut src = OneByte::new(&wire[..5], false);
        let mut packet = BytePacket::new();

        assert!(adapter.adapt_from(&mut src, &mut packet).unwrap_err().is_retry());
        assert!(adapter.in_progress());
        adapter.reset();
        assert!(!adapter.in_progress());

        let mut fresh = OneByte::new(&wire, false);
        adapter.adapt_from(&mut fresh, &mut packet).unwrap();
        assert_eq!(contents(&mut packet), b"abc");
    }

    #[test]
    fn test_oversized_header_rejected_before_body() {
        let mut wire = VERSION.to_be_bytes().to_vec();
        wire.extend_from_slice(&u32::MAX.to_be_bytes());
        wire.extend_from_slice(b"tail");
        let mut adapter = SimpleAdapter::new();
        let mut src = OneByte::new(&wire, false);
        let mut packet = BytePacket::with_capacity(16);

        match adapter.adapt_from(&mut src, &mut packet) {
            Err(Error::Malformed(_)) => {}
            other => panic!("expected malformed, got {other:?}"),
        }
        assert_eq!(src.reads, HEADER_LEN);
        assert_eq!(packet.capacity(), 16);
        assert!(!adapter.in_progress());
    }

    #[test]
    fn test_frame_limit_is_inclusive() {
        let mut adapter = SimpleAdapter::with_max_frame_len(4);
        let mut packet = BytePacket::new();

        let mut exact = OneByte::new(&frame(VERSION, b"four"), false);
        adapter.adapt_from(&mut exact, &mut packet).unwrap();
        assert_eq!(contents(&mut packet), b"four");

        let mut over = OneByte::new(&frame(VERSION, b"five!"), false);
        assert!(matches!(
            adapter.adapt_from(&mut over, &mut packet),
            Err(Error::Malformed(_))
        ));

        // the adapter is usable again afterwards
        let mut next = OneByte::new(&frame(VERSION, b"ok"), false);
        adapter.adapt_from(&mut next, &mut packet).unwrap();
        assert_eq!(contents(&mut packet), b"ok");
    }

    #[test]
    fn test_factory_carries_frame_limit() {
        let config = ServerConfig::new().max_frame_len(2);
        let mut adapter = SimpleAdapterFactory::from_config(&config).build();
        let mut src = OneByte::new(&frame(VERSION, b"abc"), false);
        let mut packet = BytePacket::new();
        assert!(matches!(
            adapter.adapt_from(&mut src, &mut packet),
            Err(Error::Malformed(_))
        ));
        assert_eq!(SimpleAdapterFactory::default().max_frame_len, defaults::MAX_FRAME_LEN);
    }
}
