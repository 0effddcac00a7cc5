//! `BytePacket` — default `Packet` implementation.
//!
//! A growable ring buffer: one owned `Vec<u8>` plus a read cursor, a write
//! cursor and the count of unread bytes. Both cursors move modulo the
//! backing length, so a transfer that crosses the end of storage is split
//! into a tail segment and a wrapped head segment.
//!
//! Storage only grows inside [`expand`](Packet::expand). Growth folds the
//! unread bytes down to offset 0 of the new storage.

use wirekit_core::endpoint::Endpoint;
use wirekit_core::error::{Error, Result};
use wirekit_core::packet::{Packet, PacketFactory};

/// Initial capacity used by [`BytePacketFactory::default`].
pub const DEFAULT_CAPACITY: usize = 1024;

pub struct BytePacket {
    buf: Vec<u8>,
    /// Next byte to read
    read: usize,
    /// Next byte to write
    write: usize,
    /// Unread bytes; `write == (read + used) % capacity`
    used: usize,
}

impl BytePacket {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            read: 0,
            write: 0,
            used: 0,
        }
    }

    #[inline]
    fn cap(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    fn advance_write(&mut self, n: usize) {
        self.write = (self.write + n) % self.cap();
        self.used += n;
    }

    #[inline]
    fn advance_read(&mut self, n: usize) {
        self.read = (self.read + n) % self.cap();
        self.used -= n;
    }

    /// Copy the first `dst.len()` unread bytes. Caller guarantees
    /// `dst.len() <= used`.
    fn copy_out(&self, dst: &mut [u8]) {
        let n = dst.len();
        if n == 0 {
            return;
        }
        let first = n.min(self.cap() - self.read);
        dst[..first].copy_from_slice(&self.buf[self.read..self.read + first]);
        if first < n {
            dst[first..].copy_from_slice(&self.buf[..n - first]);
        }
    }
}

impl Default for BytePacket {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BytePacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BytePacket")
            .field("capacity", &self.cap())
            .field("read", &self.read)
            .field("write", &self.write)
            .field("used", &self.used)
            .finish()
    }
}

impl Endpoint for BytePacket {
    /// Always takes the whole slice, growing first if needed.
    fn write(&mut self, src: &[u8]) -> Result<usize> {
        let n = src.len();
        if n == 0 {
            return Ok(0);
        }
        self.expand(n);
        let first = n.min(self.cap() - self.write);
        let w = self.write;
        self.buf[w..w + first].copy_from_slice(&src[..first]);
        if first < n {
            self.buf[..n - first].copy_from_slice(&src[first..]);
        }
        self.advance_write(n);
        Ok(n)
    }

    fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        let n = dst.len().min(self.used);
        if n == 0 {
            return Ok(0);
        }
        self.copy_out(&mut dst[..n]);
        self.advance_read(n);
        Ok(n)
    }
}

impl Packet for BytePacket {
    fn write_from(&mut self, src: &mut dyn Endpoint, n: usize) -> Result<usize> {
        if n == 0 {
            return Ok(0);
        }
        self.expand(n);

        let mut done = 0;
        while done < n {
            // Free space >= n - done, so the run from `write` is free up to
            // the end of storage or up to `read`, whichever comes first.
            let chunk = (n - done).min(self.cap() - self.write);
            let w = self.write;
            match src.read(&mut self.buf[w..w + chunk]) {
                Ok(0) => break,
                Ok(k) => {
                    self.advance_write(k);
                    done += k;
                    if k < chunk {
                        break;
                    }
                }
                Err(Error::Retry) if done > 0 => break,
                Err(e) => return Err(e),
            }
        }
        Ok(done)
    }

    fn read_into(&mut self, dst: &mut dyn Endpoint, n: usize) -> Result<usize> {
        let n = n.min(self.used);
        let mut done = 0;
        while done < n {
            let chunk = (n - done).min(self.cap() - self.read);
            let r = self.read;
            match dst.write(&self.buf[r..r + chunk]) {
                Ok(0) => break,
                Ok(k) => {
                    self.advance_read(k);
                    done += k;
                    if k < chunk {
                        break;
                    }
                }
                Err(Error::Retry) if done > 0 => break,
                Err(e) => return Err(e),
            }
        }
        Ok(done)
    }

    fn peek(&self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.used);
        self.copy_out(&mut dst[..n]);
        n
    }

    fn expand(&mut self, extra: usize) {
        if self.remaining_space() >= extra {
            return;
        }
        let need = self.used + extra;
        let new_cap = need + need / 2;

        let mut fresh = vec![0u8; new_cap];
        self.copy_out(&mut fresh[..self.used]);
        self.buf = fresh;
        self.read = 0;
        self.write = self.used % new_cap;
    }

    fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.used = 0;
    }

    #[inline]
    fn remaining_data(&self) -> usize {
        self.used
    }

    #[inline]
    fn remaining_space(&self) -> usize {
        self.cap() - self.used
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.cap()
    }
}

/// Builds `BytePacket`s with a fixed initial capacity.
#[derive(Debug, Clone)]
pub struct BytePacketFactory {
    initial_capacity: usize,
}

impl BytePacketFactory {
    pub fn new(initial_capacity: usize) -> Self {
        Self { initial_capacity }
    }
}

impl Default for BytePacketFactory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PacketFactory for BytePacketFactory {
    fn build(&self) -> Box<dyn Packet> {
        Box::new(BytePacket::with_capacity(self.initial_capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    /// Byte source/sink that moves at most `step` bytes per call and
    /// reports `Retry` when it has nothing to give.
    struct Trickle {
        input: VecDeque<u8>,
        output: Vec<u8>,
        step: usize,
    }

    impl Trickle {
        fn new(input: &[u8], step: usize) -> Self {
            Self {
                input: input.iter().copied().collect(),
                output: Vec::new(),
                step,
            }
        }
    }

    impl Endpoint for Trickle {
        fn write(&mut self, src: &[u8]) -> Result<usize> {
            let n = src.len().min(self.step);
            self.output.extend_from_slice(&src[..n]);
            Ok(n)
        }

        fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
            if self.input.is_empty() {
                return Err(Error::Retry);
            }
            let n = dst.len().min(self.step).min(self.input.len());
            for slot in dst.iter_mut().take(n) {
                *slot = self.input.pop_front().unwrap_or_default();
            }
            Ok(n)
        }
    }

    fn drain(p: &mut BytePacket) -> Vec<u8> {
        let mut out = vec![0u8; p.remaining_data()];
        let n = p.read(&mut out).unwrap();
        assert_eq!(n, out.len());
        out
    }

    #[test]
    fn test_write_read_basic() {
        let mut p = BytePacket::with_capacity(8);
        assert_eq!(p.write(b"hello").unwrap(), 5);
        assert_eq!(p.remaining_data(), 5);
        assert_eq!(p.remaining_space(), 3);

        let mut head = [0u8; 2];
        assert_eq!(p.read(&mut head).unwrap(), 2);
        assert_eq!(&head, b"he");
        assert_eq!(drain(&mut p), b"llo");

        let mut empty = [0u8; 4];
        assert_eq!(p.read(&mut empty).unwrap(), 0);
    }

    #[test]
    fn test_wraparound_exactly_at_capacity() {
        let mut p = BytePacket::with_capacity(8);
        p.write(b"abcdef").unwrap();
        let mut tmp = [0u8; 6];
        p.read(&mut tmp).unwrap();

        // write cursor at 6, wraps after two bytes; buffer exactly full
        p.write(b"12345678").unwrap();
        assert_eq!(p.capacity(), 8);
        assert_eq!(p.remaining_space(), 0);
        assert_eq!(drain(&mut p), b"12345678");
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut p = BytePacket::with_capacity(4);
        p.write(b"xy").unwrap();
        let mut tmp = [0u8; 1];
        p.read(&mut tmp).unwrap();
        p.write(b"zw").unwrap();

        let mut peeked = [0u8; 8];
        assert_eq!(p.peek(&mut peeked), 3);
        assert_eq!(&peeked[..3], b"yzw");
        assert_eq!(p.remaining_data(), 3);
        assert_eq!(drain(&mut p), b"yzw");
    }

    #[test]
    fn test_expand_noop_when_space_suffices() {
        let mut p = BytePacket::with_capacity(16);
        p.write(b"abc").unwrap();
        p.expand(13);
        assert_eq!(p.capacity(), 16);
        p.expand(14);
        assert_eq!(p.capacity(), (17 * 3) / 2);
        assert_eq!(drain(&mut p), b"abc");
    }

    #[test]
    fn test_expand_folds_wrapped_data() {
        let mut p = BytePacket::with_capacity(8);
        p.write(b"012345").unwrap();
        let mut tmp = [0u8; 4];
        p.read(&mut tmp).unwrap();
        p.write(b"6789").unwrap(); // wraps: "45" at tail, "6789" at head

        p.write(b"ABCDEFGHIJ").unwrap(); // forces growth
        assert!(p.capacity() >= 16);
        assert_eq!(drain(&mut p), b"456789ABCDEFGHIJ");
    }

    #[test]
    fn test_zero_capacity_grows() {
        let mut p = BytePacket::with_capacity(0);
        assert_eq!(p.capacity(), 0);
        p.write(b"a").unwrap();
        assert!(p.capacity() >= 1);
        assert_eq!(drain(&mut p), b"a");
    }

    #[test]
    fn test_clear_keeps_storage() {
        let mut p = BytePacket::with_capacity(4);
        p.write(b"abcdefgh").unwrap();
        let cap = p.capacity();
        p.clear();
        assert_eq!(p.remaining_data(), 0);
        assert_eq!(p.capacity(), cap);
    }

    #[test]
    fn test_write_from_partial_and_retry() {
        let mut p = BytePacket::with_capacity(4);
        let mut src = Trickle::new(b"abcdef", 2);

        // short read stops the transfer early
        assert_eq!(p.write_from(&mut src, 6).unwrap(), 2);
        assert_eq!(p.write_from(&mut src, 4).unwrap(), 2);
        assert_eq!(p.write_from(&mut src, 2).unwrap(), 2);
        assert!(p.write_from(&mut src, 1).unwrap_err().is_retry());
        assert_eq!(drain(&mut p), b"abcdef");
    }

    #[test]
    fn test_write_from_across_wrap() {
        let mut p = BytePacket::with_capacity(8);
        p.write(b"......").unwrap();
        let mut tmp = [0u8; 6];
        p.read(&mut tmp).unwrap();

        let mut src = Trickle::new(b"wxyz", 8);
        assert_eq!(p.write_from(&mut src, 4).unwrap(), 4);
        assert_eq!(p.capacity(), 8);
        assert_eq!(drain(&mut p), b"wxyz");
    }

    #[test]
    fn test_read_into_partial() {
        let mut p = BytePacket::with_capacity(8);
        p.write(b"hello").unwrap();
        let mut dst = Trickle::new(b"", 3);
        assert_eq!(p.read_into(&mut dst, 10).unwrap(), 3);
        assert_eq!(p.read_into(&mut dst, 10).unwrap(), 2);
        assert_eq!(p.read_into(&mut dst, 10).unwrap(), 0);
        assert_eq!(dst.output, b"hello");
    }

    #[test]
    fn test_hard_error_keeps_moved_bytes() {
        struct Failing {
            served: bool,
        }
        impl Endpoint for Failing {
            fn write(&mut self, _src: &[u8]) -> Result<usize> {
                Err(Error::PeerClosed)
            }
            fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
                if self.served {
                    return Err(Error::PeerClosed);
                }
                self.served = true;
                dst[0] = b'!';
                Ok(1)
            }
        }

        // cursors one byte short of the end of storage
        let mut p = BytePacket::with_capacity(4);
        p.write(b"...").unwrap();
        let mut tmp = [0u8; 3];
        p.read(&mut tmp).unwrap();

        let mut src = Failing { served: false };
        assert_eq!(p.write_from(&mut src, 1).unwrap(), 1);
        assert!(matches!(p.write_from(&mut src, 2), Err(Error::PeerClosed)));
        assert_eq!(p.remaining_data(), 1);
        assert!(matches!(p.read_into(&mut src, 1), Err(Error::PeerClosed)));
        assert_eq!(p.remaining_data(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Write(Vec<u8>),
        Read(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            proptest::collection::vec(any::<u8>(), 0..24).prop_map(Op::Write),
            (0usize..24).prop_map(Op::Read),
        ]
    }

    proptest! {
        #[test]
        fn prop_round_trip_matches_model(
            cap in 1usize..32,
            ops in proptest::collection::vec(op_strategy(), 0..64),
        ) {
            let mut p = BytePacket::with_capacity(cap);
            let mut model: VecDeque<u8> = VecDeque::new();
            for op in ops {
                match op {
                    Op::Write(bytes) => {
                        prop_assert_eq!(p.write(&bytes).unwrap(), bytes.len());
                        model.extend(bytes);
                    }
                    Op::Read(m) => {
                        let mut out = vec![0u8; m];
                        let n = p.read(&mut out).unwrap();
                        let expected: Vec<u8> = model.drain(..m.min(model.len())).collect();
                        prop_assert_eq!(&out[..n], &expected[..]);
                    }
                }
                prop_assert_eq!(p.remaining_data(), model.len());
                prop_assert_eq!(p.remaining_space(), p.capacity() - model.len());
            }
        }

        #[test]
        fn prop_expand_after_wraparound_preserves_data(
            cap in 2usize..32,
            offset_seed in any::<usize>(),
            k in 1usize..40,
            seed in any::<u8>(),
        ) {
            let mut p = BytePacket::with_capacity(cap);

            // park both cursors at an arbitrary offset, then wrap
            let offset = offset_seed % cap;
            p.write(&vec![0u8; offset]).unwrap();
            let mut sink = vec![0u8; offset];
            p.read(&mut sink).unwrap();
            let resident: Vec<u8> = (0..cap - 1).map(|i| seed.wrapping_add(i as u8)).collect();
            p.write(&resident).unwrap();
            prop_assert_eq!(p.capacity(), cap);

            let extra: Vec<u8> = (0..cap + k).map(|i| (i as u8).wrapping_mul(31)).collect();
            p.write(&extra).unwrap();
            prop_assert!(p.capacity() > cap);

            let mut expected = resident.clone();
            expected.extend_from_slice(&extra);
            prop_assert_eq!(drain(&mut p), expected);
        }

        #[test]
        fn prop_write_from_trickle_preserves_bytes(
            data in proptest::collection::vec(any::<u8>(), 0..128),
            step in 1usize..9,
        ) {
            let mut p = BytePacket::with_capacity(3);
            let mut src = Trickle::new(&data, step);
            let mut total = 0;
            while total < data.len() {
                match p.write_from(&mut src, data.len() - total) {
                    Ok(n) => total += n,
                    Err(e) => prop_assert!(e.is_retry()),
                }
            }
            let mut dst = Trickle::new(b"", step);
            while p.remaining_data() > 0 {
                p.read_into(&mut dst, usize::MAX).unwrap();
            }
            prop_assert_eq!(dst.output, data);
        }
    }
}
