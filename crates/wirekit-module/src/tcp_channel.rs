//! `TcpChannel` — client side of one request/response exchange.
//!
//! Opens a blocking socket to the address a [`Router`] picks, then moves
//! [`Message`]s over it through the same packet + adapter stack the server
//! uses. With SO_RCVTIMEO/SO_SNDTIMEO set, a timed-out call surfaces as
//! `Retry`; each `write`/`read` re-attempts up to `retry_count` times.
//!
//! ```rust,ignore
//! let config = ClientConfig::new().host("127.0.0.1", 8080);
//! let router = HashRouter::new(config.hosts.clone(), "user-17");
//! let mut channel = TcpChannel::new(config);
//! channel.open(&router)?;
//! let reply = channel.call(ECHO, b"hello")?;
//! ```

use tracing::{debug, error};

use wirekit_core::adapter::ProtocolAdapter;
use wirekit_core::config::ClientConfig;
use wirekit_core::error::{Error, Result};
use wirekit_core::packet::Packet;
use wirekit_core::router::Router;

use crate::byte_packet::BytePacket;
use crate::message::{new_trace_id, Message, META_LEN};
use crate::simple_adapter::SimpleAdapter;
use crate::tcp_socket::TcpSocket;

pub struct TcpChannel {
    config: ClientConfig,
    socket: TcpSocket,
    packet: BytePacket,
    adapter: SimpleAdapter,
}

impl TcpChannel {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            socket: TcpSocket::new(),
            packet: BytePacket::with_capacity(META_LEN + 128),
            adapter: SimpleAdapter::new(),
        }
    }

    /// Resolve a target through `router`, connect, apply socket timeouts.
    pub fn open(&mut self, router: &dyn Router) -> Result<()> {
        let (ip, port) = router.route().map_err(|e| {
            error!(error = %e, "channel route failed");
            e
        })?;
        self.socket.connect(&ip, port).map_err(|e| {
            error!(%ip, port, error = %e, "channel connect failed");
            e
        })?;
        self.socket
            .set_timeout(self.config.sock_timeout_sec, self.config.sock_timeout_usec)?;
        self.adapter.reset();
        debug!(%ip, port, "channel open");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_connected()
    }

    /// Frame and send one message.
    pub fn write(&mut self, message: &Message) -> Result<()> {
        self.packet.clear();
        message.encode_into(&mut self.packet)?;

        let mut attempt = 0;
        loop {
            match self.adapter.adapt_to(&mut self.packet, &mut self.socket) {
                Ok(()) => return Ok(()),
                Err(Error::Retry) if attempt + 1 < self.config.retry_count => attempt += 1,
                Err(e) => {
                    if !e.is_retry() {
                        error!(method_id = message.method_id, error = %e, "channel write failed");
                    }
                    self.adapter.reset();
                    return Err(e);
                }
            }
        }
    }

    /// Receive and decode one message.
    pub fn read(&mut self) -> Result<Message> {
        self.packet.clear();

        let mut attempt = 0;
        loop {
            match self.adapter.adapt_from(&mut self.socket, &mut self.packet) {
                Ok(()) => break,
                Err(Error::Retry) if attempt + 1 < self.config.retry_count => attempt += 1,
                Err(e) => {
                    if !e.is_retry() {
                        error!(error = %e, "channel read failed");
                    }
                    self.adapter.reset();
                    return Err(e);
                }
            }
        }
        Message::decode_from(&mut self.packet)
    }

    /// Send `payload` under `method_id` with a fresh trace id; wait for the
    /// reply.
    pub fn call(&mut self, method_id: u32, payload: impl Into<Vec<u8>>) -> Result<Message> {
        let request = Message::new(method_id, payload).with_trace_id(new_trace_id());
        self.write(&request)?;
        let reply = self.read()?;
        debug!(method_id, trace_id = %request.trace_id, bytes = reply.payload.len(), "call complete");
        Ok(reply)
    }

    pub fn close(&mut self) -> Result<()> {
        self.adapter.reset();
        self.socket.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_open_route_failure() {
        let mut channel = TcpChannel::new(ClientConfig::new());
        let router = || -> Result<(String, u16)> { Err(Error::Route("no hosts".into())) };
        assert!(matches!(channel.open(&router), Err(Error::Route(_))));
        assert!(!channel.is_open());
    }

    #[test]
    fn test_call_against_inline_peer() {
        let mut listener = TcpSocket::new();
        listener.listen("127.0.0.1", 0).unwrap();
        let port = listener.local_port().unwrap();

        // minimal peer: read one frame, answer with the payload reversed
        let peer = thread::spawn(move || {
            let mut conn = listener.accept().unwrap();
            let mut adapter = SimpleAdapter::new();
            let mut packet = BytePacket::new();
            adapter.adapt_from(&mut conn, &mut packet).unwrap();
            let req = Message::decode_from(&mut packet).unwrap();
            let mut body = req.payload.clone();
            body.reverse();
            Message { payload: body, ..req }.encode_into(&mut packet).unwrap();
            adapter.adapt_to(&mut packet, &mut conn).unwrap();
        });

        let config = ClientConfig::new().host("127.0.0.1", port);
        let mut channel = TcpChannel::new(config);
        let router = move || -> Result<(String, u16)> { Ok(("127.0.0.1".to_string(), port)) };
        channel.open(&router).unwrap();
        let reply = channel.call(5, "abc").unwrap();
        assert_eq!(reply.method_id, 5);
        assert_eq!(reply.payload, b"cba");
        assert_eq!(reply.trace_id.len(), 32);
        channel.close().unwrap();
        peer.join().unwrap();
    }
}
