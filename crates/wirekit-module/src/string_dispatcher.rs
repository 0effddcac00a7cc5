//! `StringDispatcher` — default `Dispatcher`.
//!
//! Decodes a [`Message`], hands its payload as a UTF-8 string to the
//! handler registered for `method_id`, and encodes the handler's string
//! response back into the same packet under the request's method id and
//! trace id.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, debug_span, error};

use wirekit_core::dispatcher::{Dispatcher, DispatcherFactory};
use wirekit_core::error::{Error, Result};
use wirekit_core::packet::Packet;

use crate::message::Message;

/// Method id of the built-in echo handler.
pub const ECHO: u32 = 1;

pub type Handler = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// `method_id` → handler.
#[derive(Clone, Default)]
pub struct MethodTable {
    handlers: HashMap<u32, Handler>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with [`ECHO`] registered.
    pub fn with_echo() -> Self {
        let mut table = Self::new();
        table.register(ECHO, |req| Ok(req.to_string()));
        table
    }

    /// Register `handler` for `method_id`, replacing any previous one.
    pub fn register<F>(&mut self, method_id: u32, handler: F) -> &mut Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        self.handlers.insert(method_id, Arc::new(handler));
        self
    }

    pub fn get(&self, method_id: u32) -> Option<&Handler> {
        self.handlers.get(&method_id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("MethodTable").field("methods", &ids).finish()
    }
}

#[derive(Debug, Clone)]
pub struct StringDispatcher {
    table: MethodTable,
}

impl StringDispatcher {
    pub fn new(table: MethodTable) -> Self {
        Self { table }
    }
}

impl Dispatcher for StringDispatcher {
    fn dispatch(&self, packet: &mut dyn Packet) -> Result<()> {
        let request = Message::decode_from(packet)?;

        let span = debug_span!(
            "dispatch",
            method_id = request.method_id,
            trace_id = %request.trace_id
        );
        let _enter = span.enter();
        debug!(bytes = request.payload.len(), "dispatch request");

        let handler = self.table.get(request.method_id).ok_or_else(|| {
            error!("unknown method id");
            Error::Dispatch(format!("unknown method id {}", request.method_id))
        })?;

        let body = std::str::from_utf8(&request.payload).map_err(|e| {
            error!(error = %e, "request payload is not utf-8");
            Error::Malformed("request payload is not utf-8".into())
        })?;

        let response = handler(body).map_err(|e| {
            error!(error = %e, "method handler failed");
            e
        })?;

        packet.clear();
        Message {
            method_id: request.method_id,
            trace_id: request.trace_id,
            payload: response.into_bytes(),
        }
        .encode_into(packet)
    }
}

/// Hands out one shared dispatcher over a fixed method table.
#[derive(Debug, Clone)]
pub struct StringDispatcherFactory {
    dispatcher: Arc<StringDispatcher>,
}

impl StringDispatcherFactory {
    pub fn new(table: MethodTable) -> Self {
        Self {
            dispatcher: Arc::new(StringDispatcher::new(table)),
        }
    }
}

impl DispatcherFactory for StringDispatcherFactory {
    fn build(&self) -> Arc<dyn Dispatcher> {
        self.dispatcher.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_packet::BytePacket;
    use wirekit_core::endpoint::Endpoint;

    fn request(method_id: u32, body: &str) -> BytePacket {
        let mut p = BytePacket::new();
        Message::new(method_id, body)
            .with_trace_id("trace-1")
            .encode_into(&mut p)
            .unwrap();
        p
    }

    #[test]
    fn test_echo_round_trip() {
        let dispatcher = StringDispatcher::new(MethodTable::with_echo());
        let mut p = request(ECHO, "hello");
        dispatcher.dispatch(&mut p).unwrap();

        let response = Message::decode_from(&mut p).unwrap();
        assert_eq!(response.method_id, ECHO);
        assert_eq!(response.trace_id, "trace-1");
        assert_eq!(response.payload, b"hello");
        assert_eq!(p.remaining_data(), 0);
    }

    #[test]
    fn test_registered_handler() {
        let mut table = MethodTable::new();
        table.register(42, |req| Ok(req.to_uppercase()));
        let dispatcher = StringDispatcher::new(table);

        let mut p = request(42, "shout");
        dispatcher.dispatch(&mut p).unwrap();
        assert_eq!(Message::decode_from(&mut p).unwrap().payload, b"SHOUT");
    }

    #[test]
    fn test_incomplete_message_is_retry() {
        let dispatcher = StringDispatcher::new(MethodTable::with_echo());
        let full = request(ECHO, "partial");
        let mut wire = vec![0u8; full.remaining_data()];
        full.peek(&mut wire);

        let mut p = BytePacket::new();
        p.write(&wire[..wire.len() - 3]).unwrap();
        assert!(dispatcher.dispatch(&mut p).unwrap_err().is_retry());
        assert_eq!(p.remaining_data(), wire.len() - 3);
    }

    #[test]
    fn test_unknown_method_and_handler_error() {
        let mut table = MethodTable::new();
        table.register(7, |_| Err(Error::Dispatch("nope".into())));
        let dispatcher = StringDispatcher::new(table);

        assert!(matches!(dispatcher.dispatch(&mut request(99, "x")), Err(Error::Dispatch(_))));
        assert!(matches!(dispatcher.dispatch(&mut request(7, "x")), Err(Error::Dispatch(_))));
    }

    #[test]
    fn test_factory_shares_dispatcher() {
        let factory = StringDispatcherFactory::new(MethodTable::with_echo());
        let a = factory.build();
        let b = factory.build();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
