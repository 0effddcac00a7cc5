//! # wirekit-module — Default implementations
//!
//! One default implementation for every wirekit trait, plus the client-side
//! channel. The server crate never names these types directly; it receives
//! them through the factories below.
//!
//! ## Default stack
//!
//! | Trait             | Default impl       | Factory                   |
//! |-------------------|--------------------|---------------------------|
//! | Endpoint          | TcpSocket          | —                         |
//! | Packet            | BytePacket         | BytePacketFactory         |
//! | ProtocolAdapter   | SimpleAdapter      | SimpleAdapterFactory      |
//! | Reactor           | EpollReactor       | EpollReactorFactory       |
//! | WorkerPool        | ThreadPool         | ThreadPoolFactory         |
//! | Dispatcher        | StringDispatcher   | StringDispatcherFactory   |
//! | Router            | HashRouter         | —                         |

pub mod byte_packet;
pub mod tcp_socket;
pub mod simple_adapter;
pub mod thread_pool;
pub mod message;
pub mod string_dispatcher;
pub mod hash_router;
pub mod tcp_channel;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        pub mod epoll_reactor;
        pub use epoll_reactor::{EpollReactor, EpollReactorFactory};
    }
}

pub use byte_packet::{BytePacket, BytePacketFactory};
pub use hash_router::HashRouter;
pub use message::{new_trace_id, Message};
pub use simple_adapter::{SimpleAdapter, SimpleAdapterFactory};
pub use string_dispatcher::{MethodTable, StringDispatcher, StringDispatcherFactory};
pub use tcp_channel::TcpChannel;
pub use tcp_socket::TcpSocket;
pub use thread_pool::{ThreadPool, ThreadPoolFactory};
