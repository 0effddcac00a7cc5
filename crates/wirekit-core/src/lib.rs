//! # wirekit-core — Trait definitions for wirekit
//!
//! Each trait here models one seam of the request/response runtime. The
//! default implementations live in `wirekit-module`; the server in
//! `wirekit-server` is written against the traits only, and receives its
//! concrete implementations through factories at construction time.
//!
//! | Trait             | Default impl (wirekit-module) |
//! |-------------------|-------------------------------|
//! | `Packet`          | `BytePacket`                  |
//! | `ProtocolAdapter` | `SimpleAdapter`               |
//! | `Reactor`         | `EpollReactor`                |
//! | `WorkerPool`      | `ThreadPool`                  |
//! | `Dispatcher`      | `StringDispatcher`            |
//! | `Router`          | `HashRouter`                  |

pub mod error;
pub mod env;
pub mod config;
pub mod queue;
pub mod endpoint;
pub mod packet;
pub mod adapter;
pub mod reactor;
pub mod pool;
pub mod dispatcher;
pub mod router;

pub use adapter::{AdapterFactory, ProtocolAdapter};
pub use config::{ClientConfig, Host, ServerConfig};
pub use dispatcher::{Dispatcher, DispatcherFactory};
pub use endpoint::Endpoint;
pub use error::{Error, ErrorKind, QueueFull, Result};
pub use packet::{Packet, PacketFactory};
pub use pool::{PoolFactory, Task, WorkerPool};
pub use queue::BoundedQueue;
pub use reactor::{Interest, Readiness, Reactor, ReactorFactory};
pub use router::Router;
