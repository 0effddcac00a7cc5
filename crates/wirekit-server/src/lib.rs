//! # wirekit-server — Connection server
//!
//! Ties the wirekit traits into a request/response TCP server:
//!
//! ```text
//! accept thread ──round-robin──▶ EventReactor[0..N] (one I/O thread each)
//!                                      │ ready events
//!                                      ▼
//!                                WorkerPool: recv → dispatch → send → free
//!                                      │
//!                                      ▼
//!                          free list (BoundedQueue<Arc<Event>>) ──▶ accept thread
//! ```
//!
//! Every concrete implementation comes in through [`ServerDeps`]; nothing
//! is looked up from process-wide registries, so several servers can live
//! in one process.

pub mod event;
pub mod server;

pub use event::{Event, EventReactor};
pub use server::{ConnectionServer, ServerDeps};
