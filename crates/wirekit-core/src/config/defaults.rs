//! Library defaults. Every value can be overridden through the matching
//! `WIREKIT_*` environment variable or a builder setter.

pub const IP: &str = "127.0.0.1";
pub const PORT: u16 = 8080;
pub const SOCK_TIMEOUT_SEC: u32 = 2;
pub const SOCK_TIMEOUT_USEC: u32 = 0;
pub const EPOLL_MAX_EVENTS: usize = 2000;
pub const EPOLL_TIMEOUT_MS: u16 = 5;
pub const EDGE_TRIGGERED: bool = true;
pub const IO_THREAD_NUM: usize = 4;
pub const WORKER_THREAD_NUM: usize = 8;
pub const WORKER_QUEUE_SIZE: usize = 2000;
pub const MAX_CONNECTION: usize = 2000;
/// 8 MiB
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;
pub const CLIENT_RETRY_COUNT: usize = 3;
