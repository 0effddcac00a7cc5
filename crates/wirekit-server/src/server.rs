//! `ConnectionServer` — accept thread, I/O threads, worker pool.
//!
//! One accept thread polls a non-blocking listener. Each accepted socket is
//! bound to an [`Event`] (recycled from the free list when possible), armed
//! for recv and handed round-robin to one of `io_thread_num`
//! [`EventReactor`]s. Each I/O thread waits on its reactor and submits one
//! task per ready event to the worker pool. The task runs the connection
//! state machine:
//!
//! - **recv**: read one frame (up to [`INLINE_RETRIES`] attempts), then
//!   dispatch. Incomplete input re-arms recv; a response re-arms send.
//! - **send**: write the response frame, then free the event whatever the
//!   outcome. Connections carry exactly one request.
//!
//! Freeing an event deregisters it, closes its socket and pushes it onto
//! the free list. Every error path ends in a free, so a socket is never
//! left registered without an owner.
//!
//! **Contract:**
//! - An event is in the worker pool at most once at a time: reactors
//!   report it one-shot, and a task must win [`Event::try_claim`].
//! - A task clears `busy` *before* re-arming, so the next readiness
//!   notification can always be claimed.
//! - `run()` returns once threads are spawned; `stop()` joins them.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn, Dispatch};

use wirekit_core::adapter::AdapterFactory;
use wirekit_core::config::ServerConfig;
use wirekit_core::dispatcher::{Dispatcher, DispatcherFactory};
use wirekit_core::error::{Error, QueueFull, Result};
use wirekit_core::packet::PacketFactory;
use wirekit_core::pool::{PoolFactory, WorkerPool};
use wirekit_core::queue::BoundedQueue;
use wirekit_core::reactor::ReactorFactory;
use wirekit_module::byte_packet::BytePacketFactory;
use wirekit_module::epoll_reactor::EpollReactorFactory;
use wirekit_module::simple_adapter::SimpleAdapterFactory;
use wirekit_module::string_dispatcher::{MethodTable, StringDispatcherFactory};
use wirekit_module::tcp_socket::TcpSocket;
use wirekit_module::thread_pool::ThreadPoolFactory;

use crate::event::{Event, EventReactor};

/// Inline attempts per recv/send on `Retry`.
pub const INLINE_RETRIES: usize = 3;

/// Implementations the server is built from.
pub struct ServerDeps {
    pub reactor_factory: Arc<dyn ReactorFactory>,
    pub packet_factory: Arc<dyn PacketFactory>,
    pub adapter_factory: Arc<dyn AdapterFactory>,
    pub pool_factory: Arc<dyn PoolFactory>,
    pub dispatcher_factory: Arc<dyn DispatcherFactory>,
    /// Installed as the default subscriber on every server thread and
    /// worker task. `None` uses the process-global one.
    pub log: Option<Dispatch>,
}

impl ServerDeps {
    /// Default stack: epoll, byte packets, simple framing, thread pool,
    /// string dispatch over `methods`.
    pub fn with_defaults(config: &ServerConfig, methods: MethodTable) -> Self {
        Self {
            reactor_factory: Arc::new(EpollReactorFactory::from_config(config)),
            packet_factory: Arc::new(BytePacketFactory::default()),
            adapter_factory: Arc::new(SimpleAdapterFactory::from_config(config)),
            pool_factory: Arc::new(ThreadPoolFactory::from_config(config)),
            dispatcher_factory: Arc::new(StringDispatcherFactory::new(methods)),
            log: None,
        }
    }

    pub fn log(mut self, dispatch: Dispatch) -> Self {
        self.log = Some(dispatch);
        self
    }
}

fn with_log<R>(log: Option<&Dispatch>, f: impl FnOnce() -> R) -> R {
    match log {
        Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
        None => f(),
    }
}

/// State shared by the accept thread, I/O threads and worker tasks.
struct Shared {
    config: ServerConfig,
    running: AtomicBool,
    reactors: Vec<EventReactor>,
    pool: Arc<dyn WorkerPool>,
    dispatcher: Arc<dyn Dispatcher>,
    packet_factory: Arc<dyn PacketFactory>,
    adapter_factory: Arc<dyn AdapterFactory>,
    free_list: BoundedQueue<Arc<Event>>,
    /// Events in existence: live plus free
    allocated: AtomicUsize,
    next_reactor: AtomicUsize,
    log: Option<Dispatch>,
}

pub struct ConnectionServer {
    config: ServerConfig,
    deps: ServerDeps,
    shared: Option<Arc<Shared>>,
    listener: Option<TcpSocket>,
    local_addr: Option<SocketAddrV4>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl ConnectionServer {
    pub fn new(config: ServerConfig, deps: ServerDeps) -> Self {
        Self {
            config,
            deps,
            shared: None,
            listener: None,
            local_addr: None,
            threads: Vec::new(),
        }
    }

    /// Validate config, build the pool, reactors and free list, and bind
    /// the listener.
    pub fn init(&mut self) -> Result<()> {
        if self.shared.is_some() {
            return Ok(());
        }
        self.config.validate()?;
        let log = self.deps.log.clone();
        with_log(log.as_ref(), || self.init_inner())
    }

    fn init_inner(&mut self) -> Result<()> {
        let config = self.config.clone();

        let mut reactors = Vec::with_capacity(config.io_thread_num);
        for index in 0..config.io_thread_num {
            let reactor = self.deps.reactor_factory.build().map_err(|e| {
                error!(index, error = %e, "reactor init failed");
                e
            })?;
            reactors.push(EventReactor::new(index, reactor));
        }

        let mut listener = TcpSocket::new();
        listener.listen(&config.ip, config.port).map_err(|e| {
            error!(ip = %config.ip, port = config.port, error = %e, "listen failed");
            e
        })?;
        listener.set_non_block()?;
        let port = listener.local_port()?;
        let ip: Ipv4Addr = config
            .ip
            .parse()
            .map_err(|_| Error::InvalidAddress(config.ip.clone()))?;

        let shared = Shared {
            pool: self.deps.pool_factory.build(),
            dispatcher: self.deps.dispatcher_factory.build(),
            packet_factory: Arc::clone(&self.deps.packet_factory),
            adapter_factory: Arc::clone(&self.deps.adapter_factory),
            free_list: BoundedQueue::new(config.max_connection),
            allocated: AtomicUsize::new(0),
            next_reactor: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            reactors,
            log: self.deps.log.clone(),
            config,
        };

        self.local_addr = Some(SocketAddrV4::new(ip, port));
        self.listener = Some(listener);
        self.shared = Some(Arc::new(shared));
        info!(addr = ?self.local_addr, "server initialized");
        Ok(())
    }

    /// Start the worker pool, the I/O threads and the accept thread.
    /// Returns immediately.
    pub fn run(&mut self) -> Result<()> {
        let shared = self
            .shared
            .clone()
            .ok_or(Error::Config("server not initialized"))?;
        let listener = self
            .listener
            .take()
            .ok_or(Error::Config("server already running"))?;

        shared.pool.run()?;
        shared.running.store(true, Ordering::Release);

        for index in 0..shared.reactors.len() {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("wirekit-io-{}", index))
                .spawn(move || with_log(shared.log.as_ref(), || io_loop(&shared, index)))
                .map_err(|source| Error::Io {
                    op: "spawn io thread",
                    source,
                })?;
            self.threads.push(handle);
        }

        let accept_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("wirekit-accept".into())
            .spawn(move || {
                with_log(accept_shared.log.as_ref(), || accept_loop(&accept_shared, listener))
            })
            .map_err(|source| Error::Io {
                op: "spawn accept thread",
                source,
            })?;
        self.threads.push(handle);

        with_log(shared.log.as_ref(), || {
            info!(
                addr = ?self.local_addr,
                io_threads = shared.reactors.len(),
                workers = shared.pool.total_workers(),
                "server running"
            )
        });
        Ok(())
    }

    /// Stop accepting, join all threads, drain the pool, close live
    /// connections.
    pub fn stop(&mut self) {
        let Some(shared) = self.shared.clone() else {
            return;
        };
        if !shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("server thread panicked");
            }
        }
        shared.pool.stop();

        with_log(shared.log.as_ref(), || {
            let mut closed = 0;
            for reactor in &shared.reactors {
                for event in reactor.drain() {
                    let _ = event.close();
                    closed += 1;
                }
            }
            info!(closed, "server stopped");
        });
    }

    /// Bound listen address; meaningful after `init`.
    pub fn local_addr(&self) -> Option<SocketAddrV4> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.shared
            .as_ref()
            .map_or(false, |s| s.running.load(Ordering::Acquire))
    }

    /// Events registered with a reactor right now.
    pub fn live_connections(&self) -> usize {
        self.shared
            .as_ref()
            .map_or(0, |s| s.reactors.iter().map(EventReactor::live).sum())
    }

    /// Events parked on the free list.
    pub fn free_events(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.free_list.size())
    }

    /// Events ever allocated and not dropped.
    pub fn allocated_events(&self) -> usize {
        self.shared
            .as_ref()
            .map_or(0, |s| s.allocated.load(Ordering::Acquire))
    }
}

impl Drop for ConnectionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(shared: &Arc<Shared>, listener: TcpSocket) {
    let idle = Duration::from_millis(shared.config.epoll_timeout_ms.max(1) as u64);
    debug!(fd = listener.fd(), "accept loop started");
    while shared.running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok(socket) => shared.on_accept(socket),
            Err(Error::Retry) => thread::sleep(idle),
            Err(e) => {
                error!(error = %e, "accept failed");
                thread::sleep(idle);
            }
        }
    }
    debug!("accept loop exiting");
}

fn io_loop(shared: &Arc<Shared>, index: usize) {
    let reactor = &shared.reactors[index];
    let mut ready = Vec::with_capacity(shared.config.epoll_max_events);
    debug!(reactor = index, "io loop started");
    while shared.running.load(Ordering::Acquire) {
        ready.clear();
        match reactor.wait(&mut ready) {
            Ok(_) => {}
            Err(e) => {
                error!(reactor = index, error = %e, "reactor wait failed, io loop exiting");
                return;
            }
        }
        for event in ready.drain(..) {
            if !event.try_claim() {
                continue;
            }
            shared.submit(event);
        }
    }
    debug!(reactor = index, "io loop exiting");
}

impl Shared {
    fn on_accept(&self, socket: TcpSocket) {
        let peer = socket.peer();
        let configured = socket
            .set_non_block()
            .and_then(|_| socket.set_timeout(self.config.sock_timeout_sec, 0));
        if let Err(e) = configured {
            error!(?peer, error = %e, "configuring accepted socket failed");
            return;
        }

        let next = self.next_reactor.fetch_add(1, Ordering::Relaxed);
        let reactor = &self.reactors[next % self.reactors.len()];

        let event = match self.free_list.pop() {
            Some(event) => {
                event.rebind(socket);
                event
            }
            None => {
                let allocated = self.allocated.load(Ordering::Acquire);
                if allocated >= self.config.max_connection {
                    let refused = Error::MaxConnections(self.config.max_connection);
                    warn!(?peer, error = %refused, "refusing connection");
                    return;
                }
                self.allocated.fetch_add(1, Ordering::AcqRel);
                reactor.create_event(
                    socket,
                    self.packet_factory.build(),
                    self.adapter_factory.build(),
                )
            }
        };

        event.set_ready_to_recv();
        if let Err(e) = reactor.add(&event) {
            error!(?peer, token = event.token(), error = %e, "registering connection failed");
            self.free(event);
            return;
        }
        debug!(?peer, token = event.token(), reactor = reactor.index(), "connection accepted");
    }

    fn submit(self: &Arc<Self>, event: Arc<Event>) {
        let shared = Arc::clone(self);
        let task_event = Arc::clone(&event);
        let task = Box::new(move || with_log(shared.log.as_ref(), || shared.handle(task_event)));
        if let Err(e) = self.pool.submit(task) {
            warn!(token = event.token(), error = %e, "worker pool rejected task");
            self.free(event);
        }
    }

    /// Worker-side entry; the caller holds the event's claim.
    fn handle(&self, event: Arc<Event>) {
        if event.is_ready_to_recv() {
            self.on_recv(event);
        } else if event.is_ready_to_send() {
            self.on_send(event);
        } else {
            event.release();
        }
    }

    fn on_recv(&self, event: Arc<Event>) {
        let mut outcome = event.recv();
        for _ in 1..INLINE_RETRIES {
            if !matches!(outcome, Err(Error::Retry)) {
                break;
            }
            outcome = event.recv();
        }
        match outcome {
            Ok(()) => {}
            Err(Error::Retry) => return self.rearm(event),
            Err(Error::PeerClosed) => {
                debug!(token = event.token(), "peer closed before request completed");
                return self.free(event);
            }
            Err(e) => {
                error!(token = event.token(), peer = ?event.peer(), error = %e, "recv failed");
                return self.free(event);
            }
        }

        match event.dispatch(self.dispatcher.as_ref()) {
            Ok(()) => {
                event.set_ready_to_send();
                self.rearm(event);
            }
            Err(Error::Retry) => self.rearm(event),
            Err(e) => {
                error!(token = event.token(), peer = ?event.peer(), error = %e, "dispatch failed");
                self.free(event);
            }
        }
    }

    fn on_send(&self, event: Arc<Event>) {
        let mut outcome = event.send();
        for _ in 1..INLINE_RETRIES {
            if !matches!(outcome, Err(Error::Retry)) {
                break;
            }
            outcome = event.send();
        }
        match outcome {
            Ok(()) => {}
            Err(Error::Retry) => {
                warn!(token = event.token(), peer = ?event.peer(), "send still blocked, dropping response");
            }
            Err(Error::PeerClosed) => {
                debug!(token = event.token(), "peer closed before response was sent");
            }
            Err(e) => {
                error!(token = event.token(), peer = ?event.peer(), error = %e, "send failed");
            }
        }
        self.free(event);
    }

    /// Release the claim, then re-arm with the event's current interest.
    fn rearm(&self, event: Arc<Event>) {
        event.release();
        let reactor = &self.reactors[event.reactor_index()];
        if let Err(e) = reactor.modify(&event) {
            error!(token = event.token(), error = %e, "re-arming connection failed");
            // disarmed after the one-shot fired, so nobody else can hold it
            if event.try_claim() {
                self.free(event);
            }
        }
    }

    /// Deregister, close, recycle.
    fn free(&self, event: Arc<Event>) {
        let reactor = &self.reactors[event.reactor_index()];
        if let Err(e) = reactor.delete(&event) {
            debug!(token = event.token(), error = %e, "deregister failed");
        }
        match event.close() {
            Ok(()) | Err(Error::Disconnected) => {}
            Err(e) => warn!(token = event.token(), error = %e, "close failed"),
        }
        event.clear_ready();
        event.release();

        if let Err(QueueFull(dropped)) = self.free_list.push(event) {
            self.allocated.fetch_sub(1, Ordering::AcqRel);
            debug!(token = dropped.token(), "free list full, dropping event");
        }
    }
}
