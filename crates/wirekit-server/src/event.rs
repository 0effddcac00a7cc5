//! Connection events and the per-thread reactor wrapper.
//!
//! An [`Event`] is one connection slot: socket, packet and adapter, plus the
//! interest it is armed for and a `busy` claim. Events outlive connections;
//! when a connection ends the event goes to the server's free list and is
//! rebound to the next accepted socket.
//!
//! An [`EventReactor`] owns one [`Reactor`] and the token → event map for
//! everything registered with it.
//!
//! Lifecycle:
//!
//! ```text
//! Free ──accept──▶ ArmedRecv ──ready──▶ Busy ──need more──▶ ArmedRecv
//!                                        │
//!                                        └─response─▶ ArmedSend ──ready──▶ Busy ──▶ Free
//! ```

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use wirekit_core::adapter::ProtocolAdapter;
use wirekit_core::dispatcher::Dispatcher;
use wirekit_core::error::Result;
use wirekit_core::packet::Packet;
use wirekit_core::reactor::{Interest, Reactor, Readiness};
use wirekit_module::tcp_socket::TcpSocket;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

struct EventState {
    socket: TcpSocket,
    packet: Box<dyn Packet>,
    adapter: Box<dyn ProtocolAdapter>,
    interest: Interest,
    /// Flags from the last wait that reported this event
    readiness: Readiness,
}

pub struct Event {
    token: u64,
    /// Index of the `EventReactor` this event is registered with
    reactor: AtomicUsize,
    busy: AtomicBool,
    state: Mutex<EventState>,
}

impl Event {
    pub fn new(
        socket: TcpSocket,
        packet: Box<dyn Packet>,
        adapter: Box<dyn ProtocolAdapter>,
    ) -> Self {
        Self {
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
            reactor: AtomicUsize::new(0),
            busy: AtomicBool::new(false),
            state: Mutex::new(EventState {
                socket,
                packet,
                adapter,
                interest: Interest::NONE,
                readiness: Readiness::default(),
            }),
        }
    }

    #[inline]
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn fd(&self) -> RawFd {
        self.state.lock().socket.fd()
    }

    pub fn peer(&self) -> Option<SocketAddrV4> {
        self.state.lock().socket.peer()
    }

    #[inline]
    pub fn reactor_index(&self) -> usize {
        self.reactor.load(Ordering::Acquire)
    }

    /// Claim the event for one worker task. False if already claimed.
    #[inline]
    pub fn try_claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Attach a freshly accepted socket. Buffered bytes, adapter progress
    /// and interest from the previous connection are dropped.
    pub fn rebind(&self, socket: TcpSocket) {
        let mut st = self.state.lock();
        st.socket = socket;
        st.packet.clear();
        st.adapter.reset();
        st.interest = Interest::NONE;
        st.readiness = Readiness::default();
    }

    pub fn set_ready_to_recv(&self) {
        self.state.lock().interest = Interest::RECV;
    }

    pub fn set_ready_to_send(&self) {
        self.state.lock().interest = Interest::SEND;
    }

    pub fn clear_ready(&self) {
        self.state.lock().interest = Interest::NONE;
    }

    pub fn is_ready_to_recv(&self) -> bool {
        self.state.lock().interest.recv
    }

    pub fn is_ready_to_send(&self) -> bool {
        self.state.lock().interest.send
    }

    pub fn interest(&self) -> Interest {
        self.state.lock().interest
    }

    /// What the reactor last reported for this event.
    pub fn readiness(&self) -> Readiness {
        self.state.lock().readiness
    }

    fn mark(&self, readiness: Readiness) {
        self.state.lock().readiness = readiness;
    }

    /// Pull one framed request from the socket into the packet. Resumable.
    pub fn recv(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        st.adapter.adapt_from(&mut st.socket, &mut *st.packet)
    }

    /// Push the packet to the socket as one frame. Resumable.
    pub fn send(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        st.adapter.adapt_to(&mut *st.packet, &mut st.socket)
    }

    /// Run `dispatcher` over the received packet.
    pub fn dispatch(&self, dispatcher: &dyn Dispatcher) -> Result<()> {
        let mut st = self.state.lock();
        dispatcher.dispatch(&mut *st.packet)
    }

    /// Close the socket and drop per-connection state.
    pub fn close(&self) -> Result<()> {
        let mut st = self.state.lock();
        st.packet.clear();
        st.adapter.reset();
        st.interest = Interest::NONE;
        st.socket.close()
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("token", &self.token)
            .field("reactor", &self.reactor_index())
            .field("busy", &self.is_busy())
            .finish()
    }
}

/// One [`Reactor`] plus the events registered with it.
pub struct EventReactor {
    index: usize,
    reactor: Arc<dyn Reactor>,
    events: Mutex<HashMap<u64, Arc<Event>>>,
    ready: Mutex<Vec<Readiness>>,
}

impl EventReactor {
    pub fn new(index: usize, reactor: Arc<dyn Reactor>) -> Self {
        Self {
            index,
            reactor,
            events: Mutex::new(HashMap::new()),
            ready: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// New event bound to `socket`, not yet registered.
    pub fn create_event(
        &self,
        socket: TcpSocket,
        packet: Box<dyn Packet>,
        adapter: Box<dyn ProtocolAdapter>,
    ) -> Arc<Event> {
        let event = Event::new(socket, packet, adapter);
        event.reactor.store(self.index, Ordering::Release);
        Arc::new(event)
    }

    /// Register `event` with its current interest.
    pub fn add(&self, event: &Arc<Event>) -> Result<()> {
        event.reactor.store(self.index, Ordering::Release);
        self.events.lock().insert(event.token, Arc::clone(event));
        let (fd, interest) = {
            let st = event.state.lock();
            (st.socket.fd(), st.interest)
        };
        if let Err(e) = self.reactor.add(fd, event.token, interest) {
            self.events.lock().remove(&event.token);
            return Err(e);
        }
        Ok(())
    }

    /// Deregister `event`. The map entry is dropped even if the kernel
    /// call fails.
    pub fn delete(&self, event: &Event) -> Result<()> {
        self.events.lock().remove(&event.token);
        self.reactor.delete(event.fd())
    }

    /// Re-arm `event` with its current interest.
    pub fn modify(&self, event: &Event) -> Result<()> {
        let (fd, interest) = {
            let st = event.state.lock();
            (st.socket.fd(), st.interest)
        };
        self.reactor.modify(fd, event.token, interest)
    }

    /// Wait for readiness; append ready events to `out`.
    ///
    /// Tokens no longer registered here are skipped.
    pub fn wait(&self, out: &mut Vec<Arc<Event>>) -> Result<usize> {
        let mut ready = self.ready.lock();
        ready.clear();
        self.reactor.wait(&mut ready)?;

        let events = self.events.lock();
        let before = out.len();
        for r in ready.iter() {
            if let Some(event) = events.get(&r.token) {
                event.mark(*r);
                out.push(Arc::clone(event));
            }
        }
        Ok(out.len() - before)
    }

    /// Registered events.
    pub fn live(&self) -> usize {
        self.events.lock().len()
    }

    /// Remove and return every registered event.
    pub fn drain(&self) -> Vec<Arc<Event>> {
        self.events.lock().drain().map(|(_, ev)| ev).collect()
    }
}
