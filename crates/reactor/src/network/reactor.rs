use std::fmt;
use std::io;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Registry, Token};
use tracing::{debug, error, info, trace, warn};

use crate::buffer::BufferWriter;
use crate::config::ServerConfig;
use crate::event::panic_message;

use super::arena::Arena;
use super::{Handled, Handoff, Outbox, Session, SessionContext, SessionError, SessionHandler, SessionKey};

const LISTENER: Token = Token(usize::MAX);
const EVENT_CAPACITY: usize = 1024;

/// Wraps every accepted [`Session`] into the protocol handler serving it.
pub type Allocator = Box<dyn FnMut(Session) -> Box<dyn SessionHandler> + Send>;

/// Readiness of one token, copied out of the event list before dispatch.
#[derive(Debug, Clone, Copy)]
struct Ready {
    token: Token,
    readable: bool,
    writable: bool,
}

/// A single threaded event loop over a set of sessions.
///
/// A reactor either listens for connections and allocates a handler for each
/// one, or only adopts handlers handed over by another reactor through its
/// [`Handoff`] queue. Nothing inside a reactor blocks: [`loop_once`] runs one
/// non-blocking poll pass and returns.
///
/// [`loop_once`]: Reactor::loop_once
pub struct Reactor {
    poll: Poll,
    events: Events,
    ready: Vec<Ready>,
    registry: Arc<Registry>,
    listener: Option<TcpListener>,
    allocator: Option<Allocator>,
    sessions: Arena<Box<dyn SessionHandler>>,
    timeout: Option<Duration>,
    chunk_size: usize,
    idle: bool,
    handoff: Handoff,
    outbox: Outbox,
}

impl Reactor {
    /// A reactor without a listener, fed through [`Reactor::handoff`].
    pub fn new() -> io::Result<Self> {
        Self::with_config(&ServerConfig::default())
    }

    pub fn with_config(config: &ServerConfig) -> io::Result<Self> {
        let poll = Poll::new()?;
        let registry = Arc::new(poll.registry().try_clone()?);
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            ready: Vec::with_capacity(EVENT_CAPACITY),
            registry,
            listener: None,
            allocator: None,
            sessions: Arena::new(),
            timeout: config.get_connection_timeout(),
            chunk_size: config.get_chunk_size(),
            idle: true,
            handoff: Handoff::new(),
            outbox: Outbox::new(),
        })
    }

    /// A reactor listening on `addr`, every connection goes through `allocator`.
    pub fn bind<F>(addr: SocketAddr, allocator: F, config: &ServerConfig) -> io::Result<Self>
    where
        F: FnMut(Session) -> Box<dyn SessionHandler> + Send + 'static,
    {
        let mut reactor = Self::with_config(config)?;
        let mut listener = TcpListener::bind(addr)?;
        reactor.registry.register(&mut listener, LISTENER, Interest::READABLE)?;
        info!(addr = %listener.local_addr()?, "reactor listening");
        reactor.listener = Some(listener);
        reactor.allocator = Some(Box::new(allocator));
        Ok(reactor)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|listener| listener.local_addr().ok())
    }

    pub fn set_connection_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Handle to the queue other threads use to move handlers into this reactor.
    pub fn handoff(&self) -> Handoff {
        self.handoff.clone()
    }

    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// True when the last [`loop_once`](Reactor::loop_once) found nothing to do.
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Adopts `handler` and registers its socket with this reactor.
    pub fn add_session_handler(&mut self, handler: Box<dyn SessionHandler>) -> io::Result<SessionKey> {
        if handler.session().is_none() {
            return Err(io::Error::new(ErrorKind::InvalidInput, "handler has no session"));
        }
        let key = self
            .sessions
            .insert(handler)
            .map_err(|_handler| io::Error::new(ErrorKind::OutOfMemory, "session arena is full"))?;

        let registered = match self.sessions.get_mut(key).and_then(|handler| handler.session_mut()) {
            Some(session) => session.register(&self.registry, key.token()),
            None => Ok(()),
        };
        if let Err(e) = registered {
            self.sessions.remove(key);
            return Err(e);
        }

        if let Some(handler) = self.sessions.get_mut(key) {
            handler.attach(SessionContext::new(key, self.outbox.clone()));
        }
        Ok(key)
    }

    /// Runs one pass: adopt handed over sessions, deliver deferred output, poll
    /// the sockets once without blocking, then evict idle sessions.
    pub fn loop_once(&mut self) -> io::Result<()> {
        let mut busy = self.adopt_handoffs();
        busy |= self.deliver_outbox();

        match self.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }

        self.ready.clear();
        self.ready.extend(self.events.iter().map(|event| Ready {
            token: event.token(),
            readable: event.is_readable() || event.is_read_closed() || event.is_error(),
            writable: event.is_writable(),
        }));
        busy |= !self.ready.is_empty();

        for i in 0..self.ready.len() {
            let ready = self.ready[i];
            if ready.token == LISTENER {
                self.accept();
                continue;
            }
            let key = SessionKey::from_token(ready.token);
            if ready.readable {
                self.dispatch_read(key);
            }
            if ready.writable {
                self.dispatch_write(key);
            }
        }

        self.sweep_timeouts(Instant::now());
        self.idle = !busy;
        Ok(())
    }

    fn adopt_handoffs(&mut self) -> bool {
        let handlers = self.handoff.drain();
        let adopted = !handlers.is_empty();
        for handler in handlers {
            let peer = handler.session().map(Session::peer_addr);
            match self.add_session_handler(handler) {
                Ok(key) => {
                    debug!(peer = ?peer, "adopted session");
                    self.process_buffered(key);
                }
                Err(e) => warn!(peer = ?peer, cause = %e, "failed to adopt session"),
            }
        }
        adopted
    }

    fn deliver_outbox(&mut self) -> bool {
        let items = self.outbox.drain();
        let delivered = !items.is_empty();
        for (key, bytes) in items {
            let Some(session) = self.sessions.get_mut(key).and_then(|handler| handler.session_mut()) else {
                trace!(len = bytes.len(), "discarding output for a departed session");
                continue;
            };
            BufferWriter::new(session.output_mut()).write(&bytes);
            session.touch();
            if let Err(e) = session.arm_write() {
                self.evict(key, &SessionError::from(e));
            }
        }
        delivered
    }

    fn accept(&mut self) {
        loop {
            let Some(listener) = self.listener.as_ref() else {
                return;
            };
            let (stream, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    return;
                }
            };

            let Some(allocator) = self.allocator.as_mut() else {
                return;
            };
            debug!(peer = %peer, "accepted connection");
            let handler = allocator(Session::new(stream, peer, self.chunk_size));
            if let Err(e) = self.add_session_handler(handler) {
                warn!(peer = %peer, cause = %e, "failed to register session");
            }
        }
    }

    fn dispatch_read(&mut self, key: SessionKey) {
        let Some(handler) = self.sessions.get_mut(key) else {
            trace!(?key, "ignoring event for a departed session");
            return;
        };

        let received = match handler.session_mut() {
            Some(session) => {
                session.touch();
                session.receive().map(|_| true)
            }
            None => Ok(false),
        };
        let outcome = match received {
            Ok(true) => guarded(handler.as_mut()),
            Ok(false) => Ok(Handled::Relocated),
            Err(e) => Err(e),
        };
        self.settle(key, outcome);
    }

    /// Runs the handler over input that arrived before the session was adopted.
    fn process_buffered(&mut self, key: SessionKey) {
        let Some(handler) = self.sessions.get_mut(key) else {
            return;
        };
        if handler.session().is_some_and(|session| !session.input().is_empty()) {
            let outcome = guarded(handler.as_mut());
            self.settle(key, outcome);
        }
    }

    fn settle(&mut self, key: SessionKey, outcome: Result<Handled, SessionError>) {
        match outcome {
            Ok(Handled::Continue) => {
                let armed = match self.sessions.get_mut(key).and_then(|handler| handler.session_mut()) {
                    Some(session) if session.has_pending_output() => session.arm_write(),
                    _ => Ok(()),
                };
                if let Err(e) = armed {
                    self.evict(key, &SessionError::from(e));
                }
            }
            Ok(Handled::Relocated) => {
                self.sessions.remove(key);
                debug!(?key, "session relocated");
            }
            Err(e) => self.evict(key, &e),
        }
    }

    fn dispatch_write(&mut self, key: SessionKey) {
        let Some(session) = self.sessions.get_mut(key).and_then(|handler| handler.session_mut()) else {
            return;
        };
        let result = match session.flush() {
            Ok(true) => session.arm_write().map_err(SessionError::from),
            Ok(false) => session.disarm_write().map_err(SessionError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.evict(key, &e);
        }
    }

    fn sweep_timeouts(&mut self, now: Instant) {
        let Some(timeout) = self.timeout else {
            return;
        };
        self.sessions.retain(|_, handler| match handler.session() {
            Some(session) if session.is_timed_out(timeout, now) => {
                debug!(peer = %session.peer_addr(), cause = %SessionError::TimedOut, "evicting session");
                false
            }
            _ => true,
        });
    }

    fn evict(&mut self, key: SessionKey, cause: &SessionError) {
        let Some(handler) = self.sessions.remove(key) else {
            return;
        };
        let peer = handler.session().map(Session::peer_addr);
        match cause {
            SessionError::PeerClosed | SessionError::Closed => debug!(peer = ?peer, cause = %cause, "evicting session"),
            SessionError::Panicked { .. } => error!(peer = ?peer, cause = %cause, "evicting session"),
            _ => warn!(peer = ?peer, cause = %cause, "evicting session"),
        }
        // handlers may call back into the application when dropped
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || drop(handler))) {
            error!(peer = ?peer, cause = panic_message(payload.as_ref()), "session handler panicked on drop");
        }
    }
}

/// Runs `handler`, a panic becomes an error that evicts only its session.
fn guarded(handler: &mut dyn SessionHandler) -> Result<Handled, SessionError> {
    panic::catch_unwind(AssertUnwindSafe(|| handler.handle_session()))
        .unwrap_or_else(|payload| Err(SessionError::panicked(panic_message(payload.as_ref()))))
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor")
            .field("local_addr", &self.local_addr())
            .field("sessions", &self.sessions.len())
            .field("timeout", &self.timeout)
            .field("idle", &self.idle)
            .finish_non_exhaustive()
    }
}
