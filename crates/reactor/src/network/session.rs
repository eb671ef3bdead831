use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use tracing::{trace, warn};

use crate::buffer::{Buffer, BufferReader, BufferWriter};

use super::{Outbox, SessionError, SessionKey};

/// Per connection state: the socket, both buffers and the idle clock.
///
/// A session belongs to exactly one handler, which belongs to exactly one
/// reactor. Dropping the session deregisters and closes the socket; moving it
/// to another handler does neither.
pub struct Session {
    socket: Option<TcpStream>,
    peer: SocketAddr,
    input: Buffer,
    output: Buffer,
    /// `None` while the timeout is suspended
    last_active: Option<Instant>,
    registration: Option<Registration>,
}

struct Registration {
    registry: Arc<Registry>,
    token: Token,
    interest: Interest,
}

impl Session {
    pub fn new(socket: TcpStream, peer: SocketAddr, chunk_size: usize) -> Self {
        Self {
            socket: Some(socket),
            peer,
            input: Buffer::with_chunk_size(chunk_size),
            output: Buffer::with_chunk_size(chunk_size),
            last_active: Some(Instant::now()),
            registration: None,
        }
    }

    /// A session without a socket, bytes are fed through [`Session::input_mut`].
    pub fn detached(peer: SocketAddr, chunk_size: usize) -> Self {
        Self {
            socket: None,
            peer,
            input: Buffer::with_chunk_size(chunk_size),
            output: Buffer::with_chunk_size(chunk_size),
            last_active: Some(Instant::now()),
            registration: None,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Restarts the idle clock, lifting a suspended timeout.
    pub fn touch(&mut self) {
        self.last_active = Some(Instant::now());
    }

    /// Keeps the session alive until the next [`touch`](Session::touch).
    pub fn suspend_timeout(&mut self) {
        self.last_active = None;
    }

    pub fn is_timeout_suspended(&self) -> bool {
        self.last_active.is_none()
    }

    pub fn is_timed_out(&self, timeout: Duration, now: Instant) -> bool {
        self.last_active.is_some_and(|last| now.saturating_duration_since(last) > timeout)
    }

    /// Moves whatever the socket has into the input buffer.
    pub fn receive(&mut self) -> Result<usize, SessionError> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(0);
        };
        Ok(BufferWriter::new(&mut self.input).receive_from(socket)?)
    }

    /// Writes as much of the output buffer as the socket takes.
    ///
    /// Returns true while bytes remain.
    pub fn flush(&mut self) -> Result<bool, SessionError> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(!self.output.is_empty());
        };
        Ok(BufferReader::new(&mut self.output).send_to(socket)?)
    }

    pub fn has_pending_output(&self) -> bool {
        !self.output.is_empty()
    }

    /// Registers the socket for reads, and for writes if output is pending.
    pub(crate) fn register(&mut self, registry: &Arc<Registry>, token: Token) -> io::Result<()> {
        let Some(socket) = self.socket.as_mut() else {
            return Ok(());
        };
        let interest = if self.output.is_empty() { Interest::READABLE } else { Interest::READABLE | Interest::WRITABLE };
        registry.register(socket, token, interest)?;
        self.registration = Some(Registration { registry: Arc::clone(registry), token, interest });
        Ok(())
    }

    /// Adds write interest, a no-op when it is already armed.
    pub fn arm_write(&mut self) -> io::Result<()> {
        self.set_interest(Interest::READABLE | Interest::WRITABLE)
    }

    /// Drops write interest until new output is produced.
    pub fn disarm_write(&mut self) -> io::Result<()> {
        self.set_interest(Interest::READABLE)
    }

    fn set_interest(&mut self, interest: Interest) -> io::Result<()> {
        let (Some(socket), Some(registration)) = (self.socket.as_mut(), self.registration.as_mut()) else {
            return Ok(());
        };
        if registration.interest != interest {
            registration.registry.reregister(socket, registration.token, interest)?;
            registration.interest = interest;
        }
        Ok(())
    }

    /// Removes the socket from its reactor's poller without closing it.
    ///
    /// Called before the session is handed to another reactor.
    pub fn detach(&mut self) -> io::Result<()> {
        match (self.socket.as_mut(), self.registration.take()) {
            (Some(socket), Some(registration)) => registration.registry.deregister(socket),
            _ => Ok(()),
        }
    }

    pub fn input(&self) -> &Buffer {
        &self.input
    }

    pub fn output(&self) -> &Buffer {
        &self.output
    }

    pub fn input_mut(&mut self) -> &mut Buffer {
        &mut self.input
    }

    pub fn output_mut(&mut self) -> &mut Buffer {
        &mut self.output
    }

    /// Both buffers at once, for handlers that parse input and answer into output.
    pub fn buffers_mut(&mut self) -> (&mut Buffer, &mut Buffer) {
        (&mut self.input, &mut self.output)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            warn!(peer = %self.peer, cause = %e, "failed to deregister session");
        }
        if self.socket.is_some() {
            trace!(peer = %self.peer, "closing session");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("input", &self.input.len())
            .field("output", &self.output.len())
            .field("last_active", &self.last_active)
            .field("registered", &self.registration.is_some())
            .finish()
    }
}

/// Result of one [`SessionHandler::handle_session`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// the handler consumed what it could, keep the session
    Continue,
    /// the session moved to another reactor, forget it without closing
    Relocated,
}

/// A protocol state machine owning one [`Session`].
///
/// The reactor calls [`handle_session`](SessionHandler::handle_session) after
/// every read. An error evicts the session.
pub trait SessionHandler: Send {
    fn handle_session(&mut self) -> Result<Handled, SessionError>;

    /// `None` once the session was moved out.
    fn session(&self) -> Option<&Session>;

    fn session_mut(&mut self) -> Option<&mut Session>;

    /// Called when the handler is adopted by a reactor.
    fn attach(&mut self, _context: SessionContext) {}
}

/// Address of an adopted session, for output produced off the I/O path.
///
/// The default context is detached and silently drops what is sent.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    target: Option<(SessionKey, Outbox)>,
}

impl SessionContext {
    pub fn new(key: SessionKey, outbox: Outbox) -> Self {
        Self { target: Some((key, outbox)) }
    }

    pub fn key(&self) -> Option<SessionKey> {
        self.target.as_ref().map(|(key, _)| *key)
    }

    pub fn is_attached(&self) -> bool {
        self.target.is_some()
    }

    /// Queues `bytes` for the session, returns false when detached.
    pub fn send(&self, bytes: Bytes) -> bool {
        match &self.target {
            Some((key, outbox)) => {
                outbox.push(*key, bytes);
                true
            }
            None => {
                trace!(len = bytes.len(), "dropping output of a detached session");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 4000))
    }

    #[test]
    fn suspended_session_never_times_out() {
        let mut session = Session::detached(peer(), 16);
        let later = Instant::now() + Duration::from_secs(60);
        assert!(session.is_timed_out(Duration::from_secs(1), later));

        session.suspend_timeout();
        assert!(session.is_timeout_suspended());
        assert!(!session.is_timed_out(Duration::from_secs(1), later));

        session.touch();
        assert!(!session.is_timed_out(Duration::from_secs(1), Instant::now()));
    }

    #[test]
    fn detached_session_keeps_output() {
        let mut session = Session::detached(peer(), 16);
        BufferWriter::new(session.output_mut()).write(b"pending");
        assert!(session.has_pending_output());
        assert!(session.flush().unwrap());
        assert_eq!(session.receive().unwrap(), 0);
        session.arm_write().unwrap();
        session.detach().unwrap();
    }

    #[test]
    fn detached_context_drops_output() {
        let context = SessionContext::default();
        assert!(!context.is_attached());
        assert!(!context.send(Bytes::from_static(b"lost")));
    }
}
