use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;
use http::{HeaderMap, HeaderName, HeaderValue, header};
use tracing::{debug, trace};

use crate::buffer::BufferReader;
use crate::network::{Handled, Session, SessionContext, SessionError, SessionHandler, SessionKey};
use crate::protocol::ParseError;
use crate::utils::ensure;

use super::{HttpRequest, HttpResponse};

/// Upper bound of the body space reserved up front, larger bodies grow as they arrive.
const MAX_BODY_RESERVE: usize = 64 * 1024;

/// Application entry point for every completed request.
pub type RequestCallback = Arc<dyn Fn(HttpRequest, Responder) + Send + Sync>;

/// Takes over connections whose request asks for a protocol switch.
///
/// Consulted for every completed request before the request callback. When
/// [`accepts`](Upgrader::accepts) returns true the handler detaches its session
/// and passes it to [`upgrade`](Upgrader::upgrade); the old handler is done.
pub trait Upgrader: Send + Sync {
    fn accepts(&self, request: &HttpRequest) -> bool;

    fn upgrade(&self, request: HttpRequest, session: Session);
}

/// Sends the response of one request back to its connection.
///
/// The response is queued on the owning reactor's outbox, so a `Responder` may
/// be kept and used after the callback returned, from any thread.
#[derive(Debug, Clone)]
pub struct Responder {
    context: SessionContext,
}

impl Responder {
    pub fn new(context: SessionContext) -> Self {
        Self { context }
    }

    /// Returns false if the connection is not attached to a reactor.
    pub fn send(&self, response: &HttpResponse) -> bool {
        self.context.send(response.to_bytes())
    }

    pub fn key(&self) -> Option<SessionKey> {
        self.context.key()
    }
}

/// Where the parser stands in the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    AwaitHeader,
    AwaitBody,
    Complete,
}

/// HTTP/1.1 request parser and dispatcher for one connection.
///
/// Requests are handled one after the other: the header block is parsed in one
/// go (reverted and retried while incomplete), a body is read by
/// `Content-Length`, then the finished request goes to the upgrader or to the
/// callback and parsing restarts with whatever is still buffered.
pub struct HttpSessionHandler {
    session: Option<Session>,
    state: ParseState,
    pending: Option<HttpRequest>,
    remaining: usize,
    body: BytesMut,
    callback: RequestCallback,
    upgrader: Option<Arc<dyn Upgrader>>,
    context: SessionContext,
}

impl HttpSessionHandler {
    pub fn new(session: Session, callback: RequestCallback) -> Self {
        Self {
            session: Some(session),
            state: ParseState::AwaitHeader,
            pending: None,
            remaining: 0,
            body: BytesMut::new(),
            callback,
            upgrader: None,
            context: SessionContext::default(),
        }
    }

    #[must_use]
    pub fn with_upgrader(mut self, upgrader: Arc<dyn Upgrader>) -> Self {
        self.upgrader = Some(upgrader);
        self
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Parses the request line and headers, returns false if they are incomplete.
    fn parse_header(&mut self) -> Result<bool, SessionError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        let mut reader = BufferReader::new(session.input_mut());
        let mut line = String::new();

        if reader.getline(&mut line).is_err() {
            reader.revert();
            return Ok(false);
        }
        let mut request = parse_request_line(&line)?;

        loop {
            if reader.getline(&mut line).is_err() {
                reader.revert();
                return Ok(false);
            }
            if line.is_empty() {
                break;
            }
            parse_header_line(&line, request.headers_mut())?;
        }
        reader.finalize();

        trace!(method = %request.method(), path = request.path(), "parsed request header");
        if request.method().has_body() {
            self.remaining = body_length(request.headers())?;
            self.body.reserve(self.remaining.min(MAX_BODY_RESERVE));
            self.state = if self.remaining == 0 { ParseState::Complete } else { ParseState::AwaitBody };
        } else {
            self.state = ParseState::Complete;
        }
        self.pending = Some(request);
        Ok(true)
    }

    /// Collects body bytes, returns false once the input ran dry.
    fn parse_body(&mut self) -> Result<bool, SessionError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        let mut reader = BufferReader::new(session.input_mut());
        let acquired = reader.read_into(&mut self.body, self.remaining);
        self.remaining -= acquired;

        if self.remaining == 0 {
            self.state = ParseState::Complete;
            return Ok(true);
        }
        Ok(false)
    }

    /// Hands the finished request on and resets for the next one.
    fn dispatch(&mut self) -> Result<Handled, SessionError> {
        self.state = ParseState::AwaitHeader;
        let Some(mut request) = self.pending.take() else {
            return Ok(Handled::Continue);
        };
        request.body = self.body.split().freeze();

        let Some(session) = self.session.as_mut() else {
            return Ok(Handled::Relocated);
        };
        // a request waiting for its response is never evicted
        session.suspend_timeout();

        if let Some(upgrader) = self.upgrader.as_ref().filter(|upgrader| upgrader.accepts(&request)) {
            let upgrader = Arc::clone(upgrader);
            if let Some(mut session) = self.session.take() {
                session.detach()?;
                debug!(peer = %session.peer_addr(), path = request.path(), "upgrading connection");
                upgrader.upgrade(request, session);
            }
            return Ok(Handled::Relocated);
        }

        (self.callback)(request, Responder::new(self.context.clone()));
        Ok(Handled::Continue)
    }
}

impl SessionHandler for HttpSessionHandler {
    fn handle_session(&mut self) -> Result<Handled, SessionError> {
        loop {
            let progressed = match self.state {
                ParseState::AwaitHeader => self.parse_header()?,
                ParseState::AwaitBody => self.parse_body()?,
                ParseState::Complete => true,
            };

            if self.state == ParseState::Complete {
                if self.dispatch()? == Handled::Relocated {
                    return Ok(Handled::Relocated);
                }
            } else if !progressed {
                return Ok(Handled::Continue);
            }
        }
    }

    fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    fn attach(&mut self, context: SessionContext) {
        self.context = context;
    }
}

impl fmt::Debug for HttpSessionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSessionHandler")
            .field("session", &self.session)
            .field("state", &self.state)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

/// `METHOD SP TARGET SP VERSION`, with exactly two spaces.
fn parse_request_line(line: &str) -> Result<HttpRequest, ParseError> {
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::malformed_request_line(line));
    };
    ensure!(!target.is_empty(), ParseError::malformed_request_line(line));

    let method = method.parse()?;
    ensure!(version == "HTTP/1.1", ParseError::unsupported_version(version));

    let mut request = HttpRequest::new(method, "");
    version.clone_into(&mut request.version);
    request.set_target(target);
    Ok(request)
}

/// `key: value`, leading spaces of the value skipped, key lowercased.
fn parse_header_line(line: &str, headers: &mut HeaderMap) -> Result<(), ParseError> {
    let Some((key, value)) = line.split_once(':') else {
        return Err(ParseError::invalid_header(format!("missing colon in {line:?}")));
    };
    let value = value.trim_start_matches(' ');
    ensure!(!value.is_empty(), ParseError::invalid_header(format!("header {key:?} has no value")));

    let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| ParseError::invalid_header(format!("{key:?}: {e}")))?;
    let value = HeaderValue::from_str(value).map_err(|e| ParseError::invalid_header(format!("{key:?}: {e}")))?;
    headers.append(name, value);
    Ok(())
}

/// Body size of a request, only `Content-Length` framing is supported.
fn body_length(headers: &HeaderMap) -> Result<usize, ParseError> {
    if let Some(encoding) = headers.get(header::TRANSFER_ENCODING) {
        return Err(ParseError::unsupported_transfer_encoding(String::from_utf8_lossy(encoding.as_bytes())));
    }
    let Some(length) = headers.get(header::CONTENT_LENGTH) else {
        return Err(ParseError::MissingContentLength);
    };
    let length = length.to_str().map_err(ParseError::invalid_content_length)?;
    length.trim().parse().map_err(|e| ParseError::invalid_content_length(format!("{length:?}: {e}")))
}
