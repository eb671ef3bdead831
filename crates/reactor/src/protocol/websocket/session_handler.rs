use std::fmt;

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::buffer::{Buffer, BufferReader};
use crate::network::{Handled, Session, SessionContext, SessionError, SessionHandler};
use crate::protocol::ParseError;

use super::frame::{Frame, FrameState, OpCode};
use super::writer::{WebsocketSender, WebsocketWriter};

/// Application side of one websocket connection.
///
/// Callbacks run on the reactor thread that owns the connection. Replies
/// written through the [`WebsocketWriter`] go out with the next flush;
/// the sender given to [`on_connect`](WebsocketListener::on_connect) reaches
/// the connection from anywhere else.
pub trait WebsocketListener: Send {
    fn on_connect(&mut self, _sender: WebsocketSender) {}

    fn on_text(&mut self, writer: &mut WebsocketWriter<'_>, text: &str);

    fn on_binary(&mut self, writer: &mut WebsocketWriter<'_>, data: &[u8]);

    fn on_disconnect(&mut self) {}
}

/// The message being assembled, typed by its first frame.
#[derive(Debug)]
enum Message {
    Text(BytesMut),
    Binary(BytesMut),
}

impl Message {
    fn append(&mut self, payload: &[u8]) {
        match self {
            Message::Text(data) | Message::Binary(data) => data.extend_from_slice(payload),
        }
    }
}

/// Reads frames, assembles fragmented messages and delivers them to a listener.
///
/// A close frame ends the session. Ping and pong frames are consumed without
/// reaching the listener. The listener hears about the disconnect when the
/// handler is dropped.
pub struct WebsocketSessionHandler {
    session: Option<Session>,
    frame: Frame,
    message: Option<Message>,
    listener: Box<dyn WebsocketListener>,
    max_fragment_size: usize,
}

impl WebsocketSessionHandler {
    /// Takes over an upgraded session. Websocket sessions never time out.
    pub fn new(mut session: Session, listener: Box<dyn WebsocketListener>, max_fragment_size: usize) -> Self {
        session.suspend_timeout();
        Self { session: Some(session), frame: Frame::new(), message: None, listener, max_fragment_size }
    }
}

impl SessionHandler for WebsocketSessionHandler {
    fn handle_session(&mut self) -> Result<Handled, SessionError> {
        let Self { session, frame, message, listener, max_fragment_size } = self;
        let Some(session) = session.as_mut() else {
            return Ok(Handled::Continue);
        };
        let (input, output) = session.buffers_mut();
        let mut reader = BufferReader::new(input);

        while frame.parse_from(&mut reader)? == FrameState::Complete {
            on_frame(frame, message, listener.as_mut(), output, *max_fragment_size)?;
            frame.reset();
        }
        Ok(Handled::Continue)
    }

    fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    fn attach(&mut self, context: SessionContext) {
        self.listener.on_connect(WebsocketSender::new(context, self.max_fragment_size));
    }
}

impl Drop for WebsocketSessionHandler {
    fn drop(&mut self) {
        self.listener.on_disconnect();
    }
}

impl fmt::Debug for WebsocketSessionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebsocketSessionHandler")
            .field("session", &self.session)
            .field("frame", &self.frame.state())
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

fn on_frame(
    frame: &mut Frame,
    message: &mut Option<Message>,
    listener: &mut dyn WebsocketListener,
    output: &mut Buffer,
    max_fragment_size: usize,
) -> Result<(), SessionError> {
    let Some(header) = frame.header().copied() else {
        return Ok(());
    };
    trace!(opcode = ?header.opcode, fin = header.fin, len = header.payload_length, "websocket frame");

    match header.opcode {
        OpCode::Text => *message = Some(Message::Text(frame.take_payload())),
        OpCode::Binary => *message = Some(Message::Binary(frame.take_payload())),
        OpCode::Continuation => match message.as_mut() {
            Some(message) => message.append(frame.payload()),
            None => return Err(ParseError::UnexpectedContinuation.into()),
        },
        OpCode::Close => {
            debug!("websocket peer sent close");
            return Err(SessionError::Closed);
        }
        OpCode::Ping | OpCode::Pong => return Ok(()),
    }

    if !header.fin {
        return Ok(());
    }

    let mut writer = WebsocketWriter::new(output, max_fragment_size);
    match message.take() {
        Some(Message::Text(data)) => {
            let text = std::str::from_utf8(&data).map_err(|_invalid| ParseError::InvalidUtf8)?;
            listener.on_text(&mut writer, text);
        }
        Some(Message::Binary(data)) => listener.on_binary(&mut writer, &data),
        None => {}
    }
    Ok(())
}
