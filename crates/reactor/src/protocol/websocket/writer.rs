use std::io;

use bytes::{Bytes, BytesMut};

use crate::buffer::{Buffer, BufferWriter};
use crate::network::{SessionContext, SessionKey};

use super::frame::{FrameHeader, OpCode};

/// Data message types a listener can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

impl MessageKind {
    fn opcode(self) -> OpCode {
        match self {
            MessageKind::Text => OpCode::Text,
            MessageKind::Binary => OpCode::Binary,
        }
    }
}

/// Frames one message into `dst`.
///
/// The payload is cut into frames of at most `max_fragment_size` bytes. The
/// first frame carries the message opcode, the following ones are
/// continuations and only the last one has FIN set. An empty message is a
/// single empty final frame. Server frames are never masked.
pub fn encode_message(kind: MessageKind, data: &[u8], max_fragment_size: usize, dst: &mut BytesMut) {
    let max_fragment_size = max_fragment_size.max(1);
    if data.is_empty() {
        FrameHeader::new(kind.opcode(), true, 0).encode(dst);
        return;
    }

    let mut opcode = kind.opcode();
    let mut fragments = data.chunks(max_fragment_size).peekable();
    while let Some(fragment) = fragments.next() {
        let fin = fragments.peek().is_none();
        FrameHeader::new(opcode, fin, fragment.len() as u64).encode(dst);
        dst.extend_from_slice(fragment);
        opcode = OpCode::Continuation;
    }
}

/// Writes messages straight into a session's output buffer.
///
/// Bytes written through [`io::Write`] accumulate until
/// [`finish`](WebsocketWriter::finish) frames them as one message.
#[derive(Debug)]
pub struct WebsocketWriter<'a> {
    output: &'a mut Buffer,
    pending: BytesMut,
    max_fragment_size: usize,
}

impl<'a> WebsocketWriter<'a> {
    pub fn new(output: &'a mut Buffer, max_fragment_size: usize) -> Self {
        Self { output, pending: BytesMut::new(), max_fragment_size }
    }

    /// Frames everything written so far as one message.
    pub fn finish(&mut self, kind: MessageKind) {
        let data = self.pending.split();
        self.write_message(kind, &data);
    }

    pub fn send_text(&mut self, text: &str) {
        self.write_message(MessageKind::Text, text.as_bytes());
    }

    pub fn send_binary(&mut self, data: &[u8]) {
        self.write_message(MessageKind::Binary, data);
    }

    fn write_message(&mut self, kind: MessageKind, data: &[u8]) {
        let mut framed = BytesMut::new();
        encode_message(kind, data, self.max_fragment_size, &mut framed);
        BufferWriter::new(self.output).write(&framed);
    }
}

impl io::Write for WebsocketWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sends messages to a websocket connection from outside its handler.
///
/// Frames are queued on the owning reactor's outbox, so a sender can be kept
/// and used from any thread.
#[derive(Debug, Clone)]
pub struct WebsocketSender {
    context: SessionContext,
    max_fragment_size: usize,
}

impl WebsocketSender {
    pub fn new(context: SessionContext, max_fragment_size: usize) -> Self {
        Self { context, max_fragment_size }
    }

    pub fn key(&self) -> Option<SessionKey> {
        self.context.key()
    }

    /// Returns false if the connection is not attached to a reactor.
    pub fn send_text(&self, text: &str) -> bool {
        self.send(MessageKind::Text, text.as_bytes())
    }

    pub fn send_binary(&self, data: &[u8]) -> bool {
        self.send(MessageKind::Binary, data)
    }

    fn send(&self, kind: MessageKind, data: &[u8]) -> bool {
        let mut framed = BytesMut::new();
        encode_message(kind, data, self.max_fragment_size, &mut framed);
        self.context.send(Bytes::from(framed))
    }
}
