//! WebSocket framing and message assembly on top of an upgraded session.
//!
//! [`handshake`] turns an HTTP upgrade request into the `101` answer,
//! [`WebsocketSessionHandler`] then owns the session: it parses
//! [`Frame`]s, joins fragments into messages and passes them to a
//! [`WebsocketListener`]. Outgoing messages are fragmented at the configured
//! max fragment size.

mod frame;
pub mod handshake;
mod session_handler;
mod writer;

pub use frame::{Frame, FrameHeader, FrameState, OpCode, apply_mask};
pub use session_handler::{WebsocketListener, WebsocketSessionHandler};
pub use writer::{MessageKind, WebsocketSender, WebsocketWriter, encode_message};
