//! Wire protocols spoken over a [`Session`](crate::network::Session).
//!
//! - [`http`]: HTTP/1.1 request parsing, response serialization and the
//!   session handler dispatching completed requests
//! - [`websocket`]: frame codec, message assembly and the opening handshake
//!
//! Both report violations as [`ParseError`], which evicts the connection.

mod error;
pub use error::ParseError;

pub mod http;
pub mod websocket;
