//! HTTP/1.1 request parsing and response serialization.
//!
//! [`HttpSessionHandler`] runs the per connection state machine
//!
//! ```text
//! AwaitHeader ──▶ AwaitBody ──▶ Complete ──▶ AwaitHeader
//!      └──────────────────────────▲
//!          (no body expected)
//! ```
//!
//! Only `Content-Length` delimited bodies are supported, a request using
//! `Transfer-Encoding` is a protocol violation.

mod method;
mod request;
mod response;
mod session_handler;
mod status;

pub use method::Method;
pub use request::HttpRequest;
pub use response::{HttpResponse, ResponseError};
pub use session_handler::{HttpSessionHandler, ParseState, RequestCallback, Responder, Upgrader};
pub use status::reason_phrase;
