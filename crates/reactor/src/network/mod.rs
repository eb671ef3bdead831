//! Sessions and the reactor that drives them.
//!
//! - [`Session`]: one connection's socket, buffers and idle clock
//! - [`SessionHandler`]: the protocol state machine owning a session
//! - [`Reactor`]: accepts connections, dispatches readiness, evicts failed or
//!   idle sessions
//! - [`Handoff`]: moves handlers between reactors, possibly across threads
//! - [`Outbox`]: carries output produced off the I/O path back to its session

mod arena;
mod error;
mod handoff;
mod outbox;
mod reactor;
mod session;

pub use arena::SessionKey;
pub use error::SessionError;
pub use handoff::Handoff;
pub use outbox::Outbox;
pub use reactor::{Allocator, Reactor};
pub use session::{Handled, Session, SessionContext, SessionHandler};
