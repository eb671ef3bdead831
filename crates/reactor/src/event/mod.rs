//! Deferred execution: a FIFO microtask queue and a promise chained on top of it.
//!
//! [`EventQueue`] callbacks may be pushed from any thread but only run on the
//! thread that calls [`EventQueue::poll`]. [`Promise`] settles through the same
//! queue, so a continuation never runs from inside `resolve`.

mod event_queue;
mod promise;

use std::any::Any;
use std::error::Error;

pub use event_queue::EventQueue;
pub use promise::{Promise, PromiseState, Reject, Resolve};

/// Error type carried by failed promises.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Best effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
