use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use super::panic_message;

type Callback = Box<dyn FnOnce() + Send>;

/// A FIFO of zero-argument callbacks with many producers and one consumer.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct EventQueue {
    callbacks: Arc<Mutex<VecDeque<Callback>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `callback`, it runs on the next [`poll`](EventQueue::poll).
    pub fn add_immediate<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.callbacks.lock().push_back(Box::new(callback));
    }

    /// Runs callbacks until the queue is empty, including ones queued meanwhile.
    ///
    /// The lock is released before each callback runs. A panicking callback is
    /// logged and does not stop the drain.
    ///
    /// Returns true if at least one callback ran.
    pub fn poll(&self) -> bool {
        let mut ran = false;
        loop {
            let Some(callback) = self.callbacks.lock().pop_front() else {
                break;
            };
            ran = true;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                error!(cause = panic_message(payload.as_ref()), "event callback panicked");
            }
        }
        ran
    }

    /// Number of callbacks waiting.
    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue").field("pending", &self.len()).finish()
    }
}
