use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::SessionHandler;

/// Transfer queue of handlers moving into a reactor from another thread.
///
/// The lock is only held to push or to take the whole queue, never while a
/// handler runs.
#[derive(Clone, Default)]
pub struct Handoff {
    handlers: Arc<Mutex<VecDeque<Box<dyn SessionHandler>>>>,
}

impl Handoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, handler: Box<dyn SessionHandler>) {
        self.handlers.lock().push_back(handler);
    }

    pub fn drain(&self) -> VecDeque<Box<dyn SessionHandler>> {
        std::mem::take(&mut *self.handlers.lock())
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }
}

impl fmt::Debug for Handoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff").field("pending", &self.len()).finish()
    }
}
