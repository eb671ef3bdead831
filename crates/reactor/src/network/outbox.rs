use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::SessionKey;

/// Bytes produced outside the I/O path, waiting to be written to a session.
///
/// Any thread may push, the owning reactor drains it once per loop iteration
/// and appends each item to the addressed session's output buffer. Items for a
/// session that is gone by then are discarded.
#[derive(Clone, Default)]
pub struct Outbox {
    items: Arc<Mutex<VecDeque<(SessionKey, Bytes)>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, key: SessionKey, bytes: Bytes) {
        self.items.lock().push_back((key, bytes));
    }

    pub fn drain(&self) -> VecDeque<(SessionKey, Bytes)> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl fmt::Debug for Outbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox").field("pending", &self.len()).finish()
    }
}
