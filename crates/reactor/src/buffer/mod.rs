//! Chunked byte buffer used for every session's input and output.
//!
//! A [`Buffer`] is an ordered sequence of fixed-capacity chunks. Bytes are
//! appended through a [`BufferWriter`] and consumed through a [`BufferReader`];
//! neither view owns the buffer, they only borrow it for the duration of one
//! read or write attempt.
//!
//! # Layout
//!
//! ```text
//!   read_index                                   write_index
//!       │                                             │
//!   ┌───▼────────┐   ┌────────────┐   ┌───────────────▼┐
//!   │..##########│──▶│############│──▶│#########.......│
//!   └────────────┘   └────────────┘   └────────────────┘
//!    first chunk       full chunks       last chunk
//! ```
//!
//! - every chunk except the last one is completely filled
//! - `write_index` is the write offset into the last chunk
//! - `read_index` is the read offset into the first chunk
//! - the buffer is empty iff it holds one chunk and `read_index == write_index`
//!
//! # Speculative reads
//!
//! A reader records a checkpoint when it is created. Protocol parsers read as
//! far as they can; when a unit (a header block, a frame header) turns out to be
//! incomplete they call [`BufferReader::revert`] and retry once more bytes
//! arrive. [`BufferReader::finalize`] commits the consumed bytes and releases the
//! chunks that were fully read. Dropping a reader finalizes it.

mod reader;
mod writer;

use std::collections::VecDeque;

use bytes::BytesMut;
use thiserror::Error;

pub use reader::BufferReader;
pub use writer::BufferWriter;

/// Default capacity of a single chunk in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// The buffer ran out of bytes before the requested unit was complete.
///
/// The reader position is left untouched, callers retry after the next read.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("buffer exhausted before the delimiter was found")]
pub struct Incomplete;

/// An ordered list of fixed size chunks holding a connection's bytes.
#[derive(Debug)]
pub struct Buffer {
    chunks: VecDeque<BytesMut>,
    chunk_size: usize,
    /// write offset into the last chunk
    write_index: usize,
    /// read offset into the first chunk
    read_index: usize,
}

impl Buffer {
    /// Creates a buffer whose chunks hold [`DEFAULT_CHUNK_SIZE`] bytes.
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Creates a buffer whose chunks hold `chunk_size` bytes.
    ///
    /// A chunk size of zero is raised to one.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        let mut buffer = Self { chunks: VecDeque::with_capacity(4), chunk_size: chunk_size.max(1), write_index: 0, read_index: 0 };
        buffer.allocate_chunk();
        buffer
    }

    /// Returns true if there is nothing left to read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.len() == 1 && self.read_index == self.write_index
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        match self.chunks.len() {
            0 => 0,
            1 => self.write_index - self.read_index,
            n => (self.chunk_size - self.read_index) + (n - 2) * self.chunk_size + self.write_index,
        }
    }

    /// Capacity of one chunk.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks currently allocated.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Drops every byte, keeping a single empty chunk.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.read_index = 0;
        self.write_index = 0;
        self.allocate_chunk();
    }

    /// Appends an empty chunk at the back.
    fn allocate_chunk(&mut self) {
        self.chunks.push_back(BytesMut::zeroed(self.chunk_size));
    }

    /// Readable bytes of the chunk at `chunk`, starting at `offset`.
    fn readable(&self, chunk: usize, offset: usize) -> &[u8] {
        let end = if chunk + 1 == self.chunks.len() { self.write_index } else { self.chunk_size };
        match self.chunks.get(chunk) {
            Some(bytes) if offset < end => &bytes[offset..end],
            _ => &[],
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_empty() {
        let buffer = Buffer::with_chunk_size(8);
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.chunk_count(), 1);
    }

    #[test]
    fn len_spans_chunks() {
        let mut buffer = Buffer::with_chunk_size(4);
        BufferWriter::new(&mut buffer).write(b"0123456789");
        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(buffer.len(), 10);

        let mut out = [0u8; 5];
        let mut reader = BufferReader::new(&mut buffer);
        assert_eq!(reader.get_bytes(&mut out), 5);
        reader.finalize();
        drop(reader);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.chunk_count(), 2);
    }

    #[test]
    fn clear_keeps_one_chunk() {
        let mut buffer = Buffer::with_chunk_size(4);
        BufferWriter::new(&mut buffer).write(b"0123456789");
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.chunk_count(), 1);
    }

    #[test]
    fn zero_chunk_size_is_raised() {
        let mut buffer = Buffer::with_chunk_size(0);
        BufferWriter::new(&mut buffer).write(b"abc");
        assert_eq!(buffer.chunk_size(), 1);
        assert_eq!(buffer.len(), 3);
    }
}
