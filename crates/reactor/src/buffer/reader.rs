use std::io;
use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use super::{Buffer, Incomplete};

/// A consuming view over a [`Buffer`] with a rewindable checkpoint.
///
/// The checkpoint is the buffer's committed read position at construction (and
/// after every [`finalize`](BufferReader::finalize)). Reading only moves the
/// reader's own cursor, nothing is released until the reader is finalized.
#[derive(Debug)]
pub struct BufferReader<'a> {
    buffer: &'a mut Buffer,
    /// chunk index of the cursor, relative to the buffer's first chunk
    chunk: usize,
    /// offset of the cursor inside `chunk`
    offset: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(buffer: &'a mut Buffer) -> Self {
        let offset = buffer.read_index;
        Self { buffer, chunk: 0, offset }
    }

    /// Reads one line into `out`, without the `\n` and without one trailing `\r`.
    ///
    /// A bare `\n` produces an empty line. When no `\n` is buffered the call
    /// fails with [`Incomplete`], `out` is left untouched and so is the cursor.
    pub fn getline(&mut self, out: &mut String) -> Result<(), Incomplete> {
        let (mut chunk, mut offset) = (self.chunk, self.offset);
        let mut line = Vec::new();

        loop {
            (chunk, offset) = self.normalized(chunk, offset);
            let readable = self.buffer.readable(chunk, offset);
            if readable.is_empty() {
                return Err(Incomplete);
            }

            match readable.iter().position(|&b| b == b'\n') {
                Some(index) => {
                    line.extend_from_slice(&readable[..index]);
                    offset += index + 1;
                    break;
                }
                None => {
                    line.extend_from_slice(readable);
                    offset += readable.len();
                }
            }
        }

        if line.last() == Some(&b'\r') {
            line.pop();
        }

        out.clear();
        out.push_str(&String::from_utf8_lossy(&line));
        self.chunk = chunk;
        self.offset = offset;
        Ok(())
    }

    /// Copies up to `dest.len()` bytes into `dest`, returning how many were copied.
    pub fn get_bytes(&mut self, dest: &mut [u8]) -> usize {
        let mut acquired = 0;
        while acquired < dest.len() {
            self.normalize();
            let readable = self.buffer.readable(self.chunk, self.offset);
            if readable.is_empty() {
                break;
            }
            let count = readable.len().min(dest.len() - acquired);
            dest[acquired..acquired + count].copy_from_slice(&readable[..count]);
            acquired += count;
            self.offset += count;
        }
        acquired
    }

    /// Appends up to `count` bytes to `dest`, returning how many were appended.
    pub fn read_into(&mut self, dest: &mut BytesMut, count: usize) -> usize {
        let mut acquired = 0;
        while acquired < count {
            self.normalize();
            let readable = self.buffer.readable(self.chunk, self.offset);
            if readable.is_empty() {
                break;
            }
            let n = readable.len().min(count - acquired);
            dest.extend_from_slice(&readable[..n]);
            acquired += n;
            self.offset += n;
        }
        acquired
    }

    /// Writes as many unread bytes as `dst` accepts.
    ///
    /// Returns `Ok(true)` when bytes remain because `dst` would block or took a
    /// short write, `Ok(false)` once everything was sent. Only the bytes actually
    /// accepted are consumed.
    pub fn send_to<W: Write>(&mut self, dst: &mut W) -> io::Result<bool> {
        loop {
            self.normalize();
            let readable = self.buffer.readable(self.chunk, self.offset);
            let len = readable.len();
            if len == 0 {
                return Ok(false);
            }

            match dst.write(readable) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.offset += n;
                    if n < len {
                        return Ok(true);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Number of bytes between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        let count = self.buffer.chunks.len();
        if self.chunk + 1 >= count {
            return self.buffer.write_index.saturating_sub(self.offset);
        }
        let chunk_size = self.buffer.chunk_size;
        (chunk_size - self.offset) + (count - self.chunk - 2) * chunk_size + self.buffer.write_index
    }

    /// Rewinds the cursor to the checkpoint.
    pub fn revert(&mut self) {
        self.chunk = 0;
        self.offset = self.buffer.read_index;
    }

    /// Commits the cursor as the new checkpoint and releases consumed chunks.
    ///
    /// Calling it twice in a row is a no-op the second time.
    pub fn finalize(&mut self) {
        self.normalize();
        for _ in 0..self.chunk {
            self.buffer.chunks.pop_front();
        }
        self.chunk = 0;

        if self.buffer.chunks.len() == 1 && self.offset == self.buffer.write_index {
            // fully drained, reuse the chunk from the start
            self.offset = 0;
            self.buffer.write_index = 0;
        }
        self.buffer.read_index = self.offset;
    }

    fn normalize(&mut self) {
        (self.chunk, self.offset) = self.normalized(self.chunk, self.offset);
    }

    /// Moves a cursor sitting at the end of a full chunk to the start of the next.
    fn normalized(&self, mut chunk: usize, mut offset: usize) -> (usize, usize) {
        while offset >= self.buffer.chunk_size && chunk + 1 < self.buffer.chunks.len() {
            chunk += 1;
            offset = 0;
        }
        (chunk, offset)
    }
}

impl Drop for BufferReader<'_> {
    fn drop(&mut self) {
        self.finalize();
    }
}
