use std::io;
use std::io::{ErrorKind, Read};

use super::Buffer;

/// Appends bytes to the back of a [`Buffer`].
#[derive(Debug)]
pub struct BufferWriter<'a> {
    buffer: &'a mut Buffer,
}

impl<'a> BufferWriter<'a> {
    pub fn new(buffer: &'a mut Buffer) -> Self {
        Self { buffer }
    }

    /// Reads from `src` until it would block or a read comes back short.
    ///
    /// Every time the last chunk fills up a new one is allocated and reading
    /// continues. A zero length read means the peer closed the connection and is
    /// reported as [`ErrorKind::UnexpectedEof`], after keeping whatever was read
    /// before it.
    ///
    /// Returns the number of bytes received.
    pub fn receive_from<R: Read>(&mut self, src: &mut R) -> io::Result<usize> {
        let mut received = 0;
        loop {
            let chunk_size = self.buffer.chunk_size;
            let write_index = self.buffer.write_index;
            let Some(last) = self.buffer.chunks.back_mut() else {
                self.buffer.allocate_chunk();
                continue;
            };

            match src.read(&mut last[write_index..chunk_size]) {
                Ok(0) => return Err(io::Error::new(ErrorKind::UnexpectedEof, "peer closed the connection")),
                Ok(n) => {
                    received += n;
                    self.buffer.write_index += n;
                    if self.buffer.write_index != chunk_size {
                        // short read, nothing more for now
                        return Ok(received);
                    }
                    self.buffer.allocate_chunk();
                    self.buffer.write_index = 0;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(received),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Copies `src` into the buffer, allocating chunks as needed.
    pub fn write(&mut self, mut src: &[u8]) {
        let chunk_size = self.buffer.chunk_size;
        while !src.is_empty() {
            let write_index = self.buffer.write_index;
            let Some(last) = self.buffer.chunks.back_mut() else {
                self.buffer.allocate_chunk();
                continue;
            };

            let count = (chunk_size - write_index).min(src.len());
            last[write_index..write_index + count].copy_from_slice(&src[..count]);
            self.buffer.write_index += count;
            src = &src[count..];

            if self.buffer.write_index == chunk_size {
                self.buffer.allocate_chunk();
                self.buffer.write_index = 0;
            }
        }
    }

    /// Copies the UTF-8 bytes of `s` into the buffer.
    #[inline]
    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }
}
