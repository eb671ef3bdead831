use micro_reactor::buffer::{Buffer, BufferWriter};

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    file: TestFile,
}

impl TestCase {
    pub fn new(name: &'static str, file: TestFile) -> Self {
        Self { name, file }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }
}

/// Wire bytes of one benchmark input.
#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static [u8],
}

impl TestFile {
    pub const fn new(file_name: &'static str, content: &'static [u8]) -> Self {
        Self { file_name, content }
    }

    pub fn content(&self) -> &'static [u8] {
        self.content
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }

    /// A buffer of `chunk_size` chunks holding the whole file.
    pub fn to_buffer(&self, chunk_size: usize) -> Buffer {
        let mut buffer = Buffer::with_chunk_size(chunk_size);
        BufferWriter::new(&mut buffer).write(self.content);
        buffer
    }
}
