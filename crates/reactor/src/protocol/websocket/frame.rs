//! WebSocket frame layout (RFC 6455 section 5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use bytes::{BufMut, BytesMut};

use crate::buffer::BufferReader;
use crate::protocol::ParseError;

/// Payload buffers never reserve more than this up front.
const MAX_RESERVE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(ParseError::UnknownOpcode(other)),
        }
    }
}

/// XORs `payload` with `key`, where `payload[0]` is byte `offset` of the frame payload.
///
/// Applying the same key twice restores the input.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4], offset: usize) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[(offset + i) % 4];
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv: [bool; 3],
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload_length: u64,
}

impl FrameHeader {
    /// An unmasked header, as sent by a server.
    pub fn new(opcode: OpCode, fin: bool, payload_length: u64) -> Self {
        Self { fin, rsv: [false; 3], opcode, mask: None, payload_length }
    }

    /// Reads a header, `Ok(None)` with the reader reverted if it is incomplete.
    pub fn parse_from(reader: &mut BufferReader<'_>) -> Result<Option<Self>, ParseError> {
        let mut head = [0u8; 2];
        if reader.get_bytes(&mut head) != head.len() {
            reader.revert();
            return Ok(None);
        }

        let fin = head[0] & 0x80 != 0;
        let rsv = [head[0] & 0x40 != 0, head[0] & 0x20 != 0, head[0] & 0x10 != 0];
        let opcode = OpCode::try_from(head[0] & 0x0f)?;
        let masked = head[1] & 0x80 != 0;

        let payload_length = match head[1] & 0x7f {
            126 => {
                let mut extended = [0u8; 2];
                if reader.get_bytes(&mut extended) != extended.len() {
                    reader.revert();
                    return Ok(None);
                }
                u64::from(u16::from_be_bytes(extended))
            }
            127 => {
                let mut extended = [0u8; 8];
                if reader.get_bytes(&mut extended) != extended.len() {
                    reader.revert();
                    return Ok(None);
                }
                u64::from_be_bytes(extended)
            }
            length => u64::from(length),
        };

        let mask = if masked {
            let mut key = [0u8; 4];
            if reader.get_bytes(&mut key) != key.len() {
                reader.revert();
                return Ok(None);
            }
            Some(key)
        } else {
            None
        };

        Ok(Some(Self { fin, rsv, opcode, mask, payload_length }))
    }

    /// Writes the header using the shortest length encoding.
    pub fn encode(&self, dst: &mut BytesMut) {
        let mut first = self.opcode.as_u8();
        if self.fin {
            first |= 0x80;
        }
        for (bit, set) in [0x40, 0x20, 0x10].into_iter().zip(self.rsv) {
            if set {
                first |= bit;
            }
        }
        let mask_bit = if self.mask.is_some() { 0x80 } else { 0 };

        dst.reserve(14);
        dst.put_u8(first);
        match self.payload_length {
            length @ 0..=125 => dst.put_u8(mask_bit | length as u8),
            length @ 126..=0xffff => {
                dst.put_u8(mask_bit | 126);
                dst.put_u16(length as u16);
            }
            length => {
                dst.put_u8(mask_bit | 127);
                dst.put_u64(length);
            }
        }
        if let Some(key) = self.mask {
            dst.put_slice(&key);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    AwaitHeader,
    AwaitPayload,
    Complete,
}

/// One frame being read, resumable across reads.
///
/// The reader is finalized once the header is complete and after every
/// payload read, so an interrupted frame resumes exactly where it stopped.
/// Payload bytes are unmasked as they arrive.
#[derive(Debug)]
pub struct Frame {
    state: FrameState,
    header: Option<FrameHeader>,
    expected: usize,
    payload: BytesMut,
}

impl Frame {
    pub fn new() -> Self {
        Self { state: FrameState::AwaitHeader, header: None, expected: 0, payload: BytesMut::new() }
    }

    pub fn parse_from(&mut self, reader: &mut BufferReader<'_>) -> Result<FrameState, ParseError> {
        if self.state == FrameState::AwaitHeader {
            let Some(header) = FrameHeader::parse_from(reader)? else {
                return Ok(self.state);
            };
            self.expected = usize::try_from(header.payload_length)
                .map_err(|_overflow| ParseError::FrameTooLarge { length: header.payload_length })?;
            self.payload.clear();
            self.payload.reserve(self.expected.min(MAX_RESERVE));
            self.header = Some(header);
            self.state = FrameState::AwaitPayload;
            reader.finalize();
        }

        if self.state == FrameState::AwaitPayload {
            let start = self.payload.len();
            reader.read_into(&mut self.payload, self.expected - start);
            if let Some(key) = self.header.and_then(|header| header.mask) {
                apply_mask(&mut self.payload[start..], key, start);
            }
            reader.finalize();
            if self.payload.len() == self.expected {
                self.state = FrameState::Complete;
            }
        }

        Ok(self.state)
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn header(&self) -> Option<&FrameHeader> {
        self.header.as_ref()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn take_payload(&mut self) -> BytesMut {
        self.payload.split()
    }

    /// Prepares for the next frame.
    pub fn reset(&mut self) {
        self.state = FrameState::AwaitHeader;
        self.header = None;
        self.expected = 0;
        self.payload.clear();
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, BufferWriter};

    fn buffer_of(bytes: &[u8]) -> Buffer {
        let mut buffer = Buffer::with_chunk_size(8);
        BufferWriter::new(&mut buffer).write(bytes);
        buffer
    }

    fn masked_frame(opcode: OpCode, fin: bool, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        let mut header = FrameHeader::new(opcode, fin, payload.len() as u64);
        header.mask = Some(key);
        let mut dst = BytesMut::new();
        header.encode(&mut dst);
        let mut masked = payload.to_vec();
        apply_mask(&mut masked, key, 0);
        dst.extend_from_slice(&masked);
        dst.to_vec()
    }

    #[test]
    fn mask_is_self_inverse() {
        let original: Vec<u8> = (0..=255u8).collect();
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let mut data = original.clone();
        apply_mask(&mut data, key, 0);
        assert_ne!(data, original);
        apply_mask(&mut data, key, 0);
        assert_eq!(data, original);
    }

    #[test]
    fn mask_with_offset_matches_whole() {
        let key = [1, 2, 3, 4];
        let mut whole = b"Hello, masked world".to_vec();
        apply_mask(&mut whole, key, 0);

        let mut split = b"Hello, masked world".to_vec();
        let (head, tail) = split.split_at_mut(7);
        apply_mask(head, key, 0);
        apply_mask(tail, key, 7);
        assert_eq!(split, whole);
    }

    #[test]
    fn parse_rfc_masked_hello() {
        // single-frame masked text message from RFC 6455 section 5.7
        let bytes = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        let mut buffer = buffer_of(&bytes);
        let mut reader = BufferReader::new(&mut buffer);
        let mut frame = Frame::new();

        assert_eq!(frame.parse_from(&mut reader).unwrap(), FrameState::Complete);
        let header = frame.header().unwrap();
        assert!(header.fin);
        assert_eq!(header.opcode, OpCode::Text);
        assert_eq!(frame.payload(), b"Hello");
    }

    #[test]
    fn incomplete_header_reverts() {
        for bytes in [&[0x81][..], &[0x82, 0x7e, 0x01], &[0x82, 0x7f, 0, 0, 0, 0], &[0x81, 0x85, 0x37, 0xfa]] {
            let mut buffer = buffer_of(bytes);
            let mut reader = BufferReader::new(&mut buffer);
            assert_eq!(FrameHeader::parse_from(&mut reader).unwrap(), None);
            assert_eq!(reader.remaining(), bytes.len());
        }
    }

    #[test]
    fn extended_lengths() {
        for length in [0u64, 125, 126, 300, 0xffff, 0x10000, 70_000] {
            let mut dst = BytesMut::new();
            FrameHeader::new(OpCode::Binary, true, length).encode(&mut dst);
            let expected_len = match length {
                0..=125 => 2,
                126..=0xffff => 4,
                _ => 10,
            };
            assert_eq!(dst.len(), expected_len, "length={length}");

            let mut buffer = buffer_of(&dst);
            let mut reader = BufferReader::new(&mut buffer);
            let header = FrameHeader::parse_from(&mut reader).unwrap().unwrap();
            assert_eq!(header.payload_length, length);
        }
    }

    #[test]
    fn sixty_four_bit_length_reads_all_eight_bytes() {
        let mut bytes = vec![0x82, 0x7f];
        bytes.extend_from_slice(&70_000u64.to_be_bytes());
        let mut buffer = buffer_of(&bytes);
        let mut reader = BufferReader::new(&mut buffer);
        let header = FrameHeader::parse_from(&mut reader).unwrap().unwrap();
        assert_eq!(header.payload_length, 70_000);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let mut buffer = buffer_of(&[0x83, 0x00]);
        let mut reader = BufferReader::new(&mut buffer);
        assert_eq!(FrameHeader::parse_from(&mut reader), Err(ParseError::UnknownOpcode(0x3)));
    }

    #[test]
    fn payload_resumes_across_reads() {
        let payload: Vec<u8> = (0..200u8).collect();
        let key = [9, 8, 7, 6];
        let bytes = masked_frame(OpCode::Binary, true, &payload, key);

        let mut buffer = Buffer::with_chunk_size(8);
        let mut frame = Frame::new();
        for part in bytes.chunks(13) {
            BufferWriter::new(&mut buffer).write(part);
            let mut reader = BufferReader::new(&mut buffer);
            frame.parse_from(&mut reader).unwrap();
        }

        assert_eq!(frame.state(), FrameState::Complete);
        assert_eq!(frame.payload(), &payload[..]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn reset_prepares_next_frame() {
        let mut bytes = masked_frame(OpCode::Text, true, b"one", [1, 1, 1, 1]);
        bytes.extend(masked_frame(OpCode::Ping, true, b"", [2, 2, 2, 2]));
        let mut buffer = buffer_of(&bytes);
        let mut reader = BufferReader::new(&mut buffer);
        let mut frame = Frame::new();

        assert_eq!(frame.parse_from(&mut reader).unwrap(), FrameState::Complete);
        assert_eq!(frame.take_payload(), &b"one"[..]);
        frame.reset();

        assert_eq!(frame.parse_from(&mut reader).unwrap(), FrameState::Complete);
        assert_eq!(frame.header().unwrap().opcode, OpCode::Ping);
        assert!(frame.payload().is_empty());
    }
}
