//! In-memory counterparts of the file I/O traits.
//!
//! The directory tree of a Respawn VPK is read into memory in one piece and
//! emitted into one piece, so the tree codec and the post-bake validator
//! work on byte slices rather than file handles.

use super::Result;

use std::io::{Error as IoError, ErrorKind};

fn eof() -> super::Error {
    super::Error::Io(IoError::new(
        ErrorKind::UnexpectedEof,
        "unexpected end of buffer",
    ))
}

/// A little-endian cursor over a byte slice.
///
/// Tracks its position so callers can record absolute offsets (the reader
/// needs the offset of inline preload payloads within the dir archive).
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current cursor position from the start of the slice.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or_else(eof)?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b: [u8; 2] = self.read_array()?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let b: [u8; 3] = self.read_array()?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b: [u8; 4] = self.read_array()?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b: [u8; 8] = self.read_array()?;
        Ok(u64::from_le_bytes(b))
    }

    /// Reads a null-terminated string.
    pub fn read_string(&mut self) -> Result<String> {
        let mut str = Vec::new();
        loop {
            let b = self.read_u8()?;
            if b == 0 {
                break;
            }
            str.push(b);
        }

        String::from_utf8(str).map_err(super::Error::Utf8)
    }

    /// Reads exactly `count` bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(eof());
        }
        let out = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(out)
    }

    /// Skips `count` bytes.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        if self.remaining() < count {
            return Err(eof());
        }
        self.pos += count;
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut b = [0u8; N];
        b.copy_from_slice(self.read_bytes(N)?);
        Ok(b)
    }
}

/// A little-endian growable output buffer.
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer, returning the bytes written so far.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, val: u8) {
        self.buf.push(val);
    }

    pub fn write_u16(&mut self, val: u16) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u24(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_le_bytes()[0..3]);
    }

    pub fn write_u32(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u64(&mut self, val: u64) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    /// Writes a string followed by a null terminator.
    pub fn write_string(&mut self, str: &str) {
        self.buf.extend_from_slice(str.as_bytes());
        self.buf.push(0);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}
