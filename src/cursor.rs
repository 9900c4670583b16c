//! Positioned byte reader and writer.
//!
//! The reader walks an immutable byte view with forward and backward search
//! and the small set of line/keyword/number primitives the cross-reference
//! parsers need. The writer appends to a growing buffer and reports its
//! absolute position, which may start past zero when a revision is appended
//! after earlier ones.

use crate::error::{Error, Result};
use crate::lexer::is_whitespace;

/// Reader over a borrowed byte view.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at `pos`.
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Current absolute position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute position.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    /// The whole underlying view.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Bytes from the current position to the end.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// Whether the reader is at the end of the view.
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Byte at the current position.
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read one byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        let b = self.peek().ok_or(Error::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    /// Read exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(Error::UnexpectedEof)?;
        let slice = self.data.get(self.pos..end).ok_or(Error::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    /// Skip PDF whitespace and `%` comments.
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Skip a single end-of-line marker (CRLF, LF or CR) if present.
    pub fn skip_eol(&mut self) {
        if self.remaining().starts_with(b"\r\n") {
            self.pos += 2;
        } else if matches!(self.peek(), Some(b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// Whether the remaining bytes start with `keyword`.
    pub fn starts_with(&self, keyword: &[u8]) -> bool {
        self.remaining().starts_with(keyword)
    }

    /// Consume `keyword` or fail with [`Error::BadChar`].
    pub fn expect_keyword(&mut self, keyword: &[u8]) -> Result<()> {
        if self.starts_with(keyword) {
            self.pos += keyword.len();
            return Ok(());
        }
        let found_len = keyword.len().min(self.remaining().len());
        Err(Error::BadChar {
            offset: self.pos,
            expected: String::from_utf8_lossy(keyword).into_owned(),
            found: String::from_utf8_lossy(&self.remaining()[..found_len]).into_owned(),
        })
    }

    /// Read an unsigned decimal integer.
    pub fn read_uint(&mut self) -> Result<u64> {
        let start = self.pos;
        let mut value: u64 = 0;
        while let Some(b @ b'0'..=b'9') = self.peek() {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add((b - b'0') as u64))
                .ok_or_else(|| Error::parse(start, "integer overflow"))?;
            self.pos += 1;
        }
        if self.pos == start {
            return Err(Error::parse(start, "expected digits"));
        }
        Ok(value)
    }

    /// Read up to (not including) the next EOL and consume the EOL.
    pub fn read_line(&mut self) -> &'a [u8] {
        let rest = self.remaining();
        let len = rest
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .unwrap_or(rest.len());
        self.pos += len;
        self.skip_eol();
        &rest[..len]
    }

    /// Offset of the first occurrence of `needle` at or after the position.
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(self.pos);
        }
        self.remaining()
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|p| self.pos + p)
    }

    /// Offset of the last occurrence of `needle` that starts before the position.
    pub fn find_backward(&self, needle: &[u8]) -> Option<usize> {
        let end = self.pos.min(self.data.len());
        if needle.is_empty() || needle.len() > end {
            return None;
        }
        self.data[..end]
            .windows(needle.len())
            .rposition(|w| w == needle)
    }
}

/// Append-only writer that tracks absolute offsets.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    base: usize,
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Writer whose first byte lands at absolute offset `base`.
    pub fn new(base: usize) -> Self {
        Self {
            base,
            buf: Vec::new(),
        }
    }

    /// Absolute offset of the next byte.
    pub fn position(&self) -> usize {
        self.base + self.buf.len()
    }

    /// Append raw bytes.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a string.
    pub fn write_str(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Mutable access to the underlying buffer.
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finish and return the written bytes.
    pub fn into_bytes(self) -> bytes::Bytes {
        bytes::Bytes::from(self.buf)
    }
}
