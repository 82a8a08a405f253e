//! Variable-width length prefixes
//!
//! ```text
//! length < 255          : [len]                              1 byte
//! length < 65535        : 0xFF [len u16 BE]                  3 bytes
//! otherwise             : 0xFF 0xFF 0xFF [len u32 BE]        7 bytes
//! ```
//!
//! A single 0xFF can never be a short length and a u16 of 0xFFFF can never be
//! a medium length, so each sentinel unambiguously announces the wider form.

use super::errors::{CodecError, CodecResult};

/// Sentinel byte announcing a wider length field
pub const LENGTH_SENTINEL: u8 = 0xFF;

/// Largest number of bytes a length prefix can occupy
pub const MAX_LENGTH_PREFIX: usize = 7;

const SHORT_LIMIT: u32 = 0xFF;
const MEDIUM_LIMIT: u32 = 0xFFFF;

/// Returns the number of bytes `write_length` emits for `length`
pub fn encoded_len(length: u32) -> usize {
    if length < SHORT_LIMIT {
        1
    } else if length < MEDIUM_LIMIT {
        3
    } else {
        MAX_LENGTH_PREFIX
    }
}

/// Append the length prefix for `length` to `out`.
pub fn write_length(length: u32, out: &mut Vec<u8>) {
    if length < SHORT_LIMIT {
        out.push(length as u8);
        return;
    }

    out.push(LENGTH_SENTINEL);

    if length < MEDIUM_LIMIT {
        out.extend_from_slice(&(length as u16).to_be_bytes());
        return;
    }

    out.extend_from_slice(&(MEDIUM_LIMIT as u16).to_be_bytes());
    out.extend_from_slice(&length.to_be_bytes());
}

/// Read a length prefix written by [`write_length`], advancing the cursor past it.
pub fn read_length(cursor: &mut ByteCursor<'_>) -> CodecResult<u32> {
    let start = cursor.position();

    let first = cursor.read_u8().map_err(|_| truncated(start, 1, cursor))?;
    if first != LENGTH_SENTINEL {
        return Ok(u32::from(first));
    }

    let medium = cursor.read_u16().map_err(|_| truncated(start, 3, cursor))?;
    if u32::from(medium) != MEDIUM_LIMIT {
        return Ok(u32::from(medium));
    }

    cursor
        .read_u32()
        .map_err(|_| truncated(start, MAX_LENGTH_PREFIX, cursor))
}

fn truncated(offset: usize, needed: usize, cursor: &ByteCursor<'_>) -> CodecError {
    CodecError::TruncatedLength {
        offset,
        needed,
        remaining: cursor.len() - offset,
    }
}

/// Borrowed read cursor over an encoded buffer.
///
/// Reads never panic; a read past the end leaves the position untouched and
/// returns an error.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total buffer length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the cursor and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Take the next `n` bytes
    pub fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(CodecError::invalid_element(format!(
                "read of {} bytes at offset {} exceeds {} remaining",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
