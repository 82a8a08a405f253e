//! Variable-length array codec
//!
//! An array is stored as one of three mutually exclusive forms:
//!
//! ```text
//! (no bytes)                          null array
//! 0xFF                                empty array
//! len|value|len|value|...|len|value   content, no terminator
//! ```
//!
//! Each `len` is a prefix from [`super::length`]. Elements are delimited by
//! their explicit lengths, never by separator bytes, so `[a, b]` cannot be
//! misread as `[ab]`. A lone 0xFF cannot be content: it would be the start of
//! a 3-byte length prefix with nothing behind it.

use super::element::{ComparatorType, ElementCodec};
use super::errors::{CodecError, CodecResult};
use super::length::{read_length, write_length, ByteCursor, LENGTH_SENTINEL, MAX_LENGTH_PREFIX};

/// Codec for arrays of values handled by an inner [`ElementCodec`].
#[derive(Debug, Clone, Default)]
pub struct ArrayCodec<C> {
    inner: C,
}

impl<C: ElementCodec> ArrayCodec<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    /// The codec used for each element
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Append the encoding of `values` to `out`.
    pub fn encode_array(&self, values: Option<&[C::Value]>, out: &mut Vec<u8>) -> CodecResult<()> {
        let values = match values {
            None => return Ok(()),
            Some(v) => v,
        };

        if values.is_empty() {
            out.push(LENGTH_SENTINEL);
            return Ok(());
        }

        // Scratch buffer reused across elements; grows to the largest element.
        let mut scratch = Vec::new();

        for value in values {
            scratch.clear();
            self.inner.encode(value, &mut scratch)?;

            let length = u32::try_from(scratch.len()).map_err(|_| {
                CodecError::invalid_element(format!(
                    "element of {} bytes exceeds the maximum encodable length",
                    scratch.len()
                ))
            })?;

            out.reserve(scratch.len() + MAX_LENGTH_PREFIX);
            write_length(length, out);
            out.extend_from_slice(&scratch);
        }

        Ok(())
    }

    /// Encode `values` into a fresh buffer
    pub fn encode_array_to_vec(&self, values: Option<&[C::Value]>) -> CodecResult<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_array(values, &mut out)?;
        Ok(out)
    }

    /// Decode a buffer produced by [`Self::encode_array`].
    ///
    /// Stops exactly at the end of `bytes`. A length that runs past the end of
    /// the buffer is reported with the number of entries decoded so far.
    pub fn decode_array(&self, bytes: &[u8]) -> CodecResult<Option<Vec<C::Value>>> {
        if bytes.is_empty() {
            return Ok(None);
        }

        if let [LENGTH_SENTINEL] = bytes {
            return Ok(Some(Vec::new()));
        }

        let mut out = Vec::new();
        let mut cursor = ByteCursor::new(bytes);

        while !cursor.is_exhausted() {
            let length = read_length(&mut cursor)
                .map_err(|e| CodecError::malformed(out.len(), e.to_string()))?;
            let length = length as usize;

            if length > cursor.remaining() {
                return Err(CodecError::malformed(
                    out.len(),
                    format!(
                        "length {} at offset {} exceeds the {} remaining bytes, the content was probably altered",
                        length,
                        cursor.position(),
                        cursor.remaining()
                    ),
                ));
            }

            let span = cursor.take(length)?;
            let value = self
                .inner
                .decode(span)
                .map_err(|e| CodecError::malformed(out.len(), e.to_string()))?;
            out.push(value);
        }

        Ok(Some(out))
    }
}

impl<C: ElementCodec> ElementCodec for ArrayCodec<C> {
    type Value = Option<Vec<C::Value>>;

    fn encode(&self, value: &Self::Value, out: &mut Vec<u8>) -> CodecResult<()> {
        self.encode_array(value.as_deref(), out)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Value> {
        self.decode_array(bytes)
    }

    fn comparator(&self) -> ComparatorType {
        ComparatorType::Bytes
    }
}
