//! Per-type element codecs
//!
//! Each codec turns one scalar into a byte span whose byte-wise order matches
//! the value order the store's comparator expects. A zero-length span is the
//! null value for every codec here, which is what lets [`super::ArrayCodec`]
//! carry null members without any extra marker.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{CodecError, CodecResult};

/// Column comparator understood by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparatorType {
    #[default]
    Bytes,
    Utf8,
    Ascii,
    Long,
    Integer,
    Uuid,
}

impl ComparatorType {
    /// Returns the store-side comparator class name
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparatorType::Bytes => "BytesType",
            ComparatorType::Utf8 => "UTF8Type",
            ComparatorType::Ascii => "AsciiType",
            ComparatorType::Long => "LongType",
            ComparatorType::Integer => "IntegerType",
            ComparatorType::Uuid => "UUIDType",
        }
    }
}

impl fmt::Display for ComparatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encodes and decodes a single value of one type.
///
/// Implementations must satisfy `decode(encode(v)) == v` modulo their own
/// null convention.
pub trait ElementCodec {
    type Value;

    /// Append the encoding of `value` to `out`
    fn encode(&self, value: &Self::Value, out: &mut Vec<u8>) -> CodecResult<()>;

    /// Decode exactly `bytes`
    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Value>;

    /// Comparator the store should use for columns holding this type
    fn comparator(&self) -> ComparatorType;

    /// Convenience: encode into a fresh buffer
    fn encode_to_vec(&self, value: &Self::Value) -> CodecResult<Vec<u8>> {
        let mut out = Vec::new();
        self.encode(value, &mut out)?;
        Ok(out)
    }
}

/// UTF-8 strings. Both `None` and `""` encode to nothing; nothing decodes to `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl ElementCodec for StringCodec {
    type Value = Option<String>;

    fn encode(&self, value: &Self::Value, out: &mut Vec<u8>) -> CodecResult<()> {
        if let Some(s) = value {
            out.extend_from_slice(s.as_bytes());
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Value> {
        if bytes.is_empty() {
            return Ok(None);
        }
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| CodecError::invalid_element(format!("invalid utf-8: {}", e)))
    }

    fn comparator(&self) -> ComparatorType {
        ComparatorType::Utf8
    }
}

/// 7-bit ASCII strings, with the same null convention as [`StringCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiCodec;

impl ElementCodec for AsciiCodec {
    type Value = Option<String>;

    fn encode(&self, value: &Self::Value, out: &mut Vec<u8>) -> CodecResult<()> {
        if let Some(s) = value {
            if !s.is_ascii() {
                return Err(CodecError::invalid_element(format!("'{}' is not ascii", s)));
            }
            out.extend_from_slice(s.as_bytes());
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Value> {
        if bytes.is_empty() {
            return Ok(None);
        }
        if let Some(pos) = bytes.iter().position(|b| !b.is_ascii()) {
            return Err(CodecError::invalid_element(format!(
                "non-ascii byte 0x{:02x} at offset {}",
                bytes[pos], pos
            )));
        }
        Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
    }

    fn comparator(&self) -> ComparatorType {
        ComparatorType::Ascii
    }
}

/// Raw byte blobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl ElementCodec for BytesCodec {
    type Value = Option<Vec<u8>>;

    fn encode(&self, value: &Self::Value, out: &mut Vec<u8>) -> CodecResult<()> {
        if let Some(b) = value {
            out.extend_from_slice(b);
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Value> {
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes.to_vec()))
    }

    fn comparator(&self) -> ComparatorType {
        ComparatorType::Bytes
    }
}

/// Signed 64-bit integers, big-endian with the sign bit flipped so that
/// unsigned byte order equals numeric order.
#[derive(Debug, Clone, Copy, Default)]
pub struct I64Codec;

impl ElementCodec for I64Codec {
    type Value = Option<i64>;

    fn encode(&self, value: &Self::Value, out: &mut Vec<u8>) -> CodecResult<()> {
        if let Some(v) = value {
            out.extend_from_slice(&((*v as u64) ^ (1 << 63)).to_be_bytes());
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Value> {
        match bytes.len() {
            0 => Ok(None),
            8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Ok(Some((u64::from_be_bytes(raw) ^ (1 << 63)) as i64))
            }
            n => Err(CodecError::invalid_element(format!(
                "i64 needs 8 bytes, got {}",
                n
            ))),
        }
    }

    fn comparator(&self) -> ComparatorType {
        ComparatorType::Long
    }
}

/// Signed 32-bit integers, same ordering scheme as [`I64Codec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct I32Codec;

impl ElementCodec for I32Codec {
    type Value = Option<i32>;

    fn encode(&self, value: &Self::Value, out: &mut Vec<u8>) -> CodecResult<()> {
        if let Some(v) = value {
            out.extend_from_slice(&((*v as u32) ^ (1 << 31)).to_be_bytes());
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Value> {
        match bytes.len() {
            0 => Ok(None),
            4 => {
                let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                Ok(Some((u32::from_be_bytes(raw) ^ (1 << 31)) as i32))
            }
            n => Err(CodecError::invalid_element(format!(
                "i32 needs 4 bytes, got {}",
                n
            ))),
        }
    }

    fn comparator(&self) -> ComparatorType {
        ComparatorType::Integer
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolCodec;

impl ElementCodec for BoolCodec {
    type Value = Option<bool>;

    fn encode(&self, value: &Self::Value, out: &mut Vec<u8>) -> CodecResult<()> {
        if let Some(v) = value {
            out.push(u8::from(*v));
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Value> {
        match bytes {
            [] => Ok(None),
            [0] => Ok(Some(false)),
            [1] => Ok(Some(true)),
            other => Err(CodecError::invalid_element(format!(
                "invalid bool encoding {:?}",
                other
            ))),
        }
    }

    fn comparator(&self) -> ComparatorType {
        ComparatorType::Bytes
    }
}

/// 16-byte UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidCodec;

impl ElementCodec for UuidCodec {
    type Value = Option<Uuid>;

    fn encode(&self, value: &Self::Value, out: &mut Vec<u8>) -> CodecResult<()> {
        if let Some(id) = value {
            out.extend_from_slice(id.as_bytes());
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Value> {
        if bytes.is_empty() {
            return Ok(None);
        }
        Uuid::from_slice(bytes)
            .map(Some)
            .map_err(|e| CodecError::invalid_element(format!("invalid uuid: {}", e)))
    }

    fn comparator(&self) -> ComparatorType {
        ComparatorType::Uuid
    }
}

/// Any serde type, stored as its JSON bytes.
///
/// For values that have no dedicated codec; the bytes are opaque to the store
/// and sort by their JSON text only.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T: Serialize + DeserializeOwned> ElementCodec for JsonCodec<T> {
    type Value = Option<T>;

    fn encode(&self, value: &Self::Value, out: &mut Vec<u8>) -> CodecResult<()> {
        if let Some(v) = value {
            serde_json::to_writer(&mut *out, v)?;
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Self::Value> {
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(bytes)?))
    }

    fn comparator(&self) -> ComparatorType {
        ComparatorType::Bytes
    }
}
