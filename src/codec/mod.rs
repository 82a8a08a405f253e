//! Binary value codec
//!
//! Turns typed values into byte strings the column store can compare and
//! index, and back again without loss.
//!
//! # Components
//!
//! - [`length`]: 1/3/7-byte length prefixes
//! - [`ElementCodec`]: one codec per scalar type
//! - [`ArrayCodec`]: length-delimited arrays over any element codec
//!
//! Everything here is pure and stateless; codecs are `Send + Sync` and can be
//! shared freely across threads.

mod array;
mod element;
mod errors;
pub mod length;

pub use array::ArrayCodec;
pub use element::{
    AsciiCodec, BoolCodec, BytesCodec, ComparatorType, ElementCodec, I32Codec, I64Codec,
    JsonCodec, StringCodec, UuidCodec,
};
pub use errors::{CodecError, CodecResult};
pub use length::{read_length, write_length, ByteCursor};
