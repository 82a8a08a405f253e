//! Codec Round-Trip Tests
//!
//! Tests for the binary array codec:
//! - Length prefixes are a bijection over u32
//! - Arrays decode to exactly what was encoded
//! - Truncated or corrupt input is reported, never silently shortened
//! - Integer encodings sort like the integers they encode

use colquery::codec::{
    length::encoded_len, read_length, write_length, ArrayCodec, ByteCursor, CodecError,
    ElementCodec, I32Codec, I64Codec, StringCodec,
};
use proptest::prelude::*;

// =============================================================================
// Helper Functions
// =============================================================================

fn strings() -> ArrayCodec<StringCodec> {
    ArrayCodec::new(StringCodec)
}

fn owned(values: &[Option<&str>]) -> Vec<Option<String>> {
    values.iter().map(|v| v.map(str::to_string)).collect()
}

// =============================================================================
// Known Encodings
// =============================================================================

/// The documented five-element example encodes byte for byte.
#[test]
fn test_mixed_strings_known_bytes() {
    let values = owned(&[Some("Hello"), Some("World!"), Some(":)"), Some(""), None]);

    let bytes = strings().encode_array_to_vec(Some(values.as_slice())).unwrap();

    let mut expected = vec![5u8];
    expected.extend_from_slice(b"Hello");
    expected.push(6);
    expected.extend_from_slice(b"World!");
    expected.push(2);
    expected.extend_from_slice(b":)");
    expected.extend_from_slice(&[0, 0]);
    assert_eq!(bytes, expected);

    // empty string and null share the zero-length encoding
    let decoded = strings().decode_array(&bytes).unwrap().unwrap();
    assert_eq!(decoded.len(), 5);
    assert_eq!(decoded[0].as_deref(), Some("Hello"));
    assert_eq!(decoded[2].as_deref(), Some(":)"));
    assert_eq!(decoded[3], None);
    assert_eq!(decoded[4], None);
}

/// Null arrays write nothing, empty arrays write a lone sentinel.
#[test]
fn test_null_and_empty_arrays_differ() {
    let codec = strings();
    assert!(codec.encode_array_to_vec(None).unwrap().is_empty());
    assert_eq!(codec.encode_array_to_vec(Some(&[][..])).unwrap(), vec![0xFF]);

    assert_eq!(codec.decode_array(&[]).unwrap(), None);
    assert_eq!(codec.decode_array(&[0xFF]).unwrap(), Some(Vec::new()));
}

/// Lengths at the prefix boundaries use 1, 3 and 7 bytes.
#[test]
fn test_length_prefix_widths() {
    for (length, width) in [
        (0u32, 1usize),
        (254, 1),
        (255, 3),
        (65534, 3),
        (65535, 7),
        (u32::MAX, 7),
    ] {
        let mut out = Vec::new();
        write_length(length, &mut out);
        assert_eq!(out.len(), width, "length {}", length);
        assert_eq!(encoded_len(length), width);

        let mut cursor = ByteCursor::new(&out);
        assert_eq!(read_length(&mut cursor).unwrap(), length);
        assert!(cursor.is_exhausted());
    }
}

// =============================================================================
// Corrupt Input
// =============================================================================

/// A length that overruns the buffer reports how many entries were parsed.
#[test]
fn test_overrun_reports_parsed_entries() {
    let values = owned(&[Some("ab"), Some("cd"), Some("efgh")]);
    let mut bytes = strings().encode_array_to_vec(Some(values.as_slice())).unwrap();
    bytes.truncate(bytes.len() - 2);

    let err = strings().decode_array(&bytes).unwrap_err();
    assert!(matches!(err, CodecError::Malformed { .. }));
    assert_eq!(err.parsed_entries(), Some(2));
}

/// A wrong-width element is rejected by its element codec.
#[test]
fn test_wrong_width_element() {
    let codec = ArrayCodec::new(I64Codec);
    let err = codec.decode_array(&[3, 1, 2, 3]).unwrap_err();
    assert_eq!(err.parsed_entries(), Some(0));
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_length_prefix_bijection(length in any::<u32>()) {
        let mut out = Vec::new();
        write_length(length, &mut out);
        let mut cursor = ByteCursor::new(&out);
        prop_assert_eq!(read_length(&mut cursor).unwrap(), length);
        prop_assert!(cursor.is_exhausted());
    }

    #[test]
    fn prop_string_array_round_trip(
        values in proptest::option::of(proptest::collection::vec(
            proptest::option::of(".{1,300}"),
            0..20,
        ))
    ) {
        let codec = strings();
        let bytes = codec.encode_array_to_vec(values.as_deref()).unwrap();
        prop_assert_eq!(codec.decode_array(&bytes).unwrap(), values);
    }

    #[test]
    fn prop_integer_array_round_trip(
        values in proptest::collection::vec(proptest::option::of(any::<i32>()), 0..50)
    ) {
        let codec = ArrayCodec::new(I32Codec);
        let bytes = codec.encode_array_to_vec(Some(values.as_slice())).unwrap();
        prop_assert_eq!(codec.decode_array(&bytes).unwrap(), Some(values));
    }

    #[test]
    fn prop_long_encoding_preserves_order(a in any::<i64>(), b in any::<i64>()) {
        let ea = I64Codec.encode_to_vec(&Some(a)).unwrap();
        let eb = I64Codec.encode_to_vec(&Some(b)).unwrap();
        prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
    }

    #[test]
    fn prop_truncation_never_decodes_silently(
        values in proptest::collection::vec("[a-z]{1,40}", 1..10),
        cut in 1usize..40,
    ) {
        let values: Vec<Option<String>> = values.into_iter().map(Some).collect();
        let codec = strings();
        let bytes = codec.encode_array_to_vec(Some(values.as_slice())).unwrap();
        let cut = cut.min(bytes.len() - 1);
        let truncated = &bytes[..bytes.len() - cut];

        // either an error, or a shorter array that ends on an entry boundary
        if let Ok(Some(decoded)) = codec.decode_array(truncated) {
            prop_assert!(decoded.len() < values.len());
            prop_assert_eq!(&decoded[..], &values[..decoded.len()]);
        }
    }
}
