//! Codec error types
//!
//! Error codes:
//! - CQ_CODEC_TRUNCATED_LENGTH (ERROR)
//! - CQ_CODEC_MALFORMED (ERROR)
//! - CQ_CODEC_INVALID_ELEMENT (ERROR)
//! - CQ_CODEC_SERIALIZATION (ERROR)
//!
//! Malformed input is always surfaced, never truncated silently. Array-level
//! failures carry the number of elements decoded before the failure.

use thiserror::Error;

use crate::observability::Severity;

/// Errors raised while encoding or decoding values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A length prefix ended before all of its bytes were available
    #[error("truncated length prefix at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    TruncatedLength {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    /// The encoded array could not be parsed
    #[error("could not parse entry #{} in array: {reason} ({parsed} entries parsed before failure)", .parsed + 1)]
    Malformed { parsed: usize, reason: String },

    /// A single element's bytes are invalid for its codec
    #[error("invalid element: {0}")]
    InvalidElement(String),

    /// A serde-backed element failed to (de)serialize
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl CodecError {
    /// Create a malformed-array error
    pub fn malformed(parsed: usize, reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            parsed,
            reason: reason.into(),
        }
    }

    /// Create an invalid-element error
    pub fn invalid_element(reason: impl Into<String>) -> Self {
        CodecError::InvalidElement(reason.into())
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::TruncatedLength { .. } => "CQ_CODEC_TRUNCATED_LENGTH",
            CodecError::Malformed { .. } => "CQ_CODEC_MALFORMED",
            CodecError::InvalidElement(_) => "CQ_CODEC_INVALID_ELEMENT",
            CodecError::Serialization(_) => "CQ_CODEC_SERIALIZATION",
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        Severity::Error
    }

    /// Number of array entries decoded before the failure, if known
    pub fn parsed_entries(&self) -> Option<usize> {
        match self {
            CodecError::Malformed { parsed, .. } => Some(*parsed),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Serialization(e.to_string())
    }
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;
