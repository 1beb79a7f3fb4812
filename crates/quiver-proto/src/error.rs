//! Protocol-level error types.

use thiserror::Error;

/// Errors from envelope encoding, decoding, and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Version tag names an unknown suite or schema
    #[error("unsupported protocol version: {tag:?}")]
    UnsupportedVersion {
        /// The rejected tag
        tag: String,
    },

    /// Envelope exceeds the wire size limit
    #[error("envelope too large: {size} bytes (limit {limit})")]
    TooLarge {
        /// Encoded size
        size: usize,
        /// Maximum permitted size
        limit: usize,
    },

    /// CBOR encoding failed
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR decoding failed
    #[error("decode error: {0}")]
    Decode(String),

    /// Envelope structure is invalid for its claimed kind
    #[error("invalid envelope: {0}")]
    Invalid(String),
}
