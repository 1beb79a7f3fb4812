//! Delivery acknowledgments.
//!
//! An ack is a tiny CBOR record a recipient sends back once a message
//! has been decrypted and handed to the application. Acks are delivery
//! metadata only; losing one never changes message state on either
//! side.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Upper bound for an encoded ack. Anything larger is malformed.
pub const MAX_ACK_SIZE: usize = 4096;

/// Confirmation that a message reached its recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    /// Id of the message being acknowledged.
    pub message_id: String,

    /// Peer that received the message.
    pub recipient_id: String,

    /// When the recipient processed the message (seconds since the
    /// Unix epoch).
    pub timestamp: u64,
}

impl Acknowledgment {
    /// Encode to CBOR bytes.
    ///
    /// # Errors
    ///
    /// `Encode` on serialization failure.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode an ack from CBOR bytes.
    ///
    /// # Errors
    ///
    /// `TooLarge` past [`MAX_ACK_SIZE`]; `Decode` on malformed CBOR;
    /// `Invalid` when either id is empty.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_ACK_SIZE {
            return Err(ProtocolError::TooLarge { size: bytes.len(), limit: MAX_ACK_SIZE });
        }

        let ack: Self =
            ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?;

        if ack.message_id.is_empty() {
            return Err(ProtocolError::Invalid("empty message id in ack".to_string()));
        }
        if ack.recipient_id.is_empty() {
            return Err(ProtocolError::Invalid("empty recipient id in ack".to_string()));
        }
        Ok(ack)
    }
}
