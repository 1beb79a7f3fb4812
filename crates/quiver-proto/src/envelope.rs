//! Wire envelope for ratcheted messages.
//!
//! The envelope is the unit handed to the transport: ciphertext plus
//! the metadata a receiver needs to locate a session, derive the right
//! message key, and verify authenticity. Encoding is CBOR. Decoding
//! validates the size cap and the protocol version before anything
//! else; unknown versions are rejected, never best-effort parsed.

use serde::{Deserialize, Serialize};

use crate::{error::ProtocolError, version::ProtocolVersion};

/// Maximum encoded envelope size (16 MiB).
pub const MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

/// Expected Ed25519 signature length.
const SIGNATURE_LEN: usize = 64;

/// A complete wire envelope.
///
/// # Invariants
///
/// - `version` always parses to a supported [`ProtocolVersion`];
///   enforced by [`Envelope::decode`] before any field is used.
/// - Group envelopes (`group_id` set) carry a signature; direct
///   envelopes carry a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message id.
    pub id: String,

    /// Group this message belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    /// Sender peer id.
    pub sender_id: String,

    /// Recipient peer id. Absent for relay-routed group fan-out where
    /// the entry is addressed inside the group payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,

    /// AEAD ciphertext including the 16-byte Poly1305 tag.
    pub ciphertext: Vec<u8>,

    /// 24-byte XChaCha20 nonce.
    pub nonce: [u8; 24],

    /// Send-chain counter the message key was derived at.
    pub counter: u64,

    /// Length of the sender's previous send chain. Lets the receiver
    /// cache keys for still-in-flight messages before stepping its
    /// ratchet to the new chain.
    pub prev_counter: u64,

    /// Sender's current ratchet public key. A value the receiver has
    /// not seen before signals a ratchet rotation.
    pub ratchet_key: [u8; 32],

    /// Additional authenticated data bound into the AEAD tag.
    pub aad: Vec<u8>,

    /// Ed25519 signature (group messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<u8>>,

    /// Send timestamp (seconds since the Unix epoch).
    pub timestamp: u64,

    /// Protocol version tag, e.g. `xchacha20poly1305-1-padded`.
    pub version: String,
}

impl Envelope {
    /// Encode to CBOR bytes.
    ///
    /// # Errors
    ///
    /// `TooLarge` if the encoded envelope exceeds
    /// [`MAX_ENVELOPE_SIZE`]; `Encode` on serialization failure.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;

        if buf.len() > MAX_ENVELOPE_SIZE {
            return Err(ProtocolError::TooLarge { size: buf.len(), limit: MAX_ENVELOPE_SIZE });
        }
        Ok(buf)
    }

    /// Decode and validate an envelope from CBOR bytes.
    ///
    /// Validation order: size cap, CBOR structure, version tag,
    /// structural invariants. An envelope with an unknown version
    /// never reaches the caller.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_ENVELOPE_SIZE {
            return Err(ProtocolError::TooLarge { size: bytes.len(), limit: MAX_ENVELOPE_SIZE });
        }

        let envelope: Self = ciborium::from_reader(bytes)
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;

        ProtocolVersion::parse(&envelope.version)?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// The parsed protocol version.
    ///
    /// # Errors
    ///
    /// `UnsupportedVersion` if the tag does not parse; cannot happen
    /// for envelopes obtained through [`Envelope::decode`].
    pub fn protocol_version(&self) -> Result<ProtocolVersion, ProtocolError> {
        ProtocolVersion::parse(&self.version)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if self.id.is_empty() {
            return Err(ProtocolError::Invalid("empty message id".to_string()));
        }
        if self.sender_id.is_empty() {
            return Err(ProtocolError::Invalid("empty sender id".to_string()));
        }
        if self.group_id.is_none() && self.recipient_id.is_none() {
            return Err(ProtocolError::Invalid(
                "envelope has neither recipient nor group".to_string(),
            ));
        }
        if let Some(signature) = &self.signature {
            if signature.len() != SIGNATURE_LEN {
                return Err(ProtocolError::Invalid(format!(
                    "signature length {} (expected {SIGNATURE_LEN})",
                    signature.len()
                )));
            }
        }
        if self.group_id.is_some() && self.signature.is_none() {
            return Err(ProtocolError::Invalid("group envelope without signature".to_string()));
        }
        Ok(())
    }
}

/// Canonical AAD bytes for an envelope.
///
/// Both the encrypt path and the verify path build AAD through this
/// function, so a context-stripping relay cannot rebind a ciphertext
/// to a different sender, message id, or timestamp. Fields are
/// length-prefixed to keep the encoding unambiguous.
pub fn build_aad(
    sender_id: &str,
    message_id: &str,
    timestamp: u64,
    group_id: Option<&str>,
) -> Vec<u8> {
    let mut aad = Vec::with_capacity(
        16 + sender_id.len() + message_id.len() + group_id.map_or(0, str::len),
    );
    push_field(&mut aad, sender_id.as_bytes());
    push_field(&mut aad, message_id.as_bytes());
    aad.extend_from_slice(&timestamp.to_be_bytes());
    if let Some(group) = group_id {
        push_field(&mut aad, group.as_bytes());
    }
    aad
}

fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u32).to_be_bytes());
    buf.extend_from_slice(field);
}
