//! Engine error taxonomy.
//!
//! Every fallible engine operation funnels into [`EngineError`]. The
//! split that matters operationally is permanent versus transient:
//! permanent errors are surfaced to the caller immediately, transient
//! ones feed the outbox retry machinery.

use thiserror::Error;

use quiver_crypto::CryptoError;
use quiver_proto::ProtocolError;

use crate::storage::StorageError;

/// Errors from session, group, and delivery operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A cryptographic primitive rejected its input
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Wire envelope could not be encoded or decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// State persistence failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Message counter does not continue the receive chain
    #[error("counter mismatch: chain at {expected}, envelope carries {got}")]
    CounterMismatch {
        /// Next counter the receive chain would accept
        expected: u64,
        /// Counter carried by the rejected envelope
        got: u64,
    },

    /// No ratchet session exists for the peer
    #[error("no session established with peer {peer_id}")]
    SessionMissing {
        /// Peer the operation was addressed to
        peer_id: String,
    },

    /// Group or member lookup failed
    #[error("group membership error: {reason}")]
    GroupMembership {
        /// What was missing or not permitted
        reason: String,
    },

    /// Operation requires admin rights the caller does not hold
    #[error("peer {peer_id} is not an admin of group {group_id}")]
    NotAdmin {
        /// Peer that attempted the operation
        peer_id: String,
        /// Group the operation targeted
        group_id: String,
    },

    /// Delivery abandoned after exhausting the retry budget
    #[error("delivery of {item_id} abandoned after {attempts} attempts")]
    RetriesExhausted {
        /// Outbox item that was abandoned
        item_id: String,
        /// Attempts made before giving up
        attempts: u32,
    },

    /// No transport or relay path is currently available
    #[error("transport unavailable: {reason}")]
    TransportUnavailable {
        /// Why delivery could not be attempted
        reason: String,
    },
}

impl EngineError {
    /// Returns true if retrying the same operation can never succeed.
    ///
    /// Transient errors (connectivity, storage I/O) are left to the
    /// outbox backoff schedule; permanent ones short-circuit it.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Crypto(e) => e.is_permanent(),
            Self::Protocol(_)
            | Self::CounterMismatch { .. }
            | Self::NotAdmin { .. }
            | Self::RetriesExhausted { .. } => true,
            Self::Storage(_)
            | Self::SessionMissing { .. }
            | Self::GroupMembership { .. }
            | Self::TransportUnavailable { .. } => false,
        }
    }
}
