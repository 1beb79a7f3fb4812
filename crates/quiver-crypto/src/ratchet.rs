//! Forward-secure symmetric chain ratchet.
//!
//! One chain per direction of a session. Each advance derives a
//! one-use message key and the next chain key, then destroys the old
//! chain key. Compromise of the current state never reveals keys that
//! were already consumed.

use zeroize::Zeroize;

use crate::{
    derivation::{derive_message_key, derive_next_chain_key},
    error::CryptoError,
};

/// A message key derived from the chain ratchet.
///
/// Valid for exactly one AEAD operation. Zeroized on drop.
#[derive(Clone)]
pub struct MessageKey {
    key: [u8; 32],
    counter: u64,
}

impl MessageKey {
    /// Rebuild a message key from persisted bytes.
    ///
    /// Used when replaying a cached key for an out-of-order message.
    pub fn restore(key: [u8; 32], counter: u64) -> Self {
        Self { key, counter }
    }

    /// 32-byte symmetric key for XChaCha20-Poly1305.
    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Chain position this key was derived at.
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// One direction of a Double Ratchet session.
///
/// # Invariants
///
/// - The counter is strictly monotonic.
/// - A chain key, once advanced past, is zeroized and irrecoverable.
/// - Deterministic: the same chain key produces the same key sequence.
pub struct ChainRatchet {
    chain_key: [u8; 32],
    counter: u64,
}

impl ChainRatchet {
    /// Create a ratchet from an initial chain key (counter 0).
    pub fn new(chain_key: [u8; 32]) -> Self {
        Self { chain_key, counter: 0 }
    }

    /// Restore a ratchet from persisted state.
    pub fn restore(chain_key: [u8; 32], counter: u64) -> Self {
        Self { chain_key, counter }
    }

    /// Number of times the ratchet has advanced.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Current chain key, for state persistence only.
    pub fn chain_key(&self) -> &[u8; 32] {
        &self.chain_key
    }

    /// Advance the ratchet and return the message key for the current
    /// position.
    ///
    /// The old chain key is zeroized before the new one is installed.
    pub fn advance(&mut self) -> Result<MessageKey, CryptoError> {
        if self.counter == u64::MAX {
            return Err(CryptoError::CounterOverflow { current: self.counter });
        }

        let message_key = derive_message_key(&self.chain_key);
        let next_chain_key = derive_next_chain_key(&self.chain_key);

        self.chain_key.zeroize();
        self.chain_key = next_chain_key;

        let current = self.counter;
        self.counter = self.counter.wrapping_add(1);

        Ok(MessageKey { key: message_key, counter: current })
    }
}

impl Drop for ChainRatchet {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}
