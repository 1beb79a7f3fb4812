//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors from cryptographic primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key exchange failed (malformed or low-order key material)
    #[error("key exchange failed: {reason}")]
    KeyExchange {
        /// Why the exchange was rejected
        reason: String,
    },

    /// The current identity key has expired
    #[error("identity key {key_id} expired at {expires_at}")]
    KeyExpired {
        /// Identifier of the expired key
        key_id: String,
        /// Expiry timestamp (seconds since the Unix epoch)
        expires_at: u64,
    },

    /// Decryption failed (authentication tag mismatch)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },

    /// Ed25519 signature verification failed
    #[error("signature verification failed")]
    SignatureInvalid,

    /// Padded payload failed structural validation
    #[error("invalid padding: {reason}")]
    InvalidPadding {
        /// Why the padding was rejected
        reason: String,
    },

    /// Ratchet counter would overflow
    #[error("ratchet counter overflow at {current}")]
    CounterOverflow {
        /// Counter value when overflow was detected
        current: u64,
    },
}

impl CryptoError {
    /// Returns true if this error is permanent (never retried).
    ///
    /// Authentication and signature failures indicate tampering or a
    /// desynchronized session; retrying the same ciphertext cannot
    /// succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::DecryptionFailed { .. }
            | Self::SignatureInvalid
            | Self::InvalidPadding { .. }
            | Self::CounterOverflow { .. } => true,
            Self::KeyExchange { .. } | Self::KeyExpired { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_failures_are_permanent() {
        assert!(CryptoError::DecryptionFailed { reason: "tag mismatch".to_string() }.is_permanent());
        assert!(CryptoError::SignatureInvalid.is_permanent());
        assert!(CryptoError::InvalidPadding { reason: "bad header".to_string() }.is_permanent());
    }

    #[test]
    fn key_lifecycle_errors_are_recoverable() {
        assert!(!CryptoError::KeyExpired { key_id: "ab".to_string(), expires_at: 0 }.is_permanent());
        assert!(
            !CryptoError::KeyExchange { reason: "low-order".to_string() }.is_permanent()
        );
    }
}
