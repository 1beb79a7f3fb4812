//! X25519 and Ed25519 key wrappers.
//!
//! All secret material is zeroized on drop and redacted from Debug
//! output. Public keys are plain 32-byte values that can be shared,
//! serialized, and compared freely.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Size of X25519 and Ed25519 keys in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// An X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Wrap raw public key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub(crate) fn to_dalek(self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 bytes are enough to tell keys apart in logs
        write!(f, "PublicKey({}..)", hex::encode(&self.0[..8]))
    }
}

impl From<x25519_dalek::PublicKey> for PublicKey {
    fn from(key: x25519_dalek::PublicKey) -> Self {
        Self(*key.as_bytes())
    }
}

/// A shared secret produced by Diffie-Hellman.
///
/// Zeroized on drop. Never leaves the key-derivation layer.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; KEY_SIZE]);

impl SharedSecret {
    /// Wrap raw shared secret bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw shared secret bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}

/// An X25519 keypair.
///
/// Used both for long-term identity keys and ephemeral ratchet keys.
/// The secret half is zeroized on drop.
///
/// Uses `StaticSecret` internally because the ratchet performs more
/// than one DH operation per keypair.
#[derive(Clone)]
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(x25519_dalek::PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Restore a keypair from stored secret bytes.
    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(x25519_dalek::PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Public half of the keypair.
    pub fn public(&self) -> PublicKey {
        self.public
    }

    /// Perform X25519 Diffie-Hellman with a remote public key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyExchange` if the shared secret is
    /// all-zero, which indicates small-order or otherwise malformed
    /// remote key material.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> Result<SharedSecret, CryptoError> {
        let shared = self.secret.diffie_hellman(&their_public.to_dalek());
        if !shared.was_contributory() {
            return Err(CryptoError::KeyExchange {
                reason: "non-contributory DH output (low-order public key)".to_string(),
            });
        }
        Ok(SharedSecret(*shared.as_bytes()))
    }

    /// Export the secret half for encrypted-at-rest storage.
    pub fn secret_bytes(&self) -> [u8; KEY_SIZE] {
        self.secret.to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// An Ed25519 signing keypair for group message authentication.
#[derive(Clone)]
pub struct SigningKeypair {
    signing: SigningKey,
}

impl SigningKeypair {
    /// Generate a fresh random signing keypair.
    pub fn generate() -> Self {
        Self { signing: SigningKey::generate(&mut OsRng) }
    }

    /// Restore a signing keypair from stored secret bytes.
    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { signing: SigningKey::from_bytes(&bytes) }
    }

    /// Public verifying key bytes.
    pub fn public_bytes(&self) -> [u8; KEY_SIZE] {
        self.signing.verifying_key().to_bytes()
    }

    /// Export the secret half for encrypted-at-rest storage.
    pub fn secret_bytes(&self) -> [u8; KEY_SIZE] {
        self.signing.to_bytes()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("public", &hex::encode(&self.public_bytes()[..8]))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Verify an Ed25519 signature against a verifying key.
///
/// # Errors
///
/// Returns `CryptoError::SignatureInvalid` for malformed keys and
/// failed verification alike; callers treat both as permanent.
pub fn verify_signature(
    public_bytes: &[u8; KEY_SIZE],
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(public_bytes)
        .map_err(|_| CryptoError::SignatureInvalid)?;
    let signature = Signature::from_bytes(signature);
    key.verify(message, &signature).map_err(|_| CryptoError::SignatureInvalid)
}
