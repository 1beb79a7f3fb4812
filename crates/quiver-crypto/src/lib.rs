//! Quiver Cryptographic Primitives
//!
//! Cryptographic building blocks for the Quiver messaging engine.
//! Pure functions and small state machines with deterministic outputs;
//! callers provide timestamps and random bytes where determinism
//! matters for testing.
//!
//! # Key Lifecycle
//!
//! Long-term identity keys feed the X3DH handshake; its shared secret
//! seeds the Double Ratchet, whose chain ratchet produces one-time
//! message keys:
//!
//! ```text
//! Identity Keys ──► X3DH Handshake
//!                        │
//!                        ▼
//!                  Root Key ──(DH ratchet)──► Chain Keys
//!                        │
//!                        ▼
//!                  Chain Ratchet ──► Message Keys
//!                        │
//!                        ▼
//!                  AEAD Encryption ──► Ciphertext
//! ```
//!
//! # Security
//!
//! Forward Secrecy:
//! - Chain advancement: old chain keys are zeroized after deriving the next
//! - Message key disposal: keys are zeroized after a single use
//! - Identity rotation: expired keys are purged after a bounded overlap
//!
//! Post-Compromise Security:
//! - DH ratchet steps mix fresh ephemeral DH output into the root key
//! - Identity compromise triggers immediate rotation
//!
//! Authenticity:
//! - XChaCha20-Poly1305 AEAD with AAD binding (sender, message id,
//!   timestamp) prevents tampering and context stripping
//! - Signed prekeys prevent relay substitution during the handshake

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod agreement;
pub mod derivation;
pub mod error;
pub mod identity;
pub mod keys;
pub mod ratchet;
pub mod safety;

pub use aead::{MAX_EXTRA_PAD_BLOCKS, NONCE_RANDOM_SIZE, NONCE_SIZE, PAD_BLOCK_SIZE};
pub use agreement::{InitiatedExchange, PrekeyBundle, initiate, respond};
pub use error::CryptoError;
pub use identity::{IdentityConfig, IdentityKey, IdentityKeyManager};
pub use keys::{
    KEY_SIZE, Keypair, PublicKey, SIGNATURE_SIZE, SharedSecret, SigningKeypair, verify_signature,
};
pub use ratchet::{ChainRatchet, MessageKey};
pub use safety::safety_number;
