//! Safety numbers for out-of-band identity verification.
//!
//! A safety number is a human-comparable fingerprint of the two
//! identity public keys in a conversation. Both parties must compute
//! the identical string, so the keys are sorted into a canonical order
//! before hashing.

use sha2::{Digest, Sha256};

use crate::keys::PublicKey;

/// Domain-separation label for the fingerprint hash.
const SAFETY_LABEL: &[u8] = b"quiver-safety-number-v1";

/// Number of digest bytes rendered (16 bytes -> 32 hex characters).
const DISPLAY_BYTES: usize = 16;

/// Characters per display block.
const BLOCK_SIZE: usize = 4;

/// Compute the safety number for a pair of identity keys.
///
/// Commutative: `safety_number(a, b) == safety_number(b, a)`. The
/// digest is truncated, uppercase-hex encoded, and regrouped into
/// 4-character blocks separated by spaces, e.g.
/// `1A2B 3C4D 5E6F 7081 92A3 B4C5 D6E7 F809`.
pub fn safety_number(ours: &PublicKey, theirs: &PublicKey) -> String {
    // Canonical order: byte-lexicographically smaller key first, so
    // the fingerprint is identical regardless of computing side.
    let (first, second) = if ours.as_bytes() <= theirs.as_bytes() {
        (ours, theirs)
    } else {
        (theirs, ours)
    };

    let mut hasher = Sha256::new();
    hasher.update(SAFETY_LABEL);
    hasher.update(first.as_bytes());
    hasher.update(second.as_bytes());
    let digest = hasher.finalize();

    let encoded = hex::encode_upper(&digest[..DISPLAY_BYTES]);
    encoded
        .as_bytes()
        .chunks(BLOCK_SIZE)
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}
