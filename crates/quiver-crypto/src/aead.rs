//! Authenticated encryption with length padding.
//!
//! XChaCha20-Poly1305 with a counter-structured nonce and AAD binding.
//! All functions are pure - random bytes are provided by the caller,
//! which keeps the layer deterministic under test.
//!
//! Plaintexts are padded to a randomized block-aligned length before
//! encryption so ciphertext sizes leak only a coarse bucket, not the
//! exact message length.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::{error::CryptoError, ratchet::MessageKey};

/// Size of an XChaCha20 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the random suffix in the nonce (16 bytes).
pub const NONCE_RANDOM_SIZE: usize = 16;

/// Padding block size in bytes.
pub const PAD_BLOCK_SIZE: usize = 256;

/// Upper bound on extra random padding blocks per message.
pub const MAX_EXTRA_PAD_BLOCKS: u8 = 3;

/// Poly1305 tag size (16 bytes).
const POLY1305_TAG_SIZE: usize = 16;

/// Length header prepended to the plaintext before padding.
const LENGTH_HEADER_SIZE: usize = 4;

/// Build a 24-byte nonce from the chain counter and a random suffix.
///
/// Structure:
/// - bytes 0-7: counter (big-endian)
/// - bytes 8-23: random suffix (caller-provided)
///
/// The counter prefix makes reuse under one chain impossible; the
/// random suffix keeps nonces unique even across session resets that
/// restart the counter.
pub fn build_nonce(counter: u64, random_suffix: [u8; NONCE_RANDOM_SIZE]) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[0..8].copy_from_slice(&counter.to_be_bytes());
    nonce[8..24].copy_from_slice(&random_suffix);
    nonce
}

/// Pad a plaintext to a block-aligned length with a length header.
///
/// Layout: `[len: u32 LE][plaintext][zero fill]`, sized to the next
/// multiple of [`PAD_BLOCK_SIZE`] plus `extra_blocks` whole blocks.
/// `extra_blocks` above [`MAX_EXTRA_PAD_BLOCKS`] is clamped.
pub fn pad(plaintext: &[u8], extra_blocks: u8) -> Vec<u8> {
    let extra = usize::from(extra_blocks.min(MAX_EXTRA_PAD_BLOCKS));
    let content_len = LENGTH_HEADER_SIZE + plaintext.len();
    let padded_len = content_len.div_ceil(PAD_BLOCK_SIZE) * PAD_BLOCK_SIZE
        + extra * PAD_BLOCK_SIZE;

    let mut padded = Vec::with_capacity(padded_len);
    padded.extend_from_slice(&(plaintext.len() as u32).to_le_bytes());
    padded.extend_from_slice(plaintext);
    padded.resize(padded_len, 0);
    padded
}

/// Strip padding, validating the length header.
pub fn unpad(padded: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if padded.len() < LENGTH_HEADER_SIZE {
        return Err(CryptoError::InvalidPadding {
            reason: "payload shorter than length header".to_string(),
        });
    }

    let mut header = [0u8; LENGTH_HEADER_SIZE];
    header.copy_from_slice(&padded[..LENGTH_HEADER_SIZE]);
    let len = u32::from_le_bytes(header) as usize;

    let Some(body) = padded.get(LENGTH_HEADER_SIZE..LENGTH_HEADER_SIZE + len) else {
        return Err(CryptoError::InvalidPadding {
            reason: format!("length header claims {len} bytes, payload has {}", padded.len()),
        });
    };

    Ok(body.to_vec())
}

/// Encrypt a padded payload, binding `aad` into the authentication tag.
pub fn encrypt(
    padded_plaintext: &[u8],
    message_key: &MessageKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(message_key.key().into());
    let payload = Payload { msg: padded_plaintext, aad };

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(nonce), payload) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };
    ciphertext
}

/// Authenticate and decrypt, verifying `aad` against the tag.
///
/// # Errors
///
/// `DecryptionFailed` on tag mismatch, wrong key, or stripped AAD.
/// Permanent: the same ciphertext can never succeed on retry.
pub fn decrypt(
    ciphertext: &[u8],
    message_key: &MessageKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < POLY1305_TAG_SIZE {
        return Err(CryptoError::DecryptionFailed {
            reason: "ciphertext shorter than authentication tag".to_string(),
        });
    }

    let cipher = XChaCha20Poly1305::new(message_key.key().into());
    let payload = Payload { msg: ciphertext, aad };

    cipher.decrypt(XNonce::from_slice(nonce), payload).map_err(|_| {
        CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratchet::ChainRatchet;

    fn test_message_key() -> MessageKey {
        let mut seed = [0u8; 32];
        for (i, byte) in seed.iter_mut().enumerate() {
            *byte = i as u8;
        }
        ChainRatchet::new(seed).advance().unwrap()
    }

    #[test]
    fn pad_unpad_round_trip() {
        for len in [0usize, 1, 100, 251, 252, 253, 1000] {
            let plaintext = vec![0x42u8; len];
            let padded = pad(&plaintext, 0);
            assert_eq!(padded.len() % PAD_BLOCK_SIZE, 0);
            assert_eq!(unpad(&padded).unwrap(), plaintext);
        }
    }

    #[test]
    fn extra_blocks_change_size_not_content() {
        let plaintext = b"same message";
        let small = pad(plaintext, 0);
        let large = pad(plaintext, 3);

        assert_eq!(large.len() - small.len(), 3 * PAD_BLOCK_SIZE);
        assert_eq!(unpad(&small).unwrap(), unpad(&large).unwrap());
    }

    #[test]
    fn extra_blocks_are_clamped() {
        let padded = pad(b"x", u8::MAX);
        assert!(padded.len() <= (1 + usize::from(MAX_EXTRA_PAD_BLOCKS)) * PAD_BLOCK_SIZE);
    }

    #[test]
    fn unpad_rejects_oversized_length_header() {
        let mut padded = pad(b"hello", 0);
        padded[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(unpad(&padded), Err(CryptoError::InvalidPadding { .. })));
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = test_message_key();
        let nonce = build_nonce(0, [0xAB; NONCE_RANDOM_SIZE]);
        let padded = pad(b"Hello, World!", 1);

        let ciphertext = encrypt(&padded, &key, &nonce, b"aad");
        let decrypted = decrypt(&ciphertext, &key, &nonce, b"aad").unwrap();

        assert_eq!(unpad(&decrypted).unwrap(), b"Hello, World!");
    }

    #[test]
    fn stripped_aad_fails_authentication() {
        let key = test_message_key();
        let nonce = build_nonce(7, [0x01; NONCE_RANDOM_SIZE]);
        let ciphertext = encrypt(&pad(b"payload", 0), &key, &nonce, b"sender|id|ts");

        let result = decrypt(&ciphertext, &key, &nonce, b"attacker|id|ts");
        assert!(matches!(result, Err(CryptoError::DecryptionFailed { .. })));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = test_message_key();
        let nonce = build_nonce(0, [0; NONCE_RANDOM_SIZE]);
        let mut ciphertext = encrypt(&pad(b"original", 0), &key, &nonce, b"");

        ciphertext[0] ^= 0xFF;
        assert!(decrypt(&ciphertext, &key, &nonce, b"").is_err());
    }

    #[test]
    fn nonce_embeds_counter_big_endian() {
        let nonce = build_nonce(0x0102_0304_0506_0708, [0xCD; NONCE_RANDOM_SIZE]);
        assert_eq!(&nonce[0..8], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&nonce[8..24], &[0xCD; 16]);
    }
}
