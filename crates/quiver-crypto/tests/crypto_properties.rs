//! Property-based tests for the crypto primitives.
//!
//! Covers the padding scheme, AEAD tamper resistance, chain ratchet
//! determinism, and safety number symmetry across arbitrary inputs.

use proptest::prelude::*;
use quiver_crypto::{
    ChainRatchet, Keypair, PAD_BLOCK_SIZE, aead, safety_number,
};

#[test]
fn prop_padding_roundtrip_and_alignment() {
    proptest!(|(plaintext in prop::collection::vec(any::<u8>(), 0..2048), extra in 0u8..=5)| {
        let padded = aead::pad(&plaintext, extra);

        // PROPERTY: padded length is always block aligned
        prop_assert_eq!(padded.len() % PAD_BLOCK_SIZE, 0);
        // PROPERTY: unpad recovers the exact plaintext
        prop_assert_eq!(aead::unpad(&padded).unwrap(), plaintext);
    });
}

#[test]
fn prop_padded_length_reveals_only_the_bucket() {
    proptest!(|(len_a in 0usize..512, len_b in 0usize..512)| {
        let padded_a = aead::pad(&vec![0xAA; len_a], 0);
        let padded_b = aead::pad(&vec![0xBB; len_b], 0);

        // PROPERTY: plaintexts in the same size bucket are
        // indistinguishable by padded length
        let bucket = |len: usize| (len + 4).div_ceil(PAD_BLOCK_SIZE);
        if bucket(len_a) == bucket(len_b) {
            prop_assert_eq!(padded_a.len(), padded_b.len());
        }
    });
}

#[test]
fn prop_aead_rejects_any_single_bit_flip() {
    proptest!(|(seed in any::<[u8; 32]>(), plaintext in prop::collection::vec(any::<u8>(), 1..256), bit in 0usize..64)| {
        let mut chain = ChainRatchet::new(seed);
        let key = chain.advance().unwrap();
        let nonce = aead::build_nonce(0, [3u8; 16]);
        let aad = b"context";

        let padded = aead::pad(&plaintext, 0);
        let mut ciphertext = aead::encrypt(&padded, &key, &nonce, aad);

        let flip_at = bit % (ciphertext.len() * 8);
        ciphertext[flip_at / 8] ^= 1 << (flip_at % 8);

        // PROPERTY: any bit flip fails authentication
        prop_assert!(aead::decrypt(&ciphertext, &key, &nonce, aad).is_err());
    });
}

#[test]
fn prop_chain_ratchet_is_deterministic_with_unique_keys() {
    proptest!(|(seed in any::<[u8; 32]>(), steps in 1usize..32)| {
        let mut left = ChainRatchet::new(seed);
        let mut right = ChainRatchet::new(seed);

        let mut seen = std::collections::HashSet::new();
        for i in 0..steps {
            let a = left.advance().unwrap();
            let b = right.advance().unwrap();

            // PROPERTY: two ratchets from one seed stay in lockstep
            prop_assert_eq!(a.key(), b.key());
            prop_assert_eq!(a.counter(), i as u64);
            // PROPERTY: every step yields a fresh message key
            prop_assert!(seen.insert(*a.key()));
        }
    });
}

#[test]
fn prop_safety_number_is_symmetric() {
    proptest!(|(ours in any::<[u8; 32]>(), theirs in any::<[u8; 32]>())| {
        let a = Keypair::from_secret_bytes(ours).public();
        let b = Keypair::from_secret_bytes(theirs).public();

        // PROPERTY: both peers compute the same fingerprint
        prop_assert_eq!(safety_number(&a, &b), safety_number(&b, &a));
    });
}
