//! Property-based tests for the ratchet session.
//!
//! Exercises the session pair across arbitrary payloads, delivery
//! orders, and replay attempts. Message counts stay below the
//! rotation threshold so these properties isolate chain behavior.

use proptest::prelude::*;
use quiver_core::{EngineError, RatchetSession};
use quiver_crypto::Keypair;

fn session_pair(secret: [u8; 32], prekey_seed: [u8; 32]) -> (RatchetSession, RatchetSession) {
    let prekey = Keypair::from_secret_bytes(prekey_seed);
    let initiator =
        RatchetSession::initiate("alice", "bob", &secret, prekey.public(), 1000).unwrap();
    let responder = RatchetSession::respond("bob", "alice", &secret, prekey, 1000);
    (initiator, responder)
}

#[test]
fn prop_conversation_roundtrips_for_any_payloads() {
    proptest!(|(
        secret in any::<[u8; 32]>(),
        prekey_seed in any::<[u8; 32]>(),
        rounds in prop::collection::vec(
            (prop::collection::vec(any::<u8>(), 0..512), prop::collection::vec(any::<u8>(), 0..512)),
            1..8,
        ),
    )| {
        let (mut alice, mut bob) = session_pair(secret, prekey_seed);

        for (i, (ping, pong)) in rounds.iter().enumerate() {
            let envelope = alice.encrypt(ping, &format!("ping-{i}"), None, 1001).unwrap();
            prop_assert_eq!(&bob.decrypt(&envelope).unwrap(), ping);

            let envelope = bob.encrypt(pong, &format!("pong-{i}"), None, 1001).unwrap();
            prop_assert_eq!(&alice.decrypt(&envelope).unwrap(), pong);
        }
    });
}

#[test]
fn prop_any_delivery_order_within_the_window_decrypts() {
    proptest!(|(
        secret in any::<[u8; 32]>(),
        prekey_seed in any::<[u8; 32]>(),
        order in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle(),
    )| {
        let (mut alice, mut bob) = session_pair(secret, prekey_seed);

        let envelopes: Vec<_> = (0..order.len())
            .map(|i| alice.encrypt(format!("m{i}").as_bytes(), &format!("msg-{i}"), None, 1001).unwrap())
            .collect();

        // PROPERTY: every permutation inside the skip window decrypts
        for &i in &order {
            prop_assert_eq!(bob.decrypt(&envelopes[i]).unwrap(), format!("m{i}").into_bytes());
        }
    });
}

#[test]
fn prop_replay_is_always_rejected() {
    proptest!(|(
        secret in any::<[u8; 32]>(),
        prekey_seed in any::<[u8; 32]>(),
        count in 1usize..10,
        replay_at in any::<prop::sample::Index>(),
    )| {
        let (mut alice, mut bob) = session_pair(secret, prekey_seed);

        let envelopes: Vec<_> = (0..count)
            .map(|i| alice.encrypt(b"payload", &format!("msg-{i}"), None, 1001).unwrap())
            .collect();
        for envelope in &envelopes {
            bob.decrypt(envelope).unwrap();
        }

        // PROPERTY: no delivered envelope ever decrypts twice
        let replayed = &envelopes[replay_at.index(envelopes.len())];
        prop_assert!(
            matches!(
                bob.decrypt(replayed),
                Err(EngineError::CounterMismatch { .. } | EngineError::Crypto(_))
            ),
            "replayed envelope must be rejected with CounterMismatch or Crypto error"
        );
    });
}

#[test]
fn prop_sessions_survive_state_roundtrips_mid_conversation() {
    proptest!(|(
        secret in any::<[u8; 32]>(),
        prekey_seed in any::<[u8; 32]>(),
        messages in 1usize..6,
    )| {
        let (mut alice, mut bob) = session_pair(secret, prekey_seed);

        for i in 0..messages {
            let envelope = alice.encrypt(b"before", &format!("a-{i}"), None, 1001).unwrap();
            bob.decrypt(&envelope).unwrap();

            // PROPERTY: serializing and restoring either side at any
            // point leaves the conversation intact
            alice = RatchetSession::from_state(&alice.to_state());
            bob = RatchetSession::from_state(&bob.to_state());

            let envelope = bob.encrypt(b"after", &format!("b-{i}"), None, 1001).unwrap();
            prop_assert_eq!(alice.decrypt(&envelope).unwrap(), b"after".to_vec());
        }
    });
}
