//! Double Ratchet session for one peer pair.
//!
//! Every message advances a symmetric chain ratchet, and each side
//! periodically injects a fresh Diffie-Hellman output into the root
//! key, so a captured state snapshot exposes neither past messages
//! (forward secrecy) nor, once a rotation has passed, future ones.
//!
//! The session is a pure state machine: no I/O, no clock. Callers
//! supply timestamps and persist [`SessionState`] snapshots.

use std::collections::VecDeque;

use rand::{Rng, RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use quiver_crypto::{
    CryptoError, ChainRatchet, Keypair, MAX_EXTRA_PAD_BLOCKS, MessageKey, NONCE_RANDOM_SIZE,
    PublicKey, aead, derivation,
};
use quiver_proto::{Envelope, build_aad, version::ProtocolVersion};

use crate::error::EngineError;

/// Most skipped message keys retained per session. Oldest entries are
/// evicted first once the cap is reached.
pub const MAX_SKIPPED_KEYS: usize = 100;

/// Send-side ratchet rotation triggers after this many messages.
pub const ROTATE_AFTER_MESSAGES: u64 = 100;

/// Send-side ratchet rotation triggers after this many seconds.
pub const ROTATE_AFTER_SECS: u64 = 60 * 60;

/// A message key retained for an out-of-order message, keyed by the
/// ratchet public key of the chain it was derived in.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct SkippedKey {
    ratchet_key: [u8; 32],
    counter: u64,
    key: [u8; 32],
}

/// Persisted form of one chain ratchet.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct ChainState {
    key: [u8; 32],
    counter: u64,
}

/// Serializable snapshot of a session.
///
/// Contains live key material. Snapshots must only ever be written to
/// the secure storage partition, and are zeroized on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SessionState {
    local_id: String,
    peer_id: String,
    root_key: [u8; 32],
    our_ratchet_secret: [u8; 32],
    their_ratchet: Option<[u8; 32]>,
    send_chain: Option<ChainState>,
    recv_chain: Option<ChainState>,
    prev_send_count: u64,
    sends_since_rotation: u64,
    last_rotation_at: u64,
    skipped: Vec<SkippedKey>,
}

/// One end of a Double Ratchet session.
///
/// # Invariants
///
/// - The send-chain counter carried in envelopes is strictly
///   monotonic per chain; the receive path rejects anything at or
///   below the last consumed counter unless a cached skipped key
///   covers it.
/// - Chain keys that have been advanced past are zeroized.
pub struct RatchetSession {
    local_id: String,
    peer_id: String,
    root_key: [u8; 32],
    our_ratchet: Keypair,
    their_ratchet: Option<PublicKey>,
    send_chain: Option<ChainRatchet>,
    recv_chain: Option<ChainRatchet>,
    prev_send_count: u64,
    sends_since_rotation: u64,
    last_rotation_at: u64,
    skipped: VecDeque<SkippedKey>,
}

impl std::fmt::Debug for RatchetSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetSession")
            .field("local_id", &self.local_id)
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

impl RatchetSession {
    /// Initiator side: the handshake secret plus the responder's
    /// signed prekey establish the first send chain immediately, so
    /// the initiator can write before hearing back.
    ///
    /// # Errors
    ///
    /// `Crypto` if the prekey is rejected by the DH computation.
    pub fn initiate(
        local_id: &str,
        peer_id: &str,
        handshake_secret: &[u8; 32],
        their_prekey: PublicKey,
        now: u64,
    ) -> Result<Self, EngineError> {
        let our_ratchet = Keypair::generate();
        let dh = our_ratchet.diffie_hellman(&their_prekey)?;
        let (root_key, send_key) = derivation::derive_root(handshake_secret, dh.as_bytes());

        Ok(Self {
            local_id: local_id.to_string(),
            peer_id: peer_id.to_string(),
            root_key,
            our_ratchet,
            their_ratchet: Some(their_prekey),
            send_chain: Some(ChainRatchet::new(send_key)),
            recv_chain: None,
            prev_send_count: 0,
            sends_since_rotation: 0,
            last_rotation_at: now,
            skipped: VecDeque::new(),
        })
    }

    /// Responder side: the session starts receive-only. Chains come
    /// into existence when the initiator's first message arrives.
    pub fn respond(
        local_id: &str,
        peer_id: &str,
        handshake_secret: &[u8; 32],
        our_prekey: Keypair,
        now: u64,
    ) -> Self {
        Self {
            local_id: local_id.to_string(),
            peer_id: peer_id.to_string(),
            root_key: *handshake_secret,
            our_ratchet: our_prekey,
            their_ratchet: None,
            send_chain: None,
            recv_chain: None,
            prev_send_count: 0,
            sends_since_rotation: 0,
            last_rotation_at: now,
            skipped: VecDeque::new(),
        }
    }

    /// Peer this session talks to.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Encrypt a plaintext into a wire envelope.
    ///
    /// Performs any due ratchet rotation first, pads the plaintext to
    /// a block multiple, and binds sender, message id, timestamp, and
    /// group into the AEAD tag.
    ///
    /// # Errors
    ///
    /// `Crypto` if no send chain exists yet (a responder that has not
    /// received the initiator's first message) or on counter overflow.
    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        message_id: &str,
        group_id: Option<&str>,
        now: u64,
    ) -> Result<Envelope, EngineError> {
        self.rotate_if_needed(now)?;

        let Some(chain) = self.send_chain.as_mut() else {
            return Err(EngineError::Crypto(CryptoError::KeyExchange {
                reason: "send chain not established, peer must write first".to_string(),
            }));
        };
        let message_key = chain.advance()?;

        let mut suffix = [0u8; NONCE_RANDOM_SIZE];
        OsRng.fill_bytes(&mut suffix);
        let nonce = aead::build_nonce(message_key.counter(), suffix);

        let extra_blocks = OsRng.gen_range(0..=MAX_EXTRA_PAD_BLOCKS);
        let padded = aead::pad(plaintext, extra_blocks);

        let aad = build_aad(&self.local_id, message_id, now, group_id);
        let ciphertext = aead::encrypt(&padded, &message_key, &nonce, &aad);

        self.sends_since_rotation += 1;

        Ok(Envelope {
            id: message_id.to_string(),
            group_id: group_id.map(str::to_string),
            sender_id: self.local_id.clone(),
            recipient_id: Some(self.peer_id.clone()),
            ciphertext,
            nonce,
            counter: message_key.counter(),
            prev_counter: self.prev_send_count,
            ratchet_key: *self.our_ratchet.public().as_bytes(),
            aad,
            signature: None,
            timestamp: now,
            version: ProtocolVersion::CURRENT.to_string(),
        })
    }

    /// Decrypt a wire envelope.
    ///
    /// Handles, in order: AAD consistency, cached skipped keys, a
    /// remote ratchet rotation, bounded skip-ahead within the current
    /// chain, and finally the in-sequence case.
    ///
    /// # Errors
    ///
    /// - `Crypto(DecryptionFailed)` on AAD mismatch or tag failure
    /// - `CounterMismatch` on replayed counters or gaps wider than
    ///   [`MAX_SKIPPED_KEYS`]
    pub fn decrypt(&mut self, envelope: &Envelope) -> Result<Vec<u8>, EngineError> {
        let expected_aad =
            build_aad(&envelope.sender_id, &envelope.id, envelope.timestamp, envelope.group_id.as_deref());
        if envelope.aad != expected_aad {
            return Err(EngineError::Crypto(CryptoError::DecryptionFailed {
                reason: "envelope metadata does not match its AAD".to_string(),
            }));
        }

        if let Some(key) = self.peek_skipped(&envelope.ratchet_key, envelope.counter) {
            let plaintext = open(envelope, &key)?;
            self.discard_skipped(&envelope.ratchet_key, envelope.counter);
            return Ok(plaintext);
        }

        let remote_rotated = match &self.their_ratchet {
            Some(current) => current.as_bytes() != &envelope.ratchet_key,
            None => true,
        };
        if !remote_rotated {
            return self.decrypt_current_chain(envelope);
        }

        // The ratchet step is committed only if the message verifies.
        // A stale or forged ratchet key must not desynchronize the
        // session.
        let snapshot = self.to_state();
        match self.step_and_decrypt(envelope) {
            Ok(plaintext) => Ok(plaintext),
            Err(e) => {
                *self = Self::from_state(&snapshot);
                Err(e)
            }
        }
    }

    fn step_and_decrypt(&mut self, envelope: &Envelope) -> Result<Vec<u8>, EngineError> {
        self.cache_previous_chain(envelope.prev_counter)?;
        self.dh_ratchet(PublicKey::from_bytes(envelope.ratchet_key))?;
        self.decrypt_current_chain(envelope)
    }

    fn decrypt_current_chain(&mut self, envelope: &Envelope) -> Result<Vec<u8>, EngineError> {
        let Some(chain) = self.recv_chain.as_ref() else {
            return Err(EngineError::Crypto(CryptoError::KeyExchange {
                reason: "receive chain not established".to_string(),
            }));
        };

        if envelope.counter < chain.counter() {
            return Err(EngineError::CounterMismatch {
                expected: chain.counter(),
                got: envelope.counter,
            });
        }
        let gap = envelope.counter - chain.counter();
        if gap as usize > MAX_SKIPPED_KEYS {
            return Err(EngineError::CounterMismatch {
                expected: chain.counter(),
                got: envelope.counter,
            });
        }

        // Keys are derived on a working copy; the chain only advances
        // once the tag verifies. Garbage carrying a plausible counter
        // must not consume the key the real message needs.
        let mut working = ChainRatchet::restore(*chain.chain_key(), chain.counter());
        let mut skipped = Vec::new();
        while working.counter() < envelope.counter {
            let key = working.advance()?;
            skipped.push(SkippedKey {
                ratchet_key: envelope.ratchet_key,
                counter: key.counter(),
                key: *key.key(),
            });
        }
        let message_key = working.advance()?;
        let plaintext = open(envelope, &message_key)?;

        self.recv_chain = Some(working);
        for entry in skipped {
            self.cache_skipped(entry);
        }
        Ok(plaintext)
    }

    /// Inject a fresh DH output into the root key if the send chain
    /// is old enough, by message count or by wall-clock age.
    ///
    /// Returns whether a rotation happened. The next envelope carries
    /// the new ratchet public key; the peer steps its ratchet when it
    /// sees the unfamiliar key.
    ///
    /// # Errors
    ///
    /// `Crypto` if the DH computation rejects the peer's current key.
    pub fn rotate_if_needed(&mut self, now: u64) -> Result<bool, EngineError> {
        let due = self.sends_since_rotation >= ROTATE_AFTER_MESSAGES
            || now.saturating_sub(self.last_rotation_at) >= ROTATE_AFTER_SECS;
        if !due || self.send_chain.is_none() {
            return Ok(false);
        }
        let Some(their_ratchet) = self.their_ratchet else {
            return Ok(false);
        };

        let our_ratchet = Keypair::generate();
        let dh = our_ratchet.diffie_hellman(&their_ratchet)?;
        let (root_key, send_key) = derivation::derive_root(&self.root_key, dh.as_bytes());

        self.prev_send_count = self.send_chain.as_ref().map_or(0, ChainRatchet::counter);
        self.root_key.zeroize();
        self.root_key = root_key;
        self.our_ratchet = our_ratchet;
        self.send_chain = Some(ChainRatchet::new(send_key));
        self.sends_since_rotation = 0;
        self.last_rotation_at = now;

        debug!(peer_id = %self.peer_id, "ratchet rotated");
        Ok(true)
    }

    /// Snapshot the session for persistence.
    pub fn to_state(&self) -> SessionState {
        SessionState {
            local_id: self.local_id.clone(),
            peer_id: self.peer_id.clone(),
            root_key: self.root_key,
            our_ratchet_secret: self.our_ratchet.secret_bytes(),
            their_ratchet: self.their_ratchet.as_ref().map(|k| *k.as_bytes()),
            send_chain: self
                .send_chain
                .as_ref()
                .map(|c| ChainState { key: *c.chain_key(), counter: c.counter() }),
            recv_chain: self
                .recv_chain
                .as_ref()
                .map(|c| ChainState { key: *c.chain_key(), counter: c.counter() }),
            prev_send_count: self.prev_send_count,
            sends_since_rotation: self.sends_since_rotation,
            last_rotation_at: self.last_rotation_at,
            skipped: self.skipped.iter().cloned().collect(),
        }
    }

    /// Rebuild a session from a persisted snapshot.
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            local_id: state.local_id.clone(),
            peer_id: state.peer_id.clone(),
            root_key: state.root_key,
            our_ratchet: Keypair::from_secret_bytes(state.our_ratchet_secret),
            their_ratchet: state.their_ratchet.map(PublicKey::from_bytes),
            send_chain: state
                .send_chain
                .as_ref()
                .map(|c| ChainRatchet::restore(c.key, c.counter)),
            recv_chain: state
                .recv_chain
                .as_ref()
                .map(|c| ChainRatchet::restore(c.key, c.counter)),
            prev_send_count: state.prev_send_count,
            sends_since_rotation: state.sends_since_rotation,
            last_rotation_at: state.last_rotation_at,
            skipped: state.skipped.iter().cloned().collect(),
        }
    }

    /// The classic receive-side Double Ratchet step: derive the new
    /// receive chain from the peer's fresh key, then rotate our own
    /// key and derive the next send chain.
    fn dh_ratchet(&mut self, their_new: PublicKey) -> Result<(), EngineError> {
        let dh_recv = self.our_ratchet.diffie_hellman(&their_new)?;
        let (root_key, recv_key) = derivation::derive_root(&self.root_key, dh_recv.as_bytes());
        self.root_key.zeroize();
        self.root_key = root_key;
        self.recv_chain = Some(ChainRatchet::new(recv_key));
        self.their_ratchet = Some(their_new);

        let our_ratchet = Keypair::generate();
        let dh_send = our_ratchet.diffie_hellman(&their_new)?;
        let (root_key, send_key) = derivation::derive_root(&self.root_key, dh_send.as_bytes());
        self.root_key.zeroize();
        self.root_key = root_key;
        self.prev_send_count = self.send_chain.as_ref().map_or(0, ChainRatchet::counter);
        self.our_ratchet = our_ratchet;
        self.send_chain = Some(ChainRatchet::new(send_key));
        self.sends_since_rotation = 0;

        debug!(peer_id = %self.peer_id, "ratchet stepped for new remote key");
        Ok(())
    }

    /// Before abandoning the current receive chain, derive and cache
    /// keys for its still-unreceived tail so late arrivals remain
    /// readable.
    fn cache_previous_chain(&mut self, prev_counter: u64) -> Result<(), EngineError> {
        let Some(previous_key) = self.their_ratchet.as_ref().map(|k| *k.as_bytes()) else {
            return Ok(());
        };
        let Some(chain) = self.recv_chain.as_mut() else {
            return Ok(());
        };
        if prev_counter <= chain.counter() {
            return Ok(());
        }
        if (prev_counter - chain.counter()) as usize > MAX_SKIPPED_KEYS {
            return Err(EngineError::CounterMismatch {
                expected: chain.counter(),
                got: prev_counter,
            });
        }

        let mut tail = Vec::new();
        while chain.counter() < prev_counter {
            let key = chain.advance()?;
            tail.push(SkippedKey {
                ratchet_key: previous_key,
                counter: key.counter(),
                key: *key.key(),
            });
        }
        for entry in tail {
            self.cache_skipped(entry);
        }
        Ok(())
    }

    fn cache_skipped(&mut self, entry: SkippedKey) {
        self.skipped.push_back(entry);
        while self.skipped.len() > MAX_SKIPPED_KEYS {
            // Evicted entries zeroize on drop.
            self.skipped.pop_front();
        }
    }

    fn peek_skipped(&self, ratchet_key: &[u8; 32], counter: u64) -> Option<MessageKey> {
        self.skipped
            .iter()
            .find(|s| &s.ratchet_key == ratchet_key && s.counter == counter)
            .map(|s| MessageKey::restore(s.key, s.counter))
    }

    /// Evict a cached key once its message has authenticated. Lookup
    /// and eviction are separate steps; a forged envelope never gets
    /// to consume the cached key.
    fn discard_skipped(&mut self, ratchet_key: &[u8; 32], counter: u64) {
        if let Some(index) = self
            .skipped
            .iter()
            .position(|s| &s.ratchet_key == ratchet_key && s.counter == counter)
        {
            self.skipped.remove(index);
        }
    }
}

impl Drop for RatchetSession {
    fn drop(&mut self) {
        self.root_key.zeroize();
    }
}

fn open(envelope: &Envelope, key: &MessageKey) -> Result<Vec<u8>, EngineError> {
    let padded = aead::decrypt(&envelope.ciphertext, key, &envelope.nonce, &envelope.aad)?;
    Ok(aead::unpad(&padded)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (RatchetSession, RatchetSession) {
        let secret = [7u8; 32];
        let bob_prekey = Keypair::generate();
        let alice =
            RatchetSession::initiate("alice", "bob", &secret, bob_prekey.public(), 1000).unwrap();
        let bob = RatchetSession::respond("bob", "alice", &secret, bob_prekey, 1000);
        (alice, bob)
    }

    #[test]
    fn round_trip_both_directions() {
        let (mut alice, mut bob) = pair();

        let envelope = alice.encrypt(b"hello bob", "m1", None, 1001).unwrap();
        assert_eq!(bob.decrypt(&envelope).unwrap(), b"hello bob");

        let reply = bob.encrypt(b"hello alice", "m2", None, 1002).unwrap();
        assert_eq!(alice.decrypt(&reply).unwrap(), b"hello alice");
    }

    #[test]
    fn responder_cannot_send_first() {
        let (_, mut bob) = pair();
        let err = bob.encrypt(b"too early", "m1", None, 1001).unwrap_err();
        assert!(matches!(err, EngineError::Crypto(CryptoError::KeyExchange { .. })));
    }

    #[test]
    fn replay_is_rejected() {
        let (mut alice, mut bob) = pair();

        let envelope = alice.encrypt(b"once", "m1", None, 1001).unwrap();
        bob.decrypt(&envelope).unwrap();

        let err = bob.decrypt(&envelope).unwrap_err();
        assert!(matches!(err, EngineError::CounterMismatch { .. }));
    }

    #[test]
    fn out_of_order_within_chain_uses_cached_keys() {
        let (mut alice, mut bob) = pair();

        let first = alice.encrypt(b"first", "m1", None, 1001).unwrap();
        let second = alice.encrypt(b"second", "m2", None, 1002).unwrap();
        let third = alice.encrypt(b"third", "m3", None, 1003).unwrap();

        assert_eq!(bob.decrypt(&third).unwrap(), b"third");
        assert_eq!(bob.decrypt(&first).unwrap(), b"first");
        assert_eq!(bob.decrypt(&second).unwrap(), b"second");
    }

    #[test]
    fn gap_beyond_skip_window_is_rejected() {
        let (mut alice, mut bob) = pair();

        let first = alice.encrypt(b"first", "m1", None, 1001).unwrap();
        bob.decrypt(&first).unwrap();

        let mut far = alice.encrypt(b"far ahead", "m2", None, 1002).unwrap();
        far.counter += MAX_SKIPPED_KEYS as u64 + 1;

        let err = bob.decrypt(&far).unwrap_err();
        assert!(matches!(err, EngineError::CounterMismatch { .. }));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let (mut alice, mut bob) = pair();

        let mut envelope = alice.encrypt(b"payload", "m1", None, 1001).unwrap();
        envelope.ciphertext[0] ^= 0x01;

        let err = bob.decrypt(&envelope).unwrap_err();
        assert!(matches!(err, EngineError::Crypto(CryptoError::DecryptionFailed { .. })));
        assert!(err.is_permanent());
    }

    #[test]
    fn altered_metadata_breaks_aad_binding() {
        let (mut alice, mut bob) = pair();

        let mut envelope = alice.encrypt(b"payload", "m1", None, 1001).unwrap();
        envelope.timestamp += 1;

        let err = bob.decrypt(&envelope).unwrap_err();
        assert!(matches!(err, EngineError::Crypto(CryptoError::DecryptionFailed { .. })));
    }

    #[test]
    fn rotation_after_message_count_changes_ratchet_key() {
        let (mut alice, mut bob) = pair();

        let before = alice.encrypt(b"warmup", "m0", None, 1001).unwrap();
        bob.decrypt(&before).unwrap();

        for i in 0..ROTATE_AFTER_MESSAGES {
            let envelope = alice.encrypt(b"bulk", &format!("bulk-{i}"), None, 1002).unwrap();
            bob.decrypt(&envelope).unwrap();
        }
        let after = alice.encrypt(b"post-rotation", "m-last", None, 1003).unwrap();
        assert_ne!(before.ratchet_key, after.ratchet_key);
        assert_eq!(bob.decrypt(&after).unwrap(), b"post-rotation");
    }

    #[test]
    fn rotation_after_elapsed_time() {
        let (mut alice, mut bob) = pair();

        let before = alice.encrypt(b"early", "m1", None, 1001).unwrap();
        bob.decrypt(&before).unwrap();

        let after = alice.encrypt(b"late", "m2", None, 1001 + ROTATE_AFTER_SECS).unwrap();
        assert_ne!(before.ratchet_key, after.ratchet_key);
        assert_eq!(bob.decrypt(&after).unwrap(), b"late");
    }

    #[test]
    fn late_arrival_across_rotation_still_decrypts() {
        let (mut alice, mut bob) = pair();

        let opening = alice.encrypt(b"opening", "m0", None, 1001).unwrap();
        bob.decrypt(&opening).unwrap();

        let delayed = alice.encrypt(b"delayed", "m1", None, 1002).unwrap();
        let prompt = alice.encrypt(b"prompt", "m2", None, 1001 + ROTATE_AFTER_SECS).unwrap();

        // The rotated envelope tells the receiver how long the old
        // chain was, so the key for the in-flight message is cached
        // before the ratchet steps.
        assert_eq!(bob.decrypt(&prompt).unwrap(), b"prompt");
        assert_eq!(bob.decrypt(&delayed).unwrap(), b"delayed");
    }

    #[test]
    fn forged_ratchet_key_does_not_corrupt_the_session() {
        let (mut alice, mut bob) = pair();

        let first = alice.encrypt(b"first", "m1", None, 1001).unwrap();
        bob.decrypt(&first).unwrap();

        let mut forged = alice.encrypt(b"second", "m2", None, 1002).unwrap();
        forged.ratchet_key = [0xEE; 32];
        bob.decrypt(&forged).unwrap_err();

        // The failed step was rolled back; the legitimate envelope
        // still decrypts.
        let second = alice.encrypt(b"third", "m3", None, 1003).unwrap();
        assert_eq!(bob.decrypt(&second).unwrap(), b"third");
    }

    #[test]
    fn forged_ciphertext_does_not_burn_the_chain_key() {
        let (mut alice, mut bob) = pair();

        let opening = alice.encrypt(b"opening", "m0", None, 1001).unwrap();
        bob.decrypt(&opening).unwrap();

        // Same counter and ratchet key as the real message, garbage
        // payload.
        let legit = alice.encrypt(b"the real one", "m1", None, 1002).unwrap();
        let mut forged = legit.clone();
        forged.ciphertext[0] ^= 0x01;

        bob.decrypt(&forged).unwrap_err();
        assert_eq!(bob.decrypt(&legit).unwrap(), b"the real one");
    }

    #[test]
    fn forged_ciphertext_does_not_evict_a_cached_skipped_key() {
        let (mut alice, mut bob) = pair();

        let first = alice.encrypt(b"first", "m1", None, 1001).unwrap();
        let second = alice.encrypt(b"second", "m2", None, 1002).unwrap();
        assert_eq!(bob.decrypt(&second).unwrap(), b"second");

        let mut forged = first.clone();
        forged.ciphertext[0] ^= 0x01;
        bob.decrypt(&forged).unwrap_err();

        // The key cached for the skipped counter survived the forgery.
        assert_eq!(bob.decrypt(&first).unwrap(), b"first");
    }

    #[test]
    fn state_round_trip_resumes_the_conversation() {
        let (mut alice, mut bob) = pair();

        let first = alice.encrypt(b"before snapshot", "m1", None, 1001).unwrap();
        bob.decrypt(&first).unwrap();

        let mut restored = RatchetSession::from_state(&alice.to_state());
        drop(alice);

        let second = restored.encrypt(b"after snapshot", "m2", None, 1002).unwrap();
        assert_eq!(bob.decrypt(&second).unwrap(), b"after snapshot");
    }

    #[test]
    fn padded_sizes_hide_exact_length() {
        let (mut alice, _) = pair();

        let envelope = alice.encrypt(b"x", "m1", None, 1001).unwrap();
        // 16-byte tag over a block-aligned padded payload.
        assert_eq!((envelope.ciphertext.len() - 16) % 256, 0);
    }
}
