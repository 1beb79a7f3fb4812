//! Long-term identity key lifecycle.
//!
//! One current keypair at a time, rotated on an interval or on a
//! compromise signal. A bounded history of retired keys is kept just
//! long enough to decrypt in-flight messages, then purged.
//!
//! All functions take `now` explicitly (seconds since the Unix epoch)
//! so rotation policy is deterministic under test.

use std::time::Duration;

use rand::{RngCore, rngs::OsRng};

use crate::{error::CryptoError, keys::Keypair};

/// Default rotation interval (30 days).
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default evaluation cadence for [`IdentityKeyManager::check_and_rotate`]
/// (24 hours). Callers schedule the periodic check; the manager only
/// decides whether rotation is due.
pub const ROTATION_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Identity key lifecycle configuration.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// How long a key is valid for encryption after creation.
    pub rotation_interval: Duration,
    /// How long past expiry a retired key may still decrypt stragglers.
    pub overlap: Duration,
    /// Maximum number of retired keys retained for decryption.
    pub max_previous: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            rotation_interval: DEFAULT_ROTATION_INTERVAL,
            overlap: Duration::from_secs(7 * 24 * 60 * 60),
            max_previous: 3,
        }
    }
}

/// A long-term identity keypair with lifecycle metadata.
#[derive(Debug, Clone)]
pub struct IdentityKey {
    key_id: String,
    keypair: Keypair,
    created_at: u64,
    expires_at: u64,
    compromised: bool,
}

impl IdentityKey {
    /// Rebuild a key from persisted fields.
    pub fn restore(
        key_id: String,
        secret_bytes: [u8; 32],
        created_at: u64,
        expires_at: u64,
        compromised: bool,
    ) -> Self {
        Self {
            key_id,
            keypair: Keypair::from_secret_bytes(secret_bytes),
            created_at,
            expires_at,
            compromised,
        }
    }

    /// Random identifier for this key (16 bytes, hex).
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// The keypair itself.
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Creation timestamp (seconds since the Unix epoch).
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Expiry timestamp (seconds since the Unix epoch).
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Whether this key has been reported compromised.
    pub fn is_compromised(&self) -> bool {
        self.compromised
    }

    /// Whether this key may be used for new cryptographic operations.
    pub fn is_valid_for_use(&self, now: u64) -> bool {
        !self.compromised && now < self.expires_at
    }

    fn is_valid_for_decryption(&self, now: u64, overlap: Duration) -> bool {
        !self.compromised && now < self.expires_at + overlap.as_secs()
    }
}

/// Generates, expires, and rotates long-term identity keypairs.
///
/// # Invariants
///
/// - At most one current key.
/// - At most `max_previous` retired keys, all non-expired (within the
///   overlap window) and non-compromised.
pub struct IdentityKeyManager {
    current: Option<IdentityKey>,
    previous: Vec<IdentityKey>,
    config: IdentityConfig,
}

impl IdentityKeyManager {
    /// Create a manager with no keys yet.
    pub fn new(config: IdentityConfig) -> Self {
        Self { current: None, previous: Vec::new(), config }
    }

    /// Rebuild a manager from persisted keys.
    pub fn restore(
        config: IdentityConfig,
        current: Option<IdentityKey>,
        previous: Vec<IdentityKey>,
    ) -> Self {
        Self { current, previous, config }
    }

    /// The current key regardless of validity, for persistence.
    pub fn current_key(&self) -> Option<&IdentityKey> {
        self.current.as_ref()
    }

    /// Retired keys still retained, for persistence.
    pub fn previous_keys(&self) -> &[IdentityKey] {
        &self.previous
    }

    /// Generate a new current key, retiring the previous one.
    ///
    /// Expired and compromised keys are discarded from history and the
    /// history is capped at `max_previous` entries (oldest dropped).
    pub fn generate(&mut self, now: u64) -> &IdentityKey {
        if let Some(old) = self.current.take() {
            self.previous.push(old);
        }

        self.previous.retain(|key| key.is_valid_for_decryption(now, self.config.overlap));
        while self.previous.len() > self.config.max_previous {
            self.previous.remove(0);
        }

        let keypair = Keypair::generate();
        let mut id_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut id_bytes);

        let key = IdentityKey {
            key_id: hex::encode(id_bytes),
            keypair,
            created_at: now,
            expires_at: now + self.config.rotation_interval.as_secs(),
            compromised: false,
        };

        self.current = Some(key);
        // Just inserted above
        let Some(current) = self.current.as_ref() else {
            unreachable!("current key was installed on the previous line");
        };
        current
    }

    /// The current key, valid for new cryptographic operations.
    ///
    /// # Errors
    ///
    /// `KeyExpired` if the current key has lapsed or was reported
    /// compromised. Callers must not touch ciphertext before this
    /// check passes.
    pub fn current(&self, now: u64) -> Result<&IdentityKey, CryptoError> {
        match &self.current {
            Some(key) if key.is_valid_for_use(now) => Ok(key),
            Some(key) => Err(CryptoError::KeyExpired {
                key_id: key.key_id.clone(),
                expires_at: key.expires_at,
            }),
            None => Err(CryptoError::KeyExpired { key_id: String::new(), expires_at: 0 }),
        }
    }

    /// Periodic rotation check. Rotates when the interval elapsed or
    /// the current key is compromised. Returns true if a rotation
    /// happened.
    pub fn check_and_rotate(&mut self, now: u64) -> bool {
        let due = match &self.current {
            Some(key) => !key.is_valid_for_use(now),
            None => true,
        };

        if due {
            self.generate(now);
        }
        due
    }

    /// Report the current key compromised and rotate immediately.
    ///
    /// The compromised key is not retained for decryption.
    pub fn mark_compromised(&mut self, now: u64) -> &IdentityKey {
        if let Some(key) = self.current.as_mut() {
            key.compromised = true;
        }
        self.generate(now)
    }

    /// Look up a key by id for decrypting in-flight messages.
    ///
    /// Finds the current key or a retired one still inside the overlap
    /// window. Returns `None` for unknown, purged, or compromised keys.
    pub fn decryption_key(&self, key_id: &str, now: u64) -> Option<&IdentityKey> {
        if let Some(key) = &self.current {
            if key.key_id == key_id && !key.compromised {
                return Some(key);
            }
        }
        self.previous
            .iter()
            .find(|key| key.key_id == key_id && key.is_valid_for_decryption(now, self.config.overlap))
    }

    /// Number of retired keys currently retained.
    pub fn previous_count(&self) -> usize {
        self.previous.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 24 * 60 * 60;

    fn manager() -> IdentityKeyManager {
        IdentityKeyManager::new(IdentityConfig::default())
    }

    #[test]
    fn generate_installs_a_current_key() {
        let mut mgr = manager();
        let key_id = mgr.generate(1000).key_id().to_owned();

        let current = mgr.current(1000).unwrap();
        assert_eq!(current.key_id(), key_id);
        assert_eq!(current.created_at(), 1000);
    }

    #[test]
    fn current_fails_with_key_expired_after_interval() {
        let mut mgr = manager();
        mgr.generate(0);

        let expired_at = 31 * DAY;
        let result = mgr.current(expired_at);
        assert!(matches!(result, Err(CryptoError::KeyExpired { .. })));
    }

    #[test]
    fn current_fails_before_any_key_exists() {
        let mgr = manager();
        assert!(matches!(mgr.current(0), Err(CryptoError::KeyExpired { .. })));
    }

    #[test]
    fn check_and_rotate_is_a_noop_while_valid() {
        let mut mgr = manager();
        mgr.generate(0);
        let key_id = mgr.current(0).unwrap().key_id().to_owned();

        assert!(!mgr.check_and_rotate(DAY));
        assert_eq!(mgr.current(DAY).unwrap().key_id(), key_id);
    }

    #[test]
    fn check_and_rotate_replaces_an_expired_key() {
        let mut mgr = manager();
        mgr.generate(0);
        let old_id = mgr.current(0).unwrap().key_id().to_owned();

        assert!(mgr.check_and_rotate(31 * DAY));
        let new = mgr.current(31 * DAY).unwrap();
        assert_ne!(new.key_id(), old_id);
    }

    #[test]
    fn mark_compromised_rotates_and_drops_the_key() {
        let mut mgr = manager();
        mgr.generate(0);
        let old_id = mgr.current(0).unwrap().key_id().to_owned();

        let new = mgr.mark_compromised(100);
        assert_ne!(new.key_id(), old_id);

        // Compromised keys must not decrypt anything
        assert!(mgr.decryption_key(&old_id, 100).is_none());
    }

    #[test]
    fn retired_keys_decrypt_within_overlap_then_purge() {
        let mut mgr = manager();
        mgr.generate(0);
        let old_id = mgr.current(0).unwrap().key_id().to_owned();

        mgr.generate(100);
        assert!(mgr.decryption_key(&old_id, 200).is_some());

        // Past expiry plus overlap the key is gone
        mgr.generate(40 * DAY);
        assert!(mgr.decryption_key(&old_id, 40 * DAY).is_none());
    }

    #[test]
    fn history_is_capped_at_max_previous() {
        let mut mgr = manager();
        for i in 0..6 {
            mgr.generate(i * 10);
        }
        assert!(mgr.previous_count() <= 3);
    }
}
