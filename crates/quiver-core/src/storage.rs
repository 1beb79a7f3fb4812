//! Storage abstraction for engine state.
//!
//! The trait is synchronous so the session and group state machines
//! stay free of I/O concerns. Keys are namespaced strings; values are
//! opaque bytes (callers serialize with CBOR). Two partitions keep key
//! material apart from ordinary records: implementations are expected
//! to encrypt [`Partition::Secure`] at rest.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying storage access failed
    #[error("storage I/O error: {message}")]
    Io {
        /// What the backend reported
        message: String,
    },

    /// A stored record could not be serialized or deserialized
    #[error("storage serialization error: {message}")]
    Serialization {
        /// What failed to round-trip
        message: String,
    },
}

/// Which class of data a record belongs to.
///
/// Session state, chain keys, and identity keys go in `Secure`.
/// Outbox items carry only ciphertext and delivery metadata, so they
/// live in `Plain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Key material and ratchet state. Encrypted at rest.
    Secure,
    /// Delivery metadata and already-encrypted payloads.
    Plain,
}

/// Engine state persistence.
///
/// This trait must be:
/// - Clone: shared between the engine's state machines
/// - Send + Sync: safe under concurrent session access
/// - Synchronous: the async boundary stays at the transport
///
/// Clones share the same underlying store (implementations typically
/// wrap their state in an Arc).
pub trait Storage: Clone + Send + Sync + 'static {
    /// Read a record. Returns `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// `Io` if the backend read fails.
    fn get(&self, partition: Partition, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a record, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// `Io` if the backend write fails.
    fn put(&self, partition: Partition, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a record. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// `Io` if the backend delete fails.
    fn delete(&self, partition: Partition, key: &str) -> Result<(), StorageError>;

    /// List keys under a prefix, in unspecified order.
    ///
    /// # Errors
    ///
    /// `Io` if the backend scan fails.
    fn list(&self, partition: Partition, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// In-memory storage for tests and simulations.
///
/// All clones share the same map. Lock poisoning is absorbed rather
/// than propagated: a panicking test thread must not wedge every
/// other state machine holding a clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<HashMap<(Partition, String), Vec<u8>>>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across both partitions.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if no records exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, partition: Partition, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&(partition, key.to_string())).cloned())
    }

    fn put(&self, partition: Partition, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert((partition, key.to_string()), value.to_vec());
        Ok(())
    }

    fn delete(&self, partition: Partition, key: &str) -> Result<(), StorageError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.remove(&(partition, key.to_string()));
        Ok(())
    }

    fn list(&self, partition: Partition, prefix: &str) -> Result<Vec<String>, StorageError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .keys()
            .filter(|(p, k)| *p == partition && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_round_trip() {
        let storage = MemoryStorage::new();
        storage.put(Partition::Plain, "outbox/1", b"payload").unwrap();

        assert_eq!(storage.get(Partition::Plain, "outbox/1").unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn partitions_are_isolated() {
        let storage = MemoryStorage::new();
        storage.put(Partition::Secure, "session/bob", b"state").unwrap();

        assert_eq!(storage.get(Partition::Plain, "session/bob").unwrap(), None);
    }

    #[test]
    fn clones_share_state() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();
        clone.put(Partition::Plain, "k", b"v").unwrap();

        assert_eq!(storage.get(Partition::Plain, "k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn list_filters_by_prefix() {
        let storage = MemoryStorage::new();
        storage.put(Partition::Plain, "outbox/1", b"a").unwrap();
        storage.put(Partition::Plain, "outbox/2", b"b").unwrap();
        storage.put(Partition::Plain, "ack/1", b"c").unwrap();

        let mut keys = storage.list(Partition::Plain, "outbox/").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["outbox/1".to_string(), "outbox/2".to_string()]);
    }

    #[test]
    fn delete_missing_key_is_ok() {
        let storage = MemoryStorage::new();
        storage.delete(Partition::Plain, "nothing").unwrap();
    }
}
