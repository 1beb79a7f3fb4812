//! Durable delivery queue.
//!
//! Every outgoing envelope is persisted before the first delivery
//! attempt, so a crash between encrypt and send loses nothing. The
//! queue drains by priority, falls back from direct transport to the
//! relay, and retries with a fixed backoff schedule until the retry
//! budget is spent. Acknowledgments are delivery metadata only; a
//! lost ack never changes an item's status.

use std::collections::HashMap;

use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use quiver_proto::Envelope;

use crate::{
    error::EngineError,
    storage::{Partition, Storage, StorageError},
    transport::{DEFAULT_RELAY_TTL, Relay, Transport},
};

/// Total transmission attempts before an item is marked failed.
pub const MAX_RETRIES: u32 = 5;

/// Retry delays in seconds, indexed by how many attempts have failed.
/// The last entry repeats for any further attempts.
pub const BACKOFF_SCHEDULE: [u64; 6] = [1, 2, 5, 10, 30, 60];

/// How long sent items linger before purge removes them.
pub const SENT_RETENTION_SECS: u64 = 30 * 24 * 60 * 60;

const STORAGE_PREFIX: &str = "outbox/";

/// Delivery urgency. Higher drains first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Priority {
    /// Background traffic, e.g. receipts.
    Low,
    /// Ordinary messages.
    Normal,
    /// User-visible and time-sensitive.
    High,
}

/// Lifecycle of a queued item.
///
/// `Sent` is terminal; only `Failed` items can be re-queued, and only
/// by an explicit [`OutboxQueue::retry_failed`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Waiting for a delivery attempt.
    Pending,
    /// Handed to the transport or relay.
    Sent,
    /// Retry budget exhausted.
    Failed,
}

/// One queued envelope plus its delivery bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxItem {
    /// Queue-local id.
    pub id: String,
    /// Peer the envelope is addressed to.
    pub recipient_id: String,
    /// Message id inside the envelope, for ack correlation.
    pub message_id: String,
    /// Encoded envelope bytes, already encrypted.
    pub payload: Vec<u8>,
    /// Hash of the ciphertext, part of the deduplication key.
    pub content_hash: [u8; 32],
    /// Send timestamp from the envelope, part of the deduplication key.
    pub timestamp: u64,
    /// Delivery urgency.
    pub priority: Priority,
    /// Lifecycle state.
    pub status: DeliveryStatus,
    /// Failed transmission attempts so far.
    pub retry_count: u32,
    /// When the item entered the queue.
    pub created_at: u64,
    /// When the last transmission attempt happened.
    pub last_attempt_at: Option<u64>,
    /// When the item was handed off.
    pub sent_at: Option<u64>,
    /// When the recipient acknowledged the message.
    pub acknowledged_at: Option<u64>,
    /// Why the item failed, if it did.
    pub failure_reason: Option<String>,
}

/// Outcome of one [`OutboxQueue::process`] pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Items a transmission was attempted for.
    pub attempted: usize,
    /// Items handed off to the transport or relay.
    pub sent: usize,
    /// Items that crossed the retry budget this pass.
    pub failed: usize,
    /// Items still inside their backoff window.
    pub deferred: usize,
}

/// Result of enqueueing an envelope.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new item was persisted under this id.
    Queued(String),
    /// An identical item already exists under this id.
    Deduplicated(String),
}

impl EnqueueOutcome {
    /// The item id in either case.
    pub fn id(&self) -> &str {
        match self {
            Self::Queued(id) | Self::Deduplicated(id) => id,
        }
    }
}

/// Persistent queue of outgoing envelopes.
///
/// # Invariants
///
/// - Every item is persisted before `enqueue` returns.
/// - Status transitions are persisted before they take effect for
///   subsequent calls, so a reloaded queue never regresses.
pub struct OutboxQueue<S: Storage> {
    storage: S,
    items: HashMap<String, OutboxItem>,
    online: bool,
}

impl<S: Storage> OutboxQueue<S> {
    /// Rebuild the queue from persisted items. Starts offline.
    ///
    /// # Errors
    ///
    /// `Storage` on scan or read failure, `Storage(Serialization)` on
    /// a corrupt record.
    pub fn load(storage: S) -> Result<Self, EngineError> {
        let mut items = HashMap::new();
        for key in storage.list(Partition::Plain, STORAGE_PREFIX)? {
            let Some(bytes) = storage.get(Partition::Plain, &key)? else {
                continue;
            };
            let item: OutboxItem =
                ciborium::from_reader(bytes.as_slice()).map_err(|e| {
                    StorageError::Serialization { message: e.to_string() }
                })?;
            items.insert(item.id.clone(), item);
        }
        Ok(Self { storage, items, online: false })
    }

    /// Queue an envelope for delivery, persisting it first.
    ///
    /// Duplicate submissions (same recipient, ciphertext hash, and
    /// timestamp) collapse onto the existing item.
    ///
    /// # Errors
    ///
    /// `Protocol` if the envelope has no recipient or fails to
    /// encode, `Storage` if persistence fails.
    pub fn enqueue(
        &mut self,
        envelope: &Envelope,
        priority: Priority,
        now: u64,
    ) -> Result<EnqueueOutcome, EngineError> {
        let Some(recipient_id) = envelope.recipient_id.clone() else {
            return Err(EngineError::Protocol(quiver_proto::ProtocolError::Invalid(
                "outbox envelope has no recipient".to_string(),
            )));
        };
        let payload = envelope.encode()?;
        let content_hash: [u8; 32] = Sha256::digest(&envelope.ciphertext).into();

        if let Some(existing) = self.items.values().find(|item| {
            item.recipient_id == recipient_id
                && item.content_hash == content_hash
                && item.timestamp == envelope.timestamp
        }) {
            debug!(item_id = %existing.id, "duplicate enqueue collapsed");
            return Ok(EnqueueOutcome::Deduplicated(existing.id.clone()));
        }

        let item = OutboxItem {
            id: random_item_id(),
            recipient_id,
            message_id: envelope.id.clone(),
            payload,
            content_hash,
            timestamp: envelope.timestamp,
            priority,
            status: DeliveryStatus::Pending,
            retry_count: 0,
            created_at: now,
            last_attempt_at: None,
            sent_at: None,
            acknowledged_at: None,
            failure_reason: None,
        };
        self.persist(&item)?;
        let id = item.id.clone();
        self.items.insert(id.clone(), item);
        Ok(EnqueueOutcome::Queued(id))
    }

    /// Attempt delivery for every eligible pending item.
    ///
    /// Items drain by priority, then enqueue order. Each attempt
    /// tries the direct transport first and falls back to the relay.
    /// Does nothing while the queue is offline.
    ///
    /// # Errors
    ///
    /// `Storage` if persisting a status transition fails.
    pub async fn process<T, R>(
        &mut self,
        transport: &T,
        relay: &R,
        now: u64,
    ) -> Result<ProcessReport, EngineError>
    where
        T: Transport + ?Sized,
        R: Relay + ?Sized,
    {
        let mut report = ProcessReport::default();
        if !self.online {
            return Ok(report);
        }

        let mut order: Vec<String> = self
            .items
            .values()
            .filter(|item| item.status == DeliveryStatus::Pending)
            .map(|item| item.id.clone())
            .collect();
        order.sort_by(|a, b| {
            let ia = &self.items[a];
            let ib = &self.items[b];
            ib.priority
                .cmp(&ia.priority)
                .then(ia.created_at.cmp(&ib.created_at))
                .then(ia.id.cmp(&ib.id))
        });

        for id in order {
            let Some(item) = self.items.get(&id) else { continue };
            if let Some(last) = item.last_attempt_at {
                if now < last + backoff_delay(item.retry_count) {
                    report.deferred += 1;
                    continue;
                }
            }

            report.attempted += 1;
            let delivered = if transport.is_connected(&item.recipient_id).await {
                transport.send(&item.recipient_id, &item.payload).await
            } else {
                relay.post(&item.recipient_id, &item.payload, DEFAULT_RELAY_TTL).await
            };

            let Some(item) = self.items.get_mut(&id) else { continue };
            item.last_attempt_at = Some(now);
            if delivered {
                item.status = DeliveryStatus::Sent;
                item.sent_at = Some(now);
                report.sent += 1;
                debug!(item_id = %id, recipient = %item.recipient_id, "delivered");
            } else {
                item.retry_count += 1;
                if item.retry_count >= MAX_RETRIES {
                    item.status = DeliveryStatus::Failed;
                    let abandoned = EngineError::RetriesExhausted {
                        item_id: id.clone(),
                        attempts: item.retry_count,
                    };
                    item.failure_reason = Some(abandoned.to_string());
                    report.failed += 1;
                    warn!(item_id = %id, recipient = %item.recipient_id,
                        attempts = item.retry_count, "delivery abandoned");
                }
            }
            let snapshot = item.clone();
            self.persist(&snapshot)?;
        }
        Ok(report)
    }

    /// Re-queue a failed item, resetting its retry budget.
    ///
    /// Only failed items are eligible; sent and pending items are
    /// rejected.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` for an unknown id or an item that is
    /// not in the failed state, `Storage` if persistence fails.
    pub fn retry_failed(&mut self, item_id: &str) -> Result<(), EngineError> {
        let Some(item) = self.items.get_mut(item_id) else {
            return Err(EngineError::TransportUnavailable {
                reason: format!("no outbox item {item_id}"),
            });
        };
        if item.status != DeliveryStatus::Failed {
            return Err(EngineError::TransportUnavailable {
                reason: format!("item {item_id} is not failed"),
            });
        }
        item.status = DeliveryStatus::Pending;
        item.retry_count = 0;
        item.last_attempt_at = None;
        item.failure_reason = None;
        let snapshot = item.clone();
        self.persist(&snapshot)
    }

    /// Record a recipient acknowledgment for a message id.
    ///
    /// The match is on message id and recipient together; a group
    /// fan-out shares one message id across every per-member item.
    /// Pure metadata: the item's status is untouched. Returns whether
    /// a matching item existed.
    ///
    /// # Errors
    ///
    /// `Storage` if persisting the timestamp fails.
    pub fn acknowledge(
        &mut self,
        message_id: &str,
        recipient_id: &str,
        now: u64,
    ) -> Result<bool, EngineError> {
        let Some(item) = self.items.values_mut().find(|item| {
            item.message_id == message_id && item.recipient_id == recipient_id
        }) else {
            return Ok(false);
        };
        item.acknowledged_at = Some(now);
        let snapshot = item.clone();
        self.persist(&snapshot)?;
        Ok(true)
    }

    /// Drop sent items older than the retention window.
    ///
    /// Returns how many were removed.
    ///
    /// # Errors
    ///
    /// `Storage` if deleting a persisted record fails.
    pub fn purge_sent(&mut self, now: u64) -> Result<usize, EngineError> {
        let expired: Vec<String> = self
            .items
            .values()
            .filter(|item| {
                item.status == DeliveryStatus::Sent
                    && item.sent_at.is_some_and(|t| t + SENT_RETENTION_SECS <= now)
            })
            .map(|item| item.id.clone())
            .collect();

        for id in &expired {
            self.storage.delete(Partition::Plain, &storage_key(id))?;
            self.items.remove(id);
        }
        Ok(expired.len())
    }

    /// Update connectivity. Returns true on an offline-to-online
    /// transition, which is the caller's cue to run a process pass.
    pub fn set_online(&mut self, online: bool) -> bool {
        let came_online = online && !self.online;
        self.online = online;
        came_online
    }

    /// Look up an item.
    pub fn item(&self, item_id: &str) -> Option<&OutboxItem> {
        self.items.get(item_id)
    }

    /// Items queued for one recipient, sorted by send timestamp.
    /// Deduplicated resubmissions therefore always land in timestamp
    /// order regardless of when they were enqueued.
    pub fn history(&self, recipient_id: &str) -> Vec<&OutboxItem> {
        let mut items: Vec<&OutboxItem> = self
            .items
            .values()
            .filter(|item| item.recipient_id == recipient_id)
            .collect();
        items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        items
    }

    /// Number of items still pending.
    pub fn pending_count(&self) -> usize {
        self.items.values().filter(|i| i.status == DeliveryStatus::Pending).count()
    }

    fn persist(&self, item: &OutboxItem) -> Result<(), EngineError> {
        let mut buf = Vec::new();
        ciborium::into_writer(item, &mut buf)
            .map_err(|e| StorageError::Serialization { message: e.to_string() })?;
        self.storage.put(Partition::Plain, &storage_key(&item.id), &buf)?;
        Ok(())
    }
}

fn storage_key(item_id: &str) -> String {
    format!("{STORAGE_PREFIX}{item_id}")
}

fn backoff_delay(retry_count: u32) -> u64 {
    let index = (retry_count.saturating_sub(1) as usize).min(BACKOFF_SCHEDULE.len() - 1);
    BACKOFF_SCHEDULE[index]
}

fn random_item_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
