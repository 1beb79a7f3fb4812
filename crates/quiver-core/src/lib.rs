//! Quiver engine core.
//!
//! Protocol state machines and the service object that ties them to
//! their collaborators:
//!
//! - [`session`]: the Double Ratchet session for one peer pair
//! - [`group`]: pairwise group messaging with epoch rotation
//! - [`outbox`]: the durable delivery queue with retry and backoff
//! - [`storage`] and [`transport`]: the persistence and I/O seams
//! - [`engine`]: the [`MessagingEngine`] facade over all of the above
//!
//! The state machines are synchronous and clock-free; timestamps come
//! from the caller and I/O stays behind the [`Transport`] and
//! [`Relay`] traits. That split keeps every protocol decision
//! reproducible under test without a network or a tokio runtime.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod engine;
pub mod error;
pub mod group;
pub mod outbox;
pub mod session;
pub mod storage;
pub mod transport;

pub use engine::{
    EngineConfig, GroupDelivery, Incoming, IncomingMessage, MaintenanceReport, MessagingEngine,
    SessionInvite,
};
pub use error::EngineError;
pub use group::{Group, GroupConfig, GroupManager, GroupSendOutcome, GroupState, RotationInterval};
pub use outbox::{
    BACKOFF_SCHEDULE, DeliveryStatus, EnqueueOutcome, MAX_RETRIES, OutboxItem, OutboxQueue,
    Priority, ProcessReport, SENT_RETENTION_SECS,
};
pub use session::{
    MAX_SKIPPED_KEYS, ROTATE_AFTER_MESSAGES, ROTATE_AFTER_SECS, RatchetSession, SessionState,
};
pub use storage::{MemoryStorage, Partition, Storage, StorageError};
pub use transport::{DEFAULT_RELAY_TTL, MemoryRelay, MemoryTransport, Relay, Transport};
