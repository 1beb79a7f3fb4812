//! Transport boundary.
//!
//! The engine never performs network I/O itself. Direct delivery goes
//! through [`Transport`]; when the recipient is unreachable, encoded
//! envelopes are handed to a [`Relay`] for store-and-forward with a
//! bounded retention window. Payloads crossing this boundary are
//! always fully encrypted envelopes, so a relay learns nothing past
//! routing metadata.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;

/// How long a relay holds an undelivered envelope before dropping it.
pub const DEFAULT_RELAY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Direct peer-to-peer delivery.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempt direct delivery of an encoded envelope.
    ///
    /// Returns true if the payload was handed off to the peer. A false
    /// return is a transient failure; the outbox schedules a retry.
    async fn send(&self, peer_id: &str, payload: &[u8]) -> bool;

    /// Whether a direct path to the peer currently exists.
    async fn is_connected(&self, peer_id: &str) -> bool;
}

/// Store-and-forward fallback for offline recipients.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Post an encoded envelope for later pickup.
    ///
    /// Returns true if the relay accepted the payload. The relay drops
    /// the payload after `ttl` elapses without pickup.
    async fn post(&self, recipient_id: &str, payload: &[u8], ttl: Duration) -> bool;
}

#[derive(Debug, Default)]
struct MemoryTransportState {
    connected: HashSet<String>,
    delivered: Vec<(String, Vec<u8>)>,
}

/// In-memory transport for tests and simulations.
///
/// Topology is controlled explicitly: a peer receives direct delivery
/// only after [`MemoryTransport::connect`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryTransportState>>,
}

impl MemoryTransport {
    /// Create a transport with no connected peers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a peer as directly reachable.
    pub fn connect(&self, peer_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.connected.insert(peer_id.to_string());
    }

    /// Mark a peer as unreachable.
    pub fn disconnect(&self, peer_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.connected.remove(peer_id);
    }

    /// Payloads delivered so far, in send order.
    pub fn delivered(&self) -> Vec<(String, Vec<u8>)> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.delivered.clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, peer_id: &str, payload: &[u8]) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.connected.contains(peer_id) {
            return false;
        }
        state.delivered.push((peer_id.to_string(), payload.to_vec()));
        true
    }

    async fn is_connected(&self, peer_id: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.connected.contains(peer_id)
    }
}

/// In-memory relay for tests and simulations.
///
/// Holds posted payloads until drained; TTL expiry is not simulated.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelay {
    posted: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    accepting: Arc<Mutex<bool>>,
}

impl MemoryRelay {
    /// Create a relay that accepts every post.
    pub fn new() -> Self {
        Self { posted: Arc::default(), accepting: Arc::new(Mutex::new(true)) }
    }

    /// Toggle whether the relay accepts posts.
    pub fn set_accepting(&self, accepting: bool) {
        *self.accepting.lock().unwrap_or_else(PoisonError::into_inner) = accepting;
    }

    /// Drain everything posted so far.
    pub fn drain(&self) -> Vec<(String, Vec<u8>)> {
        let mut posted = self.posted.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *posted)
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn post(&self, recipient_id: &str, payload: &[u8], _ttl: Duration) -> bool {
        if !*self.accepting.lock().unwrap_or_else(PoisonError::into_inner) {
            return false;
        }
        let mut posted = self.posted.lock().unwrap_or_else(PoisonError::into_inner);
        posted.push((recipient_id.to_string(), payload.to_vec()));
        true
    }
}
