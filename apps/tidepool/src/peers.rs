use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Missing, RelayError};
use crate::signaling::{generate_peer_id, PeerId, ServerMessage};

/// Why the relay is closing a peer's connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Malformed(String),
    Kill,
    Idle,
}

/// Work item for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close(CloseReason),
}

/// Live connection handle for a single peer
#[derive(Clone)]
pub struct PeerHandle {
    pub peer_id: PeerId,
    pub remote_addr: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<Outbound>,
    last_seen: Arc<Mutex<Instant>>,
}

impl PeerHandle {
    fn push(&self, item: Outbound) {
        // Fire and forget: a dropped receiver means the connection is
        // already going away and its cleanup will run.
        if self.tx.send(item).is_err() {
            debug!(peer_id = %self.peer_id, "writer gone, dropping outbound item");
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Whole seconds since the connection was registered.
    pub fn session_secs(&self) -> i64 {
        (Utc::now() - self.connected_at).num_seconds()
    }
}

/// Peer id -> connection handle.
#[derive(Default)]
pub struct PeerRegistry {
    peers: DashMap<PeerId, PeerHandle>,
}

impl PeerRegistry {
    /// Register a new connection under a freshly generated identity.
    pub fn register(
        &self,
        remote_addr: Option<SocketAddr>,
    ) -> (PeerId, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer_id = generate_peer_id();
        let handle = PeerHandle {
            peer_id: peer_id.clone(),
            remote_addr,
            connected_at: Utc::now(),
            tx,
            last_seen: Arc::new(Mutex::new(Instant::now())),
        };
        self.peers.insert(peer_id.clone(), handle);
        (peer_id, rx)
    }

    pub fn remove(&self, peer_id: &str) -> Option<PeerHandle> {
        self.peers.remove(peer_id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Queue a message on a peer's connection.
    pub fn send(&self, peer_id: &str, message: ServerMessage) -> Result<(), RelayError> {
        let peer = self
            .peers
            .get(peer_id)
            .ok_or_else(|| RelayError::NotFound(Missing::Peer(peer_id.to_string())))?;
        peer.push(Outbound::Message(message));
        Ok(())
    }

    /// Ask a peer's writer to close the connection. Returns `false` if the
    /// peer is not registered.
    pub fn close(&self, peer_id: &str, reason: CloseReason) -> bool {
        match self.peers.get(peer_id) {
            Some(peer) => {
                peer.push(Outbound::Close(reason));
                true
            }
            None => false,
        }
    }

    /// Record activity from a peer.
    pub fn touch(&self, peer_id: &str) {
        if let Some(peer) = self.peers.get(peer_id) {
            *peer.last_seen.lock() = Instant::now();
        }
    }

    /// Peers that have been silent for longer than `timeout`.
    pub fn idle_peers(&self, timeout: Duration) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|entry| entry.value().idle_for() > timeout)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
