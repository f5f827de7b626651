use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channels::ChannelRegistry;
use crate::config::Config;
use crate::error::{Missing, RelayError};
use crate::events::{P2pUpgrade, Subscription, SubscriptionId, UpgradeNotifier};
use crate::ledger::{ConnectionLedger, LinkKey};
use crate::peers::{CloseReason, Outbound, PeerRegistry};
use crate::pending::{OfferKey, PendingOffers};
use crate::signaling::{PeerId, ServerMessage, Signal};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// The relay engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    config: Config,
    peers: PeerRegistry,
    /// Channels, pending offers and links change together, so one lock
    /// guards all three. Never held across an await.
    tables: Mutex<Tables>,
    upgrades: UpgradeNotifier,
}

#[derive(Default)]
struct Tables {
    channels: ChannelRegistry,
    pending: PendingOffers,
    ledger: ConnectionLedger,
}

impl Tables {
    fn require_channel(&self, channel: &str) -> Result<(), RelayError> {
        if self.channels.exists(channel) {
            Ok(())
        } else {
            Err(RelayError::NotFound(Missing::Channel(channel.to_string())))
        }
    }

    fn require_member(&self, channel: &str, peer_id: &str) -> Result<(), RelayError> {
        if self.channels.is_member(channel, peer_id) {
            Ok(())
        } else {
            Err(RelayError::not_a_member(channel, peer_id))
        }
    }
}

/// What a peer cleanup removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Departure {
    pub was_connected: bool,
    pub channels: Vec<String>,
    pub pending_offers: usize,
    pub links: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    pub channel: String,
    pub members: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    pub peers: usize,
    pub channels: Vec<ChannelStats>,
    pub pending_offers: usize,
    /// Undirected peer links.
    pub links: usize,
    pub upgrade_subscribers: usize,
}

impl Relay {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                config,
                peers: PeerRegistry::default(),
                tables: Mutex::new(Tables::default()),
                upgrades: UpgradeNotifier::default(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Register a new connection and hand back its identity and the queue
    /// its writer task drains.
    pub fn connect(
        &self,
        remote_addr: Option<SocketAddr>,
    ) -> (PeerId, mpsc::UnboundedReceiver<Outbound>) {
        let (peer_id, rx) = self.inner.peers.register(remote_addr);
        if self.inner.config.verbose {
            info!(peer_id = %peer_id, remote_addr = ?remote_addr, "peer connected");
        } else {
            debug!(peer_id = %peer_id, remote_addr = ?remote_addr, "peer connected");
        }
        counter!("tidepool_connections_total", 1);
        gauge!("tidepool_peers_connected", self.inner.peers.len() as f64);
        (peer_id, rx)
    }

    /// Forget a peer everywhere: registry, channel membership, pending
    /// offers and links. Safe to call more than once.
    pub fn disconnect(&self, peer_id: &str) -> Departure {
        let handle = self.inner.peers.remove(peer_id);
        let was_connected = handle.is_some();
        let departure = {
            let mut tables = self.inner.tables.lock();
            Departure {
                was_connected,
                channels: tables.channels.remove_peer(peer_id),
                pending_offers: tables.pending.remove_peer(peer_id),
                links: tables.ledger.remove_peer(peer_id),
            }
        };

        if let Some(handle) = handle {
            if self.inner.config.verbose {
                info!(
                    peer_id = %peer_id,
                    session_secs = handle.session_secs(),
                    channels = ?departure.channels,
                    pending_offers = departure.pending_offers,
                    links = departure.links,
                    "peer disconnected"
                );
            } else {
                debug!(peer_id = %peer_id, "peer disconnected");
            }
            gauge!("tidepool_peers_connected", self.inner.peers.len() as f64);
        }
        departure
    }

    /// Add the sender to a channel. Returns `false` if it was already there.
    pub fn join_pool(&self, sender: &str, channel: &str) -> Result<bool, RelayError> {
        let joined = self.inner.tables.lock().channels.join(channel, sender);
        if joined {
            debug!(peer_id = %sender, channel = %channel, "peer joined channel");
        }
        Ok(joined)
    }

    /// Forward an offer to `target` and remember that an answer is owed.
    pub fn relay_offer(
        &self,
        sender: &str,
        target: &str,
        offer: Value,
        channel: &str,
    ) -> Result<(), RelayError> {
        if sender == target {
            return Err(RelayError::self_target(Signal::OFFER, sender));
        }
        let mut tables = self.inner.tables.lock();
        tables.require_channel(channel)?;
        tables.require_member(channel, target)?;
        tables.require_member(channel, sender)?;

        self.inner.peers.send(
            target,
            ServerMessage::Offer {
                source: sender.to_string(),
                offer,
            },
        )?;
        tables.pending.arm(OfferKey::new(channel, sender, target));
        drop(tables);

        debug!(from = %sender, to = %target, channel = %channel, "relayed offer");
        counter!("tidepool_offers_relayed_total", 1);
        Ok(())
    }

    /// Forward an answer to the peer whose offer it answers, then record the
    /// link and notify subscribers.
    pub fn relay_answer(
        &self,
        sender: &str,
        target: &str,
        answer: Value,
        channel: &str,
    ) -> Result<(), RelayError> {
        if sender == target {
            return Err(RelayError::self_target(Signal::ANSWER, sender));
        }
        let mut tables = self.inner.tables.lock();
        tables.require_channel(channel)?;
        tables.require_member(channel, target)?;
        tables.require_member(channel, sender)?;

        // The target must have offered to the sender.
        let key = OfferKey::new(channel, target, sender);
        if !tables.pending.contains(&key) {
            return Err(RelayError::NotFound(Missing::PendingOffer {
                channel: key.channel,
                offerer: key.offerer,
                target: key.target,
            }));
        }

        self.inner.peers.send(
            target,
            ServerMessage::Answer {
                source: sender.to_string(),
                answer,
            },
        )?;
        tables.pending.take(&key);
        tables.ledger.record(channel, sender, target);
        drop(tables);

        debug!(from = %sender, to = %target, channel = %channel, "relayed answer");
        counter!("tidepool_answers_relayed_total", 1);
        counter!("tidepool_p2p_upgrades_total", 1);
        self.inner.upgrades.emit(&P2pUpgrade {
            channel: channel.to_string(),
            answerer: sender.to_string(),
            offerer: target.to_string(),
        });
        Ok(())
    }

    /// Forward an ICE candidate as-is. No channel check.
    pub fn relay_candidate(
        &self,
        sender: &str,
        target: &str,
        candidate: Value,
    ) -> Result<(), RelayError> {
        self.inner
            .peers
            .send(target, ServerMessage::Candidate { candidate })?;
        debug!(from = %sender, to = %target, "relayed candidate");
        counter!("tidepool_candidates_relayed_total", 1);
        Ok(())
    }

    /// Record activity from the sender.
    pub fn keep_alive(&self, sender: &str) {
        self.inner.peers.touch(sender);
    }

    /// Explicit leave: close the sender's connection and forget it.
    pub fn kill(&self, sender: &str) -> Departure {
        self.inner.peers.close(sender, CloseReason::Kill);
        self.disconnect(sender)
    }

    /// Close a peer's connection because its last frame was unparseable.
    pub fn terminate(&self, peer_id: &str, reason: String) -> Departure {
        self.inner
            .peers
            .close(peer_id, CloseReason::Malformed(reason));
        self.disconnect(peer_id)
    }

    /// Close and forget every peer idle for longer than `timeout`.
    pub fn evict_idle(&self, timeout: Duration) -> Vec<PeerId> {
        let idle = self.inner.peers.idle_peers(timeout);
        for peer_id in &idle {
            info!(peer_id = %peer_id, "evicting idle peer");
            self.inner.peers.close(peer_id, CloseReason::Idle);
            self.disconnect(peer_id);
            counter!("tidepool_idle_evictions_total", 1);
        }
        idle
    }

    /// Periodically evict idle peers. Returns `None` when eviction is
    /// disabled in the config.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        if !self.inner.config.eviction_enabled() {
            return None;
        }
        let relay = self.clone();
        let timeout = self.inner.config.idle_timeout;
        // tokio's interval panics on a zero period
        let period = self.inner.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                relay.evict_idle(timeout);
            }
        }))
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.upgrades.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.upgrades.unsubscribe(id)
    }

    /// Channel members in join order; empty if the channel does not exist.
    pub fn members(&self, channel: &str) -> Vec<PeerId> {
        self.inner
            .tables
            .lock()
            .channels
            .members(channel)
            .map(<[PeerId]>::to_vec)
            .unwrap_or_default()
    }

    pub fn has_pending_offer(&self, channel: &str, offerer: &str, target: &str) -> bool {
        self.inner
            .tables
            .lock()
            .pending
            .contains(&OfferKey::new(channel, offerer, target))
    }

    pub fn pending_offer_count(&self) -> usize {
        self.inner.tables.lock().pending.len()
    }

    pub fn is_linked(&self, channel: &str, from: &str, to: &str) -> bool {
        self.inner.tables.lock().ledger.contains(channel, from, to)
    }

    /// Every directed ledger entry.
    pub fn links(&self) -> Vec<LinkKey> {
        self.inner.tables.lock().ledger.links()
    }

    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.inner.peers.contains(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn channel_count(&self) -> usize {
        self.inner.tables.lock().channels.len()
    }

    pub fn stats(&self) -> RelayStats {
        let tables = self.inner.tables.lock();
        let mut channels: Vec<ChannelStats> = tables
            .channels
            .iter()
            .map(|(channel, members)| ChannelStats {
                channel: channel.to_string(),
                members: members.len(),
            })
            .collect();
        channels.sort_by(|a, b| a.channel.cmp(&b.channel));
        RelayStats {
            peers: self.inner.peers.len(),
            channels,
            pending_offers: tables.pending.len(),
            links: tables.ledger.len() / 2,
            upgrade_subscribers: self.inner.upgrades.subscriber_count(),
        }
    }
}
