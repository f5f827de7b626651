use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::signaling::PeerId;

/// Emitted once an answer is relayed: the two peers finished signaling and
/// are expected to connect directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct P2pUpgrade {
    pub channel: String,
    /// The peer that sent the answer.
    pub answerer: PeerId,
    /// The peer that sent the offer.
    pub offerer: PeerId,
}

impl P2pUpgrade {
    pub fn pair(&self) -> (&str, &str) {
        (&self.answerer, &self.offerer)
    }

    pub fn involves(&self, a: &str, b: &str) -> bool {
        (self.answerer == a && self.offerer == b) || (self.answerer == b && self.offerer == a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of an upgrade subscription.
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<P2pUpgrade>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<P2pUpgrade> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<P2pUpgrade> {
        self.events.try_recv().ok()
    }
}

/// Observer registry for `p2p-upgrade` events.
#[derive(Default)]
pub struct UpgradeNotifier {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<P2pUpgrade>>>,
}

impl UpgradeNotifier {
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().insert(id, tx);
        Subscription { id, events: rx }
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }

    /// Deliver an event to every live subscriber, forgetting the ones whose
    /// receiver was dropped.
    pub fn emit(&self, event: &P2pUpgrade) {
        self.subscribers
            .lock()
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
