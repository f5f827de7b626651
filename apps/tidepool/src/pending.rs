use std::collections::HashSet;

use crate::signaling::PeerId;

/// An offer relayed from `offerer` to `target` inside `channel` that has not
/// been answered yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OfferKey {
    pub channel: String,
    pub offerer: PeerId,
    pub target: PeerId,
}

impl OfferKey {
    pub fn new(channel: &str, offerer: &str, target: &str) -> Self {
        Self {
            channel: channel.to_string(),
            offerer: offerer.to_string(),
            target: target.to_string(),
        }
    }

    fn involves(&self, peer_id: &str) -> bool {
        self.offerer == peer_id || self.target == peer_id
    }
}

#[derive(Debug, Default)]
pub struct PendingOffers {
    offers: HashSet<OfferKey>,
}

impl PendingOffers {
    /// Arm (or re-arm) the pending offer for this triple.
    pub fn arm(&mut self, key: OfferKey) {
        self.offers.insert(key);
    }

    pub fn contains(&self, key: &OfferKey) -> bool {
        self.offers.contains(key)
    }

    /// Consume the pending offer. Returns `false` if there was none.
    pub fn take(&mut self, key: &OfferKey) -> bool {
        self.offers.remove(key)
    }

    /// Drop every pending offer sent by or to `peer_id`.
    pub fn remove_peer(&mut self, peer_id: &str) -> usize {
        let before = self.offers.len();
        self.offers.retain(|key| !key.involves(peer_id));
        before - self.offers.len()
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}
