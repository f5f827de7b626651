use std::collections::HashSet;

use serde::Serialize;

use crate::signaling::PeerId;

/// One direction of an upgraded peer link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LinkKey {
    pub channel: String,
    pub from: PeerId,
    pub to: PeerId,
}

impl LinkKey {
    pub fn new(channel: &str, from: &str, to: &str) -> Self {
        Self {
            channel: channel.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn mirrored(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }
}

/// Peer pairs that completed signaling. Every link is stored in both
/// directions.
#[derive(Debug, Default)]
pub struct ConnectionLedger {
    links: HashSet<LinkKey>,
}

impl ConnectionLedger {
    pub fn record(&mut self, channel: &str, a: &str, b: &str) {
        let link = LinkKey::new(channel, a, b);
        self.links.insert(link.mirrored());
        self.links.insert(link);
    }

    pub fn contains(&self, channel: &str, from: &str, to: &str) -> bool {
        self.links.contains(&LinkKey::new(channel, from, to))
    }

    /// Drop every link that has `peer_id` on either end.
    pub fn remove_peer(&mut self, peer_id: &str) -> usize {
        let before = self.links.len();
        self.links
            .retain(|link| link.from != peer_id && link.to != peer_id);
        before - self.links.len()
    }

    /// All directed entries, sorted.
    pub fn links(&self) -> Vec<LinkKey> {
        let mut links: Vec<_> = self.links.iter().cloned().collect();
        links.sort();
        links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
