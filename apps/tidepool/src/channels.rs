use std::collections::HashMap;

use crate::signaling::PeerId;

/// Channel id -> members in join order.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Vec<PeerId>>,
}

impl ChannelRegistry {
    /// Add a peer to a channel, creating the channel on first join.
    /// Returns `false` if the peer was already a member.
    pub fn join(&mut self, channel: &str, peer_id: &str) -> bool {
        let members = self.channels.entry(channel.to_string()).or_default();
        if members.iter().any(|member| member == peer_id) {
            return false;
        }
        members.push(peer_id.to_string());
        true
    }

    pub fn exists(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn is_member(&self, channel: &str, peer_id: &str) -> bool {
        self.channels
            .get(channel)
            .map(|members| members.iter().any(|member| member == peer_id))
            .unwrap_or(false)
    }

    pub fn members(&self, channel: &str) -> Option<&[PeerId]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PeerId])> {
        self.channels
            .iter()
            .map(|(channel, members)| (channel.as_str(), members.as_slice()))
    }

    /// Remove a peer from every channel it is in, dropping channels left
    /// empty. Returns the channels the peer was removed from.
    pub fn remove_peer(&mut self, peer_id: &str) -> Vec<String> {
        let mut left = Vec::new();
        self.channels.retain(|channel, members| {
            let before = members.len();
            members.retain(|member| member != peer_id);
            if members.len() != before {
                left.push(channel.clone());
            }
            !members.is_empty()
        });
        left
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn join_is_idempotent() {
        let mut channels = ChannelRegistry::default();
        assert!(channels.join("room1", "a"));
        assert!(!channels.join("room1", "a"));
        assert_eq!(channels.members("room1").unwrap(), ["a".to_string()]);
    }

    #[test_timeout::timeout]
    fn members_keep_join_order() {
        let mut channels = ChannelRegistry::default();
        channels.join("room1", "c");
        channels.join("room1", "a");
        channels.join("room1", "b");
        channels.join("room1", "a");
        assert_eq!(channels.members("room1").unwrap(), ["c", "a", "b"]);
    }

    #[test_timeout::timeout]
    fn peer_can_join_many_channels() {
        let mut channels = ChannelRegistry::default();
        channels.join("room1", "a");
        channels.join("room2", "a");
        assert!(channels.is_member("room1", "a"));
        assert!(channels.is_member("room2", "a"));
        assert!(!channels.is_member("room3", "a"));
        assert_eq!(channels.len(), 2);
    }

    #[test_timeout::timeout]
    fn remove_peer_drops_empty_channels() {
        let mut channels = ChannelRegistry::default();
        channels.join("room1", "a");
        channels.join("room1", "b");
        channels.join("room2", "a");

        let mut left = channels.remove_peer("a");
        left.sort();
        assert_eq!(left, ["room1", "room2"]);
        assert_eq!(channels.members("room1").unwrap(), ["b"]);
        assert!(!channels.exists("room2"));
        assert!(channels.remove_peer("a").is_empty());
    }
}
