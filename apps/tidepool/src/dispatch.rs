use tracing::{debug, warn};

use crate::error::RelayError;
use crate::relay::Relay;
use crate::signaling::{Envelope, Signal};

/// Outcome of dispatching one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// The message was routed and its operation succeeded.
    Handled(&'static str),
    /// The sender asked to leave; its connection is being closed.
    Left,
    /// Unrecognised `type`, dropped for forward compatibility.
    Ignored(String),
    /// The operation failed. The connection stays open.
    Rejected(RelayError),
    /// The frame was unparseable. The connection has been closed.
    Terminated(RelayError),
}

impl Dispatch {
    pub fn closes_connection(&self) -> bool {
        matches!(self, Dispatch::Left | Dispatch::Terminated(_))
    }
}

/// Parse a raw frame from `sender` and run the operation it names.
pub fn dispatch(relay: &Relay, sender: &str, raw: &str) -> Dispatch {
    relay.keep_alive(sender);

    let envelope = match Envelope::parse(raw) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(
                peer_id = %sender,
                error = %err,
                "closing connection after malformed message"
            );
            relay.terminate(sender, err.to_string());
            return Dispatch::Terminated(err);
        }
    };

    let kind = envelope.kind.clone();
    let signal = match Signal::decode(envelope) {
        Ok(Some(signal)) => signal,
        Ok(None) => {
            debug!(peer_id = %sender, message_type = %kind, "ignoring unknown message type");
            return Dispatch::Ignored(kind);
        }
        Err(err) => return reject(sender, raw, err),
    };

    let message_type = signal.kind();
    match handle(relay, sender, signal) {
        Ok(dispatch) => dispatch,
        Err(err) => {
            debug!(peer_id = %sender, message_type, "operation failed");
            reject(sender, raw, err)
        }
    }
}

fn handle(relay: &Relay, sender: &str, signal: Signal) -> Result<Dispatch, RelayError> {
    let message_type = signal.kind();
    match signal {
        Signal::JoinPool { channel } => {
            relay.join_pool(sender, &channel)?;
        }
        Signal::Offer {
            target,
            offer,
            channel,
        } => relay.relay_offer(sender, &target, offer, &channel)?,
        Signal::Answer {
            target,
            answer,
            channel,
        } => relay.relay_answer(sender, &target, answer, &channel)?,
        Signal::Candidate { target, candidate } => {
            relay.relay_candidate(sender, &target, candidate)?
        }
        // Activity was already recorded on receipt.
        Signal::KeepAlive {} => {}
        Signal::Kill {} => {
            relay.kill(sender);
            return Ok(Dispatch::Left);
        }
    }
    Ok(Dispatch::Handled(message_type))
}

fn reject(sender: &str, raw: &str, err: RelayError) -> Dispatch {
    warn!(
        peer_id = %sender,
        error = %err,
        message = %raw,
        "rejected signaling message"
    );
    Dispatch::Rejected(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{ErrorKind, Missing};
    use crate::peers::{CloseReason, Outbound};
    use crate::signaling::ServerMessage;
    use serde_json::json;

    fn send(relay: &Relay, sender: &str, message: serde_json::Value) -> Dispatch {
        dispatch(relay, sender, &message.to_string())
    }

    #[test_timeout::timeout]
    fn malformed_frames_terminate_only_the_sender() {
        let relay = Relay::new(Config::default());
        let (bad, mut bad_rx) = relay.connect(None);
        let (good, _good_rx) = relay.connect(None);
        send(&relay, &good, json!({ "type": "join-pool", "payload": { "channel": "room1" } }));
        send(&relay, &bad, json!({ "type": "join-pool", "payload": { "channel": "room1" } }));

        let outcome = dispatch(&relay, &bad, "{not json");
        assert!(outcome.closes_connection());
        match outcome {
            Dispatch::Terminated(err) => assert_eq!(err.kind(), ErrorKind::MalformedMessage),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(
            bad_rx.try_recv(),
            Ok(Outbound::Close(CloseReason::Malformed(_)))
        ));
        assert!(!relay.is_connected(&bad));
        assert!(relay.is_connected(&good));
        assert_eq!(relay.members("room1"), vec![good.clone()]);
    }

    #[test_timeout::timeout]
    fn missing_type_terminates() {
        let relay = Relay::new(Config::default());
        let (peer, _rx) = relay.connect(None);
        let outcome = send(&relay, &peer, json!({ "payload": { "channel": "room1" } }));
        assert!(matches!(outcome, Dispatch::Terminated(_)));
        assert!(!relay.is_connected(&peer));
    }

    #[test_timeout::timeout]
    fn operation_errors_keep_the_connection() {
        let relay = Relay::new(Config::default());
        let (peer, _rx) = relay.connect(None);

        let outcome = send(&relay, &peer, json!({ "type": "join-pool", "payload": {} }));
        assert_eq!(outcome, Dispatch::Rejected(RelayError::missing("join-pool", "channel")));
        assert!(!outcome.closes_connection());

        let outcome = send(
            &relay,
            &peer,
            json!({ "type": "candidate", "payload": { "target": "ghost", "candidate": {} } }),
        );
        assert_eq!(
            outcome,
            Dispatch::Rejected(RelayError::NotFound(Missing::Peer("ghost".into())))
        );

        // Later messages are still processed.
        let outcome = send(&relay, &peer, json!({ "type": "join-pool", "payload": { "channel": "room1" } }));
        assert_eq!(outcome, Dispatch::Handled("join-pool"));
        assert!(relay.is_connected(&peer));
    }

    #[test_timeout::timeout]
    fn unknown_types_are_ignored() {
        let relay = Relay::new(Config::default());
        let (peer, _rx) = relay.connect(None);
        let outcome = send(&relay, &peer, json!({ "type": "renegotiate", "payload": {} }));
        assert_eq!(outcome, Dispatch::Ignored("renegotiate".into()));
        assert!(relay.is_connected(&peer));
    }

    #[test_timeout::timeout]
    fn routes_offer_with_sender_identity() {
        let relay = Relay::new(Config::default());
        let (a, _a_rx) = relay.connect(None);
        let (b, mut b_rx) = relay.connect(None);
        for peer in [&a, &b] {
            send(&relay, peer, json!({ "type": "join-pool", "payload": { "channel": "room1" } }));
        }

        let outcome = send(
            &relay,
            &a,
            json!({
                "type": "offer",
                "payload": { "target": b, "channel": "room1", "offer": { "type": "offer", "sdp": "v=0" } }
            }),
        );
        assert_eq!(outcome, Dispatch::Handled("offer"));
        assert_eq!(
            b_rx.try_recv().unwrap(),
            Outbound::Message(ServerMessage::Offer {
                source: a.clone(),
                offer: json!({ "type": "offer", "sdp": "v=0" }),
            })
        );
    }

    #[test_timeout::timeout]
    fn kill_leaves() {
        let relay = Relay::new(Config::default());
        let (peer, mut rx) = relay.connect(None);
        let outcome = send(&relay, &peer, json!({ "type": "kill", "payload": {} }));
        assert_eq!(outcome, Dispatch::Left);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close(CloseReason::Kill));
        assert!(!relay.is_connected(&peer));
    }

    #[test_timeout::timeout]
    fn keep_alive_is_handled() {
        let relay = Relay::new(Config::default());
        let (peer, _rx) = relay.connect(None);
        let outcome = send(&relay, &peer, json!({ "type": "keep-alive", "payload": {} }));
        assert_eq!(outcome, Dispatch::Handled("keep-alive"));
    }
}
