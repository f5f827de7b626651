use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::RelayError;

/// Opaque handle identifying one connected peer.
pub type PeerId = String;

/// Generate a unique peer ID
pub fn generate_peer_id() -> PeerId {
    Uuid::new_v4().to_string()
}

/// Validated inbound signaling message, one variant per `type` value.
///
/// Serializes to the same `{ "type", "payload" }` envelope it is decoded
/// from, which is what clients (and the probe) send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Signal {
    JoinPool {
        channel: String,
    },
    Offer {
        target: PeerId,
        offer: Value,
        channel: String,
    },
    Answer {
        target: PeerId,
        answer: Value,
        channel: String,
    },
    Candidate {
        target: PeerId,
        candidate: Value,
    },
    KeepAlive {},
    Kill {},
}

/// Messages the relay writes to a peer's connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerMessage {
    Offer { source: PeerId, offer: Value },
    Answer { source: PeerId, answer: Value },
    Candidate { candidate: Value },
}

/// Envelope of an inbound frame: both fields are required.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: String,
    pub payload: Value,
}

impl Envelope {
    /// Parse a raw frame. Anything that is not a JSON object carrying a
    /// string `type` and a non-null `payload` is a malformed message.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| RelayError::MalformedMessage(format!("invalid JSON: {e}")))?;
        let Value::Object(mut object) = value else {
            return Err(RelayError::MalformedMessage(
                "message is not a JSON object".to_string(),
            ));
        };

        let kind = match object.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(_) => {
                return Err(RelayError::MalformedMessage(
                    "`type` is not a string".to_string(),
                ))
            }
            None => return Err(RelayError::MalformedMessage("missing `type`".to_string())),
        };

        match object.remove("payload") {
            Some(Value::Null) | None => Err(RelayError::MalformedMessage(format!(
                "missing `payload` in {kind} message"
            ))),
            Some(payload) => Ok(Self { kind, payload }),
        }
    }
}

#[derive(Deserialize)]
struct RawJoinPool {
    channel: Option<String>,
}

#[derive(Deserialize)]
struct RawOffer {
    target: Option<String>,
    offer: Option<Value>,
    channel: Option<String>,
}

#[derive(Deserialize)]
struct RawAnswer {
    target: Option<String>,
    answer: Option<Value>,
    channel: Option<String>,
}

#[derive(Deserialize)]
struct RawCandidate {
    target: Option<String>,
    candidate: Option<Value>,
}

impl Signal {
    pub const JOIN_POOL: &'static str = "join-pool";
    pub const OFFER: &'static str = "offer";
    pub const ANSWER: &'static str = "answer";
    pub const CANDIDATE: &'static str = "candidate";
    pub const KEEP_ALIVE: &'static str = "keep-alive";
    pub const KILL: &'static str = "kill";

    /// Decode the payload for a known message type.
    ///
    /// Returns `Ok(None)` for unrecognised types so newer clients can send
    /// messages this relay does not understand yet.
    pub fn decode(envelope: Envelope) -> Result<Option<Self>, RelayError> {
        let Envelope { kind, payload } = envelope;
        let signal = match kind.as_str() {
            Self::JOIN_POOL => {
                let raw: RawJoinPool = payload_as(Self::JOIN_POOL, payload)?;
                Signal::JoinPool {
                    channel: required(Self::JOIN_POOL, "channel", raw.channel)?,
                }
            }
            Self::OFFER => {
                let raw: RawOffer = payload_as(Self::OFFER, payload)?;
                Signal::Offer {
                    target: required(Self::OFFER, "target", raw.target)?,
                    offer: required(Self::OFFER, "offer", raw.offer)?,
                    channel: required(Self::OFFER, "channel", raw.channel)?,
                }
            }
            Self::ANSWER => {
                let raw: RawAnswer = payload_as(Self::ANSWER, payload)?;
                Signal::Answer {
                    target: required(Self::ANSWER, "target", raw.target)?,
                    answer: required(Self::ANSWER, "answer", raw.answer)?,
                    channel: required(Self::ANSWER, "channel", raw.channel)?,
                }
            }
            Self::CANDIDATE => {
                let raw: RawCandidate = payload_as(Self::CANDIDATE, payload)?;
                Signal::Candidate {
                    target: required(Self::CANDIDATE, "target", raw.target)?,
                    candidate: required(Self::CANDIDATE, "candidate", raw.candidate)?,
                }
            }
            Self::KEEP_ALIVE => Signal::KeepAlive {},
            Self::KILL => Signal::Kill {},
            _ => return Ok(None),
        };
        Ok(Some(signal))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Signal::JoinPool { .. } => Self::JOIN_POOL,
            Signal::Offer { .. } => Self::OFFER,
            Signal::Answer { .. } => Self::ANSWER,
            Signal::Candidate { .. } => Self::CANDIDATE,
            Signal::KeepAlive {} => Self::KEEP_ALIVE,
            Signal::Kill {} => Self::KILL,
        }
    }
}

fn payload_as<T: DeserializeOwned>(
    message_type: &'static str,
    payload: Value,
) -> Result<T, RelayError> {
    // A payload that is not an object has none of the required fields.
    let payload = match payload {
        Value::Object(_) => payload,
        _ => Value::Object(Map::new()),
    };
    serde_json::from_value(payload).map_err(|_| RelayError::missing(message_type, "payload"))
}

fn required<T>(
    message_type: &'static str,
    field: &'static str,
    value: Option<T>,
) -> Result<T, RelayError> {
    value.ok_or_else(|| RelayError::missing(message_type, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn decode(raw: Value) -> Result<Option<Signal>, RelayError> {
        Signal::decode(Envelope::parse(&raw.to_string())?)
    }

    #[test_timeout::timeout]
    fn test_peer_id_generation() {
        let id1 = generate_peer_id();
        let id2 = generate_peer_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36); // UUID v4 format
    }

    #[test_timeout::timeout]
    fn envelope_requires_object_with_type_and_payload() {
        for raw in [
            "not json",
            "[1, 2, 3]",
            r#""offer""#,
            r#"{"payload": {}}"#,
            r#"{"type": 7, "payload": {}}"#,
            r#"{"type": "offer"}"#,
            r#"{"type": "offer", "payload": null}"#,
        ] {
            let err = Envelope::parse(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedMessage, "input: {raw}");
        }
    }

    #[test_timeout::timeout]
    fn decodes_offer_payload() {
        let signal = decode(json!({
            "type": "offer",
            "payload": { "target": "b", "channel": "room1", "offer": { "sdp": "v=0" } }
        }))
        .unwrap()
        .unwrap();

        assert_eq!(
            signal,
            Signal::Offer {
                target: "b".into(),
                offer: json!({ "sdp": "v=0" }),
                channel: "room1".into(),
            }
        );
    }

    #[test_timeout::timeout]
    fn missing_fields_are_validation_errors() {
        let err = decode(json!({ "type": "join-pool", "payload": {} })).unwrap_err();
        assert_eq!(err, RelayError::missing("join-pool", "channel"));

        let err = decode(json!({
            "type": "answer",
            "payload": { "target": "a", "channel": "room1" }
        }))
        .unwrap_err();
        assert_eq!(err, RelayError::missing("answer", "answer"));

        let err = decode(json!({ "type": "candidate", "payload": "oops" })).unwrap_err();
        assert_eq!(err, RelayError::missing("candidate", "target"));

        let err = decode(json!({
            "type": "offer",
            "payload": { "target": 42, "channel": "room1", "offer": {} }
        }))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test_timeout::timeout]
    fn unknown_types_decode_to_none() {
        assert_eq!(decode(json!({ "type": "presence", "payload": {} })).unwrap(), None);
    }

    #[test_timeout::timeout]
    fn reserved_types_ignore_their_payload() {
        assert_eq!(
            decode(json!({ "type": "keep-alive", "payload": 1 })).unwrap(),
            Some(Signal::KeepAlive {})
        );
        assert_eq!(
            decode(json!({ "type": "kill", "payload": {} })).unwrap(),
            Some(Signal::Kill {})
        );
    }

    #[test_timeout::timeout]
    fn signals_serialize_to_the_wire_envelope() {
        let join = serde_json::to_value(Signal::JoinPool {
            channel: "room1".into(),
        })
        .unwrap();
        assert_eq!(join, json!({ "type": "join-pool", "payload": { "channel": "room1" } }));

        let keep_alive = serde_json::to_value(Signal::KeepAlive {}).unwrap();
        assert_eq!(keep_alive, json!({ "type": "keep-alive", "payload": {} }));

        let candidate = serde_json::to_value(ServerMessage::Candidate {
            candidate: json!({ "candidate": "candidate:1 1 UDP 1 10.0.0.1 9 typ host" }),
        })
        .unwrap();
        assert_eq!(
            candidate,
            json!({
                "type": "candidate",
                "payload": { "candidate": { "candidate": "candidate:1 1 UDP 1 10.0.0.1 9 typ host" } }
            })
        );
    }
}
