use thiserror::Error;

/// Failures raised while dispatching or relaying a signaling message.
///
/// `MalformedMessage` is transport-fatal: the connection that sent it is
/// closed. Every other variant is local to the operation that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("missing required field `{field}` in {message_type} payload")]
    Validation {
        message_type: &'static str,
        field: &'static str,
    },
    #[error("{message_type} from {peer_id} targets its own connection")]
    SelfTarget {
        message_type: &'static str,
        peer_id: String,
    },
    #[error("{0} not found")]
    NotFound(Missing),
    #[error("peer {peer_id} is not a member of channel {channel}")]
    NotAMember { channel: String, peer_id: String },
}

/// What a `NotFound` failure was looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Channel(String),
    Peer(String),
    PendingOffer {
        channel: String,
        offerer: String,
        target: String,
    },
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Channel(channel) => write!(f, "channel {channel}"),
            Missing::Peer(peer_id) => write!(f, "peer {peer_id}"),
            Missing::PendingOffer {
                channel,
                offerer,
                target,
            } => write!(
                f,
                "pending offer from {offerer} to {target} in channel {channel}"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedMessage,
    Validation,
    NotFound,
    NotAMember,
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::MalformedMessage(_) => ErrorKind::MalformedMessage,
            RelayError::Validation { .. } | RelayError::SelfTarget { .. } => {
                ErrorKind::Validation
            }
            RelayError::NotFound(_) => ErrorKind::NotFound,
            RelayError::NotAMember { .. } => ErrorKind::NotAMember,
        }
    }

    /// Whether the connection that caused this error must be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::MalformedMessage(_))
    }

    pub(crate) fn missing(message_type: &'static str, field: &'static str) -> Self {
        RelayError::Validation {
            message_type,
            field,
        }
    }

    pub(crate) fn self_target(message_type: &'static str, peer_id: &str) -> Self {
        RelayError::SelfTarget {
            message_type,
            peer_id: peer_id.to_string(),
        }
    }

    pub(crate) fn not_a_member(channel: &str, peer_id: &str) -> Self {
        RelayError::NotAMember {
            channel: channel.to_string(),
            peer_id: peer_id.to_string(),
        }
    }
}
