//! Rendezvous and signaling relay for peer-to-peer connections.
//!
//! Peers connect over WebSocket, join named channels, and exchange
//! offer/answer/candidate messages through the relay until they can talk to
//! each other directly. See [`RelayServer`] for embedding and [`Relay`] for
//! the engine itself.

pub mod channels;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod peers;
pub mod pending;
pub mod relay;
pub mod server;
pub mod signaling;
pub mod websocket;

pub use config::Config;
pub use dispatch::{dispatch, Dispatch};
pub use error::{ErrorKind, RelayError};
pub use events::{P2pUpgrade, Subscription, SubscriptionId};
pub use relay::{Relay, RelayStats};
pub use server::RelayServer;
pub use signaling::{PeerId, ServerMessage, Signal};
