use std::borrow::Cow;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::dispatch::dispatch;
use crate::peers::{CloseReason, Outbound};
use crate::relay::Relay;

/// How long the writer gets to flush a close frame after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
    State(relay): State<Relay>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, relay, remote_addr))
}

fn close_frame(reason: &CloseReason) -> CloseFrame<'static> {
    match reason {
        CloseReason::Malformed(_) => CloseFrame {
            code: close_code::POLICY,
            reason: Cow::Borrowed("malformed message"),
        },
        CloseReason::Kill => CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::Borrowed("bye"),
        },
        CloseReason::Idle => CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::Borrowed("idle timeout"),
        },
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, relay: Relay, remote_addr: SocketAddr) {
    let (peer_id, mut rx) = relay.connect(Some(remote_addr));
    let (mut sender, mut receiver) = socket.split();

    // Forward queued messages to the socket until closed
    let writer_peer = peer_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Message(message) => match serde_json::to_string(&message) {
                    Ok(json) => {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(peer_id = %writer_peer, error = %e, "failed to encode message"),
                },
                Outbound::Close(reason) => {
                    let _ = sender.send(Message::Close(Some(close_frame(&reason)))).await;
                    break;
                }
            }
        }
        debug!(peer_id = %writer_peer, "writer task ended");
    });

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let msg = match frame {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        debug!(peer_id = %peer_id, error = %e, "websocket error");
                        break;
                    }
                    None => break,
                };

                let text = match msg {
                    Message::Text(text) => text,
                    // Binary frames are accepted when they carry UTF-8 JSON.
                    Message::Binary(data) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!(peer_id = %peer_id, "closing connection after non-UTF8 binary frame");
                            relay.terminate(&peer_id, "binary frame is not UTF-8".to_string());
                            break;
                        }
                    },
                    Message::Close(_) => {
                        debug!(peer_id = %peer_id, "received close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => {
                        relay.keep_alive(&peer_id);
                        continue;
                    }
                };

                if dispatch(&relay, &peer_id, &text).closes_connection() {
                    break;
                }
            }
            _ = &mut writer => {
                debug!(peer_id = %peer_id, "writer finished, closing reader");
                break;
            }
        }
    }

    // Clean up on disconnect. Dropping the registry entry releases the
    // writer's queue, so it exits once any close frame is flushed.
    relay.disconnect(&peer_id);
    if !writer.is_finished() {
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
        }
    }
}
