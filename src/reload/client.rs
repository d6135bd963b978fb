//! Per-connection task for the live reload WebSocket.
//!
//! # Data Flow
//! ```text
//! ReloadChannel ── frame queue ──→ serve_client ── text frames ──→ browser
//!                                      ↑
//!                       browser frames (pong, close)
//! ```
//!
//! The task ends when the browser closes, a send fails, the registry drops
//! the client, or the heartbeat times out. It always unregisters itself.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::time::{self, Instant};

use crate::config::Heartbeat;
use crate::reload::channel::{ClientId, ReloadChannel};
use crate::reload::message::ReloadEvent;

/// Why a connection task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    ClientClosed,
    SendFailed,
    Unregistered,
    HeartbeatTimeout,
}

pub async fn serve_client(
    socket: WebSocket,
    channel: Arc<ReloadChannel>,
    heartbeat: Option<Heartbeat>,
) {
    let subscription = channel.register();
    let id = subscription.id;
    let mut frames = subscription.receiver;
    let (mut sender, mut receiver) = socket.split();

    tracing::info!(client = %id, clients = channel.client_count(), "Browser connected for live reload");

    let mut last_seen = Instant::now();
    // With heartbeats disabled the ticker still exists but its branch is never enabled.
    let period = heartbeat.map(|h| h.interval).unwrap_or(time::Duration::from_secs(3600));
    let mut ticker = time::interval_at(Instant::now() + period, period);

    let reason = loop {
        tokio::select! {
            frame = frames.recv() => {
                match frame {
                    Some(frame) => {
                        if sender.send(Message::Text(frame.as_ref().into())).await.is_err() {
                            break Disconnect::SendFailed;
                        }
                    }
                    None => {
                        let _ = sender.send(Message::Close(None)).await;
                        break Disconnect::Unregistered;
                    }
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        break Disconnect::ClientClosed;
                    }
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        match serde_json::from_str::<ReloadEvent>(text.as_str()) {
                            Ok(event) => tracing::trace!(client = %id, kind = event.kind(), "Client message"),
                            Err(_) => tracing::trace!(client = %id, "Ignoring unrecognized client message"),
                        }
                    }
                    Some(Ok(_)) => last_seen = Instant::now(),
                }
            }
            _ = ticker.tick(), if heartbeat.is_some() => {
                let Some(heartbeat) = heartbeat else { continue };
                if last_seen.elapsed() >= heartbeat.timeout {
                    let _ = sender.send(Message::Close(None)).await;
                    break Disconnect::HeartbeatTimeout;
                }
                if let Err(reason) = send_event(&mut sender, &ReloadEvent::ping()).await {
                    break reason;
                }
            }
        }
    };

    finish(&channel, id, reason);
}

async fn send_event<S>(sender: &mut S, event: &ReloadEvent) -> Result<(), Disconnect>
where
    S: SinkExt<Message> + Unpin,
{
    let json = serde_json::to_string(event).map_err(|_| Disconnect::SendFailed)?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| Disconnect::SendFailed)
}

fn finish(channel: &ReloadChannel, id: ClientId, reason: Disconnect) {
    channel.unregister(id);
    if reason == Disconnect::HeartbeatTimeout {
        crate::observability::metrics::record_eviction("heartbeat");
        tracing::warn!(client = %id, "Evicted unresponsive browser");
    } else {
        tracing::info!(client = %id, ?reason, "Browser disconnected");
    }
}
