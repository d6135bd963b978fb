//! Client registry and fan-out.
//!
//! # Responsibilities
//! - Hand each connection a bounded frame queue on registration
//! - Serialize an event once and enqueue it for every client
//! - Drop clients whose queue is closed or full
//! - Refuse registrations once `close_all` has run
//!
//! # Design Decisions
//! - Fire-and-forget, at-most-once: no acknowledgment, no retry
//! - Per-client FIFO queue keeps reload/error ordering per connection
//! - The socket itself is owned by the connection task, never by the registry

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::compile::artifact::{now_millis, Timestamp};
use crate::observability::metrics;
use crate::reload::message::ReloadEvent;

/// A serialized frame, shared by every client it is delivered to.
pub type Frame = Arc<str>;

static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a reload client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new() -> Self {
        Self(CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(Debug)]
struct ClientSlot {
    tx: mpsc::Sender<Frame>,
    connected_at: Timestamp,
}

/// The registration handed to a connection task.
#[derive(Debug)]
pub struct Subscription {
    pub id: ClientId,
    pub receiver: mpsc::Receiver<Frame>,
}

#[derive(Debug)]
pub struct ReloadChannel {
    clients: DashMap<ClientId, ClientSlot>,
    buffer: usize,
    closed: AtomicBool,
}

impl ReloadChannel {
    /// `buffer` is the number of frames a client may have queued before it is dropped.
    pub fn new(buffer: usize) -> Self {
        Self {
            clients: DashMap::new(),
            buffer: buffer.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Once the channel is closed the returned queue is already ended, so the
    /// connection task closes its socket straight away.
    pub fn register(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.buffer);
        let id = ClientId::new();
        self.clients.insert(
            id,
            ClientSlot {
                tx,
                connected_at: now_millis(),
            },
        );
        // Checked after inserting so a concurrent close_all cannot miss us.
        if self.closed.load(Ordering::SeqCst) {
            self.clients.remove(&id);
            tracing::debug!(client = %id, "Registration refused, channel closed");
            return Subscription { id, receiver };
        }
        metrics::record_clients(self.clients.len());
        tracing::debug!(client = %id, clients = self.clients.len(), "Client registered");
        Subscription { id, receiver }
    }

    /// Remove a client. Dropping its sender ends the connection task's queue.
    pub fn unregister(&self, id: ClientId) -> bool {
        let removed = self.clients.remove(&id);
        if let Some((_, slot)) = &removed {
            metrics::record_clients(self.clients.len());
            tracing::debug!(
                client = %id,
                connected_for_ms = now_millis().saturating_sub(slot.connected_at),
                "Client unregistered"
            );
        }
        removed.is_some()
    }

    /// Deliver `event` to every registered client. Returns how many accepted it.
    pub fn broadcast(&self, event: &ReloadEvent) -> usize {
        let frame: Frame = match serde_json::to_string(event) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                tracing::error!(error = %e, kind = event.kind(), "Failed to serialize reload event");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for entry in self.clients.iter() {
            match entry.value().tx.try_send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Closed(_)) => failed.push((*entry.key(), "closed")),
                Err(TrySendError::Full(_)) => failed.push((*entry.key(), "backlog")),
            }
        }

        // Removal happens after iteration; DashMap shards are locked while iterating.
        for (id, reason) in failed {
            if self.unregister(id) {
                metrics::record_eviction(reason);
                tracing::debug!(client = %id, reason, "Dropped client during broadcast");
            }
        }

        tracing::debug!(kind = event.kind(), delivered, "Broadcast");
        delivered
    }

    /// Unregister everyone; each connection task then closes its socket.
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let count = self.clients.len();
        self.clients.clear();
        metrics::record_clients(0);
        tracing::info!(clients = count, "Closed all reload clients");
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_registered(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }
}
