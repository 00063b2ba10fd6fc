//! Connection registry and per-connection outbound delivery.
//!
//! Each live connection owns one writer task that is the only thing allowed
//! to touch its socket. Everyone else sends events through the connection's
//! [`ConnectionSink`], an `mpsc` sender feeding that writer, so concurrent
//! emitters never interleave partial writes.

use std::collections::HashSet;

use async_trait::async_trait;
use outreach_core::channel::{ConnectionId, OutboundSink};
use outreach_core::error::ChannelError;
use outreach_core::event::OutboundEvent;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

/// Outbound handle of one connection.
#[derive(Clone)]
pub struct ConnectionSink {
    id: ConnectionId,
    tx: mpsc::Sender<OutboundEvent>,
}

impl ConnectionSink {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

#[async_trait]
impl OutboundSink for ConnectionSink {
    async fn send(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        let kind = event.event_type();
        self.tx.send(event).await.map_err(|_| ChannelError::DeliveryFailed {
            connection: self.id.to_string(),
            reason: format!("writer closed before '{kind}' could be sent"),
        })
    }
}

/// Registry of live connections.
///
/// Tracks which connections are open; delivery itself goes through each
/// connection's own [`ConnectionSink`].
#[derive(Default)]
pub struct ConnectionManager {
    connections: RwLock<HashSet<ConnectionId>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    ///
    /// Returns its sink and the receiving end the writer task must drain.
    pub async fn connect(&self, buffer: usize) -> (ConnectionSink, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let sink = ConnectionSink {
            id: ConnectionId::new(),
            tx,
        };
        let mut connections = self.connections.write().await;
        connections.insert(sink.id.clone());
        info!(connection = %sink.id, active = connections.len(), "Connection registered");
        (sink, rx)
    }

    /// Forget a connection. Returns how many remain open.
    pub async fn disconnect(&self, id: &ConnectionId) -> usize {
        let mut connections = self.connections.write().await;
        if !connections.remove(id) {
            debug!(connection = %id, "Disconnect for unknown connection");
        }
        connections.len()
    }
}
