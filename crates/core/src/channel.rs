//! OutboundSink trait: the abstraction over a connection's outbound channel.
//!
//! Pipelines never write to a socket directly. They hand events to a sink,
//! and the sink's implementation guarantees that sends on one connection
//! are serialized.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::event::OutboundEvent;

/// Unique identifier for a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Destination for outbound events of one connection.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    /// Deliver one event. Fails once the connection is gone.
    async fn send(&self, event: OutboundEvent) -> std::result::Result<(), ChannelError>;
}

/// A bounded channel is a sink: the receiving half is the single writer.
#[async_trait]
impl OutboundSink for tokio::sync::mpsc::Sender<OutboundEvent> {
    async fn send(&self, event: OutboundEvent) -> std::result::Result<(), ChannelError> {
        tokio::sync::mpsc::Sender::send(self, event)
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("receiver dropped: {}", e.0.event_type())))
    }
}
