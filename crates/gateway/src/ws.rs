//! `GET /ws`: one WebSocket per client session.
//!
//! Protocol:
//! - Client → Server: `{ "message": "..." }`
//! - Server → Client: outbound event frames (`typing_start`, `final_email`,
//!   `mcp_final_email`, `mcp_intermediate_steps`, `error`, ...)
//!
//! Malformed or empty client frames are logged and skipped; the connection
//! stays open.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use outreach_agent::{Dispatch, Dispatcher};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::SharedState;

#[derive(Deserialize)]
struct InboundMessage {
    #[serde(default)]
    message: Option<String>,
}

/// Why an inbound frame was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    InvalidJson,
    EmptyMessage,
}

/// Pull the user's request out of a client frame.
pub fn parse_inbound(frame: &str) -> Result<String, Rejected> {
    let inbound: InboundMessage = serde_json::from_str(frame).map_err(|_| Rejected::InvalidJson)?;
    match inbound.message {
        Some(message) if !message.trim().is_empty() => Ok(message),
        _ => Err(Rejected::EmptyMessage),
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut outgoing, mut incoming) = socket.split();
    let (sink, mut rx) = state
        .connections
        .connect(state.config.gateway.outbound_buffer)
        .await;
    let id = sink.id().clone();

    // Single writer: the only task that touches the socket's send half.
    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(connection = %writer_id, error = %e, "Could not serialize event");
                    continue;
                }
            };
            if outgoing.send(WsMessage::Text(json.into())).await.is_err() {
                debug!(connection = %writer_id, "Client went away, writer stopping");
                break;
            }
        }
    });

    let mut dispatcher = Dispatcher::new(
        state.pipelines.clone(),
        Arc::new(sink),
        state.config.gateway.max_inflight_requests,
    );

    while let Some(frame) = incoming.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue, // binary, ping, pong
        };

        match parse_inbound(text.as_str()) {
            Ok(message) => {
                if dispatcher.dispatch(&message).await == Dispatch::Busy {
                    debug!(connection = %id, "Request refused while busy");
                }
            }
            Err(reason) => warn!(connection = %id, ?reason, "Ignoring inbound frame"),
        }
    }

    // Losing the connection cancels whatever is still running for it.
    dispatcher.shutdown();
    drop(dispatcher);
    let active = state.connections.disconnect(&id).await;
    writer.abort();
    info!(connection = %id, active, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_message_field() {
        assert_eq!(
            parse_inbound(r#"{"message": "Email Acme about our CRM"}"#),
            Ok("Email Acme about our CRM".to_string())
        );
    }

    #[test]
    fn extra_fields_are_ignored() {
        assert_eq!(
            parse_inbound(r#"{"message": "hi", "client": "web"}"#),
            Ok("hi".to_string())
        );
    }

    #[test]
    fn rejects_invalid_json() {
        assert_eq!(parse_inbound("not json"), Err(Rejected::InvalidJson));
        assert_eq!(parse_inbound(r#"{"message": 42}"#), Err(Rejected::InvalidJson));
    }

    #[test]
    fn rejects_missing_or_blank_message() {
        assert_eq!(parse_inbound("{}"), Err(Rejected::EmptyMessage));
        assert_eq!(parse_inbound(r#"{"message": "  "}"#), Err(Rejected::EmptyMessage));
        assert_eq!(parse_inbound(r#"{"message": null}"#), Err(Rejected::EmptyMessage));
    }
}
