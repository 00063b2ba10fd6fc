//! `outreach draft` — Run both pipelines for one request.
//!
//! Every outbound event is printed to stdout as one JSON line, in the order
//! a WebSocket client would receive it. A short summary of the sourced
//! facts in the reasoning draft goes to stderr.

use std::path::Path;
use std::sync::Arc;

use outreach_agent::{Dispatch, Dispatcher, Pipelines, sourced_facts};
use outreach_core::event::{OutboundEvent, StructuredResult};
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 64;

pub async fn run(config_path: Option<&Path>, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let pipelines = Pipelines::connect(&config).await?;

    let (tx, mut rx) = mpsc::channel::<OutboundEvent>(EVENT_BUFFER);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}", render_event(&event));
            if let OutboundEvent::McpFinalEmail { content } = &event {
                eprintln!("{}", fact_summary(content));
            }
        }
    });

    let mut dispatcher = Dispatcher::new(pipelines, Arc::new(tx), 1);
    if dispatcher.dispatch(message).await == Dispatch::Ignored {
        return Err("Nothing to draft: the message is empty".into());
    }
    dispatcher.wait_idle().await;

    // Dropping the dispatcher closes the channel and lets the printer finish.
    drop(dispatcher);
    printer.await?;

    Ok(())
}

/// One event as a single JSON line.
pub fn render_event(event: &OutboundEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| {
        format!(r#"{{"type":"error","source":"system","content":"unserializable event: {e}"}}"#)
    })
}

/// Human-readable note on how much of the draft is backed by tool data.
pub fn fact_summary(email: &StructuredResult) -> String {
    let facts = sourced_facts(&email.body);
    if facts.is_empty() {
        "⚠️  The reasoning draft cites no tool-sourced facts".to_string()
    } else {
        let mut summary = format!("✅ {} tool-sourced fact(s) in the reasoning draft:", facts.len());
        for fact in facts {
            summary.push_str("\n   • ");
            summary.push_str(fact);
        }
        summary
    }
}
