//! Streaming result collector for the reasoning pipeline.
//!
//! Watches the reasoning loop's state snapshots as they arrive, turns new
//! transcript entries into an intermediate-step log, and after the run
//! reports the structured result followed by the log.

use outreach_core::channel::OutboundSink;
use outreach_core::error::{ChannelError, ExtractionError};
use outreach_core::event::{IntermediateStep, OutboundEvent, Source};
use outreach_core::message::{ConversationState, Message};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::extract::extract;
use crate::reasoning::{ReasoningLoop, RunOutcome};

const SNAPSHOT_BUFFER: usize = 16;

pub const PARSE_FAILED: &str = "Could not parse structured email from final AI message.";
pub const NO_DRAFT: &str = "MCP agent did not produce a final email draft text.";

/// Builds the intermediate-step log from successive snapshots.
#[derive(Debug, Default)]
pub struct StepCollector {
    seen: usize,
    steps: Vec<IntermediateStep>,
}

impl StepCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every message appended since the previous snapshot.
    pub fn observe(&mut self, snapshot: &ConversationState) {
        let messages = snapshot.messages();
        if messages.len() < self.seen {
            warn!(
                seen = self.seen,
                len = messages.len(),
                "Snapshot shorter than the last one, restarting step log"
            );
            self.seen = 0;
            self.steps.clear();
        }

        for message in &messages[self.seen..] {
            match message {
                Message::AiResponse { text, tool_calls } if tool_calls.is_empty() => {
                    self.steps.push(IntermediateStep::Thought { text: text.clone() });
                }
                Message::AiResponse { tool_calls, .. } => {
                    self.steps
                        .extend(tool_calls.iter().map(|call| IntermediateStep::ToolInvocation {
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }));
                }
                Message::ToolResult {
                    tool_name, content, ..
                } => self.steps.push(IntermediateStep::ToolOutcome {
                    name: tool_name.clone(),
                    content: content.clone(),
                }),
                Message::System { .. } | Message::Human { .. } => {}
            }
        }
        self.seen = messages.len();
    }

    pub fn steps(&self) -> &[IntermediateStep] {
        &self.steps
    }

    /// The finished log, without a trailing thought that repeats the answer.
    pub fn finish(mut self, terminal_text: &str) -> Vec<IntermediateStep> {
        if let Some(IntermediateStep::Thought { text }) = self.steps.last()
            && text == terminal_text
        {
            self.steps.pop();
        }
        self.steps
    }
}

/// The result event for a run's terminal text.
pub fn result_event(terminal_text: &str) -> OutboundEvent {
    match extract(terminal_text) {
        Ok(content) => OutboundEvent::McpFinalEmail { content },
        Err(ExtractionError::EmptyInput) => OutboundEvent::error(Source::Mcp, NO_DRAFT),
        Err(ExtractionError::MissingBody) => OutboundEvent::error(Source::Mcp, PARSE_FAILED),
    }
}

/// Run one reasoning request and report it on `sink`.
///
/// Emits `typing_start`, the result (`mcp_final_email` or `error`), the
/// step log, `typing_end` and `processing_complete`, in that order.
pub async fn run_reasoning(
    reasoning: &ReasoningLoop,
    user_request: &str,
    sink: &dyn OutboundSink,
) -> Result<RunOutcome, ChannelError> {
    sink.send(OutboundEvent::TypingStart { source: Source::Mcp })
        .await?;

    let (tx, mut rx) = mpsc::channel(SNAPSHOT_BUFFER);
    let collect = async move {
        let mut collector = StepCollector::new();
        while let Some(snapshot) = rx.recv().await {
            collector.observe(&snapshot);
        }
        collector
    };
    let (outcome, collector) = tokio::join!(reasoning.run(user_request, Some(tx)), collect);

    let result = result_event(&outcome.terminal_text);
    if let OutboundEvent::Error { content, .. } = &result {
        warn!(reason = %content, "No structured email from reasoning run");
    }
    sink.send(result).await?;

    let steps = collector.finish(&outcome.terminal_text);
    debug!(steps = steps.len(), "Sending intermediate steps");
    sink.send(OutboundEvent::McpIntermediateSteps { steps }).await?;

    sink.send(OutboundEvent::TypingEnd { source: Source::Mcp }).await?;
    sink.send(OutboundEvent::ProcessingComplete { source: Source::Mcp })
        .await?;

    info!(
        truncated = outcome.truncated,
        degraded = outcome.degraded,
        "Reasoning pipeline complete"
    );
    Ok(outcome)
}
