//! The bounded reason/act loop behind the tool-augmented pipeline.
//!
//! ```text
//!            tool calls            results appended
//!   REASON ─────────────▶ ACT ──────────────────────┐
//!     ▲  │                                          │
//!     │  └── no tool calls / failure / bound ──▶ DONE
//!     └─────────────────────────────────────────────┘
//! ```
//!
//! A REASON phase makes exactly one model call with the full transcript and
//! the session's tool capability set. An ACT phase executes every call of
//! the latest AI turn concurrently and appends one result per call, in call
//! order, before control returns to REASON. Model failures never escape the
//! loop: they end the run with a synthetic apology turn.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use outreach_config::AppConfig;
use outreach_core::message::{ConversationState, Message};
use outreach_providers::ModelClient;
use outreach_tools::ToolRegistry;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::prompts::DEFAULT_SYSTEM_PROMPT;

/// Reply substituted for the model's turn when an invocation fails.
pub const DEGRADED_REPLY: &str =
    "I'm currently experiencing some rate limiting. Please try again in a moment.";

const DEFAULT_MAX_STEPS: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Reason,
    Act,
    Done,
}

/// What a finished run hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Text of the last AI turn.
    pub terminal_text: String,

    /// The step bound was hit while the model still wanted tools.
    pub truncated: bool,

    /// A model invocation failed and the apology turn was substituted.
    pub degraded: bool,

    /// Every phase entered, in order, ending with `Done`.
    pub phases: Vec<Phase>,

    /// Final transcript.
    pub state: ConversationState,
}

impl RunOutcome {
    pub fn reason_phases(&self) -> usize {
        self.phases.iter().filter(|p| **p == Phase::Reason).count()
    }

    pub fn act_phases(&self) -> usize {
        self.phases.iter().filter(|p| **p == Phase::Act).count()
    }
}

/// Drives one conversation from a user request to a terminal AI turn.
///
/// Cheap to share: a single loop serves every run of a session.
pub struct ReasoningLoop {
    client: ModelClient,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    max_steps: u32,
    reason_delay: Duration,
}

impl ReasoningLoop {
    pub fn new(client: ModelClient, tools: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            reason_delay: Duration::ZERO,
        }
    }

    /// Build a loop with the `[agent]` settings applied.
    pub fn from_config(client: ModelClient, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        let mut reasoning = Self::new(client, tools)
            .with_max_steps(config.agent.max_steps)
            .with_reason_delay(Duration::from_millis(config.agent.reason_delay_ms));
        if let Some(prompt) = &config.agent.system_prompt {
            reasoning = reasoning.with_system_prompt(prompt.clone());
        }
        reasoning
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Maximum number of REASON phases per run (at least one).
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Pause before every model call, to stay under provider rate limits.
    pub fn with_reason_delay(mut self, delay: Duration) -> Self {
        self.reason_delay = delay;
        self
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Start a fresh conversation for `user_request` and run it to `Done`.
    pub async fn run(
        &self,
        user_request: &str,
        snapshots: Option<mpsc::Sender<ConversationState>>,
    ) -> RunOutcome {
        let mut state = ConversationState::new(self.system_prompt.clone());
        if let Err(e) = state.push_human(user_request) {
            error!(error = %e, "Could not seed conversation");
        }
        self.run_with_state(state, snapshots).await
    }

    /// Run an existing conversation to `Done`.
    ///
    /// When `snapshots` is given, a copy of the state is sent after every
    /// appended AI turn and after every completed ACT batch.
    pub async fn run_with_state(
        &self,
        mut state: ConversationState,
        snapshots: Option<mpsc::Sender<ConversationState>>,
    ) -> RunOutcome {
        info!(
            model = %self.client.model(),
            max_steps = self.max_steps,
            tools = self.tools.len(),
            "Reasoning run starting"
        );

        let mut phase = Phase::Reason;
        let mut phases = Vec::new();
        let mut reason_steps = 0u32;
        let mut truncated = false;
        let mut degraded = false;

        loop {
            phases.push(phase);
            match phase {
                Phase::Reason => {
                    reason_steps += 1;
                    debug!(step = reason_steps, messages = state.len(), "REASON");

                    if !self.reason_delay.is_zero() {
                        tokio::time::sleep(self.reason_delay).await;
                    }

                    let reply = match self
                        .client
                        .invoke(None, state.messages(), Some(self.tools.descriptors()))
                        .await
                    {
                        Ok(reply) => reply,
                        Err(e) => {
                            warn!(step = reason_steps, error = %e, "Model invocation failed, ending run degraded");
                            degraded = true;
                            Message::ai(DEGRADED_REPLY)
                        }
                    };

                    let wants_tools = !reply.tool_calls().is_empty();
                    if let Err(e) = state.push_ai_response(reply) {
                        error!(error = %e, "Rejected AI turn");
                        phase = Phase::Done;
                        continue;
                    }
                    publish(&snapshots, &state).await;

                    phase = if !wants_tools {
                        Phase::Done
                    } else if reason_steps >= self.max_steps {
                        warn!(max_steps = self.max_steps, "Step bound reached with tool calls pending");
                        truncated = true;
                        Phase::Done
                    } else {
                        Phase::Act
                    };
                }
                Phase::Act => {
                    let calls = state
                        .last_ai_response()
                        .map(|m| m.tool_calls().to_vec())
                        .unwrap_or_default();
                    debug!(calls = calls.len(), "ACT");

                    let results = join_all(
                        calls
                            .iter()
                            .map(|call| self.tools.invoke(&call.name, call.arguments.clone())),
                    )
                    .await;

                    for (call, result) in calls.iter().zip(results) {
                        let message = match result {
                            Ok(output) => Message::tool_result(call, output),
                            Err(e) => {
                                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                                Message::tool_error(call, e)
                            }
                        };
                        if let Err(e) = state.push_tool_result(message) {
                            warn!(call_id = %call.id, error = %e, "Dropped tool result");
                        }
                    }
                    publish(&snapshots, &state).await;

                    phase = Phase::Reason;
                }
                Phase::Done => break,
            }
        }

        let terminal_text = state
            .last_ai_response()
            .map(|m| m.text().to_string())
            .unwrap_or_default();

        info!(
            reason_phases = reason_steps,
            truncated,
            degraded,
            messages = state.len(),
            "Reasoning run finished"
        );

        RunOutcome {
            terminal_text,
            truncated,
            degraded,
            phases,
            state,
        }
    }
}

async fn publish(snapshots: &Option<mpsc::Sender<ConversationState>>, state: &ConversationState) {
    if let Some(tx) = snapshots
        && tx.send(state.clone()).await.is_err()
    {
        debug!("Snapshot observer went away");
    }
}
