//! Message and ConversationState domain types.
//!
//! These are the value objects that flow through a run:
//! the user sends text → the reasoning loop appends model turns and tool
//! results → the collector reads snapshots of the transcript.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tool::ToolCall;

/// A single message in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Instruction set for the model.
    System { text: String },

    /// Text typed by the end user.
    Human { text: String },

    /// One model turn, possibly requesting tool calls.
    AiResponse {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },

    /// The outcome of one tool call.
    ToolResult {
        tool_name: String,
        call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self::Human { text: text.into() }
    }

    /// A model turn with no tool calls.
    pub fn ai(text: impl Into<String>) -> Self {
        Self::AiResponse {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn ai_with_tools(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::AiResponse {
            text: text.into(),
            tool_calls,
        }
    }

    /// A successful tool result for `call`.
    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_name: call.name.clone(),
            call_id: call.id.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    /// An error-flavored tool result for `call`.
    pub fn tool_error(call: &ToolCall, reason: impl std::fmt::Display) -> Self {
        Self::ToolResult {
            tool_name: call.name.clone(),
            call_id: call.id.clone(),
            content: format!("Error: {reason}"),
            is_error: true,
        }
    }

    /// The textual content, whatever the variant.
    pub fn text(&self) -> &str {
        match self {
            Self::System { text } | Self::Human { text } | Self::AiResponse { text, .. } => text,
            Self::ToolResult { content, .. } => content,
        }
    }

    /// Tool calls requested by this message; empty for anything but an AI turn.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::AiResponse { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn is_ai_response(&self) -> bool {
        matches!(self, Self::AiResponse { .. })
    }
}

/// The transcript of one conversation plus accumulated context.
///
/// Messages can only be appended through the `push_*` methods, which keep
/// tool results paired with the AI turn that requested them: every call of
/// an AI turn must be answered exactly once, immediately after that turn,
/// before another AI turn or human message is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,

    /// Number of human turns seen so far.
    pub turn: u32,

    /// Free-form information the user supplied about their own company.
    #[serde(default)]
    pub user_company_info: String,

    /// Data collected about the target company, keyed by field name.
    #[serde(default)]
    pub target_company_info: HashMap<String, serde_json::Value>,
}

impl ConversationState {
    /// Start a conversation seeded with one system instruction.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a human message and advance the turn counter.
    pub fn push_human(&mut self, text: impl Into<String>) -> Result<()> {
        self.ensure_no_outstanding("human message")?;
        self.messages.push(Message::human(text));
        self.turn += 1;
        Ok(())
    }

    /// Append a model turn.
    pub fn push_ai_response(&mut self, message: Message) -> Result<()> {
        if !message.is_ai_response() {
            return Err(Error::Transcript(
                "push_ai_response called with a non-AI message".into(),
            ));
        }
        self.ensure_no_outstanding("AI response")?;
        self.messages.push(message);
        Ok(())
    }

    /// Append a tool result answering one of the outstanding calls.
    pub fn push_tool_result(&mut self, message: Message) -> Result<()> {
        let Message::ToolResult { call_id, .. } = &message else {
            return Err(Error::Transcript(
                "push_tool_result called with a non tool-result message".into(),
            ));
        };
        if !self.outstanding_calls().iter().any(|c| &c.id == call_id) {
            return Err(Error::Transcript(format!(
                "tool result '{call_id}' does not answer an outstanding call"
            )));
        }
        self.messages.push(message);
        Ok(())
    }

    /// Calls of the latest AI turn that have no result yet, in issue order.
    pub fn outstanding_calls(&self) -> Vec<&ToolCall> {
        let mut answered = Vec::new();
        for message in self.messages.iter().rev() {
            match message {
                Message::ToolResult { call_id, .. } => answered.push(call_id.as_str()),
                Message::AiResponse { tool_calls, .. } => {
                    return tool_calls
                        .iter()
                        .filter(|c| !answered.contains(&c.id.as_str()))
                        .collect();
                }
                _ => break,
            }
        }
        Vec::new()
    }

    /// The most recent AI turn, if any.
    pub fn last_ai_response(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_ai_response())
    }

    fn ensure_no_outstanding(&self, what: &str) -> Result<()> {
        let outstanding = self.outstanding_calls();
        if outstanding.is_empty() {
            Ok(())
        } else {
            Err(Error::Transcript(format!(
                "cannot append {what}: {} tool call(s) still unanswered",
                outstanding.len()
            )))
        }
    }
}
