//! Outbound events: the JSON envelopes sent to a connected client.
//!
//! Every event serializes to `{"type": "...", ...}`. Events that belong to
//! one pipeline carry a `source` discriminator so a client can separate the
//! two streams that share a connection.

use serde::{Deserialize, Serialize};

/// Which pipeline (or the connection glue itself) produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// The tool-augmented reasoning loop.
    Mcp,
    /// The single-shot pipeline.
    Standard,
    /// Dispatch and connection handling.
    System,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mcp => "mcp",
            Self::Standard => "standard",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Email fields pulled out of the reasoning loop's terminal text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult {
    #[serde(default, alias = "potential_contacts")]
    pub contacts: String,

    #[serde(default)]
    pub subject: String,

    pub body: String,
}

/// One entry of the reasoning loop's progress log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step_type", rename_all = "snake_case")]
pub enum IntermediateStep {
    ToolInvocation {
        name: String,
        args: serde_json::Map<String, serde_json::Value>,
    },
    Thought {
        text: String,
    },
    ToolOutcome {
        name: String,
        content: String,
    },
}

/// Envelope sent over the outbound channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    TypingStart { source: Source },

    TypingEnd { source: Source },

    ProcessingComplete { source: Source },

    /// Incremental token delivery from the single-shot pipeline.
    Ai { source: Source, content: String },

    /// Complete draft from the single-shot pipeline.
    FinalEmail { source: Source, content: String },

    McpFinalEmail { content: StructuredResult },

    Error { source: Source, content: String },

    McpIntermediateSteps { steps: Vec<IntermediateStep> },
}

impl OutboundEvent {
    pub fn error(source: Source, content: impl Into<String>) -> Self {
        Self::Error {
            source,
            content: content.into(),
        }
    }

    /// The pipeline this event belongs to.
    pub fn source(&self) -> Source {
        match self {
            Self::TypingStart { source }
            | Self::TypingEnd { source }
            | Self::ProcessingComplete { source }
            | Self::Ai { source, .. }
            | Self::FinalEmail { source, .. }
            | Self::Error { source, .. } => *source,
            Self::McpFinalEmail { .. } | Self::McpIntermediateSteps { .. } => Source::Mcp,
        }
    }

    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TypingStart { .. } => "typing_start",
            Self::TypingEnd { .. } => "typing_end",
            Self::ProcessingComplete { .. } => "processing_complete",
            Self::Ai { .. } => "ai",
            Self::FinalEmail { .. } => "final_email",
            Self::McpFinalEmail { .. } => "mcp_final_email",
            Self::Error { .. } => "error",
            Self::McpIntermediateSteps { .. } => "mcp_intermediate_steps",
        }
    }

    /// Whether this is a pipeline's result (success or typed error).
    pub fn is_result(&self) -> bool {
        matches!(
            self,
            Self::FinalEmail { .. } | Self::McpFinalEmail { .. } | Self::Error { .. }
        )
    }
}
