//! # Outreach Core
//!
//! Domain types, traits, and error definitions for the Outreach email
//! drafting kernel. This crate has **no framework dependencies**: it defines
//! the model that the provider, tool, agent and gateway crates implement
//! against.
//!
//! Every collaborator at a process boundary is a trait here:
//! - [`Provider`] for language model backends
//! - [`ToolProvider`] for external tool capability servers
//! - [`OutboundSink`] for the per-connection outbound channel

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod event;
pub mod channel;

pub use error::{ChannelError, Error, ExtractionError, ProviderError, Result, ToolError};
pub use message::{ConversationState, Message};
pub use provider::{InvocationConfig, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use tool::{ToolCall, ToolDescriptor, ToolProvider};
pub use event::{IntermediateStep, OutboundEvent, Source, StructuredResult};
pub use channel::{ConnectionId, OutboundSink};
