//! Tool access for Outreach.
//!
//! [`ToolRegistry`] is the session-scoped capability list the reasoning
//! loop calls through. [`McpToolProvider`] is the external tool server it
//! is normally backed by.

pub mod mcp;
pub mod registry;

pub use mcp::McpToolProvider;
pub use registry::ToolRegistry;
