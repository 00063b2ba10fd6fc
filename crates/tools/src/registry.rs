//! Session-scoped tool registry.
//!
//! The registry asks its provider for the capability list exactly once, at
//! construction, and is read-only afterwards. Share it behind an `Arc`
//! across every run of a session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use outreach_core::error::ToolError;
use outreach_core::tool::{ToolDescriptor, ToolProvider};
use tracing::{debug, info, warn};

pub struct ToolRegistry {
    provider: Arc<dyn ToolProvider>,
    descriptors: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Discover the provider's tools and build the registry.
    pub async fn connect(provider: Arc<dyn ToolProvider>) -> Result<Self, ToolError> {
        let descriptors = provider.list_tools().await?;
        let registry = Self::with_descriptors(provider, descriptors);
        info!(
            provider = registry.provider.name(),
            tools = registry.descriptors.len(),
            "Tool registry loaded"
        );
        Ok(registry)
    }

    /// Build a registry from an already-known capability list.
    ///
    /// A later descriptor with a duplicate name is ignored.
    pub fn with_descriptors(provider: Arc<dyn ToolProvider>, descriptors: Vec<ToolDescriptor>) -> Self {
        let mut index = HashMap::new();
        let mut unique = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if index.contains_key(&descriptor.name) {
                warn!(tool = %descriptor.name, "Duplicate tool name advertised, keeping the first");
                continue;
            }
            index.insert(descriptor.name.clone(), unique.len());
            unique.push(descriptor);
        }
        Self {
            provider,
            descriptors: unique,
            index,
        }
    }

    /// Every tool, in the order the provider listed them (sent to the model).
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// Look up one tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Execute one tool call. Never retries.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, ToolError> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let missing: Vec<&str> = descriptor
            .required_arguments()
            .into_iter()
            .filter(|arg| !arguments.contains_key(*arg))
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::InvalidArguments {
                tool_name: name.to_string(),
                reason: format!("missing required argument(s): {}", missing.join(", ")),
            });
        }

        let started = Instant::now();
        let result = self.provider.invoke(name, arguments).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(output) => debug!(tool = name, duration_ms, bytes = output.len(), "Tool executed"),
            Err(e) => warn!(tool = name, duration_ms, error = %e, "Tool failed"),
        }

        result
    }
}
