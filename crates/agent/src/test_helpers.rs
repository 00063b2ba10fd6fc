//! Shared test helpers: scripted model, mock tools, recording sink.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use outreach_core::channel::OutboundSink;
use outreach_core::error::{ChannelError, ProviderError, ToolError};
use outreach_core::event::OutboundEvent;
use outreach_core::message::Message;
use outreach_core::provider::{InvocationConfig, Provider, ProviderRequest, ProviderResponse, Usage};
use outreach_core::tool::{ToolCall, ToolDescriptor, ToolProvider};
use outreach_providers::ModelClient;
use outreach_tools::ToolRegistry;

/// A provider that replays a script of responses, one per call.
///
/// Once the script is exhausted every call fails with a network error.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    always_call: Option<String>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            always_call: None,
        })
    }

    /// A model that asks for `tool` on every turn and never answers.
    pub fn always_calling(tool: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            always_call: Some(tool.to_string()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if let Some(tool) = &self.always_call {
            return Ok(make_tool_call_response(
                vec![make_tool_call(&format!("call-{n}"), tool, serde_json::json!({"q": "more"}))],
                "Need more data",
            ));
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".into())))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::ai(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response carrying tool calls.
pub fn make_tool_call_response(calls: Vec<ToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::ai_with_tools(thought, calls),
        usage: None,
        model: "mock-model".into(),
    }
}

pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments: args.as_object().cloned().unwrap_or_default(),
    }
}

/// `lookup` echoes its `q` argument, `fail` always fails, `slow` sleeps
/// for `ms` milliseconds first.
pub struct MockTools;

#[async_trait]
impl ToolProvider for MockTools {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let tool = |name: &str, schema: serde_json::Value| ToolDescriptor {
            name: name.into(),
            description: format!("{name} tool"),
            input_schema: schema,
        };
        Ok(vec![
            tool("lookup", serde_json::json!({"type": "object", "required": ["q"]})),
            tool("fail", serde_json::json!({"type": "object"})),
            tool("slow", serde_json::json!({"type": "object"})),
        ])
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, ToolError> {
        match name {
            "lookup" => Ok(format!(
                "lookup:{}",
                arguments.get("q").and_then(|v| v.as_str()).unwrap_or_default()
            )),
            "slow" => {
                let ms = arguments.get("ms").and_then(|v| v.as_u64()).unwrap_or(10);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(format!("slept {ms}"))
            }
            _ => Err(ToolError::ProviderFailure {
                tool_name: name.into(),
                reason: "upstream unavailable".into(),
            }),
        }
    }
}

pub async fn registry() -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::connect(Arc::new(MockTools)).await.unwrap())
}

/// A client with no retries and no backoff.
pub fn client(provider: Arc<ScriptedProvider>) -> ModelClient {
    ModelClient::new(
        provider,
        "mock-model",
        0.7,
        InvocationConfig {
            max_retries: 0,
            timeout: Duration::from_secs(5),
            max_output_tokens: 512,
        },
    )
    .with_retry_backoff(Duration::ZERO)
}

/// Records every event it is asked to deliver.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<OutboundEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.events().iter().map(OutboundEvent::event_type).collect()
    }
}

#[async_trait]
impl OutboundSink for RecordingSink {
    async fn send(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
