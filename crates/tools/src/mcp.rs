//! MCP tool provider over Streamable HTTP.
//!
//! Built on the official `rmcp` client: the handshake runs once, lazily, on
//! first use; `tools/list` is followed across pages and `tools/call` results
//! are flattened to text. Every request is bounded by the configured timeout.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use outreach_config::ToolsConfig;
use outreach_core::error::ToolError;
use outreach_core::tool::{ToolDescriptor, ToolProvider};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
    ProtocolVersion, RawContent, Tool,
};
use rmcp::service::RunningService;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::{ClientHandler, RoleClient};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct OutreachClientHandler {
    info: ClientInfo,
}

impl ClientHandler for OutreachClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }
}

type McpSession = RunningService<RoleClient, OutreachClientHandler>;

pub struct McpToolProvider {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
    session: OnceCell<McpSession>,
}

impl McpToolProvider {
    /// Create a provider for `endpoint` with extra headers and a per-request timeout.
    pub fn new(
        endpoint: impl Into<String>,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .default_headers(build_default_headers(headers))
            .build()
            .map_err(|e| failure("connect", format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            timeout,
            session: OnceCell::new(),
        })
    }

    /// Create a provider from the `[tools]` configuration section.
    pub fn from_config(config: &ToolsConfig) -> Result<Self, ToolError> {
        let endpoint = config
            .mcp_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| failure("connect", "tools.mcp_url is not configured"))?;
        Self::new(endpoint, &config.headers, Duration::from_secs(config.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn session(&self) -> Result<&McpSession, ToolError> {
        self.session
            .get_or_try_init(|| async {
                let transport = StreamableHttpClientTransport::with_client(
                    self.client.clone(),
                    StreamableHttpClientTransportConfig::with_uri(self.endpoint.clone()),
                );
                let handler = OutreachClientHandler {
                    info: client_info(),
                };

                let session = self
                    .bounded("initialize", rmcp::serve_client(handler, transport))
                    .await?
                    .map_err(|e| failure("initialize", format!("handshake failed: {e}")))?;

                if let Some(server) = session.peer().peer_info() {
                    info!(
                        endpoint = %self.endpoint,
                        server = %server.server_info.name,
                        protocol = %server.protocol_version,
                        "MCP session initialized"
                    );
                }
                Ok(session)
            })
            .await
    }

    /// Run one MCP exchange under the request timeout.
    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = T>) -> Result<T, ToolError> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            failure(
                what,
                format!("request to {} timed out after {:?}", self.endpoint, self.timeout),
            )
        })
    }
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    fn name(&self) -> &str {
        "mcp"
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let session = self.session().await?;

        let tools = self
            .bounded("tools/list", session.peer().list_all_tools())
            .await?
            .map_err(|e| failure("tools/list", e.to_string()))?;

        debug!(count = tools.len(), "MCP tools listed");
        Ok(tools.into_iter().map(into_descriptor).collect())
    }

    async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> Result<String, ToolError> {
        let session = self.session().await?;

        let request = CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(arguments),
        };
        let outcome = self
            .bounded(name, session.peer().call_tool(request))
            .await?
            .map_err(|e| failure(name, e.to_string()))?;

        let is_error = outcome.is_error.unwrap_or(false);
        let text = result_text(outcome);
        if is_error {
            return Err(failure(name, text));
        }
        Ok(text)
    }
}

fn client_info() -> ClientInfo {
    ClientInfo {
        protocol_version: ProtocolVersion::LATEST,
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "outreach".to_string(),
            title: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            icons: None,
            website_url: None,
        },
    }
}

fn failure(tool_name: &str, reason: impl Into<String>) -> ToolError {
    ToolError::ProviderFailure {
        tool_name: tool_name.to_string(),
        reason: reason.into(),
    }
}

fn build_default_headers(headers: &HashMap<String, String>) -> HeaderMap {
    let mut header_map = HeaderMap::new();

    for (name, value) in headers {
        let Ok(header_name) = HeaderName::from_str(name) else {
            warn!(header = %name, "Invalid HTTP header name in MCP config (skipping)");
            continue;
        };
        let Ok(header_value) = HeaderValue::from_str(value.trim()) else {
            warn!(header = %name, "Invalid HTTP header value in MCP config (skipping)");
            continue;
        };
        header_map.insert(header_name, header_value);
    }

    if !header_map.contains_key(USER_AGENT) {
        header_map.insert(USER_AGENT, HeaderValue::from_static("outreach-mcp-client/0.1"));
    }

    header_map
}

fn into_descriptor(tool: Tool) -> ToolDescriptor {
    ToolDescriptor {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
        input_schema: Value::Object((*tool.input_schema).clone()),
    }
}

/// Text blocks joined by newlines; falls back to structured content.
fn result_text(result: CallToolResult) -> String {
    let texts: Vec<String> = result
        .content
        .into_iter()
        .filter_map(|block| match block.raw {
            RawContent::Text(text) => Some(text.text),
            _ => None,
        })
        .collect();
    if !texts.is_empty() {
        return texts.join("\n");
    }
    result
        .structured_content
        .map(|value| value.to_string())
        .unwrap_or_default()
}
