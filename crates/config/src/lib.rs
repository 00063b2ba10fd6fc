//! Configuration loading, validation, and management for Outreach.
//!
//! Loads configuration from `outreach.toml` (or an explicit path) with
//! environment variable overrides. The resulting [`AppConfig`] is built once
//! at process start and passed by reference to everything that needs it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use outreach_core::InvocationConfig;
use serde::{Deserialize, Serialize};

/// Default file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "outreach.toml";

/// The root configuration structure.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API access
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Model settings for the tool-augmented reasoning loop
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Model settings for the single-shot pipeline
    #[serde(default)]
    pub single_shot: SingleShotConfig,

    /// Reasoning loop bounds
    #[serde(default)]
    pub agent: AgentConfig,

    /// External tool capability server
    #[serde(default)]
    pub tools: ToolsConfig,

    /// HTTP/WebSocket server
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_anthropic_url")]
    pub base_url: String,
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com".into()
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_anthropic_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_reasoning_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_reasoning_max_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_reasoning_model() -> String {
    "claude-3-7-sonnet-20250219".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_reasoning_max_tokens() -> u32 {
    4096
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            model: default_reasoning_model(),
            temperature: default_temperature(),
            max_output_tokens: default_reasoning_max_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ReasoningConfig {
    pub fn invocation(&self) -> InvocationConfig {
        InvocationConfig {
            max_retries: self.max_retries,
            timeout: Duration::from_secs(self.timeout_secs),
            max_output_tokens: self.max_output_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleShotConfig {
    #[serde(default = "default_single_shot_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_single_shot_max_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Forward text deltas to the client as they arrive
    #[serde(default)]
    pub stream_tokens: bool,

    /// Prompt template; `{user_request}` is replaced with the user's text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

fn default_single_shot_model() -> String {
    "claude-3-haiku-20240307".into()
}
fn default_single_shot_max_tokens() -> u32 {
    1024
}

impl Default for SingleShotConfig {
    fn default() -> Self {
        Self {
            model: default_single_shot_model(),
            temperature: default_temperature(),
            max_output_tokens: default_single_shot_max_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            stream_tokens: false,
            prompt_template: None,
        }
    }
}

impl SingleShotConfig {
    pub fn invocation(&self) -> InvocationConfig {
        InvocationConfig {
            max_retries: self.max_retries,
            timeout: Duration::from_secs(self.timeout_secs),
            max_output_tokens: self.max_output_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum REASON phases per run
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Pause before every model call in the reasoning loop
    #[serde(default = "default_reason_delay_ms")]
    pub reason_delay_ms: u64,

    /// Overrides the built-in instruction set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_steps() -> u32 {
    25
}
fn default_reason_delay_ms() -> u64 {
    2000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            reason_delay_ms: default_reason_delay_ms(),
            system_prompt: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Streamable HTTP endpoint of the MCP tool server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_url: Option<String>,

    /// Extra headers sent with every MCP request (e.g. Authorization)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mcp_url: None,
            headers: HashMap::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Requests a single connection may have in flight at once
    #[serde(default = "default_max_inflight")]
    pub max_inflight_requests: usize,

    /// Capacity of each connection's outbound queue
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_inflight() -> usize {
    2
}
fn default_outbound_buffer() -> usize {
    64
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_inflight_requests: default_max_inflight(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("anthropic", &self.anthropic)
            .field("reasoning", &self.reasoning)
            .field("single_shot", &self.single_shot)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("gateway", &self.gateway)
            .finish()
    }
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<&String> = self.headers.keys().collect();
        f.debug_struct("ToolsConfig")
            .field("mcp_url", &self.mcp_url)
            .field("headers", &header_names)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from `outreach.toml` in the
    /// working directory when no path is given, then apply environment
    /// overrides:
    /// - `ANTHROPIC_API_KEY`
    /// - `OUTREACH_MCP_URL`
    /// - `OUTREACH_MCP_TOKEN` (sent as a Bearer `Authorization` header)
    /// - `OUTREACH_MODEL` (reasoning model)
    /// - `OUTREACH_PORT`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup (highest priority).
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = lookup("ANTHROPIC_API_KEY").map(|k| k.trim().to_string())
            && !key.is_empty()
        {
            self.anthropic.api_key = Some(key);
        }

        if let Some(url) = lookup("OUTREACH_MCP_URL") {
            self.tools.mcp_url = Some(url);
        }

        if let Some(token) = lookup("OUTREACH_MCP_TOKEN") {
            self.tools
                .headers
                .insert("Authorization".into(), format!("Bearer {}", token.trim()));
        }

        if let Some(model) = lookup("OUTREACH_MODEL") {
            self.reasoning.model = model;
        }

        if let Some(port) = lookup("OUTREACH_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("OUTREACH_PORT is not a valid port: {port}"))
            })?;
        }

        Ok(())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, temperature) in [
            ("reasoning.temperature", self.reasoning.temperature),
            ("single_shot.temperature", self.single_shot.temperature),
        ] {
            if !(0.0..=1.0).contains(&temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 1.0"
                )));
            }
        }

        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError("agent.max_steps must be at least 1".into()));
        }

        if self.gateway.max_inflight_requests == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.max_inflight_requests must be at least 1".into(),
            ));
        }

        if self.gateway.outbound_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.outbound_buffer must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Fail unless the model credential and tool endpoint are present.
    ///
    /// Called before a session is set up; nothing downstream re-checks.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        match self.anthropic.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {}
            _ => return Err(ConfigError::MissingCredential("ANTHROPIC_API_KEY".into())),
        }
        match self.tools.mcp_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::MissingCredential("tools.mcp_url (OUTREACH_MCP_URL)".into())),
        }
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.anthropic.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required credential or endpoint: {0}")]
    MissingCredential(String),
}
