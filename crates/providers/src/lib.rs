//! LLM provider implementations for Outreach.
//!
//! All providers implement the `outreach_core::Provider` trait. Callers
//! never use a provider directly: they go through a [`ModelClient`], which
//! adds the per-invocation timeout and retry budget.

pub mod anthropic;
pub mod client;

use std::sync::Arc;

use outreach_config::AppConfig;
use outreach_core::error::ProviderError;
use outreach_core::provider::Provider;

pub use anthropic::AnthropicProvider;
pub use client::ModelClient;

/// The two model clients a session needs.
#[derive(Clone)]
pub struct ModelClients {
    /// Tool-augmented reasoning loop
    pub reasoning: ModelClient,
    /// Single-shot pipeline
    pub single_shot: ModelClient,
}

/// Build the Anthropic provider from configuration.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config
        .anthropic
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ProviderError::NotConfigured("ANTHROPIC_API_KEY is not set".into()))?;

    Ok(Arc::new(
        AnthropicProvider::new(api_key)
            .with_base_url(&config.anthropic.base_url)
            .with_health_model(&config.single_shot.model),
    ))
}

/// Bind one provider to the reasoning and single-shot model settings.
pub fn build_clients(provider: Arc<dyn Provider>, config: &AppConfig) -> ModelClients {
    ModelClients {
        reasoning: ModelClient::new(
            provider.clone(),
            &config.reasoning.model,
            config.reasoning.temperature,
            config.reasoning.invocation(),
        ),
        single_shot: ModelClient::new(
            provider,
            &config.single_shot.model,
            config.single_shot.temperature,
            config.single_shot.invocation(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let config = AppConfig::default();
        assert!(matches!(
            build_from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn clients_follow_model_settings() {
        let mut config = AppConfig::default();
        config.anthropic.api_key = Some("sk-ant-test".into());
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");

        let clients = build_clients(provider, &config);
        assert_eq!(clients.reasoning.model(), "claude-3-7-sonnet-20250219");
        assert_eq!(clients.single_shot.model(), "claude-3-haiku-20240307");
        assert_eq!(clients.single_shot.config().max_output_tokens, 1024);
    }
}
