//! Model invocation client: one bounded call to a language model.
//!
//! Wraps a [`Provider`] with a per-attempt timeout and a bounded number of
//! retries for transient failures. Both pipelines go through this client; the
//! reasoning loop's step bound sits on top of it.

use std::sync::Arc;
use std::time::Duration;

use outreach_core::error::ProviderError;
use outreach_core::message::Message;
use outreach_core::provider::{InvocationConfig, Provider, ProviderRequest, StreamChunk};
use outreach_core::tool::ToolDescriptor;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(8);

/// A model bound to one provider with fixed sampling and invocation limits.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    config: InvocationConfig,
    retry_backoff: Duration,
}

impl ModelClient {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        config: InvocationConfig,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            config,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Base delay between attempts; doubles on every retry.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn config(&self) -> InvocationConfig {
        self.config
    }

    /// Invoke the model once (with retries) and return its AI turn.
    ///
    /// `tools: None` is single-shot mode. A system prompt, when given, is
    /// placed in front of the history.
    pub async fn invoke(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<Message, ProviderError> {
        let request = self.request(system_prompt, history, tools, false);
        let mut attempt = 0;

        loop {
            let outcome = tokio::time::timeout(
                self.config.timeout,
                self.provider.complete(request.clone()),
            )
            .await;

            let err = match outcome {
                Ok(Ok(response)) => {
                    debug!(
                        provider = self.provider.name(),
                        model = %response.model,
                        attempt = attempt + 1,
                        tool_calls = response.message.tool_calls().len(),
                        "Model invocation succeeded"
                    );
                    return Ok(response.message);
                }
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "model '{}' did not answer within {}s",
                    self.model,
                    self.config.timeout.as_secs()
                )),
            };

            attempt = self.next_attempt(attempt, err).await?;
        }
    }

    /// Open a token stream (single-shot mode only).
    ///
    /// Retries cover establishing the stream; once chunks flow, failures are
    /// delivered through the receiver. Read it with [`Self::next_chunk`] so
    /// a stalled stream is cut off.
    pub async fn stream(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let request = self.request(system_prompt, history, None, true);
        let mut attempt = 0;

        loop {
            let err = match tokio::time::timeout(
                self.config.timeout,
                self.provider.stream(request.clone()),
            )
            .await
            {
                Ok(Ok(rx)) => return Ok(rx),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "model '{}' did not start streaming within {}s",
                    self.model,
                    self.config.timeout.as_secs()
                )),
            };

            attempt = self.next_attempt(attempt, err).await?;
        }
    }

    /// Wait for the next chunk, at most one invocation timeout.
    ///
    /// `None` means the stream ended. A stream that goes quiet for longer
    /// than the timeout yields `ProviderError::Timeout`.
    pub async fn next_chunk(
        &self,
        rx: &mut mpsc::Receiver<Result<StreamChunk, ProviderError>>,
    ) -> Option<Result<StreamChunk, ProviderError>> {
        match tokio::time::timeout(self.config.timeout, rx.recv()).await {
            Ok(chunk) => chunk,
            Err(_) => {
                warn!(model = %self.model, "Model stream stalled");
                Some(Err(ProviderError::Timeout(format!(
                    "model '{}' sent no stream data for {}s",
                    self.model,
                    self.config.timeout.as_secs()
                ))))
            }
        }
    }

    fn request(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
        tools: Option<&[ToolDescriptor]>,
        stream: bool,
    ) -> ProviderRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = system_prompt {
            messages.push(Message::system(system));
        }
        messages.extend_from_slice(history);

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: Some(self.config.max_output_tokens),
            tools: tools.map(<[ToolDescriptor]>::to_vec).unwrap_or_default(),
            stream,
        }
    }

    /// Decide whether to retry after `err`; sleeps and returns the next
    /// attempt number, or hands the error back when out of budget.
    async fn next_attempt(&self, attempt: u32, err: ProviderError) -> Result<u32, ProviderError> {
        if !err.is_retryable() || attempt >= self.config.max_retries {
            warn!(
                provider = self.provider.name(),
                model = %self.model,
                attempts = attempt + 1,
                error = %err,
                "Model invocation failed"
            );
            return Err(err);
        }

        let delay = self
            .retry_backoff
            .saturating_mul(1u32 << attempt.min(4))
            .min(MAX_RETRY_BACKOFF);
        warn!(
            provider = self.provider.name(),
            model = %self.model,
            attempt = attempt + 1,
            max_retries = self.config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Model invocation failed, retrying"
        );
        tokio::time::sleep(delay).await;
        Ok(attempt + 1)
    }
}
