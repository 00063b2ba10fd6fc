//! The single-shot pipeline: one model call, no tools.
//!
//! Runs side by side with the reasoning loop as a baseline draft. The
//! request is rendered into a prompt template and sent as the only human
//! message.

use outreach_config::AppConfig;
use outreach_core::channel::OutboundSink;
use outreach_core::error::{ChannelError, ProviderError};
use outreach_core::event::{OutboundEvent, Source};
use outreach_core::message::Message;
use outreach_providers::ModelClient;
use tracing::{debug, info, warn};

use crate::prompts::{DEFAULT_SINGLE_SHOT_TEMPLATE, render_template};

/// Sent as the draft when the model answers with nothing.
pub const EMPTY_DRAFT: &str = "Standard agent produced no content.";

pub struct SingleShotPipeline {
    client: ModelClient,
    template: String,
    stream_tokens: bool,
}

impl SingleShotPipeline {
    pub fn new(client: ModelClient) -> Self {
        Self {
            client,
            template: DEFAULT_SINGLE_SHOT_TEMPLATE.to_string(),
            stream_tokens: false,
        }
    }

    pub fn from_config(client: ModelClient, config: &AppConfig) -> Self {
        let mut pipeline = Self::new(client).with_streaming(config.single_shot.stream_tokens);
        if let Some(template) = &config.single_shot.prompt_template {
            pipeline = pipeline.with_template(template.clone());
        }
        pipeline
    }

    /// Prompt template; `{user_request}` marks where the request goes.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Forward text deltas as `ai` events before the final draft.
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.stream_tokens = enabled;
        self
    }

    pub fn prompt(&self, user_request: &str) -> String {
        render_template(&self.template, user_request)
    }

    /// Generate one draft for `user_request` and report it on `sink`.
    ///
    /// Always ends with `typing_end` and `processing_complete`, unless the
    /// sink itself fails.
    pub async fn run(&self, user_request: &str, sink: &dyn OutboundSink) -> Result<(), ChannelError> {
        info!(model = %self.client.model(), streaming = self.stream_tokens, "Single-shot run starting");
        sink.send(OutboundEvent::TypingStart {
            source: Source::Standard,
        })
        .await?;

        let history = [Message::human(self.prompt(user_request))];
        let draft = if self.stream_tokens {
            self.generate_streaming(&history, sink).await?
        } else {
            self.client.invoke(None, &history, None).await.map(|m| m.text().to_string())
        };

        let result = match draft {
            Ok(text) if text.trim().is_empty() => {
                warn!("Single-shot model returned no content");
                OutboundEvent::FinalEmail {
                    source: Source::Standard,
                    content: EMPTY_DRAFT.into(),
                }
            }
            Ok(text) => {
                debug!(chars = text.len(), "Single-shot draft ready");
                OutboundEvent::FinalEmail {
                    source: Source::Standard,
                    content: text,
                }
            }
            Err(e) => {
                warn!(error = %e, "Single-shot generation failed");
                OutboundEvent::error(Source::Standard, format!("Error in Standard Agent Stream: {e}"))
            }
        };
        sink.send(result).await?;

        sink.send(OutboundEvent::TypingEnd {
            source: Source::Standard,
        })
        .await?;
        sink.send(OutboundEvent::ProcessingComplete {
            source: Source::Standard,
        })
        .await
    }

    /// Stream the reply, forwarding every non-empty delta.
    ///
    /// Each wait for a chunk is bounded by the client's timeout. The outer
    /// error is a delivery failure; the inner one is the model's.
    async fn generate_streaming(
        &self,
        history: &[Message],
        sink: &dyn OutboundSink,
    ) -> Result<Result<String, ProviderError>, ChannelError> {
        let mut rx = match self.client.stream(None, history).await {
            Ok(rx) => rx,
            Err(e) => return Ok(Err(e)),
        };

        let mut text = String::new();
        while let Some(chunk) = self.client.next_chunk(&mut rx).await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Ok(Err(e)),
            };
            if let Some(delta) = chunk.content.filter(|d| !d.is_empty()) {
                text.push_str(&delta);
                sink.send(OutboundEvent::Ai {
                    source: Source::Standard,
                    content: delta,
                })
                .await?;
            }
            if chunk.done {
                break;
            }
        }
        Ok(Ok(text))
    }
}
