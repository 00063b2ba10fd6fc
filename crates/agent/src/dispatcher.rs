//! Dual pipeline dispatch for one connection.
//!
//! Every accepted request starts two independent runs, the reasoning
//! pipeline (`mcp`) and the single-shot pipeline (`standard`), each in its
//! own task. They share nothing mutable, so a failure or panic in one
//! never touches the other. Runs live in a `JoinSet` owned by the
//! dispatcher: dropping the dispatcher (the connection went away) aborts
//! whatever is still in flight.
//!
//! A connection may have at most `max_inflight` requests running at once.
//! A request that arrives when that many are active is refused immediately
//! with a `system` error instead of waiting.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use outreach_config::AppConfig;
use outreach_core::channel::OutboundSink;
use outreach_core::error::ChannelError;
use outreach_core::event::{OutboundEvent, Source};
use outreach_providers::ModelClients;
use outreach_tools::{McpToolProvider, ToolRegistry};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::collector::run_reasoning;
use crate::reasoning::ReasoningLoop;
use crate::single_shot::SingleShotPipeline;

/// Sent with `source: system` when a request is refused as busy.
///
/// A refused request is dropped, not queued: neither pipeline runs for it,
/// so this error is the only event it produces and no per-pipeline
/// `typing_end`/`processing_complete` follows.
pub const BUSY_MESSAGE: &str =
    "Still working on your previous requests. Please wait for them to finish.";

/// The two pipelines, shared by every connection of a session.
#[derive(Clone)]
pub struct Pipelines {
    pub reasoning: Arc<ReasoningLoop>,
    pub single_shot: Arc<SingleShotPipeline>,
}

impl Pipelines {
    pub fn new(reasoning: ReasoningLoop, single_shot: SingleShotPipeline) -> Self {
        Self {
            reasoning: Arc::new(reasoning),
            single_shot: Arc::new(single_shot),
        }
    }

    pub fn from_config(clients: ModelClients, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        Self::new(
            ReasoningLoop::from_config(clients.reasoning, tools, config),
            SingleShotPipeline::from_config(clients.single_shot, config),
        )
    }

    /// Set up a session: check credentials, connect to the tool server
    /// and load its capabilities, then bind both model clients.
    pub async fn connect(config: &AppConfig) -> outreach_core::Result<Self> {
        config.require_credentials().map_err(|e| outreach_core::Error::Config {
            message: e.to_string(),
        })?;

        let provider = outreach_providers::build_from_config(config)?;
        let tool_provider = McpToolProvider::from_config(&config.tools)?;
        info!(endpoint = %tool_provider.endpoint(), "Connecting to tool server");
        let tools = Arc::new(ToolRegistry::connect(Arc::new(tool_provider)).await?);

        let clients = outreach_providers::build_clients(provider, config);
        Ok(Self::from_config(clients, tools, config))
    }
}

/// What happened to an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Both runs were started.
    Accepted,
    /// Too many requests in flight; a `system` error was sent and the
    /// request was dropped.
    Busy,
    /// Blank input; nothing was started.
    Ignored,
}

pub struct Dispatcher {
    pipelines: Pipelines,
    sink: Arc<dyn OutboundSink>,
    permits: Arc<Semaphore>,
    runs: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(pipelines: Pipelines, sink: Arc<dyn OutboundSink>, max_inflight: usize) -> Self {
        Self {
            pipelines,
            sink,
            permits: Arc::new(Semaphore::new(max_inflight.max(1))),
            runs: JoinSet::new(),
        }
    }

    /// Start both pipelines for `user_request` without waiting for them.
    ///
    /// Every accepted request ends with `processing_complete` from each
    /// pipeline. A request refused as [`Dispatch::Busy`] only gets the
    /// [`BUSY_MESSAGE`] error; it is never retried later.
    pub async fn dispatch(&mut self, user_request: &str) -> Dispatch {
        self.reap();

        let user_request = user_request.trim();
        if user_request.is_empty() {
            debug!("Ignoring blank request");
            return Dispatch::Ignored;
        }

        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Arc::new(permit),
            Err(_) => {
                warn!(in_flight = self.runs.len(), "Request refused, connection busy");
                if let Err(e) = self
                    .sink
                    .send(OutboundEvent::error(Source::System, BUSY_MESSAGE))
                    .await
                {
                    debug!(error = %e, "Could not deliver busy notice");
                }
                return Dispatch::Busy;
            }
        };

        info!(chars = user_request.len(), "Dispatching request to both pipelines");

        let reasoning = self.pipelines.reasoning.clone();
        let sink = self.sink.clone();
        let request = user_request.to_string();
        self.spawn_run(Source::Mcp, permit.clone(), async move {
            run_reasoning(&reasoning, &request, sink.as_ref()).await.map(|_| ())
        });

        let single_shot = self.pipelines.single_shot.clone();
        let sink = self.sink.clone();
        let request = user_request.to_string();
        self.spawn_run(Source::Standard, permit, async move {
            single_shot.run(&request, sink.as_ref()).await
        });

        Dispatch::Accepted
    }

    /// Runs that have not finished yet.
    pub fn in_flight(&mut self) -> usize {
        self.reap();
        self.runs.len()
    }

    /// Wait for every started run to finish.
    pub async fn wait_idle(&mut self) {
        while let Some(joined) = self.runs.join_next().await {
            log_join(joined);
        }
    }

    /// Abort every run still in flight.
    pub fn shutdown(&mut self) {
        if !self.runs.is_empty() {
            info!(runs = self.runs.len(), "Cancelling in-flight runs");
        }
        self.runs.abort_all();
    }

    fn reap(&mut self) {
        while let Some(joined) = self.runs.try_join_next() {
            log_join(joined);
        }
    }

    fn spawn_run<F>(&mut self, source: Source, permit: Arc<OwnedSemaphorePermit>, run: F)
    where
        F: Future<Output = Result<(), ChannelError>> + Send + 'static,
    {
        let sink = self.sink.clone();
        self.runs.spawn(async move {
            let _permit = permit;
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(%source, error = %e, "Run stopped, outbound channel gone"),
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!(%source, reason = %reason, "Pipeline run panicked");
                    report_failure(sink.as_ref(), source, &reason).await;
                }
            }
        });
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Close out a run that died without reporting its own result.
async fn report_failure(sink: &dyn OutboundSink, source: Source, reason: &str) {
    let events = [
        OutboundEvent::error(source, format!("Internal error in {source} pipeline: {reason}")),
        OutboundEvent::TypingEnd { source },
        OutboundEvent::ProcessingComplete { source },
    ];
    for event in events {
        if let Err(e) = sink.send(event).await {
            debug!(%source, error = %e, "Could not report pipeline failure");
            return;
        }
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined
        && !e.is_cancelled()
    {
        error!(error = %e, "Run task failed");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use outreach_core::error::ProviderError;
    use outreach_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use std::time::Duration;

    struct PanickingProvider;

    #[async_trait]
    impl Provider for PanickingProvider {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            panic!("model exploded");
        }
    }

    /// Answers after a delay, so runs stay in flight.
    struct SlowProvider;

    #[async_trait]
    impl Provider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(make_text_response("Body: late"))
        }
    }

    fn plain_client(provider: Arc<dyn Provider>) -> outreach_providers::ModelClient {
        outreach_providers::ModelClient::new(provider, "mock-model", 0.7, Default::default())
    }

    async fn pipelines(reasoning: Arc<dyn Provider>, single_shot: Arc<dyn Provider>) -> Pipelines {
        Pipelines::new(
            ReasoningLoop::new(plain_client(reasoning), registry().await),
            SingleShotPipeline::new(plain_client(single_shot)),
        )
    }

    fn by_source(events: &[OutboundEvent], source: Source) -> Vec<&'static str> {
        events
            .iter()
            .filter(|e| e.source() == source)
            .map(OutboundEvent::event_type)
            .collect()
    }

    #[tokio::test]
    async fn both_pipelines_report() {
        let sink = Arc::new(RecordingSink::default());
        let pipelines = pipelines(
            ScriptedProvider::new(vec![Ok(make_text_response("Subject: A\nBody: B"))]),
            ScriptedProvider::new(vec![Ok(make_text_response("plain draft"))]),
        )
        .await;
        let mut dispatcher = Dispatcher::new(pipelines, sink.clone(), 2);

        assert_eq!(dispatcher.dispatch("email Acme").await, Dispatch::Accepted);
        dispatcher.wait_idle().await;

        let events = sink.events();
        assert_eq!(
            by_source(&events, Source::Mcp),
            vec![
                "typing_start",
                "mcp_final_email",
                "mcp_intermediate_steps",
                "typing_end",
                "processing_complete"
            ]
        );
        assert_eq!(
            by_source(&events, Source::Standard),
            vec!["typing_start", "final_email", "typing_end", "processing_complete"]
        );
    }

    #[tokio::test]
    async fn panic_in_one_pipeline_is_contained() {
        let sink = Arc::new(RecordingSink::default());
        let pipelines = pipelines(
            ScriptedProvider::new(vec![Ok(make_text_response("Body: fine"))]),
            Arc::new(PanickingProvider),
        )
        .await;
        let mut dispatcher = Dispatcher::new(pipelines, sink.clone(), 2);

        dispatcher.dispatch("x").await;
        dispatcher.wait_idle().await;

        let events = sink.events();
        assert!(events.iter().any(|e| matches!(e, OutboundEvent::McpFinalEmail { .. })));
        let standard = by_source(&events, Source::Standard);
        assert_eq!(
            standard,
            vec!["typing_start", "error", "typing_end", "processing_complete"]
        );
        assert!(events.iter().any(|e| matches!(
            e,
            OutboundEvent::Error { source: Source::Standard, content } if content.contains("model exploded")
        )));
    }

    #[tokio::test]
    async fn session_setup_requires_credentials() {
        let err = Pipelines::connect(&AppConfig::default()).await.err().unwrap();
        assert!(matches!(err, outreach_core::Error::Config { message } if message.contains("ANTHROPIC_API_KEY")));
    }

    #[tokio::test]
    async fn blank_request_is_ignored() {
        let sink = Arc::new(RecordingSink::default());
        let pipelines = pipelines(ScriptedProvider::new(vec![]), ScriptedProvider::new(vec![])).await;
        let mut dispatcher = Dispatcher::new(pipelines, sink.clone(), 2);

        assert_eq!(dispatcher.dispatch("   ").await, Dispatch::Ignored);
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(sink.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_requests_are_bounded() {
        let sink = Arc::new(RecordingSink::default());
        let pipelines = pipelines(Arc::new(SlowProvider), Arc::new(SlowProvider)).await;
        let mut dispatcher = Dispatcher::new(pipelines, sink.clone(), 1);

        assert_eq!(dispatcher.dispatch("first").await, Dispatch::Accepted);
        assert_eq!(dispatcher.dispatch("second").await, Dispatch::Busy);
        assert_eq!(dispatcher.in_flight(), 2);
        assert!(sink
            .events()
            .contains(&OutboundEvent::error(Source::System, BUSY_MESSAGE)));

        dispatcher.wait_idle().await;
        assert_eq!(dispatcher.dispatch("third").await, Dispatch::Accepted);
        dispatcher.wait_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_dispatcher_cancels_runs() {
        let sink = Arc::new(RecordingSink::default());
        let pipelines = pipelines(Arc::new(SlowProvider), Arc::new(SlowProvider)).await;
        let mut dispatcher = Dispatcher::new(pipelines, sink.clone(), 2);

        dispatcher.dispatch("x").await;
        tokio::task::yield_now().await;
        drop(dispatcher);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!sink.events().iter().any(OutboundEvent::is_result));
    }

    #[tokio::test(start_paused = true)]
    async fn refused_request_is_dropped_not_queued() {
        let sink = Arc::new(RecordingSink::default());
        let pipelines = pipelines(Arc::new(SlowProvider), Arc::new(SlowProvider)).await;
        let mut dispatcher = Dispatcher::new(pipelines, sink.clone(), 1);

        assert_eq!(dispatcher.dispatch("first").await, Dispatch::Accepted);
        assert_eq!(dispatcher.dispatch("second").await, Dispatch::Busy);
        dispatcher.wait_idle().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        let events = sink.events();
        let count = |event_type: &str, source: Source| {
            events
                .iter()
                .filter(|e| e.event_type() == event_type && e.source() == source)
                .count()
        };
        // Only the accepted request ran, once per pipeline
        assert_eq!(count("typing_start", Source::Mcp), 1);
        assert_eq!(count("typing_start", Source::Standard), 1);
        assert_eq!(count("processing_complete", Source::Mcp), 1);
        assert_eq!(count("processing_complete", Source::Standard), 1);
        assert_eq!(count("error", Source::System), 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }
}
