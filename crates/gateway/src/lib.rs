//! HTTP and WebSocket gateway for Outreach.
//!
//! Routes:
//! - `GET /health` — liveness probe
//! - `GET /ws`     — drafting session (see [`ws`])
//!
//! Built on Axum. The session (model clients and tool registry) is set up
//! once at startup and shared by every connection.

pub mod connections;
pub mod ws;

use std::sync::Arc;

use axum::http::Method;
use axum::{Router, response::Json, routing::get};
use outreach_agent::Pipelines;
use outreach_config::AppConfig;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use connections::{ConnectionManager, ConnectionSink};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub pipelines: Pipelines,
    pub connections: ConnectionManager,
}

impl GatewayState {
    pub fn new(config: AppConfig, pipelines: Pipelines) -> Self {
        Self {
            config,
            pipelines,
            connections: ConnectionManager::new(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws::ws_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway server and run until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let pipelines = Pipelines::connect(&config).await?;
    info!(
        tools = pipelines.reasoning.tools().len(),
        max_steps = pipelines.reasoning.max_steps(),
        "Session ready"
    );

    let state = Arc::new(GatewayState::new(config, pipelines));
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the process is killed.
        std::future::pending::<()>().await;
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Application is running",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use outreach_agent::{ReasoningLoop, SingleShotPipeline};
    use outreach_core::error::ToolError;
    use outreach_core::tool::{ToolDescriptor, ToolProvider};
    use outreach_providers::{AnthropicProvider, ModelClient};
    use outreach_tools::ToolRegistry;
    use tower::ServiceExt;

    struct NoTools;

    #[async_trait]
    impl ToolProvider for NoTools {
        fn name(&self) -> &str {
            "none"
        }

        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
            Ok(Vec::new())
        }

        async fn invoke(
            &self,
            name: &str,
            _arguments: serde_json::Map<String, serde_json::Value>,
        ) -> Result<String, ToolError> {
            Err(ToolError::UnknownTool(name.into()))
        }
    }

    fn test_state() -> SharedState {
        let config = AppConfig::default();
        let provider = Arc::new(AnthropicProvider::new("test-key"));
        let client = ModelClient::new(provider, "test-model", 0.7, Default::default());
        let tools = Arc::new(ToolRegistry::with_descriptors(Arc::new(NoTools), Vec::new()));
        let pipelines = Pipelines::new(
            ReasoningLoop::new(client.clone(), tools),
            SingleShotPipeline::new(client),
        );
        Arc::new(GatewayState::new(config, pipelines))
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "ok", "message": "Application is running"})
        );
    }

    #[tokio::test]
    async fn ws_route_exists() {
        // A plain GET without upgrade headers is refused, but not with 404
        let app = build_router(test_state());
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = build_router(test_state());
        let req = Request::builder().uri("/v1/chat").body(Body::empty()).unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
