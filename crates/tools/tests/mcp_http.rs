//! MCP provider against an in-process Streamable HTTP server.
//!
//! The mock only answers POST; the `rmcp` client falls back to request-scoped
//! responses when the standalone GET stream is refused with 405.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use outreach_core::error::ToolError;
use outreach_core::tool::ToolProvider;
use outreach_tools::{McpToolProvider, ToolRegistry};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct ServerLog {
    methods: Arc<Mutex<Vec<String>>>,
    sessions: Arc<Mutex<Vec<Option<String>>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

async fn handle(State(log): State<ServerLog>, headers: HeaderMap, body: String) -> Response {
    let request: Value = serde_json::from_str(&body).unwrap();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    log.methods.lock().unwrap().push(method.clone());
    log.sessions.lock().unwrap().push(
        headers
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    log.auth.lock().unwrap().push(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    let id = request["id"].clone();
    match method.as_str() {
        "initialize" => (
            [("mcp-session-id", "session-1")],
            axum::Json(json!({
                "jsonrpc": "2.0", "id": id,
                "result": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "mock-explorium", "version": "0.0.1" }
                }
            })),
        )
            .into_response(),
        "notifications/initialized" => StatusCode::ACCEPTED.into_response(),
        "tools/list" => {
            let result = if request["params"]["cursor"].is_null() {
                json!({
                    "tools": [{
                        "name": "match_business",
                        "description": "Match a company",
                        "inputSchema": { "type": "object", "required": ["name"] }
                    }],
                    "nextCursor": "page-2"
                })
            } else {
                json!({ "tools": [{ "name": "fetch_prospects", "inputSchema": { "type": "object" } }] })
            };
            axum::Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response()
        }
        "tools/call" => {
            let name = request["params"]["name"].as_str().unwrap_or_default();
            if name == "stall" {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            let result = if name == "match_business" {
                json!({ "content": [{ "type": "text", "text": format!("matched {}", request["params"]["arguments"]["name"].as_str().unwrap_or("")) }] })
            } else {
                json!({ "content": [{ "type": "text", "text": "quota exceeded" }], "isError": true })
            };
            let message = json!({ "jsonrpc": "2.0", "id": id, "result": result });
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                format!("event: message\ndata: {message}\n\n"),
            )
                .into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_server() -> (String, ServerLog) {
    let log = ServerLog::default();
    let app = Router::new().route("/mcp", post(handle)).with_state(log.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/mcp"), log)
}

fn provider(url: &str) -> McpToolProvider {
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), "Bearer test-token".to_string());
    McpToolProvider::new(url, &headers, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn handshake_then_paginated_listing() {
    let (url, log) = spawn_server().await;
    let provider = provider(&url);

    let tools = provider.list_tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["match_business", "fetch_prospects"]);
    assert_eq!(tools[0].required_arguments(), vec!["name"]);

    let methods = log.methods.lock().unwrap().clone();
    assert_eq!(
        methods,
        vec!["initialize", "notifications/initialized", "tools/list", "tools/list"]
    );

    // Session id from initialize is echoed on every later request
    let sessions = log.sessions.lock().unwrap().clone();
    assert_eq!(sessions[0], None);
    assert!(sessions[1..].iter().all(|s| s.as_deref() == Some("session-1")));

    let auth = log.auth.lock().unwrap().clone();
    assert!(auth.iter().all(|a| a.as_deref() == Some("Bearer test-token")));
}

#[tokio::test]
async fn registry_calls_through_event_stream_responses() {
    let (url, log) = spawn_server().await;
    let registry = ToolRegistry::connect(Arc::new(provider(&url))).await.unwrap();

    let mut args = serde_json::Map::new();
    args.insert("name".into(), json!("Acme"));
    let output = registry.invoke("match_business", args).await.unwrap();
    assert_eq!(output, "matched Acme");

    let err = registry
        .invoke("fetch_prospects", serde_json::Map::new())
        .await
        .unwrap_err();
    match err {
        ToolError::ProviderFailure { tool_name, reason } => {
            assert_eq!(tool_name, "fetch_prospects");
            assert_eq!(reason, "quota exceeded");
        }
        other => panic!("unexpected {other:?}"),
    }

    // Handshake happens once per provider
    let methods = log.methods.lock().unwrap().clone();
    assert_eq!(methods.iter().filter(|m| *m == "initialize").count(), 1);
}

#[tokio::test]
async fn unreachable_server_is_provider_failure() {
    let provider = provider("http://127.0.0.1:9/mcp");
    let err = provider.list_tools().await.unwrap_err();
    assert!(matches!(err, ToolError::ProviderFailure { tool_name, .. } if tool_name == "initialize"));
}

#[tokio::test]
async fn stalled_call_is_bounded_by_timeout() {
    let (url, _log) = spawn_server().await;
    let provider = McpToolProvider::new(&url, &HashMap::new(), Duration::from_millis(300)).unwrap();

    let err = provider.invoke("stall", serde_json::Map::new()).await.unwrap_err();
    match err {
        ToolError::ProviderFailure { tool_name, reason } => {
            assert_eq!(tool_name, "stall");
            assert!(reason.contains("timed out"), "{reason}");
        }
        other => panic!("unexpected {other:?}"),
    }
}
