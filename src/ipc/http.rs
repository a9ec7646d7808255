//! HTTP transport: thin axum adapters over the shared [`Dispatcher`].
//!
//! # Endpoints
//!
//! - `GET /mcp` - handshake event stream (one `endpoint` event, then closes)
//! - `POST /mcp/initialize`
//! - `POST /mcp/tools/list`
//! - `POST /mcp/tools/call/{toolName}`
//!
//! Protocol-level errors are returned with HTTP 200; only an unreadable body
//! (400) or an internal failure (500) changes the status.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::protocol::{present, Message, TOOLS_CALL_PREFIX};
use crate::error::NexusError;
use crate::mcp::Dispatcher;

/// How long the handshake stream stays open after its only event.
const HANDSHAKE_LINGER: Duration = Duration::from_secs(2);

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// Request body shared by every POST endpoint. Both fields are optional.
#[derive(Debug, Default, Deserialize)]
struct RpcBody {
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
    #[serde(default)]
    params: Option<Map<String, Value>>,
}

/// Build the router for `dispatcher`.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    let state = AppState { dispatcher };

    Router::new()
        .route("/", get(handle_root))
        .route("/mcp", get(handle_handshake))
        .route("/mcp/initialize", post(handle_initialize))
        .route("/mcp/tools/list", post(handle_list_tools))
        .route("/mcp/tools/call/{tool_name}", post(handle_call_tool))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<S>(dispatcher: Arc<Dispatcher>, addr: SocketAddr, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP transport listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("HTTP transport stopped");
    Ok(())
}

async fn handle_root() -> Json<Value> {
    Json(json!({ "message": "NexusHub MCP Server is running" }))
}

async fn handle_handshake() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!("HTTP handshake stream opened");

    let stream = stream::unfold(true, |first| async move {
        if first {
            let event = Event::default().event("endpoint").data("/mcp");
            Some((Ok(event), false))
        } else {
            tokio::time::sleep(HANDSHAKE_LINGER).await;
            None
        }
    });

    Sse::new(stream)
}

async fn handle_initialize(State(state): State<AppState>, body: Bytes) -> HttpResponse {
    dispatch(&state, "initialize".to_string(), &body).await
}

async fn handle_list_tools(State(state): State<AppState>, body: Bytes) -> HttpResponse {
    dispatch(&state, "tools/list".to_string(), &body).await
}

async fn handle_call_tool(
    State(state): State<AppState>,
    Path(tool_name): Path<String>,
    body: Bytes,
) -> HttpResponse {
    dispatch(&state, format!("{}{}", TOOLS_CALL_PREFIX, tool_name), &body).await
}

/// Decode the body, run the dispatcher and render its response.
async fn dispatch(state: &AppState, method: String, body: &[u8]) -> HttpResponse {
    let body = match parse_body(body) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Rejected {} request: {}", method, e);
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
        }
    };

    tracing::debug!("HTTP {} request received", method);
    let message = Message::new(body.id, method, body.params);

    match state.dispatcher.dispatch(message).await {
        Some(response) => match serde_json::to_value(&response) {
            Ok(value) => (StatusCode::OK, Json(value)).into_response(),
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        },
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// An empty body means "no id, no params".
fn parse_body(body: &[u8]) -> std::result::Result<RpcBody, NexusError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RpcBody::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| NexusError::ParseError(format!("invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::{ToolDescriptor, ToolHandler, ToolRegistry};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn invoke(&self, params: Value) -> anyhow::Result<Value> {
            Ok(params)
        }
    }

    fn app() -> Router {
        let registry = ToolRegistry::builder()
            .register(
                ToolDescriptor::new("echo", "Echo params", json!({"type": "object"})),
                Echo,
            )
            .unwrap()
            .build();
        router(Arc::new(Dispatcher::new(Arc::new(registry))))
    }

    async fn post_json(uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_initialize() {
        let (status, body) = post_json("/mcp/initialize", r#"{"id": 1}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(1));
        assert_eq!(body["result"]["protocolVersion"], json!("2024-11-05"));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let (status, body) = post_json("/mcp/tools/list", r#"{"id": "l"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["tools"][0]["name"], json!("echo"));
    }

    #[tokio::test]
    async fn test_call_tool_success() {
        let (status, body) =
            post_json("/mcp/tools/call/echo", r#"{"id": 3, "params": {"a": 1}}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_200_with_error() {
        let (status, body) = post_json("/mcp/tools/call/unknown_tool", r#"{"id": 2}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(2));
        assert_eq!(body["error"]["code"], json!(-32000));
        assert!(body.get("result").is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let (status, body) = post_json("/mcp/tools/list", "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Parse error: invalid request body"));

        let (status, _) = post_json("/mcp/tools/call/echo", r#"{"params": [1, 2]}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_body_has_no_id() {
        let (status, body) = post_json("/mcp/initialize", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("id").is_none());
        assert!(body["result"].is_object());
    }

    #[tokio::test]
    async fn test_root_message() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], json!("NexusHub MCP Server is running"));
    }

    #[tokio::test]
    async fn test_handshake_stream() {
        let response = app()
            .oneshot(Request::builder().uri("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        // Completes once the stream closes after the linger delay.
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("event: endpoint"));
        assert!(text.contains("data: /mcp"));
    }
}
