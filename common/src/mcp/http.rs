//! Streamable HTTP transport.
//!
//! `POST /mcp` takes one JSON-RPC message (or a batch) and answers with
//! `application/json`. No server-initiated SSE stream is offered, so other
//! methods on `/mcp` are answered with 405 by the router.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{OpenApi, ToSchema};

use super::handler::{handle_message, HealthReport, McpHandler};
use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PARSE_ERROR};
use crate::errors::AppError;
use crate::middleware::{request_id_middleware, RequestId};
use crate::utils::IdGenerator;

/// Session header issued on `initialize`.
pub const SESSION_HEADER: &str = "mcp-session-id";

type SharedHandler = Arc<dyn McpHandler>;

/// Health endpoint body.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub details: Value,
}

#[derive(OpenApi)]
#[openapi(
    paths(mcp_post, health_check),
    components(schemas(JsonRpcRequest, JsonRpcResponse, JsonRpcError, HealthResponse, HealthReport)),
    tags(
        (name = "mcp", description = "Model Context Protocol endpoint"),
        (name = "health", description = "Liveness and dependency status")
    )
)]
pub struct ApiDoc;

/// Build the router for a handler.
pub fn router(handler: SharedHandler) -> Router {
    Router::new()
        .route("/mcp", post(mcp_post))
        .route("/api/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .fallback(not_found)
        .with_state(handler)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn serve_http<F>(
    handler: SharedHandler,
    addr: SocketAddr,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(handler);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "streamable HTTP transport listening on /mcp");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// MCP JSON-RPC endpoint.
#[utoipa::path(
    post,
    path = "/mcp",
    tag = "mcp",
    request_body = JsonRpcRequest,
    responses(
        (status = 200, description = "JSON-RPC response", body = JsonRpcResponse),
        (status = 202, description = "Notification accepted"),
        (status = 400, description = "Body is not valid JSON", body = JsonRpcResponse)
    )
)]
pub async fn mcp_post(
    State(handler): State<SharedHandler>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%request_id, error = %e, "unparseable MCP request body");
            let resp = JsonRpcResponse::error(None, PARSE_ERROR, format!("parse error: {}", e));
            return (StatusCode::BAD_REQUEST, Json(resp)).into_response();
        }
    };

    let is_initialize = contains_initialize(&message);

    match handle_message(handler.as_ref(), message).await {
        None => StatusCode::ACCEPTED.into_response(),
        Some(body) => {
            let mut headers = HeaderMap::new();
            if is_initialize {
                let session = IdGenerator::session_id();
                tracing::info!(%request_id, %session, "MCP session initialized");
                if let Ok(value) = HeaderValue::from_str(&session) {
                    headers.insert(SESSION_HEADER, value);
                }
            }
            (StatusCode::OK, headers, Json(body)).into_response()
        }
    }
}

fn contains_initialize(message: &Value) -> bool {
    let is_init = |m: &Value| m.get("method").and_then(Value::as_str) == Some("initialize");
    match message {
        Value::Array(items) => items.iter().any(is_init),
        other => is_init(other),
    }
}

/// Health check.
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
pub async fn health_check(State(handler): State<SharedHandler>) -> Json<HealthResponse> {
    let info = handler.server_info();
    let report = handler.health().await;
    Json(HealthResponse {
        status: if report.healthy { "healthy" } else { "degraded" }.to_string(),
        service: info.name,
        version: info.version,
        timestamp: Utc::now(),
        details: report.details,
    })
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn not_found(uri: Uri) -> AppError {
    AppError::ResourceNotFound(format!("route {}", uri.path()))
}
