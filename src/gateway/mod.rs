//! HTTP transport for the MCP dispatcher.
//!
//! Exposes the same JSON-RPC surface as the stdio loop at `POST /mcp`,
//! plus a `GET /healthz` liveness probe. Intended for localhost or
//! trusted-network deployment; credentials never transit this surface.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;

use crate::server::{Dispatcher, McpRequest, SERVER_NAME};

/// POST /mcp — one JSON-RPC request per call.
async fn handle_mcp(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(request): Json<McpRequest>,
) -> impl IntoResponse {
    match dispatcher.handle(request).await {
        Some(response) => Json(response).into_response(),
        // Notification: acknowledged, nothing to return.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// GET /healthz — liveness probe.
async fn handle_healthz() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "server": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/healthz", get(handle_healthz))
        .with_state(dispatcher)
}

/// Bind and serve until the process is stopped.
pub async fn run(dispatcher: Arc<Dispatcher>, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("MCP gateway listening on http://{addr}/mcp");

    axum::serve(listener, router(dispatcher)).await?;
    Ok(())
}
